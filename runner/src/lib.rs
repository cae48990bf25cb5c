//! runner implements the shared plumbing for the breadboard front
//! ends: wiring the machine together, pacing the emulated clock against
//! the wall clock, rendering the LED row and keeping the host terminal
//! restorable.

use std::cell::RefCell;
use std::io::{self, IsTerminal, Stdout, Write};
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use acia::{Acia, ConsoleSink, StdinSource, ACIA_BASE};
use bus::Bus;
use color_eyre::eyre::Result;
use cpu::{CPUError, Cpu};
use crossterm::terminal;
use log::info;
use memory::{Ram, Rom};
use via::{Via, VIA_BASE};

mod tests;

/// `System` is one assembled breadboard machine: CPU over bus over
/// RAM/ROM/VIA and optionally an ACIA. The peripheral handles are kept
/// so a front end can render or inject without going through the bus.
pub struct System {
    /// The CPU, which owns the bus.
    pub cpu: Cpu,
    /// Handle on the VIA for LED rendering and port input.
    pub via: Rc<RefCell<Via>>,
    /// Handle on the ACIA when one is wired.
    pub acia: Option<Rc<RefCell<Acia>>>,
}

impl System {
    /// Wire RAM, the given ROM, a VIA and optionally an ACIA onto the
    /// bus and power the CPU on.
    ///
    /// # Errors
    /// Fails if the reset vector can't be read.
    pub fn new(rom: Rom, acia: Option<Acia>) -> Result<Self> {
        let mut bus = Bus::new(Ram::new(), rom);
        let via = Rc::new(RefCell::new(Via::new(VIA_BASE)));
        bus.add_peripheral(via.clone());
        let acia = acia.map(|a| Rc::new(RefCell::new(a)));
        if let Some(a) = &acia {
            bus.add_peripheral(a.clone());
        }
        let mut cpu = Cpu::new(bus);
        cpu.power_on()?;
        Ok(Self { cpu, via, acia })
    }
}

/// Load a whole ROM image file at the default load address.
///
/// # Errors
/// Fails if the file is missing or unreadable.
pub fn load_rom<P: AsRef<Path>>(path: P) -> Result<Rom> {
    let mut rom = Rom::new();
    rom.load_from_file(path, None)?;
    Ok(rom)
}

/// An ACIA bridged to the host terminal: transmit to stdout with the
/// control character policy, receive from a non-blocking stdin pump.
#[must_use]
pub fn console_acia() -> Acia {
    Acia::new(ACIA_BASE)
        .sink(Box::new(ConsoleSink::stdout()))
        .source(Some(Box::new(StdinSource::spawn())))
}

/// `ClockPacer` holds the run loop to a configured emulated frequency.
/// It tracks a running target timestamp; when the host oversleeps, the
/// following cycles run without sleeping until the schedule is
/// recovered.
pub struct ClockPacer {
    period_nanos: u64,
    start: Instant,
    executed: u64,
}

impl ClockPacer {
    /// A pacer for `clock_hz` cycles per second. Zero means unpaced.
    #[must_use]
    pub fn new(clock_hz: u64) -> Self {
        Self {
            period_nanos: if clock_hz == 0 {
                0
            } else {
                1_000_000_000 / clock_hz
            },
            start: Instant::now(),
            executed: 0,
        }
    }

    /// Account one executed cycle and sleep off any lead over the
    /// target schedule.
    pub fn pace(&mut self) {
        if self.period_nanos == 0 {
            return;
        }
        self.executed += 1;
        let target = self.start + Duration::from_nanos(self.executed.saturating_mul(self.period_nanos));
        if let Some(lead) = target.checked_duration_since(Instant::now()) {
            if !lead.is_zero() {
                thread::sleep(lead);
            }
        }
    }
}

/// `LedPanel` renders the two VIA output ports as a row of LEDs,
/// redrawn in place and only when a port value changes.
pub struct LedPanel<W: Write> {
    out: W,
    last: Option<(u8, u8)>,
}

impl LedPanel<Stdout> {
    /// A panel drawing to the host stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> LedPanel<W> {
    /// A panel drawing to the given writer.
    pub fn new(out: W) -> Self {
        Self { out, last: None }
    }

    /// Redraw if either port changed since the last call.
    ///
    /// # Errors
    /// Fails when the writer does.
    pub fn render(&mut self, port_a: u8, port_b: u8) -> Result<()> {
        if self.last == Some((port_a, port_b)) {
            return Ok(());
        }
        self.last = Some((port_a, port_b));

        write!(self.out, "\rA ")?;
        for bit in (0..8).rev() {
            let lit = port_a & (1 << bit) != 0;
            write!(self.out, "{}", if lit { '\u{25cf}' } else { '\u{25cb}' })?;
        }
        write!(self.out, "  B ")?;
        for bit in (0..8).rev() {
            let lit = port_b & (1 << bit) != 0;
            write!(self.out, "{}", if lit { '\u{25cf}' } else { '\u{25cb}' })?;
        }
        self.out.flush()?;
        Ok(())
    }

    /// The wrapped writer, for inspecting test output.
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// `RawModeGuard` puts the terminal into raw (non-canonical, no echo)
/// mode and restores it when dropped, including during unwinds. When
/// stdin isn't a terminal nothing is changed.
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    /// Enable raw mode if the host is a terminal.
    ///
    /// # Errors
    /// Fails if the terminal refuses the mode change.
    pub fn enable() -> Result<Self> {
        if !io::stdin().is_terminal() {
            return Ok(Self { active: false });
        }
        terminal::enable_raw_mode()?;
        Ok(Self { active: true })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = terminal::disable_raw_mode();
        }
    }
}

/// `run_loop` drives the CPU until the user interrupts, the program
/// stops the clock, or a fault surfaces. `on_cycle` runs after every
/// cycle (the LED front end redraws from it).
///
/// # Errors
/// Bus or host I/O faults end the loop with the underlying report.
pub fn run_loop<F>(system: &mut System, clock_hz: u64, mut on_cycle: F) -> Result<()>
where
    F: FnMut(&mut System) -> Result<()>,
{
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    let mut pacer = ClockPacer::new(clock_hz);
    while !interrupted.load(Ordering::SeqCst) {
        if let Err(e) = system.cpu.step() {
            if let Some(CPUError::Halted { op }) = e.downcast_ref::<CPUError>() {
                info!("program stopped the clock (opcode {op:#04X})");
                break;
            }
            return Err(e);
        }
        on_cycle(system)?;
        pacer.pace();
    }
    info!("run loop ended after {} cycles", system.cpu.clocks());
    Ok(())
}
