//! `bus` is the address decoder between the CPU and everything else on
//! the breadboard. Accesses are routed with a strict priority:
//! registered peripherals (in registration order), then the ROM region,
//! then RAM. It also converts each peripheral's level sensitive IRQ
//! line into one CPU interrupt request per rising edge so a flag that
//! stays asserted can't storm the CPU.

use std::cell::RefCell;
use std::rc::Rc;

use chip::{Chip, Peripheral};
use color_eyre::eyre::Result;
use memory::{Ram, Rom, ROM_START};

mod tests;

// A registered peripheral plus the last sampled level of its IRQ line,
// kept for edge detection in `tick`.
struct Slot {
    dev: Rc<RefCell<dyn Peripheral>>,
    last_irq: bool,
}

/// The system bus. Owns the two memories and the ordered peripheral
/// list; the CPU drives it one access and one tick at a time.
#[must_use]
pub struct Bus {
    ram: Ram,
    rom: Rom,
    peripherals: Vec<Slot>,
}

impl Bus {
    /// new returns a `Bus` over the given memories with no peripherals
    /// registered.
    pub fn new(ram: Ram, rom: Rom) -> Self {
        Self {
            ram,
            rom,
            peripherals: Vec::new(),
        }
    }

    /// `add_peripheral` registers a device. Registration order is
    /// routing priority order; earlier devices win overlapping claims.
    pub fn add_peripheral(&mut self, dev: Rc<RefCell<dyn Peripheral>>) {
        self.peripherals.push(Slot {
            dev,
            last_irq: false,
        });
    }

    /// Read the byte decoded at `addr`.
    ///
    /// # Errors
    /// An unmapped address below the ROM region falls through to RAM
    /// which rejects it as out of range.
    pub fn read(&mut self, addr: u16) -> Result<u8> {
        for slot in &self.peripherals {
            let mut dev = slot.dev.borrow_mut();
            if dev.handles_address(addr) {
                return Ok(dev.read(addr));
            }
        }
        if addr >= ROM_START {
            return Ok(self.rom.read(addr)?);
        }
        Ok(self.ram.read(addr)?)
    }

    /// Write the byte decoded at `addr`. Writes routed to the ROM
    /// region are silently dropped.
    ///
    /// # Errors
    /// An unmapped address below the ROM region falls through to RAM
    /// which rejects it as out of range. Peripheral writes bridging to
    /// host I/O can also fail.
    pub fn write(&mut self, addr: u16, val: u8) -> Result<()> {
        for slot in &self.peripherals {
            let mut dev = slot.dev.borrow_mut();
            if dev.handles_address(addr) {
                return dev.write(addr, val);
            }
        }
        if addr >= ROM_START {
            return Ok(());
        }
        Ok(self.ram.write(addr, val)?)
    }

    /// Read the little endian word at `addr`. The second byte address
    /// wraps at the top of the address space.
    ///
    /// # Errors
    /// Same failure modes as [`Bus::read`].
    pub fn read_word(&mut self, addr: u16) -> Result<u16> {
        let lo = self.read(addr)?;
        let hi = self.read(addr.wrapping_add(1))?;
        Ok((u16::from(hi) << 8) | u16::from(lo))
    }

    /// `tick` advances every peripheral one clock step and samples each
    /// IRQ line. Returns true when any line transitioned low to high
    /// this tick; the caller latches that into a CPU interrupt request.
    ///
    /// # Errors
    /// A peripheral tick hitting an illegal condition fails the call.
    pub fn tick(&mut self) -> Result<bool> {
        let mut rising = false;
        for slot in &mut self.peripherals {
            let mut dev = slot.dev.borrow_mut();
            dev.tick()?;
            let level = dev.has_irq();
            if level && !slot.last_irq {
                rising = true;
            }
            slot.last_irq = level;
        }
        Ok(rising)
    }
}
