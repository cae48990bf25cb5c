//! Whole machine scenarios: real ROM byte programs driven through the
//! assembled system, observing the LED ports and the serial link.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::rc::Rc;

use acia::{Acia, ACIA_BASE};
use color_eyre::eyre::Result;
use memory::Rom;
use ntest::timeout;
use runner::{load_rom, System};
use tempfile::tempdir;

fn boot(prog: &[u8], acia: Option<Acia>) -> Result<System> {
    let mut rom = Rom::new();
    rom.load_bytes(prog, 0x8000);
    rom.load_bytes(&[0x00, 0x80], 0xFFFC);
    System::new(rom, acia)
}

fn run_cycles(system: &mut System, n: usize) -> Result<()> {
    for _ in 0..n {
        system.cpu.step()?;
    }
    Ok(())
}

// Step until the program executes STP, bounded so a wrong turn fails
// the test instead of hanging it.
fn run_until_stopped(system: &mut System, max: usize) -> Result<()> {
    for _ in 0..max {
        if system.cpu.is_halted() {
            return Ok(());
        }
        system.cpu.step()?;
    }
    panic!("program never stopped the clock");
}

#[test]
#[timeout(10000)]
fn walking_led_pattern() -> Result<()> {
    // LDA #$FF; STA $6002; LDA #$01; then STA $6000 / ASL / BNE around,
    // reloading 1 when the bit walks off the top.
    let mut system = boot(
        &[
            0xA9, 0xFF, 0x8D, 0x02, 0x60, // DDRB all output
            0xA9, 0x01, // LDA #$01
            0x8D, 0x00, 0x60, // STA $6000
            0x0A, // ASL A
            0xD0, 0xFA, // BNE back to the store
            0xA9, 0x01, // LDA #$01
            0x4C, 0x07, 0x80, // JMP back to the store
        ],
        None,
    )?;

    let mut seen = Vec::new();
    for _ in 0..220 {
        system.cpu.step()?;
        let b = system.via.borrow().port_b_output();
        if b != 0 && seen.last() != Some(&b) {
            seen.push(b);
        }
    }

    // One full walk and the restart.
    assert!(
        seen.starts_with(&[0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x01]),
        "walk order wrong: {seen:02X?}"
    );
    Ok(())
}

#[test]
#[timeout(10000)]
fn led_value_is_a_single_bit_mid_walk() -> Result<()> {
    let mut system = boot(
        &[
            0xA9, 0xFF, 0x8D, 0x02, 0x60, 0xA9, 0x01, 0x8D, 0x00, 0x60, 0x0A, 0xD0, 0xFB, 0xA9,
            0x01, 0x4C, 0x09, 0x80,
        ],
        None,
    )?;
    run_cycles(&mut system, 64)?;
    let b = system.via.borrow().port_b_output();
    assert!(b.is_power_of_two(), "port B {b:#04X} isn't a lone bit");
    Ok(())
}

#[test]
#[timeout(10000)]
fn binary_counter_counts_port_b() -> Result<()> {
    // DDRB all output, A = 0, then STA $6000 / CLC / ADC #1 forever.
    let mut system = boot(
        &[
            0xA9, 0xFF, 0x8D, 0x02, 0x60, // DDRB
            0xA9, 0x00, // LDA #$00
            0x8D, 0x00, 0x60, // STA $6000
            0x18, // CLC
            0x69, 0x01, // ADC #$01
            0x4C, 0x07, 0x80, // JMP back to the store
        ],
        None,
    )?;

    let mut changes = Vec::new();
    let mut last = 0u8;
    // Enough for the count to wrap past 255.
    for _ in 0..3000 {
        system.cpu.step()?;
        let b = system.via.borrow().port_b_output();
        if b != last {
            changes.push(b);
            last = b;
        }
    }

    for (i, got) in changes.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let want = (i as u8).wrapping_add(1);
        assert!(*got == want, "change {i} was {got} want {want}");
    }
    assert!(changes.len() > 256, "count never wrapped: {}", changes.len());
    Ok(())
}

fn console_acia_for_test() -> (Acia, Rc<RefCell<Vec<u8>>>, Rc<RefCell<VecDeque<u8>>>) {
    let sent = Rc::new(RefCell::new(Vec::new()));
    let incoming = Rc::new(RefCell::new(VecDeque::new()));
    let acia = Acia::new(ACIA_BASE)
        .sink(Box::new(sent.clone()))
        .source(Some(Box::new(incoming.clone())));
    (acia, sent, incoming)
}

#[test]
#[timeout(10000)]
fn hello_world_over_the_serial_link() -> Result<()> {
    const GREETING: &[u8] = b"Hello, World!\r\n";

    // Program the ACIA, then for each character poll TDRE and store the
    // byte to the data register. Ends with STP.
    let mut prog = Vec::new();
    prog.extend([0xA9, 0x00, 0x8D, 0x01, 0x50]); // programmed reset
    prog.extend([0xA9, 0x0B, 0x8D, 0x02, 0x50]); // command
    prog.extend([0xA9, 0x1F, 0x8D, 0x03, 0x50]); // control
    for &c in GREETING {
        prog.extend([0xAD, 0x01, 0x50]); // LDA $5001
        prog.extend([0x29, 0x10]); // AND #$10 (TDRE)
        prog.extend([0xF0, 0xF9]); // BEQ back to the poll
        prog.extend([0xA9, c, 0x8D, 0x00, 0x50]); // LDA #c; STA $5000
    }
    prog.push(0xDB); // STP

    let (acia, sent, _incoming) = console_acia_for_test();
    let mut system = boot(&prog, Some(acia))?;
    run_until_stopped(&mut system, 20_000)?;

    assert!(
        sent.borrow().as_slice() == GREETING,
        "sink got {:02X?}",
        sent.borrow()
    );
    Ok(())
}

#[test]
#[timeout(10000)]
fn serial_echo() -> Result<()> {
    // Poll RDRF; when a byte is waiting, read it and transmit it back.
    let mut system_prog = Vec::new();
    system_prog.extend([0xAD, 0x01, 0x50]); // LDA $5001
    system_prog.extend([0x29, 0x08]); // AND #$08 (RDRF)
    system_prog.extend([0xF0, 0xF9]); // BEQ back to the poll
    system_prog.extend([0xAD, 0x00, 0x50]); // LDA $5000
    system_prog.extend([0x8D, 0x00, 0x50]); // STA $5000
    system_prog.extend([0x4C, 0x00, 0x80]); // JMP back

    let (acia, sent, incoming) = console_acia_for_test();
    let mut system = boot(&system_prog, Some(acia))?;
    incoming.borrow_mut().extend([b'a', b'b', b'c']);

    run_cycles(&mut system, 500)?;
    assert!(
        sent.borrow().as_slice() == b"abc",
        "echoed {:02X?}",
        sent.borrow()
    );
    Ok(())
}

#[test]
#[timeout(10000)]
fn timer_interrupt_keeps_the_stack_level() -> Result<()> {
    // Main program: arm T1 free running at period 100 with its
    // interrupt enabled, put a marker in A, unmask and spin. The
    // handler saves A, counts its entries and acknowledges the timer.
    let prog = [
        0xA9, 0xC0, 0x8D, 0x0E, 0x60, // IER: enable T1
        0xA9, 0x40, 0x8D, 0x0B, 0x60, // ACR: T1 free run
        0xA9, 0x64, 0x8D, 0x04, 0x60, // T1 latch low = 100
        0xA9, 0x00, 0x8D, 0x05, 0x60, // T1 high: counter loads, runs
        0xA9, 0x42, // LDA #$42
        0x58, // CLI
        0x4C, 0x17, 0x80, // JMP self
    ];
    let handler = [
        0x8D, 0x00, 0x02, // STA $0200
        0xEE, 0x01, 0x02, // INC $0201
        0x2C, 0x04, 0x60, // BIT $6004 acknowledges T1
        0x40, // RTI
    ];

    let mut rom = Rom::new();
    rom.load_bytes(&prog, 0x8000);
    rom.load_bytes(&handler, 0x9000);
    rom.load_bytes(&[0x00, 0x80], 0xFFFC);
    rom.load_bytes(&[0x00, 0x90], 0xFFFE);
    let mut system = System::new(rom, None)?;
    let s0 = system.cpu.s.0;

    run_cycles(&mut system, 2500)?;

    // Land in the spin loop before sampling the stack pointer.
    let mut settled = false;
    for _ in 0..200 {
        if system.cpu.pc.0 == 0x8017 {
            settled = true;
            break;
        }
        system.cpu.step()?;
    }
    assert!(settled, "never came back to the main loop");
    assert!(system.cpu.s.0 == s0, "stack pointer drifted");
    assert!(system.cpu.bus().read(0x0200)? == 0x42, "saved A wrong");
    let entries = system.cpu.bus().read(0x0201)?;
    assert!(entries >= 2, "handler only ran {entries} times");
    Ok(())
}

#[test]
fn rom_files_load_through_the_front_door() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("image.bin");
    fs::write(&path, [0xEA, 0x4C, 0x00, 0x80])?;

    let rom = load_rom(&path)?;
    assert!(rom.read(0x8000)? == 0xEA, "image not at the load address");
    assert!(rom.read(0x8003)? == 0x80, "image truncated");

    assert!(load_rom(dir.path().join("missing.bin")).is_err(), "missing file loaded");
    Ok(())
}
