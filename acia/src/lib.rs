//! `acia` emulates the W65C51 Asynchronous Communications Interface
//! Adapter at character granularity: a bounded receive queue fed from a
//! pluggable byte source and a transmit path handing bytes to a
//! pluggable sink. Baud rate, parity and stop bit configuration are
//! stored but cosmetic - the host link is always ready, so the transmit
//! data register always reads as empty.

use std::collections::VecDeque;
use std::io::{self, Read, Stdout, Write};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::thread;

use chip::{Chip, Peripheral};
use color_eyre::eyre::Result;
use log::debug;
use ringbuffer::{AllocRingBuffer, RingBuffer, RingBufferRead, RingBufferWrite};


/// Base address the ACIA decodes on the breadboard.
pub const ACIA_BASE: u16 = 0x5000;

/// Number of registers the ACIA decodes.
pub const ACIA_LEN: u16 = 4;

// Register offsets from the base address.
const REG_DATA: u16 = 0x0;
const REG_STATUS: u16 = 0x1; // read status / write programmed reset
const REG_COMMAND: u16 = 0x2;
// Offset 0x3 is the control register.

/// Status bit: interrupt asserted.
pub const ST_IRQ: u8 = 0x80;
/// Status bit: transmit data register empty. Always set here since the
/// sink consumes bytes immediately.
pub const ST_TDRE: u8 = 0x10;
/// Status bit: receive data register full.
pub const ST_RDRF: u8 = 0x08;
/// Status bit: receiver overrun.
pub const ST_OVRN: u8 = 0x04;

// Command register bit 7 clear enables the receive interrupt.
const CMD_IRQ_DISABLE: u8 = 0x80;

// Bytes the receive queue holds before overrunning.
const RX_CAPACITY: usize = 256;

/// `ByteSink` receives every byte the emulated program transmits.
pub trait ByteSink {
    /// Consume one transmitted byte.
    ///
    /// # Errors
    /// Fails if the host side of the link is gone.
    fn send(&mut self, byte: u8) -> Result<()>;
}

/// `ByteSource` supplies bytes for the receive queue. Polled once per
/// clock tick; must never block.
pub trait ByteSource {
    /// The next pending byte, or `None` when nothing has arrived.
    fn recv(&mut self) -> Option<u8>;
}

/// `NullSink` discards everything. The default when no host link is
/// attached.
pub struct NullSink;

impl ByteSink for NullSink {
    fn send(&mut self, _byte: u8) -> Result<()> {
        Ok(())
    }
}

impl ByteSink for std::rc::Rc<std::cell::RefCell<Vec<u8>>> {
    fn send(&mut self, byte: u8) -> Result<()> {
        self.borrow_mut().push(byte);
        Ok(())
    }
}

impl ByteSource for std::rc::Rc<std::cell::RefCell<VecDeque<u8>>> {
    fn recv(&mut self) -> Option<u8> {
        self.borrow_mut().pop_front()
    }
}

/// `ConsoleSink` bridges transmitted bytes to a host terminal, applying
/// the control character policy: LF prints a newline, CR prints CR LF,
/// backspace and bell pass through, printable ASCII prints literally and
/// everything else is dropped. Output is flushed per byte so the user
/// sees live output.
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<Stdout> {
    /// A sink writing to the host stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsoleSink<W> {
    /// A sink writing to the given writer.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// The wrapped writer, for inspecting test output.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ByteSink for ConsoleSink<W> {
    fn send(&mut self, byte: u8) -> Result<()> {
        match byte {
            0x0A => self.out.write_all(b"\n")?,
            0x0D => self.out.write_all(b"\r\n")?,
            0x07 | 0x08 => self.out.write_all(&[byte])?,
            0x20..=0x7E => self.out.write_all(&[byte])?,
            _ => return Ok(()),
        }
        self.out.flush()?;
        Ok(())
    }
}

/// `StdinSource` feeds host stdin into the receive path without
/// blocking the run loop: a reader thread moves bytes onto a channel
/// the clock tick drains.
pub struct StdinSource {
    rx: Receiver<u8>,
}

impl StdinSource {
    /// Spawn the reader thread and return the source. The thread exits
    /// when stdin closes or the source is dropped.
    #[must_use]
    pub fn spawn() -> Self {
        let (tx, rx) = channel();
        thread::spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut buf = [0u8; 64];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        for b in &buf[..n] {
                            if tx.send(*b).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            debug!("stdin closed, reader thread exiting");
        });
        Self { rx }
    }
}

impl ByteSource for StdinSource {
    fn recv(&mut self) -> Option<u8> {
        match self.rx.try_recv() {
            Ok(b) => Some(b),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

/// The W65C51 device model.
#[must_use]
pub struct Acia {
    base: u16,

    status: u8,
    command: u8,
    control: u8,

    rx: AllocRingBuffer<u8>,
    sink: Box<dyn ByteSink>,
    source: Option<Box<dyn ByteSource>>,
}

impl Acia {
    /// new returns an `Acia` decoding 4 registers at `base` with no
    /// host link attached: transmits are discarded and nothing is ever
    /// received. Use the builders to attach transports.
    pub fn new(base: u16) -> Self {
        Self {
            base,
            status: ST_TDRE,
            command: 0,
            control: 0,
            rx: AllocRingBuffer::with_capacity(RX_CAPACITY),
            sink: Box::new(NullSink),
            source: None,
        }
    }

    /// `sink` is a builder attaching the transmit side of the host link.
    pub fn sink(mut self, sink: Box<dyn ByteSink>) -> Self {
        self.sink = sink;
        self
    }

    /// `source` is a builder attaching the receive side of the host
    /// link.
    pub fn source(mut self, source: Option<Box<dyn ByteSource>>) -> Self {
        self.source = source;
        self
    }

    // Programmed reset: same state as construction for the status and
    // receive queue. Command/control are the program's problem to
    // rewrite.
    fn reset(&mut self) {
        self.status = ST_TDRE;
        self.rx = AllocRingBuffer::with_capacity(RX_CAPACITY);
    }

    // Queue one received byte, overrunning when full.
    fn push_rx(&mut self, byte: u8) {
        if self.rx.is_full() {
            self.status |= ST_OVRN;
            return;
        }
        self.rx.push(byte);
        self.status |= ST_RDRF;
    }
}

impl Chip for Acia {
    // One clock tick: pump whatever the host has delivered into the
    // receive queue.
    fn tick(&mut self) -> Result<()> {
        if let Some(mut source) = self.source.take() {
            while let Some(b) = source.recv() {
                self.push_rx(b);
            }
            self.source = Some(source);
        }
        if !self.rx.is_empty() {
            self.status |= ST_RDRF;
        }
        Ok(())
    }
}

impl Peripheral for Acia {
    fn start_addr(&self) -> u16 {
        self.base
    }

    fn end_addr(&self) -> u16 {
        self.base + (ACIA_LEN - 1)
    }

    fn read(&mut self, addr: u16) -> u8 {
        match (addr - self.base) & 0x3 {
            REG_DATA => {
                let Some(b) = self.rx.dequeue() else {
                    return 0;
                };
                if self.rx.is_empty() {
                    self.status &= !(ST_RDRF | ST_OVRN);
                }
                b
            }
            REG_STATUS => {
                let mut st = self.status;
                if self.has_irq() {
                    st |= ST_IRQ;
                }
                st
            }
            REG_COMMAND => self.command,
            _ => self.control,
        }
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<()> {
        match (addr - self.base) & 0x3 {
            REG_DATA => {
                self.sink.send(val)?;
                self.status |= ST_TDRE;
            }
            REG_STATUS => self.reset(),
            REG_COMMAND => self.command = val,
            _ => self.control = val,
        }
        Ok(())
    }

    fn has_irq(&self) -> bool {
        self.command & CMD_IRQ_DISABLE == 0 && !self.rx.is_empty()
    }
}
