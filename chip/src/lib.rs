//! `chip` defines the basic interfaces for the parts wired to the
//! breadboard bus. Every device must implement these in order to be
//! clocked together in a system emulation.

use color_eyre::eyre::Result;

/// Chip defines the trait for an 8 bit chip of the 65xx era.
pub trait Chip {
    /// `tick` is called to run a clock tick.
    ///
    /// # Errors
    /// If calling `tick` results in a lockup/illegal condition an error
    /// will be returned.
    fn tick(&mut self) -> Result<()>;
}

/// `Peripheral` is a [`Chip`] which additionally claims a contiguous
/// address range on the bus and may assert the shared IRQ line.
///
/// Register reads take `&mut self` because on this family reading a
/// register is frequently a side effect (timer and handshake interrupt
/// flags clear on access).
pub trait Peripheral: Chip {
    /// First address (inclusive) the device decodes.
    fn start_addr(&self) -> u16;

    /// Last address (inclusive) the device decodes.
    fn end_addr(&self) -> u16;

    /// Whether the device decodes the given address. The address arrives
    /// unmasked; devices subtract their base to find the register.
    fn handles_address(&self, addr: u16) -> bool {
        addr >= self.start_addr() && addr <= self.end_addr()
    }

    /// Read the register decoded at `addr`. Reads never fail; undecoded
    /// or unready state reads as zero.
    fn read(&mut self, addr: u16) -> u8;

    /// Write the register decoded at `addr`.
    ///
    /// # Errors
    /// Devices bridging to host I/O may fail the write if the host side
    /// is gone.
    fn write(&mut self, addr: u16, val: u8) -> Result<()>;

    /// Current level of the device's IRQ output. Level sensitive - the
    /// bus is responsible for edge conversion.
    fn has_irq(&self) -> bool;
}
