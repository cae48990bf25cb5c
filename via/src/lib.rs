//! `via` emulates the W65C22 Versatile Interface Adapter: two 8 bit
//! bidirectional ports with data direction registers, two 16 bit
//! countdown timers with reload latches, and a compact interrupt
//! flag/enable pair feeding the shared IRQ line.
//!
//! The shift register and the handshake lines are modeled only as far
//! as the interrupt flag clearing that port accesses cause; the second
//! timer's pulse counting mode holds the counter still.

use chip::{Chip, Peripheral};
use color_eyre::eyre::Result;

mod tests;

/// Base address the VIA decodes on the breadboard.
pub const VIA_BASE: u16 = 0x6000;

/// Number of registers the VIA decodes.
pub const VIA_LEN: u16 = 16;

// Register offsets from the base address.
const REG_ORB: u16 = 0x0;
const REG_ORA: u16 = 0x1;
const REG_DDRB: u16 = 0x2;
const REG_DDRA: u16 = 0x3;
const REG_T1C_L: u16 = 0x4;
const REG_T1C_H: u16 = 0x5;
const REG_T1L_L: u16 = 0x6;
const REG_T1L_H: u16 = 0x7;
const REG_T2C_L: u16 = 0x8;
const REG_T2C_H: u16 = 0x9;
const REG_SR: u16 = 0xA;
const REG_ACR: u16 = 0xB;
const REG_PCR: u16 = 0xC;
const REG_IFR: u16 = 0xD;
const REG_IER: u16 = 0xE;
// Offset 0xF mirrors ORA without the handshake flag clears.

/// IFR/IER bit for the CA2 handshake line.
pub const IRQ_CA2: u8 = 0x01;
/// IFR/IER bit for the CA1 handshake line.
pub const IRQ_CA1: u8 = 0x02;
/// IFR/IER bit for the shift register.
pub const IRQ_SR: u8 = 0x04;
/// IFR/IER bit for the CB2 handshake line.
pub const IRQ_CB2: u8 = 0x08;
/// IFR/IER bit for the CB1 handshake line.
pub const IRQ_CB1: u8 = 0x10;
/// IFR/IER bit for timer 2 expiry.
pub const IRQ_T2: u8 = 0x20;
/// IFR/IER bit for timer 1 expiry.
pub const IRQ_T1: u8 = 0x40;
/// IFR summary bit: set while any enabled flag is active.
pub const IRQ_ANY: u8 = 0x80;

// ACR bits controlling the timers.
const ACR_T1_FREE_RUN: u8 = 0x40;
const ACR_T2_PULSE_COUNT: u8 = 0x20;

/// The W65C22 device model.
#[must_use]
pub struct Via {
    base: u16,

    ora: u8,
    orb: u8,
    ddra: u8,
    ddrb: u8,

    t1_counter: u16,
    t1_latch_lo: u8,
    t1_latch_hi: u8,

    t2_counter: u16,
    t2_latch_lo: u8,
    t2_latch_hi: u8,

    sr: u8,
    acr: u8,
    pcr: u8,
    ifr: u8,
    ier: u8,
}

impl Via {
    /// new returns a `Via` decoding 16 registers at `base` with all
    /// ports set to input and both timers stopped.
    pub fn new(base: u16) -> Self {
        Self {
            base,
            ora: 0,
            orb: 0,
            ddra: 0,
            ddrb: 0,
            t1_counter: 0,
            t1_latch_lo: 0,
            t1_latch_hi: 0,
            t2_counter: 0,
            t2_latch_lo: 0,
            t2_latch_hi: 0,
            sr: 0,
            acr: 0,
            pcr: 0,
            ifr: 0,
            ier: 0,
        }
    }

    /// The current port A output value (output latch masked by DDR).
    #[must_use]
    pub fn port_a_output(&self) -> u8 {
        self.ora & self.ddra
    }

    /// The current port B output value (output latch masked by DDR).
    #[must_use]
    pub fn port_b_output(&self) -> u8 {
        self.orb & self.ddrb
    }

    /// Drive external levels onto port A. Only pins configured as
    /// inputs (DDR bit clear) take the new level; output latched bits
    /// are preserved.
    pub fn set_port_a_input(&mut self, val: u8) {
        self.ora = (self.ora & self.ddra) | (val & !self.ddra);
    }

    /// Drive external levels onto port B. Only pins configured as
    /// inputs (DDR bit clear) take the new level; output latched bits
    /// are preserved.
    pub fn set_port_b_input(&mut self, val: u8) {
        self.orb = (self.orb & self.ddrb) | (val & !self.ddrb);
    }

    fn t1_latch(&self) -> u16 {
        (u16::from(self.t1_latch_hi) << 8) | u16::from(self.t1_latch_lo)
    }

    fn t2_latch(&self) -> u16 {
        (u16::from(self.t2_latch_hi) << 8) | u16::from(self.t2_latch_lo)
    }

    // Recompute the IFR summary bit from the enabled active flags.
    fn update_summary(&mut self) {
        if self.ifr & self.ier & 0x7F != 0 {
            self.ifr |= IRQ_ANY;
        } else {
            self.ifr &= !IRQ_ANY;
        }
    }

    fn clear_flags(&mut self, bits: u8) {
        self.ifr &= !(bits & 0x7F);
        self.update_summary();
    }

    fn set_flags(&mut self, bits: u8) {
        self.ifr |= bits & 0x7F;
        self.update_summary();
    }
}

impl Chip for Via {
    // One clock tick: run both timers and refresh the IRQ summary.
    fn tick(&mut self) -> Result<()> {
        if self.t1_counter > 0 {
            self.t1_counter -= 1;
            if self.t1_counter == 0 {
                self.set_flags(IRQ_T1);
                if self.acr & ACR_T1_FREE_RUN != 0 {
                    self.t1_counter = self.t1_latch();
                }
            }
        }

        // T2 only counts clock cycles in interval mode; pulse counting
        // holds the counter.
        if self.acr & ACR_T2_PULSE_COUNT == 0 && self.t2_counter > 0 {
            self.t2_counter -= 1;
            if self.t2_counter == 0 {
                self.set_flags(IRQ_T2);
            }
        }

        self.update_summary();
        Ok(())
    }
}

impl Peripheral for Via {
    fn start_addr(&self) -> u16 {
        self.base
    }

    fn end_addr(&self) -> u16 {
        self.base + (VIA_LEN - 1)
    }

    fn read(&mut self, addr: u16) -> u8 {
        match (addr - self.base) & 0xF {
            REG_ORB => self.orb & self.ddrb,
            REG_ORA => {
                self.clear_flags(IRQ_CA1 | IRQ_CA2);
                self.ora & self.ddra
            }
            REG_DDRB => self.ddrb,
            REG_DDRA => self.ddra,
            REG_T1C_L => {
                self.clear_flags(IRQ_T1);
                #[allow(clippy::cast_possible_truncation)]
                let lo = self.t1_counter as u8;
                lo
            }
            REG_T1C_H => (self.t1_counter >> 8) as u8,
            REG_T1L_L => self.t1_latch_lo,
            REG_T1L_H => self.t1_latch_hi,
            REG_T2C_L => {
                self.clear_flags(IRQ_T2);
                #[allow(clippy::cast_possible_truncation)]
                let lo = self.t2_counter as u8;
                lo
            }
            REG_T2C_H => (self.t2_counter >> 8) as u8,
            REG_SR => self.sr,
            REG_ACR => self.acr,
            REG_PCR => self.pcr,
            REG_IFR => self.ifr,
            REG_IER => self.ier | 0x80,
            _ => self.ora & self.ddra, // REG_ORA_NH: no handshake clears
        }
    }

    fn write(&mut self, addr: u16, val: u8) -> Result<()> {
        match (addr - self.base) & 0xF {
            REG_ORB => {
                self.clear_flags(IRQ_CB1 | IRQ_CB2);
                self.orb = (self.orb & !self.ddrb) | (val & self.ddrb);
            }
            REG_ORA => {
                self.clear_flags(IRQ_CA1 | IRQ_CA2);
                self.ora = (self.ora & !self.ddra) | (val & self.ddra);
            }
            REG_DDRB => self.ddrb = val,
            REG_DDRA => self.ddra = val,
            // Writing the T1 counter low byte only stages the latch; the
            // counter itself transfers on the high byte write.
            REG_T1C_L | REG_T1L_L => self.t1_latch_lo = val,
            REG_T1C_H => {
                self.t1_latch_hi = val;
                self.t1_counter = self.t1_latch();
                self.clear_flags(IRQ_T1);
            }
            REG_T1L_H => {
                self.t1_latch_hi = val;
                self.clear_flags(IRQ_T1);
            }
            REG_T2C_L => self.t2_latch_lo = val,
            REG_T2C_H => {
                self.t2_latch_hi = val;
                self.t2_counter = self.t2_latch();
                self.clear_flags(IRQ_T2);
            }
            REG_SR => self.sr = val,
            REG_ACR => self.acr = val,
            REG_PCR => self.pcr = val,
            // IFR writes clear the flags set in the value.
            REG_IFR => self.clear_flags(val),
            // IER bit 7 selects whether the written mask sets or clears.
            REG_IER => {
                if val & 0x80 != 0 {
                    self.ier |= val & 0x7F;
                } else {
                    self.ier &= !(val & 0x7F);
                }
                self.update_summary();
            }
            _ => {
                // REG_ORA_NH: same merge as ORA without handshake clears.
                self.ora = (self.ora & !self.ddra) | (val & self.ddra);
            }
        }
        Ok(())
    }

    fn has_irq(&self) -> bool {
        self.ifr & IRQ_ANY != 0
    }
}
