//! cpu defines a W65C02S which is clock accurate to the supporting
//! environment: every instruction occupies exactly its declared cycle
//! count between opcode fetches, and the bus is ticked once per cycle so
//! peripheral timers stay in lock step with execution.

use std::num::Wrapping;

use bus::Bus;
use color_eyre::eyre::{eyre, Result};
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

mod lookup;
pub use crate::lookup::*;


/// `AddressMode` defines the W65C02S addressing modes.
#[derive(Clone, Copy, Display, Debug, Default, PartialEq, Eq, Hash, EnumString)]
pub enum AddressMode {
    /// `Immediate` mode uses the constant following the opcode to perform the operation.
    /// Example: LDA #04 loads 0x04 into A.
    #[default]
    Immediate,

    /// `ZeroPage` references the first 256 bytes.
    /// Example: LDA 0F would load the value from 0x0F into A.
    ZeroPage,

    /// `ZeroPageX` references the zero page with addition from the X register.
    /// Overflow simply wraps within the page.
    ZeroPageX,

    /// `ZeroPageY` references the zero page with addition from the Y register.
    /// Overflow simply wraps within the page.
    ZeroPageY,

    /// `IndirectX` adds X to the given zero page address and uses that
    /// location and the following one (wrapping in page zero) as a pointer
    /// to the final address.
    IndirectX,

    /// `IndirectY` uses the given zero page address and the following one
    /// as a pointer and then adds Y to form the final address.
    IndirectY,

    /// `ZeroPageIndirect` uses the given zero page address and the
    /// following one as a pointer with no index added. CMOS addition.
    ZeroPageIndirect,

    /// `Absolute` references a direct 16 bit constant as an address.
    /// Example: LDA D000 loads A from 0xD000
    Absolute,

    /// `AbsoluteX` references a direct 16 bit constant plus X as the address.
    AbsoluteX,

    /// `AbsoluteY` references a direct 16 bit constant plus Y as the address.
    AbsoluteY,

    /// `AbsoluteIndirect` loads a pointer from the given address and
    /// dereferences it (JMP only). The NMOS page wrap bug is not carried:
    /// the pointer high byte comes from the next address even across a
    /// page boundary.
    AbsoluteIndirect,

    /// `AbsoluteIndirectX` adds X to the 16 bit constant and dereferences
    /// the result as a pointer (JMP only). CMOS addition.
    AbsoluteIndirectX,

    /// `ZeroPageRelative` takes a zero page address to test and a signed
    /// branch offset (BBR/BBS only). CMOS addition.
    ZeroPageRelative,

    /// `Relative` adds the signed argument to the PC for branching.
    Relative,

    /// `Implied` takes no arguments and operates on registers directly.
    Implied,

    /// `NopImplied` is the single cycle reserved opcode space on the
    /// WDC part: no arguments, one cycle, no effects.
    NopImplied,

    /// `NopAbsolute` is the reserved 0x5C slot: two operand bytes and an
    /// eight cycle burn with no effects.
    NopAbsolute,
}

impl AddressMode {
    /// The number of operand bytes the mode consumes after the opcode.
    #[must_use]
    pub const fn operand_bytes(self) -> u16 {
        match self {
            AddressMode::Implied | AddressMode::NopImplied => 0,
            AddressMode::Immediate
            | AddressMode::ZeroPage
            | AddressMode::ZeroPageX
            | AddressMode::ZeroPageY
            | AddressMode::IndirectX
            | AddressMode::IndirectY
            | AddressMode::ZeroPageIndirect
            | AddressMode::Relative => 1,
            AddressMode::Absolute
            | AddressMode::AbsoluteX
            | AddressMode::AbsoluteY
            | AddressMode::AbsoluteIndirect
            | AddressMode::AbsoluteIndirectX
            | AddressMode::ZeroPageRelative
            | AddressMode::NopAbsolute => 2,
        }
    }
}

/// `Opcode` defines the W65C02S instruction set. Reserved byte values
/// all decode to NOPs of documented width so the table is total.
#[derive(Clone, Copy, Debug, Display, Default, PartialEq, Eq, Hash, EnumIter, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Opcode {
    /// Add with carry A with the value at the operand address. Honors
    /// decimal mode.
    ADC,

    /// Bitwise and operation.
    AND,

    /// Arithmetic shift left with carry set from the bit shifted out.
    ASL,

    /// Branch if the zero page bit selected by the opcode is clear.
    BBR,

    /// Branch if the zero page bit selected by the opcode is set.
    BBS,

    /// Branch if carry is clear.
    BCC,

    /// Branch if carry is set.
    BCS,

    /// Branch if equal (Z is set).
    BEQ,

    /// Bit test: Z from A AND value, N/V from bits 7/6 of the value.
    /// The immediate form only touches Z.
    BIT,

    /// Branch on minus (N is set).
    BMI,

    /// Branch if not equal (Z is clear).
    BNE,

    /// Branch on plus (N is clear).
    BPL,

    /// Branch always.
    BRA,

    /// Break execution. Same as an IRQ but software defined. B is set in
    /// the pushed status to indicate the source.
    #[default]
    BRK,

    /// Branch if overflow (V) is clear.
    BVC,

    /// Branch if overflow (V) is set.
    BVS,

    /// Clear the C flag.
    CLC,

    /// Clear the D flag.
    CLD,

    /// Clear the I flag.
    CLI,

    /// Clear the V flag.
    CLV,

    /// Compare value with A setting C/Z/N from the difference.
    CMP,

    /// Compare value with X setting C/Z/N from the difference.
    CPX,

    /// Compare value with Y setting C/Z/N from the difference.
    CPY,

    /// Decrement the value at the operand address (or A).
    DEC,

    /// Decrement the X register.
    DEX,

    /// Decrement the Y register.
    DEY,

    /// Exclusive OR A with the value at the operand address.
    EOR,

    /// Increment the value at the operand address (or A).
    INC,

    /// Increment the X register.
    INX,

    /// Increment the Y register.
    INY,

    /// Jump to the operand address.
    JMP,

    /// Jump to a subroutine, pushing the return point minus one so RTS
    /// can undo it.
    JSR,

    /// Load the A register, setting Z/N.
    LDA,

    /// Load the X register, setting Z/N.
    LDX,

    /// Load the Y register, setting Z/N.
    LDY,

    /// Logical shift right with carry set from bit 0.
    LSR,

    /// No operation. Burns the cycles and operand bytes of its slot.
    NOP,

    /// OR A with the value at the operand address.
    ORA,

    /// Push A onto the stack.
    PHA,

    /// Push P onto the stack with B and the spare bit forced on.
    PHP,

    /// Push X onto the stack.
    PHX,

    /// Push Y onto the stack.
    PHY,

    /// Pull A from the stack, setting Z/N.
    PLA,

    /// Pull P from the stack, clearing B and forcing the spare bit.
    PLP,

    /// Pull X from the stack, setting Z/N.
    PLX,

    /// Pull Y from the stack, setting Z/N.
    PLY,

    /// Reset (clear) the zero page bit selected by the opcode.
    RMB,

    /// Rotate left through the carry flag.
    ROL,

    /// Rotate right through the carry flag.
    ROR,

    /// Return from interrupt: pull P (B cleared, spare forced) then PC.
    RTI,

    /// Return from subroutine: pull PC and add one.
    RTS,

    /// Subtract with carry the value at the operand address from A.
    /// Honors decimal mode.
    SBC,

    /// Set the C flag.
    SEC,

    /// Set the D flag.
    SED,

    /// Set the I flag.
    SEI,

    /// Set the zero page bit selected by the opcode.
    SMB,

    /// Store the A register at the operand address.
    STA,

    /// Stop the clock: the CPU halts until reset.
    STP,

    /// Store the X register at the operand address.
    STX,

    /// Store the Y register at the operand address.
    STY,

    /// Store zero at the operand address.
    STZ,

    /// Load X from A, setting Z/N.
    TAX,

    /// Load Y from A, setting Z/N.
    TAY,

    /// Test and reset bits: Z from A AND value, then clear A's bits in
    /// the value.
    TRB,

    /// Test and set bits: Z from A AND value, then set A's bits in the
    /// value.
    TSB,

    /// Load X from S, setting Z/N.
    TSX,

    /// Load A from X, setting Z/N.
    TXA,

    /// Load S from X. No flags are set from S loads.
    TXS,

    /// Load A from Y, setting Z/N.
    TYA,

    /// Wait for interrupt: the CPU idles until any interrupt is pending.
    WAI,
}

/// `Operation` is the decoded form of one opcode byte: the instruction,
/// its addressing mode and the base cycle count the slot declares.
#[derive(Debug, Default, Copy, Clone)]
pub struct Operation {
    /// The instruction, such as ADC or LDA.
    pub op: Opcode,
    /// The addressing mode of this encoding.
    pub mode: AddressMode,
    /// Base cycles the encoding consumes. Taken branches burn one more.
    pub cycles: u8,
}

/// `NMI_VECTOR` is the location in memory holding the pointer the CPU
/// jumps through for NMI interrupts.
pub const NMI_VECTOR: u16 = 0xFFFA;

/// `RESET_VECTOR` is the location in memory holding the pointer the CPU
/// jumps through on reset.
pub const RESET_VECTOR: u16 = 0xFFFC;

/// `IRQ_VECTOR` is the location in memory holding the pointer the CPU
/// jumps through for IRQ and BRK.
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Base of the hardware stack page.
pub const STACK_START: u16 = 0x0100;

// Cycles an interrupt sequence (RESET/NMI/IRQ) occupies.
const INTERRUPT_CYCLES: u8 = 7;

/// N flag: bit 7 of the last result.
pub const P_NEGATIVE: u8 = 0x80;
/// V flag: signed overflow.
pub const P_OVERFLOW: u8 = 0x40;
/// The spare status bit. Always observed set when pushed.
pub const P_S1: u8 = 0x20;
/// B flag: set in the pushed status for BRK, clear for hardware
/// interrupts. Never meaningful in the live register.
pub const P_B: u8 = 0x10;
/// D flag: decimal mode for ADC/SBC.
pub const P_DECIMAL: u8 = 0x08;
/// I flag: IRQ mask.
pub const P_INTERRUPT: u8 = 0x04;
/// Z flag: last result was zero.
pub const P_ZERO: u8 = 0x02;
/// C flag: carry/not-borrow.
pub const P_CARRY: u8 = 0x01;

// Value the status register resets to: spare and B on, interrupts
// masked, decimal off.
const P_RESET: u8 = P_S1 | P_B | P_INTERRUPT;

/// `Flags` is the 8 bit status register.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    /// Build from a raw byte, stored verbatim.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// The raw byte including the spare bit as stored.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self.0
    }

    /// Whether every bit in `mask` is set.
    #[must_use]
    pub const fn get(self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    /// Set or clear every bit in `mask`.
    pub fn set(&mut self, mask: u8, on: bool) {
        if on {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }
}

/// `CPUError` defines specific conditions where `step` may return an
/// error. Use this to determine specific internal issues.
#[derive(Error, Debug)]
pub enum CPUError {
    /// The CPU previously executed STP and only a reset will revive it.
    #[error("Halted condition opcode: {op:02X}")]
    Halted {
        /// The opcode which triggered the current halted state.
        op: u8,
    },
}

/// The W65C02S engine. Owns the bus it drives; front ends keep their
/// own handles on the peripherals they render.
pub struct Cpu {
    /// Accumulator register
    pub a: Wrapping<u8>,

    /// X register
    pub x: Wrapping<u8>,

    /// Y register
    pub y: Wrapping<u8>,

    /// Stack pointer
    pub s: Wrapping<u8>,

    /// Status register
    pub p: Flags,

    /// Program counter
    pub pc: Wrapping<u16>,

    bus: Bus,

    // Residual cycles of the in-flight instruction. No fetch happens
    // while this is nonzero.
    pending_cycles: u8,

    // Interrupt latches, priority RESET > NMI > IRQ.
    reset_pending: bool,
    nmi_pending: bool,
    nmi_last_high: bool,
    irq_pending: bool,

    // WAI parked the CPU until an interrupt is latched.
    waiting: bool,

    // STP parked the CPU until reset.
    halted: bool,
    halt_opcode: u8,

    // Whether step() ticks the bus itself. Test harnesses that drive
    // the bus manually turn this off.
    auto_tick: bool,

    // Total number of clock cycles since power on.
    clocks: usize,
}

impl Cpu {
    /// Build a new `Cpu` over the given bus. Nothing runs until
    /// `power_on` establishes the reset state.
    #[must_use]
    pub fn new(bus: Bus) -> Self {
        Self {
            a: Wrapping(0x00),
            x: Wrapping(0x00),
            y: Wrapping(0x00),
            s: Wrapping(0x00),
            p: Flags::from_byte(P_RESET),
            pc: Wrapping(0x0000),
            bus,
            pending_cycles: 0,
            reset_pending: false,
            nmi_pending: false,
            nmi_last_high: false,
            irq_pending: false,
            waiting: false,
            halted: false,
            halt_opcode: 0x00,
            auto_tick: true,
            clocks: 0,
        }
    }

    /// The bus the CPU drives.
    pub fn bus(&mut self) -> &mut Bus {
        &mut self.bus
    }

    /// Enable or disable the automatic bus tick at the end of `step`.
    /// On by default; harnesses that tick the bus themselves turn it
    /// off.
    pub fn set_auto_tick(&mut self, on: bool) {
        self.auto_tick = on;
    }

    /// Total clock cycles executed since power on.
    #[must_use]
    pub fn clocks(&self) -> usize {
        self.clocks
    }

    /// Whether the CPU is parked in the STP state.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Whether the CPU is parked in the WAI state.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Latch an IRQ request. Normally fed by the bus edge detection.
    pub fn request_irq(&mut self) {
        self.irq_pending = true;
    }

    /// Latch an NMI request directly.
    pub fn request_nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Sample the NMI line level; a low to high transition latches an
    /// NMI request.
    pub fn set_nmi_line(&mut self, high: bool) {
        if high && !self.nmi_last_high {
            self.nmi_pending = true;
        }
        self.nmi_last_high = high;
    }

    /// Request a reset, serviced at the next instruction boundary with
    /// the full 7 cycle sequence.
    pub fn request_reset(&mut self) {
        self.reset_pending = true;
    }

    /// `power_on` performs the reset sequence synchronously with no
    /// cycles consumed. Used at boot before the run loop starts.
    ///
    /// # Errors
    /// Reading the reset vector can fail if the bus is miswired.
    pub fn power_on(&mut self) -> Result<()> {
        self.reset_sequence(true)
    }

    // The RESET sequence. Hardware pushes nothing: the stack pointer
    // just walks down 3 as if PC and P had been pushed.
    fn reset_sequence(&mut self, immediate: bool) -> Result<()> {
        self.s -= 3;
        self.a = Wrapping(0x00);
        self.x = Wrapping(0x00);
        self.y = Wrapping(0x00);
        self.p = Flags::from_byte(P_RESET);
        self.pc = Wrapping(self.bus.read_word(RESET_VECTOR)?);
        self.halted = false;
        self.halt_opcode = 0x00;
        self.waiting = false;
        self.nmi_pending = false;
        self.irq_pending = false;
        self.pending_cycles = if immediate { 0 } else { INTERRUPT_CYCLES - 1 };
        Ok(())
    }

    // NMI/IRQ entry: push PC and status (B clear, spare set), mask
    // further IRQs and jump through the vector.
    fn interrupt(&mut self, vector: u16) -> Result<()> {
        self.push_word(self.pc.0)?;
        self.push_stack((self.p.to_byte() | P_S1) & !P_B)?;
        self.p.set(P_INTERRUPT, true);
        self.pc = Wrapping(self.bus.read_word(vector)?);
        self.pending_cycles = INTERRUPT_CYCLES - 1;
        Ok(())
    }

    /// `step` runs one clock cycle: either a residual cycle of the
    /// in-flight instruction, an interrupt entry, or an opcode fetch
    /// which executes the whole instruction and schedules its remaining
    /// cycles. Unless auto tick is off the bus is ticked once at the
    /// end and any rising IRQ edge latched.
    ///
    /// # Errors
    /// Bus faults bubble out. Stepping a halted CPU with no reset
    /// pending fails with [`CPUError::Halted`].
    pub fn step(&mut self) -> Result<()> {
        self.step_inner()?;
        if self.auto_tick {
            self.tick_bus()?;
        }
        Ok(())
    }

    /// Tick the bus once and latch any rising IRQ edge. Called from
    /// `step` unless auto tick is off.
    ///
    /// # Errors
    /// Peripheral faults bubble out.
    pub fn tick_bus(&mut self) -> Result<()> {
        if self.bus.tick()? {
            self.irq_pending = true;
        }
        Ok(())
    }

    fn step_inner(&mut self) -> Result<()> {
        self.clocks += 1;

        if self.halted {
            if self.pending_cycles > 0 {
                self.pending_cycles -= 1;
                return Ok(());
            }
            if self.reset_pending {
                self.reset_pending = false;
                return self.reset_sequence(false);
            }
            return Err(eyre!(CPUError::Halted {
                op: self.halt_opcode,
            }));
        }

        if self.waiting {
            if !(self.reset_pending || self.nmi_pending || self.irq_pending) {
                return Ok(());
            }
            // Any latched interrupt resumes the CPU, even one the I flag
            // will then mask at the boundary below.
            self.waiting = false;
            self.pending_cycles = 0;
        }

        if self.pending_cycles > 0 {
            self.pending_cycles -= 1;
            return Ok(());
        }

        if self.reset_pending {
            self.reset_pending = false;
            return self.reset_sequence(false);
        }
        if self.nmi_pending {
            self.nmi_pending = false;
            return self.interrupt(NMI_VECTOR);
        }
        if self.irq_pending && !self.p.get(P_INTERRUPT) {
            self.irq_pending = false;
            return self.interrupt(IRQ_VECTOR);
        }

        let raw = self.bus.read(self.pc.0)?;
        self.pc += 1;
        let op = opcode_op(raw);
        // The fetch itself is the first of the declared cycles.
        self.pending_cycles = op.cycles.saturating_sub(1);
        self.execute(raw, op)
    }

    // load_register takes the val and inserts it into the given
    // register, then sets Z and N from the new value.
    // NOTE: Not a Self method as that would double borrow when the
    //       register is a field; the pieces are passed explicitly.
    fn load_register(p: &mut Flags, reg: &mut Wrapping<u8>, val: u8) {
        *reg = Wrapping(val);
        Self::zero_check(p, val);
        Self::negative_check(p, val);
    }

    // zero_check sets the Z flag based on the value.
    fn zero_check(p: &mut Flags, val: u8) {
        p.set(P_ZERO, val == 0);
    }

    // negative_check sets the N flag based on the value.
    fn negative_check(p: &mut Flags, val: u8) {
        p.set(P_NEGATIVE, val & P_NEGATIVE != 0);
    }

    // overflow_check sets the V flag if the ALU operation caused a twos
    // complement sign change.
    fn overflow_check(p: &mut Flags, reg: u8, arg: u8, result: u8) {
        p.set(P_OVERFLOW, (reg ^ result) & (arg ^ result) & 0x80 != 0);
    }

    // push_stack writes the value at the stack pointer and moves it
    // down.
    fn push_stack(&mut self, val: u8) -> Result<()> {
        self.bus.write(STACK_START + u16::from(self.s.0), val)?;
        self.s -= 1;
        Ok(())
    }

    // pop_stack moves the stack pointer up and reads the value there.
    fn pop_stack(&mut self) -> Result<u8> {
        self.s += 1;
        self.bus.read(STACK_START + u16::from(self.s.0))
    }

    // 16 bit push: high byte first, then low.
    fn push_word(&mut self, val: u16) -> Result<()> {
        #[allow(clippy::cast_possible_truncation)]
        self.push_stack((val >> 8) as u8)?;
        #[allow(clippy::cast_possible_truncation)]
        self.push_stack((val & 0xFF) as u8)?;
        Ok(())
    }

    // 16 bit pull: low byte first, then high.
    fn pull_word(&mut self) -> Result<u16> {
        let lo = self.pop_stack()?;
        let hi = self.pop_stack()?;
        Ok((u16::from(hi) << 8) | u16::from(lo))
    }

    // operand_addr computes the effective address for the mode,
    // consuming the operand bytes. Implied and the branch modes never
    // come through here.
    fn operand_addr(&mut self, mode: AddressMode) -> Result<u16> {
        match mode {
            AddressMode::Immediate => {
                let addr = self.pc.0;
                self.pc += 1;
                Ok(addr)
            }
            AddressMode::ZeroPage => {
                let zp = self.bus.read(self.pc.0)?;
                self.pc += 1;
                Ok(u16::from(zp))
            }
            AddressMode::ZeroPageX => {
                let zp = Wrapping(self.bus.read(self.pc.0)?);
                self.pc += 1;
                Ok(u16::from((zp + self.x).0))
            }
            AddressMode::ZeroPageY => {
                let zp = Wrapping(self.bus.read(self.pc.0)?);
                self.pc += 1;
                Ok(u16::from((zp + self.y).0))
            }
            AddressMode::IndirectX => {
                let zp = Wrapping(self.bus.read(self.pc.0)?);
                self.pc += 1;
                let ptr = zp + self.x;
                self.read_zp_pointer(ptr.0)
            }
            AddressMode::IndirectY => {
                let zp = self.bus.read(self.pc.0)?;
                self.pc += 1;
                let base = self.read_zp_pointer(zp)?;
                Ok(base.wrapping_add(u16::from(self.y.0)))
            }
            AddressMode::ZeroPageIndirect => {
                let zp = self.bus.read(self.pc.0)?;
                self.pc += 1;
                self.read_zp_pointer(zp)
            }
            AddressMode::Absolute => {
                let addr = self.bus.read_word(self.pc.0)?;
                self.pc += 2;
                Ok(addr)
            }
            AddressMode::AbsoluteX => {
                let addr = self.bus.read_word(self.pc.0)?;
                self.pc += 2;
                Ok(addr.wrapping_add(u16::from(self.x.0)))
            }
            AddressMode::AbsoluteY => {
                let addr = self.bus.read_word(self.pc.0)?;
                self.pc += 2;
                Ok(addr.wrapping_add(u16::from(self.y.0)))
            }
            AddressMode::AbsoluteIndirect => {
                let ptr = self.bus.read_word(self.pc.0)?;
                self.pc += 2;
                self.bus.read_word(ptr)
            }
            AddressMode::AbsoluteIndirectX => {
                let ptr = self.bus.read_word(self.pc.0)?;
                self.pc += 2;
                self.bus.read_word(ptr.wrapping_add(u16::from(self.x.0)))
            }
            AddressMode::Implied
            | AddressMode::Relative
            | AddressMode::ZeroPageRelative
            | AddressMode::NopImplied
            | AddressMode::NopAbsolute => {
                Err(eyre!("operand_addr invalid for mode {mode}"))
            }
        }
    }

    // Dereference a zero page pointer whose second byte wraps within
    // page zero.
    fn read_zp_pointer(&mut self, zp: u8) -> Result<u16> {
        let lo = self.bus.read(u16::from(zp))?;
        let hi = self.bus.read(u16::from(zp.wrapping_add(1)))?;
        Ok((u16::from(hi) << 8) | u16::from(lo))
    }

    // Read the operand value for the mode.
    fn load_operand(&mut self, mode: AddressMode) -> Result<u8> {
        let addr = self.operand_addr(mode)?;
        self.bus.read(addr)
    }

    // Shared branch tail: consume the offset, and when taken burn the
    // extra cycle and move the PC.
    fn branch_on(&mut self, cond: bool) -> Result<()> {
        let offset = self.bus.read(self.pc.0)?;
        self.pc += 1;
        if cond {
            self.pending_cycles += 1;
            #[allow(clippy::cast_possible_wrap)]
            let delta = i16::from(offset as i8);
            #[allow(clippy::cast_sign_loss)]
            let delta = delta as u16;
            self.pc += delta;
        }
        Ok(())
    }

    fn execute(&mut self, raw: u8, op: Operation) -> Result<()> {
        match op.op {
            Opcode::LDA => {
                let val = self.load_operand(op.mode)?;
                Self::load_register(&mut self.p, &mut self.a, val);
            }
            Opcode::LDX => {
                let val = self.load_operand(op.mode)?;
                Self::load_register(&mut self.p, &mut self.x, val);
            }
            Opcode::LDY => {
                let val = self.load_operand(op.mode)?;
                Self::load_register(&mut self.p, &mut self.y, val);
            }
            Opcode::STA => {
                let addr = self.operand_addr(op.mode)?;
                self.bus.write(addr, self.a.0)?;
            }
            Opcode::STX => {
                let addr = self.operand_addr(op.mode)?;
                self.bus.write(addr, self.x.0)?;
            }
            Opcode::STY => {
                let addr = self.operand_addr(op.mode)?;
                self.bus.write(addr, self.y.0)?;
            }
            Opcode::STZ => {
                let addr = self.operand_addr(op.mode)?;
                self.bus.write(addr, 0x00)?;
            }
            Opcode::TAX => Self::load_register(&mut self.p, &mut self.x, self.a.0),
            Opcode::TAY => Self::load_register(&mut self.p, &mut self.y, self.a.0),
            Opcode::TXA => Self::load_register(&mut self.p, &mut self.a, self.x.0),
            Opcode::TYA => Self::load_register(&mut self.p, &mut self.a, self.y.0),
            Opcode::TSX => Self::load_register(&mut self.p, &mut self.x, self.s.0),
            Opcode::TXS => self.s = self.x,
            Opcode::PHA => self.push_stack(self.a.0)?,
            Opcode::PHX => self.push_stack(self.x.0)?,
            Opcode::PHY => self.push_stack(self.y.0)?,
            Opcode::PHP => self.push_stack(self.p.to_byte() | P_B | P_S1)?,
            Opcode::PLA => {
                let val = self.pop_stack()?;
                Self::load_register(&mut self.p, &mut self.a, val);
            }
            Opcode::PLX => {
                let val = self.pop_stack()?;
                Self::load_register(&mut self.p, &mut self.x, val);
            }
            Opcode::PLY => {
                let val = self.pop_stack()?;
                Self::load_register(&mut self.p, &mut self.y, val);
            }
            Opcode::PLP => {
                let val = self.pop_stack()?;
                self.p = Flags::from_byte((val & !P_B) | P_S1);
            }
            Opcode::ADC => {
                let val = self.load_operand(op.mode)?;
                self.adc(val);
            }
            Opcode::SBC => {
                let val = self.load_operand(op.mode)?;
                self.sbc(val);
            }
            Opcode::CMP => {
                let val = self.load_operand(op.mode)?;
                self.compare(self.a.0, val);
            }
            Opcode::CPX => {
                let val = self.load_operand(op.mode)?;
                self.compare(self.x.0, val);
            }
            Opcode::CPY => {
                let val = self.load_operand(op.mode)?;
                self.compare(self.y.0, val);
            }
            Opcode::AND => {
                let val = self.load_operand(op.mode)?;
                let val = self.a.0 & val;
                Self::load_register(&mut self.p, &mut self.a, val);
            }
            Opcode::ORA => {
                let val = self.load_operand(op.mode)?;
                let val = self.a.0 | val;
                Self::load_register(&mut self.p, &mut self.a, val);
            }
            Opcode::EOR => {
                let val = self.load_operand(op.mode)?;
                let val = self.a.0 ^ val;
                Self::load_register(&mut self.p, &mut self.a, val);
            }
            Opcode::BIT => {
                let val = self.load_operand(op.mode)?;
                Self::zero_check(&mut self.p, self.a.0 & val);
                // The immediate form leaves N and V alone.
                if op.mode != AddressMode::Immediate {
                    self.p.set(P_NEGATIVE, val & 0x80 != 0);
                    self.p.set(P_OVERFLOW, val & 0x40 != 0);
                }
            }
            Opcode::ASL => self.shift(op.mode, Self::asl_val)?,
            Opcode::LSR => self.shift(op.mode, Self::lsr_val)?,
            Opcode::ROL => self.shift(op.mode, Self::rol_val)?,
            Opcode::ROR => self.shift(op.mode, Self::ror_val)?,
            Opcode::INC => self.step_memory(op.mode, 1)?,
            Opcode::DEC => self.step_memory(op.mode, 0xFF)?,
            Opcode::INX => {
                let val = (self.x + Wrapping(1)).0;
                Self::load_register(&mut self.p, &mut self.x, val);
            }
            Opcode::DEX => {
                let val = (self.x - Wrapping(1)).0;
                Self::load_register(&mut self.p, &mut self.x, val);
            }
            Opcode::INY => {
                let val = (self.y + Wrapping(1)).0;
                Self::load_register(&mut self.p, &mut self.y, val);
            }
            Opcode::DEY => {
                let val = (self.y - Wrapping(1)).0;
                Self::load_register(&mut self.p, &mut self.y, val);
            }
            Opcode::TRB => {
                let addr = self.operand_addr(op.mode)?;
                let val = self.bus.read(addr)?;
                Self::zero_check(&mut self.p, self.a.0 & val);
                self.bus.write(addr, val & !self.a.0)?;
            }
            Opcode::TSB => {
                let addr = self.operand_addr(op.mode)?;
                let val = self.bus.read(addr)?;
                Self::zero_check(&mut self.p, self.a.0 & val);
                self.bus.write(addr, val | self.a.0)?;
            }
            Opcode::RMB => {
                let addr = self.operand_addr(AddressMode::ZeroPage)?;
                let val = self.bus.read(addr)?;
                self.bus.write(addr, val & !(1 << ((raw >> 4) & 7)))?;
            }
            Opcode::SMB => {
                let addr = self.operand_addr(AddressMode::ZeroPage)?;
                let val = self.bus.read(addr)?;
                self.bus.write(addr, val | 1 << ((raw >> 4) & 7))?;
            }
            Opcode::CLC => self.p.set(P_CARRY, false),
            Opcode::SEC => self.p.set(P_CARRY, true),
            Opcode::CLI => self.p.set(P_INTERRUPT, false),
            Opcode::SEI => self.p.set(P_INTERRUPT, true),
            Opcode::CLD => self.p.set(P_DECIMAL, false),
            Opcode::SED => self.p.set(P_DECIMAL, true),
            Opcode::CLV => self.p.set(P_OVERFLOW, false),
            Opcode::JMP => {
                let addr = self.operand_addr(op.mode)?;
                self.pc = Wrapping(addr);
            }
            Opcode::JSR => {
                let target = self.bus.read_word(self.pc.0)?;
                // Push the return point minus one; RTS adds it back.
                let ret = self.pc + Wrapping(1);
                self.push_word(ret.0)?;
                self.pc = Wrapping(target);
            }
            Opcode::RTS => {
                let addr = self.pull_word()?;
                self.pc = Wrapping(addr) + Wrapping(1);
            }
            Opcode::RTI => {
                let val = self.pop_stack()?;
                self.p = Flags::from_byte((val & !P_B) | P_S1);
                let addr = self.pull_word()?;
                self.pc = Wrapping(addr);
            }
            Opcode::BRK => {
                // Skip the signature byte so RTI resumes past it.
                self.pc += 1;
                self.push_word(self.pc.0)?;
                self.push_stack(self.p.to_byte() | P_B | P_S1)?;
                self.p.set(P_INTERRUPT, true);
                self.pc = Wrapping(self.bus.read_word(IRQ_VECTOR)?);
            }
            Opcode::BCC => self.branch_on(!self.p.get(P_CARRY))?,
            Opcode::BCS => self.branch_on(self.p.get(P_CARRY))?,
            Opcode::BNE => self.branch_on(!self.p.get(P_ZERO))?,
            Opcode::BEQ => self.branch_on(self.p.get(P_ZERO))?,
            Opcode::BPL => self.branch_on(!self.p.get(P_NEGATIVE))?,
            Opcode::BMI => self.branch_on(self.p.get(P_NEGATIVE))?,
            Opcode::BVC => self.branch_on(!self.p.get(P_OVERFLOW))?,
            Opcode::BVS => self.branch_on(self.p.get(P_OVERFLOW))?,
            Opcode::BRA => self.branch_on(true)?,
            Opcode::BBR => {
                let addr = self.operand_addr(AddressMode::ZeroPage)?;
                let val = self.bus.read(addr)?;
                self.branch_on(val & 1 << ((raw >> 4) & 7) == 0)?;
            }
            Opcode::BBS => {
                let addr = self.operand_addr(AddressMode::ZeroPage)?;
                let val = self.bus.read(addr)?;
                self.branch_on(val & 1 << ((raw >> 4) & 7) != 0)?;
            }
            Opcode::WAI => self.waiting = true,
            Opcode::STP => {
                self.halted = true;
                self.halt_opcode = raw;
            }
            Opcode::NOP => {
                // Reserved slots still consume their documented operand
                // bytes so the PC stays aligned.
                self.pc += op.mode.operand_bytes();
            }
        }
        Ok(())
    }

    // RMW shift/rotate dispatch: accumulator for Implied, memory
    // otherwise.
    fn shift(&mut self, mode: AddressMode, f: fn(&mut Flags, u8) -> u8) -> Result<()> {
        if mode == AddressMode::Implied {
            let val = f(&mut self.p, self.a.0);
            Self::load_register(&mut self.p, &mut self.a, val);
            return Ok(());
        }
        let addr = self.operand_addr(mode)?;
        let val = self.bus.read(addr)?;
        let new = f(&mut self.p, val);
        Self::zero_check(&mut self.p, new);
        Self::negative_check(&mut self.p, new);
        self.bus.write(addr, new)
    }

    fn asl_val(p: &mut Flags, val: u8) -> u8 {
        p.set(P_CARRY, val & 0x80 != 0);
        val << 1
    }

    fn lsr_val(p: &mut Flags, val: u8) -> u8 {
        p.set(P_CARRY, val & 0x01 != 0);
        val >> 1
    }

    fn rol_val(p: &mut Flags, val: u8) -> u8 {
        let carry_in = u8::from(p.get(P_CARRY));
        p.set(P_CARRY, val & 0x80 != 0);
        (val << 1) | carry_in
    }

    fn ror_val(p: &mut Flags, val: u8) -> u8 {
        let carry_in = u8::from(p.get(P_CARRY)) << 7;
        p.set(P_CARRY, val & 0x01 != 0);
        (val >> 1) | carry_in
    }

    // INC/DEC on the accumulator (Implied) or memory, expressed as a
    // wrapping add of 1 or 0xFF.
    fn step_memory(&mut self, mode: AddressMode, delta: u8) -> Result<()> {
        if mode == AddressMode::Implied {
            let val = (self.a + Wrapping(delta)).0;
            Self::load_register(&mut self.p, &mut self.a, val);
            return Ok(());
        }
        let addr = self.operand_addr(mode)?;
        let val = (Wrapping(self.bus.read(addr)?) + Wrapping(delta)).0;
        Self::zero_check(&mut self.p, val);
        Self::negative_check(&mut self.p, val);
        self.bus.write(addr, val)
    }

    // ADC with decimal correction when D is set. V always comes from
    // the binary add.
    fn adc(&mut self, val: u8) {
        let carry = u16::from(self.p.get(P_CARRY));
        let bin = u16::from(self.a.0) + u16::from(val) + carry;
        #[allow(clippy::cast_possible_truncation)]
        Self::overflow_check(&mut self.p, self.a.0, val, (bin & 0xFF) as u8);

        let result = if self.p.get(P_DECIMAL) {
            let mut lo = u16::from(self.a.0 & 0x0F) + u16::from(val & 0x0F) + carry;
            let mut hi = u16::from(self.a.0 >> 4) + u16::from(val >> 4);
            if lo > 9 {
                lo += 6;
                hi += 1;
            }
            if hi > 9 {
                hi += 6;
            }
            self.p.set(P_CARRY, hi > 15);
            #[allow(clippy::cast_possible_truncation)]
            let r = (((hi & 0x0F) << 4) | (lo & 0x0F)) as u8;
            r
        } else {
            self.p.set(P_CARRY, bin > 0xFF);
            #[allow(clippy::cast_possible_truncation)]
            let r = (bin & 0xFF) as u8;
            r
        };
        Self::load_register(&mut self.p, &mut self.a, result);
    }

    // SBC with decimal correction when D is set. C and V always come
    // from the binary subtract.
    fn sbc(&mut self, val: u8) {
        let borrow = i16::from(!self.p.get(P_CARRY));
        let bin = i16::from(self.a.0) - i16::from(val) - borrow;
        self.p.set(P_CARRY, bin >= 0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let wrapped = (bin & 0xFF) as u8;
        self.p
            .set(P_OVERFLOW, (self.a.0 ^ val) & (self.a.0 ^ wrapped) & 0x80 != 0);

        let result = if self.p.get(P_DECIMAL) {
            let mut lo = i16::from(self.a.0 & 0x0F) - i16::from(val & 0x0F) - borrow;
            let mut hi = i16::from(self.a.0 >> 4) - i16::from(val >> 4);
            if lo < 0 {
                lo -= 6;
                hi -= 1;
            }
            if hi < 0 {
                hi -= 6;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let r = (((hi & 0x0F) as u8) << 4) | ((lo & 0x0F) as u8);
            r
        } else {
            wrapped
        };
        Self::load_register(&mut self.p, &mut self.a, result);
    }

    // Register minus memory without storing: C/Z/N from the difference.
    fn compare(&mut self, reg: u8, val: u8) {
        let diff = i16::from(reg) - i16::from(val);
        self.p.set(P_CARRY, diff >= 0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let low = (diff & 0xFF) as u8;
        Self::zero_check(&mut self.p, low);
        Self::negative_check(&mut self.p, low);
    }
}
