//! The decode table mapping every opcode byte to its [`Operation`].
//! Built once and validated at that point: each of the 256 byte values
//! must be claimed exactly once, so a gap or a duplicate is a
//! construction panic rather than a latent runtime surprise.

use std::sync::LazyLock;

use ahash::AHashSet;

use crate::{AddressMode, Opcode, Operation};

// Opcode matrix and base cycle counts follow the WDC W65C02S datasheet.
// Reserved byte values decode as NOPs: the single cycle column 3/B
// slots, the two byte immediate style slots, and the 0x44/0x54 style
// zero page slots, plus the three byte 0x5C/0xDC/0xFC slots.
#[allow(clippy::too_many_lines)]
static OPCODES: LazyLock<Vec<Operation>> = LazyLock::new(|| {
    use AddressMode::{
        Absolute, AbsoluteIndirect, AbsoluteIndirectX, AbsoluteX, AbsoluteY, Immediate, Implied,
        IndirectX, IndirectY, NopAbsolute, NopImplied, Relative, ZeroPage, ZeroPageIndirect,
        ZeroPageRelative, ZeroPageX, ZeroPageY,
    };
    use Opcode::{
        ADC, AND, ASL, BBR, BBS, BCC, BCS, BEQ, BIT, BMI, BNE, BPL, BRA, BRK, BVC, BVS, CLC, CLD,
        CLI, CLV, CMP, CPX, CPY, DEC, DEX, DEY, EOR, INC, INX, INY, JMP, JSR, LDA, LDX, LDY, LSR,
        NOP, ORA, PHA, PHP, PHX, PHY, PLA, PLP, PLX, PLY, RMB, ROL, ROR, RTI, RTS, SBC, SEC, SED,
        SEI, SMB, STA, STP, STX, STY, STZ, TAX, TAY, TRB, TSB, TSX, TXA, TXS, TYA, WAI,
    };

    let named: &[(u8, Opcode, AddressMode, u8)] = &[
        (0x00, BRK, Implied, 7),
        (0x01, ORA, IndirectX, 6),
        (0x04, TSB, ZeroPage, 5),
        (0x05, ORA, ZeroPage, 3),
        (0x06, ASL, ZeroPage, 5),
        (0x07, RMB, ZeroPage, 5),
        (0x08, PHP, Implied, 3),
        (0x09, ORA, Immediate, 2),
        (0x0A, ASL, Implied, 2),
        (0x0C, TSB, Absolute, 6),
        (0x0D, ORA, Absolute, 4),
        (0x0E, ASL, Absolute, 6),
        (0x0F, BBR, ZeroPageRelative, 5),
        (0x10, BPL, Relative, 2),
        (0x11, ORA, IndirectY, 5),
        (0x12, ORA, ZeroPageIndirect, 5),
        (0x14, TRB, ZeroPage, 5),
        (0x15, ORA, ZeroPageX, 4),
        (0x16, ASL, ZeroPageX, 6),
        (0x17, RMB, ZeroPage, 5),
        (0x18, CLC, Implied, 2),
        (0x19, ORA, AbsoluteY, 4),
        (0x1A, INC, Implied, 2),
        (0x1C, TRB, Absolute, 6),
        (0x1D, ORA, AbsoluteX, 4),
        (0x1E, ASL, AbsoluteX, 7),
        (0x1F, BBR, ZeroPageRelative, 5),
        (0x20, JSR, Absolute, 6),
        (0x21, AND, IndirectX, 6),
        (0x24, BIT, ZeroPage, 3),
        (0x25, AND, ZeroPage, 3),
        (0x26, ROL, ZeroPage, 5),
        (0x27, RMB, ZeroPage, 5),
        (0x28, PLP, Implied, 4),
        (0x29, AND, Immediate, 2),
        (0x2A, ROL, Implied, 2),
        (0x2C, BIT, Absolute, 4),
        (0x2D, AND, Absolute, 4),
        (0x2E, ROL, Absolute, 6),
        (0x2F, BBR, ZeroPageRelative, 5),
        (0x30, BMI, Relative, 2),
        (0x31, AND, IndirectY, 5),
        (0x32, AND, ZeroPageIndirect, 5),
        (0x34, BIT, ZeroPageX, 4),
        (0x35, AND, ZeroPageX, 4),
        (0x36, ROL, ZeroPageX, 6),
        (0x37, RMB, ZeroPage, 5),
        (0x38, SEC, Implied, 2),
        (0x39, AND, AbsoluteY, 4),
        (0x3A, DEC, Implied, 2),
        (0x3C, BIT, AbsoluteX, 4),
        (0x3D, AND, AbsoluteX, 4),
        (0x3E, ROL, AbsoluteX, 7),
        (0x3F, BBR, ZeroPageRelative, 5),
        (0x40, RTI, Implied, 6),
        (0x41, EOR, IndirectX, 6),
        (0x45, EOR, ZeroPage, 3),
        (0x46, LSR, ZeroPage, 5),
        (0x47, RMB, ZeroPage, 5),
        (0x48, PHA, Implied, 3),
        (0x49, EOR, Immediate, 2),
        (0x4A, LSR, Implied, 2),
        (0x4C, JMP, Absolute, 3),
        (0x4D, EOR, Absolute, 4),
        (0x4E, LSR, Absolute, 6),
        (0x4F, BBR, ZeroPageRelative, 5),
        (0x50, BVC, Relative, 2),
        (0x51, EOR, IndirectY, 5),
        (0x52, EOR, ZeroPageIndirect, 5),
        (0x55, EOR, ZeroPageX, 4),
        (0x56, LSR, ZeroPageX, 6),
        (0x57, RMB, ZeroPage, 5),
        (0x58, CLI, Implied, 2),
        (0x59, EOR, AbsoluteY, 4),
        (0x5A, PHY, Implied, 3),
        (0x5D, EOR, AbsoluteX, 4),
        (0x5E, LSR, AbsoluteX, 7),
        (0x5F, BBR, ZeroPageRelative, 5),
        (0x60, RTS, Implied, 6),
        (0x61, ADC, IndirectX, 6),
        (0x64, STZ, ZeroPage, 3),
        (0x65, ADC, ZeroPage, 3),
        (0x66, ROR, ZeroPage, 5),
        (0x67, RMB, ZeroPage, 5),
        (0x68, PLA, Implied, 4),
        (0x69, ADC, Immediate, 2),
        (0x6A, ROR, Implied, 2),
        (0x6C, JMP, AbsoluteIndirect, 6),
        (0x6D, ADC, Absolute, 4),
        (0x6E, ROR, Absolute, 6),
        (0x6F, BBR, ZeroPageRelative, 5),
        (0x70, BVS, Relative, 2),
        (0x71, ADC, IndirectY, 5),
        (0x72, ADC, ZeroPageIndirect, 5),
        (0x74, STZ, ZeroPageX, 4),
        (0x75, ADC, ZeroPageX, 4),
        (0x76, ROR, ZeroPageX, 6),
        (0x77, RMB, ZeroPage, 5),
        (0x78, SEI, Implied, 2),
        (0x79, ADC, AbsoluteY, 4),
        (0x7A, PLY, Implied, 4),
        (0x7C, JMP, AbsoluteIndirectX, 6),
        (0x7D, ADC, AbsoluteX, 4),
        (0x7E, ROR, AbsoluteX, 7),
        (0x7F, BBR, ZeroPageRelative, 5),
        (0x80, BRA, Relative, 2),
        (0x81, STA, IndirectX, 6),
        (0x84, STY, ZeroPage, 3),
        (0x85, STA, ZeroPage, 3),
        (0x86, STX, ZeroPage, 3),
        (0x87, SMB, ZeroPage, 5),
        (0x88, DEY, Implied, 2),
        (0x89, BIT, Immediate, 2),
        (0x8A, TXA, Implied, 2),
        (0x8C, STY, Absolute, 4),
        (0x8D, STA, Absolute, 4),
        (0x8E, STX, Absolute, 4),
        (0x8F, BBS, ZeroPageRelative, 5),
        (0x90, BCC, Relative, 2),
        (0x91, STA, IndirectY, 6),
        (0x92, STA, ZeroPageIndirect, 5),
        (0x94, STY, ZeroPageX, 4),
        (0x95, STA, ZeroPageX, 4),
        (0x96, STX, ZeroPageY, 4),
        (0x97, SMB, ZeroPage, 5),
        (0x98, TYA, Implied, 2),
        (0x99, STA, AbsoluteY, 5),
        (0x9A, TXS, Implied, 2),
        (0x9C, STZ, Absolute, 4),
        (0x9D, STA, AbsoluteX, 5),
        (0x9E, STZ, AbsoluteX, 5),
        (0x9F, BBS, ZeroPageRelative, 5),
        (0xA0, LDY, Immediate, 2),
        (0xA1, LDA, IndirectX, 6),
        (0xA2, LDX, Immediate, 2),
        (0xA4, LDY, ZeroPage, 3),
        (0xA5, LDA, ZeroPage, 3),
        (0xA6, LDX, ZeroPage, 3),
        (0xA7, SMB, ZeroPage, 5),
        (0xA8, TAY, Implied, 2),
        (0xA9, LDA, Immediate, 2),
        (0xAA, TAX, Implied, 2),
        (0xAC, LDY, Absolute, 4),
        (0xAD, LDA, Absolute, 4),
        (0xAE, LDX, Absolute, 4),
        (0xAF, BBS, ZeroPageRelative, 5),
        (0xB0, BCS, Relative, 2),
        (0xB1, LDA, IndirectY, 5),
        (0xB2, LDA, ZeroPageIndirect, 5),
        (0xB4, LDY, ZeroPageX, 4),
        (0xB5, LDA, ZeroPageX, 4),
        (0xB6, LDX, ZeroPageY, 4),
        (0xB7, SMB, ZeroPage, 5),
        (0xB8, CLV, Implied, 2),
        (0xB9, LDA, AbsoluteY, 4),
        (0xBA, TSX, Implied, 2),
        (0xBC, LDY, AbsoluteX, 4),
        (0xBD, LDA, AbsoluteX, 4),
        (0xBE, LDX, AbsoluteY, 4),
        (0xBF, BBS, ZeroPageRelative, 5),
        (0xC0, CPY, Immediate, 2),
        (0xC1, CMP, IndirectX, 6),
        (0xC4, CPY, ZeroPage, 3),
        (0xC5, CMP, ZeroPage, 3),
        (0xC6, DEC, ZeroPage, 5),
        (0xC7, SMB, ZeroPage, 5),
        (0xC8, INY, Implied, 2),
        (0xC9, CMP, Immediate, 2),
        (0xCA, DEX, Implied, 2),
        (0xCB, WAI, Implied, 3),
        (0xCC, CPY, Absolute, 4),
        (0xCD, CMP, Absolute, 4),
        (0xCE, DEC, Absolute, 6),
        (0xCF, BBS, ZeroPageRelative, 5),
        (0xD0, BNE, Relative, 2),
        (0xD1, CMP, IndirectY, 5),
        (0xD2, CMP, ZeroPageIndirect, 5),
        (0xD5, CMP, ZeroPageX, 4),
        (0xD6, DEC, ZeroPageX, 6),
        (0xD7, SMB, ZeroPage, 5),
        (0xD8, CLD, Implied, 2),
        (0xD9, CMP, AbsoluteY, 4),
        (0xDA, PHX, Implied, 3),
        (0xDB, STP, Implied, 3),
        (0xDD, CMP, AbsoluteX, 4),
        (0xDE, DEC, AbsoluteX, 7),
        (0xDF, BBS, ZeroPageRelative, 5),
        (0xE0, CPX, Immediate, 2),
        (0xE1, SBC, IndirectX, 6),
        (0xE4, CPX, ZeroPage, 3),
        (0xE5, SBC, ZeroPage, 3),
        (0xE6, INC, ZeroPage, 5),
        (0xE7, SMB, ZeroPage, 5),
        (0xE8, INX, Implied, 2),
        (0xE9, SBC, Immediate, 2),
        (0xEA, NOP, Implied, 2),
        (0xEC, CPX, Absolute, 4),
        (0xED, SBC, Absolute, 4),
        (0xEE, INC, Absolute, 6),
        (0xEF, BBS, ZeroPageRelative, 5),
        (0xF0, BEQ, Relative, 2),
        (0xF1, SBC, IndirectY, 5),
        (0xF2, SBC, ZeroPageIndirect, 5),
        (0xF5, SBC, ZeroPageX, 4),
        (0xF6, INC, ZeroPageX, 6),
        (0xF7, SMB, ZeroPage, 5),
        (0xF8, SED, Implied, 2),
        (0xF9, SBC, AbsoluteY, 4),
        (0xFA, PLX, Implied, 4),
        (0xFD, SBC, AbsoluteX, 4),
        (0xFE, INC, AbsoluteX, 7),
        (0xFF, BBS, ZeroPageRelative, 5),
    ];

    let mut table = vec![None; 1 << 8];
    let mut seen = AHashSet::new();
    let mut ins = |table: &mut Vec<Option<Operation>>, byte: u8, op, mode, cycles| {
        assert!(
            seen.insert(byte),
            "opcode table claims {byte:#04X} twice ({op} {mode})"
        );
        table[usize::from(byte)] = Some(Operation { op, mode, cycles });
    };

    for (byte, op, mode, cycles) in named {
        ins(&mut table, *byte, *op, *mode, *cycles);
    }

    // Reserved single cycle slots: every column 3 byte and every
    // column B byte not claimed by WAI/STP.
    for hi in 0..=0x0Fu8 {
        ins(&mut table, (hi << 4) | 0x03, NOP, NopImplied, 1);
        let b = (hi << 4) | 0x0B;
        if b != 0xCB && b != 0xDB {
            ins(&mut table, b, NOP, NopImplied, 1);
        }
    }
    // Reserved two byte slots.
    for b in [0x02, 0x22, 0x42, 0x62, 0x82, 0xC2, 0xE2] {
        ins(&mut table, b, NOP, Immediate, 2);
    }
    ins(&mut table, 0x44, NOP, ZeroPage, 3);
    for b in [0x54, 0xD4, 0xF4] {
        ins(&mut table, b, NOP, ZeroPageX, 4);
    }
    // Reserved three byte slots, including the one 8 cycle oddball.
    for b in [0xDC, 0xFC] {
        ins(&mut table, b, NOP, Absolute, 4);
    }
    ins(&mut table, 0x5C, NOP, NopAbsolute, 8);

    table
        .into_iter()
        .enumerate()
        .map(|(i, entry)| entry.unwrap_or_else(|| panic!("opcode table missing {i:#04X}")))
        .collect()
});

/// Given an opcode byte value this returns the [`Operation`] defining
/// it: instruction, addressing mode and base cycles.
#[must_use]
pub fn opcode_op(raw: u8) -> Operation {
    OPCODES[usize::from(raw)]
}
