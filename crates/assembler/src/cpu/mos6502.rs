//! 6502 backend.
//!
//! The classifier turns an argument list into one of the twelve
//! addressing modes; each mnemonic then carries a mode → opcode map.
//! Zero-page selection runs in one of three modes: forced on, forced
//! off, or automatic, where an absolute reference downgrades to zero
//! page whenever the operand fits in a byte. Because that changes
//! instruction lengths, the backend asks for a third pass so labels
//! settle.
//!
//! The full undocumented opcode set is supported under its customary
//! aliases. Several instructions accept `addr,Y` equally as zero-page
//! or absolute; the mode pairs fall back to each other where the
//! hardware only has one of the two encodings.

use rasm_core::{PassState, Token};

use crate::cmd::{CmdResult, CmdStatus, OptionEntry, argc_check};
use crate::context::Context;

use super::CpuBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddrMode {
    Accumulator,
    Implied,
    Immediate,
    Absolute,
    ZeroPage,
    AbsoluteX,
    AbsoluteY,
    ZeroPageX,
    ZeroPageY,
    IndirectX,
    IndirectY,
    Indirect,
}

pub(crate) fn mode_name(mode: AddrMode) -> &'static str {
    match mode {
        AddrMode::Accumulator => "Accumulator",
        AddrMode::Implied => "Implied",
        AddrMode::Immediate => "Immediate",
        AddrMode::Absolute => "Absolute",
        AddrMode::ZeroPage => "Zero Page",
        AddrMode::AbsoluteX => "Absolute, index X",
        AddrMode::AbsoluteY => "Absolute, index Y",
        AddrMode::ZeroPageX => "Zero Page, index X",
        AddrMode::ZeroPageY => "Zero Page, index Y",
        AddrMode::IndirectX => "Zero Page, indirect X",
        AddrMode::IndirectY => "Zero Page, indirect Y",
        AddrMode::Indirect => "Indirect",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ZpMode {
    Off,
    On,
    Auto,
}

static OPTIONS: &[OptionEntry] = &[OptionEntry { name: "zero-page", tag: 0 }];

/// Pick zero page or absolute according to the option and the operand.
fn zp_select(
    zp_mode: ZpMode,
    address: i64,
    zp: AddrMode,
    absolute: AddrMode,
) -> Result<AddrMode, String> {
    match zp_mode {
        ZpMode::On => {
            if !(0..=255).contains(&address) {
                Err(format!("value {address} outside of zero page"))
            } else {
                Ok(zp)
            }
        }
        ZpMode::Off => Ok(absolute),
        ZpMode::Auto => {
            if (0..=255).contains(&address) {
                Ok(zp)
            } else {
                Ok(absolute)
            }
        }
    }
}

fn zero_page_check(address: i64) -> Result<(), String> {
    if !(0..=255).contains(&address) {
        Err(format!("value {address} outside of zero page"))
    } else {
        Ok(())
    }
}

/// Work out the addressing mode and operand for a command's arguments.
pub(crate) fn classify(
    ctx: &Context,
    args: &[Token],
    zp_mode: ZpMode,
) -> Result<(AddrMode, i64), String> {
    if args.len() == 1 {
        return Ok((AddrMode::Implied, 0));
    }

    let arg = &args[1];

    if args.len() == 2 && arg.quote.is_none() && arg.text.eq_ignore_ascii_case("A") {
        return Ok((AddrMode::Accumulator, 0));
    }

    if args.len() == 2
        && arg.quote.is_none()
        && let Some(imm) = arg.text.strip_prefix('#')
    {
        let value = ctx.eval_arg(&arg.text, imm)?;
        return Ok((AddrMode::Immediate, value));
    }

    if args.len() == 2 && arg.quote.is_none() {
        let address = ctx.eval_arg(&arg.text, &arg.text)?;
        let mode = zp_select(zp_mode, address, AddrMode::ZeroPage, AddrMode::Absolute)?;
        return Ok((mode, address));
    }

    if args.len() == 3 && arg.quote.is_none() {
        let address = ctx.eval_arg(&arg.text, &arg.text)?;
        let index = &args[2].text;

        let mode = if index.eq_ignore_ascii_case("X") {
            zp_select(zp_mode, address, AddrMode::ZeroPageX, AddrMode::AbsoluteX)?
        } else if index.eq_ignore_ascii_case("Y") {
            zp_select(zp_mode, address, AddrMode::ZeroPageY, AddrMode::AbsoluteY)?
        } else {
            return Err(format!("unknown index register '{index}'"));
        };

        return Ok((mode, address));
    }

    // (zp,x) or (ind)
    if args.len() == 2 && arg.quote == Some('(') {
        if !rasm_core::text::ends_ignore_case(&arg.text, ",x") {
            let address = ctx.eval_arg(&arg.text, &arg.text)?;
            return Ok((AddrMode::Indirect, address));
        }

        let inner = &arg.text[..arg.text.len() - 2];
        let address = ctx.eval_arg(inner, inner)?;
        zero_page_check(address)?;
        return Ok((AddrMode::IndirectX, address));
    }

    // (zp),y
    if args.len() == 3 && arg.quote == Some('(') {
        if !args[2].text.eq_ignore_ascii_case("y") {
            return Err(format!(
                "illegal index register '{}' used for zero-page indirect",
                args[2].text
            ));
        }

        let address = ctx.eval_arg(&arg.text, &arg.text)?;
        zero_page_check(address)?;
        return Ok((AddrMode::IndirectY, address));
    }

    Err(format!("{}: couldn't work out addressing mode", args[0].text))
}

/// Operand size is a property of the encoding, not the classified
/// mode — `STX addr,Y` encodes as the zero-page form after a range
/// check.
fn operand_width(mode: AddrMode) -> usize {
    match mode {
        AddrMode::Accumulator | AddrMode::Implied => 0,
        AddrMode::Immediate
        | AddrMode::ZeroPage
        | AddrMode::ZeroPageX
        | AddrMode::ZeroPageY
        | AddrMode::IndirectX
        | AddrMode::IndirectY => 1,
        AddrMode::Absolute | AddrMode::AbsoluteX | AddrMode::AbsoluteY | AddrMode::Indirect => 2,
    }
}

struct Instruction {
    op: &'static str,
    modes: &'static [(AddrMode, u8)],
}

use AddrMode::*;

/// Mode → opcode maps, documented set first. Aliases share a row.
static INSTRUCTIONS: &[Instruction] = &[
    Instruction {
        op: "ADC",
        modes: &[
            (Immediate, 0x69), (Absolute, 0x6d), (ZeroPage, 0x65), (AbsoluteX, 0x7d),
            (AbsoluteY, 0x79), (ZeroPageX, 0x75), (IndirectX, 0x61), (IndirectY, 0x71),
        ],
    },
    Instruction {
        op: "AND",
        modes: &[
            (Immediate, 0x29), (Absolute, 0x2d), (ZeroPage, 0x25), (AbsoluteX, 0x3d),
            (AbsoluteY, 0x39), (ZeroPageX, 0x35), (IndirectX, 0x21), (IndirectY, 0x31),
        ],
    },
    Instruction {
        op: "ASL",
        modes: &[
            (Accumulator, 0x0a), (Absolute, 0x0e), (ZeroPage, 0x06), (AbsoluteX, 0x1e),
            (ZeroPageX, 0x16),
        ],
    },
    Instruction { op: "BIT", modes: &[(Absolute, 0x2c), (ZeroPage, 0x24)] },
    Instruction {
        op: "CMP",
        modes: &[
            (Immediate, 0xc9), (Absolute, 0xcd), (ZeroPage, 0xc5), (AbsoluteX, 0xdd),
            (AbsoluteY, 0xd9), (ZeroPageX, 0xd5), (IndirectX, 0xc1), (IndirectY, 0xd1),
        ],
    },
    Instruction { op: "CPX", modes: &[(Immediate, 0xe0), (Absolute, 0xec), (ZeroPage, 0xe4)] },
    Instruction { op: "CPY", modes: &[(Immediate, 0xc0), (Absolute, 0xcc), (ZeroPage, 0xc4)] },
    Instruction {
        op: "DEC",
        modes: &[(Absolute, 0xce), (ZeroPage, 0xc6), (AbsoluteX, 0xde), (ZeroPageX, 0xd6)],
    },
    Instruction {
        op: "EOR",
        modes: &[
            (Immediate, 0x49), (Absolute, 0x4d), (ZeroPage, 0x45), (AbsoluteX, 0x5d),
            (AbsoluteY, 0x59), (ZeroPageX, 0x55), (IndirectX, 0x41), (IndirectY, 0x51),
        ],
    },
    Instruction {
        op: "INC",
        modes: &[(Absolute, 0xee), (ZeroPage, 0xe6), (AbsoluteX, 0xfe), (ZeroPageX, 0xf6)],
    },
    Instruction { op: "JMP", modes: &[(Absolute, 0x4c), (Indirect, 0x6c)] },
    Instruction { op: "JSR", modes: &[(Absolute, 0x20)] },
    Instruction {
        op: "LDA",
        modes: &[
            (Immediate, 0xa9), (Absolute, 0xad), (ZeroPage, 0xa5), (AbsoluteX, 0xbd),
            (AbsoluteY, 0xb9), (ZeroPageX, 0xb5), (IndirectX, 0xa1), (IndirectY, 0xb1),
        ],
    },
    Instruction {
        op: "LDX",
        modes: &[
            (Immediate, 0xa2), (Absolute, 0xae), (ZeroPage, 0xa6), (AbsoluteY, 0xbe),
            (ZeroPageY, 0xb6),
        ],
    },
    Instruction {
        op: "LDY",
        modes: &[
            (Immediate, 0xa0), (Absolute, 0xac), (ZeroPage, 0xa4), (AbsoluteX, 0xbc),
            (ZeroPageX, 0xb4),
        ],
    },
    Instruction {
        op: "LSR",
        modes: &[
            (Accumulator, 0x4a), (Absolute, 0x4e), (ZeroPage, 0x46), (AbsoluteX, 0x5e),
            (ZeroPageX, 0x56),
        ],
    },
    Instruction {
        op: "ORA",
        modes: &[
            (Immediate, 0x09), (Absolute, 0x0d), (ZeroPage, 0x05), (AbsoluteX, 0x1d),
            (AbsoluteY, 0x19), (ZeroPageX, 0x15), (IndirectX, 0x01), (IndirectY, 0x11),
        ],
    },
    Instruction {
        op: "ROL",
        modes: &[
            (Accumulator, 0x2a), (Absolute, 0x2e), (ZeroPage, 0x26), (AbsoluteX, 0x3e),
            (ZeroPageX, 0x36),
        ],
    },
    Instruction {
        op: "ROR",
        modes: &[
            (Accumulator, 0x6a), (Absolute, 0x6e), (ZeroPage, 0x66), (AbsoluteX, 0x7e),
            (ZeroPageX, 0x76),
        ],
    },
    Instruction {
        op: "SBC",
        modes: &[
            (Immediate, 0xe9), (Absolute, 0xed), (ZeroPage, 0xe5), (AbsoluteX, 0xfd),
            (AbsoluteY, 0xf9), (ZeroPageX, 0xf5), (IndirectX, 0xe1), (IndirectY, 0xf1),
        ],
    },
    Instruction {
        op: "STA",
        modes: &[
            (Absolute, 0x8d), (ZeroPage, 0x85), (AbsoluteX, 0x9d), (AbsoluteY, 0x99),
            (ZeroPageX, 0x95), (IndirectX, 0x81), (IndirectY, 0x91),
        ],
    },
    Instruction { op: "STX", modes: &[(Absolute, 0x8e), (ZeroPage, 0x86), (ZeroPageY, 0x96)] },
    Instruction { op: "STY", modes: &[(Absolute, 0x8c), (ZeroPage, 0x84), (ZeroPageX, 0x94)] },
    // Undocumented set.
    Instruction { op: "ALR", modes: &[(Immediate, 0x4b)] },
    Instruction { op: "ASR", modes: &[(Immediate, 0x4b)] },
    Instruction { op: "ANC", modes: &[(Immediate, 0x0b)] },
    Instruction { op: "ANC2", modes: &[(Immediate, 0x2b)] },
    Instruction { op: "ANE", modes: &[(Immediate, 0x8b)] },
    Instruction { op: "XAA", modes: &[(Immediate, 0x8b)] },
    Instruction { op: "ARR", modes: &[(Immediate, 0x6b)] },
    Instruction {
        op: "DCP",
        modes: &[
            (Absolute, 0xcf), (ZeroPage, 0xc7), (AbsoluteX, 0xdf), (AbsoluteY, 0xdb),
            (ZeroPageX, 0xd7), (IndirectX, 0xc3), (IndirectY, 0xd3),
        ],
    },
    Instruction {
        op: "DCM",
        modes: &[
            (Absolute, 0xcf), (ZeroPage, 0xc7), (AbsoluteX, 0xdf), (AbsoluteY, 0xdb),
            (ZeroPageX, 0xd7), (IndirectX, 0xc3), (IndirectY, 0xd3),
        ],
    },
    Instruction {
        op: "ISC",
        modes: &[
            (Absolute, 0xef), (ZeroPage, 0xe7), (AbsoluteX, 0xff), (AbsoluteY, 0xfb),
            (ZeroPageX, 0xf7), (IndirectX, 0xe3), (IndirectY, 0xf3),
        ],
    },
    Instruction {
        op: "ISB",
        modes: &[
            (Absolute, 0xef), (ZeroPage, 0xe7), (AbsoluteX, 0xff), (AbsoluteY, 0xfb),
            (ZeroPageX, 0xf7), (IndirectX, 0xe3), (IndirectY, 0xf3),
        ],
    },
    Instruction {
        op: "INS",
        modes: &[
            (Absolute, 0xef), (ZeroPage, 0xe7), (AbsoluteX, 0xff), (AbsoluteY, 0xfb),
            (ZeroPageX, 0xf7), (IndirectX, 0xe3), (IndirectY, 0xf3),
        ],
    },
    Instruction { op: "LAS", modes: &[(AbsoluteY, 0xbb)] },
    Instruction { op: "LAR", modes: &[(AbsoluteY, 0xbb)] },
    Instruction {
        op: "LAX",
        modes: &[
            (Absolute, 0xaf), (ZeroPage, 0xa7), (ZeroPageY, 0xb7), (AbsoluteY, 0xbf),
            (IndirectX, 0xa3), (IndirectY, 0xb3),
        ],
    },
    Instruction { op: "LXA", modes: &[(Immediate, 0xab)] },
    Instruction {
        op: "RLA",
        modes: &[
            (Absolute, 0x2f), (ZeroPage, 0x27), (AbsoluteX, 0x3f), (AbsoluteY, 0x3b),
            (ZeroPageX, 0x37), (IndirectX, 0x23), (IndirectY, 0x33),
        ],
    },
    Instruction {
        op: "RRA",
        modes: &[
            (Absolute, 0x6f), (ZeroPage, 0x67), (AbsoluteX, 0x7f), (AbsoluteY, 0x7b),
            (ZeroPageX, 0x77), (IndirectX, 0x63), (IndirectY, 0x73),
        ],
    },
    Instruction {
        op: "SAX",
        modes: &[(Absolute, 0x8f), (ZeroPage, 0x87), (ZeroPageY, 0x97), (IndirectX, 0x83)],
    },
    Instruction {
        op: "AXS",
        modes: &[(Absolute, 0x8f), (ZeroPage, 0x87), (ZeroPageY, 0x97), (IndirectX, 0x83)],
    },
    Instruction {
        op: "AAX",
        modes: &[(Absolute, 0x8f), (ZeroPage, 0x87), (ZeroPageY, 0x97), (IndirectX, 0x83)],
    },
    Instruction { op: "SBX", modes: &[(Immediate, 0xcb)] },
    Instruction { op: "ASX", modes: &[(Immediate, 0xcb)] },
    Instruction { op: "SHA", modes: &[(AbsoluteY, 0x9f), (IndirectY, 0x93)] },
    Instruction { op: "AHX", modes: &[(AbsoluteY, 0x9f), (IndirectY, 0x93)] },
    Instruction { op: "AXA", modes: &[(AbsoluteY, 0x9f), (IndirectY, 0x93)] },
    Instruction { op: "SHX", modes: &[(AbsoluteY, 0x9e)] },
    Instruction { op: "SXA", modes: &[(AbsoluteY, 0x9e)] },
    Instruction { op: "XAS", modes: &[(AbsoluteY, 0x9e)] },
    Instruction { op: "SHY", modes: &[(AbsoluteX, 0x9c)] },
    Instruction { op: "SYA", modes: &[(AbsoluteX, 0x9c)] },
    Instruction { op: "SAY", modes: &[(AbsoluteX, 0x9c)] },
    Instruction {
        op: "SLO",
        modes: &[
            (Absolute, 0x0f), (ZeroPage, 0x07), (AbsoluteX, 0x1f), (AbsoluteY, 0x1b),
            (ZeroPageX, 0x17), (IndirectX, 0x03), (IndirectY, 0x13),
        ],
    },
    Instruction {
        op: "ASO",
        modes: &[
            (Absolute, 0x0f), (ZeroPage, 0x07), (AbsoluteX, 0x1f), (AbsoluteY, 0x1b),
            (ZeroPageX, 0x17), (IndirectX, 0x03), (IndirectY, 0x13),
        ],
    },
    Instruction {
        op: "SRE",
        modes: &[
            (Absolute, 0x4f), (ZeroPage, 0x47), (AbsoluteX, 0x5f), (AbsoluteY, 0x5b),
            (ZeroPageX, 0x57), (IndirectX, 0x43), (IndirectY, 0x53),
        ],
    },
    Instruction { op: "TAS", modes: &[(AbsoluteY, 0x9b)] },
    Instruction { op: "SHS", modes: &[(AbsoluteY, 0x9b)] },
    Instruction { op: "USBC", modes: &[(Immediate, 0xeb)] },
    Instruction { op: "JAM", modes: &[(Implied, 0x02)] },
    Instruction { op: "KIL", modes: &[(Implied, 0x02)] },
    Instruction { op: "HLT", modes: &[(Implied, 0x02)] },
];

static IMPLIED_OPCODES: &[(&str, u8)] = &[
    ("NOP", 0xea),
    ("TXS", 0x9a),
    ("TSX", 0xba),
    ("PHA", 0x48),
    ("PLA", 0x68),
    ("PHP", 0x08),
    ("PLP", 0x28),
    ("CLC", 0x18),
    ("SEC", 0x38),
    ("CLI", 0x58),
    ("SEI", 0x78),
    ("CLV", 0xb8),
    ("CLD", 0xd8),
    ("SED", 0xf8),
    ("BRK", 0x00),
    ("TAX", 0xaa),
    ("TXA", 0x8a),
    ("DEX", 0xca),
    ("INX", 0xe8),
    ("TAY", 0xa8),
    ("TYA", 0x98),
    ("DEY", 0x88),
    ("INY", 0xc8),
    ("RTI", 0x40),
    ("RTS", 0x60),
];

static BRANCH_OPCODES: &[(&str, u8)] = &[
    ("BPL", 0x10),
    ("BMI", 0x30),
    ("BVC", 0x50),
    ("BVS", 0x70),
    ("BCC", 0x90),
    ("BCS", 0xb0),
    ("BNE", 0xd0),
    ("BEQ", 0xf0),
];

/// Find a usable encoding for a classified mode, applying the
/// equivalence pairs. Returns the encoding mode along with the opcode;
/// a `true` check flag means the operand must pass a zero-page check
/// first.
fn find_encoding(
    modes: &'static [(AddrMode, u8)],
    mode: AddrMode,
) -> Option<(AddrMode, u8, bool)> {
    let exact = |want: AddrMode| modes.iter().find(|&&(m, _)| m == want);

    if let Some(&(m, code)) = exact(mode) {
        return Some((m, code, false));
    }

    match mode {
        // `addr,Y` forms: the two classifications are interchangeable
        // where only one encoding exists.
        AddrMode::ZeroPageY => exact(AddrMode::AbsoluteY).map(|&(m, c)| (m, c, false)),
        AddrMode::AbsoluteY => exact(AddrMode::ZeroPageY).map(|&(m, c)| (m, c, true)),
        AddrMode::AbsoluteX => exact(AddrMode::ZeroPageX).map(|&(m, c)| (m, c, true)),
        // JMP/JSR take any address; a zero-page value is still a word.
        AddrMode::ZeroPage => exact(AddrMode::Absolute).map(|&(m, c)| (m, c, false)),
        // A bare shift mnemonic means the accumulator.
        AddrMode::Implied => exact(AddrMode::Accumulator).map(|&(m, c)| (m, c, false)),
        _ => None,
    }
}

pub struct Mos6502 {
    zp_mode: ZpMode,
}

impl Mos6502 {
    pub fn new() -> Mos6502 {
        Mos6502 { zp_mode: ZpMode::Auto }
    }
}

impl Default for Mos6502 {
    fn default() -> Mos6502 {
        Mos6502::new()
    }
}

impl CpuBackend for Mos6502 {
    fn name(&self) -> &'static str {
        "6502"
    }

    fn init(&mut self, state: &mut PassState) {
        self.zp_mode = ZpMode::Auto;
        // Zero-page auto-selection changes instruction lengths between
        // passes.
        state.set_needed_passes(3);
    }

    fn options(&self) -> &'static [OptionEntry] {
        OPTIONS
    }

    fn set_option(&mut self, _tag: u32, args: &[Token], _ctx: &Context) -> CmdResult {
        argc_check(args, 1)?;

        self.zp_mode = match args[0].text.to_ascii_lowercase().as_str() {
            "yes" | "on" | "true" => ZpMode::On,
            "no" | "off" | "false" => ZpMode::Off,
            "auto" => ZpMode::Auto,
            other => return Err(format!("unknown value: \"{other}\"")),
        };

        Ok(CmdStatus::Ok)
    }

    fn handle(&mut self, ctx: &mut Context, _label: Option<&str>, args: &[Token]) -> CmdResult {
        let command = args[0].text.to_ascii_uppercase();

        if let Some(&(_, code)) = IMPLIED_OPCODES.iter().find(|(op, _)| *op == command) {
            ctx.memory.pc_write(i64::from(code));
            return Ok(CmdStatus::Ok);
        }

        if let Some(&(_, code)) = BRANCH_OPCODES.iter().find(|(op, _)| *op == command) {
            argc_check(args, 2)?;

            let target = ctx.eval_arg(&command, &args[1].text)?;
            let offset = target - (i64::from(ctx.memory.pc()) + 2);

            if ctx.state.is_final_pass() && !(-128..=127).contains(&offset) {
                return Err(format!("{}: Branch offset ({offset}) too big", args[1].text));
            }

            ctx.memory.pc_write(i64::from(code));
            ctx.memory.pc_write(offset);
            return Ok(CmdStatus::Ok);
        }

        let Some(instruction) = INSTRUCTIONS.iter().find(|i| i.op == command) else {
            return Ok(CmdStatus::NotKnown);
        };

        let (mode, address) = classify(ctx, args, self.zp_mode)?;

        let Some((enc_mode, opcode, check)) = find_encoding(instruction.modes, mode) else {
            return Err(format!(
                "{command}: unsupported addressing mode {}",
                mode_name(mode)
            ));
        };

        if check {
            zero_page_check(address)
                .map_err(|e| format!("{command}: {e}"))?;
        }

        ctx.memory.pc_write(i64::from(opcode));
        match operand_width(enc_mode) {
            1 => ctx.memory.pc_write(address),
            2 => ctx.memory.pc_write_word(address),
            _ => {}
        }

        Ok(CmdStatus::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rasm_core::LabelKind;

    fn assemble(lines: &[&str]) -> Context {
        let mut ctx = Context::new();
        let mut cpu = Mos6502::new();
        ctx.memory.set_pc(0x600);

        for line in lines {
            let parsed = rasm_core::parse_line(line, ctx.codepage).unwrap();
            cpu.handle(&mut ctx, None, &parsed.tokens).unwrap();
        }

        ctx
    }

    fn bytes(ctx: &Context, count: u32) -> Vec<u8> {
        (0..count).map(|i| ctx.memory.read(0, 0x600 + i)).collect()
    }

    #[test]
    fn test_zero_page_auto() {
        let mut ctx = Context::new();
        let mut cpu = Mos6502::new();
        ctx.labels.set("label", 0x10, LabelKind::Global).unwrap();
        ctx.memory.set_pc(0x600);

        for line in ["  LDA label", "  LDA 0x200"] {
            let parsed = rasm_core::parse_line(line, ctx.codepage).unwrap();
            cpu.handle(&mut ctx, None, &parsed.tokens).unwrap();
        }

        assert_eq!(
            (0..5).map(|i| ctx.memory.read(0, 0x600 + i)).collect::<Vec<_>>(),
            vec![0xa5, 0x10, 0xad, 0x00, 0x02]
        );
    }

    #[test]
    fn test_immediate_and_indexed() {
        let ctx = assemble(&["  LDA #5", "  STA 0x2000,X", "  LDA 0x20,Y"]);
        assert_eq!(
            bytes(&ctx, 7),
            vec![0xa9, 0x05, 0x9d, 0x00, 0x20, 0xb9, 0x20]
        );
    }

    #[test]
    fn test_indirect_forms() {
        let ctx = assemble(&["  LDA (0x20,X)", "  STA (0x30),Y", "  JMP (0x1234)"]);
        assert_eq!(
            bytes(&ctx, 7),
            vec![0xa1, 0x20, 0x91, 0x30, 0x6c, 0x34, 0x12]
        );
    }

    #[test]
    fn test_jmp_low_address_is_absolute() {
        let ctx = assemble(&["  JMP 0x10"]);
        assert_eq!(bytes(&ctx, 3), vec![0x4c, 0x10, 0x00]);
    }

    #[test]
    fn test_accumulator_shifts() {
        let ctx = assemble(&["  ASL", "  LSR A", "  ROL 0x10"]);
        assert_eq!(bytes(&ctx, 4), vec![0x0a, 0x4a, 0x26, 0x10]);
    }

    #[test]
    fn test_branches() {
        // BNE to own address: -2.
        let ctx = assemble(&["  BNE 0x600"]);
        assert_eq!(bytes(&ctx, 2), vec![0xd0, 0xfe]);
    }

    #[test]
    fn test_branch_range_on_final_pass() {
        let mut ctx = Context::new();
        let mut cpu = Mos6502::new();
        ctx.state.next_pass();
        ctx.memory.set_pc(0x600);

        let parsed = rasm_core::parse_line("  BEQ 0x1000", ctx.codepage).unwrap();
        assert!(cpu.handle(&mut ctx, None, &parsed.tokens).is_err());
    }

    #[test]
    fn test_stx_absolute_y_downgrades() {
        let ctx = assemble(&["  STX 0x80,Y"]);
        assert_eq!(bytes(&ctx, 2), vec![0x96, 0x80]);

        // Out of zero page the downgrade must fail.
        let mut ctx = Context::new();
        let mut cpu = Mos6502::new();
        let parsed = rasm_core::parse_line("  STX 0x200,Y", ctx.codepage).unwrap();
        assert!(cpu.handle(&mut ctx, None, &parsed.tokens).is_err());
    }

    #[test]
    fn test_zero_page_forced_on() {
        let mut ctx = Context::new();
        let mut cpu = Mos6502::new();
        cpu.zp_mode = ZpMode::On;
        ctx.memory.set_pc(0x600);

        let parsed = rasm_core::parse_line("  LDA 0x300", ctx.codepage).unwrap();
        assert!(cpu.handle(&mut ctx, None, &parsed.tokens).is_err());
    }

    #[test]
    fn test_zero_page_forced_off() {
        let mut ctx = Context::new();
        let mut cpu = Mos6502::new();
        cpu.zp_mode = ZpMode::Off;
        ctx.memory.set_pc(0x600);

        let parsed = rasm_core::parse_line("  LDA 0x10", ctx.codepage).unwrap();
        cpu.handle(&mut ctx, None, &parsed.tokens).unwrap();
        assert_eq!(ctx.memory.read(0, 0x600), 0xad);
    }

    #[test]
    fn test_implied_set() {
        let ctx = assemble(&["  SEI", "  TXS", "  RTS"]);
        assert_eq!(bytes(&ctx, 3), vec![0x78, 0x9a, 0x60]);
    }

    #[test]
    fn test_undocumented() {
        let ctx = assemble(&["  LAX 0x10", "  SLO (0x20),Y", "  JAM"]);
        assert_eq!(bytes(&ctx, 5), vec![0xa7, 0x10, 0x13, 0x20, 0x02]);
    }

    #[test]
    fn test_requests_third_pass() {
        let mut state = PassState::new();
        Mos6502::new().init(&mut state);
        state.next_pass();
        assert!(!state.is_final_pass());
    }

    #[test]
    fn test_unsupported_mode() {
        let mut ctx = Context::new();
        let mut cpu = Mos6502::new();
        let parsed = rasm_core::parse_line("  BIT #2", ctx.codepage).unwrap();
        assert!(cpu.handle(&mut ctx, None, &parsed.tokens).is_err());
    }
}
