//! 65C816 backend.
//!
//! The 16-bit 6502 descendant: a 24-bit address space, direct-page /
//! absolute / long addressing picked by operand magnitude, and
//! accumulator/index registers whose width depends on processor state.
//! The assembler tracks those widths to size immediates — explicitly
//! via the `M8`/`M16`/`X8`/`X16`/`MX` directives or the `a16`/`i16`
//! options, and implicitly from `REP`/`SEP` immediates as the code
//! switches modes.
//!
//! Because operand magnitude selects the encoding, instruction lengths
//! move between passes and the backend requests a third one.

use rasm_core::{PassState, Token, WordMode, to_unsigned};

use crate::cmd::{CmdResult, CmdStatus, OptionEntry, argc_check, true_false};
use crate::context::Context;

use super::CpuBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddrMode {
    Accumulator,
    Implied,
    Immediate,
    Absolute,
    AbsIndexXIndirect,
    AbsX,
    AbsY,
    AbsIndirect,
    AbsIndirectLong,
    AbsLong,
    AbsLongX,
    DirectPage,
    DpX,
    DpY,
    DpIndirect,
    DpIndirectLong,
    DpXIndirect,
    DpIndirectY,
    DpIndirectYLong,
    StackRelative,
    StackRelIndirectY,
}

fn mode_name(mode: AddrMode) -> &'static str {
    match mode {
        AddrMode::Accumulator => "Accumulator",
        AddrMode::Implied => "Implied",
        AddrMode::Immediate => "Immediate",
        AddrMode::Absolute => "Absolute",
        AddrMode::AbsIndexXIndirect => "Absolute Index X, Indirect",
        AddrMode::AbsX => "Absolute, Index X",
        AddrMode::AbsY => "Absolute, Index Y",
        AddrMode::AbsIndirect => "Absolute Indirect",
        AddrMode::AbsIndirectLong => "Absolute Indirect Long",
        AddrMode::AbsLong => "Absolute Long",
        AddrMode::AbsLongX => "Absolute Long, Index X",
        AddrMode::DirectPage => "Direct Page",
        AddrMode::DpX => "Direct Page, Index X",
        AddrMode::DpY => "Direct Page, Index Y",
        AddrMode::DpIndirect => "Direct Page Indirect",
        AddrMode::DpIndirectLong => "Direct Page Indirect Long",
        AddrMode::DpXIndirect => "Direct Page Index X, Indirect",
        AddrMode::DpIndirectY => "Direct Page, Indirect, Index Y",
        AddrMode::DpIndirectYLong => "Direct Page, Indirect, Index Y Long",
        AddrMode::StackRelative => "Stack Relative",
        AddrMode::StackRelIndirectY => "Stack Relative Indirect Index Y",
    }
}

/// How an encoding writes its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    None,
    Byte,
    Word,
    Long,
    /// Immediate sized by the accumulator width.
    ImmA,
    /// Immediate sized by the index width.
    ImmXY,
}

/// Pick direct page, the plain form or the long form by operand
/// magnitude. `None` for a tier means the mode has no such encoding.
fn range_mode(
    value: i64,
    dp: Option<AddrMode>,
    norm: Option<AddrMode>,
    long: Option<AddrMode>,
) -> Result<AddrMode, String> {
    let picked = if (0..=0xff).contains(&value) {
        dp
    } else if value > 0xffff {
        long
    } else {
        norm
    };

    picked.ok_or_else(|| format!("value {value} out of range of allowable addressing modes"))
}

/// Split `text` at its first comma: `("10,S")` → (`"10"`, `'S'`).
fn split_index(text: &str) -> Option<(&str, char)> {
    let comma = text.find(',')?;
    let index = text[comma + 1..].trim().chars().next().unwrap_or('\0');
    Some((&text[..comma], index))
}

fn classify(ctx: &Context, args: &[Token]) -> Result<(AddrMode, i64), String> {
    use AddrMode::*;

    if args.len() == 1 {
        return Ok((Implied, 0));
    }

    let arg = &args[1];

    if args.len() == 2 && arg.quote.is_none() && arg.text.eq_ignore_ascii_case("A") {
        return Ok((Accumulator, 0));
    }

    if args.len() == 2
        && arg.quote.is_none()
        && let Some(imm) = arg.text.strip_prefix('#')
    {
        return Ok((Immediate, ctx.eval_arg(&arg.text, imm)?));
    }

    if args.len() == 2 && arg.quote.is_none() {
        let value = ctx.eval_arg(&arg.text, &arg.text)?;
        let mode = range_mode(value, Some(DirectPage), Some(Absolute), Some(AbsLong))?;
        return Ok((mode, value));
    }

    // ($nn) / ($nnnn) / ($nn,X) / ($nnnn,X)
    if args.len() == 2 && arg.quote == Some('(') {
        match split_index(&arg.text) {
            None => {
                let value = ctx.eval_arg(&arg.text, &arg.text)?;
                let mode = range_mode(value, Some(DpIndirect), Some(AbsIndirect), None)?;
                return Ok((mode, value));
            }
            Some((inner, index)) => {
                if !index.eq_ignore_ascii_case(&'x') {
                    return Err(format!("illegal index register '{}'", arg.text));
                }
                let value = ctx.eval_arg(inner, inner)?;
                let mode = range_mode(value, Some(DpXIndirect), Some(AbsIndexXIndirect), None)?;
                return Ok((mode, value));
            }
        }
    }

    // [$nn] / [$nnnn]
    if args.len() == 2 && arg.quote == Some('[') {
        let value = ctx.eval_arg(&arg.text, &arg.text)?;
        let mode = range_mode(value, Some(DpIndirectLong), Some(AbsIndirectLong), None)?;
        return Ok((mode, value));
    }

    // addr,X / addr,Y / sr,S
    if args.len() == 3 && arg.quote.is_none() {
        let value = ctx.eval_arg(&arg.text, &arg.text)?;
        let index = &args[2].text;

        let mode = if index.eq_ignore_ascii_case("X") {
            range_mode(value, Some(DpX), Some(AbsX), Some(AbsLongX))?
        } else if index.eq_ignore_ascii_case("Y") {
            range_mode(value, Some(DpY), Some(AbsY), None)?
        } else if index.eq_ignore_ascii_case("S") {
            StackRelative
        } else {
            return Err(format!("unknown index register '{index}'"));
        };

        return Ok((mode, value));
    }

    // ($nn),Y / ($nn,S),Y / [$nn],Y
    if args.len() == 3 && matches!(arg.quote, Some('(') | Some('[')) {
        if !args[2].text.eq_ignore_ascii_case("y") {
            return Err(format!(
                "illegal index register '{}' used for addressing mode",
                args[2].text
            ));
        }

        if arg.quote == Some('(') {
            return match split_index(&arg.text) {
                None => {
                    let value = ctx.eval_arg(&arg.text, &arg.text)?;
                    let mode = range_mode(value, Some(DpIndirectY), None, None)?;
                    Ok((mode, value))
                }
                Some((inner, index)) => {
                    if !index.eq_ignore_ascii_case(&'s') {
                        return Err(format!("illegal index register '{index}'"));
                    }
                    let value = ctx.eval_arg(inner, inner)?;
                    let mode = range_mode(value, Some(StackRelIndirectY), None, None)?;
                    Ok((mode, value))
                }
            };
        }

        let value = ctx.eval_arg(&arg.text, &arg.text)?;
        let mode = range_mode(value, Some(DpIndirectYLong), None, None)?;
        return Ok((mode, value));
    }

    Err(format!("{}: couldn't work out addressing mode", args[0].text))
}

/// The regular ALU group: mode → opcode-offset from a per-mnemonic
/// base, the structure the hardware encodes directly.
static COMMON_MODES: &[(AddrMode, u8, Width)] = &[
    (AddrMode::DpXIndirect, 0x01, Width::Byte),
    (AddrMode::StackRelative, 0x03, Width::Byte),
    (AddrMode::DirectPage, 0x05, Width::Byte),
    (AddrMode::DpIndirectLong, 0x07, Width::Byte),
    (AddrMode::Immediate, 0x09, Width::ImmA),
    (AddrMode::Absolute, 0x0d, Width::Word),
    (AddrMode::AbsLong, 0x0f, Width::Long),
    (AddrMode::DpIndirectY, 0x11, Width::Byte),
    (AddrMode::DpIndirect, 0x12, Width::Byte),
    (AddrMode::StackRelIndirectY, 0x13, Width::Byte),
    (AddrMode::DpX, 0x15, Width::Byte),
    (AddrMode::DpIndirectYLong, 0x17, Width::Byte),
    (AddrMode::AbsY, 0x19, Width::Word),
    (AddrMode::AbsX, 0x1d, Width::Word),
    (AddrMode::AbsLongX, 0x1f, Width::Long),
];

static COMMON_BASES: &[(&str, u8)] = &[
    ("ORA", 0x00),
    ("AND", 0x20),
    ("EOR", 0x40),
    ("ADC", 0x60),
    ("STA", 0x80),
    ("LDA", 0xa0),
    ("CMP", 0xc0),
    ("SBC", 0xe0),
];

struct Instruction {
    op: &'static str,
    modes: &'static [(AddrMode, u8, Width)],
}

use AddrMode::*;
use Width::{Byte, ImmA, ImmXY, Long, Word};

static INSTRUCTIONS: &[Instruction] = &[
    Instruction {
        op: "ASL",
        modes: &[
            (DirectPage, 0x06, Byte), (Accumulator, 0x0a, Width::None), (Implied, 0x0a, Width::None),
            (Absolute, 0x0e, Word), (DpX, 0x16, Byte), (AbsX, 0x1e, Word),
        ],
    },
    Instruction {
        op: "LSR",
        modes: &[
            (DirectPage, 0x46, Byte), (Accumulator, 0x4a, Width::None), (Implied, 0x4a, Width::None),
            (Absolute, 0x4e, Word), (DpX, 0x56, Byte), (AbsX, 0x5e, Word),
        ],
    },
    Instruction {
        op: "ROL",
        modes: &[
            (DirectPage, 0x26, Byte), (Accumulator, 0x2a, Width::None), (Implied, 0x2a, Width::None),
            (Absolute, 0x2e, Word), (DpX, 0x36, Byte), (AbsX, 0x3e, Word),
        ],
    },
    Instruction {
        op: "ROR",
        modes: &[
            (DirectPage, 0x66, Byte), (Accumulator, 0x6a, Width::None), (Implied, 0x6a, Width::None),
            (Absolute, 0x6e, Word), (DpX, 0x76, Byte), (AbsX, 0x7e, Word),
        ],
    },
    Instruction {
        op: "BIT",
        modes: &[
            (DirectPage, 0x24, Byte), (Absolute, 0x2c, Word), (DpX, 0x34, Byte),
            (AbsX, 0x3c, Word), (Immediate, 0x89, ImmA),
        ],
    },
    Instruction { op: "TRB", modes: &[(DirectPage, 0x14, Byte), (Absolute, 0x1c, Word)] },
    Instruction { op: "TSB", modes: &[(DirectPage, 0x04, Byte), (Absolute, 0x0c, Word)] },
    Instruction {
        op: "CPX",
        modes: &[(Immediate, 0xe0, ImmXY), (Absolute, 0xec, Word), (DirectPage, 0xe4, Byte)],
    },
    Instruction {
        op: "CPY",
        modes: &[(Immediate, 0xc0, ImmXY), (Absolute, 0xcc, Word), (DirectPage, 0xc4, Byte)],
    },
    Instruction {
        op: "DEC",
        modes: &[
            (Implied, 0x3a, Width::None), (Accumulator, 0x3a, Width::None), (DirectPage, 0xc6, Byte),
            (Absolute, 0xce, Word), (DpX, 0xd6, Byte), (AbsX, 0xde, Word),
        ],
    },
    Instruction {
        op: "INC",
        modes: &[
            (Implied, 0x1a, Width::None), (Accumulator, 0x1a, Width::None), (DirectPage, 0xe6, Byte),
            (Absolute, 0xee, Word), (DpX, 0xf6, Byte), (AbsX, 0xfe, Word),
        ],
    },
    Instruction {
        op: "JMP",
        modes: &[
            (DirectPage, 0x4c, Word), (Absolute, 0x4c, Word), (AbsLong, 0x5c, Long),
            (AbsIndirect, 0x6c, Word), (AbsIndexXIndirect, 0x7c, Word),
            (AbsIndirectLong, 0xdc, Word),
        ],
    },
    Instruction {
        op: "JSL",
        modes: &[
            (DirectPage, 0x22, Long), (Absolute, 0x22, Long), (AbsLong, 0x22, Long),
        ],
    },
    Instruction {
        op: "JSR",
        modes: &[
            (Absolute, 0x20, Word), (DirectPage, 0x20, Word),
            (AbsIndexXIndirect, 0xfc, Word),
        ],
    },
    Instruction {
        op: "LDX",
        modes: &[
            (Immediate, 0xa2, ImmXY), (DirectPage, 0xa6, Byte), (Absolute, 0xae, Word),
            (DpY, 0xb6, Byte), (AbsY, 0xbe, Word),
        ],
    },
    Instruction {
        op: "LDY",
        modes: &[
            (Immediate, 0xa0, ImmXY), (DirectPage, 0xa4, Byte), (Absolute, 0xac, Word),
            (DpX, 0xb4, Byte), (AbsX, 0xbc, Word),
        ],
    },
    Instruction { op: "STX", modes: &[(DirectPage, 0x86, Byte), (Absolute, 0x8e, Word), (DpY, 0x96, Byte)] },
    Instruction { op: "STY", modes: &[(DirectPage, 0x84, Byte), (Absolute, 0x8c, Word), (DpX, 0x94, Byte)] },
    Instruction {
        op: "STZ",
        modes: &[
            (DirectPage, 0x64, Byte), (DpX, 0x74, Byte), (Absolute, 0x9c, Word),
            (AbsX, 0x9e, Word),
        ],
    },
    Instruction { op: "COP", modes: &[(DirectPage, 0x02, Byte), (Immediate, 0x02, Byte)] },
    Instruction { op: "PEA", modes: &[(DirectPage, 0xf4, Word), (Immediate, 0xf4, Word), (Absolute, 0xf4, Word)] },
    Instruction { op: "PEI", modes: &[(DirectPage, 0xd4, Byte)] },
    Instruction { op: "PER", modes: &[(DirectPage, 0x62, Word), (Immediate, 0x62, Word), (Absolute, 0x62, Word)] },
];

static IMPLIED_OPCODES: &[(&str, u8)] = &[
    ("NOP", 0xea),
    ("TAX", 0xaa),
    ("TXA", 0x8a),
    ("TAY", 0xa8),
    ("TYA", 0x98),
    ("TXS", 0x9a),
    ("TSX", 0xba),
    ("TXY", 0x9b),
    ("TYX", 0xbb),
    ("TCD", 0x5b),
    ("TCS", 0x1b),
    ("TDC", 0x7b),
    ("TSC", 0x3b),
    ("XBA", 0xeb),
    ("XCE", 0xfb),
    ("DEX", 0xca),
    ("DEY", 0x88),
    ("INX", 0xe8),
    ("INY", 0xc8),
    ("PHA", 0x48),
    ("PHX", 0xda),
    ("PHY", 0x5a),
    ("PHB", 0x8b),
    ("PHD", 0x0b),
    ("PHK", 0x4b),
    ("PHP", 0x08),
    ("PLA", 0x68),
    ("PLX", 0xfa),
    ("PLY", 0x7a),
    ("PLB", 0xab),
    ("PLD", 0x2b),
    ("PLP", 0x28),
    ("CLC", 0x18),
    ("SEC", 0x38),
    ("CLI", 0x58),
    ("SEI", 0x78),
    ("CLV", 0xb8),
    ("CLD", 0xd8),
    ("SED", 0xf8),
    ("RTI", 0x40),
    ("RTL", 0x6b),
    ("RTS", 0x60),
    ("STP", 0xdb),
    ("WAI", 0xcb),
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
    ("BRA", 0x80),
];

static OPTIONS: &[OptionEntry] = &[
    OptionEntry { name: "a16", tag: 0 },
    OptionEntry { name: "i16", tag: 1 },
];

pub struct W65c816 {
    a16: bool,
    i16: bool,
}

impl W65c816 {
    pub fn new() -> W65c816 {
        W65c816 { a16: false, i16: false }
    }

    fn write_operand(&self, ctx: &mut Context, width: Width, value: i64) {
        match width {
            Width::None => {}
            Width::Byte => ctx.memory.pc_write(value),
            Width::Word => ctx.memory.pc_write_word(value),
            Width::Long => {
                let v = to_unsigned(24, value);
                ctx.memory.pc_write(v);
                ctx.memory.pc_write_word(v >> 8);
            }
            Width::ImmA => {
                if self.a16 {
                    ctx.memory.pc_write_word(value);
                } else {
                    ctx.memory.pc_write(value);
                }
            }
            Width::ImmXY => {
                if self.i16 {
                    ctx.memory.pc_write_word(value);
                } else {
                    ctx.memory.pc_write(value);
                }
            }
        }
    }

    /// The register-width directives: M8/M16, X8/X16 and `MX a,i`.
    fn width_directive(&mut self, ctx: &Context, command: &str, args: &[Token]) -> CmdResult {
        match (command, args.len()) {
            ("M8", 1) => self.a16 = false,
            ("M16", 1) => self.a16 = true,
            ("X8", 1) => self.i16 = false,
            ("X16", 1) => self.i16 = true,
            ("MX", 3) => {
                let asize = ctx.eval_arg(command, &args[1].text)?;
                let isize = ctx.eval_arg(command, &args[2].text)?;

                if !matches!(asize, 8 | 16) || !matches!(isize, 8 | 16) {
                    return Err(format!(
                        "{}: unsupported register sizes {},{}",
                        args[0].text, args[1].text, args[2].text
                    ));
                }

                self.a16 = asize == 16;
                self.i16 = isize == 16;
            }
            _ => return Err(format!("{}: bad directive", args[0].text)),
        }

        Ok(CmdStatus::Ok)
    }

    fn rep_sep(&mut self, ctx: &mut Context, opcode: u8, sets_16: bool, args: &[Token]) -> CmdResult {
        let (mode, value) = classify(ctx, args)?;

        if !matches!(mode, AddrMode::DirectPage | AddrMode::Immediate) {
            return Err(format!(
                "{}: unsupported addressing mode {}",
                args[0].text,
                mode_name(mode)
            ));
        }

        ctx.memory.pc_write(i64::from(opcode));
        ctx.memory.pc_write(value);

        // Track register widths through the status-bit changes so
        // later immediates are sized correctly.
        if value & 0x20 != 0 {
            self.a16 = sets_16;
        }
        if value & 0x10 != 0 {
            self.i16 = sets_16;
        }

        Ok(CmdStatus::Ok)
    }

    fn signature_op(&self, ctx: &mut Context, opcode: u8, args: &[Token]) -> CmdResult {
        let (mode, value) = classify(ctx, args)?;

        ctx.memory.pc_write(i64::from(opcode));
        ctx.memory.pc_write(if mode == AddrMode::Accumulator { 0 } else { value });

        Ok(CmdStatus::Ok)
    }

    fn mvn_mvp(&self, ctx: &mut Context, opcode: u8, args: &[Token]) -> CmdResult {
        argc_check(args, 3)?;

        let (mode1, addr1) = classify(ctx, &args[..2])?;
        let (mode2, addr2) = classify(ctx, &[args[0].clone(), args[2].clone()])?;

        if mode1 == AddrMode::Immediate && mode2 == AddrMode::Immediate {
            ctx.memory.pc_write(i64::from(opcode));
            ctx.memory.pc_write(addr1);
            ctx.memory.pc_write(addr2);
            return Ok(CmdStatus::Ok);
        }

        Err(format!(
            "{}: unsupported addressing mode(s) {}, {}",
            args[0].text, args[1].text, args[2].text
        ))
    }
}

impl Default for W65c816 {
    fn default() -> W65c816 {
        W65c816::new()
    }
}

impl CpuBackend for W65c816 {
    fn name(&self) -> &'static str {
        "65c816"
    }

    fn address_space(&self) -> u32 {
        0x1000000
    }

    fn word_mode(&self) -> WordMode {
        WordMode::LsbFirst
    }

    fn init(&mut self, state: &mut PassState) {
        self.a16 = false;
        self.i16 = false;
        // Operand magnitude selects direct page vs absolute vs long,
        // so lengths move between passes.
        state.set_needed_passes(3);
    }

    fn options(&self) -> &'static [OptionEntry] {
        OPTIONS
    }

    fn set_option(&mut self, tag: u32, args: &[Token], _ctx: &Context) -> CmdResult {
        argc_check(args, 1)?;

        match tag {
            0 => self.a16 = true_false(&args[0].text, false),
            1 => self.i16 = true_false(&args[0].text, false),
            _ => {}
        }

        Ok(CmdStatus::Ok)
    }

    fn handle(&mut self, ctx: &mut Context, _label: Option<&str>, args: &[Token]) -> CmdResult {
        let mut command = args[0].text.to_ascii_uppercase();
        if let Some(stripped) = command.strip_prefix('.') {
            command = stripped.to_string();
        }

        if matches!(command.as_str(), "M8" | "M16" | "X8" | "X16" | "MX") {
            return self.width_directive(ctx, &command, args);
        }

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

        if command == "BRL" {
            argc_check(args, 2)?;

            let target = ctx.eval_arg(&command, &args[1].text)?;
            let offset = target - (i64::from(ctx.memory.pc()) + 3);

            if ctx.state.is_final_pass() && !(-32768..=32767).contains(&offset) {
                return Err(format!("{}: Branch offset ({offset}) too big", args[1].text));
            }

            ctx.memory.pc_write(0x82);
            ctx.memory.pc_write_word(offset);
            return Ok(CmdStatus::Ok);
        }

        match command.as_str() {
            "REP" => return self.rep_sep(ctx, 0xc2, true, args),
            "SEP" => return self.rep_sep(ctx, 0xe2, false, args),
            "MVN" => return self.mvn_mvp(ctx, 0x54, args),
            "MVP" => return self.mvn_mvp(ctx, 0x44, args),
            "WDM" => return self.signature_op(ctx, 0x42, args),
            "BRK" => return self.signature_op(ctx, 0x00, args),
            _ => {}
        }

        if let Some(&(_, base)) = COMMON_BASES.iter().find(|(op, _)| *op == command) {
            let (mode, value) = classify(ctx, args)?;

            let Some(&(_, offset, width)) = COMMON_MODES.iter().find(|&&(m, _, _)| m == mode)
            else {
                return Err(format!(
                    "{command}: unsupported addressing mode {}",
                    mode_name(mode)
                ));
            };

            ctx.memory.pc_write(i64::from(base + offset));
            self.write_operand(ctx, width, value);
            return Ok(CmdStatus::Ok);
        }

        let Some(instruction) = INSTRUCTIONS.iter().find(|i| i.op == command) else {
            return Ok(CmdStatus::NotKnown);
        };

        let (mode, value) = classify(ctx, args)?;

        let Some(&(_, opcode, width)) =
            instruction.modes.iter().find(|&&(m, _, _)| m == mode)
        else {
            return Err(format!(
                "{command}: unsupported addressing mode {}",
                mode_name(mode)
            ));
        };

        ctx.memory.pc_write(i64::from(opcode));
        self.write_operand(ctx, width, value);

        Ok(CmdStatus::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(lines: &[&str]) -> Context {
        let mut ctx = Context::new();
        let mut cpu = W65c816::new();
        ctx.memory.set_address_space(0x1000000);
        ctx.memory.set_pc(0x8000);

        for line in lines {
            let parsed = rasm_core::parse_line(line, ctx.codepage).unwrap();
            cpu.handle(&mut ctx, None, &parsed.tokens).unwrap();
        }

        ctx
    }

    fn bytes(ctx: &Context, count: u32) -> Vec<u8> {
        (0..count).map(|i| ctx.memory.read(0, 0x8000 + i)).collect()
    }

    #[test]
    fn test_magnitude_selects_mode() {
        let ctx = assemble(&["  LDA 0x10", "  LDA 0x1234", "  LDA 0x123456"]);
        assert_eq!(
            bytes(&ctx, 9),
            vec![0xa5, 0x10, 0xad, 0x34, 0x12, 0xaf, 0x56, 0x34, 0x12]
        );
    }

    #[test]
    fn test_immediate_widths_follow_m_x() {
        let ctx = assemble(&["  LDA #1", "  M16", "  LDA #1", "  X16", "  LDX #2"]);
        assert_eq!(
            bytes(&ctx, 8),
            vec![0xa9, 0x01, 0xa9, 0x01, 0x00, 0xa2, 0x02, 0x00]
        );
    }

    #[test]
    fn test_rep_sep_track_widths() {
        let ctx = assemble(&["  REP #0x30", "  LDA #1", "  SEP #0x20", "  LDA #1"]);
        assert_eq!(
            bytes(&ctx, 9),
            vec![0xc2, 0x30, 0xa9, 0x01, 0x00, 0xe2, 0x20, 0xa9, 0x01]
        );
    }

    #[test]
    fn test_dec_inc_indexed_encodings() {
        let ctx = assemble(&["  DEC 0x1234,X", "  INC 0x1234,X"]);
        assert_eq!(
            bytes(&ctx, 6),
            vec![0xde, 0x34, 0x12, 0xfe, 0x34, 0x12]
        );
    }

    #[test]
    fn test_stack_relative() {
        let ctx = assemble(&["  LDA 3,S", "  STA (5,S),Y"]);
        assert_eq!(bytes(&ctx, 4), vec![0xa3, 0x03, 0x93, 0x05]);
    }

    #[test]
    fn test_indirect_long() {
        let ctx = assemble(&["  LDA [0x10]", "  LDA [0x20],Y"]);
        assert_eq!(bytes(&ctx, 4), vec![0xa7, 0x10, 0xb7, 0x20]);
    }

    #[test]
    fn test_jmp_forms() {
        let ctx = assemble(&["  JMP 0x1234", "  JMP 0x123456", "  JMP (0x1234)", "  JSL 0x123456"]);
        assert_eq!(
            bytes(&ctx, 14),
            vec![
                0x4c, 0x34, 0x12, 0x5c, 0x56, 0x34, 0x12, 0x6c, 0x34, 0x12, 0x22, 0x56,
                0x34, 0x12
            ]
        );
    }

    #[test]
    fn test_mvn() {
        let ctx = assemble(&["  MVN #1,#2"]);
        assert_eq!(bytes(&ctx, 3), vec![0x54, 0x01, 0x02]);
    }

    #[test]
    fn test_long_branch() {
        let ctx = assemble(&["  BRL 0x8003"]);
        assert_eq!(bytes(&ctx, 3), vec![0x82, 0x00, 0x00]);
    }

    #[test]
    fn test_branch_out_of_range() {
        let mut ctx = Context::new();
        let mut cpu = W65c816::new();
        ctx.state.next_pass();
        ctx.state.next_pass();
        ctx.memory.set_pc(0x8000);

        let parsed = rasm_core::parse_line("  BRA 0x9000", ctx.codepage).unwrap();
        assert!(cpu.handle(&mut ctx, None, &parsed.tokens).is_err());
    }

    #[test]
    fn test_implied() {
        let ctx = assemble(&["  XBA", "  PHK", "  RTL"]);
        assert_eq!(bytes(&ctx, 3), vec![0xeb, 0x4b, 0x6b]);
    }
}
