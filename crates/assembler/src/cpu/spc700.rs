//! SPC-700 backend.
//!
//! Sony's audio CPU pairs 6502-style direct-page addressing with its
//! own register indirections: `(X)`, `(Y)`, the post-incrementing
//! `(X)+`, the `dp+X` forms and the 16-bit `YA` pair. Direct page
//! versus absolute is selected like the 6502's zero page — on, off or
//! automatic by operand value — so the backend requests a third pass.
//!
//! Bit instructions (`SET1`/`CLR1`, `BBS`/`BBC`, the carry-flag ops and
//! `NOT1`) take `addr.bit` operands; `/addr.bit` denotes the inverted
//! bit in the carry ops.

use rasm_core::{PassState, Token};

use crate::cmd::{CmdResult, CmdStatus, OptionEntry, argc_check};
use crate::context::Context;

use super::CpuBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddrMode {
    Accumulator,
    XRegister,
    YRegister,
    YaRegister,
    SpRegister,
    CarryFlag,
    Psw,
    NottedBit,
    IndirectX,
    IndirectY,
    IndirectXInc,
    Implied,
    Immediate,
    Absolute,
    DirectPage,
    AbsoluteX,
    AbsoluteY,
    DpX,
    DpY,
    DpIndirectX,
    DpIndirectY,
}

fn mode_name(mode: AddrMode) -> &'static str {
    match mode {
        AddrMode::Accumulator => "Accumulator",
        AddrMode::XRegister => "X register",
        AddrMode::YRegister => "Y register",
        AddrMode::YaRegister => "YA register",
        AddrMode::SpRegister => "Stack Pointer",
        AddrMode::CarryFlag => "Carry flag",
        AddrMode::Psw => "PSW register",
        AddrMode::NottedBit => "Notted (/) bit",
        AddrMode::IndirectX => "Indirect X",
        AddrMode::IndirectY => "Indirect Y",
        AddrMode::IndirectXInc => "Indirect X increment",
        AddrMode::Implied => "Implied",
        AddrMode::Immediate => "Immediate",
        AddrMode::Absolute => "Absolute",
        AddrMode::DirectPage => "Direct Page",
        AddrMode::AbsoluteX => "Absolute, index X",
        AddrMode::AbsoluteY => "Absolute, index Y",
        AddrMode::DpX => "Direct Page, index X",
        AddrMode::DpY => "Direct Page, index Y",
        AddrMode::DpIndirectX => "Direct Page, indirect X",
        AddrMode::DpIndirectY => "Direct Page, indirect Y",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZpMode {
    Off,
    On,
    Auto,
}

static OPTIONS: &[OptionEntry] = &[OptionEntry { name: "zero-page", tag: 0 }];

fn zp_select(
    zp_mode: ZpMode,
    address: i64,
    dp: AddrMode,
    absolute: AddrMode,
) -> Result<AddrMode, String> {
    match zp_mode {
        ZpMode::On => {
            if !(0..=255).contains(&address) {
                Err(format!("value {address} outside of zero page"))
            } else {
                Ok(dp)
            }
        }
        ZpMode::Off => Ok(absolute),
        ZpMode::Auto => {
            if (0..=255).contains(&address) {
                Ok(dp)
            } else {
                Ok(absolute)
            }
        }
    }
}

/// Classify one argument.
fn classify(
    ctx: &Context,
    arg: &Token,
    zp_mode: ZpMode,
) -> Result<(AddrMode, i64), String> {
    use AddrMode::*;

    let text = arg.text.as_str();

    match text.to_ascii_uppercase().as_str() {
        "A" => return Ok((Accumulator, 0)),
        "C" => return Ok((CarryFlag, 0)),
        "PSW" => return Ok((Psw, 0)),
        "YA" => return Ok((YaRegister, 0)),
        "SP" => return Ok((SpRegister, 0)),
        "X" => {
            return Ok((if arg.quote == Some('(') { IndirectX } else { XRegister }, 0));
        }
        "Y" => {
            return Ok((if arg.quote == Some('(') { IndirectY } else { YRegister }, 0));
        }
        "(X)+" => return Ok((IndirectXInc, 0)),
        _ => {}
    }

    if let Some(rest) = text.strip_prefix('/') {
        return Ok((NottedBit, ctx.eval_arg(rest, rest)?));
    }

    if let Some(rest) = text.strip_prefix('#') {
        return Ok((Immediate, ctx.eval_arg(text, rest)?));
    }

    if let Some(plus) = text.rfind('+') {
        let (left, index) = (&text[..plus], text[plus + 1..].trim());

        // (dp+X)
        if arg.quote == Some('(') && index.eq_ignore_ascii_case("X") {
            return Ok((DpIndirectX, ctx.eval_arg(left, left)?));
        }

        // (dp)+Y — the closing paren keeps the token unquoted, so the
        // parens are still in the text.
        if arg.quote.is_none()
            && index.eq_ignore_ascii_case("Y")
            && let Some(inner) = left.strip_prefix('(').and_then(|s| s.strip_suffix(')'))
        {
            return Ok((DpIndirectY, ctx.eval_arg(inner, inner)?));
        }

        if arg.quote.is_none() && index.eq_ignore_ascii_case("X") {
            let value = ctx.eval_arg(left, left)?;
            return Ok((zp_select(zp_mode, value, DpX, AbsoluteX)?, value));
        }

        if arg.quote.is_none() && index.eq_ignore_ascii_case("Y") {
            let value = ctx.eval_arg(left, left)?;
            return Ok((zp_select(zp_mode, value, DpY, AbsoluteY)?, value));
        }
    }

    let value = ctx.eval_arg(text, text)?;
    Ok((zp_select(zp_mode, value, DirectPage, Absolute)?, value))
}

fn classify_arg(
    ctx: &Context,
    args: &[Token],
    index: usize,
    zp_mode: ZpMode,
) -> Result<(AddrMode, i64), String> {
    if args.len() == 1 {
        return Ok((AddrMode::Implied, 0));
    }
    classify(ctx, &args[index], zp_mode)
}

/// An `addr.bit` operand for the bit instructions.
fn classify_bit(ctx: &Context, text: &str) -> Result<(i64, i64), String> {
    let Some(dot) = text.rfind('.') else {
        return Err(format!("{text}: expected an address.bit operand"));
    };

    let addr = ctx.eval_arg(text, &text[..dot])?;
    let bit = ctx.eval_arg(text, &text[dot + 1..])?;

    if !(0..=7).contains(&bit) {
        return Err(format!("{text}: illegal value {bit} for bit number"));
    }

    Ok((addr, bit))
}

#[derive(Debug, Clone, Copy)]
enum Code {
    B(u8),
    ByteLhs,
    WordLhs,
    ByteRhs,
    WordRhs,
}

struct PairCode {
    lhs: AddrMode,
    rhs: AddrMode,
    code: &'static [Code],
}

fn write_pair_codes(
    ctx: &mut Context,
    command: &str,
    codes: &[PairCode],
    lhs: (AddrMode, i64),
    rhs: (AddrMode, i64),
) -> CmdResult {
    for entry in codes {
        if entry.lhs != lhs.0 || entry.rhs != rhs.0 {
            continue;
        }

        for step in entry.code {
            match step {
                Code::B(b) => ctx.memory.pc_write(i64::from(*b)),
                Code::ByteLhs => ctx.memory.pc_write(lhs.1),
                Code::WordLhs => ctx.memory.pc_write_word(lhs.1),
                Code::ByteRhs => ctx.memory.pc_write(rhs.1),
                Code::WordRhs => ctx.memory.pc_write_word(rhs.1),
            }
        }

        return Ok(CmdStatus::Ok);
    }

    Err(format!(
        "{command}: no code generation for register pair {}/{}",
        mode_name(lhs.0),
        mode_name(rhs.0)
    ))
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    Bare,
    ByteRhs,
    WordRhs,
    /// Destination byte then source byte.
    Both,
}

/// The regular two-operand ALU pattern shared by OR/AND/EOR/ADC/SBC
/// and CMP's accumulator rows: the opcode is a per-mnemonic base plus
/// a fixed offset for the addressing pair.
static ALU_PAIRS: &[(AddrMode, AddrMode, u8, Shape)] = &[
    (AddrMode::Accumulator, AddrMode::Immediate, 0x08, Shape::ByteRhs),
    (AddrMode::Accumulator, AddrMode::IndirectX, 0x06, Shape::Bare),
    (AddrMode::Accumulator, AddrMode::DirectPage, 0x04, Shape::ByteRhs),
    (AddrMode::Accumulator, AddrMode::DpX, 0x14, Shape::ByteRhs),
    (AddrMode::Accumulator, AddrMode::Absolute, 0x05, Shape::WordRhs),
    (AddrMode::Accumulator, AddrMode::AbsoluteX, 0x15, Shape::WordRhs),
    (AddrMode::Accumulator, AddrMode::AbsoluteY, 0x16, Shape::WordRhs),
    (AddrMode::Accumulator, AddrMode::DpIndirectX, 0x07, Shape::ByteRhs),
    (AddrMode::Accumulator, AddrMode::DpIndirectY, 0x17, Shape::ByteRhs),
    (AddrMode::IndirectX, AddrMode::IndirectY, 0x19, Shape::Bare),
    (AddrMode::DirectPage, AddrMode::DirectPage, 0x09, Shape::Both),
    (AddrMode::DirectPage, AddrMode::Immediate, 0x18, Shape::Both),
];

/// Emit one ALU-pattern instruction, or report that the pair has no
/// encoding.
fn alu_op(
    ctx: &mut Context,
    base: u8,
    lhs: (AddrMode, i64),
    rhs: (AddrMode, i64),
) -> Option<()> {
    let &(_, _, offset, shape) = ALU_PAIRS
        .iter()
        .find(|&&(l, r, _, _)| l == lhs.0 && r == rhs.0)?;

    ctx.memory.pc_write(i64::from(base + offset));
    match shape {
        Shape::Bare => {}
        Shape::ByteRhs => ctx.memory.pc_write(rhs.1),
        Shape::WordRhs => ctx.memory.pc_write_word(rhs.1),
        Shape::Both => {
            ctx.memory.pc_write(lhs.1);
            ctx.memory.pc_write(rhs.1);
        }
    }

    Some(())
}

static MOV_CODES: &[PairCode] = &[
    PairCode { lhs: AddrMode::Accumulator, rhs: AddrMode::Immediate, code: &[Code::B(0xe8), Code::ByteRhs] },
    PairCode { lhs: AddrMode::Accumulator, rhs: AddrMode::IndirectX, code: &[Code::B(0xe6)] },
    PairCode { lhs: AddrMode::Accumulator, rhs: AddrMode::IndirectXInc, code: &[Code::B(0xbf)] },
    PairCode { lhs: AddrMode::Accumulator, rhs: AddrMode::DirectPage, code: &[Code::B(0xe4), Code::ByteRhs] },
    PairCode { lhs: AddrMode::Accumulator, rhs: AddrMode::DpX, code: &[Code::B(0xf4), Code::ByteRhs] },
    PairCode { lhs: AddrMode::Accumulator, rhs: AddrMode::Absolute, code: &[Code::B(0xe5), Code::WordRhs] },
    PairCode { lhs: AddrMode::Accumulator, rhs: AddrMode::AbsoluteX, code: &[Code::B(0xf5), Code::WordRhs] },
    PairCode { lhs: AddrMode::Accumulator, rhs: AddrMode::AbsoluteY, code: &[Code::B(0xf6), Code::WordRhs] },
    PairCode { lhs: AddrMode::Accumulator, rhs: AddrMode::DpIndirectX, code: &[Code::B(0xe7), Code::ByteRhs] },
    PairCode { lhs: AddrMode::Accumulator, rhs: AddrMode::DpIndirectY, code: &[Code::B(0xf7), Code::ByteRhs] },
    PairCode { lhs: AddrMode::XRegister, rhs: AddrMode::Immediate, code: &[Code::B(0xcd), Code::ByteRhs] },
    PairCode { lhs: AddrMode::XRegister, rhs: AddrMode::DirectPage, code: &[Code::B(0xf8), Code::ByteRhs] },
    PairCode { lhs: AddrMode::XRegister, rhs: AddrMode::DpY, code: &[Code::B(0xf9), Code::ByteRhs] },
    PairCode { lhs: AddrMode::XRegister, rhs: AddrMode::Absolute, code: &[Code::B(0xe9), Code::WordRhs] },
    PairCode { lhs: AddrMode::YRegister, rhs: AddrMode::Immediate, code: &[Code::B(0x8d), Code::ByteRhs] },
    PairCode { lhs: AddrMode::YRegister, rhs: AddrMode::DirectPage, code: &[Code::B(0xeb), Code::ByteRhs] },
    PairCode { lhs: AddrMode::YRegister, rhs: AddrMode::DpX, code: &[Code::B(0xfb), Code::ByteRhs] },
    PairCode { lhs: AddrMode::YRegister, rhs: AddrMode::Absolute, code: &[Code::B(0xec), Code::WordRhs] },
    PairCode { lhs: AddrMode::IndirectX, rhs: AddrMode::Accumulator, code: &[Code::B(0xc6)] },
    PairCode { lhs: AddrMode::IndirectXInc, rhs: AddrMode::Accumulator, code: &[Code::B(0xaf)] },
    PairCode { lhs: AddrMode::DirectPage, rhs: AddrMode::Accumulator, code: &[Code::B(0xc4), Code::ByteLhs] },
    PairCode { lhs: AddrMode::DpX, rhs: AddrMode::Accumulator, code: &[Code::B(0xd4), Code::ByteLhs] },
    PairCode { lhs: AddrMode::Absolute, rhs: AddrMode::Accumulator, code: &[Code::B(0xc5), Code::WordLhs] },
    PairCode { lhs: AddrMode::AbsoluteX, rhs: AddrMode::Accumulator, code: &[Code::B(0xd5), Code::WordLhs] },
    PairCode { lhs: AddrMode::AbsoluteY, rhs: AddrMode::Accumulator, code: &[Code::B(0xd6), Code::WordLhs] },
    PairCode { lhs: AddrMode::DpIndirectX, rhs: AddrMode::Accumulator, code: &[Code::B(0xc7), Code::ByteLhs] },
    PairCode { lhs: AddrMode::DpIndirectY, rhs: AddrMode::Accumulator, code: &[Code::B(0xd7), Code::ByteLhs] },
    PairCode { lhs: AddrMode::DirectPage, rhs: AddrMode::XRegister, code: &[Code::B(0xd8), Code::ByteLhs] },
    PairCode { lhs: AddrMode::DpY, rhs: AddrMode::XRegister, code: &[Code::B(0xd9), Code::ByteLhs] },
    PairCode { lhs: AddrMode::Absolute, rhs: AddrMode::XRegister, code: &[Code::B(0xc9), Code::WordLhs] },
    PairCode { lhs: AddrMode::DirectPage, rhs: AddrMode::YRegister, code: &[Code::B(0xcb), Code::ByteLhs] },
    PairCode { lhs: AddrMode::DpX, rhs: AddrMode::YRegister, code: &[Code::B(0xdb), Code::ByteLhs] },
    PairCode { lhs: AddrMode::Absolute, rhs: AddrMode::YRegister, code: &[Code::B(0xcc), Code::WordLhs] },
    PairCode { lhs: AddrMode::Accumulator, rhs: AddrMode::XRegister, code: &[Code::B(0x7d)] },
    PairCode { lhs: AddrMode::Accumulator, rhs: AddrMode::YRegister, code: &[Code::B(0xdd)] },
    PairCode { lhs: AddrMode::XRegister, rhs: AddrMode::Accumulator, code: &[Code::B(0x5d)] },
    PairCode { lhs: AddrMode::YRegister, rhs: AddrMode::Accumulator, code: &[Code::B(0xfd)] },
    PairCode { lhs: AddrMode::XRegister, rhs: AddrMode::SpRegister, code: &[Code::B(0x9d)] },
    PairCode { lhs: AddrMode::SpRegister, rhs: AddrMode::XRegister, code: &[Code::B(0xbd)] },
    PairCode { lhs: AddrMode::DirectPage, rhs: AddrMode::DirectPage, code: &[Code::B(0xfa), Code::ByteLhs, Code::ByteRhs] },
    PairCode { lhs: AddrMode::DirectPage, rhs: AddrMode::Immediate, code: &[Code::B(0x8f), Code::ByteLhs, Code::ByteRhs] },
];

static CMP_EXTRA: &[PairCode] = &[
    PairCode { lhs: AddrMode::XRegister, rhs: AddrMode::Immediate, code: &[Code::B(0xc8), Code::ByteRhs] },
    PairCode { lhs: AddrMode::XRegister, rhs: AddrMode::DirectPage, code: &[Code::B(0x3e), Code::ByteRhs] },
    PairCode { lhs: AddrMode::XRegister, rhs: AddrMode::Absolute, code: &[Code::B(0x1e), Code::WordRhs] },
    PairCode { lhs: AddrMode::YRegister, rhs: AddrMode::Immediate, code: &[Code::B(0xad), Code::ByteRhs] },
    PairCode { lhs: AddrMode::YRegister, rhs: AddrMode::DirectPage, code: &[Code::B(0x7e), Code::ByteRhs] },
    PairCode { lhs: AddrMode::YRegister, rhs: AddrMode::Absolute, code: &[Code::B(0x5e), Code::WordRhs] },
];

/// `(mode, opcode, writes word)` rows for the one-operand
/// read-modify-write group.
struct RmwOp {
    accumulator: u8,
    dp: u8,
    dp_x: u8,
    absolute: u8,
}

fn rmw(ctx: &mut Context, args: &[Token], op: &RmwOp, zp: ZpMode, extra: &[(AddrMode, u8)]) -> CmdResult {
    argc_check(args, 2)?;

    let (mode, addr) = classify_arg(ctx, args, 1, zp)?;

    match mode {
        AddrMode::Accumulator => ctx.memory.pc_write(i64::from(op.accumulator)),
        AddrMode::DirectPage => {
            ctx.memory.pc_write(i64::from(op.dp));
            ctx.memory.pc_write(addr);
        }
        AddrMode::DpX => {
            ctx.memory.pc_write(i64::from(op.dp_x));
            ctx.memory.pc_write(addr);
        }
        AddrMode::Absolute => {
            ctx.memory.pc_write(i64::from(op.absolute));
            ctx.memory.pc_write_word(addr);
        }
        _ => {
            if let Some(&(_, code)) = extra.iter().find(|&&(m, _)| m == mode) {
                ctx.memory.pc_write(i64::from(code));
            } else {
                return Err(format!(
                    "{}: unsupported addressing mode {}",
                    args[0].text,
                    mode_name(mode)
                ));
            }
        }
    }

    Ok(CmdStatus::Ok)
}

/// 16-bit `YA` operations against a direct-page word.
fn ya_word(ctx: &mut Context, args: &[Token], opcode: u8, zp: ZpMode) -> CmdResult {
    argc_check(args, 3)?;

    let lhs = classify_arg(ctx, args, 1, zp)?;
    let rhs = classify_arg(ctx, args, 2, zp)?;

    if lhs.0 != AddrMode::YaRegister || rhs.0 != AddrMode::DirectPage {
        return Err(format!(
            "{}: no code generation for register pair {}/{}",
            args[0].text,
            mode_name(lhs.0),
            mode_name(rhs.0)
        ));
    }

    ctx.memory.pc_write(i64::from(opcode));
    ctx.memory.pc_write(rhs.1);
    Ok(CmdStatus::Ok)
}

static IMPLIED_OPCODES: &[(&str, u8)] = &[
    ("NOP", 0x00),
    ("SLEEP", 0xef),
    ("STOP", 0xff),
    ("CLRC", 0x60),
    ("SETC", 0x80),
    ("NOTC", 0xed),
    ("CLRV", 0xe0),
    ("CLRP", 0x20),
    ("SETP", 0x40),
    ("EI", 0xa0),
    ("DI", 0xc0),
    ("BRK", 0x0f),
    ("RET", 0x6f),
    ("RETI", 0x7f),
    ("RET1", 0x7f),
];

static BRANCH_OPCODES: &[(&str, u8)] = &[
    ("BRA", 0x2f),
    ("BEQ", 0xf0),
    ("BNE", 0xd0),
    ("BCS", 0xb0),
    ("BCC", 0x90),
    ("BVS", 0x70),
    ("BVC", 0x50),
    ("BMI", 0x30),
    ("BPL", 0x10),
];

pub struct Spc700 {
    zp_mode: ZpMode,
}

impl Spc700 {
    pub fn new() -> Spc700 {
        Spc700 { zp_mode: ZpMode::Auto }
    }

    fn branch_target(&self, ctx: &Context, arg: &Token, length: i64) -> Result<i64, String> {
        let target = ctx.eval_arg(&arg.text, &arg.text)?;
        let offset = target - (i64::from(ctx.memory.pc()) + length);

        if ctx.state.is_final_pass() && !(-128..=127).contains(&offset) {
            return Err(format!("{}: Branch offset ({offset}) too big", arg.text));
        }

        Ok(offset)
    }

    /// Carry-flag bit ops: the operand packs the bit number into the
    /// top three bits of a 13-bit address.
    fn carry_bit_op(
        &self,
        ctx: &mut Context,
        args: &[Token],
        plain: u8,
        notted: Option<u8>,
    ) -> CmdResult {
        argc_check(args, 3)?;

        if !args[1].text.eq_ignore_ascii_case("C") {
            return Err(format!("{}: expected C as first operand", args[0].text));
        }

        let (text, opcode) = match args[2].text.strip_prefix('/') {
            Some(rest) => match notted {
                Some(code) => (rest, code),
                None => {
                    return Err(format!(
                        "{}: inverted bit not supported",
                        args[0].text
                    ));
                }
            },
            None => (args[2].text.as_str(), plain),
        };

        let (addr, bit) = classify_bit(ctx, text)?;

        ctx.memory.pc_write(i64::from(opcode));
        ctx.memory.pc_write_word(addr & 0x1fff | bit << 13);

        Ok(CmdStatus::Ok)
    }
}

impl Default for Spc700 {
    fn default() -> Spc700 {
        Spc700::new()
    }
}

impl CpuBackend for Spc700 {
    fn name(&self) -> &'static str {
        "SPC700"
    }

    fn init(&mut self, state: &mut PassState) {
        self.zp_mode = ZpMode::Auto;
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
        let zp = self.zp_mode;

        if let Some(&(_, code)) = IMPLIED_OPCODES.iter().find(|(op, _)| *op == command) {
            ctx.memory.pc_write(i64::from(code));
            return Ok(CmdStatus::Ok);
        }

        if let Some(&(_, code)) = BRANCH_OPCODES.iter().find(|(op, _)| *op == command) {
            argc_check(args, 2)?;
            let offset = self.branch_target(ctx, &args[1], 2)?;
            ctx.memory.pc_write(i64::from(code));
            ctx.memory.pc_write(offset);
            return Ok(CmdStatus::Ok);
        }

        match command.as_str() {
            "MOV" => {
                argc_check(args, 3)?;
                let lhs = classify_arg(ctx, args, 1, zp)?;
                let rhs = classify_arg(ctx, args, 2, zp)?;
                write_pair_codes(ctx, &command, MOV_CODES, lhs, rhs)
            }
            "MOVW" => {
                argc_check(args, 3)?;
                let lhs = classify_arg(ctx, args, 1, zp)?;
                let rhs = classify_arg(ctx, args, 2, zp)?;
                let codes = [
                    PairCode {
                        lhs: AddrMode::YaRegister,
                        rhs: AddrMode::DirectPage,
                        code: &[Code::B(0xba), Code::ByteRhs],
                    },
                    PairCode {
                        lhs: AddrMode::DirectPage,
                        rhs: AddrMode::YaRegister,
                        code: &[Code::B(0xda), Code::ByteLhs],
                    },
                ];
                write_pair_codes(ctx, &command, &codes, lhs, rhs)
            }
            "OR" | "AND" | "EOR" | "ADC" | "SBC" => {
                let base = match command.as_str() {
                    "OR" => 0x00,
                    "AND" => 0x20,
                    "EOR" => 0x40,
                    "ADC" => 0x80,
                    _ => 0xa0, // SBC
                };
                argc_check(args, 3)?;
                let lhs = classify_arg(ctx, args, 1, zp)?;
                let rhs = classify_arg(ctx, args, 2, zp)?;
                match alu_op(ctx, base, lhs, rhs) {
                    Some(()) => Ok(CmdStatus::Ok),
                    None => Err(format!(
                        "{command}: no code generation for register pair {}/{}",
                        mode_name(lhs.0),
                        mode_name(rhs.0)
                    )),
                }
            }
            "CMP" => {
                argc_check(args, 3)?;
                let lhs = classify_arg(ctx, args, 1, zp)?;
                let rhs = classify_arg(ctx, args, 2, zp)?;
                // The accumulator rows follow the ALU pattern at base
                // 0x60; X and Y comparisons are their own rows.
                if alu_op(ctx, 0x60, lhs, rhs).is_some() {
                    return Ok(CmdStatus::Ok);
                }
                write_pair_codes(ctx, &command, CMP_EXTRA, lhs, rhs)
            }
            "ASL" => rmw(ctx, args, &RmwOp { accumulator: 0x1c, dp: 0x0b, dp_x: 0x1b, absolute: 0x0c }, zp, &[]),
            "LSR" => rmw(ctx, args, &RmwOp { accumulator: 0x5c, dp: 0x4b, dp_x: 0x5b, absolute: 0x4c }, zp, &[]),
            "ROL" => rmw(ctx, args, &RmwOp { accumulator: 0x3c, dp: 0x2b, dp_x: 0x3b, absolute: 0x2c }, zp, &[]),
            "ROR" => rmw(ctx, args, &RmwOp { accumulator: 0x7c, dp: 0x6b, dp_x: 0x7b, absolute: 0x6c }, zp, &[]),
            "DEC" => rmw(
                ctx,
                args,
                &RmwOp { accumulator: 0x9c, dp: 0x8b, dp_x: 0x9b, absolute: 0x8c },
                zp,
                &[(AddrMode::XRegister, 0x1d), (AddrMode::YRegister, 0xdc)],
            ),
            "INC" => rmw(
                ctx,
                args,
                &RmwOp { accumulator: 0xbc, dp: 0xab, dp_x: 0xbb, absolute: 0xac },
                zp,
                &[(AddrMode::XRegister, 0x3d), (AddrMode::YRegister, 0xfc)],
            ),
            "ADDW" => ya_word(ctx, args, 0x7a, zp),
            "SUBW" => ya_word(ctx, args, 0x9a, zp),
            "CMPW" => ya_word(ctx, args, 0x5a, zp),
            "DECW" | "INCW" => {
                argc_check(args, 2)?;
                let (mode, addr) = classify_arg(ctx, args, 1, zp)?;
                if mode != AddrMode::DirectPage {
                    return Err(format!(
                        "{command}: unsupported addressing mode {}",
                        mode_name(mode)
                    ));
                }
                ctx.memory.pc_write(if command == "DECW" { 0x1a } else { 0x3a });
                ctx.memory.pc_write(addr);
                Ok(CmdStatus::Ok)
            }
            "JMP" => {
                let (mode, addr) = classify_arg(ctx, args, 1, zp)?;
                match mode {
                    AddrMode::Absolute | AddrMode::DirectPage => {
                        ctx.memory.pc_write(0x5f);
                        ctx.memory.pc_write_word(addr);
                        Ok(CmdStatus::Ok)
                    }
                    AddrMode::DpX | AddrMode::AbsoluteX => {
                        ctx.memory.pc_write(0x1f);
                        ctx.memory.pc_write_word(addr);
                        Ok(CmdStatus::Ok)
                    }
                    _ => Err(format!(
                        "{command}: unsupported addressing mode {}",
                        mode_name(mode)
                    )),
                }
            }
            "CALL" => {
                let (mode, addr) = classify_arg(ctx, args, 1, zp)?;
                match mode {
                    AddrMode::Absolute | AddrMode::DirectPage => {
                        ctx.memory.pc_write(0x3f);
                        ctx.memory.pc_write_word(addr);
                        Ok(CmdStatus::Ok)
                    }
                    _ => Err(format!(
                        "{command}: unsupported addressing mode {}",
                        mode_name(mode)
                    )),
                }
            }
            "PCALL" => {
                let (mode, addr) = classify_arg(ctx, args, 1, zp)?;
                match mode {
                    AddrMode::DirectPage => {
                        ctx.memory.pc_write(0x4f);
                        ctx.memory.pc_write(addr);
                        Ok(CmdStatus::Ok)
                    }
                    _ => Err(format!(
                        "{command}: unsupported addressing mode {}",
                        mode_name(mode)
                    )),
                }
            }
            "TCALL" => {
                argc_check(args, 2)?;
                let n = ctx.eval_arg(&command, &args[1].text)?;
                if !(0..=15).contains(&n) {
                    return Err(format!("{command}: vector {n} outside 0 - 15"));
                }
                ctx.memory.pc_write(n << 4 | 0x01);
                Ok(CmdStatus::Ok)
            }
            "XCN" | "DAA" | "DAS" | "MUL" => {
                argc_check(args, 2)?;
                let (mode, _) = classify_arg(ctx, args, 1, zp)?;
                let expect = if command == "MUL" { AddrMode::YaRegister } else { AddrMode::Accumulator };
                if mode != expect {
                    return Err(format!(
                        "{command}: unsupported addressing mode {}",
                        mode_name(mode)
                    ));
                }
                let code = match command.as_str() {
                    "XCN" => 0x9f,
                    "DAA" => 0xdf,
                    "DAS" => 0xbe,
                    _ => 0xcf, // MUL
                };
                ctx.memory.pc_write(code);
                Ok(CmdStatus::Ok)
            }
            "DIV" => {
                argc_check(args, 3)?;
                let lhs = classify_arg(ctx, args, 1, zp)?;
                let rhs = classify_arg(ctx, args, 2, zp)?;
                let codes = [PairCode {
                    lhs: AddrMode::YaRegister,
                    rhs: AddrMode::XRegister,
                    code: &[Code::B(0x9e)],
                }];
                write_pair_codes(ctx, &command, &codes, lhs, rhs)
            }
            "PUSH" | "POP" => {
                argc_check(args, 2)?;
                let (mode, _) = classify_arg(ctx, args, 1, zp)?;
                let push = command == "PUSH";
                let code = match mode {
                    AddrMode::Accumulator => {
                        if push { 0x2d } else { 0xae }
                    }
                    AddrMode::XRegister => {
                        if push { 0x4d } else { 0xce }
                    }
                    AddrMode::YRegister => {
                        if push { 0x6d } else { 0xee }
                    }
                    AddrMode::Psw => {
                        if push { 0x0d } else { 0x8e }
                    }
                    _ => {
                        return Err(format!(
                            "{command}: unsupported addressing mode {}",
                            mode_name(mode)
                        ));
                    }
                };
                ctx.memory.pc_write(code);
                Ok(CmdStatus::Ok)
            }
            "SET1" | "CLR1" => {
                argc_check(args, 2)?;
                let (addr, bit) = classify_bit(ctx, &args[1].text)?;
                let base: i64 = if command == "SET1" { 0x02 } else { 0x12 };
                ctx.memory.pc_write(bit << 5 | base);
                ctx.memory.pc_write(addr);
                Ok(CmdStatus::Ok)
            }
            "BBS" | "BBC" => {
                argc_check(args, 3)?;
                let (addr, bit) = classify_bit(ctx, &args[1].text)?;
                let offset = self.branch_target(ctx, &args[2], 3)?;
                let base: i64 = if command == "BBS" { 0x03 } else { 0x13 };
                ctx.memory.pc_write(bit << 5 | base);
                ctx.memory.pc_write(addr);
                ctx.memory.pc_write(offset);
                Ok(CmdStatus::Ok)
            }
            "CBNE" => {
                argc_check(args, 3)?;
                let (mode, addr) = classify(ctx, &args[1], zp)?;
                let (opcode, length) = match mode {
                    AddrMode::DirectPage => (0x2e, 3),
                    AddrMode::DpX => (0xde, 3),
                    _ => {
                        return Err(format!(
                            "{command}: unsupported addressing mode {}",
                            mode_name(mode)
                        ));
                    }
                };
                let offset = self.branch_target(ctx, &args[2], length)?;
                ctx.memory.pc_write(opcode);
                ctx.memory.pc_write(addr);
                ctx.memory.pc_write(offset);
                Ok(CmdStatus::Ok)
            }
            "DBNZ" => {
                argc_check(args, 3)?;
                let (mode, addr) = classify(ctx, &args[1], zp)?;
                match mode {
                    AddrMode::DirectPage => {
                        let offset = self.branch_target(ctx, &args[2], 3)?;
                        ctx.memory.pc_write(0x6e);
                        ctx.memory.pc_write(addr);
                        ctx.memory.pc_write(offset);
                        Ok(CmdStatus::Ok)
                    }
                    AddrMode::YRegister => {
                        let offset = self.branch_target(ctx, &args[2], 2)?;
                        ctx.memory.pc_write(0xfe);
                        ctx.memory.pc_write(offset);
                        Ok(CmdStatus::Ok)
                    }
                    _ => Err(format!(
                        "{command}: unsupported addressing mode {}",
                        mode_name(mode)
                    )),
                }
            }
            "AND1" => self.carry_bit_op(ctx, args, 0x4a, Some(0x6a)),
            "OR1" => self.carry_bit_op(ctx, args, 0x0a, Some(0x2a)),
            "EOR1" => self.carry_bit_op(ctx, args, 0x8a, None),
            "MOV1" => {
                argc_check(args, 3)?;
                if args[1].text.eq_ignore_ascii_case("C") {
                    return self.carry_bit_op(ctx, args, 0xaa, None);
                }
                // MOV1 mem.bit,C
                if !args[2].text.eq_ignore_ascii_case("C") {
                    return Err(format!("{command}: expected C operand"));
                }
                let (addr, bit) = classify_bit(ctx, &args[1].text)?;
                ctx.memory.pc_write(0xca);
                ctx.memory.pc_write_word(addr & 0x1fff | bit << 13);
                Ok(CmdStatus::Ok)
            }
            "NOT1" => {
                argc_check(args, 2)?;
                let (addr, bit) = classify_bit(ctx, &args[1].text)?;
                ctx.memory.pc_write(0xea);
                ctx.memory.pc_write_word(addr & 0x1fff | bit << 13);
                Ok(CmdStatus::Ok)
            }
            "TSET1" | "TCLR1" => {
                argc_check(args, 2)?;
                let (mode, addr) = classify_arg(ctx, args, 1, ZpMode::Off)?;
                if mode != AddrMode::Absolute {
                    return Err(format!(
                        "{command}: unsupported addressing mode {}",
                        mode_name(mode)
                    ));
                }
                ctx.memory.pc_write(if command == "TSET1" { 0x0e } else { 0x4e });
                ctx.memory.pc_write_word(addr);
                Ok(CmdStatus::Ok)
            }
            _ => Ok(CmdStatus::NotKnown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(lines: &[&str]) -> Context {
        let mut ctx = Context::new();
        let mut cpu = Spc700::new();
        ctx.memory.set_pc(0x200);

        for line in lines {
            let parsed = rasm_core::parse_line(line, ctx.codepage).unwrap();
            cpu.handle(&mut ctx, None, &parsed.tokens).unwrap();
        }

        ctx
    }

    fn bytes(ctx: &Context, count: u32) -> Vec<u8> {
        (0..count).map(|i| ctx.memory.read(0, 0x200 + i)).collect()
    }

    #[test]
    fn test_mov_forms() {
        let ctx = assemble(&["  MOV A,#0x42", "  MOV A,0x10", "  MOV 0x10,A", "  MOV A,X"]);
        assert_eq!(
            bytes(&ctx, 7),
            vec![0xe8, 0x42, 0xe4, 0x10, 0xc4, 0x10, 0x7d]
        );
    }

    #[test]
    fn test_direct_page_auto() {
        let ctx = assemble(&["  MOV A,0x10", "  MOV A,0x1234"]);
        assert_eq!(bytes(&ctx, 5), vec![0xe4, 0x10, 0xe5, 0x34, 0x12]);
    }

    #[test]
    fn test_indirections() {
        let ctx = assemble(&["  MOV A,(X)", "  MOV A,(X)+", "  MOV A,(0x20+X)", "  MOV A,(0x30)+Y"]);
        assert_eq!(
            bytes(&ctx, 6),
            vec![0xe6, 0xbf, 0xe7, 0x20, 0xf7, 0x30]
        );
    }

    #[test]
    fn test_alu_pattern() {
        let ctx = assemble(&["  ADC A,#1", "  OR A,0x10", "  AND (X),(Y)", "  SBC 0x10,#5"]);
        assert_eq!(
            bytes(&ctx, 8),
            vec![0x88, 0x01, 0x04, 0x10, 0x39, 0xb8, 0x10, 0x05]
        );
    }

    #[test]
    fn test_cmp_xy() {
        let ctx = assemble(&["  CMP X,#3", "  CMP Y,0x40"]);
        assert_eq!(bytes(&ctx, 4), vec![0xc8, 0x03, 0x7e, 0x40]);
    }

    #[test]
    fn test_ya_words() {
        let ctx = assemble(&["  MOVW YA,0x10", "  MOVW 0x12,YA", "  ADDW YA,0x14"]);
        assert_eq!(
            bytes(&ctx, 6),
            vec![0xba, 0x10, 0xda, 0x12, 0x7a, 0x14]
        );
    }

    #[test]
    fn test_rmw_and_registers() {
        let ctx = assemble(&["  ASL A", "  LSR 0x10", "  INC X", "  DEC Y"]);
        assert_eq!(bytes(&ctx, 5), vec![0x1c, 0x4b, 0x10, 0x3d, 0xdc]);
    }

    #[test]
    fn test_calls() {
        let ctx = assemble(&["  CALL 0x1234", "  PCALL 0x12", "  TCALL 5"]);
        assert_eq!(
            bytes(&ctx, 6),
            vec![0x3f, 0x34, 0x12, 0x4f, 0x12, 0x51]
        );
    }

    #[test]
    fn test_branches() {
        let ctx = assemble(&["  BRA 0x200", "  DBNZ Y,0x202"]);
        assert_eq!(bytes(&ctx, 4), vec![0x2f, 0xfe, 0xfe, 0xfe]);
    }

    #[test]
    fn test_bit_ops() {
        let ctx = assemble(&["  SET1 0x10.3", "  CLR1 0x10.0", "  NOT1 0x1234.5"]);
        assert_eq!(
            bytes(&ctx, 7),
            vec![0x62, 0x10, 0x12, 0x10, 0xea, 0x34, 0xb2]
        );
    }

    #[test]
    fn test_carry_bit_ops() {
        let ctx = assemble(&["  AND1 C,0x123.1", "  OR1 C,/0x123.1"]);
        assert_eq!(
            bytes(&ctx, 6),
            vec![0x4a, 0x23, 0x21, 0x2a, 0x23, 0x21]
        );
    }

    #[test]
    fn test_bbs_bbc() {
        let ctx = assemble(&["  BBS 0x10.7,0x203"]);
        assert_eq!(bytes(&ctx, 3), vec![0xe3, 0x10, 0x00]);
    }

    #[test]
    fn test_push_pop() {
        let ctx = assemble(&["  PUSH PSW", "  POP A"]);
        assert_eq!(bytes(&ctx, 2), vec![0x0d, 0xae]);
    }

    #[test]
    fn test_implied() {
        let ctx = assemble(&["  SLEEP", "  NOTC", "  RET"]);
        assert_eq!(bytes(&ctx, 3), vec![0xef, 0xed, 0x6f]);
    }

    #[test]
    fn test_mul_div() {
        let ctx = assemble(&["  MUL YA", "  DIV YA,X"]);
        assert_eq!(bytes(&ctx, 2), vec![0xcf, 0x9e]);
    }
}
