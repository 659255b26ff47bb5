//! Z80 backend.
//!
//! Operand classification is table-driven: the mode table below is
//! walked in order and the first matching row wins, so specific rows
//! (`(IX)` before `(IX+d)` before the plain-address catch-all) must
//! stay sorted from most to least specific. Each row carries a type
//! bitmask so the encoders can test attributes (8-bit, memory, index,
//! …) instead of enumerating modes.
//!
//! Encoding follows the hardware's structure where it has one — the
//! `LD r,r'` and ALU groups compute opcodes from register bitmasks —
//! and falls back to small per-instruction byte programs (literal
//! bytes interleaved with operand placeholders) for the irregular
//! pairs. Undocumented instructions (IXH/IXL halves, SLL, the shifted
//! bit-op forms) are all in.

use rasm_core::{PassState, Token};

use crate::cmd::{CmdResult, CmdStatus, argc_check, illegal_args};
use crate::context::Context;

use super::CpuBackend;

const NORMAL_8: u32 = 0x001;
const SPECIAL_8: u32 = 0x002;
const BIT_16: u32 = 0x004;
const MEMORY: u32 = 0x008;
const INDEX_X: u32 = 0x010;
const INDEX_Y: u32 = 0x020;
const STACK_PTR: u32 = 0x040;
const VALUE_T: u32 = 0x080;
const SPECIAL_16: u32 = 0x100;
const ALTERNATE: u32 = 0x200;
const IO_PORT: u32 = 0x400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reg {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
    F,
    IxH,
    IxL,
    IyH,
    IyL,
    I,
    R,
    Af,
    AfAlt,
    Bc,
    De,
    Hl,
    Sp,
    Ix,
    Iy,
    BcInd,
    DeInd,
    HlInd,
    SpInd,
    IxInd,
    IyInd,
    IxOff,
    IyOff,
    CPort,
    Address,
    Value,
}

fn mode_name(reg: Reg) -> &'static str {
    match reg {
        Reg::A => "A",
        Reg::B => "B",
        Reg::C => "C",
        Reg::D => "D",
        Reg::E => "E",
        Reg::H => "H",
        Reg::L => "L",
        Reg::F => "F",
        Reg::IxH => "IXH",
        Reg::IxL => "IXL",
        Reg::IyH => "IYH",
        Reg::IyL => "IYL",
        Reg::I => "I",
        Reg::R => "R",
        Reg::Af => "AF",
        Reg::AfAlt => "AF'",
        Reg::Bc => "BC",
        Reg::De => "DE",
        Reg::Hl => "HL",
        Reg::Sp => "SP",
        Reg::Ix => "IX",
        Reg::Iy => "IY",
        Reg::BcInd => "(BC)",
        Reg::DeInd => "(DE)",
        Reg::HlInd => "(HL)",
        Reg::SpInd => "(SP)",
        Reg::IxInd => "(IX)",
        Reg::IyInd => "(IY)",
        Reg::IxOff => "(IX+offset)",
        Reg::IyOff => "(IY+offset)",
        Reg::CPort => "(C)",
        Reg::Address => "(address)",
        Reg::Value => "value",
    }
}

/// Register field value used in opcode arithmetic. IXH/IXL and IYH/IYL
/// encode as H and L under the index prefix; IX/IY encode as HL.
fn bitmask(reg: Reg) -> i64 {
    match reg {
        Reg::A => 0x7,
        Reg::B => 0x0,
        Reg::C => 0x1,
        Reg::D => 0x2,
        Reg::E => 0x3,
        Reg::H | Reg::IxH | Reg::IyH => 0x4,
        Reg::L | Reg::IxL | Reg::IyL => 0x5,
        Reg::F => 0x6,
        Reg::Af | Reg::Sp => 0x3,
        Reg::Bc => 0x0,
        Reg::De => 0x1,
        Reg::Hl | Reg::Ix | Reg::Iy => 0x2,
        _ => 0x0,
    }
}

struct ModeRow {
    reg: Reg,
    quote: Option<char>,
    starts_with: bool,
    take_offset: bool,
    take_value: bool,
    ident: &'static str,
    flags: u32,
}

const fn exact(reg: Reg, quote: Option<char>, ident: &'static str, flags: u32) -> ModeRow {
    ModeRow { reg, quote, starts_with: false, take_offset: false, take_value: false, ident, flags }
}

/// Walked in order; first match wins.
static MODE_TABLE: &[ModeRow] = &[
    exact(Reg::A, None, "A", NORMAL_8),
    exact(Reg::B, None, "B", NORMAL_8),
    exact(Reg::C, None, "C", NORMAL_8),
    exact(Reg::D, None, "D", NORMAL_8),
    exact(Reg::E, None, "E", NORMAL_8),
    exact(Reg::H, None, "H", NORMAL_8),
    exact(Reg::L, None, "L", NORMAL_8),
    exact(Reg::F, None, "F", SPECIAL_8),
    exact(Reg::IxL, None, "IXL", NORMAL_8 | INDEX_X),
    exact(Reg::IxH, None, "IXH", NORMAL_8 | INDEX_X),
    exact(Reg::IyL, None, "IYL", NORMAL_8 | INDEX_Y),
    exact(Reg::IyH, None, "IYH", NORMAL_8 | INDEX_Y),
    exact(Reg::I, None, "I", SPECIAL_8),
    exact(Reg::R, None, "R", SPECIAL_8),
    exact(Reg::Af, None, "AF", SPECIAL_16),
    exact(Reg::AfAlt, None, "AF'", SPECIAL_16 | ALTERNATE),
    exact(Reg::Bc, None, "BC", BIT_16),
    exact(Reg::De, None, "DE", BIT_16),
    exact(Reg::Hl, None, "HL", BIT_16),
    exact(Reg::Ix, None, "IX", BIT_16 | INDEX_X),
    exact(Reg::Iy, None, "IY", BIT_16 | INDEX_Y),
    exact(Reg::Sp, None, "SP", BIT_16 | STACK_PTR),
    exact(Reg::BcInd, Some('('), "BC", BIT_16 | MEMORY),
    exact(Reg::DeInd, Some('('), "DE", BIT_16 | MEMORY),
    exact(Reg::HlInd, Some('('), "HL", BIT_16 | MEMORY),
    exact(Reg::IxInd, Some('('), "IX", BIT_16 | MEMORY | INDEX_X),
    exact(Reg::IyInd, Some('('), "IY", BIT_16 | MEMORY | INDEX_Y),
    ModeRow {
        reg: Reg::IxOff,
        quote: Some('('),
        starts_with: true,
        take_offset: true,
        take_value: false,
        ident: "IX",
        flags: BIT_16 | MEMORY | INDEX_X,
    },
    ModeRow {
        reg: Reg::IyOff,
        quote: Some('('),
        starts_with: true,
        take_offset: true,
        take_value: false,
        ident: "IY",
        flags: BIT_16 | MEMORY | INDEX_Y,
    },
    exact(Reg::SpInd, Some('('), "SP", SPECIAL_16 | MEMORY | STACK_PTR),
    exact(Reg::CPort, Some('('), "C", IO_PORT),
    // Catch-alls: anything parenthesized left over is an address,
    // anything bare is a value. No 8/16-bit distinction is made here.
    ModeRow {
        reg: Reg::Address,
        quote: Some('('),
        starts_with: true,
        take_offset: false,
        take_value: true,
        ident: "",
        flags: VALUE_T | MEMORY,
    },
    ModeRow {
        reg: Reg::Value,
        quote: None,
        starts_with: true,
        take_offset: false,
        take_value: true,
        ident: "",
        flags: VALUE_T,
    },
];

#[derive(Debug, Clone, Copy)]
struct Operand {
    reg: Reg,
    flags: u32,
    value: i64,
}

impl Operand {
    fn is_normal8(&self) -> bool {
        self.flags & NORMAL_8 != 0
    }

    fn is_16bit(&self) -> bool {
        self.flags & BIT_16 != 0
    }

    fn is_memory(&self) -> bool {
        self.flags & MEMORY != 0
    }

    fn is_index(&self) -> bool {
        self.flags & (INDEX_X | INDEX_Y) != 0
    }

    fn is_simple_value(&self) -> bool {
        self.flags == VALUE_T
    }

    fn is(&self, regs: &[Reg]) -> bool {
        regs.contains(&self.reg)
    }
}

fn classify(ctx: &Context, arg: &Token) -> Result<Operand, String> {
    if arg.text.trim().is_empty() && arg.quote.is_none() {
        return Err("empty argument supplied".to_string());
    }

    for row in MODE_TABLE {
        if arg.quote != row.quote {
            continue;
        }

        let matched = if row.starts_with {
            rasm_core::text::starts_ignore_case(&arg.text, row.ident)
        } else {
            arg.text.eq_ignore_ascii_case(row.ident)
        };

        if !matched {
            continue;
        }

        let mut value = 0;

        if row.take_offset || row.take_value {
            let rest = &arg.text[row.ident.len()..];
            value = ctx
                .eval(rest)
                .map_err(|e| format!("{}: expression error: {e}", arg.text))?;
        }

        if row.take_offset
            && ctx.state.is_final_pass()
            && !(-128..=127).contains(&value)
        {
            return Err(format!("{}: outside valid range for offset", arg.text));
        }

        return Ok(Operand { reg: row.reg, flags: row.flags, value });
    }

    Err(format!("{}: couldn't calculate register/addressing mode", arg.text))
}

/// Condition flags in encoding order; the mask is the index.
static FLAG_NAMES: &[&str] = &["NZ", "Z", "NC", "C", "PO", "PE", "P", "M"];

fn classify_flag(arg: &Token) -> Result<i64, String> {
    FLAG_NAMES
        .iter()
        .position(|f| f.eq_ignore_ascii_case(&arg.text))
        .map(|i| i as i64)
        .ok_or_else(|| format!("{}: unknown flag", arg.text))
}

const SHIFT_IX: u8 = 0xdd;
const SHIFT_IY: u8 = 0xfd;

fn shift_prefix(reg: Reg) -> Option<u8> {
    match reg {
        Reg::IxH | Reg::IxL | Reg::Ix | Reg::IxOff | Reg::IxInd => Some(SHIFT_IX),
        Reg::IyH | Reg::IyL | Reg::Iy | Reg::IyOff | Reg::IyInd => Some(SHIFT_IY),
        _ => None,
    }
}

fn write_shift(ctx: &mut Context, reg: Reg) {
    if let Some(prefix) = shift_prefix(reg) {
        ctx.memory.pc_write(i64::from(prefix));
    }
}

fn write_either_shift(ctx: &mut Context, r1: Reg, r2: Reg) {
    if let Some(prefix) = shift_prefix(r1).or_else(|| shift_prefix(r2)) {
        ctx.memory.pc_write(i64::from(prefix));
    }
}

fn write_offset(ctx: &mut Context, operand: &Operand) {
    if matches!(operand.reg, Reg::IxOff | Reg::IyOff) {
        ctx.memory.pc_write(operand.value);
    }
}

/// One step of a pair-code byte program.
#[derive(Debug, Clone, Copy)]
enum Code {
    B(u8),
    ByteLhs,
    WordLhs,
    ByteRhs,
    WordRhs,
}

struct PairCode<'a> {
    lhs: Reg,
    rhs: Reg,
    code: &'a [Code],
}

fn write_pair_codes(
    ctx: &mut Context,
    command: &str,
    codes: &[PairCode],
    lhs: &Operand,
    rhs: &Operand,
) -> CmdResult {
    for entry in codes {
        if entry.lhs != lhs.reg || entry.rhs != rhs.reg {
            continue;
        }

        for step in entry.code {
            match step {
                Code::B(b) => ctx.memory.pc_write(i64::from(*b)),
                Code::ByteLhs => ctx.memory.pc_write(lhs.value),
                Code::WordLhs => ctx.memory.pc_write_word(lhs.value),
                Code::ByteRhs => ctx.memory.pc_write(rhs.value),
                Code::WordRhs => ctx.memory.pc_write_word(rhs.value),
            }
        }

        return Ok(CmdStatus::Ok);
    }

    Err(format!(
        "{command}: no code generation for register pair {},{}",
        mode_name(lhs.reg),
        mode_name(rhs.reg)
    ))
}

/// ALU-style commands allow the accumulator to be implicit: `ADD 10`
/// means `ADD A,10`.
fn accumulator_args(ctx: &Context, args: &[Token]) -> Result<(Operand, Operand), String> {
    argc_check(args, 2)?;

    if args.len() == 2 {
        let a = Operand { reg: Reg::A, flags: NORMAL_8, value: 0 };
        Ok((a, classify(ctx, &args[1])?))
    } else {
        Ok((classify(ctx, &args[1])?, classify(ctx, &args[2])?))
    }
}

fn mixed_index(a: &Operand, b: &Operand) -> bool {
    (a.flags & INDEX_X != 0 && b.flags & INDEX_Y != 0)
        || (a.flags & INDEX_Y != 0 && b.flags & INDEX_X != 0)
}

fn branch_offset(ctx: &Context, arg: &Token, target: i64, length: i64) -> Result<i64, String> {
    let rel = target - (i64::from(ctx.memory.pc()) + length) % 0x10000;

    if ctx.state.is_final_pass() && !(-128..=127).contains(&rel) {
        return Err(format!("{}: Branch offset ({rel}) too big", arg.text));
    }

    Ok(rel)
}

fn ld(ctx: &mut Context, args: &[Token]) -> CmdResult {
    static CODES: &[PairCode] = &[
        PairCode { lhs: Reg::A, rhs: Reg::BcInd, code: &[Code::B(0x0a)] },
        PairCode { lhs: Reg::A, rhs: Reg::DeInd, code: &[Code::B(0x1a)] },
        PairCode { lhs: Reg::A, rhs: Reg::Address, code: &[Code::B(0x3a), Code::WordRhs] },
        PairCode { lhs: Reg::BcInd, rhs: Reg::A, code: &[Code::B(0x02)] },
        PairCode { lhs: Reg::DeInd, rhs: Reg::A, code: &[Code::B(0x12)] },
        PairCode { lhs: Reg::Address, rhs: Reg::A, code: &[Code::B(0x32), Code::WordLhs] },
        PairCode { lhs: Reg::A, rhs: Reg::I, code: &[Code::B(0xed), Code::B(0x57)] },
        PairCode { lhs: Reg::A, rhs: Reg::R, code: &[Code::B(0xed), Code::B(0x5f)] },
        PairCode { lhs: Reg::I, rhs: Reg::A, code: &[Code::B(0xed), Code::B(0x47)] },
        PairCode { lhs: Reg::R, rhs: Reg::A, code: &[Code::B(0xed), Code::B(0x4f)] },
    ];

    argc_check(args, 3)?;

    let r1 = classify(ctx, &args[1])?;
    let r2 = classify(ctx, &args[2])?;

    if mixed_index(&r1, &r2) {
        return Err(format!("{}: can't have mixed IX/IY registers", args[0].text));
    }

    // LD r,r'
    if r1.is_normal8() && r2.is_normal8() {
        let mut status = CmdStatus::Ok;

        if (r1.is_index() || r2.is_index()) && (r1.is(&[Reg::H, Reg::L]) || r2.is(&[Reg::H, Reg::L]))
        {
            status = CmdStatus::Warning(format!(
                "{}: H/L will actually be the index register low/high register",
                args[0].text
            ));
        }

        write_either_shift(ctx, r1.reg, r2.reg);
        ctx.memory.pc_write(0x40 | bitmask(r1.reg) << 3 | bitmask(r2.reg));
        return Ok(status);
    }

    // LD r,n
    if r1.is_normal8() && r2.is_simple_value() {
        write_shift(ctx, r1.reg);
        ctx.memory.pc_write(bitmask(r1.reg) << 3 | 0x6);
        ctx.memory.pc_write(r2.value);
        return Ok(CmdStatus::Ok);
    }

    // LD r,(HL)/(IX+d)/(IY+d)
    if r1.is_normal8() && !r1.is_index() && (r2.reg == Reg::HlInd || r2.is_index()) {
        write_shift(ctx, r2.reg);
        ctx.memory.pc_write(0x46 | bitmask(r1.reg) << 3);
        write_offset(ctx, &r2);
        return Ok(CmdStatus::Ok);
    }

    // LD (HL)/(IX+d)/(IY+d),r
    if r2.is_normal8() && !r2.is_index() && (r1.reg == Reg::HlInd || r1.is_index()) {
        write_shift(ctx, r1.reg);
        ctx.memory.pc_write(0x70 | bitmask(r2.reg));
        write_offset(ctx, &r1);
        return Ok(CmdStatus::Ok);
    }

    // LD (HL)/(IX+d)/(IY+d),n
    if r1.is(&[Reg::HlInd, Reg::IxOff, Reg::IyOff]) && r2.reg == Reg::Value {
        write_shift(ctx, r1.reg);
        ctx.memory.pc_write(0x36);
        write_offset(ctx, &r1);
        ctx.memory.pc_write(r2.value);
        return Ok(CmdStatus::Ok);
    }

    // LD rr,nn
    if r1.is_16bit() && !r1.is_memory() && r2.reg == Reg::Value {
        write_shift(ctx, r1.reg);
        ctx.memory.pc_write(bitmask(r1.reg) << 4 | 0x01);
        ctx.memory.pc_write_word(r2.value);
        return Ok(CmdStatus::Ok);
    }

    // LD HL/IX/IY,(nn)
    if r1.is(&[Reg::Hl, Reg::Ix, Reg::Iy]) && r2.reg == Reg::Address {
        write_shift(ctx, r1.reg);
        ctx.memory.pc_write(0x2a);
        ctx.memory.pc_write_word(r2.value);
        return Ok(CmdStatus::Ok);
    }

    // LD rr,(nn)
    if r1.is_16bit() && !r1.is_memory() && r2.reg == Reg::Address {
        ctx.memory.pc_write(0xed);
        ctx.memory.pc_write(0x4b | bitmask(r1.reg) << 4);
        ctx.memory.pc_write_word(r2.value);
        return Ok(CmdStatus::Ok);
    }

    // LD (nn),HL/IX/IY
    if r2.is(&[Reg::Hl, Reg::Ix, Reg::Iy]) && r1.reg == Reg::Address {
        write_shift(ctx, r2.reg);
        ctx.memory.pc_write(0x22);
        ctx.memory.pc_write_word(r1.value);
        return Ok(CmdStatus::Ok);
    }

    // LD (nn),rr
    if r2.is_16bit() && !r2.is_memory() && r1.reg == Reg::Address {
        ctx.memory.pc_write(0xed);
        ctx.memory.pc_write(0x43 | bitmask(r2.reg) << 4);
        ctx.memory.pc_write_word(r1.value);
        return Ok(CmdStatus::Ok);
    }

    // LD SP,HL/IX/IY
    if r1.reg == Reg::Sp && r2.is(&[Reg::Hl, Reg::Ix, Reg::Iy]) {
        write_shift(ctx, r2.reg);
        ctx.memory.pc_write(0xf9);
        return Ok(CmdStatus::Ok);
    }

    write_pair_codes(ctx, &args[0].text, CODES, &r1, &r2)
}

fn push_pop(ctx: &mut Context, args: &[Token], opcode: i64) -> CmdResult {
    argc_check(args, 2)?;

    let r1 = classify(ctx, &args[1])?;

    if r1.is(&[Reg::Hl, Reg::Ix, Reg::Iy]) {
        write_shift(ctx, r1.reg);
        ctx.memory.pc_write(opcode | 0x20);
        return Ok(CmdStatus::Ok);
    }

    if r1.is(&[Reg::Af, Reg::Bc, Reg::De]) {
        ctx.memory.pc_write(opcode | bitmask(r1.reg) << 4);
        return Ok(CmdStatus::Ok);
    }

    Err(format!("{}: invalid argument {}", args[0].text, args[1].text))
}

fn ex(ctx: &mut Context, args: &[Token]) -> CmdResult {
    static CODES: &[PairCode] = &[
        PairCode { lhs: Reg::De, rhs: Reg::Hl, code: &[Code::B(0xeb)] },
        PairCode { lhs: Reg::Af, rhs: Reg::AfAlt, code: &[Code::B(0x08)] },
        PairCode { lhs: Reg::SpInd, rhs: Reg::Hl, code: &[Code::B(0xe3)] },
        PairCode { lhs: Reg::SpInd, rhs: Reg::Ix, code: &[Code::B(SHIFT_IX), Code::B(0xe3)] },
        PairCode { lhs: Reg::SpInd, rhs: Reg::Iy, code: &[Code::B(SHIFT_IY), Code::B(0xe3)] },
    ];

    argc_check(args, 3)?;

    let r1 = classify(ctx, &args[1])?;
    let r2 = classify(ctx, &args[2])?;

    write_pair_codes(ctx, &args[0].text, CODES, &r1, &r2)
}

/// The regular ALU group. `base` is the `A,r` opcode row; `imm` the
/// immediate form.
struct AluOp {
    base: i64,
    imm: u8,
    mem: u8,
}

fn alu(ctx: &mut Context, args: &[Token], op: &AluOp) -> CmdResult {
    let (r1, r2) = accumulator_args(ctx, args)?;

    if r1.reg == Reg::A && r2.is_normal8() {
        write_shift(ctx, r2.reg);
        ctx.memory.pc_write(op.base | bitmask(r2.reg));
        return Ok(CmdStatus::Ok);
    }

    alu_tail(ctx, args, &r1, &r2, op.imm, op.mem)
}

fn add(ctx: &mut Context, args: &[Token]) -> CmdResult {
    let (r1, r2) = accumulator_args(ctx, args)?;

    if r1.reg == Reg::A && r2.is_normal8() {
        write_shift(ctx, r2.reg);
        ctx.memory.pc_write(0x80 | bitmask(r2.reg));
        return Ok(CmdStatus::Ok);
    }

    // ADD HL/IX/IY,rr — the 16-bit adds only pair with their own index
    // register.
    let sixteen: &[(Reg, &[Reg], Option<u8>)] = &[
        (Reg::Hl, &[Reg::Bc, Reg::De, Reg::Hl, Reg::Sp], None),
        (Reg::Ix, &[Reg::Bc, Reg::De, Reg::Ix, Reg::Sp], Some(SHIFT_IX)),
        (Reg::Iy, &[Reg::Bc, Reg::De, Reg::Iy, Reg::Sp], Some(SHIFT_IY)),
    ];

    for (lhs, pairs, prefix) in sixteen {
        if r1.reg == *lhs && r2.is(pairs) {
            if let Some(p) = prefix {
                ctx.memory.pc_write(i64::from(*p));
            }
            ctx.memory.pc_write(0x09 | bitmask(r2.reg) << 4);
            return Ok(CmdStatus::Ok);
        }
    }

    alu_tail(ctx, args, &r1, &r2, 0xc6, 0x86)
}

fn adc(ctx: &mut Context, args: &[Token]) -> CmdResult {
    let (r1, r2) = accumulator_args(ctx, args)?;

    if r1.reg == Reg::A && r2.is_normal8() {
        write_shift(ctx, r2.reg);
        ctx.memory.pc_write(0x88 | bitmask(r2.reg));
        return Ok(CmdStatus::Ok);
    }

    if r1.reg == Reg::Hl && r2.is(&[Reg::Bc, Reg::De, Reg::Hl, Reg::Sp]) {
        ctx.memory.pc_write(0xed);
        ctx.memory.pc_write(0x4a | bitmask(r2.reg) << 4);
        return Ok(CmdStatus::Ok);
    }

    alu_tail(ctx, args, &r1, &r2, 0xce, 0x8e)
}

fn sbc(ctx: &mut Context, args: &[Token]) -> CmdResult {
    let (r1, r2) = accumulator_args(ctx, args)?;

    if r1.reg == Reg::A && r2.is_normal8() {
        write_shift(ctx, r2.reg);
        ctx.memory.pc_write(0x98 | bitmask(r2.reg));
        return Ok(CmdStatus::Ok);
    }

    if r1.reg == Reg::Hl && r2.is(&[Reg::Bc, Reg::De, Reg::Hl, Reg::Sp]) {
        ctx.memory.pc_write(0xed);
        ctx.memory.pc_write(0x42 | bitmask(r2.reg) << 4);
        return Ok(CmdStatus::Ok);
    }

    alu_tail(ctx, args, &r1, &r2, 0xde, 0x9e)
}

/// Immediate and memory forms shared by the ALU handlers.
fn alu_tail(
    ctx: &mut Context,
    args: &[Token],
    r1: &Operand,
    r2: &Operand,
    imm: u8,
    mem: u8,
) -> CmdResult {
    let codes = [
        PairCode { lhs: Reg::A, rhs: Reg::Value, code: &[Code::B(imm), Code::ByteRhs] },
        PairCode { lhs: Reg::A, rhs: Reg::HlInd, code: &[Code::B(mem)] },
        PairCode {
            lhs: Reg::A,
            rhs: Reg::IxOff,
            code: &[Code::B(SHIFT_IX), Code::B(mem), Code::ByteRhs],
        },
        PairCode {
            lhs: Reg::A,
            rhs: Reg::IyOff,
            code: &[Code::B(SHIFT_IY), Code::B(mem), Code::ByteRhs],
        },
    ];

    write_pair_codes(ctx, &args[0].text, &codes, r1, r2)
}

fn inc_dec(ctx: &mut Context, args: &[Token], r8: i64, mem: i64, r16: i64) -> CmdResult {
    argc_check(args, 2)?;

    let r1 = classify(ctx, &args[1])?;

    if r1.is_normal8() {
        write_shift(ctx, r1.reg);
        ctx.memory.pc_write(r8 | bitmask(r1.reg) << 3);
        return Ok(CmdStatus::Ok);
    }

    if r1.is(&[Reg::HlInd, Reg::IxOff, Reg::IyOff]) {
        write_shift(ctx, r1.reg);
        ctx.memory.pc_write(mem);
        write_offset(ctx, &r1);
        return Ok(CmdStatus::Ok);
    }

    if r1.is_16bit() && !r1.is_memory() {
        write_shift(ctx, r1.reg);
        ctx.memory.pc_write(r16 | bitmask(r1.reg) << 4);
        return Ok(CmdStatus::Ok);
    }

    illegal_args(args)
}

fn im(ctx: &mut Context, args: &[Token]) -> CmdResult {
    static MODES: [u8; 3] = [0x46, 0x56, 0x5e];

    argc_check(args, 2)?;

    let r1 = classify(ctx, &args[1])?;

    if r1.reg != Reg::Value || !(0..=2).contains(&r1.value) {
        return Err(format!("{}: invalid argument {}", args[0].text, args[1].text));
    }

    ctx.memory.pc_write(0xed);
    ctx.memory.pc_write(i64::from(MODES[r1.value as usize]));

    Ok(CmdStatus::Ok)
}

fn shift_op(ctx: &mut Context, args: &[Token]) -> CmdResult {
    argc_check(args, 2)?;

    let mask: i64 = match args[0].text.to_ascii_uppercase().as_str() {
        "RLC" => 0x00,
        "RRC" => 0x08,
        "RL" => 0x10,
        "RR" => 0x18,
        "SLA" => 0x20,
        "SRA" => 0x28,
        "SLL" => 0x30,
        _ => 0x38, // SRL
    };

    let r1 = classify(ctx, &args[1])?;

    if args.len() == 2 {
        if r1.is_normal8() && !r1.is_index() {
            ctx.memory.pc_write(0xcb);
            ctx.memory.pc_write(mask | bitmask(r1.reg));
            return Ok(CmdStatus::Ok);
        }

        if r1.is(&[Reg::HlInd, Reg::IxOff, Reg::IyOff]) {
            write_shift(ctx, r1.reg);
            ctx.memory.pc_write(0xcb);
            write_offset(ctx, &r1);
            ctx.memory.pc_write(mask | 0x06);
            return Ok(CmdStatus::Ok);
        }
    }

    // Undocumented: OP (IX+d),r also copies the result into r.
    if args.len() == 3 {
        let r2 = classify(ctx, &args[2])?;

        if r1.is(&[Reg::IxOff, Reg::IyOff])
            && r2.is(&[Reg::A, Reg::B, Reg::C, Reg::D, Reg::E, Reg::H, Reg::L])
        {
            write_shift(ctx, r1.reg);
            ctx.memory.pc_write(0xcb);
            write_offset(ctx, &r1);
            ctx.memory.pc_write(mask | bitmask(r2.reg));
            return Ok(CmdStatus::Ok);
        }
    }

    illegal_args(args)
}

fn bit_set_res(ctx: &mut Context, args: &[Token]) -> CmdResult {
    argc_check(args, 3)?;

    let command = args[0].text.to_ascii_uppercase();
    let mask: i64 = match command.as_str() {
        "BIT" => 0x40,
        "SET" => 0xc0,
        _ => 0x80, // RES
    };

    let r1 = classify(ctx, &args[1])?;
    let r2 = classify(ctx, &args[2])?;

    if r1.reg != Reg::Value || !(0..=7).contains(&r1.value) {
        return Err(format!(
            "{}: illegal value {} for bit number",
            args[0].text, args[1].text
        ));
    }

    if args.len() == 3 {
        if r2.is_normal8() && !r2.is_index() {
            ctx.memory.pc_write(0xcb);
            ctx.memory.pc_write(mask | r1.value << 3 | bitmask(r2.reg));
            return Ok(CmdStatus::Ok);
        }

        if r2.is(&[Reg::HlInd, Reg::IxOff, Reg::IyOff]) {
            write_shift(ctx, r2.reg);
            ctx.memory.pc_write(0xcb);
            write_offset(ctx, &r2);
            ctx.memory.pc_write(mask | r1.value << 3 | 0x06);
            return Ok(CmdStatus::Ok);
        }
    }

    // Undocumented: SET/RES b,(IX+d),r
    if args.len() > 3 && (command == "SET" || command == "RES") {
        let r3 = classify(ctx, &args[3])?;

        if r2.is(&[Reg::IxOff, Reg::IyOff])
            && r3.is(&[Reg::A, Reg::B, Reg::C, Reg::D, Reg::E, Reg::H, Reg::L])
        {
            write_shift(ctx, r2.reg);
            ctx.memory.pc_write(0xcb);
            write_offset(ctx, &r2);
            ctx.memory.pc_write(mask | r1.value << 3 | bitmask(r3.reg));
            return Ok(CmdStatus::Ok);
        }
    }

    illegal_args(args)
}

fn jp(ctx: &mut Context, args: &[Token]) -> CmdResult {
    if args.len() == 2 {
        let r1 = classify(ctx, &args[1])?;

        if r1.reg == Reg::Value {
            ctx.memory.pc_write(0xc3);
            ctx.memory.pc_write_word(r1.value);
            return Ok(CmdStatus::Ok);
        }

        if r1.is(&[Reg::HlInd, Reg::IxInd, Reg::IyInd]) {
            write_shift(ctx, r1.reg);
            ctx.memory.pc_write(0xe9);
            return Ok(CmdStatus::Ok);
        }
    } else if args.len() == 3 {
        let flag = classify_flag(&args[1])?;
        let r2 = classify(ctx, &args[2])?;

        if r2.reg == Reg::Value {
            ctx.memory.pc_write(0xc2 | flag << 3);
            ctx.memory.pc_write_word(r2.value);
            return Ok(CmdStatus::Ok);
        }
    }

    illegal_args(args)
}

fn jr(ctx: &mut Context, args: &[Token]) -> CmdResult {
    if args.len() == 2 {
        let r1 = classify(ctx, &args[1])?;

        if r1.reg == Reg::Value {
            let rel = branch_offset(ctx, &args[1], r1.value, 2)?;
            ctx.memory.pc_write(0x18);
            ctx.memory.pc_write(rel);
            return Ok(CmdStatus::Ok);
        }
    } else if args.len() == 3 {
        let flag = classify_flag(&args[1])?;
        let r2 = classify(ctx, &args[2])?;

        // Only NZ/Z/NC/C have relative-jump encodings.
        if r2.reg == Reg::Value && (0..=3).contains(&flag) {
            let rel = branch_offset(ctx, &args[2], r2.value, 2)?;
            ctx.memory.pc_write(0x20 | flag << 3);
            ctx.memory.pc_write(rel);
            return Ok(CmdStatus::Ok);
        }
    }

    illegal_args(args)
}

fn djnz(ctx: &mut Context, args: &[Token]) -> CmdResult {
    argc_check(args, 2)?;

    let r1 = classify(ctx, &args[1])?;

    if r1.reg == Reg::Value {
        let rel = branch_offset(ctx, &args[1], r1.value, 2)?;
        ctx.memory.pc_write(0x10);
        ctx.memory.pc_write(rel);
        return Ok(CmdStatus::Ok);
    }

    illegal_args(args)
}

fn call(ctx: &mut Context, args: &[Token]) -> CmdResult {
    if args.len() == 2 {
        let r1 = classify(ctx, &args[1])?;

        if r1.reg == Reg::Value {
            ctx.memory.pc_write(0xcd);
            ctx.memory.pc_write_word(r1.value);
            return Ok(CmdStatus::Ok);
        }
    } else if args.len() == 3 {
        let flag = classify_flag(&args[1])?;
        let r2 = classify(ctx, &args[2])?;

        if r2.reg == Reg::Value {
            ctx.memory.pc_write(0xc4 | flag << 3);
            ctx.memory.pc_write_word(r2.value);
            return Ok(CmdStatus::Ok);
        }
    }

    illegal_args(args)
}

fn ret(ctx: &mut Context, args: &[Token]) -> CmdResult {
    if args.len() == 1 {
        ctx.memory.pc_write(0xc9);
        return Ok(CmdStatus::Ok);
    }

    if args.len() == 2 {
        let flag = classify_flag(&args[1])?;
        ctx.memory.pc_write(0xc0 | flag << 3);
        return Ok(CmdStatus::Ok);
    }

    illegal_args(args)
}

fn rst(ctx: &mut Context, args: &[Token]) -> CmdResult {
    // Accepted both as decimal-looking and hex vector numbers.
    static VECTORS: [(i64, i64); 8] = [
        (0, 0x00),
        (8, 0x08),
        (10, 0x10),
        (18, 0x18),
        (20, 0x20),
        (28, 0x28),
        (30, 0x30),
        (38, 0x38),
    ];

    argc_check(args, 2)?;

    let r1 = classify(ctx, &args[1])?;

    if r1.reg == Reg::Value {
        let slot = VECTORS
            .iter()
            .position(|&(dec, hex)| dec == r1.value || hex == r1.value);

        if let Some(slot) = slot {
            ctx.memory.pc_write(0xc7 | (slot as i64) << 3);
            return Ok(CmdStatus::Ok);
        }
    }

    illegal_args(args)
}

fn port_in(ctx: &mut Context, args: &[Token]) -> CmdResult {
    argc_check(args, 2)?;

    let r1 = classify(ctx, &args[1])?;

    // IN (C) reads and discards.
    if r1.reg == Reg::CPort && args.len() == 2 {
        ctx.memory.pc_write(0xed);
        ctx.memory.pc_write(0x70);
        return Ok(CmdStatus::Ok);
    }

    argc_check(args, 3)?;

    let r2 = classify(ctx, &args[2])?;

    if r1.reg == Reg::A && r2.reg == Reg::Address {
        if ctx.state.is_final_pass() && !(0..=255).contains(&r2.value) {
            return Err(format!("{}: outside valid range of 0 - 255", args[2].text));
        }
        ctx.memory.pc_write(0xdb);
        ctx.memory.pc_write(r2.value);
        return Ok(CmdStatus::Ok);
    }

    if !r1.is_index() && (r1.is_normal8() || r1.reg == Reg::F) && r2.reg == Reg::CPort {
        ctx.memory.pc_write(0xed);
        ctx.memory.pc_write(0x40 | bitmask(r1.reg) << 3);
        return Ok(CmdStatus::Ok);
    }

    illegal_args(args)
}

fn port_out(ctx: &mut Context, args: &[Token]) -> CmdResult {
    argc_check(args, 3)?;

    let r1 = classify(ctx, &args[1])?;
    let r2 = classify(ctx, &args[2])?;

    if r1.reg == Reg::Address && r2.reg == Reg::A {
        if ctx.state.is_final_pass() && !(0..=255).contains(&r1.value) {
            return Err(format!("{}: outside valid range of 0 - 255", args[1].text));
        }
        ctx.memory.pc_write(0xd3);
        ctx.memory.pc_write(r1.value);
        return Ok(CmdStatus::Ok);
    }

    if r1.reg == Reg::CPort && !r2.is_index() && (r2.is_normal8() || r2.reg == Reg::F) {
        ctx.memory.pc_write(0xed);
        ctx.memory.pc_write(0x41 | bitmask(r2.reg) << 3);
        return Ok(CmdStatus::Ok);
    }

    // Undocumented: OUT (C),0
    if r1.reg == Reg::CPort && r2.reg == Reg::Value {
        ctx.memory.pc_write(0xed);
        ctx.memory.pc_write(0x71);
        return Ok(CmdStatus::Ok);
    }

    illegal_args(args)
}

static IMPLIED_OPCODES: &[(&str, &[u8])] = &[
    ("NOP", &[0x00]),
    ("DI", &[0xf3]),
    ("EI", &[0xfb]),
    ("HALT", &[0x76]),
    ("HLT", &[0x76]),
    ("EXX", &[0xd9]),
    ("DAA", &[0x27]),
    ("CPL", &[0x2f]),
    ("SCF", &[0x37]),
    ("CCF", &[0x3f]),
    ("NEG", &[0xed, 0x44]),
    ("RLCA", &[0x07]),
    ("RRCA", &[0x0f]),
    ("RLA", &[0x17]),
    ("RRA", &[0x1f]),
    ("CPI", &[0xed, 0xa1]),
    ("CPIR", &[0xed, 0xb1]),
    ("CPD", &[0xed, 0xa9]),
    ("CPDR", &[0xed, 0xb9]),
    ("INI", &[0xed, 0xa2]),
    ("INIR", &[0xed, 0xb2]),
    ("IND", &[0xed, 0xaa]),
    ("INDR", &[0xed, 0xba]),
    ("OUTI", &[0xed, 0xa3]),
    ("OTIR", &[0xed, 0xb3]),
    ("OUTD", &[0xed, 0xab]),
    ("OTDR", &[0xed, 0xbb]),
    ("LDI", &[0xed, 0xa0]),
    ("LDIR", &[0xed, 0xb0]),
    ("LDD", &[0xed, 0xa8]),
    ("LDDR", &[0xed, 0xb8]),
    ("RRD", &[0xed, 0x67]),
    ("RLD", &[0xed, 0x6f]),
    ("RETI", &[0xed, 0x4d]),
    ("RETN", &[0xed, 0x45]),
];

pub struct Z80;

impl Z80 {
    pub fn new() -> Z80 {
        Z80
    }
}

impl Default for Z80 {
    fn default() -> Z80 {
        Z80::new()
    }
}

impl CpuBackend for Z80 {
    fn name(&self) -> &'static str {
        "Z80"
    }

    fn init(&mut self, _state: &mut PassState) {}

    fn handle(&mut self, ctx: &mut Context, _label: Option<&str>, args: &[Token]) -> CmdResult {
        let command = args[0].text.to_ascii_uppercase();

        if let Some((_, bytes)) = IMPLIED_OPCODES.iter().find(|(op, _)| *op == command) {
            for &b in *bytes {
                ctx.memory.pc_write(i64::from(b));
            }
            return Ok(CmdStatus::Ok);
        }

        match command.as_str() {
            "LD" => ld(ctx, args),
            "PUSH" => push_pop(ctx, args, 0xc5),
            "POP" => push_pop(ctx, args, 0xc1),
            "EX" => ex(ctx, args),
            "ADD" => add(ctx, args),
            "ADC" => adc(ctx, args),
            "SUB" => alu(ctx, args, &AluOp { base: 0x90, imm: 0xd6, mem: 0x96 }),
            "SBC" => sbc(ctx, args),
            "AND" => alu(ctx, args, &AluOp { base: 0xa0, imm: 0xe6, mem: 0xa6 }),
            "XOR" | "EOR" => alu(ctx, args, &AluOp { base: 0xa8, imm: 0xee, mem: 0xae }),
            "OR" => alu(ctx, args, &AluOp { base: 0xb0, imm: 0xf6, mem: 0xb6 }),
            "CP" => alu(ctx, args, &AluOp { base: 0xb8, imm: 0xfe, mem: 0xbe }),
            "INC" => inc_dec(ctx, args, 0x04, 0x34, 0x03),
            "DEC" => inc_dec(ctx, args, 0x05, 0x35, 0x0b),
            "IM" => im(ctx, args),
            "RLC" | "RL" | "RRC" | "RR" | "SLA" | "SRA" | "SRL" | "SLL" => shift_op(ctx, args),
            "BIT" | "SET" | "RES" => bit_set_res(ctx, args),
            "JP" => jp(ctx, args),
            "JR" => jr(ctx, args),
            "DJNZ" => djnz(ctx, args),
            "CALL" => call(ctx, args),
            "RET" => ret(ctx, args),
            "RST" => rst(ctx, args),
            "IN" => port_in(ctx, args),
            "OUT" => port_out(ctx, args),
            _ => Ok(CmdStatus::NotKnown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(lines: &[&str]) -> (Context, Z80) {
        let mut ctx = Context::new();
        let mut cpu = Z80::new();
        ctx.memory.set_pc(0x8000);

        for line in lines {
            let parsed = rasm_core::parse_line(line, ctx.codepage).unwrap();
            cpu.handle(&mut ctx, None, &parsed.tokens).unwrap();
        }

        (ctx, cpu)
    }

    fn bytes(ctx: &Context, count: u32) -> Vec<u8> {
        (0..count).map(|i| ctx.memory.read(0, 0x8000 + i)).collect()
    }

    #[test]
    fn test_ld_register_moves() {
        let (ctx, _) = assemble(&["  LD A,B", "  LD H,(HL)", "  LD (HL),E"]);
        assert_eq!(bytes(&ctx, 3), vec![0x78, 0x66, 0x73]);
    }

    #[test]
    fn test_ld_immediates() {
        let (ctx, _) = assemble(&["  LD A,0x42", "  LD HL,0x1234"]);
        assert_eq!(bytes(&ctx, 5), vec![0x3e, 0x42, 0x21, 0x34, 0x12]);
    }

    #[test]
    fn test_ld_absolute_both_ways() {
        let (ctx, _) = assemble(&["  LD A,(0x1234)", "  LD (0x1234),A"]);
        assert_eq!(bytes(&ctx, 6), vec![0x3a, 0x34, 0x12, 0x32, 0x34, 0x12]);
    }

    #[test]
    fn test_ld_index_offset() {
        let (ctx, _) = assemble(&["  LD A,(IX+5)", "  LD (IY-2),B"]);
        assert_eq!(bytes(&ctx, 6), vec![0xdd, 0x7e, 0x05, 0xfd, 0x70, 0xfe]);
    }

    #[test]
    fn test_ld_sixteen_bit_memory() {
        let (ctx, _) = assemble(&["  LD HL,(0x4000)", "  LD (0x4000),BC"]);
        assert_eq!(
            bytes(&ctx, 7),
            vec![0x2a, 0x00, 0x40, 0xed, 0x43, 0x00, 0x40]
        );
    }

    #[test]
    fn test_push_pop() {
        let (ctx, _) = assemble(&["  PUSH BC", "  PUSH AF", "  POP IX"]);
        assert_eq!(bytes(&ctx, 4), vec![0xc5, 0xf5, 0xdd, 0xe1]);
    }

    #[test]
    fn test_ex() {
        let (ctx, _) = assemble(&["  EX DE,HL", "  EX AF,AF'", "  EX (SP),IX"]);
        assert_eq!(bytes(&ctx, 4), vec![0xeb, 0x08, 0xdd, 0xe3]);
    }

    #[test]
    fn test_alu_forms() {
        let (ctx, _) = assemble(&["  ADD A,B", "  ADD A,5", "  ADD HL,DE", "  SUB (HL)", "  CP 3"]);
        assert_eq!(
            bytes(&ctx, 7),
            vec![0x80, 0xc6, 0x05, 0x19, 0x96, 0xfe, 0x03]
        );
    }

    #[test]
    fn test_implicit_accumulator() {
        let (ctx, _) = assemble(&["  AND 0x0f", "  XOR A"]);
        assert_eq!(bytes(&ctx, 3), vec![0xe6, 0x0f, 0xaf]);
    }

    #[test]
    fn test_adc_sbc_sixteen() {
        let (ctx, _) = assemble(&["  ADC HL,BC", "  SBC HL,SP"]);
        assert_eq!(bytes(&ctx, 4), vec![0xed, 0x4a, 0xed, 0x72]);
    }

    #[test]
    fn test_inc_dec() {
        let (ctx, _) = assemble(&["  INC A", "  DEC (HL)", "  INC SP", "  DEC (IX+1)"]);
        assert_eq!(
            bytes(&ctx, 7),
            vec![0x3c, 0x35, 0x33, 0xdd, 0x35, 0x01]
        );
    }

    #[test]
    fn test_rotates_and_bits() {
        let (ctx, _) = assemble(&["  RLC B", "  SRL (HL)", "  BIT 7,A", "  SET 0,(IX+3)"]);
        assert_eq!(
            bytes(&ctx, 10),
            vec![0xcb, 0x00, 0xcb, 0x3e, 0xcb, 0x7f, 0xdd, 0xcb, 0x03, 0xc6]
        );
    }

    #[test]
    fn test_jumps() {
        let (ctx, _) = assemble(&["  JP 0x8000", "  JP Z,0x8000", "  JP (HL)"]);
        assert_eq!(
            bytes(&ctx, 7),
            vec![0xc3, 0x00, 0x80, 0xca, 0x00, 0x80, 0xe9]
        );
    }

    #[test]
    fn test_relative_jumps() {
        // JR to own address: offset -2.
        let (ctx, _) = assemble(&["  JR 0x8000"]);
        assert_eq!(bytes(&ctx, 2), vec![0x18, 0xfe]);
    }

    #[test]
    fn test_djnz_and_conditional_jr() {
        let (ctx, _) = assemble(&["  DJNZ 0x8002", "  JR NZ,0x8000"]);
        assert_eq!(bytes(&ctx, 4), vec![0x10, 0x00, 0x20, 0xfc]);
    }

    #[test]
    fn test_branch_range_checked_on_final_pass() {
        let mut ctx = Context::new();
        let mut cpu = Z80::new();
        ctx.state.next_pass();
        ctx.memory.set_pc(0x8000);

        let parsed = rasm_core::parse_line("  JR 0x9000", ctx.codepage).unwrap();
        assert!(cpu.handle(&mut ctx, None, &parsed.tokens).is_err());
    }

    #[test]
    fn test_call_ret_rst() {
        let (ctx, _) = assemble(&["  CALL 0x1234", "  RET NZ", "  RET", "  RST 38"]);
        assert_eq!(
            bytes(&ctx, 6),
            vec![0xcd, 0x34, 0x12, 0xc0, 0xc9, 0xff]
        );
    }

    #[test]
    fn test_io() {
        let (ctx, _) = assemble(&["  IN A,(0xfe)", "  IN B,(C)", "  OUT (0xfe),A", "  OUT (C),D"]);
        assert_eq!(
            bytes(&ctx, 8),
            vec![0xdb, 0xfe, 0xed, 0x40, 0xd3, 0xfe, 0xed, 0x51]
        );
    }

    #[test]
    fn test_implied_opcodes() {
        let (ctx, _) = assemble(&["  NOP", "  EXX", "  LDIR", "  RETI"]);
        assert_eq!(bytes(&ctx, 6), vec![0x00, 0xd9, 0xed, 0xb0, 0xed, 0x4d]);
    }

    #[test]
    fn test_index_halves() {
        let (ctx, _) = assemble(&["  LD IXH,7", "  LD A,IYL"]);
        assert_eq!(bytes(&ctx, 5), vec![0xdd, 0x26, 0x07, 0xfd, 0x7d]);
    }

    #[test]
    fn test_hl_with_index_warns() {
        let mut ctx = Context::new();
        let mut cpu = Z80::new();
        let parsed = rasm_core::parse_line("  LD IXH,H", ctx.codepage).unwrap();
        let status = cpu.handle(&mut ctx, None, &parsed.tokens).unwrap();
        assert!(matches!(status, CmdStatus::Warning(_)));
    }

    #[test]
    fn test_unknown_is_not_known() {
        let mut ctx = Context::new();
        let mut cpu = Z80::new();
        let parsed = rasm_core::parse_line("  WIBBLE", ctx.codepage).unwrap();
        assert_eq!(
            cpu.handle(&mut ctx, None, &parsed.tokens).unwrap(),
            CmdStatus::NotKnown
        );
    }

    #[test]
    fn test_mixed_index_rejected() {
        let mut ctx = Context::new();
        let mut cpu = Z80::new();
        let parsed = rasm_core::parse_line("  LD IXH,IYL", ctx.codepage).unwrap();
        assert!(cpu.handle(&mut ctx, None, &parsed.tokens).is_err());
    }
}
