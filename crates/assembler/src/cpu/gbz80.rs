//! Gameboy CPU backend.
//!
//! The Sharp core is a Z80 stripped of IX/IY, the alternate register
//! set and the I/O ports, with its own additions: post-increment and
//! post-decrement `(HL)` forms (written `(HLI)`/`(HL+)` and
//! `(HLD)`/`(HL-)`), the `$FF00`-page loads (`LDH` and the `(C)`
//! index), `SWAP`, and the two-byte `STOP`. High-page loads also fall
//! out of plain `LD` when the address sits in `$FF00..$FFFF`.

use rasm_core::{PassState, Token};

use crate::cmd::{CmdResult, CmdStatus, argc_check, illegal_args};
use crate::context::Context;

use super::CpuBackend;

const NORMAL_8: u32 = 0x01;
const SPECIAL_8: u32 = 0x02;
const BIT_16: u32 = 0x04;
const MEMORY: u32 = 0x08;
const FF00_C: u32 = 0x10;
const STACK_PTR: u32 = 0x20;
const VALUE_T: u32 = 0x40;
const SPECIAL_16: u32 = 0x80;

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
    Af,
    Bc,
    De,
    Hl,
    Sp,
    BcInd,
    DeInd,
    HlInd,
    SpInd,
    HlIncrement,
    HlDecrement,
    HighC,
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
        Reg::Af => "AF",
        Reg::Bc => "BC",
        Reg::De => "DE",
        Reg::Hl => "HL",
        Reg::Sp => "SP",
        Reg::BcInd => "(BC)",
        Reg::DeInd => "(DE)",
        Reg::HlInd => "(HL)",
        Reg::SpInd => "(SP)",
        Reg::HlIncrement => "(HL+)",
        Reg::HlDecrement => "(HL-)",
        Reg::HighC => "(C)",
        Reg::Address => "(address)",
        Reg::Value => "value",
    }
}

fn bitmask(reg: Reg) -> i64 {
    match reg {
        Reg::A => 0x7,
        Reg::B => 0x0,
        Reg::C => 0x1,
        Reg::D => 0x2,
        Reg::E => 0x3,
        Reg::H => 0x4,
        Reg::L => 0x5,
        Reg::F => 0x6,
        Reg::Af | Reg::Sp => 0x3,
        Reg::Bc => 0x0,
        Reg::De => 0x1,
        Reg::Hl => 0x2,
        _ => 0x0,
    }
}

struct ModeRow {
    reg: Reg,
    quote: Option<char>,
    starts_with: bool,
    take_value: bool,
    ident: &'static str,
    flags: u32,
}

const fn exact(reg: Reg, quote: Option<char>, ident: &'static str, flags: u32) -> ModeRow {
    ModeRow { reg, quote, starts_with: false, take_value: false, ident, flags }
}

static MODE_TABLE: &[ModeRow] = &[
    exact(Reg::A, None, "A", NORMAL_8),
    exact(Reg::B, None, "B", NORMAL_8),
    exact(Reg::C, None, "C", NORMAL_8),
    exact(Reg::D, None, "D", NORMAL_8),
    exact(Reg::E, None, "E", NORMAL_8),
    exact(Reg::H, None, "H", NORMAL_8),
    exact(Reg::L, None, "L", NORMAL_8),
    exact(Reg::F, None, "F", SPECIAL_8),
    exact(Reg::Af, None, "AF", SPECIAL_16),
    exact(Reg::Bc, None, "BC", BIT_16),
    exact(Reg::De, None, "DE", BIT_16),
    exact(Reg::Hl, None, "HL", BIT_16),
    exact(Reg::Sp, None, "SP", BIT_16 | STACK_PTR),
    exact(Reg::BcInd, Some('('), "BC", BIT_16 | MEMORY),
    exact(Reg::DeInd, Some('('), "DE", BIT_16 | MEMORY),
    exact(Reg::HlInd, Some('('), "HL", BIT_16 | MEMORY),
    exact(Reg::SpInd, Some('('), "SP", SPECIAL_16 | MEMORY | STACK_PTR),
    exact(Reg::HlIncrement, Some('('), "HLI", SPECIAL_16 | MEMORY),
    exact(Reg::HlIncrement, Some('('), "HL+", SPECIAL_16 | MEMORY),
    exact(Reg::HlDecrement, Some('('), "HLD", SPECIAL_16 | MEMORY),
    exact(Reg::HlDecrement, Some('('), "HL-", SPECIAL_16 | MEMORY),
    exact(Reg::HighC, Some('('), "C", FF00_C),
    ModeRow {
        reg: Reg::Address,
        quote: Some('('),
        starts_with: true,
        take_value: true,
        ident: "",
        flags: VALUE_T | MEMORY,
    },
    ModeRow {
        reg: Reg::Value,
        quote: None,
        starts_with: true,
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
        if row.take_value {
            value = ctx
                .eval(&arg.text[row.ident.len()..])
                .map_err(|e| format!("{}: expression error: {e}", arg.text))?;
        }

        return Ok(Operand { reg: row.reg, flags: row.flags, value });
    }

    Err(format!("{}: couldn't calculate register/addressing mode", arg.text))
}

/// Condition flags; the Gameboy keeps only the first four of the Z80's
/// set.
static FLAG_NAMES: &[&str] = &["NZ", "Z", "NC", "C"];

fn classify_flag(arg: &Token) -> Result<i64, String> {
    FLAG_NAMES
        .iter()
        .position(|f| f.eq_ignore_ascii_case(&arg.text))
        .map(|i| i as i64)
        .ok_or_else(|| format!("{}: unknown flag", arg.text))
}

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

fn accumulator_args(ctx: &Context, args: &[Token]) -> Result<(Operand, Operand), String> {
    argc_check(args, 2)?;

    if args.len() == 2 {
        let a = Operand { reg: Reg::A, flags: NORMAL_8, value: 0 };
        Ok((a, classify(ctx, &args[1])?))
    } else {
        Ok((classify(ctx, &args[1])?, classify(ctx, &args[2])?))
    }
}

fn branch_offset(ctx: &Context, arg: &Token, target: i64) -> Result<i64, String> {
    let rel = target - (i64::from(ctx.memory.pc()) + 2) % 0x10000;

    if ctx.state.is_final_pass() && !(-128..=127).contains(&rel) {
        return Err(format!("{}: Branch offset ({rel}) too big", arg.text));
    }

    Ok(rel)
}

fn ld(ctx: &mut Context, args: &[Token]) -> CmdResult {
    static CODES: &[PairCode] = &[
        PairCode { lhs: Reg::A, rhs: Reg::BcInd, code: &[Code::B(0x0a)] },
        PairCode { lhs: Reg::A, rhs: Reg::DeInd, code: &[Code::B(0x1a)] },
        PairCode { lhs: Reg::A, rhs: Reg::Address, code: &[Code::B(0xfa), Code::WordRhs] },
        PairCode { lhs: Reg::BcInd, rhs: Reg::A, code: &[Code::B(0x02)] },
        PairCode { lhs: Reg::DeInd, rhs: Reg::A, code: &[Code::B(0x12)] },
        PairCode { lhs: Reg::Address, rhs: Reg::A, code: &[Code::B(0xea), Code::WordLhs] },
        PairCode { lhs: Reg::HlDecrement, rhs: Reg::A, code: &[Code::B(0x32)] },
        PairCode { lhs: Reg::A, rhs: Reg::HlDecrement, code: &[Code::B(0x3a)] },
        PairCode { lhs: Reg::HlIncrement, rhs: Reg::A, code: &[Code::B(0x22)] },
        PairCode { lhs: Reg::A, rhs: Reg::HlIncrement, code: &[Code::B(0x2a)] },
        PairCode { lhs: Reg::HighC, rhs: Reg::A, code: &[Code::B(0xe2)] },
        PairCode { lhs: Reg::A, rhs: Reg::HighC, code: &[Code::B(0xf2)] },
    ];

    argc_check(args, 3)?;

    let r1 = classify(ctx, &args[1])?;
    let r2 = classify(ctx, &args[2])?;

    // LD r,r'
    if r1.is_normal8() && r2.is_normal8() {
        ctx.memory.pc_write(0x40 | bitmask(r1.reg) << 3 | bitmask(r2.reg));
        return Ok(CmdStatus::Ok);
    }

    // LD r,n
    if r1.is_normal8() && r2.is_simple_value() {
        ctx.memory.pc_write(bitmask(r1.reg) << 3 | 0x6);
        ctx.memory.pc_write(r2.value);
        return Ok(CmdStatus::Ok);
    }

    // LD r,(HL)
    if r1.is_normal8() && r2.reg == Reg::HlInd {
        ctx.memory.pc_write(0x46 | bitmask(r1.reg) << 3);
        return Ok(CmdStatus::Ok);
    }

    // LD (HL),r
    if r2.is_normal8() && r1.reg == Reg::HlInd {
        ctx.memory.pc_write(0x70 | bitmask(r2.reg));
        return Ok(CmdStatus::Ok);
    }

    // LD (HL),n
    if r1.reg == Reg::HlInd && r2.reg == Reg::Value {
        ctx.memory.pc_write(0x36);
        ctx.memory.pc_write(r2.value);
        return Ok(CmdStatus::Ok);
    }

    // LD rr,nn
    if r1.is_16bit() && !r1.is_memory() && r2.reg == Reg::Value {
        ctx.memory.pc_write(bitmask(r1.reg) << 4 | 0x01);
        ctx.memory.pc_write_word(r2.value);
        return Ok(CmdStatus::Ok);
    }

    // LD (nn),SP
    if r1.reg == Reg::Address && r2.reg == Reg::Sp {
        ctx.memory.pc_write(0x08);
        ctx.memory.pc_write_word(r1.value);
        return Ok(CmdStatus::Ok);
    }

    // LD SP,HL
    if r1.reg == Reg::Sp && r2.reg == Reg::Hl {
        ctx.memory.pc_write(0xf9);
        return Ok(CmdStatus::Ok);
    }

    // High-page loads fall out of plain LD when the address is in
    // $FF00-$FFFF.
    if r1.reg == Reg::A && r2.reg == Reg::Address && r2.value >= 0xff00 {
        ctx.memory.pc_write(0xf0);
        ctx.memory.pc_write(r2.value - 0xff00);
        return Ok(CmdStatus::Ok);
    }

    if r1.reg == Reg::Address && r2.reg == Reg::A && r1.value >= 0xff00 {
        ctx.memory.pc_write(0xe0);
        ctx.memory.pc_write(r1.value - 0xff00);
        return Ok(CmdStatus::Ok);
    }

    write_pair_codes(ctx, &args[0].text, CODES, &r1, &r2)
}

fn ldh(ctx: &mut Context, args: &[Token]) -> CmdResult {
    static CODES: &[PairCode] = &[
        PairCode { lhs: Reg::A, rhs: Reg::Address, code: &[Code::B(0xf0), Code::ByteRhs] },
        PairCode { lhs: Reg::Address, rhs: Reg::A, code: &[Code::B(0xe0), Code::ByteLhs] },
    ];

    argc_check(args, 3)?;

    let mut r1 = classify(ctx, &args[1])?;
    let mut r2 = classify(ctx, &args[2])?;

    // Accept both the page offset and the full $FFxx address.
    for (operand, arg) in [(&mut r1, &args[1]), (&mut r2, &args[2])] {
        if operand.reg == Reg::Address {
            if (0xff00..=0xffff).contains(&operand.value) {
                operand.value -= 0xff00;
            }
            if ctx.state.is_final_pass() && !(0..=255).contains(&operand.value) {
                return Err(format!("{}: outside valid range of 0 - 255", arg.text));
            }
        }
    }

    write_pair_codes(ctx, &args[0].text, CODES, &r1, &r2)
}

/// `LDD`/`LDI`: the explicit spellings of the post-decrement and
/// post-increment loads.
fn ldd_ldi(ctx: &mut Context, args: &[Token], store: u8, load: u8) -> CmdResult {
    argc_check(args, 3)?;

    let r1 = classify(ctx, &args[1])?;
    let r2 = classify(ctx, &args[2])?;

    let codes = [
        PairCode { lhs: Reg::HlInd, rhs: Reg::A, code: &[Code::B(store)] },
        PairCode { lhs: Reg::A, rhs: Reg::HlInd, code: &[Code::B(load)] },
    ];

    write_pair_codes(ctx, &args[0].text, &codes, &r1, &r2)
}

fn push_pop(ctx: &mut Context, args: &[Token], opcode: i64) -> CmdResult {
    argc_check(args, 2)?;

    let r1 = classify(ctx, &args[1])?;

    if r1.is(&[Reg::Af, Reg::Bc, Reg::De, Reg::Hl]) {
        ctx.memory.pc_write(opcode | bitmask(r1.reg) << 4);
        return Ok(CmdStatus::Ok);
    }

    Err(format!("{}: invalid argument {}", args[0].text, args[1].text))
}

fn add(ctx: &mut Context, args: &[Token]) -> CmdResult {
    let (r1, r2) = accumulator_args(ctx, args)?;

    if r1.reg == Reg::A && r2.is_normal8() {
        ctx.memory.pc_write(0x80 | bitmask(r2.reg));
        return Ok(CmdStatus::Ok);
    }

    if r1.reg == Reg::Hl && r2.is(&[Reg::Bc, Reg::De, Reg::Hl, Reg::Sp]) {
        ctx.memory.pc_write(0x09 | bitmask(r2.reg) << 4);
        return Ok(CmdStatus::Ok);
    }

    let codes = [
        PairCode { lhs: Reg::A, rhs: Reg::Value, code: &[Code::B(0xc6), Code::ByteRhs] },
        PairCode { lhs: Reg::A, rhs: Reg::HlInd, code: &[Code::B(0x86)] },
        // ADD SP,e: signed byte displacement.
        PairCode { lhs: Reg::Sp, rhs: Reg::Value, code: &[Code::B(0xe8), Code::ByteRhs] },
    ];

    write_pair_codes(ctx, &args[0].text, &codes, &r1, &r2)
}

fn alu(ctx: &mut Context, args: &[Token], base: i64, imm: u8, mem: u8) -> CmdResult {
    let (r1, r2) = accumulator_args(ctx, args)?;

    if r1.reg == Reg::A && r2.is_normal8() {
        ctx.memory.pc_write(base | bitmask(r2.reg));
        return Ok(CmdStatus::Ok);
    }

    let codes = [
        PairCode { lhs: Reg::A, rhs: Reg::Value, code: &[Code::B(imm), Code::ByteRhs] },
        PairCode { lhs: Reg::A, rhs: Reg::HlInd, code: &[Code::B(mem)] },
    ];

    write_pair_codes(ctx, &args[0].text, &codes, &r1, &r2)
}

fn inc_dec(ctx: &mut Context, args: &[Token], r8: i64, mem: i64, r16: i64) -> CmdResult {
    argc_check(args, 2)?;

    let r1 = classify(ctx, &args[1])?;

    if r1.is_normal8() {
        ctx.memory.pc_write(r8 | bitmask(r1.reg) << 3);
        return Ok(CmdStatus::Ok);
    }

    if r1.reg == Reg::HlInd {
        ctx.memory.pc_write(mem);
        return Ok(CmdStatus::Ok);
    }

    if r1.is_16bit() && !r1.is_memory() {
        ctx.memory.pc_write(r16 | bitmask(r1.reg) << 4);
        return Ok(CmdStatus::Ok);
    }

    illegal_args(args)
}

fn cb_op(ctx: &mut Context, args: &[Token]) -> CmdResult {
    argc_check(args, 2)?;

    let mask: i64 = match args[0].text.to_ascii_uppercase().as_str() {
        "RLC" => 0x00,
        "RRC" => 0x08,
        "RL" => 0x10,
        "RR" => 0x18,
        "SLA" => 0x20,
        "SRA" => 0x28,
        "SWAP" => 0x30,
        _ => 0x38, // SRL
    };

    let r1 = classify(ctx, &args[1])?;

    if args.len() == 2 {
        if r1.is_normal8() {
            ctx.memory.pc_write(0xcb);
            ctx.memory.pc_write(mask | bitmask(r1.reg));
            return Ok(CmdStatus::Ok);
        }

        if r1.reg == Reg::HlInd {
            ctx.memory.pc_write(0xcb);
            ctx.memory.pc_write(mask | 0x06);
            return Ok(CmdStatus::Ok);
        }
    }

    illegal_args(args)
}

fn bit_set_res(ctx: &mut Context, args: &[Token]) -> CmdResult {
    argc_check(args, 3)?;

    let mask: i64 = match args[0].text.to_ascii_uppercase().as_str() {
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

    if r2.is_normal8() {
        ctx.memory.pc_write(0xcb);
        ctx.memory.pc_write(mask | r1.value << 3 | bitmask(r2.reg));
        return Ok(CmdStatus::Ok);
    }

    if r2.reg == Reg::HlInd {
        ctx.memory.pc_write(0xcb);
        ctx.memory.pc_write(mask | r1.value << 3 | 0x06);
        return Ok(CmdStatus::Ok);
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

        if r1.reg == Reg::HlInd {
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
            let rel = branch_offset(ctx, &args[1], r1.value)?;
            ctx.memory.pc_write(0x18);
            ctx.memory.pc_write(rel);
            return Ok(CmdStatus::Ok);
        }
    } else if args.len() == 3 {
        let flag = classify_flag(&args[1])?;
        let r2 = classify(ctx, &args[2])?;

        if r2.reg == Reg::Value {
            let rel = branch_offset(ctx, &args[2], r2.value)?;
            ctx.memory.pc_write(0x20 | flag << 3);
            ctx.memory.pc_write(rel);
            return Ok(CmdStatus::Ok);
        }
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

fn stop(ctx: &mut Context, args: &[Token]) -> CmdResult {
    if args.len() == 1 {
        ctx.memory.pc_write(0x10);
        ctx.memory.pc_write(0x00);
        return Ok(CmdStatus::Ok);
    }

    illegal_args(args)
}

static IMPLIED_OPCODES: &[(&str, u8)] = &[
    ("NOP", 0x00),
    ("DI", 0xf3),
    ("EI", 0xfb),
    ("HALT", 0x76),
    ("HLT", 0x76),
    ("DAA", 0x27),
    ("CPL", 0x2f),
    ("SCF", 0x37),
    ("CCF", 0x3f),
    ("RLCA", 0x07),
    ("RRCA", 0x0f),
    ("RLA", 0x17),
    ("RRA", 0x1f),
    ("RETI", 0xd9),
];

pub struct GbZ80;

impl GbZ80 {
    pub fn new() -> GbZ80 {
        GbZ80
    }
}

impl Default for GbZ80 {
    fn default() -> GbZ80 {
        GbZ80::new()
    }
}

impl CpuBackend for GbZ80 {
    fn name(&self) -> &'static str {
        "GAMEBOY"
    }

    fn init(&mut self, _state: &mut PassState) {}

    fn handle(&mut self, ctx: &mut Context, _label: Option<&str>, args: &[Token]) -> CmdResult {
        let command = args[0].text.to_ascii_uppercase();

        if let Some(&(_, code)) = IMPLIED_OPCODES.iter().find(|(op, _)| *op == command) {
            ctx.memory.pc_write(i64::from(code));
            return Ok(CmdStatus::Ok);
        }

        match command.as_str() {
            "LD" => ld(ctx, args),
            "LDH" => ldh(ctx, args),
            "LDD" => ldd_ldi(ctx, args, 0x32, 0x3a),
            "LDI" => ldd_ldi(ctx, args, 0x22, 0x2a),
            "PUSH" => push_pop(ctx, args, 0xc5),
            "POP" => push_pop(ctx, args, 0xc1),
            "ADD" => add(ctx, args),
            "ADC" => alu(ctx, args, 0x88, 0xce, 0x8e),
            "SUB" => alu(ctx, args, 0x90, 0xd6, 0x96),
            "SBC" => alu(ctx, args, 0x98, 0xde, 0x9e),
            "AND" => alu(ctx, args, 0xa0, 0xe6, 0xa6),
            "XOR" | "EOR" => alu(ctx, args, 0xa8, 0xee, 0xae),
            "OR" => alu(ctx, args, 0xb0, 0xf6, 0xb6),
            "CP" => alu(ctx, args, 0xb8, 0xfe, 0xbe),
            "INC" => inc_dec(ctx, args, 0x04, 0x34, 0x03),
            "DEC" => inc_dec(ctx, args, 0x05, 0x35, 0x0b),
            "RLC" | "RRC" | "RL" | "RR" | "SLA" | "SRA" | "SRL" | "SWAP" => cb_op(ctx, args),
            "BIT" | "SET" | "RES" => bit_set_res(ctx, args),
            "JP" => jp(ctx, args),
            "JR" => jr(ctx, args),
            "CALL" => call(ctx, args),
            "RET" => ret(ctx, args),
            "RST" => rst(ctx, args),
            "STOP" => stop(ctx, args),
            _ => Ok(CmdStatus::NotKnown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(lines: &[&str]) -> Context {
        let mut ctx = Context::new();
        let mut cpu = GbZ80::new();
        ctx.memory.set_pc(0x150);

        for line in lines {
            let parsed = rasm_core::parse_line(line, ctx.codepage).unwrap();
            cpu.handle(&mut ctx, None, &parsed.tokens).unwrap();
        }

        ctx
    }

    fn bytes(ctx: &Context, count: u32) -> Vec<u8> {
        (0..count).map(|i| ctx.memory.read(0, 0x150 + i)).collect()
    }

    #[test]
    fn test_hl_increment_decrement() {
        let ctx = assemble(&["  LD (HLI),A", "  LD A,(HL-)", "  LDI (HL),A"]);
        assert_eq!(bytes(&ctx, 3), vec![0x22, 0x3a, 0x22]);
    }

    #[test]
    fn test_high_page_loads() {
        let ctx = assemble(&["  LDH A,(0x44)", "  LDH (0xFF40),A", "  LD A,(0xFF00)"]);
        assert_eq!(
            bytes(&ctx, 6),
            vec![0xf0, 0x44, 0xe0, 0x40, 0xf0, 0x00]
        );
    }

    #[test]
    fn test_high_c_index() {
        let ctx = assemble(&["  LD (C),A", "  LD A,(C)"]);
        assert_eq!(bytes(&ctx, 2), vec![0xe2, 0xf2]);
    }

    #[test]
    fn test_ld_sp_forms() {
        let ctx = assemble(&["  LD (0xC000),SP", "  LD SP,HL", "  ADD SP,-2"]);
        assert_eq!(
            bytes(&ctx, 6),
            vec![0x08, 0x00, 0xc0, 0xf9, 0xe8, 0xfe]
        );
    }

    #[test]
    fn test_basic_alu_matches_z80_shape() {
        let ctx = assemble(&["  ADD A,B", "  XOR A", "  CP 0x90"]);
        assert_eq!(bytes(&ctx, 4), vec![0x80, 0xaf, 0xfe, 0x90]);
    }

    #[test]
    fn test_swap_and_shifts() {
        let ctx = assemble(&["  SWAP A", "  SRL B", "  RLC (HL)"]);
        assert_eq!(bytes(&ctx, 6), vec![0xcb, 0x37, 0xcb, 0x38, 0xcb, 0x06]);
    }

    #[test]
    fn test_stop_is_two_bytes() {
        let ctx = assemble(&["  STOP"]);
        assert_eq!(bytes(&ctx, 2), vec![0x10, 0x00]);
    }

    #[test]
    fn test_jumps_and_calls() {
        let ctx = assemble(&["  JP 0x150", "  JR NZ,0x150", "  RET Z", "  RST 0"]);
        assert_eq!(
            bytes(&ctx, 8),
            vec![0xc3, 0x50, 0x01, 0x20, 0xfb, 0xc8, 0xc7, 0x00]
        );
    }

    #[test]
    fn test_no_ix_iy() {
        let mut ctx = Context::new();
        let mut cpu = GbZ80::new();
        let parsed = rasm_core::parse_line("  LD A,(IX+1)", ctx.codepage).unwrap();
        assert!(cpu.handle(&mut ctx, None, &parsed.tokens).is_err());
    }

    #[test]
    fn test_ld_absolute() {
        let ctx = assemble(&["  LD A,(0x1234)", "  LD (0x1234),A"]);
        assert_eq!(
            bytes(&ctx, 6),
            vec![0xfa, 0x34, 0x12, 0xea, 0x34, 0x12]
        );
    }
}
