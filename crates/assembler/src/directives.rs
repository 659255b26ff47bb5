//! Built-in directives.
//!
//! Everything that isn't a CPU instruction or a macro: label binding
//! (`EQU`), location control (`ORG`/`BANK`/`ALIGN`/`DS`), data
//! (`DB`/`DW`/`INCBIN`), configuration (`CPU`, `OPTION`, `ALIAS`) and
//! the library import. Each name also accepts a leading `.`.
//!
//! The `INCLUDE`/`END`/`MACRO`/`ENDM` control directives are not here —
//! they change the driver's own flow and are handled in its line loop.

use rasm_core::{ExprCtx, LabelKind, Token};

use crate::Assembler;
use crate::cmd::{CmdResult, CmdStatus, argc_check};
use crate::context::Context;
use crate::output::lib as liblib;

/// Dispatch a directive; `NotKnown` hands the line to the CPU backend.
pub fn run_internal(asm: &mut Assembler, label: Option<&str>, args: &[Token]) -> CmdResult {
    let command = args[0].text.to_ascii_lowercase();
    let command = command.strip_prefix('.').unwrap_or(&command);

    match command {
        "equ" | "eq" => equ(asm, label, args),
        "org" => org(asm, label, args),
        "bank" => bank(asm, args),
        "ds" | "defs" => ds(asm, args),
        "db" | "defb" | "byte" | "text" => define_mem(asm, args, 8),
        "dw" | "defw" | "word" => define_mem(asm, args, 16),
        "align" => align(asm, args),
        "incbin" => incbin(asm, args),
        "cpu" | "arch" => arch(asm, args),
        "option" | "opt" => option(asm, args),
        "alias" => alias(asm, args),
        "import" => import(asm, args),
        "nullcmd" => Ok(CmdStatus::Ok),
        _ => Ok(CmdStatus::NotKnown),
    }
}

fn equ(asm: &mut Assembler, label: Option<&str>, args: &[Token]) -> CmdResult {
    let Some(label) = label else {
        return Err(format!("{}: missing label", args[0].text));
    };
    argc_check(args, 2)?;

    let value = asm.ctx.eval_arg(&args[0].text, &args[1].text)?;
    asm.ctx.labels.set(label, value, LabelKind::Any)?;

    Ok(CmdStatus::Ok)
}

fn org(asm: &mut Assembler, label: Option<&str>, args: &[Token]) -> CmdResult {
    argc_check(args, 2)?;

    let address = asm.ctx.eval_arg(&args[0].text, &args[1].text)?;
    asm.ctx.memory.set_pc(address);

    // A label on the ORG line names the new location.
    if let Some(label) = label {
        asm.ctx.labels.set(label, address, LabelKind::Any)?;
    }

    // Optional second argument selects the bank.
    if args.len() > 2 {
        let bank = asm.ctx.eval_arg(&args[0].text, &args[2].text)?;
        asm.ctx.memory.set_bank(bank as u32);
    }

    Ok(CmdStatus::Ok)
}

fn bank(asm: &mut Assembler, args: &[Token]) -> CmdResult {
    argc_check(args, 2)?;

    let bank = asm.ctx.eval_arg(&args[0].text, &args[1].text)?;
    asm.ctx.memory.set_bank(bank as u32);

    Ok(CmdStatus::Ok)
}

fn ds(asm: &mut Assembler, args: &[Token]) -> CmdResult {
    argc_check(args, 2)?;

    let count = asm.ctx.eval_arg(&args[0].text, &args[1].text)?;

    for _ in 0..count.max(0) {
        // Re-evaluated per byte so a fill expression can reference `$`.
        let value = if args.len() > 2 {
            asm.ctx.eval_arg(&args[0].text, &args[2].text)?
        } else {
            0
        };
        asm.ctx.memory.pc_write(value);
    }

    Ok(CmdStatus::Ok)
}

fn define_mem(asm: &mut Assembler, args: &[Token], bits: u32) -> CmdResult {
    argc_check(args, 2)?;

    for arg in &args[1..] {
        if arg.is_string() {
            for c in arg.text.chars() {
                let value = i64::from(asm.ctx.codepage.convert(c));
                if bits == 8 {
                    asm.ctx.memory.pc_write(value);
                } else {
                    asm.ctx.memory.pc_write_word(value);
                }
            }
        } else {
            let value = asm.ctx.eval_arg(&args[0].text, &arg.text)?;
            if bits == 8 {
                asm.ctx.memory.pc_write(value);
            } else {
                asm.ctx.memory.pc_write_word(value);
            }
        }
    }

    Ok(CmdStatus::Ok)
}

fn align(asm: &mut Assembler, args: &[Token]) -> CmdResult {
    argc_check(args, 2)?;

    let size = asm.ctx.eval_arg(&args[0].text, &args[1].text)?;

    if !(2..=32768).contains(&size) {
        return Err(format!("{}: Illegal align size {size}", args[0].text));
    }

    while i64::from(asm.ctx.memory.pc()) % size != 0 {
        if args.len() > 2 {
            let fill = asm.ctx.eval_arg(&args[0].text, &args[2].text)?;
            asm.ctx.memory.pc_write(fill);
        } else {
            asm.ctx.memory.pc_add(1);
        }
    }

    Ok(CmdStatus::Ok)
}

fn incbin(asm: &mut Assembler, args: &[Token]) -> CmdResult {
    argc_check(args, 2)?;

    let path = &args[1].text;
    let bytes =
        std::fs::read(path).map_err(|e| format!("Failed to open '{path}': {e}"))?;

    for b in bytes {
        asm.ctx.memory.pc_write(i64::from(b));
    }

    Ok(CmdStatus::Ok)
}

fn arch(asm: &mut Assembler, args: &[Token]) -> CmdResult {
    argc_check(args, 2)?;

    if asm.select_cpu(&args[1].text) {
        Ok(CmdStatus::Ok)
    } else {
        Err(format!("{}: unknown CPU '{}'", args[0].text, args[1].text))
    }
}

fn option(asm: &mut Assembler, args: &[Token]) -> CmdResult {
    argc_check(args, 2)?;

    // `OPTION +name` / `OPTION -name` is shorthand for yes/no.
    let (name, values): (String, Vec<Token>) =
        if let Some(rest) = args[1].text.strip_prefix('+') {
            (rest.to_string(), vec![Token::bare("yes")])
        } else if let Some(rest) = args[1].text.strip_prefix('-') {
            (rest.to_string(), vec![Token::bare("no")])
        } else {
            argc_check(args, 3)?;
            (args[1].text.clone(), args[2..].to_vec())
        };

    // Route through each option table in turn; the first owner wins.
    let final_pass = asm.ctx.state.is_final_pass();
    if let Some(result) = asm.ctx.listing.try_option(&name, &values, final_pass) {
        return result;
    }

    if name.eq_ignore_ascii_case("macro-arg-char") {
        let c = values[0].text.chars().next().unwrap_or('\0');
        asm.ctx.macros.set_arg_char(c)?;
        return Ok(CmdStatus::Ok);
    }

    if name.eq_ignore_ascii_case("codepage") || name.eq_ignore_ascii_case("charset") {
        let value = &values[0].text;
        asm.ctx.codepage = rasm_core::Codepage::from_name(value)
            .ok_or_else(|| format!("unknown value: \"{value}\""))?;
        return Ok(CmdStatus::Ok);
    }

    {
        let Context { labels, memory, state, codepage, output, .. } = &mut asm.ctx;
        let expr_ctx = ExprCtx {
            labels,
            pc: i64::from(memory.pc()),
            final_pass: state.is_final_pass(),
            codepage: *codepage,
        };
        if let Some(result) = output.try_option(&name, &values, &expr_ctx) {
            return result;
        }
    }

    if let Some(result) = asm.cpu_option(&name, &values) {
        return result;
    }

    Err(format!("{}: unknown option {name}", args[0].text))
}

fn alias(asm: &mut Assembler, args: &[Token]) -> CmdResult {
    argc_check(args, 3)?;

    asm.ctx.aliases.create(&args[1].text, &args[2].text);

    Ok(CmdStatus::Ok)
}

/// Load a library blob produced by the `lib` output format, optionally
/// relocated.
fn import(asm: &mut Assembler, args: &[Token]) -> CmdResult {
    argc_check(args, 2)?;

    let path = &args[1].text;
    let data =
        std::fs::read(path).map_err(|e| format!("Failed to open '{path}': {e}"))?;

    let offset = if args.len() > 2 {
        asm.ctx.eval_arg(&args[0].text, &args[2].text)?
    } else {
        0
    };

    let Context { labels, memory, .. } = &mut asm.ctx;
    liblib::load(&data, memory, labels, offset)
        .map_err(|e| format!("{}: {e}", args[0].text))?;

    Ok(CmdStatus::Ok)
}
