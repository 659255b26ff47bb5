//! CPU backends.
//!
//! Every backend implements the same narrow contract: reset per-pass
//! state (possibly asking for an extra pass), expose an option table,
//! apply options, and encode one instruction — returning `NotKnown`
//! when the mnemonic isn't its, so the driver can try macros next.
//! Everything architecture-specific (addressing-mode tables, opcode
//! maps) stays behind this trait.

pub mod gbz80;
pub mod mos6502;
pub mod spc700;
pub mod w65c816;
pub mod z80;

use rasm_core::{PassState, Token, WordMode};

use crate::cmd::{CmdResult, OptionEntry};
use crate::context::Context;

pub trait CpuBackend {
    /// Name matched by the `CPU`/`ARCH` directive.
    fn name(&self) -> &'static str;

    /// Size of the address space the PC wraps in.
    fn address_space(&self) -> u32 {
        0x10000
    }

    /// Byte order for 16-bit operand writes.
    fn word_mode(&self) -> WordMode {
        WordMode::LsbFirst
    }

    /// Reset per-assembly options. Called before every pass; a backend
    /// whose encodings depend on operand values raises the pass count
    /// here.
    fn init(&mut self, state: &mut PassState);

    /// Option name → tag table for the `OPTION` directive.
    fn options(&self) -> &'static [OptionEntry] {
        &[]
    }

    /// Apply an option by tag.
    fn set_option(&mut self, _tag: u32, _args: &[Token], _ctx: &Context) -> CmdResult {
        Ok(crate::cmd::CmdStatus::Ok)
    }

    /// Encode one instruction. `args[0]` is the (alias-expanded)
    /// mnemonic.
    fn handle(&mut self, ctx: &mut Context, label: Option<&str>, args: &[Token]) -> CmdResult;
}

/// All supported backends, in the order the `CPU` directive searches
/// them. The first entry is the power-on default.
pub fn registry() -> Vec<Box<dyn CpuBackend>> {
    vec![
        Box::new(z80::Z80::new()),
        Box::new(mos6502::Mos6502::new()),
        Box::new(w65c816::W65c816::new()),
        Box::new(gbz80::GbZ80::new()),
        Box::new(spc700::Spc700::new()),
    ]
}
