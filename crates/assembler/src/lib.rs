//! rasm — a multi-pass assembler for retro 8/16-bit CPUs.
//!
//! The driver walks the source at least twice: the first pass discovers
//! label addresses, the last re-assembles with everything known, and a
//! backend whose instruction sizes depend on operand values (zero-page
//! selection on the 6502 and SPC-700, operand magnitude on the 65C816)
//! can request one more in between. Code accumulates in banked sparse
//! memory and is emitted afterwards in the configured container format
//! (raw, Intel HEX, tape and cartridge images, or a relocatable
//! library blob).
//!
//! ```rust,ignore
//! use rasm::Assembler;
//!
//! let mut asm = Assembler::new();
//! asm.assemble(Path::new("game.asm"))?;
//! asm.write_output()?;
//! ```

pub mod cmd;
pub mod config;
pub mod context;
pub mod cpu;
pub mod directives;
pub mod driver;
pub mod listing;
pub mod output;

pub use cmd::{CmdResult, CmdStatus};
pub use config::Defaults;
pub use context::Context;

use cpu::CpuBackend;

/// The assembler: the shared stores plus the CPU backends and the
/// current selection.
pub struct Assembler {
    pub ctx: Context,
    cpus: Vec<Box<dyn CpuBackend>>,
    current_cpu: usize,
}

impl Default for Assembler {
    fn default() -> Assembler {
        Assembler::new()
    }
}

impl Assembler {
    pub fn new() -> Assembler {
        let mut asm = Assembler {
            ctx: Context::new(),
            cpus: cpu::registry(),
            current_cpu: 0,
        };
        asm.apply_cpu_defaults();
        asm
    }

    /// Select a backend by `CPU`/`ARCH` name. Returns false when no
    /// backend matches.
    pub fn select_cpu(&mut self, name: &str) -> bool {
        match self
            .cpus
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(name))
        {
            Some(i) => {
                self.current_cpu = i;
                self.apply_cpu_defaults();
                true
            }
            None => false,
        }
    }

    fn apply_cpu_defaults(&mut self) {
        let cpu = &self.cpus[self.current_cpu];
        self.ctx.memory.set_word_mode(cpu.word_mode());
        self.ctx.memory.set_address_space(cpu.address_space());
    }

    /// Re-initialize every backend for a new pass and restore the
    /// active CPU's word mode.
    pub fn init_cpus(&mut self) {
        for cpu in &mut self.cpus {
            cpu.init(&mut self.ctx.state);
        }
        self.apply_cpu_defaults();
    }

    pub(crate) fn cpu_handle(
        &mut self,
        label: Option<&str>,
        args: &[rasm_core::Token],
    ) -> CmdResult {
        self.cpus[self.current_cpu].handle(&mut self.ctx, label, args)
    }

    pub(crate) fn cpu_option(
        &mut self,
        name: &str,
        args: &[rasm_core::Token],
    ) -> Option<CmdResult> {
        let cpu = &mut self.cpus[self.current_cpu];
        let entry = cmd::find_option(name, cpu.options())?;
        Some(cpu.set_option(entry.tag, args, &self.ctx))
    }

    /// Emit the assembled banks in the configured output format.
    pub fn write_output(&self) -> Result<(), String> {
        output::write_output(&self.ctx.output, &self.ctx.memory, &self.ctx.labels)
    }
}
