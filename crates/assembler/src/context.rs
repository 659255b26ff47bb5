//! Shared assembly context.
//!
//! One instance of every store, owned by the driver and passed `&mut`
//! into directive and CPU handlers. The original design kept these as
//! process-wide singletons mutated by one line's handler at a time;
//! gathering them in a struct keeps those semantics while letting the
//! borrow checker enforce the single-owner rule.

use rasm_core::{
    AliasTable, Codepage, ExprCtx, LabelStore, MacroStore, Memory, PassState, SourceFile, expr,
};

use crate::listing::Listing;
use crate::output::OutputConfig;

pub struct Context {
    pub state: PassState,
    pub memory: Memory,
    pub labels: LabelStore,
    pub macros: MacroStore,
    pub aliases: AliasTable,
    pub codepage: Codepage,
    pub listing: Listing,
    pub output: OutputConfig,
    pub source: SourceFile,
}

impl Default for Context {
    fn default() -> Context {
        Context::new()
    }
}

impl Context {
    pub fn new() -> Context {
        Context {
            state: PassState::new(),
            memory: Memory::new(),
            labels: LabelStore::new(),
            macros: MacroStore::new(),
            aliases: AliasTable::new(),
            codepage: Codepage::Ascii,
            listing: Listing::new(),
            output: OutputConfig::new(),
            source: SourceFile::new(),
        }
    }

    /// The expression environment for the current line.
    pub fn expr_ctx(&self) -> ExprCtx<'_> {
        ExprCtx {
            labels: &self.labels,
            pc: i64::from(self.memory.pc()),
            final_pass: self.state.is_final_pass(),
            codepage: self.codepage,
        }
    }

    /// Evaluate an expression against the current state.
    pub fn eval(&self, text: &str) -> Result<i64, String> {
        expr::eval(&self.expr_ctx(), text)
    }

    /// Evaluate a command argument, wrapping errors the way every
    /// handler reports them.
    pub fn eval_arg(&self, command: &str, text: &str) -> Result<i64, String> {
        self.eval(text)
            .map_err(|e| format!("{command}: expression error: {e}"))
    }
}
