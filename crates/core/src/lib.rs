//! Core stores for the rasm assembler.
//!
//! Everything in this crate is a leaf component: the line tokenizer, the
//! expression evaluator, the label/macro/alias stores, the banked memory
//! model and the pass bookkeeping. None of it performs I/O on its own
//! (the label blob reads/writes through caller-supplied buffers), and
//! none of it knows about CPUs or output containers — that lives in the
//! `rasm` crate, which owns one instance of each store and threads them
//! through the pass driver.

pub mod alias;
pub mod codepage;
pub mod expr;
pub mod label;
pub mod macros;
pub mod memory;
pub mod parse;
pub mod source;
pub mod state;
pub mod text;

pub use alias::AliasTable;
pub use codepage::Codepage;
pub use expr::{ExprCtx, to_unsigned};
pub use label::{LabelKind, LabelStore};
pub use macros::{MacroInvocation, MacroStore};
pub use memory::{Memory, WordMode};
pub use parse::{Line, Token, parse_line};
pub use source::{Bookmark, SourceFile};
pub use state::PassState;
