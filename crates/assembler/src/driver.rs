//! The pass driver.
//!
//! One pass is a sequential walk of every loaded source line; the
//! whole assembly is that walk repeated until the pass count settles.
//! Per line the driver tokenizes, binds any column-1 label to the
//! current PC, expands aliases, and dispatches: driver control
//! directives first (`END`, `INCLUDE`, `MACRO`/`ENDM`), then the
//! built-in directives, then the active CPU backend, and finally the
//! macro store — an unrecognized command that names a macro starts a
//! playback, whose expanded lines run through this same loop before
//! the caller's next line.
//!
//! Include files recurse at the include site; macro state (the
//! recording definition and the invocation stack) is scoped to the
//! file being walked, as is the `END` directive.

use std::ops::Range;
use std::path::Path;

use rasm_core::{Bookmark, LabelKind, LabelStore, MacroInvocation, Token, macros, parse_line};

use crate::cmd::{CmdStatus, argc_check};
use crate::context::Context;
use crate::{Assembler, directives};

/// Deepest allowed `INCLUDE` nesting.
pub const MAX_INCLUDE_DEPTH: usize = 1024;

enum Flow {
    Continue,
    /// `END` was seen: stop processing this file.
    End,
}

/// Macro state local to one file walk.
#[derive(Default)]
struct PassFrame {
    recording: Option<usize>,
    skip_macro: bool,
    invocations: Vec<MacroInvocation>,
}

impl Assembler {
    /// Assemble a source file, running as many passes as the backends
    /// ask for.
    pub fn assemble(&mut self, path: &Path) -> Result<(), String> {
        let range = self.ctx.source.load(path)?;
        self.run_passes(range)
    }

    /// Convenience for tests and embedding: assemble from a string.
    pub fn assemble_str(&mut self, name: &str, source: &str) -> Result<(), String> {
        let range = self.ctx.source.load_str(name, source);
        self.run_passes(range)
    }

    fn run_passes(&mut self, range: Range<usize>) -> Result<(), String> {
        self.ctx.memory.set_pc(0);
        self.init_cpus();

        loop {
            tracing::debug!(pass = self.ctx.state.pass(), "running pass");
            self.run_range(range.clone(), 0)?;

            // Per-pass resets: PC, macro options, aliases, backend
            // state and the namespace counter all restart so every
            // pass sees identical conditions.
            self.ctx.memory.set_pc(0);
            self.ctx.macros.set_defaults();
            self.ctx.aliases.clear();
            self.init_cpus();
            self.ctx.labels.reset_namespace();

            if self.ctx.state.is_final_pass() {
                break;
            }

            self.ctx.state.next_pass();
            self.ctx.memory.clear_write_markers();
        }

        let Context { labels, macros, listing, state, .. } = &mut self.ctx;
        listing.finish(labels, macros, state);

        Ok(())
    }

    fn located(&self, at: Bookmark, frame: &PassFrame, message: String) -> String {
        let mut msg = format!(
            "{}:{}: {message}",
            self.ctx.source.path(at),
            self.ctx.source.line_number(at)
        );

        if let Some(invocation) = frame.invocations.last() {
            msg.push_str(&format!(" (in macro '{}')", invocation.name(&self.ctx.macros)));
        }

        msg
    }

    fn run_range(&mut self, range: Range<usize>, depth: usize) -> Result<(), String> {
        if depth >= MAX_INCLUDE_DEPTH {
            return Err("Include files too deep".to_string());
        }

        let mut frame = PassFrame::default();

        for index in range {
            let at = Bookmark(index);
            let text = self.ctx.source.text(at).to_string();

            match self.handle_line(&text, at, depth, &mut frame) {
                Ok(Flow::Continue) => {}
                Ok(Flow::End) => return Ok(()),
                Err(e) => return Err(self.located(at, &frame, e)),
            }

            // Drain any macro playback the line started, including
            // invocations nested inside it.
            while let Some(mut invocation) = frame.invocations.pop() {
                match self.ctx.macros.play(&mut invocation) {
                    Some(body_line) => {
                        frame.invocations.push(invocation);
                        match self.handle_line(&body_line, at, depth, &mut frame) {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::End) => return Ok(()),
                            Err(e) => return Err(self.located(at, &frame, e)),
                        }
                    }
                    None => {
                        let name = invocation.name(&self.ctx.macros).to_string();
                        let final_pass = self.ctx.state.is_final_pass();
                        self.ctx.listing.macro_invoke_end(&name, final_pass);
                        self.ctx.labels.scope_pop()?;
                    }
                }
            }
        }

        if frame.recording.is_some() {
            return Err("Unterminated macro".to_string());
        }

        Ok(())
    }

    fn handle_line(
        &mut self,
        text: &str,
        at: Bookmark,
        depth: usize,
        frame: &mut PassFrame,
    ) -> Result<Flow, String> {
        self.ctx.listing.start_line(self.ctx.memory.pc());

        let line = parse_line(text, self.ctx.codepage)?;
        let in_macro = !frame.invocations.is_empty();

        // A column-1 token is a label; bind it to the current PC now.
        // Commands like EQU overwrite the value afterwards.
        let mut label: Option<String> = None;
        let mut cmd_index = 0;

        if line.first_column && !line.tokens.is_empty() {
            let raw = &line.tokens[0].text;
            let Some((name, kind)) = LabelStore::sanitise(raw) else {
                return Err(format!("Invalid label '{raw}'"));
            };

            // A global defined inside a macro body would land in the
            // caller's namespace and collide on the next invocation.
            if in_macro && kind == LabelKind::Global {
                return Err("Don't set global labels in macros".to_string());
            }

            self.ctx
                .labels
                .set(name, i64::from(self.ctx.memory.pc()), kind)?;

            label = Some(name.to_string());
            cmd_index = 1;
        }

        // Label-only lines still belong to a macro body being
        // recorded.
        if line.tokens.len() == cmd_index {
            if let Some(def) = frame.recording {
                self.ctx.macros.record(def, text);
            }
            self.list_line(text);
            return Ok(Flow::Continue);
        }

        let mut args: Vec<Token> = line.tokens[cmd_index..].to_vec();
        let expanded = self.ctx.aliases.expand(&args[0].text).to_string();
        args[0].text = expanded;
        let command = args[0].text.to_ascii_lowercase();
        let command = command.strip_prefix('.').unwrap_or(&command);

        if command == "end" {
            self.list_line(text);
            return Ok(Flow::End);
        }

        if command == "include" {
            argc_check(&args, 2)?;
            let include = self.ctx.source.load(Path::new(&args[1].text))?;
            return match self.run_range(include, depth + 1) {
                Ok(()) => Ok(Flow::Continue),
                // Already located in the included file.
                Err(e) => Err(e),
            };
        }

        if command == "macro" {
            // Definitions are only recorded on the first pass; later
            // passes skip the body.
            if self.ctx.state.is_first_pass() {
                if frame.recording.is_some() {
                    return Err("macro: can't nest macro definitions".to_string());
                }

                let (name, params) = macro_signature(label.as_deref(), &args)?;
                frame.recording = Some(self.ctx.macros.define(&name, &params)?);
            } else {
                frame.skip_macro = true;
            }
            return Ok(Flow::Continue);
        }

        if command == "endm" {
            if frame.recording.is_none() && self.ctx.state.is_first_pass() {
                return Err("endm: No macro started".to_string());
            }
            frame.recording = None;
            frame.skip_macro = false;
            return Ok(Flow::Continue);
        }

        if let Some(def) = frame.recording {
            self.ctx.macros.record(def, text);
            return Ok(Flow::Continue);
        }

        if frame.skip_macro {
            return Ok(Flow::Continue);
        }

        // Built-in directives, then the CPU backend.
        let mut status = directives::run_internal(self, label.as_deref(), &args)?;

        if status == CmdStatus::NotKnown {
            status = self.cpu_handle(label.as_deref(), &args)?;
        }

        self.list_line(text);

        // Still unknown: an invocation of a recorded macro, or a
        // genuinely unknown opcode.
        if status == CmdStatus::NotKnown {
            match self.ctx.macros.find(&args)? {
                Some(invocation) => {
                    if frame.invocations.len() >= macros::MAX_INVOKE_DEPTH - 1 {
                        return Err("Macro invocation too deep".to_string());
                    }

                    let final_pass = self.ctx.state.is_final_pass();
                    self.ctx.listing.macro_invoke_start(&args, final_pass);

                    // Each invocation gets a deterministic anonymous
                    // global as its local-label scope.
                    let namespace = self.ctx.labels.make_namespace();
                    self.ctx
                        .labels
                        .scope_push(&namespace, i64::from(self.ctx.memory.pc()));

                    frame.invocations.push(invocation);
                    status = CmdStatus::Ok;
                }
                None => {
                    return Err(format!("Unknown command/opcode '{}'", args[0].text));
                }
            }
        }

        if let CmdStatus::Warning(message) = status {
            let warning = self.located(at, frame, format!("WARNING {message}"));
            tracing::warn!("{warning}");
            let final_pass = self.ctx.state.is_final_pass();
            self.ctx.listing.error(&warning, final_pass);
        }

        Ok(Flow::Continue)
    }

    fn list_line(&mut self, text: &str) {
        let Context { memory, state, listing, .. } = &mut self.ctx;
        listing.line(text, memory, state);
    }
}

/// Work out a macro's name and parameters: either the line label names
/// it (`name: MACRO p1, p2`) or the first argument does
/// (`MACRO name p1, p2` — the tokenizer leaves `name p1` as one
/// argument).
fn macro_signature(label: Option<&str>, args: &[Token]) -> Result<(String, Vec<Token>), String> {
    if let Some(label) = label {
        return Ok((label.to_string(), args[1..].to_vec()));
    }

    let Some(first) = args.get(1) else {
        return Err("macro: missing name".to_string());
    };

    let mut words = first.text.splitn(2, char::is_whitespace);
    let name = words.next().unwrap_or_default().to_string();

    if name.is_empty() {
        return Err("macro: missing name".to_string());
    }

    let mut params = Vec::new();
    if let Some(rest) = words.next() {
        let rest = rest.trim();
        if !rest.is_empty() {
            params.push(Token::bare(rest));
        }
    }
    params.extend(args[2..].iter().cloned());

    Ok((name, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(parts: &[&str]) -> Vec<Token> {
        parts.iter().map(|p| Token::bare(*p)).collect()
    }

    #[test]
    fn test_macro_signature_from_label() {
        let (name, params) =
            macro_signature(Some("blit"), &toks(&["MACRO", "src", "dst"])).unwrap();
        assert_eq!(name, "blit");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_macro_signature_from_first_argument() {
        let (name, params) =
            macro_signature(None, &toks(&["MACRO", "push2 r1", "r2"])).unwrap();
        assert_eq!(name, "push2");
        assert_eq!(params[0].text, "r1");
        assert_eq!(params[1].text, "r2");
    }

    #[test]
    fn test_macro_signature_missing_name() {
        assert!(macro_signature(None, &toks(&["MACRO"])).is_err());
    }
}
