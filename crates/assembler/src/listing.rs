//! Source listing.
//!
//! When enabled (`OPTION list yes`) the final pass echoes every source
//! line, optionally annotated with the line's start PC and the bytes it
//! produced, and can append label and macro dumps at the end. Nothing
//! is written on earlier passes — addresses are not settled yet.

use std::fs::File;
use std::io::Write;

use rasm_core::{Memory, PassState, Token};

use crate::cmd::{CmdResult, CmdStatus, OptionEntry, find_option, true_false};

const OPT_LIST: u32 = 0;
const OPT_LIST_FILE: u32 = 1;
const OPT_LIST_PC: u32 = 2;
const OPT_LIST_HEX: u32 = 3;
const OPT_LIST_MACROS: u32 = 4;
const OPT_LIST_LABELS: u32 = 5;
const OPT_LIST_RM_BLANK: u32 = 6;

static OPTIONS: &[OptionEntry] = &[
    OptionEntry { name: "list", tag: OPT_LIST },
    OptionEntry { name: "list-file", tag: OPT_LIST_FILE },
    OptionEntry { name: "list-pc", tag: OPT_LIST_PC },
    OptionEntry { name: "list-hex", tag: OPT_LIST_HEX },
    OptionEntry { name: "list-macros", tag: OPT_LIST_MACROS },
    OptionEntry { name: "list-labels", tag: OPT_LIST_LABELS },
    OptionEntry { name: "list-rm-blank", tag: OPT_LIST_RM_BLANK },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum LabelMode {
    #[default]
    Off,
    Dump,
    DumpAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum MacroMode {
    #[default]
    Off,
    Invoke,
    Dump,
    All,
}

impl MacroMode {
    fn invokes(self) -> bool {
        matches!(self, MacroMode::Invoke | MacroMode::All)
    }

    fn dumps(self) -> bool {
        matches!(self, MacroMode::Dump | MacroMode::All)
    }
}

#[derive(Default)]
pub struct Listing {
    enabled: bool,
    dump_pc: bool,
    dump_bytes: bool,
    rm_blank: bool,
    labels: LabelMode,
    macros: MacroMode,
    output: Option<File>,
    line_pc: u32,
    last_line_blank: bool,
}

impl Listing {
    pub fn new() -> Listing {
        Listing { rm_blank: true, ..Listing::default() }
    }

    /// Route an `OPTION` to this module; `None` if the name is not a
    /// listing option.
    pub fn try_option(&mut self, name: &str, args: &[Token], final_pass: bool) -> Option<CmdResult> {
        let entry = find_option(name, OPTIONS)?;
        Some(self.set_option(entry.tag, args, final_pass))
    }

    fn set_option(&mut self, tag: u32, args: &[Token], final_pass: bool) -> CmdResult {
        // Listing only happens on the final pass; setting options
        // earlier would act on a file that is thrown away.
        if !final_pass {
            return Ok(CmdStatus::Ok);
        }

        if args.is_empty() {
            return Err("option: missing argument".to_string());
        }
        let value = args[0].text.as_str();

        match tag {
            OPT_LIST => self.enabled = true_false(value, false),
            OPT_LIST_FILE => {
                if self.output.is_some() {
                    return Err("output file already set".to_string());
                }
                self.output =
                    Some(File::create(value).map_err(|e| format!("couldn't open \"{value}\": {e}"))?);
            }
            OPT_LIST_PC => self.dump_pc = true_false(value, false),
            OPT_LIST_HEX => self.dump_bytes = true_false(value, false),
            OPT_LIST_MACROS => {
                self.macros = match value.to_ascii_lowercase().as_str() {
                    "off" | "no" => MacroMode::Off,
                    "yes" | "exec" => MacroMode::Invoke,
                    "dump" => MacroMode::Dump,
                    "all" => MacroMode::All,
                    other => return Err(format!("unknown value: \"{other}\"")),
                }
            }
            OPT_LIST_LABELS => {
                self.labels = match value.to_ascii_lowercase().as_str() {
                    "off" | "no" => LabelMode::Off,
                    "on" | "yes" => LabelMode::Dump,
                    "all" => LabelMode::DumpAll,
                    other => return Err(format!("unknown value: \"{other}\"")),
                }
            }
            OPT_LIST_RM_BLANK => self.rm_blank = true_false(value, false),
            _ => {}
        }

        Ok(CmdStatus::Ok)
    }

    fn emit(&mut self, text: &str) {
        match &mut self.output {
            Some(f) => {
                let _ = writeln!(f, "{text}");
            }
            None => println!("{text}"),
        }
    }

    /// Record the PC at the start of a line so the annotation can show
    /// where its bytes landed.
    pub fn start_line(&mut self, pc: u32) {
        self.line_pc = pc;
    }

    /// Echo a processed source line with its annotations.
    pub fn line(&mut self, text: &str, memory: &Memory, state: &PassState) {
        if !state.is_final_pass() || !self.enabled {
            return;
        }

        let blank = rasm_core::text::is_blank(text);
        if self.rm_blank && self.last_line_blank && blank {
            return;
        }
        self.last_line_blank = blank;

        self.emit(text);

        let pc = memory.pc();
        if (self.dump_pc || self.dump_bytes) && pc != self.line_pc {
            let mut note = String::from(";");

            if self.dump_pc {
                note.push_str(&format!(" ${:04X}:", self.line_pc));
            }

            if self.dump_bytes && pc.wrapping_sub(self.line_pc) < 256 {
                for addr in self.line_pc..pc {
                    note.push_str(&format!(" ${:02X}", memory.read(memory.current_bank(), addr)));
                }
            }

            self.emit(&note);
        }
    }

    pub fn macro_invoke_start(&mut self, args: &[Token], final_pass: bool) {
        if final_pass && self.enabled && self.macros.invokes() {
            let rendered: Vec<String> = args[1..].iter().map(crate::cmd::display_arg).collect();
            let text = format!("; START MACRO {} {}", args[0].text, rendered.join(", "));
            self.emit(&text);
        }
    }

    pub fn macro_invoke_end(&mut self, name: &str, final_pass: bool) {
        if final_pass && self.enabled && self.macros.invokes() {
            let text = format!("; END MACRO {name}");
            self.emit(&text);
        }
    }

    /// Mirror a diagnostic into the listing file, if one is open.
    pub fn error(&mut self, message: &str, final_pass: bool) {
        if final_pass && self.enabled && self.output.is_some() {
            let text = message.to_string();
            self.emit(&text);
        }
    }

    /// Append the label and macro dumps after the last pass.
    pub fn finish(
        &mut self,
        labels: &rasm_core::LabelStore,
        macros: &rasm_core::MacroStore,
        state: &PassState,
    ) {
        if !state.is_final_pass() || !self.enabled {
            return;
        }

        if self.labels != LabelMode::Off {
            self.emit("\n;\n; LABELS:\n;");
            let include_private = self.labels == LabelMode::DumpAll;
            let mut dump = String::new();
            for (global, locals) in labels.globals() {
                if global.name.starts_with('_') && !include_private {
                    continue;
                }
                dump.push_str(&format!(
                    "; {:32}  = ${:08x} ({})\n",
                    global.name, global.value as u32, global.value
                ));
                for local in locals {
                    dump.push_str(&format!(
                        "; .{:32} = ${:08x} ({})\n",
                        local.name, local.value as u32, local.value
                    ));
                }
            }
            self.emit(dump.trim_end());
        }

        if self.macros.dumps() {
            self.emit("\n;\n; MACROS:\n;");
            for def in macros.defs() {
                let mut head = format!("; {}: MACRO", def.name);
                if !def.params.is_empty() {
                    head.push(' ');
                    head.push_str(&def.params.join(", "));
                }
                self.emit(&head);
                for line in &def.lines {
                    let text = format!("; {line}");
                    self.emit(&text);
                }
                self.emit("; ENDM");
            }
        }
    }
}
