//! Output container formats.
//!
//! After the final pass the accumulated banks are handed to one of
//! these sinks, selected with `OPTION output-format`. Each format
//! module owns its options and its writer; this module holds the shared
//! configuration (file names, format selection) and the dispatch.

pub mod cbm;
pub mod cpc;
pub mod gameboy;
pub mod hex;
pub mod lib;
pub mod nes;
pub mod raw;
pub mod snes;
pub mod spectap;
pub mod zx81;

use rasm_core::{ExprCtx, LabelStore, Memory, Token, expr};

use crate::cmd::{CmdResult, CmdStatus, OptionEntry, argc_check, find_option};

/// A used bank and its written region, as handed to every writer.
#[derive(Debug, Clone, Copy)]
pub struct BankRegion {
    pub number: u32,
    pub min: u32,
    pub max: u32,
}

impl BankRegion {
    pub fn len(&self) -> u32 {
        self.max - self.min + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Raw,
    IntelHex,
    Library,
    SpectrumTap,
    Prg,
    CbmTap,
    T64,
    Zx81,
    Gameboy,
    Snes,
    Nes,
    Cpc,
}

static FORMAT_NAMES: &[(&str, Format)] = &[
    ("raw", Format::Raw),
    ("hex", Format::IntelHex),
    ("lib", Format::Library),
    ("spectrum", Format::SpectrumTap),
    ("prg", Format::Prg),
    ("cbm-tap", Format::CbmTap),
    ("t64", Format::T64),
    ("zx81", Format::Zx81),
    ("gameboy", Format::Gameboy),
    ("snes", Format::Snes),
    ("nes", Format::Nes),
    ("cpc", Format::Cpc),
];

/// Look an output format up by its option name.
pub fn lookup_format(name: &str) -> Option<Format> {
    FORMAT_NAMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, f)| f)
}

const OPT_OUTPUT_FILE: u32 = 0;
const OPT_OUTPUT_FORMAT: u32 = 1;
const OPT_OUTPUT_BANK_FILE: u32 = 2;

static OPTIONS: &[OptionEntry] = &[
    OptionEntry { name: "output-file", tag: OPT_OUTPUT_FILE },
    OptionEntry { name: "output-format", tag: OPT_OUTPUT_FORMAT },
    OptionEntry { name: "output-bank-file", tag: OPT_OUTPUT_BANK_FILE },
];

/// Shared output state plus the per-format option blocks.
pub struct OutputConfig {
    pub file: String,
    /// Template for per-bank filenames; `%u` expands to the bank
    /// number.
    pub bank_file: String,
    pub format: Format,

    pub hex: hex::HexOptions,
    pub spectap: spectap::SpecTapOptions,
    pub cbm: cbm::CbmOptions,
    pub zx81: zx81::Zx81Options,
    pub gameboy: gameboy::GameboyOptions,
    pub snes: snes::SnesOptions,
    pub nes: nes::NesOptions,
    pub cpc: cpc::CpcOptions,
}

impl Default for OutputConfig {
    fn default() -> OutputConfig {
        OutputConfig {
            file: "output".to_string(),
            bank_file: "output.%u".to_string(),
            format: Format::Raw,
            hex: Default::default(),
            spectap: Default::default(),
            cbm: Default::default(),
            zx81: Default::default(),
            gameboy: Default::default(),
            snes: Default::default(),
            nes: Default::default(),
            cpc: Default::default(),
        }
    }
}

impl OutputConfig {
    pub fn new() -> OutputConfig {
        OutputConfig::default()
    }

    /// The filename for a bank: the plain output file when only one
    /// bank exists, otherwise the bank template expanded.
    pub fn bank_name(&self, bank: u32, bank_count: usize) -> String {
        if bank_count == 1 {
            self.file.clone()
        } else {
            self.bank_file.replace("%u", &bank.to_string())
        }
    }

    /// Route an `OPTION` into the shared output options or any format's
    /// table; `None` if nobody claims the name.
    pub fn try_option(&mut self, name: &str, args: &[Token], ctx: &ExprCtx) -> Option<CmdResult> {
        if let Some(entry) = find_option(name, OPTIONS) {
            return Some(self.set_shared_option(entry.tag, args));
        }
        if let Some(entry) = find_option(name, hex::OPTIONS) {
            return Some(self.hex.set_option(entry.tag, args, ctx));
        }
        if let Some(entry) = find_option(name, spectap::OPTIONS) {
            return Some(self.spectap.set_option(entry.tag, args, ctx));
        }
        if let Some(entry) = find_option(name, cbm::OPTIONS) {
            return Some(self.cbm.set_option(entry.tag, args, ctx));
        }
        if let Some(entry) = find_option(name, zx81::OPTIONS) {
            return Some(self.zx81.set_option(entry.tag, args, ctx));
        }
        if let Some(entry) = find_option(name, gameboy::OPTIONS) {
            return Some(self.gameboy.set_option(entry.tag, args, ctx));
        }
        if let Some(entry) = find_option(name, snes::OPTIONS) {
            return Some(self.snes.set_option(entry.tag, args, ctx));
        }
        if let Some(entry) = find_option(name, nes::OPTIONS) {
            return Some(self.nes.set_option(entry.tag, args, ctx));
        }
        if let Some(entry) = find_option(name, cpc::OPTIONS) {
            return Some(self.cpc.set_option(entry.tag, args, ctx));
        }
        None
    }

    fn set_shared_option(&mut self, tag: u32, args: &[Token]) -> CmdResult {
        argc_check(args, 1)?;
        let value = &args[0].text;

        match tag {
            OPT_OUTPUT_FILE => self.file = value.clone(),
            OPT_OUTPUT_BANK_FILE => self.bank_file = value.clone(),
            OPT_OUTPUT_FORMAT => {
                self.format = lookup_format(value)
                    .ok_or_else(|| format!("unknown value: \"{value}\""))?;
            }
            _ => {}
        }

        Ok(CmdStatus::Ok)
    }
}

/// Evaluate an option argument as an expression.
pub(crate) fn eval_arg(ctx: &ExprCtx, arg: &Token) -> Result<i64, String> {
    expr::eval(ctx, &arg.text).map_err(|e| format!("{}: expression error: {e}", arg.text))
}

/// Collect the used banks with their written regions, ascending by
/// bank number.
pub fn used_regions(memory: &Memory) -> Vec<BankRegion> {
    memory
        .used_banks()
        .into_iter()
        .filter_map(|number| {
            memory
                .bank_span(number)
                .map(|(min, max)| BankRegion { number, min, max })
        })
        .collect()
}

/// Write the assembled banks in the configured format.
pub fn write_output(
    config: &OutputConfig,
    memory: &Memory,
    labels: &LabelStore,
) -> Result<(), String> {
    let banks = used_regions(memory);

    if banks.is_empty() {
        tracing::warn!("skipping output; no written memory to write");
        return Ok(());
    }

    match config.format {
        Format::Raw => raw::write(config, memory, &banks),
        Format::IntelHex => hex::write(config, memory, &banks),
        Format::Library => lib::write(config, memory, labels, &banks),
        Format::SpectrumTap => spectap::write(config, memory, &banks),
        Format::Prg => cbm::write_prg(config, memory, &banks),
        Format::CbmTap => cbm::write_tap(config, memory, &banks),
        Format::T64 => cbm::write_t64(config, memory, &banks),
        Format::Zx81 => zx81::write(config, memory, &banks),
        Format::Gameboy => gameboy::write(config, memory, &banks),
        Format::Snes => snes::write(config, memory, &banks),
        Format::Nes => nes::write(config, memory, &banks),
        Format::Cpc => cpc::write(config, memory, &banks),
    }
}

/// Create the output file, mapping the error the way every writer
/// reports it.
pub(crate) fn create(name: &str) -> Result<std::fs::File, String> {
    std::fs::File::create(name).map_err(|e| format!("Failed to create {name}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_name() {
        let config = OutputConfig::new();
        assert_eq!(config.bank_name(3, 1), "output");
        assert_eq!(config.bank_name(3, 2), "output.3");
    }

    #[test]
    fn test_format_lookup() {
        let mut config = OutputConfig::new();
        let labels = LabelStore::new();
        let ctx = ExprCtx {
            labels: &labels,
            pc: 0,
            final_pass: true,
            codepage: rasm_core::Codepage::Ascii,
        };
        let args = [Token::bare("option"), Token::bare("gameboy")];
        let result = config.try_option("output-format", &args[1..], &ctx);
        assert!(matches!(result, Some(Ok(CmdStatus::Ok))));
        assert_eq!(config.format, Format::Gameboy);
    }

    #[test]
    fn test_unknown_option_falls_through() {
        let mut config = OutputConfig::new();
        let labels = LabelStore::new();
        let ctx = ExprCtx {
            labels: &labels,
            pc: 0,
            final_pass: true,
            codepage: rasm_core::Codepage::Ascii,
        };
        assert!(config.try_option("zero-page", &[], &ctx).is_none());
    }
}
