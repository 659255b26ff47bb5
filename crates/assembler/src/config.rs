//! Assembler defaults file.
//!
//! A small optional TOML file (`rasm.toml` next to the sources, or a
//! path given with `--config`) that pre-sets what would otherwise need
//! `OPTION` lines in every source: the output file and format, and the
//! starting CPU. Directives in the source still win — defaults are
//! applied before the first pass.

use std::path::Path;

use serde::Deserialize;

use crate::Assembler;
use crate::output;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    /// Output filename (`OPTION output-file`).
    pub output_file: Option<String>,
    /// Per-bank filename template with `%u` for the bank number.
    pub output_bank_file: Option<String>,
    /// Output format name (`OPTION output-format`).
    pub output_format: Option<String>,
    /// Starting CPU (`CPU` directive).
    pub cpu: Option<String>,
}

impl Defaults {
    /// Load a defaults file.
    pub fn load(path: &Path) -> Result<Defaults, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;

        toml::from_str(&text).map_err(|e| format!("Failed to parse {}: {e}", path.display()))
    }

    /// Load `rasm.toml` from the working directory if present.
    pub fn discover() -> Result<Defaults, String> {
        let path = Path::new("rasm.toml");
        if path.exists() {
            Defaults::load(path)
        } else {
            Ok(Defaults::default())
        }
    }

    /// Apply the defaults to a fresh assembler.
    pub fn apply(&self, asm: &mut Assembler) -> Result<(), String> {
        if let Some(file) = &self.output_file {
            asm.ctx.output.file = file.clone();
        }

        if let Some(template) = &self.output_bank_file {
            asm.ctx.output.bank_file = template.clone();
        }

        if let Some(format) = &self.output_format {
            asm.ctx.output.format = output::lookup_format(format)
                .ok_or_else(|| format!("unknown output format \"{format}\""))?;
        }

        if let Some(cpu) = &self.cpu
            && !asm.select_cpu(cpu)
        {
            return Err(format!("unknown CPU \"{cpu}\""));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_apply() {
        let defaults: Defaults = toml::from_str(
            "output_file = \"game.tap\"\noutput_format = \"spectrum\"\ncpu = \"z80\"\n",
        )
        .unwrap();

        let mut asm = Assembler::new();
        defaults.apply(&mut asm).unwrap();

        assert_eq!(asm.ctx.output.file, "game.tap");
        assert_eq!(asm.ctx.output.format, output::Format::SpectrumTap);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(toml::from_str::<Defaults>("colour = true\n").is_err());
    }

    #[test]
    fn test_unknown_format_rejected() {
        let defaults: Defaults =
            toml::from_str("output_format = \"cassette\"\n").unwrap();
        assert!(defaults.apply(&mut Assembler::new()).is_err());
    }
}
