//! NES iNES output.
//!
//! Banks declare their role by where they assembled: 0x0000–0x1fff is
//! an 8K character (video) bank, 0x8000 upwards a 32K program bank,
//! and 0xc000 upwards a single 16K program segment. The writer pokes
//! the reset/NMI/BRK vectors into the first code bank, emits the
//! 16-byte iNES header, then the program banks followed by the
//! character banks.

use std::io::Write;

use rasm_core::{ExprCtx, Memory, Token};

use crate::cmd::{CmdResult, CmdStatus, OptionEntry, argc_check};

use super::{BankRegion, OutputConfig, create, eval_arg};

pub const OPT_VECTOR: u32 = 0;
pub const OPT_TV_FORMAT: u32 = 1;
pub const OPT_MAPPER: u32 = 2;

pub static OPTIONS: &[OptionEntry] = &[
    OptionEntry { name: "nes-vector", tag: OPT_VECTOR },
    OptionEntry { name: "nes-tv-format", tag: OPT_TV_FORMAT },
    OptionEntry { name: "nes-mapper", tag: OPT_MAPPER },
];

const LAYOUT_HELP: &str = "Banks should use memory in the range 0x0000 - 0x1fff to indicate \
     they are video ROM, 0x8000 - 0xffff to indicate they are program \
     ROM or 0xc000 - 0xffff to indicate a single 16K ROM segment.";

#[derive(Debug, Clone, Copy)]
pub struct NesOptions {
    pub reset_vector: i64,
    pub nmi_vector: i64,
    pub brk_vector: i64,
    /// 0 = NTSC, 1 = PAL, per the iNES flag.
    pub pal: bool,
    pub mapper: i64,
}

impl Default for NesOptions {
    fn default() -> NesOptions {
        NesOptions {
            reset_vector: -1,
            nmi_vector: -1,
            brk_vector: -1,
            pal: true,
            mapper: 0,
        }
    }
}

impl NesOptions {
    pub fn set_option(&mut self, tag: u32, args: &[Token], ctx: &ExprCtx) -> CmdResult {
        argc_check(args, 1)?;

        match tag {
            OPT_VECTOR => {
                argc_check(args, 2)?;
                let value = eval_arg(ctx, &args[1])?;
                match args[0].text.to_ascii_lowercase().as_str() {
                    "reset" => self.reset_vector = value,
                    "nmi" => self.nmi_vector = value,
                    "brk" => self.brk_vector = value,
                    other => return Err(format!("unknown value: \"{other}\"")),
                }
            }
            OPT_TV_FORMAT => {
                self.pal = match args[0].text.to_ascii_lowercase().as_str() {
                    "pal" => true,
                    "ntsc" => false,
                    other => return Err(format!("unknown value: \"{other}\"")),
                }
            }
            OPT_MAPPER => self.mapper = eval_arg(ctx, &args[0])?,
            _ => {}
        }

        Ok(CmdStatus::Ok)
    }
}

pub fn write(config: &OutputConfig, memory: &Memory, banks: &[BankRegion]) -> Result<(), String> {
    let opts = config.nes;

    let mut num_rom = 0;
    let mut num_vrom = 0;
    let mut is_16k = false;
    let mut first_code = None;

    for (i, bank) in banks.iter().enumerate() {
        if bank.max < 0x2000 {
            num_vrom += 1;
        } else if bank.min >= 0xc000 {
            first_code.get_or_insert(i);
            is_16k = true;
            num_rom += 1;
        } else if bank.min >= 0x8000 {
            first_code.get_or_insert(i);
            is_16k = false;
            num_rom += 1;
        } else {
            return Err(LAYOUT_HELP.to_string());
        }
    }

    let Some(first_code) = first_code else {
        return Err(format!("No ROM code banks present; {LAYOUT_HELP}"));
    };

    // Vectors go into the first code bank.
    let mut code = memory.get_block(banks[first_code].number, 0, 0x10000);

    let start = if opts.reset_vector == -1 {
        let assumed = if is_16k { 0xc000 } else { 0x8000 };
        tracing::warn!("No reset vector provided; assuming {assumed:#06x}");
        assumed
    } else {
        opts.reset_vector
    };
    code[0xfffc] = start as u8;
    code[0xfffd] = (start >> 8) as u8;

    if opts.nmi_vector != -1 {
        code[0xfffa] = opts.nmi_vector as u8;
        code[0xfffb] = (opts.nmi_vector >> 8) as u8;
    } else {
        tracing::warn!("NMI vector not set");
    }

    if opts.brk_vector != -1 {
        code[0xfffe] = opts.brk_vector as u8;
        code[0xffff] = (opts.brk_vector >> 8) as u8;
    }

    let name = &config.file;
    let mut file = create(name)?;
    let mut out = Vec::new();

    out.extend_from_slice(b"NES\x1a");
    out.push(if is_16k { 1 } else { num_rom * 2 });
    out.push(num_vrom);
    out.push((opts.mapper as u8 & 0x0f) << 4);
    out.push(opts.mapper as u8 & 0xf0);
    out.push(0);
    out.push(u8::from(opts.pal));
    out.extend_from_slice(&[0; 6]);

    // Program banks first, then character banks.
    for (i, bank) in banks.iter().enumerate() {
        if bank.max < 0x2000 {
            continue;
        }
        let block = if i == first_code {
            let base = if is_16k { 0xc000 } else { 0x8000 };
            let size = if is_16k { 0x4000 } else { 0x8000 };
            code[base..base + size].to_vec()
        } else if is_16k {
            memory.get_block(bank.number, 0xc000, 0x4000)
        } else {
            memory.get_block(bank.number, 0x8000, 0x8000)
        };
        out.extend_from_slice(&block);
    }

    for bank in banks {
        if bank.max < 0x2000 {
            out.extend_from_slice(&memory.get_block(bank.number, 0, 0x2000));
        }
    }

    file.write_all(&out)
        .map_err(|e| format!("Failed to write {name}: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_16k_rom() {
        let mut memory = Memory::new();
        memory.write(0, 0xc000, 0x78); // SEI

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.nes");
        let mut config = OutputConfig {
            file: path.to_string_lossy().into_owned(),
            ..OutputConfig::new()
        };
        config.nes.reset_vector = 0xc000;

        let banks = [BankRegion { number: 0, min: 0xc000, max: 0xc000 }];
        write(&config, &memory, &banks).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"NES\x1a");
        assert_eq!(bytes[4], 1); // one 16K unit
        assert_eq!(bytes.len(), 16 + 0x4000);
        // Reset vector poked at the top of the segment.
        assert_eq!(&bytes[16 + 0x3ffc - 0x0000..16 + 0x3ffe], &[0x00, 0xc0]);
        assert_eq!(bytes[16], 0x78);
    }

    #[test]
    fn test_chr_banks_follow_prg() {
        let mut memory = Memory::new();
        memory.write(0, 0x8000, 0xa9); // code bank
        memory.write(1, 0x0000, 0x55); // video bank

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.nes");
        let mut config = OutputConfig {
            file: path.to_string_lossy().into_owned(),
            ..OutputConfig::new()
        };
        config.nes.reset_vector = 0x8000;

        let banks = [
            BankRegion { number: 0, min: 0x8000, max: 0x8000 },
            BankRegion { number: 1, min: 0x0000, max: 0x0000 },
        ];
        write(&config, &memory, &banks).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes[4], 2); // 32K program = two 16K units
        assert_eq!(bytes[5], 1); // one 8K character bank
        assert_eq!(bytes.len(), 16 + 0x8000 + 0x2000);
        assert_eq!(bytes[16], 0xa9);
        assert_eq!(bytes[16 + 0x8000], 0x55);
    }

    #[test]
    fn test_mid_memory_bank_rejected() {
        let mut memory = Memory::new();
        memory.write(0, 0x4000, 1);
        let config = OutputConfig::new();
        let banks = [BankRegion { number: 0, min: 0x4000, max: 0x4000 }];
        assert!(write(&config, &memory, &banks).is_err());
    }
}
