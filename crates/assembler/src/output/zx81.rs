//! ZX81 `.P` output.
//!
//! The machine code must assemble at 16514: that is the body of a REM
//! statement on BASIC line 0, the only safely immovable spot in a ZX81
//! program. The writer synthesizes the surrounding program — system
//! variables from 0x4009, the REM line, a second line performing
//! `RAND USR VAL "16514"`, the display file and the variables area —
//! and emits everything from 0x4009 through the end of variables.

use std::io::Write;

use rasm_core::{ExprCtx, Memory, Token};

use crate::cmd::{CmdResult, CmdStatus, OptionEntry, argc_check, true_false};

use super::{BankRegion, OutputConfig, create};

/// Where user code must live: line 0's REM body.
const CODE_START: u32 = 16514;

pub const OPT_MARGIN: u32 = 0;
pub const OPT_AUTORUN: u32 = 1;
pub const OPT_COLLAPSE_DFILE: u32 = 2;

pub static OPTIONS: &[OptionEntry] = &[
    OptionEntry { name: "zx81-margin", tag: OPT_MARGIN },
    OptionEntry { name: "zx81-autorun", tag: OPT_AUTORUN },
    OptionEntry { name: "zx81-collapse-dfile", tag: OPT_COLLAPSE_DFILE },
];

/// MARGIN system variable: scanlines above/below the picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TvFormat {
    #[default]
    Pal,
    Ntsc,
}

impl TvFormat {
    fn margin(self) -> u8 {
        match self {
            TvFormat::Pal => 55,
            TvFormat::Ntsc => 31,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Zx81Options {
    pub tv_format: TvFormat,
    pub autorun: bool,
    pub collapse_dfile: bool,
}

impl Default for Zx81Options {
    fn default() -> Zx81Options {
        Zx81Options { tv_format: TvFormat::Pal, autorun: true, collapse_dfile: false }
    }
}

impl Zx81Options {
    pub fn set_option(&mut self, tag: u32, args: &[Token], _ctx: &ExprCtx) -> CmdResult {
        argc_check(args, 1)?;
        let value = &args[0].text;

        match tag {
            OPT_MARGIN => {
                self.tv_format = match value.to_ascii_lowercase().as_str() {
                    "pal" => TvFormat::Pal,
                    "ntsc" => TvFormat::Ntsc,
                    other => return Err(format!("unknown value: \"{other}\"")),
                }
            }
            OPT_AUTORUN => self.autorun = true_false(value, true),
            OPT_COLLAPSE_DFILE => self.collapse_dfile = true_false(value, true),
            _ => {}
        }

        Ok(CmdStatus::Ok)
    }
}

/// The tokenized launcher: `1 RAND USR VAL "16514"`.
const LAUNCH_LINE: &[u8] = &[
    0, 10, 14, 0, 0xf9, 0xd4, 0x1d, 0x22, 0x21, 0x1d, 0x20, 0x7e, 0x8f, 0x01, 0x04, 0x00,
    0x00, 0x76,
];

struct Image {
    bytes: Vec<u8>,
}

impl Image {
    fn poke_b(&mut self, addr: u32, b: u8) -> u32 {
        self.bytes[addr as usize] = b;
        (addr + 1) % 0x10000
    }

    fn poke_w(&mut self, addr: u32, w: u16) -> u32 {
        let addr = self.poke_b(addr, w as u8);
        self.poke_b(addr, (w >> 8) as u8)
    }
}

pub fn write(config: &OutputConfig, memory: &Memory, banks: &[BankRegion]) -> Result<(), String> {
    let bank = &banks[0];

    if bank.min != CODE_START {
        return Err(format!(
            "Code must start at {CODE_START} to work with the ZX81 output driver."
        ));
    }

    let name = &config.file;
    let mut file = create(name)?;
    let opts = &config.zx81;
    let len = bank.len();

    let mut image = Image { bytes: memory.get_block(bank.number, 0, 0x10000) };

    // Line 0: REM <code>
    let mut addr = 16509;
    addr = image.poke_w(addr, 0x0000);
    addr = image.poke_w(addr, (len + 2) as u16);
    addr = image.poke_b(addr, 0xea);
    addr += len;
    addr = image.poke_b(addr, 0x76);

    // The launcher line follows the REM.
    let next_line = addr;
    for &b in LAUNCH_LINE {
        addr = image.poke_b(addr, b);
    }

    // Display file: 25 newlines, expanded to 24 rows of spaces unless
    // collapsed.
    let dfile = addr;
    if opts.collapse_dfile {
        for _ in 0..25 {
            addr = image.poke_b(addr, 0x76);
        }
    } else {
        addr = image.poke_b(addr, 0x76);
        for _ in 0..24 {
            for _ in 0..32 {
                addr = image.poke_b(addr, 0);
            }
            addr = image.poke_b(addr, 0x76);
        }
    }

    let vars = addr;
    image.poke_b(addr, 0x80);

    // System variables from 0x4009 (VERSN).
    let mut addr = 0x4009;
    addr = image.poke_b(addr, 0); // VERSN
    addr = image.poke_w(addr, 0); // E_PPC
    addr = image.poke_w(addr, dfile as u16); // D_FILE
    addr = image.poke_w(addr, (dfile + 1) as u16); // DF_CC
    addr = image.poke_w(addr, vars as u16); // VARS
    addr = image.poke_w(addr, 0); // DEST
    addr = image.poke_w(addr, (vars + 1) as u16); // E_LINE
    addr = image.poke_w(addr, (vars - 1) as u16); // CH_ADD
    addr = image.poke_w(addr, 0); // X_PTR
    addr = image.poke_w(addr, (vars + 5) as u16); // STKBOT
    addr = image.poke_w(addr, (vars + 5) as u16); // STKEND
    addr = image.poke_b(addr, 0); // BREG
    addr = image.poke_w(addr, 16477); // MEM
    addr = image.poke_b(addr, 0); // unused
    addr = image.poke_b(addr, 2); // DF_SZ
    addr = image.poke_w(addr, 2); // S_TOP
    addr = image.poke_w(addr, 0xffff); // LAST_K
    addr = image.poke_b(addr, 0xff); // LAST_K
    addr = image.poke_b(addr, opts.tv_format.margin()); // MARGIN
    addr = image.poke_w(addr, if opts.autorun { next_line } else { dfile } as u16); // NXTLIN
    addr = image.poke_w(addr, 0); // OLDPPC
    addr = image.poke_b(addr, 0); // FLAGX
    addr = image.poke_w(addr, 0); // STRLEN
    addr = image.poke_w(addr, 0x0c8d); // T_ADDR
    addr = image.poke_w(addr, 0); // SEED
    addr = image.poke_w(addr, 0xffff); // FRAMES
    addr = image.poke_w(addr, 0); // COORDS
    addr = image.poke_b(addr, 0xbc); // PR_CC
    addr = image.poke_b(addr, 33); // S_POSN
    addr = image.poke_b(addr, 24); // S_POSN
    image.poke_w(addr, 0x40); // CDFLAG

    file.write_all(&image.bytes[0x4009..=(vars as usize)])
        .map_err(|e| format!("Failed to write {name}: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_must_sit_in_the_rem() {
        let mut memory = Memory::new();
        memory.write(0, 0x5000, 1);
        let config = OutputConfig::new();
        let banks = [BankRegion { number: 0, min: 0x5000, max: 0x5000 }];
        assert!(write(&config, &memory, &banks).is_err());
    }

    #[test]
    fn test_p_file_layout() {
        let mut memory = Memory::new();
        memory.write(0, CODE_START, 0xc9);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.p");
        let config = OutputConfig {
            file: path.to_string_lossy().into_owned(),
            ..OutputConfig::new()
        };

        let banks = [BankRegion { number: 0, min: CODE_START, max: CODE_START }];
        write(&config, &memory, &banks).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // File image starts at 0x4009; line 0 begins at 16509.
        let line0 = 16509 - 0x4009;
        assert_eq!(&bytes[line0..line0 + 2], &[0, 0]);
        // Line length = code + REM token + newline.
        assert_eq!(&bytes[line0 + 2..line0 + 4], &[3, 0]);
        assert_eq!(bytes[line0 + 4], 0xea);
        assert_eq!(bytes[(CODE_START - 0x4009) as usize], 0xc9);
    }
}
