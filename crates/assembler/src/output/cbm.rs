//! Commodore outputs: PRG, raw TAP and T64.
//!
//! All three prepend a one-line BASIC stub (`10 SYS <start>`) at the
//! machine's BASIC start so the program loads and runs with `RUN`. The
//! stub address depends on the configured system (C64, VIC-20, or
//! VIC-20 with the 8K expansion); the `SYS` target defaults to the
//! bank's lowest written address.

use std::io::Write;

use rasm_core::{Codepage, ExprCtx, Memory, Token};

use crate::cmd::{CmdResult, CmdStatus, OptionEntry, argc_check};

use super::{BankRegion, OutputConfig, create, eval_arg};

pub const OPT_START_ADDR: u32 = 0;
pub const OPT_SYSTEM: u32 = 1;

pub static OPTIONS: &[OptionEntry] = &[
    OptionEntry { name: "cbm-start", tag: OPT_START_ADDR },
    OptionEntry { name: "cbm-system", tag: OPT_SYSTEM },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CbmSystem {
    #[default]
    C64,
    Vic20,
    Vic20Plus8K,
}

impl CbmSystem {
    /// (BASIC start pointer, first free byte after the link word and
    /// line number).
    fn layout(self) -> (u32, u32) {
        match self {
            CbmSystem::C64 => (0x801, 0x803),
            CbmSystem::Vic20 => (0x1001, 0x1003),
            CbmSystem::Vic20Plus8K => (0x1201, 0x1203),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CbmOptions {
    pub start_addr: i64,
    pub system: CbmSystem,
}

impl Default for CbmOptions {
    fn default() -> CbmOptions {
        CbmOptions { start_addr: -1, system: CbmSystem::C64 }
    }
}

impl CbmOptions {
    pub fn set_option(&mut self, tag: u32, args: &[Token], ctx: &ExprCtx) -> CmdResult {
        argc_check(args, 1)?;

        match tag {
            OPT_START_ADDR => self.start_addr = eval_arg(ctx, &args[0])?,
            OPT_SYSTEM => {
                self.system = match args[0].text.to_ascii_lowercase().as_str() {
                    "c64" => CbmSystem::C64,
                    "vic20" => CbmSystem::Vic20,
                    "vic20+8k" => CbmSystem::Vic20Plus8K,
                    other => return Err(format!("unknown value: \"{other}\"")),
                }
            }
            _ => {}
        }

        Ok(CmdStatus::Ok)
    }
}

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

    fn poke_petscii(&mut self, mut addr: u32, text: &str) -> u32 {
        for c in text.chars() {
            addr = self.poke_b(addr, Codepage::Cbm.convert(c));
        }
        addr
    }
}

/// Build the full 64K image for a bank with the BASIC stub poked in.
/// Returns the image together with the region to emit.
fn with_basic_stub(
    options: &CbmOptions,
    memory: &Memory,
    bank: &BankRegion,
) -> Result<(Image, u32, u32), String> {
    let (basic_start, line_addr) = options.system.layout();

    if bank.min < line_addr + 0x10 {
        return Err("Bank starts below a safe area to add BASIC loader".to_string());
    }

    let mut image = Image { bytes: memory.get_block(bank.number, 0, 0x10000) };

    let sys_target = if options.start_addr == -1 {
        i64::from(bank.min)
    } else {
        options.start_addr
    };

    // 10 SYS <target>
    let mut addr = image.poke_w(line_addr, 10);
    addr = image.poke_b(addr, 0x9e);
    addr = image.poke_petscii(addr, &sys_target.to_string());
    addr = image.poke_b(addr, 0x00);

    // Link word of the next (terminating) line, then the terminator.
    let next = addr;
    image.poke_w(addr, 0x0000);
    image.poke_w(basic_start, next as u16);

    Ok((image, basic_start, bank.max))
}

pub fn write_prg(config: &OutputConfig, memory: &Memory, banks: &[BankRegion]) -> Result<(), String> {
    for bank in banks {
        let name = config.bank_name(bank.number, banks.len());
        let mut file = create(&name)?;

        let (image, min, max) = with_basic_stub(&config.cbm, memory, bank)?;

        let mut out = vec![min as u8, (min >> 8) as u8];
        out.extend_from_slice(&image.bytes[min as usize..=max as usize]);

        file.write_all(&out)
            .map_err(|e| format!("Failed to write {name}: {e}"))?;
    }

    Ok(())
}

pub fn write_tap(config: &OutputConfig, memory: &Memory, banks: &[BankRegion]) -> Result<(), String> {
    for bank in banks {
        let name = config.bank_name(bank.number, banks.len());
        let mut file = create(&name)?;

        let (image, min, max) = with_basic_stub(&config.cbm, memory, bank)?;
        let len = max - min + 1;

        let mut out = Vec::new();
        out.extend_from_slice(b"C64-TAPE-RAW");
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&image.bytes[min as usize..=max as usize]);

        file.write_all(&out)
            .map_err(|e| format!("Failed to write {name}: {e}"))?;
    }

    Ok(())
}

fn pad_name(out: &mut Vec<u8>, text: &str, len: usize, fill: char, codepage: Codepage) {
    let mut chars = text.chars();
    for _ in 0..len {
        let c = chars.next().unwrap_or(fill);
        out.push(codepage.convert(c));
    }
}

pub fn write_t64(config: &OutputConfig, memory: &Memory, banks: &[BankRegion]) -> Result<(), String> {
    let name = &config.file;
    let mut file = create(name)?;
    let mut out = Vec::new();

    // Signature and directory header.
    pad_name(&mut out, "C64 tape image file", 32, '\0', Codepage::Ascii);
    out.extend_from_slice(&0x1010u16.to_le_bytes());
    out.extend_from_slice(&(banks.len() as u16).to_le_bytes());
    out.extend_from_slice(&(banks.len() as u16).to_le_bytes());
    out.extend_from_slice(&[0, 0]);
    pad_name(&mut out, name, 24, ' ', Codepage::Cbm);

    // Directory entries, 32 bytes each.
    let mut offset = (64 + 32 * banks.len()) as u32;
    for bank in banks {
        out.push(1);
        out.push(0x82);
        out.extend_from_slice(&(bank.min as u16).to_le_bytes());
        out.extend_from_slice(&(bank.max as u16).to_le_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&[0, 0, 0, 0]);
        pad_name(
            &mut out,
            &config.bank_name(bank.number, banks.len()),
            16,
            ' ',
            Codepage::Cbm,
        );
        offset += bank.len();
    }

    for bank in banks {
        out.extend_from_slice(&memory.get_block(bank.number, bank.min, bank.len()));
    }

    file.write_all(&out)
        .map_err(|e| format!("Failed to write {name}: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_with_code() -> Memory {
        let mut memory = Memory::new();
        memory.set_pc(0x900);
        memory.pc_write(0xa9); // LDA #1
        memory.pc_write(0x01);
        memory.pc_write(0x60); // RTS
        memory
    }

    #[test]
    fn test_prg_has_load_address_and_stub() {
        let memory = memory_with_code();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.prg");
        let config = OutputConfig {
            file: path.to_string_lossy().into_owned(),
            ..OutputConfig::new()
        };

        let banks = [BankRegion { number: 0, min: 0x900, max: 0x902 }];
        write_prg(&config, &memory, &banks).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // Load address = C64 BASIC start.
        assert_eq!(&bytes[0..2], &[0x01, 0x08]);
        // Line number 10, then the SYS token.
        assert_eq!(&bytes[4..6], &[10, 0]);
        assert_eq!(bytes[6], 0x9e);
        // "2304" in PETSCII digits (same as ASCII for digits).
        assert_eq!(&bytes[7..11], b"2304");
        // The code survives at its place.
        assert_eq!(bytes[bytes.len() - 3..], [0xa9, 0x01, 0x60]);
    }

    #[test]
    fn test_code_below_stub_rejected() {
        let mut memory = Memory::new();
        memory.write(0, 0x400, 1);
        let config = OutputConfig::new();
        let banks = [BankRegion { number: 0, min: 0x400, max: 0x400 }];
        assert!(write_prg(&config, &memory, &banks).is_err());
    }

    #[test]
    fn test_t64_signature() {
        let memory = memory_with_code();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.t64");
        let config = OutputConfig {
            file: path.to_string_lossy().into_owned(),
            ..OutputConfig::new()
        };

        let banks = [BankRegion { number: 0, min: 0x900, max: 0x902 }];
        write_t64(&config, &memory, &banks).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"C64 tape image file"));
        // One 32-byte directory entry after the 64-byte header, then
        // the data.
        assert_eq!(bytes.len(), 64 + 32 + 3);
        assert_eq!(&bytes[96..], &[0xa9, 0x01, 0x60]);
    }
}
