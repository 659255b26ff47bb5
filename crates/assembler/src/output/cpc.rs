//! Amstrad CPC tape output.
//!
//! Each bank is split into 2K tape blocks, every block carrying the
//! standard 0x2c header record (filename, block number, first/last
//! flags, type 2 = binary, load address, total length and entry
//! address) followed by a 0x16 data record. The entry address defaults
//! to the first bank's load address.

use std::io::Write;

use rasm_core::{ExprCtx, Memory, Token};

use crate::cmd::{CmdResult, CmdStatus, OptionEntry, argc_check};

use super::{BankRegion, OutputConfig, create, eval_arg};

const BLOCK_SIZE: u32 = 2048;

pub const OPT_START_ADDR: u32 = 0;

pub static OPTIONS: &[OptionEntry] =
    &[OptionEntry { name: "cpc-start", tag: OPT_START_ADDR }];

#[derive(Debug, Clone, Copy)]
pub struct CpcOptions {
    pub start_addr: i64,
}

impl Default for CpcOptions {
    fn default() -> CpcOptions {
        CpcOptions { start_addr: -1 }
    }
}

impl CpcOptions {
    pub fn set_option(&mut self, tag: u32, args: &[Token], ctx: &ExprCtx) -> CmdResult {
        argc_check(args, 1)?;

        if tag == OPT_START_ADDR {
            self.start_addr = eval_arg(ctx, &args[0])?;
        }

        Ok(CmdStatus::Ok)
    }
}

fn push_word(out: &mut Vec<u8>, w: u16) {
    out.push(w as u8);
    out.push((w >> 8) as u8);
}

fn push_name(out: &mut Vec<u8>, text: &str) {
    let mut bytes = text.bytes();
    for _ in 0..16 {
        out.push(bytes.next().unwrap_or(0));
    }
}

pub fn write(config: &OutputConfig, memory: &Memory, banks: &[BankRegion]) -> Result<(), String> {
    let name = &config.file;
    let mut file = create(name)?;
    let mut out = Vec::new();

    let start_addr = if config.cpc.start_addr == -1 {
        i64::from(banks[0].min)
    } else {
        config.cpc.start_addr
    };

    for bank in banks {
        let bytes = memory.get_block(bank.number, bank.min, bank.len());
        let len = bank.len();
        let blocks = len / BLOCK_SIZE;
        let mut addr = bank.min;

        for block in 0..=blocks {
            let first = if block == 0 { 255 } else { 0 };
            let last = if block == blocks { 255 } else { 0 };
            let block_len = if block == blocks { len % BLOCK_SIZE } else { BLOCK_SIZE };

            // Header record.
            push_word(&mut out, 0x1d);
            out.push(0x2c);
            push_name(&mut out, &config.bank_name(bank.number, banks.len()));
            out.push((block + 1) as u8);
            out.push(last);
            out.push(2); // binary
            push_word(&mut out, block_len as u16);
            push_word(&mut out, addr as u16);
            out.push(first);
            push_word(&mut out, len as u16);
            push_word(&mut out, start_addr as u16);

            // Data record.
            push_word(&mut out, (block_len + 3) as u16);
            out.push(0x16);
            let offset = (addr - bank.min) as usize;
            out.extend_from_slice(&bytes[offset..offset + block_len as usize]);

            addr += block_len;
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
    fn test_single_block() {
        let mut memory = Memory::new();
        memory.write(0, 0x4000, 0x3e);
        memory.write(0, 0x4001, 0x01);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.cdt");
        let config = OutputConfig {
            file: path.to_string_lossy().into_owned(),
            ..OutputConfig::new()
        };

        let banks = [BankRegion { number: 0, min: 0x4000, max: 0x4001 }];
        write(&config, &memory, &banks).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // Header record marker.
        assert_eq!(&bytes[0..3], &[0x1d, 0x00, 0x2c]);
        // Block number 1, marked both first and last.
        assert_eq!(bytes[19], 1);
        assert_eq!(bytes[20], 255);
        // Load address.
        assert_eq!(&bytes[24..26], &[0x00, 0x40]);
        // Data record carries the two bytes.
        let tail = &bytes[bytes.len() - 2..];
        assert_eq!(tail, &[0x3e, 0x01]);
    }
}
