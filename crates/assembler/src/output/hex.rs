//! Intel HEX output.
//!
//! One `:10aaaa00…` record per populated 16-byte row. A row consisting
//! entirely of the configured null byte is skipped, so sparse images
//! stay small; `OPTION hex-null` changes what counts as empty. The
//! record checksum covers the length, address, type and data bytes per
//! the format definition.

use std::io::Write;

use rasm_core::{ExprCtx, Memory, Token};

use crate::cmd::{CmdResult, CmdStatus, OptionEntry, argc_check};

use super::{BankRegion, OutputConfig, create, eval_arg};

pub const OPT_NULL_BYTE: u32 = 0;

pub static OPTIONS: &[OptionEntry] =
    &[OptionEntry { name: "hex-null", tag: OPT_NULL_BYTE }];

#[derive(Debug, Clone, Copy, Default)]
pub struct HexOptions {
    pub null_byte: u8,
}

impl HexOptions {
    pub fn set_option(&mut self, tag: u32, args: &[Token], ctx: &ExprCtx) -> CmdResult {
        argc_check(args, 1)?;

        if tag == OPT_NULL_BYTE {
            self.null_byte = eval_arg(ctx, &args[0])? as u8;
        }

        Ok(CmdStatus::Ok)
    }
}

pub fn write(config: &OutputConfig, memory: &Memory, banks: &[BankRegion]) -> Result<(), String> {
    for bank in banks {
        let name = config.bank_name(bank.number, banks.len());
        let mut file = create(&name)?;
        let mut text = String::new();

        for row in (0..0x10000u32).step_by(16) {
            let bytes: Vec<u8> = (0..16).map(|n| memory.read(bank.number, row + n)).collect();

            if bytes.iter().all(|&b| b == config.hex.null_byte) {
                continue;
            }

            let mut csum = 0x10u8
                .wrapping_add((row >> 8) as u8)
                .wrapping_add(row as u8);

            text.push_str(&format!(":10{row:04X}00"));
            for b in &bytes {
                text.push_str(&format!("{b:02X}"));
                csum = csum.wrapping_add(*b);
            }
            text.push_str(&format!("{:02X}\n", csum.wrapping_neg()));
        }

        text.push_str(":00000001FF\n");

        file.write_all(text.as_bytes())
            .map_err(|e| format!("Failed to write {name}: {e}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_checksum() {
        // :10 0100 00 followed by sixteen 0x01 bytes: checksum is the
        // two's complement of 0x10 + 0x01 + 0x00 + 0x00 + 16*0x01.
        let mut memory = Memory::new();
        for i in 0..16 {
            memory.write(0, 0x100 + i, 1);
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rom.hex");
        let config = OutputConfig {
            file: path.to_string_lossy().into_owned(),
            ..OutputConfig::new()
        };

        let banks = [BankRegion { number: 0, min: 0x100, max: 0x10f }];
        write(&config, &memory, &banks).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            ":1001000001010101010101010101010101010101DF"
        );
        assert_eq!(lines.next().unwrap(), ":00000001FF");
    }

    #[test]
    fn test_null_rows_skipped() {
        let mut memory = Memory::new();
        memory.write(0, 0x0, 0xaa);
        memory.write(0, 0x200, 0xbb);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rom.hex");
        let config = OutputConfig {
            file: path.to_string_lossy().into_owned(),
            ..OutputConfig::new()
        };

        let banks = [BankRegion { number: 0, min: 0, max: 0x200 }];
        write(&config, &memory, &banks).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        // Two data rows plus the terminator.
        assert_eq!(text.lines().count(), 3);
    }
}
