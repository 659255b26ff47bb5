//! Spectrum TAP output.
//!
//! Each bank becomes a CODE header block and a data block with the
//! standard XOR checksums. `OPTION spectrum-loader` prepends a BASIC
//! program (`CLEAR` / `LOAD "" CODE` per bank / `RANDOMIZE USR`) so the
//! tape loads and runs by itself; `spectrum-start` overrides the entry
//! address, which otherwise defaults to the first bank's load address.

use std::io::Write;

use rasm_core::{ExprCtx, Memory, Token};

use crate::cmd::{CmdResult, CmdStatus, OptionEntry, argc_check, true_false};

use super::{BankRegion, OutputConfig, create, eval_arg};

pub const OPT_LOADER: u32 = 0;
pub const OPT_START_ADDR: u32 = 1;

pub static OPTIONS: &[OptionEntry] = &[
    OptionEntry { name: "spectrum-loader", tag: OPT_LOADER },
    OptionEntry { name: "spectrum-start", tag: OPT_START_ADDR },
];

#[derive(Debug, Clone, Copy)]
pub struct SpecTapOptions {
    pub loader: bool,
    pub start_addr: i64,
}

impl Default for SpecTapOptions {
    fn default() -> SpecTapOptions {
        SpecTapOptions { loader: false, start_addr: -1 }
    }
}

impl SpecTapOptions {
    pub fn set_option(&mut self, tag: u32, args: &[Token], ctx: &ExprCtx) -> CmdResult {
        argc_check(args, 1)?;

        match tag {
            OPT_LOADER => self.loader = true_false(&args[0].text, false),
            OPT_START_ADDR => self.start_addr = eval_arg(ctx, &args[0])?,
            _ => {}
        }

        Ok(CmdStatus::Ok)
    }
}

// Spectrum BASIC tokens used by the generated loader.
const TOK_VAL: u8 = 176;
const TOK_QUOTE: u8 = 34;
const TOK_CODE: u8 = 175;
const TOK_USR: u8 = 192;
const TOK_LOAD: u8 = 239;
const TOK_RAND: u8 = 249;
const TOK_CLEAR: u8 = 253;

/// Accumulates TAP bytes, tracking the running XOR checksum.
struct TapBlock {
    bytes: Vec<u8>,
    check: u8,
}

impl TapBlock {
    fn new() -> TapBlock {
        TapBlock { bytes: Vec::new(), check: 0 }
    }

    fn byte(&mut self, b: u8) {
        self.check ^= b;
        self.bytes.push(b);
    }

    fn word(&mut self, w: u16) {
        self.byte(w as u8);
        self.byte((w >> 8) as u8);
    }

    /// A fixed-width name, space padded.
    fn name(&mut self, text: &str, len: usize) {
        let mut chars = text.bytes();
        for _ in 0..len {
            self.byte(chars.next().unwrap_or(b' '));
        }
    }
}

/// Emit one length-prefixed block, appending the checksum byte.
fn flush_block(out: &mut Vec<u8>, block: TapBlock) {
    let len = (block.bytes.len() + 1) as u16;
    out.push(len as u8);
    out.push((len >> 8) as u8);
    out.extend_from_slice(&block.bytes);
    out.push(block.check);
}

/// One tokenized BASIC line: line number (big endian), length, body,
/// newline.
fn basic_line(out: &mut Vec<u8>, line_no: u16, body: &[u8]) {
    out.push((line_no >> 8) as u8);
    out.push(line_no as u8);
    let len = (body.len() + 1) as u16;
    out.push(len as u8);
    out.push((len >> 8) as u8);
    out.extend_from_slice(body);
    out.push(0x0d);
}

fn quoted_number(body: &mut Vec<u8>, value: i64) {
    body.push(TOK_VAL);
    body.push(TOK_QUOTE);
    body.extend_from_slice(value.to_string().as_bytes());
    body.push(TOK_QUOTE);
}

fn build_loader(start: i64, bank_count: usize) -> Vec<u8> {
    let mut program = Vec::new();
    let mut line_no = 10;

    // CLEAR VAL "start"
    let mut body = vec![TOK_CLEAR];
    quoted_number(&mut body, start);
    basic_line(&mut program, line_no, &body);
    line_no += 10;

    // LOAD "" CODE, once per bank
    for _ in 0..bank_count {
        basic_line(&mut program, line_no, &[TOK_LOAD, TOK_QUOTE, TOK_QUOTE, TOK_CODE]);
        line_no += 10;
    }

    // RANDOMIZE USR VAL "start"
    let mut body = vec![TOK_RAND, TOK_USR];
    quoted_number(&mut body, start);
    basic_line(&mut program, line_no, &body);

    program
}

pub fn write(config: &OutputConfig, memory: &Memory, banks: &[BankRegion]) -> Result<(), String> {
    let name = &config.file;
    let mut file = create(name)?;
    let mut out = Vec::new();

    let opts = &config.spectap;
    let start = if opts.start_addr == -1 { i64::from(banks[0].min) } else { opts.start_addr };

    if opts.loader {
        let program = build_loader(start, banks.len());

        // Program header: flag 0, type 0 (BASIC), name, length,
        // autostart line 10, variable area offset.
        let mut header = TapBlock::new();
        header.byte(0);
        header.byte(0);
        header.name("LOADER.BAS", 10);
        header.word(program.len() as u16);
        header.word(10);
        header.word(program.len() as u16);
        flush_block(&mut out, header);

        let mut data = TapBlock::new();
        data.byte(0xff);
        for &b in &program {
            data.byte(b);
        }
        flush_block(&mut out, data);
    }

    for bank in banks {
        // CODE header: flag 0, type 3, name, length, load address,
        // then the customary 32768.
        let mut header = TapBlock::new();
        header.byte(0);
        header.byte(3);
        header.name(&config.bank_name(bank.number, banks.len()), 10);
        header.word(bank.len() as u16);
        header.word(bank.min as u16);
        header.word(32768);
        flush_block(&mut out, header);

        let mut data = TapBlock::new();
        data.byte(0xff);
        for b in memory.get_block(bank.number, bank.min, bank.len()) {
            data.byte(b);
        }
        flush_block(&mut out, data);
    }

    file.write_all(&out)
        .map_err(|e| format!("Failed to write {name}: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_block_shape() {
        let mut memory = Memory::new();
        memory.write(0, 0x8000, 0xc9);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tap");
        let config = OutputConfig {
            file: path.to_string_lossy().into_owned(),
            ..OutputConfig::new()
        };

        let banks = [BankRegion { number: 0, min: 0x8000, max: 0x8000 }];
        write(&config, &memory, &banks).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // Header block: 19 bytes + checksum, length-prefixed.
        assert_eq!(bytes[0], 19);
        assert_eq!(bytes[1], 0);
        assert_eq!(bytes[2], 0); // flag
        assert_eq!(bytes[3], 3); // CODE type

        // Data block: length = data + flag + checksum = 1 + 2.
        let data_block = &bytes[21..];
        assert_eq!(data_block[0], 3);
        assert_eq!(data_block[1], 0);
        assert_eq!(data_block[2], 0xff);
        assert_eq!(data_block[3], 0xc9);
        assert_eq!(data_block[4], 0xff ^ 0xc9);
    }
}
