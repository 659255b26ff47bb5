//! Gameboy ROM output.
//!
//! Writes a cartridge image with the pieces the boot ROM insists on:
//! the Nintendo logo at 0x104, the entry point jumping to the first
//! written address, RST and interrupt vectors, the header fields and
//! both checksums. A single bank makes a plain 32K ROM; multiple banks
//! make an MBC image with bank 0 fixed and the rest switched in at
//! 0x4000.

use std::io::Write;

use rasm_core::{Codepage, ExprCtx, Memory, Token};

use crate::cmd::{CmdResult, CmdStatus, OptionEntry, argc_check, true_false};

use super::{BankRegion, OutputConfig, create, eval_arg};

pub const OPT_COLOUR: u32 = 0;
pub const OPT_SUPER: u32 = 1;
pub const OPT_CART_RAM: u32 = 2;
pub const OPT_CART_TYPE: u32 = 3;
pub const OPT_IRQ: u32 = 4;

pub static OPTIONS: &[OptionEntry] = &[
    OptionEntry { name: "gameboy-colour", tag: OPT_COLOUR },
    OptionEntry { name: "gameboy-color", tag: OPT_COLOUR },
    OptionEntry { name: "gameboy-super", tag: OPT_SUPER },
    OptionEntry { name: "gameboy-cart-ram", tag: OPT_CART_RAM },
    OptionEntry { name: "gameboy-cart-type", tag: OPT_CART_TYPE },
    OptionEntry { name: "gameboy-irq", tag: OPT_IRQ },
];

static IRQ_NAMES: &[(&str, usize)] = &[
    ("vbl", 0),
    ("lcd", 1),
    ("timer", 2),
    ("serial", 3),
    ("joypad", 4),
];

static NINTENDO_LOGO: &[u8] = &[
    0xce, 0xed, 0x66, 0x66, 0xcc, 0x0d, 0x00, 0x0b, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0c,
    0x00, 0x0d, 0x00, 0x08, 0x11, 0x1f, 0x88, 0x89, 0x00, 0x0e, 0xdc, 0xcc, 0x6e, 0xe6,
    0xdd, 0xdd, 0xd9, 0x99, 0xbb, 0xbb, 0x67, 0x63, 0x6e, 0x0e, 0xec, 0xcc, 0xdd, 0xdc,
    0x99, 0x9f, 0xbb, 0xb9, 0x33, 0x3e,
];

#[derive(Debug, Clone, Copy)]
pub struct GameboyOptions {
    pub colour: bool,
    pub super_gb: bool,
    pub cart_ram: i64,
    pub cart_type: i64,
    pub irq_vectors: [i64; 5],
}

impl Default for GameboyOptions {
    fn default() -> GameboyOptions {
        GameboyOptions {
            colour: false,
            super_gb: false,
            cart_ram: -1,
            cart_type: -1,
            irq_vectors: [-1; 5],
        }
    }
}

impl GameboyOptions {
    pub fn set_option(&mut self, tag: u32, args: &[Token], ctx: &ExprCtx) -> CmdResult {
        argc_check(args, 1)?;

        match tag {
            OPT_COLOUR => self.colour = true_false(&args[0].text, true),
            OPT_SUPER => self.super_gb = true_false(&args[0].text, true),
            OPT_CART_RAM => self.cart_ram = eval_arg(ctx, &args[0])?,
            OPT_CART_TYPE => self.cart_type = eval_arg(ctx, &args[0])?,
            OPT_IRQ => {
                argc_check(args, 2)?;
                let irq = IRQ_NAMES
                    .iter()
                    .find(|(n, _)| n.eq_ignore_ascii_case(&args[0].text))
                    .map(|&(_, i)| i)
                    .ok_or_else(|| format!("unknown value: \"{}\"", args[0].text))?;
                self.irq_vectors[irq] = eval_arg(ctx, &args[1])?;
            }
            _ => {}
        }

        Ok(CmdStatus::Ok)
    }
}

fn ram_size_code(cart_ram: i64) -> u8 {
    match cart_ram {
        2 => 1,
        8 => 2,
        32 => 3,
        128 => 4,
        64 => 5,
        _ => 0,
    }
}

pub fn write(config: &OutputConfig, memory: &Memory, banks: &[BankRegion]) -> Result<(), String> {
    let opts = config.gameboy;

    // Bank layout checks: everything must fit in cartridge ROM space,
    // and switched banks sit in the 0x4000 window.
    if banks.len() == 1 && (banks[0].min < 0x150 || banks[0].max > 0x7fff) {
        return Err("A simple ROM must be in the address space 0x150 to 0x7fff".to_string());
    }
    if banks.len() > 1 && (banks[0].min < 0x150 || banks[0].max > 0x3fff) {
        return Err(
            "Bank zero of a banked ROM must be in the address space 0x150 to 0x3fff".to_string()
        );
    }
    for bank in &banks[1..] {
        if bank.min < 0x4000 || bank.max > 0x7fff {
            return Err(format!(
                "Bank {} must be in the address space 0x4000 to 0x7fff",
                bank.number
            ));
        }
    }

    let cart_type = if opts.cart_type != -1 {
        opts.cart_type
    } else if opts.cart_ram != -1 {
        3
    } else if banks.len() == 1 {
        0
    } else {
        1
    };

    let rom_size = if banks.len() == 1 { 0 } else { (banks.len() / 4) + 1 };

    let mut image = memory.get_block(banks[0].number, 0, 0x10000);

    for (i, &b) in NINTENDO_LOGO.iter().enumerate() {
        image[0x104 + i] = b;
    }

    // RST vectors all bounce to the entry point.
    for rst in 0..8 {
        let addr = rst * 8;
        image[addr] = 0xc3;
        image[addr + 1] = 0x00;
        image[addr + 2] = 0x01;
    }

    // Interrupt vectors: RETI unless a handler was configured.
    for (i, &vector) in opts.irq_vectors.iter().enumerate() {
        let addr = 0x40 + i * 8;
        if vector == -1 {
            image[addr] = 0xd9;
        } else {
            image[addr] = 0xc3;
            image[addr + 1] = vector as u8;
            image[addr + 2] = (vector >> 8) as u8;
        }
    }

    // Entry point: NOP, JP <first written address>.
    image[0x100] = 0;
    image[0x101] = 0xc3;
    image[0x102] = banks[0].min as u8;
    image[0x103] = (banks[0].min >> 8) as u8;

    // Title, truncated to the modern 11 characters.
    for (i, c) in config.file.chars().take(11).enumerate() {
        image[0x134 + i] = Codepage::Ascii.convert(c);
    }

    if opts.colour {
        image[0x143] = 0xc0;
    }
    image[0x146] = if opts.super_gb { 3 } else { 0 };
    image[0x147] = cart_type as u8;
    image[0x148] = rom_size as u8;
    image[0x149] = ram_size_code(opts.cart_ram);
    image[0x14a] = 1; // non-Japanese
    image[0x14b] = if opts.super_gb { 0x33 } else { 0 };

    // Header checksum over 0x134..0x14d.
    let mut hdr_csum = 0u8;
    for &b in &image[0x134..0x14d] {
        hdr_csum = hdr_csum.wrapping_sub(b).wrapping_sub(1);
    }
    image[0x14d] = hdr_csum;

    // Global checksum: every ROM byte except the checksum field
    // itself.
    let fixed_end = if banks.len() == 1 { 0x8000 } else { 0x4000 };
    let mut global: u16 = 0;
    for &b in image[..0x14e].iter().chain(&image[0x150..fixed_end]) {
        global = global.wrapping_add(u16::from(b));
    }
    for bank in &banks[1..] {
        for b in memory.get_block(bank.number, 0x4000, 0x4000) {
            global = global.wrapping_add(u16::from(b));
        }
    }
    image[0x14e] = (global >> 8) as u8;
    image[0x14f] = global as u8;

    let name = &config.file;
    let mut file = create(name)?;

    file.write_all(&image[..fixed_end])
        .map_err(|e| format!("Failed to write {name}: {e}"))?;
    for bank in &banks[1..] {
        file.write_all(&memory.get_block(bank.number, 0x4000, 0x4000))
            .map_err(|e| format!("Failed to write {name}: {e}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_rom() {
        let mut memory = Memory::new();
        memory.write(0, 0x150, 0x00);
        memory.write(0, 0x151, 0xc3);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.gb");
        let config = OutputConfig {
            file: path.to_string_lossy().into_owned(),
            ..OutputConfig::new()
        };

        let banks = [BankRegion { number: 0, min: 0x150, max: 0x151 }];
        write(&config, &memory, &banks).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 0x8000);
        // Logo present.
        assert_eq!(&bytes[0x104..0x104 + 4], &[0xce, 0xed, 0x66, 0x66]);
        // Entry point jumps to the first written address.
        assert_eq!(&bytes[0x100..0x104], &[0x00, 0xc3, 0x50, 0x01]);
        // Header checksum verifies the way the boot ROM does it.
        let mut x = 0u8;
        for &b in &bytes[0x134..0x14d] {
            x = x.wrapping_sub(b).wrapping_sub(1);
        }
        assert_eq!(bytes[0x14d], x);
    }

    #[test]
    fn test_bad_layout_rejected() {
        let mut memory = Memory::new();
        memory.write(0, 0x100, 1);
        let config = OutputConfig::new();
        let banks = [BankRegion { number: 0, min: 0x100, max: 0x100 }];
        assert!(write(&config, &memory, &banks).is_err());
    }
}
