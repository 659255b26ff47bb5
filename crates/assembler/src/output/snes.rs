//! SNES ROM output.
//!
//! The header lives in bank 0 at 0xFFC0: title, map mode, ROM/RAM size
//! codes, the reset and interrupt vectors, and the checksum with its
//! complement. LoROM images emit 32K per bank from 0x8000; HiROM images
//! emit the full 64K per bank.

use std::io::Write;

use rasm_core::{Codepage, ExprCtx, Memory, Token};

use crate::cmd::{CmdResult, CmdStatus, OptionEntry, argc_check};

use super::{BankRegion, OutputConfig, create, eval_arg};

pub const OPT_ROM_TYPE: u32 = 0;
pub const OPT_IRQ: u32 = 1;
pub const OPT_NAME: u32 = 2;
pub const OPT_START: u32 = 3;
pub const OPT_RAM_SIZE: u32 = 4;
pub const OPT_ROM_SIZE: u32 = 5;

pub static OPTIONS: &[OptionEntry] = &[
    OptionEntry { name: "snes-rom-type", tag: OPT_ROM_TYPE },
    OptionEntry { name: "snes-irq", tag: OPT_IRQ },
    OptionEntry { name: "snes-name", tag: OPT_NAME },
    OptionEntry { name: "snes-start", tag: OPT_START },
    OptionEntry { name: "snes-ram-size", tag: OPT_RAM_SIZE },
    OptionEntry { name: "snes-rom-size", tag: OPT_ROM_SIZE },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RomType {
    #[default]
    LoRom,
    HiRom,
    LoRomFast,
    HiRomFast,
}

impl RomType {
    fn code(self) -> u8 {
        match self {
            RomType::LoRom => 0x00,
            RomType::HiRom => 0x01,
            RomType::LoRomFast => 0x30,
            RomType::HiRomFast => 0x31,
        }
    }

    fn is_lorom(self) -> bool {
        matches!(self, RomType::LoRom | RomType::LoRomFast)
    }
}

#[derive(Debug, Clone)]
pub struct SnesOptions {
    pub rom_type: RomType,
    pub vblank_vector: i64,
    pub irq_vector: i64,
    pub name: String,
    pub start: i64,
    pub ram_size: i64,
    pub rom_size: i64,
}

impl Default for SnesOptions {
    fn default() -> SnesOptions {
        SnesOptions {
            rom_type: RomType::LoRom,
            vblank_vector: -1,
            irq_vector: -1,
            name: "NONAME".to_string(),
            start: 0x8000,
            ram_size: 0,
            rom_size: -1,
        }
    }
}

impl SnesOptions {
    pub fn set_option(&mut self, tag: u32, args: &[Token], ctx: &ExprCtx) -> CmdResult {
        argc_check(args, 1)?;

        match tag {
            OPT_ROM_TYPE => {
                self.rom_type = match args[0].text.to_ascii_lowercase().as_str() {
                    "lorom" => RomType::LoRom,
                    "hirom" => RomType::HiRom,
                    "lorom-fast" => RomType::LoRomFast,
                    "hirom-fast" => RomType::HiRomFast,
                    other => return Err(format!("unknown value: \"{other}\"")),
                }
            }
            OPT_IRQ => {
                argc_check(args, 2)?;
                let value = eval_arg(ctx, &args[1])?;
                match args[0].text.to_ascii_lowercase().as_str() {
                    "vbl" => self.vblank_vector = value,
                    "irq" => self.irq_vector = value,
                    other => return Err(format!("unknown value: \"{other}\"")),
                }
            }
            OPT_NAME => self.name = args[0].text.clone(),
            OPT_START => self.start = eval_arg(ctx, &args[0])?,
            OPT_RAM_SIZE => self.ram_size = eval_arg(ctx, &args[0])?,
            OPT_ROM_SIZE => self.rom_size = eval_arg(ctx, &args[0])?,
            _ => {}
        }

        Ok(CmdStatus::Ok)
    }
}

fn poke_w(image: &mut [u8], addr: usize, w: u16) {
    image[addr] = w as u8;
    image[addr + 1] = (w >> 8) as u8;
}

pub fn write(config: &OutputConfig, memory: &Memory, banks: &[BankRegion]) -> Result<(), String> {
    let opts = &config.snes;
    let lorom = opts.rom_type.is_lorom();

    if lorom {
        for bank in banks {
            if bank.min < 0x8000 {
                return Err(format!("Bank {} uses memory below 0x8000", bank.number));
            }
        }
    }

    let (base, len) = if lorom { (0x8000u32, 0x8000u32) } else { (0, 0x10000) };

    // Header goes into bank 0's image.
    let mut image = memory.get_block(banks[0].number, 0, 0x10000);

    for (i, c) in opts.name.chars().chain(std::iter::repeat(' ')).take(21).enumerate() {
        image[0xffc0 + i] = Codepage::Ascii.convert(c);
    }

    image[0xffd5] = opts.rom_type.code();
    poke_w(&mut image, 0xfffc, opts.start as u16);

    if opts.vblank_vector != -1 {
        poke_w(&mut image, 0xffea, opts.vblank_vector as u16);
        poke_w(&mut image, 0xfffa, opts.vblank_vector as u16);
    } else {
        tracing::warn!("VBLANK IRQ not set");
    }

    if opts.irq_vector != -1 {
        poke_w(&mut image, 0xffee, opts.irq_vector as u16);
        poke_w(&mut image, 0xfffe, opts.irq_vector as u16);
    }

    image[0xffd7] = if opts.rom_size == -1 {
        (banks.len() * if lorom { 32 } else { 64 }) as u8
    } else {
        opts.rom_size as u8
    };
    image[0xffd8] = opts.ram_size as u8;

    // Checksum: computed with the complement field pre-set to 0xffff,
    // then both fields patched in.
    poke_w(&mut image, 0xffdc, 0xffff);

    let mut csum: u32 = image[base as usize..(base + len) as usize]
        .iter()
        .map(|&b| u32::from(b))
        .sum();
    for bank in &banks[1..] {
        csum += memory
            .get_block(bank.number, base, len)
            .iter()
            .map(|&b| u32::from(b))
            .sum::<u32>();
    }
    let csum = (csum & 0xffff) as u16;

    poke_w(&mut image, 0xffde, csum);
    poke_w(&mut image, 0xffdc, csum ^ 0xffff);

    let name = &config.file;
    let mut file = create(name)?;

    file.write_all(&image[base as usize..(base + len) as usize])
        .map_err(|e| format!("Failed to write {name}: {e}"))?;
    for bank in &banks[1..] {
        file.write_all(&memory.get_block(bank.number, base, len))
            .map_err(|e| format!("Failed to write {name}: {e}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lorom_header() {
        let mut memory = Memory::new();
        memory.write(0, 0x8000, 0xea);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.sfc");
        let mut config = OutputConfig {
            file: path.to_string_lossy().into_owned(),
            ..OutputConfig::new()
        };
        config.snes.name = "TEST".to_string();
        config.snes.vblank_vector = 0x8100;

        let banks = [BankRegion { number: 0, min: 0x8000, max: 0x8000 }];
        write(&config, &memory, &banks).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 0x8000);

        // The header is file offset 0x7fc0 in a 32K LoROM image.
        assert_eq!(&bytes[0x7fc0..0x7fc4], b"TEST");
        assert_eq!(bytes[0x7fd5], 0x00);
        // Reset vector.
        assert_eq!(&bytes[0x7ffc..0x7ffe], &[0x00, 0x80]);
        // Checksum and complement XOR to 0xffff.
        let csum = u16::from_le_bytes([bytes[0x7fde], bytes[0x7fdf]]);
        let inv = u16::from_le_bytes([bytes[0x7fdc], bytes[0x7fdd]]);
        assert_eq!(csum ^ inv, 0xffff);
    }

    #[test]
    fn test_lorom_low_memory_rejected() {
        let mut memory = Memory::new();
        memory.write(0, 0x100, 1);
        let config = OutputConfig::new();
        let banks = [BankRegion { number: 0, min: 0x100, max: 0x100 }];
        assert!(write(&config, &memory, &banks).is_err());
    }

    #[test]
    fn test_checksum_includes_complement_preset() {
        // The sum is taken with the complement field holding 0xffff,
        // so re-summing the emitted file with both fields zeroed and
        // 0xffff re-added must reproduce the stored checksum.
        let mut memory = Memory::new();
        memory.write(0, 0x9000, 0x42);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.sfc");
        let config = OutputConfig {
            file: path.to_string_lossy().into_owned(),
            ..OutputConfig::new()
        };

        let banks = [BankRegion { number: 0, min: 0x9000, max: 0x9000 }];
        write(&config, &memory, &banks).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let stored = u16::from_le_bytes([bytes[0x7fde], bytes[0x7fdf]]);

        let mut sum: u32 = bytes.iter().map(|&b| u32::from(b)).sum();
        // Remove the stored checksum and complement, restore the
        // preset values used while summing.
        for i in 0x7fdc..0x7fe0 {
            sum -= u32::from(bytes[i]);
        }
        sum += 0xff + 0xff;
        assert_eq!((sum & 0xffff) as u16, stored);
    }
}
