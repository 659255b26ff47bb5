//! Library blob output and loading.
//!
//! A self-describing container for partially assembled code: magic,
//! bank count, then per bank its number, load address and length as
//! 8-digit hex followed by the raw bytes, and finally the exported
//! label blob. `IMPORT` reads one back, optionally relocating both the
//! bytes and the label values by a fixed offset.

use std::io::Write;

use rasm_core::{LabelStore, Memory};

use super::{BankRegion, OutputConfig, create};

const MAGIC: &[u8] = b"CASMLIBv2%";

fn push_hex8(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(format!("{value:08x}").as_bytes());
}

fn read_hex8(data: &[u8], pos: &mut usize) -> Result<u32, String> {
    let end = *pos + 8;
    let bytes = data.get(*pos..end).ok_or("truncated library")?;
    *pos = end;

    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or_else(|| "bad number in library".to_string())
}

fn read_number(data: &[u8], pos: &mut usize) -> Result<i64, String> {
    let end = *pos + 11;
    let bytes = data.get(*pos..end).ok_or("truncated library")?;
    *pos = end;

    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| "bad number in library".to_string())
}

/// Serialize banks and labels into the library byte image.
pub fn build(memory: &Memory, labels: &LabelStore, banks: &[BankRegion]) -> Vec<u8> {
    let mut out = Vec::new();

    out.extend_from_slice(MAGIC);
    out.extend_from_slice(format!("{:011}", banks.len()).as_bytes());

    for bank in banks {
        push_hex8(&mut out, bank.number);
        push_hex8(&mut out, bank.min);
        push_hex8(&mut out, bank.len());
        out.extend_from_slice(&memory.get_block(bank.number, bank.min, bank.len()));
    }

    labels.write_blob(&mut out);
    out
}

pub fn write(
    config: &OutputConfig,
    memory: &Memory,
    labels: &LabelStore,
    banks: &[BankRegion],
) -> Result<(), String> {
    let name = &config.file;
    let mut file = create(name)?;

    file.write_all(&build(memory, labels, banks))
        .map_err(|e| format!("Failed to write {name}: {e}"))?;

    Ok(())
}

/// Load a library image into memory and the label store, relocating
/// everything by `offset`.
pub fn load(
    data: &[u8],
    memory: &mut Memory,
    labels: &mut LabelStore,
    offset: i64,
) -> Result<(), String> {
    if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
        return Err("not a recognised library".to_string());
    }

    let mut pos = MAGIC.len();
    let count = read_number(data, &mut pos)?;

    for _ in 0..count {
        let bank = read_hex8(data, &mut pos)?;
        let min = read_hex8(data, &mut pos)?;
        let len = read_hex8(data, &mut pos)? as usize;

        let bytes = data.get(pos..pos + len).ok_or("truncated library")?;
        pos += len;

        for (i, &b) in bytes.iter().enumerate() {
            let addr = (i64::from(min) + offset + i as i64)
                .rem_euclid(i64::from(memory.address_space())) as u32;
            memory.write(bank, addr, b);
        }
    }

    labels.read_blob(data, &mut pos, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rasm_core::LabelKind;

    #[test]
    fn test_round_trip_with_offset() {
        let mut memory = Memory::new();
        memory.set_pc(0x1000);
        memory.pc_write(0x01);
        memory.pc_write(0x02);
        memory.pc_write(0x03);

        let mut labels = LabelStore::new();
        labels.set("start", 0x1000, LabelKind::Global).unwrap();

        let banks = [BankRegion { number: 0, min: 0x1000, max: 0x1002 }];
        let image = build(&memory, &labels, &banks);

        let mut mem2 = Memory::new();
        let mut labels2 = LabelStore::new();
        load(&image, &mut mem2, &mut labels2, 0x100).unwrap();

        assert_eq!(mem2.read(0, 0x1100), 0x01);
        assert_eq!(mem2.read(0, 0x1101), 0x02);
        assert_eq!(mem2.read(0, 0x1102), 0x03);
        assert_eq!(labels2.find("start", LabelKind::Global).unwrap().value, 0x1100);
    }

    #[test]
    fn test_bad_magic() {
        let mut memory = Memory::new();
        let mut labels = LabelStore::new();
        assert!(load(b"NOTALIB nope", &mut memory, &mut labels, 0).is_err());
    }

    #[test]
    fn test_multiple_banks() {
        let mut memory = Memory::new();
        memory.write(1, 0x10, 0xaa);
        memory.write(4, 0x20, 0xbb);

        let labels = LabelStore::new();
        let banks = [
            BankRegion { number: 1, min: 0x10, max: 0x10 },
            BankRegion { number: 4, min: 0x20, max: 0x20 },
        ];
        let image = build(&memory, &labels, &banks);

        let mut mem2 = Memory::new();
        let mut labels2 = LabelStore::new();
        load(&image, &mut mem2, &mut labels2, 0).unwrap();

        assert_eq!(mem2.read(1, 0x10), 0xaa);
        assert_eq!(mem2.read(4, 0x20), 0xbb);
    }
}
