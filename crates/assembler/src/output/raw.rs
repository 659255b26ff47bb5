//! Raw binary output: each bank's written region, nothing else.

use std::io::Write;

use rasm_core::Memory;

use super::{BankRegion, OutputConfig, create};

pub fn write(config: &OutputConfig, memory: &Memory, banks: &[BankRegion]) -> Result<(), String> {
    for bank in banks {
        let name = config.bank_name(bank.number, banks.len());
        let mut file = create(&name)?;

        let block = memory.get_block(bank.number, bank.min, bank.len());
        file.write_all(&block)
            .map_err(|e| format!("Failed to write {name}: {e}"))?;
    }

    Ok(())
}
