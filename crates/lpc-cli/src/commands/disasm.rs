//! `lpcdump disasm`: Instruction listing of an address range.

use super::{load_program, open_output};
use crate::config::CliConfig;
use anyhow::Context;
use lpc_disasm::{Disassembler, LineTable};
use std::io::Write;
use std::path::Path;

pub fn execute(
    file: &Path,
    start: Option<usize>,
    end: Option<usize>,
    output: Option<&Path>,
    config: &CliConfig,
) -> anyhow::Result<()> {
    let program = load_program(file)?;
    let opcodes = config.opcode_table();
    let start = start.unwrap_or(0);
    let end = end.unwrap_or(program.program_size());
    if start > end {
        anyhow::bail!("start {:#06x} is past end {:#06x}", start, end);
    }

    let table = match LineTable::decode(&program, config.decoder.line_address_width) {
        Ok(table) => Some(table),
        Err(err) => {
            tracing::info!(error = %err, "listing without source locations");
            None
        }
    };
    let mut disassembler = Disassembler::new(&program, &opcodes).with_config(config.decoder);
    if let Some(table) = table.as_ref() {
        disassembler = disassembler.with_line_lookup(table);
    }

    let mut out = open_output(output)?;
    for record in disassembler.decode(start, end) {
        record
            .write_to(&mut out)
            .and_then(|()| writeln!(out))
            .context("Failed to write listing")?;
    }
    out.flush().context("Failed to write listing")?;
    Ok(())
}
