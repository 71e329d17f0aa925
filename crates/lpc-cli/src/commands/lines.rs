//! `lpcdump lines`: Decoded line-number tables.

use super::load_program;
use crate::config::CliConfig;
use anyhow::Context;
use lpc_disasm::LineTable;
use std::io::{self, Write};
use std::path::Path;

pub fn execute(file: &Path, config: &CliConfig) -> anyhow::Result<()> {
    let program = load_program(file)?;
    let table = LineTable::decode(&program, config.decoder.line_address_width)
        .with_context(|| format!("No line table in {}", file.display()))?;
    let mut out = io::stdout().lock();
    table
        .write_to(&mut out)
        .and_then(|()| out.flush())
        .context("Failed to write line table")?;
    Ok(())
}
