//! `lpcdump dump`: Symbol tables, optionally with disassembly and lines.

use super::{load_program, open_output};
use crate::config::CliConfig;
use anyhow::Context;
use lpc_disasm::ProgramDump;
use std::io::Write;
use std::path::Path;

pub fn execute(
    file: &Path,
    disassemble: bool,
    lines: bool,
    output: Option<&Path>,
    config: &CliConfig,
) -> anyhow::Result<()> {
    let program = load_program(file)?;
    let opcodes = config.opcode_table();

    let mut options = config.dump;
    options.disassemble |= disassemble;
    options.line_numbers |= lines;

    let dump = ProgramDump::new(&program, &opcodes, options).with_config(config.decoder);
    let mut out = open_output(output)?;
    dump.write_to(&mut out).context("Failed to write dump")?;
    out.flush().context("Failed to write dump")?;
    Ok(())
}
