//! `lpcdump verify`: Structural checks without dumping.

use anyhow::Context;
use lpc_bytecode::{verify_program, Program};
use std::path::Path;

/// Summary of a program that passed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub filename: String,
    pub code_bytes: usize,
    pub functions: usize,
    pub inherits: usize,
}

pub fn execute(file: &Path) -> anyhow::Result<()> {
    let summary = check(file)?;
    println!(
        "{}: ok ({} bytes of code, {} functions, {} inherits)",
        summary.filename, summary.code_bytes, summary.functions, summary.inherits
    );
    Ok(())
}

/// Parse and verify without printing
pub fn check(file: &Path) -> anyhow::Result<Summary> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let program: Program = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a program document", file.display()))?;
    verify_program(&program).with_context(|| format!("{} failed verification", program.filename))?;

    Ok(Summary {
        filename: program.filename.clone(),
        code_bytes: program.program_size(),
        functions: program.functions.len(),
        inherits: program.inherits.len(),
    })
}
