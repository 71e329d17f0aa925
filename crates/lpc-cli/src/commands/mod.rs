//! Subcommands and the helpers they share

pub mod disasm;
pub mod dump;
pub mod lines;
pub mod verify;

use anyhow::Context;
use lpc_bytecode::Program;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Read and verify a JSON program document
pub fn load_program(path: &Path) -> anyhow::Result<Program> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let program = Program::from_json(&text)
        .with_context(|| format!("Failed to load program {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        bytes = program.program_size(),
        functions = program.functions.len(),
        "loaded program"
    );
    Ok(program)
}

/// Open `path` for writing, or stdout when `None`
pub fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

/// Parse a decimal or `0x`-prefixed hex address
pub fn parse_address(text: &str) -> Result<usize, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", text, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("16"), Ok(16));
        assert_eq!(parse_address("0x10"), Ok(16));
        assert_eq!(parse_address("0X1f"), Ok(31));
        assert!(parse_address("0xzz").is_err());
        assert!(parse_address("-1").is_err());
    }
}
