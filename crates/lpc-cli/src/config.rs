//! `lpcdump.toml` configuration file
//!
//! ```toml
//! [decoder]
//! line_address_width = 2
//! switch_key_width = 8
//! max_switch_depth = 32
//!
//! [dump]
//! disassemble = true
//! line_numbers = false
//!
//! [opcodes]
//! efuns = ["this_object", "write"]
//! simul_efuns = ["tell_room"]
//! ```
//!
//! Every section and key is optional.

use lpc_bytecode::StandardOpcodes;
use lpc_disasm::{ConfigError, DecoderConfig, DumpOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Decoder section out of range
    #[error("Invalid [decoder] section: {0}")]
    Decoder(#[from] ConfigError),
}

/// Names of built-in and simulated built-in functions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpcodeNames {
    /// Built-in names by efun number
    pub efuns: Vec<String>,
    /// simul_efun names by index
    pub simul_efuns: Vec<String>,
}

/// Parsed configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Decoder layout parameters
    pub decoder: DecoderConfig,
    /// Default dump sections
    pub dump: DumpOptions,
    /// Built-in name tables
    pub opcodes: OpcodeNames,
}

impl CliConfig {
    /// Load from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigFileError> {
        let config: CliConfig = toml::from_str(content)?;
        config.decoder.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigFileError> {
        match path {
            Some(path) => {
                let config = Self::from_file(path)?;
                tracing::debug!(path = %path.display(), "loaded config");
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Opcode table carrying the configured names
    pub fn opcode_table(&self) -> StandardOpcodes {
        StandardOpcodes::with_names(self.opcodes.efuns.clone(), self.opcodes.simul_efuns.clone())
    }
}
