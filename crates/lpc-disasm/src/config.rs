//! Decoder and dump configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors in a decoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Line field width is neither 2 nor 4
    #[error("Unsupported line address width {0} (expected 2 or 4)")]
    LineAddressWidth(usize),

    /// Switch key width is not a machine word size
    #[error("Unsupported switch key width {0} (expected 2, 4 or 8)")]
    SwitchKeyWidth(usize),

    /// Nesting ceiling of zero would reject every switch
    #[error("max_switch_depth must be at least 1")]
    SwitchDepth,
}

/// Layout parameters of the instruction stream and its line blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Width of the line field in line-blob address segments
    #[serde(default = "default_line_address_width")]
    pub line_address_width: usize,

    /// Width of the key field in integer and string switch tables
    #[serde(default = "default_switch_key_width")]
    pub switch_key_width: usize,

    /// Deepest switch nesting that is decoded
    #[serde(default = "default_max_switch_depth")]
    pub max_switch_depth: usize,
}

fn default_line_address_width() -> usize {
    2
}

fn default_switch_key_width() -> usize {
    8
}

fn default_max_switch_depth() -> usize {
    32
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            line_address_width: default_line_address_width(),
            switch_key_width: default_switch_key_width(),
            max_switch_depth: default_max_switch_depth(),
        }
    }
}

impl DecoderConfig {
    /// Check that every width is one the decoder can read
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.line_address_width, 2 | 4) {
            return Err(ConfigError::LineAddressWidth(self.line_address_width));
        }
        if !matches!(self.switch_key_width, 2 | 4 | 8) {
            return Err(ConfigError::SwitchKeyWidth(self.switch_key_width));
        }
        if self.max_switch_depth == 0 {
            return Err(ConfigError::SwitchDepth);
        }
        Ok(())
    }
}

/// Sections included after the symbol tables of a program dump
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpOptions {
    /// Append the disassembly of the whole program
    pub disassemble: bool,
    /// Append the line-number tables
    pub line_numbers: bool,
}

impl DumpOptions {
    /// Symbol tables only
    pub fn tables_only() -> Self {
        Self::default()
    }

    /// Everything
    pub fn full() -> Self {
        Self {
            disassemble: true,
            line_numbers: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DecoderConfig::default();
        assert_eq!(config.line_address_width, 2);
        assert_eq!(config.switch_key_width, 8);
        assert_eq!(config.max_switch_depth, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_widths() {
        let config = DecoderConfig {
            line_address_width: 3,
            ..DecoderConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::LineAddressWidth(3)));

        let config = DecoderConfig {
            switch_key_width: 1,
            ..DecoderConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::SwitchKeyWidth(1)));

        let config = DecoderConfig {
            max_switch_depth: 0,
            ..DecoderConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::SwitchDepth));
    }

    #[test]
    fn test_dump_options() {
        assert!(!DumpOptions::tables_only().disassemble);
        let full = DumpOptions::full();
        assert!(full.disassemble && full.line_numbers);
    }
}
