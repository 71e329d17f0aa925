//! `lpcdump` command implementations
//!
//! The binary in `main.rs` only parses arguments; everything it runs lives
//! here so the commands can be driven from tests.

pub mod commands;
pub mod config;

pub use config::{CliConfig, ConfigFileError, OpcodeNames};
