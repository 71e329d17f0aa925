//! LPC Program Introspection
//!
//! Disassembler and report formatter for compiled LPC programs:
//!
//! - [`Disassembler`]: lazy instruction decoder with switch and
//!   function-boundary handling
//! - [`LineTable`]: decoder for the compact line-number blob
//! - [`ProgramDump`]: full report of symbol tables, disassembly and lines
//!
//! # Example
//!
//! ```
//! use lpc_bytecode::{BytecodeWriter, Opcode, Program, StandardOpcodes};
//! use lpc_disasm::Disassembler;
//!
//! let mut writer = BytecodeWriter::new();
//! writer.emit_opcode(Opcode::Const1);
//! writer.emit_opcode(Opcode::Return);
//!
//! let mut program = Program::new("demo.c");
//! program.byte_code = writer.into_bytes();
//!
//! let opcodes = StandardOpcodes::new();
//! let listing: Vec<String> = Disassembler::new(&program, &opcodes)
//!     .decode_all()
//!     .map(|record| record.to_string())
//!     .collect();
//! assert_eq!(listing, ["0000: const1", "0001: return"]);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod decoder;
pub mod dump;
pub mod line_table;
pub mod record;
pub mod switch;
pub mod text;

pub use config::{ConfigError, DecoderConfig, DumpOptions};
pub use decoder::{Disassembler, Records};
pub use dump::ProgramDump;
pub use line_table::{LineInfoError, LineLookup, LineTable};
pub use record::{Diagnostic, Instruction, Operand, Record, SourceLocation};
pub use switch::{SwitchEntry, SwitchKey, SwitchTarget};
