//! LPC VM Bytecode Definitions
//!
//! This crate provides the instruction set, the compiled program object,
//! bounds-checked byte readers and writers, and structural verification for
//! programs produced by the LPC compiler.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod encoder;
pub mod opcode;
pub mod program;
pub mod verify;

pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError, LineInfoWriter};
pub use opcode::{Encoding, Opcode, OpcodeTable, StandardOpcodes};
pub use program::{flags, ByteString, ClassDef, FunctionEntry, Inherit, Program, ProgramError};
pub use verify::{verify_program, VerifyError};
