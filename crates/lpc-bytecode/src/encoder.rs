//! Bytecode encoding and decoding utilities
//!
//! [`BytecodeReader`] is the bounds-checked cursor every decoder in the
//! workspace reads through. [`BytecodeWriter`] and [`LineInfoWriter`] build
//! byte code and line-number blobs for fixtures, tests and benchmarks.

use crate::opcode::Opcode;
use thiserror::Error;

/// Errors that can occur during bytecode decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Unexpected end of bytecode stream
    #[error("Unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Unsupported field width
    #[error("Unsupported field width {0}")]
    UnsupportedWidth(usize),
}

/// Bytecode writer for encoding instructions
///
/// Provides methods for emitting opcodes and their operands into a binary buffer.
pub struct BytecodeWriter {
    /// Internal buffer containing the bytecode
    pub(crate) buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Create a new bytecode writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Get the current bytecode buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the bytecode buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get the current offset (length of bytecode)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer (little-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 16-bit signed integer (little-endian)
    pub fn emit_i16(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit unsigned integer (little-endian)
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit signed integer (little-endian)
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit unsigned integer (little-endian)
    pub fn emit_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer (little-endian)
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit float (little-endian)
    pub fn emit_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    // ===== Opcode Emission =====

    /// Emit an opcode without operands
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    /// Emit an opcode followed by a single byte operand
    pub fn emit_with_u8(&mut self, opcode: Opcode, operand: u8) {
        self.emit_opcode(opcode);
        self.emit_u8(operand);
    }

    /// Emit an opcode followed by a 16-bit operand
    pub fn emit_with_u16(&mut self, opcode: Opcode, operand: u16) {
        self.emit_opcode(opcode);
        self.emit_u16(operand);
    }

    /// Emit a `push` with the given tag bytes
    pub fn emit_push(&mut self, tags: &[u8]) {
        self.emit_opcode(Opcode::Push);
        self.emit_u8(tags.len() as u8);
        self.buffer.extend_from_slice(tags);
    }

    /// Emit a `number` with a machine integer immediate
    pub fn emit_number(&mut self, value: i64) {
        self.emit_opcode(Opcode::Number);
        self.emit_i64(value);
    }

    /// Emit a `real` with a float immediate
    pub fn emit_real(&mut self, value: f64) {
        self.emit_opcode(Opcode::Real);
        self.emit_f64(value);
    }

    /// Emit a `short_int` immediate
    pub fn emit_short_int(&mut self, value: i16) {
        self.emit_opcode(Opcode::ShortInt);
        self.emit_i16(value);
    }

    /// Emit a function call by runtime index
    pub fn emit_call(&mut self, function_index: u16, num_args: u8) {
        self.emit_opcode(Opcode::CallFunctionByAddress);
        self.emit_u16(function_index);
        self.emit_u8(num_args);
        self.emit_u16(0);
    }

    /// Emit a call into an explicit ancestor
    pub fn emit_call_inherited(&mut self, inherit: u8, function_index: u16, num_args: u8) {
        self.emit_opcode(Opcode::CallInherited);
        self.emit_u8(inherit);
        self.emit_u16(function_index);
        self.emit_u8(num_args);
        self.emit_u16(0);
    }

    /// Emit a switch header, returning the offset of its operand base
    ///
    /// The three offsets are relative to the returned base and are usually
    /// patched with [`BytecodeWriter::patch_u16`] once the body is emitted.
    pub fn emit_switch(&mut self, table_type: u8, table_start: u16, table_end: u16, default: u16) -> usize {
        self.emit_opcode(Opcode::Switch);
        let base = self.offset();
        self.emit_u8(table_type);
        self.emit_u16(table_start);
        self.emit_u16(table_end);
        self.emit_u16(default);
        base
    }

    // ===== Patching =====

    /// Patch a previously emitted u16 value at the given offset
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        let bytes = value.to_le_bytes();
        self.buffer[offset..offset + 2].copy_from_slice(&bytes);
    }

    /// Reserve space for a u16 value (returns offset for later patching)
    pub fn reserve_u16(&mut self) -> usize {
        let offset = self.offset();
        self.emit_u16(0);
        offset
    }
}

impl Default for BytecodeWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytecode reader for decoding instructions
///
/// Every read is bounds-checked against the end of the borrowed buffer.
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a new bytecode reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Create a reader positioned at `position`
    pub fn at(buffer: &'a [u8], position: usize) -> Self {
        Self { buffer, position }
    }

    /// Get the current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Get the remaining bytes in the buffer
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Check if there are more bytes to read
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    /// Seek to a specific position
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    /// Advance past `count` bytes without interpreting them
    pub fn skip(&mut self, count: usize) -> Result<(), DecodeError> {
        if count > self.remaining() {
            return Err(DecodeError::UnexpectedEnd(self.position));
        }
        self.position += count;
        Ok(())
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self
            .position
            .checked_add(N)
            .filter(|&end| end <= self.buffer.len())
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.buffer[self.position..end]);
        self.position = end;
        Ok(bytes)
    }

    // ===== Basic Reading =====

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.take::<1>().map(|b| b[0])
    }

    /// Read a 16-bit unsigned integer (little-endian)
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.take().map(u16::from_le_bytes)
    }

    /// Read a 16-bit signed integer (little-endian)
    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        self.take().map(i16::from_le_bytes)
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.take().map(u32::from_le_bytes)
    }

    /// Read a 32-bit signed integer (little-endian)
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.take().map(i32::from_le_bytes)
    }

    /// Read a 64-bit unsigned integer (little-endian)
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        self.take().map(u64::from_le_bytes)
    }

    /// Read a 64-bit signed integer (little-endian)
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        self.take().map(i64::from_le_bytes)
    }

    /// Read a 64-bit float (little-endian)
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        self.take().map(f64::from_le_bytes)
    }

    /// Read an unsigned integer of `width` bytes (2, 4 or 8)
    pub fn read_uint(&mut self, width: usize) -> Result<u64, DecodeError> {
        match width {
            2 => self.read_u16().map(u64::from),
            4 => self.read_u32().map(u64::from),
            8 => self.read_u64(),
            other => Err(DecodeError::UnsupportedWidth(other)),
        }
    }
}

/// Builder for line-number blobs
///
/// Layout: `[u16 total bytes][u16 address section offset in words]`, then
/// `(u16 lines, u16 file)` file segments, then `(u8 span, line)` address
/// segments where the line field is `address_width` bytes wide.
pub struct LineInfoWriter {
    address_width: usize,
    files: Vec<(u16, u16)>,
    addresses: Vec<(u8, u32)>,
}

impl LineInfoWriter {
    /// Create a writer for 2- or 4-byte line fields
    pub fn new(address_width: usize) -> Self {
        Self {
            address_width,
            files: Vec::new(),
            addresses: Vec::new(),
        }
    }

    /// Append a file segment: `lines` absolute lines from 1-based `file`
    pub fn file_segment(mut self, lines: u16, file: u16) -> Self {
        self.files.push((lines, file));
        self
    }

    /// Append an address segment: `span` code bytes on absolute `line`
    pub fn address_segment(mut self, span: u8, line: u32) -> Self {
        self.addresses.push((span, line));
        self
    }

    /// Encode the blob
    pub fn into_bytes(self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();
        let total_at = writer.reserve_u16();
        let words_at = writer.reserve_u16();
        for (lines, file) in &self.files {
            writer.emit_u16(*lines);
            writer.emit_u16(*file);
        }
        let words = (writer.offset() / 2) as u16;
        writer.patch_u16(words_at, words);
        for (span, line) in &self.addresses {
            writer.emit_u8(*span);
            if self.address_width == 4 {
                writer.emit_u32(*line);
            } else {
                writer.emit_u16(*line as u16);
            }
        }
        let total = writer.offset() as u16;
        writer.patch_u16(total_at, total);
        writer.into_bytes()
    }
}
