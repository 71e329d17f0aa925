//! Switch jump tables
//!
//! A `switch` is followed by its body and then its jump table. The table
//! comes in three layouts selected by the type byte:
//!
//! - direct: one u16 target per slot, then the i32 lowest key
//! - integer: `(key, u16 offset)` pairs, keys `switch_key_width` bytes wide
//! - string: the same pairs, keys are 1-based string table indices
//!
//! All offsets are relative to the byte after the opcode.

use crate::record::{Diagnostic, Record};
use crate::text::Escaped;
use lpc_bytecode::opcode::switch_type;
use lpc_bytecode::{BytecodeReader, DecodeError, Program};
use std::fmt;
use std::io;

/// Size of the switch header after the opcode
pub const HEADER_SIZE: usize = 7;

/// Offset marking the start of a case range
const RANGE_START: u16 = 1;

/// Jump table layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchKind {
    /// Dense table indexed by `key - minval`
    Direct,
    /// Sorted integer keys
    Integer,
    /// Sorted string keys
    String,
}

impl SwitchKind {
    /// Layout selected by a table type byte
    pub fn from_type(table_type: u8) -> Self {
        if table_type == switch_type::DIRECT {
            Self::Direct
        } else if table_type >> 4 == switch_type::NUMERIC_NIBBLE {
            Self::Integer
        } else {
            Self::String
        }
    }
}

/// Key of a jump table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchKey<'a> {
    /// Direct table slot
    Slot(usize),
    /// Integer key, also used for the null string key
    Integer(i64),
    /// String key
    String(&'a [u8]),
    /// String key naming a missing table entry
    MissingString(u64),
}

/// Target of a jump table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchTarget {
    /// Absolute code address
    Address(usize),
    /// First key of a range; the next entry holds the target
    RangeStart,
}

impl fmt::Display for SwitchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => write!(f, "{:04x}", address),
            Self::RangeStart => f.write_str("<range start>"),
        }
    }
}

/// One decoded jump table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchEntry<'a> {
    /// Case key
    pub key: SwitchKey<'a>,
    /// Case target
    pub target: SwitchTarget,
}

impl SwitchEntry<'_> {
    /// Write the listing text, string keys byte for byte
    pub fn write_to<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        match self.key {
            SwitchKey::String(key) => {
                out.write_all(b"\t\"")?;
                Escaped::operand(key).write_raw(out)?;
                write!(out, "\"\t{}", self.target)
            }
            _ => write!(out, "{}", self),
        }
    }
}

impl fmt::Display for SwitchEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key {
            SwitchKey::Slot(slot) => write!(f, "\t{:2}: {}", slot, self.target),
            SwitchKey::Integer(key) => write!(f, "\t{:<4}\t{}", key, self.target),
            SwitchKey::String(key) => write!(f, "\t\"{}\"\t{}", Escaped::operand(key), self.target),
            SwitchKey::MissingString(key) => write!(f, "\t<out of range {}>\t{}", key, self.target),
        }
    }
}

/// Location of a switch's body and table, absolute addresses
///
/// Only built by [`SwitchTable::locate`], which checks the geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchTable {
    /// Address of the switch opcode
    pub(crate) opcode_offset: usize,
    /// Address all offsets are relative to
    pub(crate) base: usize,
    /// Table layout
    pub(crate) kind: SwitchKind,
    /// First byte of the table, end of the body
    pub(crate) start: usize,
    /// First byte after the table
    pub(crate) end: usize,
}

impl SwitchTable {
    /// Place a table, or `None` when it does not fit inside `window_end`
    pub fn locate(
        opcode_offset: usize,
        table_type: u8,
        table_start: u16,
        table_end: u16,
        window_end: usize,
    ) -> Option<Self> {
        let base = opcode_offset + 1;
        let kind = SwitchKind::from_type(table_type);
        let (table_start, table_end) = (table_start as usize, table_end as usize);

        let min_size = if kind == SwitchKind::Direct { 4 } else { 0 };
        if table_start < HEADER_SIZE
            || table_end < table_start + min_size
            || base + table_end > window_end
        {
            return None;
        }

        Some(Self {
            opcode_offset,
            base,
            kind,
            start: base + table_start,
            end: base + table_end,
        })
    }

    /// First byte of the body
    pub fn body_start(&self) -> usize {
        self.base + HEADER_SIZE
    }

    /// Decode the table into listing records
    pub fn decode<'a>(&self, code: &'a [u8], program: &'a Program, key_width: usize) -> Vec<Record<'a>> {
        let mut records = vec![Record::SwitchTableStart {
            offset: self.opcode_offset,
        }];
        let window = &code[..self.end.min(code.len())];
        let mut reader = BytecodeReader::at(window, self.start);

        let result = match self.kind {
            SwitchKind::Direct => self.decode_direct(&mut reader, &mut records),
            SwitchKind::Integer | SwitchKind::String => {
                self.decode_pairs(&mut reader, program, key_width, &mut records)
            }
        };

        if result.is_err() {
            tracing::warn!(offset = reader.position(), "switch table ends mid-entry");
            records.push(Record::Diagnostic {
                offset: reader.position(),
                diagnostic: Diagnostic::MalformedSwitch,
            });
        }
        records
    }

    fn decode_direct<'a>(
        &self,
        reader: &mut BytecodeReader<'a>,
        records: &mut Vec<Record<'a>>,
    ) -> Result<(), DecodeError> {
        let minimum_at = self
            .end
            .checked_sub(4)
            .filter(|&at| at >= self.start)
            .ok_or(DecodeError::UnexpectedEnd(self.start))?;
        let slots = (minimum_at - self.start) / 2;
        for slot in 0..slots {
            let offset = reader.read_u16()?;
            records.push(Record::SwitchEntry(SwitchEntry {
                key: SwitchKey::Slot(slot),
                target: SwitchTarget::Address(self.base + offset as usize),
            }));
        }
        reader.seek(minimum_at);
        records.push(Record::SwitchMinimum(reader.read_i32()?));
        Ok(())
    }

    fn decode_pairs<'a>(
        &self,
        reader: &mut BytecodeReader<'a>,
        program: &'a Program,
        key_width: usize,
        records: &mut Vec<Record<'a>>,
    ) -> Result<(), DecodeError> {
        while reader.position() < self.end {
            let raw = reader.read_uint(key_width)?;
            let offset = reader.read_u16()?;

            let key = match self.kind {
                SwitchKind::String if raw != 0 => {
                    match usize::try_from(raw - 1).ok().and_then(|i| program.string(i)) {
                        Some(s) => SwitchKey::String(s),
                        None => SwitchKey::MissingString(raw),
                    }
                }
                _ => SwitchKey::Integer(signed(raw, key_width)),
            };
            let target = if offset == RANGE_START {
                SwitchTarget::RangeStart
            } else {
                SwitchTarget::Address(self.base + offset as usize)
            };
            records.push(Record::SwitchEntry(SwitchEntry { key, target }));
        }
        Ok(())
    }
}

fn signed(raw: u64, width: usize) -> i64 {
    match width {
        2 => raw as u16 as i16 as i64,
        4 => raw as u32 as i32 as i64,
        _ => raw as i64,
    }
}
