//! Line-number tables
//!
//! The compiler stores line numbers as a compact blob:
//!
//! ```text
//! [u16 total bytes][u16 address section offset, in 16-bit words]
//! (u16 line_count, u16 file_index)*      file segments
//! (u8 span, u16|u32 absolute_line)*      address segments
//! ```
//!
//! File segments map runs of absolute lines to source files, address
//! segments map runs of code bytes to absolute lines. Both are cumulative.

use crate::record::SourceLocation;
use lpc_bytecode::{BytecodeReader, DecodeError, Program};
use std::fmt;
use std::io;
use thiserror::Error;

/// Size of the blob header
const HEADER_SIZE: usize = 4;

/// Line blob errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineInfoError {
    /// Program carries no line blob
    #[error("Failed to load line numbers")]
    Missing,

    /// Header fields disagree with the blob
    #[error("Inconsistent line header: {total} total bytes, address section at {address_section}, blob is {len} bytes")]
    BadHeader {
        /// Total size claimed by the header
        total: usize,
        /// Byte offset of the address section
        address_section: usize,
        /// Actual blob size
        len: usize,
    },

    /// File section is not a whole number of segments
    #[error("File section of {0} bytes is not a whole number of segments")]
    FileSection(usize),

    /// Address segment cut short
    #[error("Truncated line blob: {0}")]
    Truncated(#[from] DecodeError),

    /// Line field width other than 2 or 4
    #[error("Unsupported line address width {0}")]
    Width(usize),
}

/// Run of absolute lines from one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSegment {
    /// Number of absolute lines in the run
    pub line_count: u16,
    /// 1-based string table index of the file name
    pub file_index: u16,
    /// File name, as stored in the string table
    pub file_name: Vec<u8>,
}

/// Run of code bytes on one absolute line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSegment {
    /// First code address
    pub start: usize,
    /// Number of code bytes
    pub span: u8,
    /// Absolute line
    pub line: u32,
}

/// Source position lookup injected into the decoder
pub trait LineLookup {
    /// Position of the instruction at `address`
    fn location_of(&self, address: usize) -> Option<SourceLocation<'_>>;
}

/// Decoded line-number tables of one program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineTable {
    files: Vec<FileSegment>,
    addresses: Vec<AddressSegment>,
}

impl LineTable {
    /// Decode the line blob of `program`
    pub fn decode(program: &Program, address_width: usize) -> Result<Self, LineInfoError> {
        let blob = program.line_info.as_deref().ok_or(LineInfoError::Missing)?;
        if !matches!(address_width, 2 | 4) {
            return Err(LineInfoError::Width(address_width));
        }

        let mut reader = BytecodeReader::new(blob);
        let total = reader.read_u16()? as usize;
        let address_section = reader.read_u16()? as usize * 2;
        if address_section < HEADER_SIZE || address_section > total || total > blob.len() {
            return Err(LineInfoError::BadHeader {
                total,
                address_section,
                len: blob.len(),
            });
        }
        if (address_section - HEADER_SIZE) % 4 != 0 {
            return Err(LineInfoError::FileSection(address_section - HEADER_SIZE));
        }

        let mut files = Vec::new();
        while reader.position() < address_section {
            let line_count = reader.read_u16()?;
            let file_index = reader.read_u16()?;
            let file_name = (file_index as usize)
                .checked_sub(1)
                .and_then(|i| program.string(i))
                .map(<[u8]>::to_vec)
                .unwrap_or_else(|| format!("<out of range {}>", file_index).into_bytes());
            files.push(FileSegment {
                line_count,
                file_index,
                file_name,
            });
        }

        let mut reader = BytecodeReader::at(&blob[..total], address_section);
        let mut addresses = Vec::new();
        let mut start = 0;
        while reader.has_more() {
            let span = reader.read_u8()?;
            let line = reader.read_uint(address_width)? as u32;
            addresses.push(AddressSegment { start, span, line });
            start += span as usize;
        }

        tracing::debug!(
            files = files.len(),
            addresses = addresses.len(),
            "decoded line table"
        );
        Ok(Self { files, addresses })
    }

    /// File segments in order
    pub fn files(&self) -> &[FileSegment] {
        &self.files
    }

    /// Address segments in order
    pub fn addresses(&self) -> &[AddressSegment] {
        &self.addresses
    }

    /// Absolute line of the code byte at `address`
    pub fn absolute_line(&self, address: usize) -> Option<u32> {
        let position = self
            .addresses
            .partition_point(|segment| segment.start <= address)
            .checked_sub(1)?;
        let segment = &self.addresses[position];
        (address < segment.start + segment.span as usize).then_some(segment.line)
    }

    /// File and file-relative line of an absolute line
    ///
    /// Lines of earlier segments from the same file are counted, so a file
    /// split around an include keeps numbering where it left off.
    pub fn file_line(&self, absolute: u32) -> Option<(&[u8], u32)> {
        let mut first = 1u32;
        for (position, segment) in self.files.iter().enumerate() {
            let count = segment.line_count as u32;
            if absolute >= first && absolute < first + count {
                let earlier: u32 = self.files[..position]
                    .iter()
                    .filter(|s| s.file_index == segment.file_index)
                    .map(|s| s.line_count as u32)
                    .sum();
                return Some((segment.file_name.as_slice(), absolute - first + 1 + earlier));
            }
            first += count;
        }
        None
    }
}

impl LineLookup for LineTable {
    fn location_of(&self, address: usize) -> Option<SourceLocation<'_>> {
        let absolute = self.absolute_line(address)?;
        let (file, line) = self.file_line(absolute)?;
        Some(SourceLocation { file, line })
    }
}

impl LineTable {
    /// Write both tables, file names byte for byte
    pub fn write_to<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "\nabsolute line -> (file, line) table:")?;
        for segment in &self.files {
            write!(out, "{} lines from {} [", segment.line_count, segment.file_index)?;
            out.write_all(&segment.file_name)?;
            writeln!(out, "]")?;
        }
        writeln!(out, "\naddress -> absolute line table:")?;
        for segment in &self.addresses {
            let last = (segment.start + segment.span as usize).saturating_sub(1);
            writeln!(out, "{:04x}-{:04x}: {}", segment.start, last, segment.line)?;
        }
        Ok(())
    }
}

/// Lossy: file names that are not UTF-8 are replaced
impl fmt::Display for LineTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::new();
        self.write_to(&mut out).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&out))
    }
}
