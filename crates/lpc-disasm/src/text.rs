//! Rendering of raw byte strings

use std::fmt;
use std::io;

/// Bytes shown for a string operand
pub const OPERAND_STRING_LIMIT: usize = 29;

/// Bytes shown for a string-table listing entry
pub const LISTING_STRING_LIMIT: usize = 32;

/// Display adapter for a byte string
///
/// Shows at most `limit` bytes, stops at the first NUL and escapes newlines.
/// [`Escaped::write_raw`] passes every other byte through unchanged; the
/// `Display` form is lossy and replaces invalid UTF-8, including a
/// character cut in half by the limit.
#[derive(Debug, Clone, Copy)]
pub struct Escaped<'a> {
    bytes: &'a [u8],
    limit: usize,
}

impl<'a> Escaped<'a> {
    /// Wrap `bytes` for display with the given byte limit
    pub fn new(bytes: &'a [u8], limit: usize) -> Self {
        Self { bytes, limit }
    }

    /// Operand rendering
    pub fn operand(bytes: &'a [u8]) -> Self {
        Self::new(bytes, OPERAND_STRING_LIMIT)
    }

    /// Listing rendering
    pub fn listing(bytes: &'a [u8]) -> Self {
        Self::new(bytes, LISTING_STRING_LIMIT)
    }

    /// Write the visible bytes, escaping only newlines
    pub fn write_raw<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        for chunk in self.visible().split_inclusive(|&b| b == b'\n') {
            match chunk.strip_suffix(b"\n") {
                Some(line) => {
                    out.write_all(line)?;
                    out.write_all(b"\\n")?;
                }
                None => out.write_all(chunk)?,
            }
        }
        Ok(())
    }

    fn visible(&self) -> &'a [u8] {
        let head = &self.bytes[..self.bytes.len().min(self.limit)];
        match head.iter().position(|&b| b == 0) {
            Some(nul) => &head[..nul],
            None => head,
        }
    }
}

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in String::from_utf8_lossy(self.visible()).split_inclusive('\n') {
            match chunk.strip_suffix('\n') {
                Some(line) => write!(f, "{}\\n", line)?,
                None => f.write_str(chunk)?,
            }
        }
        Ok(())
    }
}
