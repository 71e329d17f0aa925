//! Compiled program object
//!
//! A [`Program`] is the loader's immutable hand-off: byte code, symbol
//! tables, inheritance links and the optional line-number blob. Ancestors are
//! shared through [`Arc`] handles and resolved through the inheritance table.

use crate::verify::{verify_program, VerifyError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Byte string as stored in the string table
pub type ByteString = Vec<u8>;

/// Program loading errors
#[derive(Debug, Error)]
pub enum ProgramError {
    /// Malformed JSON document
    #[error("Invalid program document: {0}")]
    Json(#[from] serde_json::Error),

    /// Structurally inconsistent program
    #[error("Invalid program: {0}")]
    Verify(#[from] VerifyError),
}

/// Function flag bits
pub mod flags {
    /// Body lives in an ancestor program
    pub const INHERITED: u16 = 1 << 0;
    /// Declared but never defined
    pub const UNDEFINED: u16 = 1 << 1;
    /// Compiled with strict types
    pub const STRICT_TYPES: u16 = 1 << 2;
    /// Prototype only
    pub const PROTOTYPE: u16 = 1 << 3;
    /// Accepts any number of arguments
    pub const TRUE_VARARGS: u16 = 1 << 4;
    /// Trailing arguments are optional
    pub const VARARGS: u16 = 1 << 5;
    /// Name-only duplicate of another slot
    pub const ALIAS: u16 = 1 << 7;
    /// Entry has no byte code of its own
    pub const NO_CODE: u16 = ALIAS | PROTOTYPE | UNDEFINED;
}

/// One slot of the function index space
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionEntry {
    /// Function name
    pub name: String,
    /// Flag bits, see [`flags`]
    pub flags: u16,
    /// Number of declared arguments
    pub num_args: u8,
    /// Number of local variables
    pub num_locals: u8,
    /// Entry address in the owning program's byte code
    pub address: u16,
    /// Runtime index of the real entry when [`flags::ALIAS`] is set
    pub alias_of: Option<u16>,
}

impl FunctionEntry {
    /// Create a locally defined function at `address`
    pub fn new(name: impl Into<String>, address: u16) -> Self {
        Self {
            name: name.into(),
            address,
            ..Self::default()
        }
    }

    /// Create an inherited slot
    pub fn inherited(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: flags::INHERITED,
            ..Self::default()
        }
    }

    /// Create an alias of the slot at `target`
    pub fn alias(name: impl Into<String>, target: u16) -> Self {
        Self {
            name: name.into(),
            flags: flags::ALIAS,
            alias_of: Some(target),
            ..Self::default()
        }
    }

    /// Set argument and local counts
    pub fn with_counts(mut self, num_args: u8, num_locals: u8) -> Self {
        self.num_args = num_args;
        self.num_locals = num_locals;
        self
    }

    /// Add flag bits
    pub fn with_flags(mut self, extra: u16) -> Self {
        self.flags |= extra;
        self
    }

    /// Check a flag bit
    #[inline]
    pub fn has(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    /// Check if the body lives in an ancestor
    pub fn is_inherited(&self) -> bool {
        self.has(flags::INHERITED)
    }

    /// Check if this slot is an alias
    pub fn is_alias(&self) -> bool {
        self.has(flags::ALIAS)
    }

    /// Check if this slot has no byte code
    pub fn has_no_code(&self) -> bool {
        self.has(flags::NO_CODE)
    }

    /// Runtime index holding the real flags for the slot at `own_index`
    pub fn runtime_index(&self, own_index: usize) -> usize {
        match (self.is_alias(), self.alias_of) {
            (true, Some(target)) => target as usize,
            _ => own_index,
        }
    }
}

/// Inheritance link to an ancestor program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inherit {
    /// The ancestor
    pub program: Arc<Program>,
    /// First runtime function index owned by the ancestor
    pub function_index_offset: u16,
    /// First variable index owned by the ancestor
    pub variable_index_offset: u16,
}

/// Class definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    /// String table index of the class name
    pub name: u16,
}

/// A compiled program
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Program {
    /// Source file name
    pub filename: String,
    /// Instruction stream
    #[serde(with = "hex_bytes")]
    pub byte_code: Vec<u8>,
    /// Ancestors, ordered by function index offset
    pub inherits: Vec<Inherit>,
    /// Function index space: inherited slots then local definitions
    pub functions: Vec<FunctionEntry>,
    /// Number of inherited function slots
    pub last_inherited: u16,
    /// Locally defined variable names
    pub variables: Vec<String>,
    /// String table
    #[serde(with = "text_strings")]
    pub strings: Vec<ByteString>,
    /// Class table
    pub classes: Vec<ClassDef>,
    /// Compact line-number blob
    #[serde(with = "hex_bytes_opt")]
    pub line_info: Option<Vec<u8>>,
}

impl Program {
    /// Create an empty program
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// Parse and verify a JSON program document
    pub fn from_json(text: &str) -> Result<Self, ProgramError> {
        let program: Program = serde_json::from_str(text)?;
        verify_program(&program)?;
        Ok(program)
    }

    /// Serialize to a JSON program document
    pub fn to_json(&self) -> Result<String, ProgramError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Size of the instruction stream
    pub fn program_size(&self) -> usize {
        self.byte_code.len()
    }

    /// Number of functions defined in this program
    pub fn num_functions_defined(&self) -> usize {
        self.functions.len().saturating_sub(self.last_inherited as usize)
    }

    /// Size of the whole function index space
    pub fn num_functions_total(&self) -> usize {
        self.last_inherited as usize + self.num_functions_defined()
    }

    /// Locally defined function by local index
    pub fn local_function(&self, local_index: usize) -> Option<&FunctionEntry> {
        self.functions.get(self.last_inherited as usize + local_index)
    }

    /// Ancestor owning the runtime function `index`
    ///
    /// Returns the position of the greatest `function_index_offset` not
    /// exceeding `index`.
    pub fn find_inherit(&self, index: usize) -> Option<usize> {
        self.inherits
            .partition_point(|inherit| inherit.function_index_offset as usize <= index)
            .checked_sub(1)
    }

    /// Follow alias and inheritance links to the defining program and entry
    pub fn resolve_function(&self, index: usize) -> Option<(&Program, &FunctionEntry)> {
        let mut program = self;
        let mut index = program.functions.get(index)?.runtime_index(index);
        loop {
            let entry = program.functions.get(index)?;
            if !entry.is_inherited() {
                return Some((program, entry));
            }
            let inherit = &program.inherits[program.find_inherit(index)?];
            index -= inherit.function_index_offset as usize;
            program = inherit.program.as_ref();
        }
    }

    /// Display name of the runtime function `index`
    pub fn function_name(&self, index: usize) -> Option<&str> {
        self.resolve_function(index).map(|(_, entry)| entry.name.as_str())
    }

    /// Size of the whole variable index space
    pub fn num_variables_total(&self) -> usize {
        self.first_local_variable() + self.variables.len()
    }

    fn first_local_variable(&self) -> usize {
        self.inherits.last().map_or(0, |inherit| {
            inherit.variable_index_offset as usize + inherit.program.num_variables_total()
        })
    }

    /// Name of variable `index`, resolved through the ancestors
    pub fn variable_name(&self, index: usize) -> Option<&str> {
        let first = self.first_local_variable();
        if index >= first {
            return self.variables.get(index - first).map(String::as_str);
        }
        let position = self
            .inherits
            .partition_point(|inherit| inherit.variable_index_offset as usize <= index)
            .checked_sub(1)?;
        let inherit = &self.inherits[position];
        inherit
            .program
            .variable_name(index - inherit.variable_index_offset as usize)
    }

    /// String table entry
    pub fn string(&self, index: usize) -> Option<&[u8]> {
        self.strings.get(index).map(Vec::as_slice)
    }

    /// Name of class `index`
    pub fn class_name(&self, index: usize) -> Option<&[u8]> {
        let class = self.classes.get(index)?;
        self.string(class.name as usize)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text.trim()).map_err(serde::de::Error::custom)
    }
}

mod hex_bytes_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| hex::decode(text.trim()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// UTF-8 strings are stored as JSON strings, anything else as a byte array
mod text_strings {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Text(String),
        Bytes(Vec<u8>),
    }

    pub fn serialize<S: Serializer>(strings: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(strings.len()))?;
        for s in strings {
            match std::str::from_utf8(s) {
                Ok(text) => seq.serialize_element(text)?,
                Err(_) => seq.serialize_element(s.as_slice())?,
            }
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let strings = Vec::<Stored>::deserialize(deserializer)?;
        Ok(strings
            .into_iter()
            .map(|stored| match stored {
                Stored::Text(text) => text.into_bytes(),
                Stored::Bytes(bytes) => bytes,
            })
            .collect())
    }
}
