//! Decoded instructions and the records a disassembly yields
//!
//! Every record renders as exactly the text of one listing entry; some
//! entries span several lines. `write_to` emits program strings and file
//! names byte for byte, [`fmt::Display`] is the lossy UTF-8 form of the
//! same text.

use crate::switch::SwitchEntry;
use crate::text::Escaped;
use lpc_bytecode::opcode::foreach;
use std::fmt;
use std::io;

/// A source position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation<'a> {
    /// File name, as stored in the string table
    pub file: &'a [u8],
    /// Line within the file, 1-based
    pub line: u32,
}

impl SourceLocation<'_> {
    /// Write `file:line` with the file name unchanged
    pub fn write_to<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(self.file)?;
        write!(out, ":{}", self.line)
    }
}

impl fmt::Display for SourceLocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", String::from_utf8_lossy(self.file), self.line)
    }
}

/// Operand class of a `push` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushClass {
    /// String table entry
    String,
    /// Small number
    Number,
    /// Global variable
    Global,
    /// Local variable
    Local,
}

impl PushClass {
    /// Class named by the high two bits of a tag
    pub fn from_tag(tag: u8) -> Self {
        match (tag & lpc_bytecode::opcode::push::WHAT) >> 6 {
            0 => Self::String,
            1 => Self::Number,
            2 => Self::Global,
            _ => Self::Local,
        }
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Global => "global",
            Self::Local => "local",
        }
    }
}

/// One slot of a `push` instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushSlot {
    /// Operand class
    pub class: PushClass,
    /// Index within the class
    pub index: u8,
}

impl PushSlot {
    /// Split a tag byte
    pub fn from_tag(tag: u8) -> Self {
        Self {
            class: PushClass::from_tag(tag),
            index: tag & lpc_bytecode::opcode::push::MASK,
        }
    }
}

/// Right-hand side of a counted loop condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopBound {
    /// Immediate bound
    Number(i32),
    /// Bound held in a local
    Local(u8),
}

/// Target of a `call_inherited`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritedCall<'a> {
    /// Function found in the ancestor
    Resolved {
        /// Ancestor file name
        filename: &'a str,
        /// Function name
        name: &'a str,
    },
    /// Index past the ancestor's function table
    OutOfRange {
        /// Ancestor file name
        filename: &'a str,
    },
    /// Selector past the inheritance table
    BadInherit,
}

/// Function value built by `function_constructor`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionValue<'a> {
    /// Pointer to a function of this program
    Local {
        /// Runtime function index
        index: u16,
        /// Resolved name, `None` when out of range
        name: Option<&'a str>,
    },
    /// Pointer to a simulated built-in
    Simul {
        /// simul_efun index
        index: u16,
        /// Name, `None` when unknown
        name: Option<&'a str>,
    },
    /// Pointer to a built-in
    Efun {
        /// efun index
        index: u16,
        /// Name, `None` when unknown
        name: Option<&'a str>,
    },
    /// Functional whose body follows inline
    Functional {
        /// Argument count
        args: u8,
    },
    /// Anonymous function whose body follows inline
    Anonymous {
        /// Argument count
        args: u8,
        /// Local count
        locals: u8,
        /// First address after the body
        ends_at: usize,
    },
    /// Unrecognized sub-tag
    Unknown(u8),
}

/// Header of a `switch` instruction, addresses absolute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchHeader {
    /// Table type byte
    pub table_type: u8,
    /// First byte of the jump table
    pub table_start: usize,
    /// First byte after the jump table
    pub table_end: usize,
    /// Default target
    pub default: usize,
}

/// Decoded operand, one variant per encoding family
#[derive(Debug, Clone, PartialEq)]
pub enum Operand<'a> {
    /// No operand
    None,
    /// Tagged push slots
    Push(Vec<PushSlot>),
    /// Relative branch with its absolute target
    Branch {
        /// Raw offset
        offset: u16,
        /// Absolute target
        target: u16,
    },
    /// Absolute address
    Address(u16),
    /// Aggregate size
    Count(u16),
    /// Small immediate
    Byte(u8),
    /// Small negative immediate, magnitude stored
    NegByte(u8),
    /// Local slot
    Local(u8),
    /// Global variable
    Global {
        /// Variable index
        index: u8,
        /// Resolved name, `None` when out of range
        name: Option<&'a str>,
    },
    /// `foreach` iteration slots
    Foreach {
        /// Flag byte
        flags: u8,
        /// Element or key slot
        left: u8,
        /// Value slot, mappings only
        right: Option<u8>,
    },
    /// `while_dec`
    WhileDec {
        /// Counter local
        local: u8,
        /// Raw offset
        offset: u16,
        /// Absolute target
        target: u16,
    },
    /// `loop_cond_number` and `loop_cond_local`
    LoopCond {
        /// Counter local
        local: u8,
        /// Loop bound
        bound: LoopBound,
        /// Raw offset
        offset: u16,
        /// Absolute target
        target: u16,
    },
    /// Call by runtime function index
    Call {
        /// Runtime function index
        index: u16,
        /// Resolved name, `None` when out of range
        name: Option<&'a str>,
    },
    /// Call into an explicit ancestor
    CallInherited {
        /// Ancestor selector
        inherit: u8,
        /// Function index in the ancestor
        index: u16,
        /// Resolution result
        target: InheritedCall<'a>,
    },
    /// Call a simulated built-in
    SimulEfun {
        /// simul_efun index
        index: u16,
        /// Argument count
        args: u8,
        /// Name, `None` when out of range
        name: Option<&'a str>,
    },
    /// Function value constructor
    FunctionConstructor(FunctionValue<'a>),
    /// Fixed-arity built-in
    Efun(u16),
    /// Variable-arity built-in
    EfunV {
        /// efun index
        index: u16,
        /// Argument count
        args: u8,
    },
    /// Varargs expansion depth
    ExpandVarargs(u8),
    /// Class reference
    Class {
        /// Class index
        index: u8,
        /// Class name, `None` when out of range
        name: Option<&'a [u8]>,
    },
    /// 16-bit immediate
    ShortInt(i16),
    /// Machine integer immediate
    Number(i64),
    /// Float immediate
    Real(f64),
    /// String table reference
    String {
        /// String index
        index: u16,
        /// Contents, `None` when out of range
        value: Option<&'a [u8]>,
    },
    /// Switch header
    Switch(SwitchHeader),
}

impl Operand<'_> {
    /// Check if the operand renders as nothing
    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Push(slots) => slots.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Push(slots) => {
                for (i, slot) in slots.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} {}", slot.class.name(), slot.index)?;
                }
                Ok(())
            }
            Self::Branch { offset, target } => write!(f, "{:04x} ({:04x})", offset, target),
            Self::Address(address) => write!(f, "{:04x}", address),
            Self::Count(count) => write!(f, "{}", count),
            Self::Byte(value) => write!(f, "{}", value),
            Self::NegByte(value) => write!(f, "-{}", value),
            Self::Local(slot) => write!(f, "LV{}", slot),
            Self::Global { name: Some(name), .. } => f.write_str(name),
            Self::Global { index, name: None } => write!(f, "<out of range {}>", index),
            Self::Foreach { flags, left, right } => {
                let mut left_kind = if flags & foreach::LEFT_GLOBAL != 0 { "global" } else { "local" };
                let mut right_kind = if flags & foreach::RIGHT_GLOBAL != 0 { "global" } else { "local" };
                if flags & foreach::REF != 0 {
                    if flags & foreach::MAPPING != 0 {
                        right_kind = "ref";
                    } else {
                        left_kind = "ref";
                    }
                }
                match right {
                    Some(right) => write!(f, "(mapping) {} {}, {} {}", left_kind, left, right_kind, right),
                    None => write!(f, "(array) {} {}", left_kind, left),
                }
            }
            Self::WhileDec { local, offset, target } => {
                write!(f, "LV{}--, branch {:04x} ({:04x})", local, offset, target)
            }
            Self::LoopCond { local, bound, offset, target } => {
                write!(f, "LV{} < ", local)?;
                match bound {
                    LoopBound::Number(n) => write!(f, "{}", n)?,
                    LoopBound::Local(slot) => write!(f, "LV{}", slot)?,
                }
                write!(f, " bbranch_when_non_zero {:04x} ({:04x})", offset, target)
            }
            Self::Call { index, name: Some(name) } => write!(f, "{:<12} {:>5}", name, index),
            Self::Call { index, name: None } => write!(f, "<out of range {}>", index),
            Self::CallInherited { inherit, index, target } => match target {
                InheritedCall::Resolved { filename, name } => {
                    write!(f, "{:>30}::{:<12} {:>5}", filename, name, index)
                }
                InheritedCall::OutOfRange { filename } => {
                    write!(f, "<out of range in {:>30} - {}>", filename, index)
                }
                InheritedCall::BadInherit => write!(f, "<out of range inherit {}>", inherit),
            },
            Self::SimulEfun { index, args, name } => match name {
                Some(name) => write!(f, "\"{}\" {}", name, args),
                None => write!(f, "<invalid {}> {}", index, args),
            },
            Self::FunctionConstructor(value) => fmt::Display::fmt(value, f),
            Self::Efun(index) => write!(f, "EFUN: {}", index),
            Self::EfunV { args, .. } => write!(f, "EFUN_V ARGS: {}", args),
            Self::ExpandVarargs(0) => f.write_str("top of stack"),
            Self::ExpandVarargs(depth) => write!(f, "{} from top of stack", depth),
            Self::Class { name: Some(name), .. } => write!(f, "{}", Escaped::operand(name)),
            Self::Class { index, name: None } => write!(f, "<out of range {}>", index),
            Self::ShortInt(value) => write!(f, "short {}", value),
            Self::Number(value) => write!(f, "{}", value),
            Self::Real(value) => write!(f, "{:.6}", value),
            Self::String { value: Some(value), .. } => write!(f, "\"{}\"", Escaped::operand(value)),
            Self::String { index, value: None } => write!(f, "<out of range {}>", index),
            Self::Switch(header) => write!(
                f,
                "\n      type: {:02x} table: {:04x}-{:04x} deflt: {:04x}",
                header.table_type, header.table_start, header.table_end, header.default
            ),
        }
    }
}

impl fmt::Display for FunctionValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { name: Some(name), .. } => write!(f, "<local_fun> {}", name),
            Self::Local { index, name: None } => write!(f, "<local_fun> <out of range {}>", index),
            Self::Simul { name: Some(name), .. } => write!(f, "<simul_efun> \"{}\"", name),
            Self::Simul { index, name: None } => write!(f, "<simul_efun> <invalid {}>", index),
            Self::Efun { name: Some(name), .. } => write!(f, "<efun> {}", name),
            Self::Efun { index, name: None } => write!(f, "<efun> <invalid {}>", index),
            Self::Functional { args } => write!(f, "<functional, {} args>\nCode:", args),
            Self::Anonymous { args, locals, ends_at } => write!(
                f,
                "<anonymous function, {} args, {} locals, ends at {:04}>\nCode:",
                args, locals, ends_at
            ),
            Self::Unknown(kind) => write!(f, "<unknown function type {}>", kind),
        }
    }
}

/// A decoded instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction<'a> {
    /// Address of the opcode byte
    pub offset: usize,
    /// Opcode byte
    pub opcode: u8,
    /// Mnemonic
    pub mnemonic: &'a str,
    /// Decoded operand
    pub operand: Operand<'a>,
    /// Address of the next instruction in the same window
    pub next_offset: usize,
}

impl Instruction<'_> {
    /// Write the listing text, string operands byte for byte
    pub fn write_to<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        match &self.operand {
            Operand::String { value: Some(value), .. } => {
                write!(out, "{:04x}: {} \"", self.offset, self.mnemonic)?;
                Escaped::operand(value).write_raw(out)?;
                out.write_all(b"\"")
            }
            Operand::Class { name: Some(name), .. } => {
                write!(out, "{:04x}: {} ", self.offset, self.mnemonic)?;
                Escaped::operand(name).write_raw(out)
            }
            _ => write!(out, "{}", self),
        }
    }
}

impl fmt::Display for Instruction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}: {}", self.offset, self.mnemonic)?;
        match &self.operand {
            operand if operand.is_empty() => Ok(()),
            operand @ Operand::Switch(_) => write!(f, "{}", operand),
            operand => write!(f, " {}", operand),
        }
    }
}

/// Recoverable decoding problem rendered in-line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic<'a> {
    /// Opcode byte zero
    ZeroOpcode,
    /// Byte with no known encoding
    UnknownOpcode {
        /// The byte
        opcode: u8,
        /// Name reported by the opcode table
        name: &'a str,
    },
    /// Operand running past the end of the window
    Truncated,
    /// Switch nested deeper than the configured ceiling
    NestingTooDeep,
    /// Switch table outside its window
    MalformedSwitch,
}

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroOpcode => f.write_str("*** zero opcode ***"),
            Self::UnknownOpcode { opcode, name } => write!(f, "*** {} ({}) ***", name, opcode),
            Self::Truncated => f.write_str("*** truncated instruction ***"),
            Self::NestingTooDeep => f.write_str("*** switch nesting too deep ***"),
            Self::MalformedSwitch => f.write_str("*** malformed switch table ***"),
        }
    }
}

/// One item of a disassembly listing
#[derive(Debug, Clone, PartialEq)]
pub enum Record<'a> {
    /// Source position changed
    Location(SourceLocation<'a>),
    /// Cursor crossed the entry address of a local function
    FunctionStart {
        /// Local function index
        index: usize,
        /// Function name
        name: &'a str,
    },
    /// Decoded instruction
    Instruction(Instruction<'a>),
    /// Jump table of the switch at `offset` follows
    SwitchTableStart {
        /// Address of the switch opcode
        offset: usize,
    },
    /// Jump table entry
    SwitchEntry(SwitchEntry<'a>),
    /// Lowest key of a direct jump table
    SwitchMinimum(i32),
    /// Decoding problem at `offset`
    Diagnostic {
        /// Address where decoding stopped
        offset: usize,
        /// What went wrong
        diagnostic: Diagnostic<'a>,
    },
}

impl Record<'_> {
    /// Check if this is a diagnostic
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Diagnostic { .. })
    }

    /// Write the listing text without a line terminator
    pub fn write_to<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        match self {
            Self::Location(location) => {
                out.write_all(b"# ")?;
                location.write_to(out)
            }
            Self::Instruction(instruction) => instruction.write_to(out),
            Self::SwitchEntry(entry) => entry.write_to(out),
            other => write!(out, "{}", other),
        }
    }
}

impl fmt::Display for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location(location) => write!(f, "# {}", location),
            Self::FunctionStart { name, .. } => write!(f, "\n;; Function {}", name),
            Self::Instruction(instruction) => fmt::Display::fmt(instruction, f),
            Self::SwitchTableStart { offset } => write!(f, "      switch table (for {:04x})", offset),
            Self::SwitchEntry(entry) => fmt::Display::fmt(entry, f),
            Self::SwitchMinimum(value) => write!(f, "\tminval = {}", value),
            Self::Diagnostic { offset, diagnostic } => write!(f, "{:04x}: {}", offset, diagnostic),
        }
    }
}
