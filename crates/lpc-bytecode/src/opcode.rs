//! Bytecode opcodes for the LPC VM
//!
//! This module defines the instruction set understood by the disassembler and
//! the [`OpcodeTable`] capability that maps raw opcode bytes to mnemonics and
//! operand encodings.

use serde::{Deserialize, Serialize};

/// Bytecode opcode enumeration
///
/// All opcodes are single-byte instructions. The operand layout that follows
/// each opcode byte is described by its [`Encoding`].
///
/// Opcodes are organized into categories:
/// - 0x00: Reserved (zero sentinel, never emitted by the compiler)
/// - 0x01-0x0F: Stack manipulation & constants
/// - 0x10-0x1F: Variables, references & lvalues
/// - 0x20-0x2F: Arithmetic & bitwise
/// - 0x30-0x3F: Comparison
/// - 0x40-0x4F: Forward branches
/// - 0x50-0x5F: Backward branches & loops
/// - 0x60-0x6F: Jumps, catch & switch
/// - 0x70-0x7F: Function calls
/// - 0x80-0x8F: Classes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation & Constants (0x01-0x0F) =====
    /// Pop top value from stack
    Pop = 0x01,
    /// Push integer 0
    Const0 = 0x02,
    /// Push integer 1
    Const1 = 0x03,
    /// Push undefined
    Undefined = 0x04,
    /// Push several operands at once (operands: u8 count, count tag bytes)
    Push = 0x05,
    /// Push small positive integer (operand: u8)
    Byte = 0x06,
    /// Push small negative integer (operand: u8 magnitude)
    Nbyte = 0x07,
    /// Push 16-bit integer (operand: i16)
    ShortInt = 0x08,
    /// Push machine integer (operand: i64)
    Number = 0x09,
    /// Push float (operand: f64)
    Real = 0x0A,
    /// Push string from table (operand: u16 index)
    String = 0x0B,
    /// Push string from table (operand: u8 index)
    ShortString = 0x0C,
    /// Build array from stack (operand: u16 size)
    Aggregate = 0x0D,
    /// Build mapping from stack (operand: u16 size)
    AggregateAssoc = 0x0E,

    // ===== Variables, References & Lvalues (0x10-0x1F) =====
    /// Push local variable (operand: u8 slot)
    Local = 0x10,
    /// Push local variable lvalue (operand: u8 slot)
    LocalLvalue = 0x11,
    /// Move local variable onto stack (operand: u8 slot)
    TransferLocal = 0x12,
    /// Assign to local and discard (operand: u8 slot)
    VoidAssignLocal = 0x13,
    /// Push global variable (operand: u8 variable index)
    Global = 0x14,
    /// Push global variable lvalue (operand: u8 variable index)
    GlobalLvalue = 0x15,
    /// Push through reference (operand: u8 slot)
    Ref = 0x16,
    /// Push reference lvalue (operand: u8 slot)
    RefLvalue = 0x17,
    /// Create a reference (operand: u8 reference slot)
    MakeRef = 0x18,
    /// Kill references (operand: u8 count)
    KillRefs = 0x19,
    /// Load class member (operand: u8 member index)
    Member = 0x1A,
    /// Class member lvalue (operand: u8 member index)
    MemberLvalue = 0x1B,
    /// Index value: pop i, pop a, push a[i]
    Index = 0x1C,
    /// Index lvalue
    IndexLvalue = 0x1D,
    /// Assignment through lvalue
    Assign = 0x1E,
    /// Assignment through lvalue, result discarded
    VoidAssign = 0x1F,

    // ===== Arithmetic & Bitwise (0x20-0x2F) =====
    /// Addition: pop b, pop a, push a + b
    Add = 0x20,
    /// Subtraction: pop b, pop a, push a - b
    Subtract = 0x21,
    /// Multiplication: pop b, pop a, push a * b
    Multiply = 0x22,
    /// Division: pop b, pop a, push a / b
    Divide = 0x23,
    /// Modulo: pop b, pop a, push a % b
    Mod = 0x24,
    /// Negation: pop a, push -a
    Negate = 0x25,
    /// Pre-increment lvalue
    Inc = 0x26,
    /// Pre-decrement lvalue
    Dec = 0x27,
    /// Bitwise and
    And = 0x28,
    /// Bitwise or
    Or = 0x29,
    /// Bitwise xor
    Xor = 0x2A,
    /// Left shift
    Lsh = 0x2B,
    /// Right shift
    Rsh = 0x2C,
    /// Bitwise complement
    Compl = 0x2D,
    /// Logical not
    Not = 0x2E,

    // ===== Comparison (0x30-0x3F) =====
    /// Equality
    Eq = 0x30,
    /// Inequality
    Ne = 0x31,
    /// Less than
    Lt = 0x32,
    /// Less or equal
    Le = 0x33,
    /// Greater than
    Gt = 0x34,
    /// Greater or equal
    Ge = 0x35,

    // ===== Forward Branches (0x40-0x4F) =====
    /// Unconditional forward branch (operand: u16 offset)
    Branch = 0x40,
    /// Branch if zero (operand: u16 offset)
    BranchWhenZero = 0x41,
    /// Branch if non-zero (operand: u16 offset)
    BranchWhenNonZero = 0x42,
    /// Compare and branch if not equal (operand: u16 offset)
    BranchNe = 0x43,
    /// Compare and branch if greater or equal (operand: u16 offset)
    BranchGe = 0x44,
    /// Compare and branch if less or equal (operand: u16 offset)
    BranchLe = 0x45,
    /// Compare and branch if equal (operand: u16 offset)
    BranchEq = 0x46,
    /// Short-circuit or (operand: u16 offset)
    Lor = 0x47,
    /// Short-circuit and (operand: u16 offset)
    Land = 0x48,

    // ===== Backward Branches & Loops (0x50-0x5F) =====
    /// Unconditional backward branch (operand: u16 offset)
    Bbranch = 0x50,
    /// Backward branch if zero (operand: u16 offset)
    BbranchWhenZero = 0x51,
    /// Backward branch if non-zero (operand: u16 offset)
    BbranchWhenNonZero = 0x52,
    /// Compare and branch backward if less than (operand: u16 offset)
    BbranchLt = 0x53,
    /// Advance foreach iterator and branch back (operand: u16 offset)
    NextForeach = 0x54,
    /// Start foreach loop (operands: u8 flags, one or two u8 slots)
    Foreach = 0x55,
    /// Leave foreach loop
    ExitForeach = 0x56,
    /// Increment loop counter (operand: u8 slot)
    LoopIncr = 0x57,
    /// Decrement local and branch back while non-zero (operands: u8 slot, u16 offset)
    WhileDec = 0x58,
    /// Loop while local < constant (operands: u8 slot, i32 bound, u16 offset)
    LoopCondNumber = 0x59,
    /// Loop while local < local (operands: u8 slot, u8 slot, u16 offset)
    LoopCondLocal = 0x5A,

    // ===== Jumps, Catch & Switch (0x60-0x6F) =====
    /// Start catch block (operand: u16 address)
    Catch = 0x60,
    /// Absolute jump (operand: u16 address)
    Jump = 0x61,
    /// Absolute jump if zero (operand: u16 address)
    JumpWhenZero = 0x62,
    /// Absolute jump if non-zero (operand: u16 address)
    JumpWhenNonZero = 0x63,
    /// End catch block
    EndCatch = 0x64,
    /// Return from function
    Return = 0x65,
    /// Return zero from function
    ReturnZero = 0x66,
    /// Multi-way branch (operands: u8 type, u16 table start, u16 table end, u16 default)
    Switch = 0x67,

    // ===== Function Calls (0x70-0x7F) =====
    /// Call local or inherited function (operands: u16 index, 3 trailing bytes)
    CallFunctionByAddress = 0x70,
    /// Call function in an explicit ancestor (operands: u8 inherit, u16 index, 3 trailing bytes)
    CallInherited = 0x71,
    /// Call simulated built-in (operands: u16 index, u8 args)
    SimulEfun = 0x72,
    /// Build function value (operands: u8 kind, kind-specific)
    FunctionConstructor = 0x73,
    /// Call built-in with no arguments (operand: u16 efun)
    Efun0 = 0x74,
    /// Call built-in with one argument (operand: u16 efun)
    Efun1 = 0x75,
    /// Call built-in with two arguments (operand: u16 efun)
    Efun2 = 0x76,
    /// Call built-in with three arguments (operand: u16 efun)
    Efun3 = 0x77,
    /// Call variadic built-in (operands: u16 efun, u8 args)
    EfunV = 0x78,
    /// Expand varargs array onto stack (operand: u8 depth)
    ExpandVarargs = 0x79,
    /// sscanf (operand: u8 args)
    Sscanf = 0x7A,
    /// parse_command (operand: u8 args)
    ParseCommand = 0x7B,

    // ===== Classes (0x80-0x8F) =====
    /// Build class instance from stack (operand: u8 class index)
    NewClass = 0x80,
    /// Build empty class instance (operand: u8 class index)
    NewEmptyClass = 0x81,
}

/// Operand encoding family of an opcode
///
/// Each family consumes a fixed, known layout of bytes after the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// No operands
    Bare,
    /// u8 count followed by `count` tag bytes
    Push,
    /// u16 offset, target after the operand plus offset
    ForwardBranch,
    /// u16 offset, target after the operand minus offset
    BackwardBranch,
    /// u16 rendered verbatim
    Address,
    /// u16 aggregate size
    Count,
    /// u8 rendered as a decimal
    Byte,
    /// u8 rendered as a negative decimal
    NegByte,
    /// u8 local slot
    Local,
    /// u8 global variable index
    Global,
    /// u8 flags then one or two u8 slots
    Foreach,
    /// u8 slot, u16 backward offset
    WhileDec,
    /// u8 slot, i32 bound, u16 backward offset
    LoopCondNumber,
    /// u8 slot, u8 slot, u16 backward offset
    LoopCondLocal,
    /// u16 function index, 3 trailing bytes
    CallByAddress,
    /// u8 inherit, u16 function index, 3 trailing bytes
    CallInherited,
    /// u16 simul_efun index, u8 args
    SimulEfun,
    /// u8 kind, kind-specific payload
    FunctionConstructor,
    /// u16 efun index
    Efun,
    /// u16 efun index, u8 args
    EfunV,
    /// u8 depth
    ExpandVarargs,
    /// u8 class index
    Class,
    /// i16
    ShortInt,
    /// i64
    Number,
    /// f64
    Real,
    /// u16 string index
    String,
    /// u8 string index
    ShortString,
    /// Switch header followed by body and jump table
    Switch,
}

impl Opcode {
    /// Every opcode, in numeric order
    pub const ALL: &'static [Opcode] = &[
        Self::Pop,
        Self::Const0,
        Self::Const1,
        Self::Undefined,
        Self::Push,
        Self::Byte,
        Self::Nbyte,
        Self::ShortInt,
        Self::Number,
        Self::Real,
        Self::String,
        Self::ShortString,
        Self::Aggregate,
        Self::AggregateAssoc,
        Self::Local,
        Self::LocalLvalue,
        Self::TransferLocal,
        Self::VoidAssignLocal,
        Self::Global,
        Self::GlobalLvalue,
        Self::Ref,
        Self::RefLvalue,
        Self::MakeRef,
        Self::KillRefs,
        Self::Member,
        Self::MemberLvalue,
        Self::Index,
        Self::IndexLvalue,
        Self::Assign,
        Self::VoidAssign,
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::Mod,
        Self::Negate,
        Self::Inc,
        Self::Dec,
        Self::And,
        Self::Or,
        Self::Xor,
        Self::Lsh,
        Self::Rsh,
        Self::Compl,
        Self::Not,
        Self::Eq,
        Self::Ne,
        Self::Lt,
        Self::Le,
        Self::Gt,
        Self::Ge,
        Self::Branch,
        Self::BranchWhenZero,
        Self::BranchWhenNonZero,
        Self::BranchNe,
        Self::BranchGe,
        Self::BranchLe,
        Self::BranchEq,
        Self::Lor,
        Self::Land,
        Self::Bbranch,
        Self::BbranchWhenZero,
        Self::BbranchWhenNonZero,
        Self::BbranchLt,
        Self::NextForeach,
        Self::Foreach,
        Self::ExitForeach,
        Self::LoopIncr,
        Self::WhileDec,
        Self::LoopCondNumber,
        Self::LoopCondLocal,
        Self::Catch,
        Self::Jump,
        Self::JumpWhenZero,
        Self::JumpWhenNonZero,
        Self::EndCatch,
        Self::Return,
        Self::ReturnZero,
        Self::Switch,
        Self::CallFunctionByAddress,
        Self::CallInherited,
        Self::SimulEfun,
        Self::FunctionConstructor,
        Self::Efun0,
        Self::Efun1,
        Self::Efun2,
        Self::Efun3,
        Self::EfunV,
        Self::ExpandVarargs,
        Self::Sscanf,
        Self::ParseCommand,
        Self::NewClass,
        Self::NewEmptyClass,
    ];

    /// Decode an opcode byte
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.to_u8() == byte)
    }

    /// Raw opcode byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Mnemonic as printed by the disassembler
    pub fn name(self) -> &'static str {
        match self {
            Self::Pop => "pop",
            Self::Const0 => "const0",
            Self::Const1 => "const1",
            Self::Undefined => "undefined",
            Self::Push => "push",
            Self::Byte => "byte",
            Self::Nbyte => "nbyte",
            Self::ShortInt => "short_int",
            Self::Number => "number",
            Self::Real => "real",
            Self::String => "string",
            Self::ShortString => "short_string",
            Self::Aggregate => "aggregate",
            Self::AggregateAssoc => "aggregate_assoc",
            Self::Local => "local",
            Self::LocalLvalue => "local_lvalue",
            Self::TransferLocal => "transfer_local",
            Self::VoidAssignLocal => "void_assign_local",
            Self::Global => "global",
            Self::GlobalLvalue => "global_lvalue",
            Self::Ref => "ref",
            Self::RefLvalue => "ref_lvalue",
            Self::MakeRef => "make_ref",
            Self::KillRefs => "kill_refs",
            Self::Member => "member",
            Self::MemberLvalue => "member_lvalue",
            Self::Index => "index",
            Self::IndexLvalue => "index_lvalue",
            Self::Assign => "assign",
            Self::VoidAssign => "void_assign",
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Mod => "mod",
            Self::Negate => "negate",
            Self::Inc => "inc",
            Self::Dec => "dec",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Lsh => "lsh",
            Self::Rsh => "rsh",
            Self::Compl => "compl",
            Self::Not => "not",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Branch => "branch",
            Self::BranchWhenZero => "branch_when_zero",
            Self::BranchWhenNonZero => "branch_when_non_zero",
            Self::BranchNe => "branch_ne",
            Self::BranchGe => "branch_ge",
            Self::BranchLe => "branch_le",
            Self::BranchEq => "branch_eq",
            Self::Lor => "lor",
            Self::Land => "land",
            Self::Bbranch => "bbranch",
            Self::BbranchWhenZero => "bbranch_when_zero",
            Self::BbranchWhenNonZero => "bbranch_when_non_zero",
            Self::BbranchLt => "bbranch_lt",
            Self::NextForeach => "next_foreach",
            Self::Foreach => "foreach",
            Self::ExitForeach => "exit_foreach",
            Self::LoopIncr => "loop_incr",
            Self::WhileDec => "while_dec",
            Self::LoopCondNumber => "loop_cond_number",
            Self::LoopCondLocal => "loop_cond_local",
            Self::Catch => "catch",
            Self::Jump => "jump",
            Self::JumpWhenZero => "jump_when_zero",
            Self::JumpWhenNonZero => "jump_when_non_zero",
            Self::EndCatch => "end_catch",
            Self::Return => "return",
            Self::ReturnZero => "return_zero",
            Self::Switch => "switch",
            Self::CallFunctionByAddress => "call_function_by_address",
            Self::CallInherited => "call_inherited",
            Self::SimulEfun => "simul_efun",
            Self::FunctionConstructor => "function_constructor",
            Self::Efun0 => "efun0",
            Self::Efun1 => "efun1",
            Self::Efun2 => "efun2",
            Self::Efun3 => "efun3",
            Self::EfunV => "efunv",
            Self::ExpandVarargs => "expand_varargs",
            Self::Sscanf => "sscanf",
            Self::ParseCommand => "parse_command",
            Self::NewClass => "new_class",
            Self::NewEmptyClass => "new_empty_class",
        }
    }

    /// Operand encoding family
    pub fn encoding(self) -> Encoding {
        match self {
            Self::Push => Encoding::Push,
            Self::Byte
            | Self::MakeRef
            | Self::KillRefs
            | Self::Member
            | Self::MemberLvalue
            | Self::Sscanf
            | Self::ParseCommand => Encoding::Byte,
            Self::Nbyte => Encoding::NegByte,
            Self::ShortInt => Encoding::ShortInt,
            Self::Number => Encoding::Number,
            Self::Real => Encoding::Real,
            Self::String => Encoding::String,
            Self::ShortString => Encoding::ShortString,
            Self::Aggregate | Self::AggregateAssoc => Encoding::Count,
            Self::Local
            | Self::LocalLvalue
            | Self::TransferLocal
            | Self::VoidAssignLocal
            | Self::Ref
            | Self::RefLvalue
            | Self::LoopIncr => Encoding::Local,
            Self::Global | Self::GlobalLvalue => Encoding::Global,
            Self::Branch
            | Self::BranchWhenZero
            | Self::BranchWhenNonZero
            | Self::BranchNe
            | Self::BranchGe
            | Self::BranchLe
            | Self::BranchEq
            | Self::Lor
            | Self::Land => Encoding::ForwardBranch,
            Self::Bbranch
            | Self::BbranchWhenZero
            | Self::BbranchWhenNonZero
            | Self::BbranchLt
            | Self::NextForeach => Encoding::BackwardBranch,
            Self::Foreach => Encoding::Foreach,
            Self::WhileDec => Encoding::WhileDec,
            Self::LoopCondNumber => Encoding::LoopCondNumber,
            Self::LoopCondLocal => Encoding::LoopCondLocal,
            Self::Catch | Self::Jump | Self::JumpWhenZero | Self::JumpWhenNonZero => {
                Encoding::Address
            }
            Self::Switch => Encoding::Switch,
            Self::CallFunctionByAddress => Encoding::CallByAddress,
            Self::CallInherited => Encoding::CallInherited,
            Self::SimulEfun => Encoding::SimulEfun,
            Self::FunctionConstructor => Encoding::FunctionConstructor,
            Self::Efun0 | Self::Efun1 | Self::Efun2 | Self::Efun3 => Encoding::Efun,
            Self::EfunV => Encoding::EfunV,
            Self::ExpandVarargs => Encoding::ExpandVarargs,
            Self::NewClass | Self::NewEmptyClass => Encoding::Class,
            _ => Encoding::Bare,
        }
    }
}

/// Operand classes of a `push` tag byte (high two bits)
pub mod push {
    /// Mask selecting the operand class
    pub const WHAT: u8 = 0xc0;
    /// Mask selecting the operand index
    pub const MASK: u8 = 0x3f;
    /// String table index
    pub const STRING: u8 = 0 << 6;
    /// Small integer
    pub const NUMBER: u8 = 1 << 6;
    /// Global variable
    pub const GLOBAL: u8 = 2 << 6;
    /// Local slot
    pub const LOCAL: u8 = 3 << 6;
}

/// Flag bits of a `foreach` operand
pub mod foreach {
    /// Left operand is a global variable
    pub const LEFT_GLOBAL: u8 = 0x01;
    /// Right operand is a global variable
    pub const RIGHT_GLOBAL: u8 = 0x02;
    /// One operand is bound by reference
    pub const REF: u8 = 0x04;
    /// Iterating a mapping (two slots follow)
    pub const MAPPING: u8 = 0x08;
}

/// Kinds of `function_constructor` operands
pub mod function_kind {
    /// Bound to a local function
    pub const LOCAL: u8 = 2;
    /// Bound to a simulated built-in
    pub const SIMUL: u8 = 3;
    /// Bound to a built-in
    pub const EFUN: u8 = 4;
    /// Unbound closure with inline body
    pub const FUNCTIONAL: u8 = 5;
    /// Anonymous closure with inline body and locals
    pub const ANONYMOUS: u8 = 6;
    /// Mask selecting the kind
    pub const MASK: u8 = 0x0f;
    /// Function value cannot be rebound
    pub const NOT_BINDABLE: u8 = 0x10;
}

/// Switch table type tags
pub mod switch_type {
    /// Dense jump table indexed from a minimum value
    pub const DIRECT: u8 = 0xfe;
    /// High nibble marking integer keys
    pub const NUMERIC_NIBBLE: u8 = 0x0f;
}

/// Opcode metadata capability injected into the decoder
///
/// Implementations must be immutable for the lifetime of a decode.
pub trait OpcodeTable {
    /// Mnemonic for an opcode byte
    fn name(&self, opcode: u8) -> Option<&str>;

    /// Operand encoding for an opcode byte, `None` if unrecognized
    fn encoding(&self, opcode: u8) -> Option<Encoding>;

    /// Name of a built-in function
    fn efun_name(&self, index: u16) -> Option<&str>;

    /// Name of a simulated built-in function
    fn simul_efun_name(&self, index: u16) -> Option<&str>;

    /// Number of simulated built-ins currently defined
    fn num_simul_efuns(&self) -> usize;
}

/// The instruction set defined by [`Opcode`] with injected built-in names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardOpcodes {
    /// Built-in function names, indexed by efun number
    pub efuns: Vec<String>,
    /// Simulated built-in names, indexed by simul_efun number
    pub simul_efuns: Vec<String>,
}

impl StandardOpcodes {
    /// Create a table with no built-in names
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with the given built-in and simulated built-in names
    pub fn with_names(efuns: Vec<String>, simul_efuns: Vec<String>) -> Self {
        Self { efuns, simul_efuns }
    }
}

impl OpcodeTable for StandardOpcodes {
    fn name(&self, opcode: u8) -> Option<&str> {
        Opcode::from_u8(opcode).map(Opcode::name)
    }

    fn encoding(&self, opcode: u8) -> Option<Encoding> {
        Opcode::from_u8(opcode).map(Opcode::encoding)
    }

    fn efun_name(&self, index: u16) -> Option<&str> {
        self.efuns.get(index as usize).map(String::as_str)
    }

    fn simul_efun_name(&self, index: u16) -> Option<&str> {
        self.simul_efuns.get(index as usize).map(String::as_str)
    }

    fn num_simul_efuns(&self) -> usize {
        self.simul_efuns.len()
    }
}
