//! Instruction decoder
//!
//! [`Disassembler::decode`] walks a window of the instruction stream and
//! yields [`Record`]s lazily. Switch bodies are decoded as nested windows on
//! an explicit frame stack, so nesting depth is bounded by configuration
//! rather than by the call stack.
//!
//! Decoding never fails: out-of-range references render as placeholders,
//! and bytes that cannot be decoded produce a [`Diagnostic`] record.

use crate::config::DecoderConfig;
use crate::line_table::LineLookup;
use crate::record::{
    Diagnostic, FunctionValue, InheritedCall, Instruction, LoopBound, Operand, PushSlot, Record,
    SourceLocation, SwitchHeader,
};
use crate::switch::SwitchTable;
use lpc_bytecode::opcode::{foreach, function_kind, Encoding, OpcodeTable};
use lpc_bytecode::{BytecodeReader, DecodeError, Program};
use std::collections::VecDeque;
use std::iter::FusedIterator;

/// Name shown for an in-range function whose definition cannot be found
const UNRESOLVED: &str = "<unresolved>";

/// Name shown for bytes the opcode table does not know
const UNKNOWN: &str = "unknown";

/// Instruction decoder over one program
#[derive(Clone, Copy)]
pub struct Disassembler<'a> {
    cx: Context<'a>,
}

#[derive(Clone, Copy)]
struct Context<'a> {
    program: &'a Program,
    opcodes: &'a dyn OpcodeTable,
    config: DecoderConfig,
    line_lookup: Option<&'a dyn LineLookup>,
}

impl<'a> Disassembler<'a> {
    /// Create a decoder with the default configuration and no line lookup
    pub fn new(program: &'a Program, opcodes: &'a dyn OpcodeTable) -> Self {
        Self {
            cx: Context {
                program,
                opcodes,
                config: DecoderConfig::default(),
                line_lookup: None,
            },
        }
    }

    /// Use `config` for switch keys and nesting
    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.cx.config = config;
        self
    }

    /// Emit source location records from `lookup`
    pub fn with_line_lookup(mut self, lookup: &'a dyn LineLookup) -> Self {
        self.cx.line_lookup = Some(lookup);
        self
    }

    /// Decode the window `[start, end)`
    ///
    /// `end` is clamped to the program size. A window starting at zero also
    /// marks the entry of every locally defined function.
    pub fn decode(&self, start: usize, end: usize) -> Records<'a> {
        let end = end.min(self.cx.program.program_size());
        let start = start.min(end);
        tracing::debug!(
            program = %self.cx.program.filename,
            start,
            end,
            "decoding window"
        );

        let markers = (start == 0).then(|| FunctionMarkers::new(self.cx.program, end));
        Records {
            cx: self.cx,
            frames: vec![Frame {
                position: start,
                end,
                last_location: None,
                markers,
                table: None,
            }],
            pending: VecDeque::new(),
        }
    }

    /// Decode the whole program
    pub fn decode_all(&self) -> Records<'a> {
        self.decode(0, self.cx.program.program_size())
    }
}

/// Entry addresses of local functions, sorted, with a cursor
struct FunctionMarkers {
    entries: Vec<(usize, usize)>,
    next: usize,
}

impl FunctionMarkers {
    fn new(program: &Program, end: usize) -> Self {
        let mut entries: Vec<(usize, usize)> = (0..program.num_functions_defined())
            .filter_map(|index| {
                let function = program.local_function(index)?;
                let address = if function.has_no_code() {
                    end + 1
                } else {
                    function.address as usize
                };
                Some((address, index))
            })
            .collect();
        entries.sort_unstable();
        Self { entries, next: 0 }
    }
}

/// One decoding window
struct Frame<'a> {
    position: usize,
    end: usize,
    last_location: Option<SourceLocation<'a>>,
    markers: Option<FunctionMarkers>,
    /// Jump table printed once this window (a switch body) is exhausted
    table: Option<SwitchTable>,
}

/// Lazy sequence of records produced by [`Disassembler::decode`]
pub struct Records<'a> {
    cx: Context<'a>,
    frames: Vec<Frame<'a>>,
    pending: VecDeque<Record<'a>>,
}

impl<'a> Iterator for Records<'a> {
    type Item = Record<'a>;

    fn next(&mut self) -> Option<Record<'a>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(record);
            }

            let frame = self.frames.last()?;
            if frame.position >= frame.end {
                if let Some(frame) = self.frames.pop() {
                    if let Some(table) = frame.table {
                        let program = self.cx.program;
                        self.pending.extend(table.decode(
                            &program.byte_code,
                            program,
                            self.cx.config.switch_key_width,
                        ));
                    }
                }
                continue;
            }

            self.step();
        }
    }
}

impl FusedIterator for Records<'_> {}

impl<'a> Records<'a> {
    /// Decode one instruction of the innermost window
    fn step(&mut self) {
        let cx = self.cx;
        let depth = self.frames.len();
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        let offset = frame.position;

        if let Some(location) = cx.line_lookup.and_then(|lookup| lookup.location_of(offset)) {
            if frame.last_location != Some(location) {
                frame.last_location = Some(location);
                self.pending.push_back(Record::Location(location));
            }
        }

        if let Some(markers) = frame.markers.as_mut() {
            while let Some(&(address, index)) = markers.entries.get(markers.next) {
                if offset < address {
                    break;
                }
                markers.next += 1;
                if let Some(function) = cx.program.local_function(index) {
                    self.pending.push_back(Record::FunctionStart {
                        index,
                        name: function.name.as_str(),
                    });
                }
            }
        }

        let code: &'a [u8] = &cx.program.byte_code;
        let mut reader = BytecodeReader::at(&code[..frame.end], offset);
        let Ok(opcode) = reader.read_u8() else {
            frame.position = frame.end;
            return;
        };

        if opcode == 0 {
            self.pending.push_back(Record::Diagnostic {
                offset,
                diagnostic: Diagnostic::ZeroOpcode,
            });
            frame.position = offset + 1;
            return;
        }

        let mnemonic = cx.opcodes.name(opcode).unwrap_or(UNKNOWN);
        let Some(encoding) = cx.opcodes.encoding(opcode) else {
            self.pending.push_back(Record::Diagnostic {
                offset,
                diagnostic: Diagnostic::UnknownOpcode {
                    opcode,
                    name: mnemonic,
                },
            });
            frame.position = offset + 1;
            return;
        };

        if encoding == Encoding::Switch {
            let Ok((table_type, table_start, table_end, default)) = read_switch_header(&mut reader)
            else {
                truncated(frame, &mut self.pending, offset);
                return;
            };

            let base = offset + 1;
            let header = SwitchHeader {
                table_type,
                table_start: base + table_start as usize,
                table_end: base + table_end as usize,
                default: base + default as usize,
            };
            self.pending.push_back(Record::Instruction(Instruction {
                offset,
                opcode,
                mnemonic,
                operand: Operand::Switch(header),
                next_offset: header.table_end,
            }));

            let Some(table) =
                SwitchTable::locate(offset, table_type, table_start, table_end, frame.end)
            else {
                tracing::warn!(offset, "switch table outside its window");
                self.pending.push_back(Record::Diagnostic {
                    offset,
                    diagnostic: Diagnostic::MalformedSwitch,
                });
                frame.position = frame.end;
                return;
            };

            frame.position = table.end;
            if depth > cx.config.max_switch_depth {
                tracing::warn!(offset, depth, "switch nesting too deep");
                self.pending.push_back(Record::Diagnostic {
                    offset,
                    diagnostic: Diagnostic::NestingTooDeep,
                });
                return;
            }

            tracing::debug!(offset, depth, body_end = table.start, "decoding switch body");
            self.frames.push(Frame {
                position: table.body_start(),
                end: table.start,
                last_location: None,
                markers: None,
                table: Some(table),
            });
            return;
        }

        match decode_operand(&cx, &mut reader, encoding) {
            Ok(operand) => {
                let mnemonic = match operand {
                    Operand::Efun(index) | Operand::EfunV { index, .. } => {
                        cx.opcodes.efun_name(index).unwrap_or(mnemonic)
                    }
                    _ => mnemonic,
                };
                frame.position = reader.position();
                self.pending.push_back(Record::Instruction(Instruction {
                    offset,
                    opcode,
                    mnemonic,
                    operand,
                    next_offset: reader.position(),
                }));
            }
            Err(_) => truncated(frame, &mut self.pending, offset),
        }
    }
}

fn truncated<'a>(frame: &mut Frame<'a>, pending: &mut VecDeque<Record<'a>>, offset: usize) {
    tracing::warn!(offset, end = frame.end, "instruction runs past end of window");
    pending.push_back(Record::Diagnostic {
        offset,
        diagnostic: Diagnostic::Truncated,
    });
    frame.position = frame.end;
}

fn read_switch_header(reader: &mut BytecodeReader<'_>) -> Result<(u8, u16, u16, u16), DecodeError> {
    Ok((
        reader.read_u8()?,
        reader.read_u16()?,
        reader.read_u16()?,
        reader.read_u16()?,
    ))
}

/// Decode the operand of every encoding except `switch`
fn decode_operand<'a>(
    cx: &Context<'a>,
    reader: &mut BytecodeReader<'a>,
    encoding: Encoding,
) -> Result<Operand<'a>, DecodeError> {
    let program = cx.program;

    let operand = match encoding {
        Encoding::Bare | Encoding::Switch => Operand::None,
        Encoding::Push => {
            let count = reader.read_u8()?;
            let mut slots = Vec::with_capacity(count as usize);
            for _ in 0..count {
                slots.push(PushSlot::from_tag(reader.read_u8()?));
            }
            Operand::Push(slots)
        }
        Encoding::ForwardBranch => {
            let offset = reader.read_u16()?;
            let after = reader.position() as u16;
            Operand::Branch {
                offset,
                target: after.wrapping_add(offset),
            }
        }
        Encoding::BackwardBranch => {
            let offset = reader.read_u16()?;
            let after = reader.position() as u16;
            Operand::Branch {
                offset,
                target: after.wrapping_sub(offset),
            }
        }
        Encoding::Address => Operand::Address(reader.read_u16()?),
        Encoding::Count => Operand::Count(reader.read_u16()?),
        Encoding::Byte => Operand::Byte(reader.read_u8()?),
        Encoding::NegByte => Operand::NegByte(reader.read_u8()?),
        Encoding::Local => Operand::Local(reader.read_u8()?),
        Encoding::Global => {
            let index = reader.read_u8()?;
            let name = if (index as usize) < program.num_variables_total() {
                program.variable_name(index as usize)
            } else {
                None
            };
            Operand::Global { index, name }
        }
        Encoding::Foreach => {
            let flags = reader.read_u8()?;
            let left = reader.read_u8()?;
            let right = if flags & foreach::MAPPING != 0 {
                Some(reader.read_u8()?)
            } else {
                None
            };
            Operand::Foreach { flags, left, right }
        }
        Encoding::WhileDec => {
            let base = reader.position() as u16;
            let local = reader.read_u8()?;
            let offset = reader.read_u16()?;
            Operand::WhileDec {
                local,
                offset,
                target: base.wrapping_sub(offset),
            }
        }
        Encoding::LoopCondNumber | Encoding::LoopCondLocal => {
            let local = reader.read_u8()?;
            let bound = if encoding == Encoding::LoopCondNumber {
                LoopBound::Number(reader.read_i32()?)
            } else {
                LoopBound::Local(reader.read_u8()?)
            };
            let base = reader.position() as u16;
            let offset = reader.read_u16()?;
            Operand::LoopCond {
                local,
                bound,
                offset,
                target: base.wrapping_sub(offset),
            }
        }
        Encoding::CallByAddress => {
            let index = reader.read_u16()?;
            reader.skip(3)?;
            Operand::Call {
                index,
                name: local_function_name(program, index),
            }
        }
        Encoding::CallInherited => {
            let inherit = reader.read_u8()?;
            let index = reader.read_u16()?;
            reader.skip(3)?;
            let target = match program.inherits.get(inherit as usize) {
                None => InheritedCall::BadInherit,
                Some(link) => {
                    let ancestor: &'a Program = &link.program;
                    match local_function_name(ancestor, index) {
                        Some(name) => InheritedCall::Resolved {
                            filename: ancestor.filename.as_str(),
                            name,
                        },
                        None => InheritedCall::OutOfRange {
                            filename: ancestor.filename.as_str(),
                        },
                    }
                }
            };
            Operand::CallInherited {
                inherit,
                index,
                target,
            }
        }
        Encoding::SimulEfun => {
            let index = reader.read_u16()?;
            let args = reader.read_u8()?;
            let name = if (index as usize) < cx.opcodes.num_simul_efuns() {
                cx.opcodes.simul_efun_name(index)
            } else {
                None
            };
            Operand::SimulEfun { index, args, name }
        }
        Encoding::FunctionConstructor => {
            Operand::FunctionConstructor(decode_function_value(cx, reader)?)
        }
        Encoding::Efun => Operand::Efun(reader.read_u16()?),
        Encoding::EfunV => Operand::EfunV {
            index: reader.read_u16()?,
            args: reader.read_u8()?,
        },
        Encoding::ExpandVarargs => Operand::ExpandVarargs(reader.read_u8()?),
        Encoding::Class => {
            let index = reader.read_u8()?;
            Operand::Class {
                index,
                name: program.class_name(index as usize),
            }
        }
        Encoding::ShortInt => Operand::ShortInt(reader.read_i16()?),
        Encoding::Number => Operand::Number(reader.read_i64()?),
        Encoding::Real => Operand::Real(reader.read_f64()?),
        Encoding::String => {
            let index = reader.read_u16()?;
            Operand::String {
                index,
                value: program.string(index as usize),
            }
        }
        Encoding::ShortString => {
            let index = reader.read_u8()? as u16;
            Operand::String {
                index,
                value: program.string(index as usize),
            }
        }
    };
    Ok(operand)
}

fn decode_function_value<'a>(
    cx: &Context<'a>,
    reader: &mut BytecodeReader<'a>,
) -> Result<FunctionValue<'a>, DecodeError> {
    let kind = reader.read_u8()?;
    let value = match kind & function_kind::MASK {
        function_kind::LOCAL => {
            let index = reader.read_u16()?;
            FunctionValue::Local {
                index,
                name: local_function_name(cx.program, index),
            }
        }
        function_kind::SIMUL => {
            let index = reader.read_u16()?;
            FunctionValue::Simul {
                index,
                name: cx.opcodes.simul_efun_name(index),
            }
        }
        function_kind::EFUN => {
            let index = reader.read_u16()?;
            FunctionValue::Efun {
                index,
                name: cx.opcodes.efun_name(index),
            }
        }
        function_kind::FUNCTIONAL => {
            let args = reader.read_u8()?;
            reader.skip(2)?;
            FunctionValue::Functional { args }
        }
        function_kind::ANONYMOUS => {
            let operand_start = reader.position();
            let args = reader.read_u8()?;
            let locals = reader.read_u8()?;
            let length = reader.read_u16()?;
            FunctionValue::Anonymous {
                args,
                locals,
                ends_at: operand_start + 3 + length as usize,
            }
        }
        _ => FunctionValue::Unknown(kind),
    };
    Ok(value)
}

/// Name of a runtime function index, `None` when out of range
fn local_function_name(program: &Program, index: u16) -> Option<&str> {
    ((index as usize) < program.num_functions_total())
        .then(|| program.function_name(index as usize).unwrap_or(UNRESOLVED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_table::LineTable;
    use lpc_bytecode::opcode::switch_type;
    use lpc_bytecode::{
        flags, BytecodeWriter, FunctionEntry, Inherit, LineInfoWriter, Opcode, StandardOpcodes,
    };
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    fn program(code: Vec<u8>) -> Program {
        let mut program = Program::new("test.c");
        program.byte_code = code;
        program
    }

    fn lines(program: &Program, opcodes: &dyn OpcodeTable) -> Vec<String> {
        Disassembler::new(program, opcodes)
            .decode_all()
            .map(|r| r.to_string())
            .collect()
    }

    fn render(code: Vec<u8>) -> Vec<String> {
        lines(&program(code), &StandardOpcodes::new())
    }

    #[test]
    fn test_empty_range() {
        let program = program(vec![Opcode::Pop.to_u8(); 8]);
        let opcodes = StandardOpcodes::new();
        let disassembler = Disassembler::new(&program, &opcodes);
        assert_eq!(disassembler.decode(4, 4).count(), 0);
        assert_eq!(disassembler.decode(6, 2).count(), 0);
        assert_eq!(disassembler.decode(20, 30).count(), 0);
    }

    #[test]
    fn test_bare_and_immediate_operands() {
        let mut writer = BytecodeWriter::new();
        writer.emit_opcode(Opcode::Const1);
        writer.emit_with_u8(Opcode::Byte, 7);
        writer.emit_with_u8(Opcode::Nbyte, 3);
        writer.emit_short_int(-300);
        writer.emit_number(1 << 40);
        writer.emit_real(2.5);
        writer.emit_with_u16(Opcode::Aggregate, 12);
        writer.emit_with_u16(Opcode::Jump, 0x1234);
        writer.emit_with_u8(Opcode::Local, 4);
        writer.emit_with_u8(Opcode::ExpandVarargs, 2);

        assert_eq!(
            render(writer.into_bytes()),
            vec![
                "0000: const1",
                "0001: byte 7",
                "0003: nbyte -3",
                "0005: short_int short -300",
                "0008: number 1099511627776",
                "0011: real 2.500000",
                "001a: aggregate 12",
                "001d: jump 1234",
                "0020: local LV4",
                "0022: expand_varargs 2 from top of stack",
            ]
        );
    }

    #[test]
    fn test_push_operands() {
        let mut writer = BytecodeWriter::new();
        writer.emit_push(&[0x03, 0x41, 0x82, 0xc1]);
        writer.emit_push(&[]);
        assert_eq!(
            render(writer.into_bytes()),
            vec!["0000: push string 3, number 1, global 2, local 1", "0006: push"]
        );
    }

    #[test]
    fn test_branch_rendering() {
        let mut writer = BytecodeWriter::new();
        writer.emit_with_u16(Opcode::BranchWhenZero, 0x10);
        writer.emit_with_u16(Opcode::Bbranch, 0x03);
        assert_eq!(
            render(writer.into_bytes()),
            vec!["0000: branch_when_zero 0010 (0013)", "0003: bbranch 0003 (0003)"]
        );
    }

    #[test]
    fn test_branch_targets_round_trip() {
        let opcodes = StandardOpcodes::new();
        for offset in 0..=u16::MAX {
            let [lo, hi] = offset.to_le_bytes();
            for (opcode, forward) in [(Opcode::Branch, true), (Opcode::Bbranch, false)] {
                let program = program(vec![opcode.to_u8(), lo, hi]);
                let record = Disassembler::new(&program, &opcodes).decode_all().next();
                let Some(Record::Instruction(Instruction {
                    operand: Operand::Branch { offset: raw, target },
                    ..
                })) = record
                else {
                    panic!("expected a branch for offset {offset}");
                };
                assert_eq!(raw, offset);
                let recovered = if forward {
                    target.wrapping_sub(3)
                } else {
                    3u16.wrapping_sub(target)
                };
                assert_eq!(recovered, offset);
            }
        }
    }

    #[test]
    fn test_loop_operands() {
        let mut writer = BytecodeWriter::new();
        writer.emit_opcode(Opcode::Const0);
        // while_dec at 1, base 2
        writer.emit_opcode(Opcode::WhileDec);
        writer.emit_u8(3);
        writer.emit_u16(2);
        // loop_cond_number at 5, offset field at 11
        writer.emit_opcode(Opcode::LoopCondNumber);
        writer.emit_u8(1);
        writer.emit_i32(10);
        writer.emit_u16(11);
        // loop_cond_local at 13, offset field at 16
        writer.emit_opcode(Opcode::LoopCondLocal);
        writer.emit_u8(1);
        writer.emit_u8(2);
        writer.emit_u16(16);

        assert_eq!(
            render(writer.into_bytes()),
            vec![
                "0000: const0",
                "0001: while_dec LV3--, branch 0002 (0000)",
                "0005: loop_cond_number LV1 < 10 bbranch_when_non_zero 000b (0000)",
                "000d: loop_cond_local LV1 < LV2 bbranch_when_non_zero 0010 (0000)",
            ]
        );
    }

    #[test]
    fn test_foreach_operands() {
        let mut writer = BytecodeWriter::new();
        writer.emit_opcode(Opcode::Foreach);
        writer.emit_u8(0);
        writer.emit_u8(2);
        writer.emit_opcode(Opcode::Foreach);
        writer.emit_u8(foreach::MAPPING | foreach::RIGHT_GLOBAL);
        writer.emit_u8(0);
        writer.emit_u8(1);
        assert_eq!(
            render(writer.into_bytes()),
            vec!["0000: foreach (array) local 2", "0003: foreach (mapping) local 0, global 1"]
        );
    }

    #[test]
    fn test_string_operands() {
        let mut writer = BytecodeWriter::new();
        writer.emit_with_u16(Opcode::String, 1);
        writer.emit_with_u16(Opcode::String, 2);
        writer.emit_with_u8(Opcode::ShortString, 0);
        writer.emit_with_u8(Opcode::ShortString, 200);
        let mut program = program(writer.into_bytes());
        program.strings = vec![b"abc".to_vec(), b"a\nb".to_vec()];

        assert_eq!(
            lines(&program, &StandardOpcodes::new()),
            vec![
                "0000: string \"a\\nb\"",
                "0003: string <out of range 2>",
                "0006: short_string \"abc\"",
                "0008: short_string <out of range 200>",
            ]
        );
    }

    fn family() -> Program {
        let mut base = Program::new("std/base.c");
        base.byte_code = vec![Opcode::ReturnZero.to_u8(); 4];
        base.functions = vec![FunctionEntry::new("create", 0), FunctionEntry::new("reset", 2)];
        base.variables = vec!["name".to_string()];

        let mut child = Program::new("room.c");
        child.inherits = vec![Inherit {
            program: Arc::new(base),
            function_index_offset: 0,
            variable_index_offset: 0,
        }];
        child.functions = vec![
            FunctionEntry::inherited("create"),
            FunctionEntry::inherited("reset"),
            FunctionEntry::new("init", 0),
        ];
        child.last_inherited = 2;
        child.variables = vec!["exits".to_string()];
        child.strings = vec![b"point".to_vec()];
        child.classes = vec![lpc_bytecode::ClassDef { name: 0 }];
        child
    }

    #[test]
    fn test_calls_and_globals() {
        let mut writer = BytecodeWriter::new();
        writer.emit_call(1, 0);
        writer.emit_call(9, 0);
        writer.emit_call_inherited(0, 0, 0);
        writer.emit_call_inherited(0, 5, 0);
        writer.emit_call_inherited(3, 0, 0);
        writer.emit_with_u8(Opcode::Global, 0);
        writer.emit_with_u8(Opcode::GlobalLvalue, 1);
        writer.emit_with_u8(Opcode::Global, 2);
        writer.emit_with_u8(Opcode::NewClass, 0);
        writer.emit_with_u8(Opcode::NewEmptyClass, 4);

        let mut program = family();
        program.byte_code = writer.into_bytes();
        let text = lines(&program, &StandardOpcodes::new());

        // The first instruction is preceded by the marker for init
        assert_eq!(text[0], "\n;; Function init");
        assert_eq!(text[1], "0000: call_function_by_address reset            1");
        assert_eq!(text[2], "0006: call_function_by_address <out of range 9>");
        assert_eq!(
            text[3],
            format!("000c: call_inherited {:>30}::create           0", "std/base.c")
        );
        assert_eq!(
            text[4],
            format!("0013: call_inherited <out of range in {:>30} - 5>", "std/base.c")
        );
        assert_eq!(text[5], "001a: call_inherited <out of range inherit 3>");
        assert_eq!(text[6], "0021: global name");
        assert_eq!(text[7], "0023: global_lvalue exits");
        assert_eq!(text[8], "0025: global <out of range 2>");
        assert_eq!(text[9], "0027: new_class point");
        assert_eq!(text[10], "0029: new_empty_class <out of range 4>");
    }

    #[test]
    fn test_efuns_and_simul_efuns() {
        let mut writer = BytecodeWriter::new();
        writer.emit_with_u16(Opcode::Efun1, 1);
        writer.emit_with_u16(Opcode::EfunV, 0);
        writer.emit_u8(3);
        writer.emit_with_u16(Opcode::Efun0, 9);
        writer.emit_with_u16(Opcode::SimulEfun, 0);
        writer.emit_u8(2);
        writer.emit_with_u16(Opcode::SimulEfun, 4);
        writer.emit_u8(1);

        let opcodes = StandardOpcodes::with_names(
            vec!["write".to_string(), "say".to_string()],
            vec!["tell_object".to_string()],
        );
        assert_eq!(
            lines(&program(writer.into_bytes()), &opcodes),
            vec![
                "0000: say EFUN: 1",
                "0003: write EFUN_V ARGS: 3",
                "0007: efun0 EFUN: 9",
                "000a: simul_efun \"tell_object\" 2",
                "000e: simul_efun <invalid 4> 1",
            ]
        );
    }

    #[test]
    fn test_function_constructors() {
        let mut writer = BytecodeWriter::new();
        writer.emit_opcode(Opcode::FunctionConstructor);
        writer.emit_u8(function_kind::LOCAL);
        writer.emit_u16(2);
        writer.emit_opcode(Opcode::FunctionConstructor);
        writer.emit_u8(function_kind::EFUN);
        writer.emit_u16(0);
        writer.emit_opcode(Opcode::FunctionConstructor);
        writer.emit_u8(function_kind::FUNCTIONAL | function_kind::NOT_BINDABLE);
        writer.emit_u8(2);
        writer.emit_u16(0);
        writer.emit_opcode(Opcode::FunctionConstructor);
        writer.emit_u8(function_kind::ANONYMOUS);
        writer.emit_u8(1);
        writer.emit_u8(3);
        writer.emit_u16(2);
        writer.emit_opcode(Opcode::Return);
        writer.emit_opcode(Opcode::FunctionConstructor);
        writer.emit_u8(0x0e);

        let mut program = family();
        program.byte_code = writer.into_bytes();
        let opcodes = StandardOpcodes::with_names(vec!["write".to_string()], Vec::new());
        let text = lines(&program, &opcodes);

        assert_eq!(text[1], "0000: function_constructor <local_fun> init");
        assert_eq!(text[2], "0004: function_constructor <efun> write");
        assert_eq!(text[3], "0008: function_constructor <functional, 2 args>\nCode:");
        assert_eq!(
            text[4],
            "000d: function_constructor <anonymous function, 1 args, 3 locals, ends at 0020>\nCode:"
        );
        assert_eq!(text[5], "0013: return");
        assert_eq!(text[6], "0014: function_constructor <unknown function type 14>");
    }

    #[test]
    fn test_zero_and_unknown_opcodes() {
        assert_eq!(
            render(vec![0x00, 0xff, Opcode::Pop.to_u8()]),
            vec!["0000: *** zero opcode ***", "0001: *** unknown (255) ***", "0002: pop"]
        );
    }

    #[test]
    fn test_truncated_instruction_ends_window() {
        let code = vec![Opcode::Pop.to_u8(), Opcode::Number.to_u8(), 1, 2];
        assert_eq!(
            render(code),
            vec!["0000: pop", "0001: *** truncated instruction ***"]
        );
    }

    #[test]
    fn test_function_markers() {
        let mut writer = BytecodeWriter::new();
        writer.emit_opcode(Opcode::ReturnZero);
        writer.emit_opcode(Opcode::Const1);
        writer.emit_opcode(Opcode::Return);
        let mut program = program(writer.into_bytes());
        program.functions = vec![
            FunctionEntry::new("second", 1),
            FunctionEntry::new("proto", 0).with_flags(flags::PROTOTYPE),
            FunctionEntry::new("first", 0),
        ];
        let opcodes = StandardOpcodes::new();

        assert_eq!(
            lines(&program, &opcodes),
            vec![
                "\n;; Function first",
                "0000: return_zero",
                "\n;; Function second",
                "0001: const1",
                "0002: return",
            ]
        );

        // Windows not starting at zero carry no markers
        let partial: Vec<String> = Disassembler::new(&program, &opcodes)
            .decode(1, 3)
            .map(|r| r.to_string())
            .collect();
        assert_eq!(partial, vec!["0001: const1", "0002: return"]);
    }

    #[test]
    fn test_location_records() {
        let mut program = program(vec![Opcode::Pop.to_u8(); 6]);
        program.strings = vec![b"room.c".to_vec()];
        program.line_info = Some(
            LineInfoWriter::new(2)
                .file_segment(20, 1)
                .address_segment(4, 3)
                .address_segment(2, 7)
                .into_bytes(),
        );
        let table = LineTable::decode(&program, 2).unwrap();
        let opcodes = StandardOpcodes::new();
        let text: Vec<String> = Disassembler::new(&program, &opcodes)
            .with_line_lookup(&table)
            .decode_all()
            .map(|r| r.to_string())
            .collect();

        assert_eq!(text[0], "# room.c:3");
        assert_eq!(text[1], "0000: pop");
        assert_eq!(text[5], "# room.c:7");
        assert_eq!(text.len(), 8);
    }

    /// Direct switch at 0: body `const1; return` at 8..10, table 10..18
    fn direct_switch() -> Vec<u8> {
        let mut writer = BytecodeWriter::new();
        let base = writer.emit_switch(switch_type::DIRECT, 0, 0, 8);
        writer.emit_opcode(Opcode::Const1);
        writer.emit_opcode(Opcode::Return);
        let table_start = writer.offset() - base;
        writer.emit_u16(7);
        writer.emit_u16(8);
        writer.emit_i32(3);
        let table_end = writer.offset() - base;
        writer.patch_u16(base + 1, table_start as u16);
        writer.patch_u16(base + 3, table_end as u16);
        writer.emit_opcode(Opcode::ReturnZero);
        writer.into_bytes()
    }

    #[test]
    fn test_direct_switch() {
        assert_eq!(
            render(direct_switch()),
            vec![
                "0000: switch\n      type: fe table: 000a-0012 deflt: 0009",
                "0008: const1",
                "0009: return",
                "      switch table (for 0000)",
                "\t 0: 0008",
                "\t 1: 0009",
                "\tminval = 3",
                "0012: return_zero",
            ]
        );
    }

    /// Switch at 0 whose body holds a switch at 8; both tables direct
    fn nested_switch() -> Vec<u8> {
        let mut writer = BytecodeWriter::new();
        let outer = writer.emit_switch(switch_type::DIRECT, 0, 0, 0);
        let inner = writer.emit_switch(switch_type::DIRECT, 0, 0, 0);
        writer.emit_opcode(Opcode::Pop);
        writer.patch_u16(inner + 1, (writer.offset() - inner) as u16);
        writer.emit_i32(-1);
        writer.patch_u16(inner + 3, (writer.offset() - inner) as u16);
        writer.patch_u16(outer + 1, (writer.offset() - outer) as u16);
        writer.emit_i32(5);
        writer.patch_u16(outer + 3, (writer.offset() - outer) as u16);
        writer.into_bytes()
    }

    #[test]
    fn test_nested_switch() {
        let text = render(nested_switch());
        assert_eq!(text[0], "0000: switch\n      type: fe table: 0015-0019 deflt: 0001");
        assert_eq!(text[1], "0008: switch\n      type: fe table: 0011-0015 deflt: 0009");
        assert_eq!(text[2], "0010: pop");
        assert_eq!(text[3], "      switch table (for 0008)");
        assert_eq!(text[4], "\tminval = -1");
        assert_eq!(text[5], "      switch table (for 0000)");
        assert_eq!(text[6], "\tminval = 5");
        assert_eq!(text.len(), 7);
    }

    #[test]
    fn test_switch_nesting_ceiling() {
        let program = program(nested_switch());
        let opcodes = StandardOpcodes::new();
        let config = DecoderConfig {
            max_switch_depth: 1,
            ..DecoderConfig::default()
        };
        let text: Vec<String> = Disassembler::new(&program, &opcodes)
            .with_config(config)
            .decode_all()
            .map(|r| r.to_string())
            .collect();

        assert_eq!(text[2], "0008: *** switch nesting too deep ***");
        assert_eq!(text[3], "      switch table (for 0000)");
        assert_eq!(text.len(), 5);
    }

    #[test]
    fn test_malformed_switch() {
        let mut writer = BytecodeWriter::new();
        writer.emit_switch(switch_type::DIRECT, 9, 200, 0);
        writer.emit_opcode(Opcode::Pop);
        let text = render(writer.into_bytes());
        assert_eq!(text.len(), 2);
        assert_eq!(text[1], "0000: *** malformed switch table ***");
    }

    #[test]
    fn test_decoding_is_repeatable() {
        let program = program(direct_switch());
        let opcodes = StandardOpcodes::new();
        let disassembler = Disassembler::new(&program, &opcodes);
        let first: Vec<Record<'_>> = disassembler.decode_all().collect();
        let second: Vec<Record<'_>> = disassembler.decode_all().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_truncated_prefixes_never_panic() {
        let code = nested_switch();
        let opcodes = StandardOpcodes::new();
        for len in 0..=code.len() {
            let program = program(code[..len].to_vec());
            let records: Vec<Record<'_>> =
                Disassembler::new(&program, &opcodes).decode_all().collect();
            assert!(len == 0 || !records.is_empty());
        }
    }

    #[test]
    fn test_random_bytes_never_panic() {
        let mut rng = StdRng::seed_from_u64(0x1bc);
        let opcodes = StandardOpcodes::with_names(vec!["write".to_string()], vec!["tell".to_string()]);
        for _ in 0..500 {
            let len = rng.gen_range(0..256);
            let mut code = vec![0u8; len];
            rng.fill(&mut code[..]);

            let mut program = family();
            program.byte_code = code;
            let disassembler = Disassembler::new(&program, &opcodes);
            for record in disassembler.decode_all() {
                let _ = record.to_string();
            }
            let start = rng.gen_range(0..=len);
            assert!(disassembler.decode(start, len).count() <= 4 * len + 64);
        }
    }
}
