//! Program dump report
//!
//! [`ProgramDump`] renders the symbol tables of a program, optionally
//! followed by its disassembly and line-number tables.

use crate::config::{DecoderConfig, DumpOptions};
use crate::decoder::Disassembler;
use crate::line_table::{LineInfoError, LineTable};
use crate::text::Escaped;
use lpc_bytecode::opcode::OpcodeTable;
use lpc_bytecode::{flags, Program};
use std::fmt;
use std::io;

/// Bytes per row of the raw program listing
const BYTES_PER_ROW: usize = 16;

/// Full report for one program
pub struct ProgramDump<'a> {
    program: &'a Program,
    opcodes: &'a dyn OpcodeTable,
    options: DumpOptions,
    config: DecoderConfig,
}

impl<'a> ProgramDump<'a> {
    /// Create a report with the default decoder configuration
    pub fn new(program: &'a Program, opcodes: &'a dyn OpcodeTable, options: DumpOptions) -> Self {
        Self {
            program,
            opcodes,
            options,
            config: DecoderConfig::default(),
        }
    }

    /// Use `config` for the disassembly and line-table sections
    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Write the report
    ///
    /// Program strings and file names are written byte for byte, with only
    /// newlines escaped.
    pub fn write_to<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "NAME: /{}", self.program.filename)?;
        self.write_inherits(out)?;
        self.write_program(out)?;
        self.write_functions(out)?;
        self.write_variables(out)?;
        self.write_strings(out)?;
        if self.options.disassemble {
            self.write_disassembly(out)?;
        }
        if self.options.line_numbers {
            self.write_line_numbers(out)?;
        }
        Ok(())
    }

    /// Report lines, without terminators, in lossy UTF-8
    pub fn lines(&self) -> Vec<String> {
        self.to_string().lines().map(String::from).collect()
    }

    fn line_table(&self) -> Result<LineTable, LineInfoError> {
        LineTable::decode(self.program, self.config.line_address_width)
    }

    fn write_inherits<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "INHERITS:")?;
        writeln!(out, "\tname                    fio    vio")?;
        writeln!(out, "\t----------------        ---    ---")?;
        for inherit in &self.program.inherits {
            writeln!(
                out,
                "\t{:<20}  {:>5}  {:>5}",
                inherit.program.filename, inherit.function_index_offset, inherit.variable_index_offset
            )?;
        }
        Ok(())
    }

    fn write_program<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "PROGRAM:")?;
        for (row, chunk) in self.program.byte_code.chunks(BYTES_PER_ROW).enumerate() {
            write!(out, "\n\t{:04x}:", row * BYTES_PER_ROW)?;
            for byte in chunk {
                write!(out, " {:02x}", byte)?;
            }
        }
        writeln!(out)
    }

    fn write_functions<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let program = self.program;
        writeln!(out, "FUNCTIONS:")?;
        writeln!(out, "      name                  offset  flags  fio  # locals  # args")?;
        writeln!(out, "      --------------------- ------ ------- ---  --------  ------")?;

        for (index, slot) in program.functions.iter().enumerate() {
            let runtime = slot.runtime_index(index);
            let entry = program.functions.get(runtime).unwrap_or(slot);
            let name = program.function_name(index).unwrap_or(slot.name.as_str());
            let flag_string = flag_string(slot.flags, entry.flags);

            if entry.is_inherited() {
                let (ancestor, ancestor_index) = match program.find_inherit(runtime) {
                    Some(position) => (
                        position as i64,
                        runtime as i64 - program.inherits[position].function_index_offset as i64,
                    ),
                    None => (-1, runtime as i64),
                };
                writeln!(
                    out,
                    "{:>4}: {:<20}  {:>5}  {:>7} {:>5}",
                    index, name, ancestor, flag_string, ancestor_index
                )?;
            } else {
                let local_index = runtime as i64 - program.last_inherited as i64;
                let definition = program.resolve_function(index).map_or(entry, |(_, e)| e);
                // Argument count first, whatever the header says
                writeln!(
                    out,
                    "{:>4}: {:<20}  {:>5}  {:>7}      {:>7}   {:>5}",
                    index, name, local_index, flag_string, definition.num_args, definition.num_locals
                )?;
            }
        }
        Ok(())
    }

    fn write_variables<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "VARIABLES:")?;
        for (index, name) in self.program.variables.iter().enumerate() {
            writeln!(out, "{:>4}: {:<12}", index, name)?;
        }
        Ok(())
    }

    fn write_strings<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "STRINGS:")?;
        for (index, string) in self.program.strings.iter().enumerate() {
            write!(out, "{:>4}: ", index)?;
            Escaped::listing(string).write_raw(out)?;
            writeln!(out)?;
        }
        Ok(())
    }

    fn write_disassembly<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "\n;;;  *** Disassembly ***")?;
        let table = self.line_table().ok();
        let mut disassembler = Disassembler::new(self.program, self.opcodes).with_config(self.config);
        if let Some(table) = table.as_ref() {
            disassembler = disassembler.with_line_lookup(table);
        }
        for record in disassembler.decode_all() {
            record.write_to(out)?;
            writeln!(out)?;
        }
        Ok(())
    }

    fn write_line_numbers<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "\n;;;  *** Line Number Info ***")?;
        match self.line_table() {
            Ok(table) => table.write_to(out),
            Err(LineInfoError::Missing) => writeln!(out, "{}", LineInfoError::Missing),
            Err(err) => {
                tracing::warn!(program = %self.program.filename, error = %err, "unreadable line table");
                writeln!(out, "{}: {}", LineInfoError::Missing, err)
            }
        }
    }
}

/// Lossy: bytes that are not UTF-8 are replaced
impl fmt::Display for ProgramDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::new();
        self.write_to(&mut out).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&out))
    }
}

/// Seven-column flag summary
///
/// `a` comes from the slot itself, every other letter from the slot an alias
/// points at.
pub fn flag_string(slot_flags: u16, real_flags: u16) -> String {
    let column = |set: bool, letter: char| if set { letter } else { '-' };
    [
        column(real_flags & flags::INHERITED != 0, 'i'),
        column(real_flags & flags::UNDEFINED != 0, 'u'),
        column(real_flags & flags::STRICT_TYPES != 0, 's'),
        column(real_flags & flags::PROTOTYPE != 0, 'p'),
        column(slot_flags & flags::ALIAS != 0, 'a'),
        column(real_flags & flags::TRUE_VARARGS != 0, 'V'),
        column(real_flags & flags::VARARGS != 0, 'v'),
    ]
    .iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpc_bytecode::{
        BytecodeWriter, FunctionEntry, Inherit, LineInfoWriter, Opcode, StandardOpcodes,
    };
    use std::sync::Arc;

    fn sample() -> Program {
        let mut base = Program::new("std/base.c");
        base.byte_code = vec![Opcode::ReturnZero.to_u8(); 2];
        base.functions = vec![FunctionEntry::new("create", 0), FunctionEntry::new("reset", 1)];
        base.variables = vec!["name".to_string()];

        let mut writer = BytecodeWriter::new();
        writer.emit_with_u16(Opcode::String, 0);
        writer.emit_opcode(Opcode::Return);

        let mut program = Program::new("d/room.c");
        program.byte_code = writer.into_bytes();
        program.inherits = vec![Inherit {
            program: Arc::new(base),
            function_index_offset: 0,
            variable_index_offset: 0,
        }];
        program.functions = vec![
            FunctionEntry::inherited("create"),
            FunctionEntry::inherited("reset"),
            FunctionEntry::new("short", 0)
                .with_counts(1, 2)
                .with_flags(flags::STRICT_TYPES | flags::VARARGS),
            FunctionEntry::alias("setup", 1),
        ];
        program.last_inherited = 2;
        program.variables = vec!["exits".to_string()];
        program.strings = vec![b"d/room.c".to_vec(), b"a\nb\0hidden".to_vec()];
        program.line_info = Some(
            LineInfoWriter::new(2)
                .file_segment(8, 1)
                .address_segment(4, 5)
                .into_bytes(),
        );
        program
    }

    #[test]
    fn test_flag_string() {
        assert_eq!(flag_string(0, 0), "-------");
        assert_eq!(flag_string(flags::ALIAS, flags::INHERITED), "i---a--");
        assert_eq!(
            flag_string(0, flags::UNDEFINED | flags::PROTOTYPE | flags::TRUE_VARARGS),
            "-u-p-V-"
        );
        assert_eq!(flag_string(0, flags::STRICT_TYPES | flags::VARARGS), "--s---v");
    }

    #[test]
    fn test_tables_only() {
        let program = sample();
        let opcodes = StandardOpcodes::new();
        let lines = ProgramDump::new(&program, &opcodes, DumpOptions::tables_only()).lines();

        let expected = vec![
            "NAME: /d/room.c".to_string(),
            "INHERITS:".to_string(),
            "\tname                    fio    vio".to_string(),
            "\t----------------        ---    ---".to_string(),
            format!("\t{:<20}  {:>5}  {:>5}", "std/base.c", 0, 0),
            "PROGRAM:".to_string(),
            "\t0000: 0b 00 00 65".to_string(),
            "FUNCTIONS:".to_string(),
            "      name                  offset  flags  fio  # locals  # args".to_string(),
            "      --------------------- ------ ------- ---  --------  ------".to_string(),
            format!("{:>4}: {:<20}  {:>5}  {:>7} {:>5}", 0, "create", 0, "i------", 0),
            format!("{:>4}: {:<20}  {:>5}  {:>7} {:>5}", 1, "reset", 0, "i------", 1),
            format!("{:>4}: {:<20}  {:>5}  {:>7}      {:>7}   {:>5}", 2, "short", 0, "--s---v", 1, 2),
            format!("{:>4}: {:<20}  {:>5}  {:>7} {:>5}", 3, "reset", 0, "i---a--", 1),
            "VARIABLES:".to_string(),
            "   0: exits       ".to_string(),
            "STRINGS:".to_string(),
            "   0: d/room.c".to_string(),
            "   1: a\\nb".to_string(),
        ];
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_program_rows() {
        let mut program = Program::new("big.c");
        program.byte_code = (0u8..20).collect();
        let opcodes = StandardOpcodes::new();
        let lines = ProgramDump::new(&program, &opcodes, DumpOptions::tables_only()).lines();
        let start = lines.iter().position(|l| l == "PROGRAM:").unwrap();
        assert_eq!(
            lines[start + 1],
            "\t0000: 00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f"
        );
        assert_eq!(lines[start + 2], "\t0010: 10 11 12 13");
        assert_eq!(lines[start + 3], "FUNCTIONS:");
    }

    #[test]
    fn test_full_dump() {
        let program = sample();
        let opcodes = StandardOpcodes::new();
        let text = ProgramDump::new(&program, &opcodes, DumpOptions::full()).to_string();

        let disassembly = text.find("\n;;;  *** Disassembly ***\n").unwrap();
        let line_info = text.find("\n;;;  *** Line Number Info ***\n").unwrap();
        assert!(disassembly < line_info);

        let listing = &text[disassembly..line_info];
        assert!(listing.contains("# d/room.c:5\n"));
        assert!(listing.contains("\n;; Function short\n0000: string \"d/room.c\"\n0003: return\n"));

        assert!(text.ends_with(
            "\nabsolute line -> (file, line) table:\n\
             8 lines from 1 [d/room.c]\n\
             \naddress -> absolute line table:\n\
             0000-0003: 5\n"
        ));
    }

    #[test]
    fn test_missing_line_info() {
        let mut program = sample();
        program.line_info = None;
        let opcodes = StandardOpcodes::new();
        let options = DumpOptions {
            disassemble: true,
            line_numbers: true,
        };
        let lines = ProgramDump::new(&program, &opcodes, options).lines();
        assert_eq!(lines.last().map(String::as_str), Some("Failed to load line numbers"));
        // Disassembly still works without locations
        assert!(lines.iter().all(|l| !l.starts_with("# ")));
        assert!(lines.iter().any(|l| l == "0003: return"));
    }

    #[test]
    fn test_write_to_matches_display() {
        let program = sample();
        let opcodes = StandardOpcodes::new();
        let dump = ProgramDump::new(&program, &opcodes, DumpOptions::full());
        let mut out = Vec::new();
        dump.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), dump.to_string());
    }

    #[test]
    fn test_local_row_lists_args_before_locals() {
        let mut program = Program::new("counts.c");
        program.byte_code = vec![Opcode::ReturnZero.to_u8()];
        program.functions = vec![FunctionEntry::new("f", 0).with_counts(1, 2)];
        let opcodes = StandardOpcodes::new();
        let lines = ProgramDump::new(&program, &opcodes, DumpOptions::tables_only()).lines();
        let row = lines.iter().find(|l| l.starts_with("   0: f")).unwrap();
        assert!(row.ends_with("      1       2"), "{:?}", row);
    }

    #[test]
    fn test_write_to_keeps_raw_string_bytes() {
        let mut program = sample();
        program.strings[1] = b"caf\xe9\n".to_vec();
        let opcodes = StandardOpcodes::new();
        let dump = ProgramDump::new(&program, &opcodes, DumpOptions::full());

        let mut out = Vec::new();
        dump.write_to(&mut out).unwrap();
        let needle: &[u8] = b"\n   1: caf\xe9\\n\n";
        assert!(out.windows(needle.len()).any(|w| w == needle));
        assert!(String::from_utf8(out).is_err());

        assert!(dump.lines().iter().any(|l| l == "   1: caf\u{fffd}\\n"));
    }
}
