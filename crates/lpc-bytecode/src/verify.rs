//! Program verification
//!
//! Structural checks run when a program object is loaded. Decoding never
//! depends on these passing; the disassembler range-checks everything again.

use crate::program::Program;

/// Program verification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Inheritance table not ordered by function index offset
    #[error("Inherit {index} has function offset {offset}, not above previous {previous}")]
    InheritOrder {
        /// Position in the inheritance table
        index: usize,
        /// Function index offset of this entry
        offset: u16,
        /// Function index offset of the entry before it
        previous: u16,
    },

    /// Inherited slot count exceeds the function table
    #[error("last_inherited {last_inherited} exceeds function count {functions}")]
    FunctionCount {
        /// Declared number of inherited slots
        last_inherited: u16,
        /// Length of the function table
        functions: usize,
    },

    /// Inherited slot that no ancestor owns
    #[error("Inherited function {index} ({name}) has no owning ancestor")]
    UnresolvedInherited {
        /// Function table slot
        index: usize,
        /// Function name
        name: String,
    },

    /// Alias pointing outside the function table
    #[error("Alias {index} ({name}) points at missing slot {target:?}")]
    AliasTarget {
        /// Alias slot
        index: usize,
        /// Alias name
        name: String,
        /// Slot the alias redirects to, if it names one at all
        target: Option<u16>,
    },

    /// Local function entry address past the end of the byte code
    #[error("Function {index} ({name}) starts at {address:#06x}, program size is {size:#06x}")]
    FunctionAddress {
        /// Function table slot
        index: usize,
        /// Function name
        name: String,
        /// Entry address
        address: u16,
        /// Length of the byte code
        size: usize,
    },

    /// Class name outside the string table
    #[error("Class {index} names string {name}, table has {strings}")]
    ClassName {
        /// Class table index
        index: usize,
        /// String table index of the name
        name: u16,
        /// Length of the string table
        strings: usize,
    },

    /// Error inside an ancestor
    #[error("In ancestor {filename}: {source}")]
    Ancestor {
        /// Ancestor source file
        filename: String,
        /// What failed inside it
        #[source]
        source: Box<VerifyError>,
    },
}

/// Verify a program and all of its ancestors
pub fn verify_program(program: &Program) -> Result<(), VerifyError> {
    for inherit in &program.inherits {
        verify_program(&inherit.program).map_err(|e| VerifyError::Ancestor {
            filename: inherit.program.filename.clone(),
            source: Box::new(e),
        })?;
    }

    verify_inherits(program)?;
    verify_functions(program)?;
    verify_classes(program)?;

    Ok(())
}

fn verify_inherits(program: &Program) -> Result<(), VerifyError> {
    for (index, pair) in program.inherits.windows(2).enumerate() {
        let (previous, current) = (pair[0].function_index_offset, pair[1].function_index_offset);
        if current <= previous {
            return Err(VerifyError::InheritOrder {
                index: index + 1,
                offset: current,
                previous,
            });
        }
    }
    Ok(())
}

fn verify_functions(program: &Program) -> Result<(), VerifyError> {
    let last_inherited = program.last_inherited as usize;
    if last_inherited > program.functions.len() {
        return Err(VerifyError::FunctionCount {
            last_inherited: program.last_inherited,
            functions: program.functions.len(),
        });
    }

    for (index, function) in program.functions.iter().enumerate() {
        if function.is_alias() {
            let valid = function
                .alias_of
                .is_some_and(|target| (target as usize) < program.functions.len());
            if !valid {
                return Err(VerifyError::AliasTarget {
                    index,
                    name: function.name.clone(),
                    target: function.alias_of,
                });
            }
            continue;
        }

        if function.is_inherited() {
            let owned = program.find_inherit(index).is_some_and(|position| {
                let inherit = &program.inherits[position];
                index - (inherit.function_index_offset as usize) < inherit.program.functions.len()
            });
            if !owned {
                return Err(VerifyError::UnresolvedInherited {
                    index,
                    name: function.name.clone(),
                });
            }
            continue;
        }

        // A program with no code at all only carries prototypes
        if index >= last_inherited
            && !function.has_no_code()
            && !program.byte_code.is_empty()
            && function.address as usize >= program.program_size()
        {
            return Err(VerifyError::FunctionAddress {
                index,
                name: function.name.clone(),
                address: function.address,
                size: program.program_size(),
            });
        }
    }

    Ok(())
}

fn verify_classes(program: &Program) -> Result<(), VerifyError> {
    for (index, class) in program.classes.iter().enumerate() {
        if class.name as usize >= program.strings.len() {
            return Err(VerifyError::ClassName {
                index,
                name: class.name,
                strings: program.strings.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{flags, ClassDef, FunctionEntry, Inherit};
    use std::sync::Arc;

    fn base() -> Arc<Program> {
        let mut program = Program::new("base.c");
        program.byte_code = vec![0x66; 8];
        program.functions = vec![FunctionEntry::new("create", 0), FunctionEntry::new("reset", 4)];
        Arc::new(program)
    }

    fn derived() -> Program {
        let mut program = Program::new("derived.c");
        program.byte_code = vec![0x66; 4];
        program.inherits = vec![Inherit {
            program: base(),
            function_index_offset: 0,
            variable_index_offset: 0,
        }];
        program.functions = vec![
            FunctionEntry::inherited("create"),
            FunctionEntry::inherited("reset"),
            FunctionEntry::new("init", 0),
        ];
        program.last_inherited = 2;
        program
    }

    #[test]
    fn test_verify_valid_program() {
        assert!(verify_program(&derived()).is_ok());
        assert!(verify_program(&Program::new("empty.c")).is_ok());
    }

    #[test]
    fn test_verify_inherit_order() {
        let mut program = derived();
        program.inherits.push(Inherit {
            program: base(),
            function_index_offset: 0,
            variable_index_offset: 0,
        });
        assert!(matches!(
            verify_program(&program),
            Err(VerifyError::InheritOrder { index: 1, .. })
        ));
    }

    #[test]
    fn test_verify_function_count() {
        let mut program = derived();
        program.last_inherited = 9;
        assert!(matches!(
            verify_program(&program),
            Err(VerifyError::FunctionCount { .. })
        ));
    }

    #[test]
    fn test_verify_unresolved_inherited() {
        let mut program = derived();
        program.functions.insert(2, FunctionEntry::inherited("ghost"));
        program.last_inherited = 3;
        assert!(matches!(
            verify_program(&program),
            Err(VerifyError::UnresolvedInherited { index: 2, .. })
        ));
    }

    #[test]
    fn test_verify_alias_target() {
        let mut program = derived();
        program.functions.push(FunctionEntry::alias("setup", 7));
        assert!(matches!(
            verify_program(&program),
            Err(VerifyError::AliasTarget { index: 3, target: Some(7), .. })
        ));
    }

    #[test]
    fn test_verify_function_address() {
        let mut program = derived();
        program.functions[2].address = 0x10;
        assert!(matches!(
            verify_program(&program),
            Err(VerifyError::FunctionAddress { address: 0x10, .. })
        ));

        // Prototypes carry no address
        program.functions[2].flags |= flags::PROTOTYPE;
        assert!(verify_program(&program).is_ok());
    }

    #[test]
    fn test_verify_class_name() {
        let mut program = derived();
        program.strings = vec![b"point".to_vec()];
        program.classes = vec![ClassDef { name: 0 }, ClassDef { name: 1 }];
        assert_eq!(
            verify_program(&program),
            Err(VerifyError::ClassName {
                index: 1,
                name: 1,
                strings: 1
            })
        );
    }

    #[test]
    fn test_verify_reports_ancestor() {
        let mut broken = (*base()).clone();
        broken.last_inherited = 5;
        let mut program = derived();
        program.inherits[0].program = Arc::new(broken);

        let err = verify_program(&program).unwrap_err();
        assert!(matches!(err, VerifyError::Ancestor { ref filename, .. } if filename == "base.c"));
        assert!(err.to_string().contains("last_inherited 5"));
    }
}
