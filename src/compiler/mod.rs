// This module is the per-file compiler behind pdsc. It reads one C or C++ source file, finds the
// documentation comments (`/** ... */`) in it, and turns each `@keyword` into a compiled record.
// Code that follows an `@function`, `@api`, `@type` or `@constants` block is read as well, so the
// prototype, structure or constant values land in the object next to their documentation.
// Names are collected into lookup tables (groups, functions, APIs, samples, applications) that
// are written ahead of the records; the records refer to them by their local index. Problems are
// raised through Diagnostics and scanning carries on, so one run reports everything it finds.

//! Source compiler.
//!
//! [`compile_source`] scans the text of one input file into a
//! [`CompilerState`], and [`generate_output`] serialises that state as a
//! compiled object:
//!
//! ```text
//! header
//! GROUP records        one per group name, entry 0 is the unnamed default
//! FUNCTION records     one per @function
//! API records          each followed by TYPE records for the prototype
//! SAMPLE records
//! APPLICATION records  entry 0 is the unnamed default
//! atom records         in scan order
//! ```

mod c_source;
mod scanner;

pub use c_source::Declarator;

use crate::atom::Atom;
use crate::atom_index::AtomIndex;
use crate::codec::compiled::{Record, RecordBody};
use crate::codec::{FileHeader, Magic};
use crate::config::CompileOptions;
use crate::core::{Diagnostics, DocError, DocResult, ErrorCode};
use crate::lookup::{LookupEntry, LookupTable};
use scanner::Scanner;
use std::path::Path;

/// Source languages the scanner understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// C and C++ sources and headers.
    C,
}

impl InputFormat {
    pub fn from_file_name(name: &str) -> Option<InputFormat> {
        let extension = Path::new(name).extension()?.to_str()?;
        ["c", "h", "cpp"]
            .iter()
            .any(|known| extension.eq_ignore_ascii_case(known))
            .then_some(InputFormat::C)
    }
}

/// The prototype read after an `@api` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiPrototype {
    pub return_type: Vec<u8>,
    pub name: Vec<u8>,
    pub parameters: Vec<Declarator>,
}

/// Everything collected from one source file.
#[derive(Debug)]
pub struct CompilerState {
    pub input_name: String,
    pub atoms: AtomIndex,
    pub groups: LookupTable,
    pub functions: LookupTable,
    pub apis: LookupTable<ApiPrototype>,
    /// Sample bodies are the payloads.
    pub samples: LookupTable,
    pub applications: LookupTable,
}

impl CompilerState {
    pub fn new(input_name: &str) -> Self {
        let mut groups = LookupTable::new();
        groups.add(b"", None);
        let mut applications = LookupTable::new();
        applications.add(b"", None);

        Self {
            input_name: input_name.to_string(),
            atoms: AtomIndex::new(),
            groups,
            functions: LookupTable::new(),
            apis: LookupTable::new(),
            samples: LookupTable::new(),
            applications,
        }
    }
}

/// Result of compiling one file.
#[derive(Debug)]
pub struct Compilation {
    pub state: CompilerState,
    pub diagnostics: Diagnostics,
}

impl Compilation {
    pub fn generate_output(&self) -> DocResult<Vec<u8>> {
        generate_output(&self.state)
    }
}

/// Scan `text` as the contents of `file_name`. Only an input type the
/// scanner does not know is an error; everything found in the text is
/// reported through the returned diagnostics.
pub fn compile_source(text: &[u8], file_name: &str, options: &CompileOptions) -> DocResult<Compilation> {
    if InputFormat::from_file_name(file_name).is_none() {
        return Err(ErrorCode::UnsupportedInputFile.into());
    }

    let mut diagnostics = if options.quiet {
        Diagnostics::silent()
    } else {
        Diagnostics::new()
    };
    diagnostics.set_input_name(file_name);

    let (state, diagnostics) = Scanner::new(options, CompilerState::new(file_name), diagnostics).scan(text);
    log::debug!(
        "{}: {} atoms in {} blocks, {} groups, {} functions, {} apis",
        file_name,
        state.atoms.number_atoms(),
        state.atoms.block_count(),
        state.groups.len(),
        state.functions.len(),
        state.apis.len()
    );
    Ok(Compilation { state, diagnostics })
}

/// Read and compile one file.
pub fn compile_file(path: &Path, options: &CompileOptions) -> DocResult<Compilation> {
    let name = path.display().to_string();
    if InputFormat::from_file_name(&name).is_none() {
        return Err(ErrorCode::UnsupportedInputFile.into());
    }

    let text = std::fs::read(path).map_err(|source| DocError::Io {
        path: name.clone(),
        source,
    })?;
    compile_source(&text, &name, options)
}

fn clamp_line(line: u32) -> u16 {
    u16::try_from(line).unwrap_or(u16::MAX)
}

fn dump_record<P>(body: RecordBody, entry: &LookupEntry<P>) -> Record {
    Record {
        atom: 0,
        group: entry.group_id as u16,
        block: 0,
        line: clamp_line(entry.line_num),
        body,
    }
}

/// Serialise a compiled state as an object file.
pub fn generate_output(state: &CompilerState) -> DocResult<Vec<u8>> {
    let count = state.groups.len() + state.atoms.number_atoms();
    let record_count = u16::try_from(count).unwrap_or(u16::MAX);

    let mut out = Vec::new();
    FileHeader::new(Magic::Compiled, state.input_name.as_bytes(), record_count).encode(&mut out)?;

    for (_, entry) in state.groups.iter() {
        dump_record(RecordBody::Group(entry.name_bytes().to_vec()), entry).encode(&mut out)?;
    }

    for (_, entry) in state.functions.iter() {
        dump_record(RecordBody::Function(entry.name_bytes().to_vec()), entry).encode(&mut out)?;
    }

    for (id, entry) in state.apis.iter() {
        dump_record(RecordBody::Api(entry.name_bytes().to_vec()), entry).encode(&mut out)?;
        let Some(prototype) = &entry.payload else {
            continue;
        };

        let line = clamp_line(entry.line_num);
        let mut returns = Record::new(
            Atom::Api,
            RecordBody::Type {
                type_name: prototype.return_type.clone(),
                name: prototype.name.clone(),
                brief: Vec::new(),
            },
        );
        returns.group = id as u16;
        returns.line = line;
        returns.encode(&mut out)?;

        for parameter in &prototype.parameters {
            let mut record = Record::new(
                Atom::Parameter,
                RecordBody::Type {
                    type_name: parameter.type_name.clone(),
                    name: parameter.name.clone(),
                    brief: Vec::new(),
                },
            );
            record.group = id as u16;
            record.line = line;
            record.encode(&mut out)?;
        }

        Record::new(Atom::Api, RecordBody::Empty).encode(&mut out)?;
    }

    for (_, entry) in state.samples.iter() {
        let body = RecordBody::Sample {
            name: entry.name_bytes().to_vec(),
            body: entry.payload.clone().unwrap_or_default(),
        };
        dump_record(body, entry).encode(&mut out)?;
    }

    for (_, entry) in state.applications.iter() {
        dump_record(RecordBody::Application(entry.name_bytes().to_vec()), entry).encode(&mut out)?;
    }

    for record in state.atoms.iter() {
        record.encode(&mut out)?;
    }

    log::debug!("{}: {} bytes of output", state.input_name, out.len());
    Ok(out)
}
