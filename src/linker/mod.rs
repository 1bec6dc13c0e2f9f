// This module replays compiled objects into the link-wide model. Each input file is read once,
// front to back. The lookup dumps at the head of the file (groups, functions, APIs, samples and
// applications) fill per-file remap tables that translate the small ids the compiler wrote into
// model handles; those tables are thrown away when the file ends because the ids mean nothing
// outside it. Atom records are collected into a BlockNode until the block number changes, and a
// finished block is classified and merged into the model by add_block. Type and constant
// aggregates span several compiler blocks, so a block change is ignored while one is open.
//
// Input order matters: a file that refers to a group or function defined in a later file gets a
// ghost now that is filled in when the definition arrives.

//! Compiled object replay.
//!
//! # Usage
//!
//! ```ignore
//! let mut linker = Linker::new(LinkOptions::default());
//! linker.link_bytes("net.pdso", &bytes)?;
//! let (mut model, mut diagnostics) = linker.into_parts();
//! ```

mod add_block;
mod atoms;
mod block;

use crate::atom::{Atom, RECORD_GROUP_CONSTANT};
use crate::codec::compiled::{Record, RecordBody, RecordReader, DEFAULT_GROUP};
use crate::codec::header::{FileHeader, Magic};
use crate::config::LinkOptions;
use crate::core::{Diagnostics, DocResult, ErrorCode, LinkSession, LoadedInput, SourceRef};
use crate::model::{
    ApiConstants, ApiFunctionId, ApiType, ApplicationId, FunctionId, GroupId, Model, Text, TypeRecordKind,
    Parameter, FLAG_GHOST, OPTION_FLAG_MULTIPLE, OPTION_FLAG_REQUIRED, RESERVED_GROUP_NAMES,
};
use std::rc::Rc;

pub use block::BlockNode;

/// What one replayed file contributed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileSummary {
    pub records: usize,
    pub blocks: usize,
}

/// Builds the model from compiled objects.
pub struct Linker {
    model: Model,
    diagnostics: Diagnostics,
    options: LinkOptions,
}

impl Linker {
    pub fn new(options: LinkOptions) -> Self {
        let diagnostics = if options.quiet {
            Diagnostics::silent()
        } else {
            Diagnostics::new()
        };
        Self::with_diagnostics(options, diagnostics)
    }

    pub fn with_diagnostics(options: LinkOptions, diagnostics: Diagnostics) -> Self {
        Self {
            model: Model::new(),
            diagnostics,
            options,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn options(&self) -> &LinkOptions {
        &self.options
    }

    pub fn into_parts(self) -> (Model, Diagnostics) {
        (self.model, self.diagnostics)
    }

    /// Replay every input loaded into the session, in load order.
    pub fn link_session(&mut self, session: &LinkSession<'_>) -> DocResult<()> {
        for input in session.inputs() {
            let summary = self.link_file(input)?;
            session.record_file_linked(summary.records, summary.blocks);
        }
        Ok(())
    }

    pub fn link_file(&mut self, input: LoadedInput<'_>) -> DocResult<FileSummary> {
        self.link_bytes(input.name, input.bytes)
    }

    /// Replay one compiled object. A bad header or a corrupt record stops the
    /// file with an error; everything else is reported and skipped.
    pub fn link_bytes(&mut self, name: &str, bytes: &[u8]) -> DocResult<FileSummary> {
        let (header, start) = FileHeader::decode(bytes, Magic::Compiled)?;

        let source_name = if header.input_name.is_empty() {
            name.to_string()
        } else {
            String::from_utf8_lossy(&header.input_name).into_owned()
        };
        log::info!("🔗 Linking {} (source {})", name, source_name);
        self.diagnostics.set_input_name(&source_name);

        let mut replay = Replay {
            model: &mut self.model,
            diagnostics: &mut self.diagnostics,
            file: FileState::new(Rc::from(source_name.as_str())),
            block: BlockNode::default(),
            summary: FileSummary::default(),
        };

        let mut reader = RecordReader::new(bytes, start);
        while let Some(record) = reader.next_record()? {
            replay.record(record);
        }
        replay.flush_block();

        log::debug!(
            "{}: {} records, {} blocks",
            name,
            replay.summary.records,
            replay.summary.blocks
        );
        Ok(replay.summary)
    }
}

/// Remap tables and cursors that are only valid inside one input file.
struct FileState {
    source: Rc<str>,
    /// Index 0 is the file's default group; dumped groups start at 1.
    local_groups: Vec<GroupId>,
    /// Index 0 is unused; dumped functions start at 1.
    local_functions: Vec<Option<FunctionId>>,
    local_applications: Vec<ApplicationId>,
    local_api: Vec<ApiFunctionId>,
    current_api: Option<ApiFunctionId>,
    /// A type or constant group is open and spans block boundaries.
    in_api_group: bool,
}

impl FileState {
    fn new(source: Rc<str>) -> Self {
        Self {
            source,
            local_groups: vec![GroupId(0)],
            local_functions: vec![None],
            local_applications: Vec::new(),
            local_api: Vec::new(),
            current_api: None,
            in_api_group: false,
        }
    }

    fn default_group(&self) -> GroupId {
        self.local_groups[0]
    }

    fn local_group(&self, id: u16) -> Option<GroupId> {
        let index = if id == DEFAULT_GROUP { 0 } else { id as usize };
        self.local_groups.get(index).copied()
    }

    fn source_ref(&self, line: u32) -> SourceRef {
        SourceRef::new(Rc::clone(&self.source), line)
    }
}

/// Replay of one file: the model being built, the file's remap tables and
/// the block being collected.
struct Replay<'a> {
    model: &'a mut Model,
    diagnostics: &'a mut Diagnostics,
    file: FileState,
    block: BlockNode,
    summary: FileSummary,
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl Replay<'_> {
    fn raise(&mut self, line: u32, code: ErrorCode) {
        self.diagnostics.raise(line, code, None);
    }

    fn raise_with(&mut self, line: u32, code: ErrorCode, parameter: &str) {
        self.diagnostics.raise(line, code, Some(parameter));
    }

    /// Merge the collected block into the model, if it has content.
    fn flush_block(&mut self) {
        if self.block.line != 0 {
            let block = std::mem::take(&mut self.block);
            self.add_block(block);
            self.summary.blocks += 1;
        }
    }

    fn record(&mut self, record: Record) {
        self.summary.records += 1;
        let line = u32::from(record.line);

        if record.block != self.block.block_number && !self.file.in_api_group {
            self.flush_block();
            self.block = BlockNode::new(record.block, line);
        }

        match record.body {
            RecordBody::Eof => {}
            RecordBody::Empty => self.empty_record(record.atom, line),
            RecordBody::Function(name) => {
                let name = lossy(&name);
                let id = match self.model.find_function(&name) {
                    Some(id) => {
                        // a forward reference from an earlier file is now defined
                        self.model.functions[id.index()].flags &= !FLAG_GHOST;
                        id
                    }
                    None => self.model.add_function(&name, 0),
                };
                self.file.local_functions.push(Some(id));
            }
            RecordBody::Application(name) => {
                let id = self.model.find_add_application(&lossy(&name));
                self.file.local_applications.push(id);
            }
            RecordBody::Sample { name, body } => self.model.add_sample(&name, &body),
            RecordBody::Api(name) => self.api_record(record.group, &lossy(&name), line),
            RecordBody::Type { type_name, name, brief } => self.type_record(
                record.atom,
                line,
                Text::from_bytes(&type_name, false),
                Text::from_bytes(&name, false),
                Text::from_bytes(&brief, false),
            ),
            RecordBody::Group(name) => self.group_record(&lossy(&name), line),
            RecordBody::Name(text) | RecordBody::String(text) | RecordBody::Multiline(text) => {
                let text = Text::from_bytes(&text.bytes, text.fixed);
                if self.block.api_constants.is_some() {
                    self.add_atom_to_constant(record.atom, line, text);
                } else if self.block.api_type.is_some() {
                    self.add_atom_to_type(record.atom, line, text);
                } else {
                    self.add_atom_to_block(record.atom, record.group, line, text);
                }
            }
            RecordBody::Numeric(value) => self.add_numeric_to_block(record.atom, line, value),
            RecordBody::Pair { name, string } => self.add_pair_to_block(
                record.atom,
                record.group,
                line,
                Text::from_bytes(&name, false),
                Text::from_bytes(&string, false),
            ),
            RecordBody::Start => self.start_record(record.atom),
            RecordBody::End => {
                if self.block.api_type.is_some() {
                    self.file.in_api_group = false;
                }
            }
            RecordBody::Boolean(value) => {
                let flag = match Atom::from_u8(record.atom) {
                    Some(Atom::Required) => OPTION_FLAG_REQUIRED,
                    Some(Atom::Multiple) => OPTION_FLAG_MULTIPLE,
                    _ => 0,
                };
                if value {
                    self.block.application_flag |= flag;
                }
            }
        }
    }

    fn empty_record(&mut self, atom: u8, line: u32) {
        match Atom::from_u8(atom) {
            Some(Atom::Api) => self.file.current_api = None,
            Some(Atom::Constants) => {
                if self.block.api_constants.is_some() {
                    self.raise(line, ErrorCode::MultipleConstantsRequestWithoutEnd);
                } else {
                    self.block.api_constants = Some(ApiConstants::default());
                    self.file.in_api_group = true;
                }
            }
            Some(Atom::EndConstants) => self.file.in_api_group = false,
            _ => {}
        }
    }

    fn group_record(&mut self, name: &str, line: u32) {
        // an unnamed group is the file default and takes no slot
        if name.is_empty() {
            return;
        }

        let id = match self.model.find_group(name) {
            Some(id) => id,
            None => {
                if RESERVED_GROUP_NAMES.contains(&name) {
                    self.raise_with(line, ErrorCode::SpecifiedSpecialGroupInModel, name);
                }
                self.model.add_group(name)
            }
        };
        self.file.local_groups.push(id);
    }

    fn api_record(&mut self, group: u16, name: &str, line: u32) {
        let group = match self.file.local_group(group) {
            Some(group) => group,
            None => {
                self.raise(line, ErrorCode::UndefinedGroup);
                self.file.default_group()
            }
        };

        if self.file.current_api.is_some() {
            self.raise(line, ErrorCode::NestedFunctionDefinitionsNotAllowed);
        }

        let id = match self.model.find_api_function(group, name) {
            Some(id) => id,
            None => self.model.add_api_function(group, name),
        };
        self.file.local_api.push(id);
        self.file.current_api = Some(id);
    }

    fn type_record(&mut self, atom: u8, line: u32, type_name: Text, name: Text, brief: Text) {
        if let Some(api_type) = self.block.api_type.as_mut() {
            api_type.add_record(TypeRecordKind::Type, type_name, name, brief);
        } else if let Some(constants) = self.block.api_constants.as_mut() {
            constants.add_typed(type_name, name, brief);
        } else if let Some(current) = self.file.current_api {
            let function = self.model.api_function_mut(current);
            match Atom::from_u8(atom) {
                Some(Atom::Api) => {
                    function.name = name;
                    function.return_type = type_name;
                }
                Some(Atom::Parameter) => function.parameters.push(Parameter {
                    type_name,
                    name,
                    brief,
                }),
                _ => self.raise(line, ErrorCode::UnexpectedAtom),
            }
        } else {
            self.raise(line, ErrorCode::TypeDefinitionInInvalidPlace);
        }
    }

    fn start_record(&mut self, atom: u8) {
        if atom != RECORD_GROUP_CONSTANT {
            self.block.api_type = Some(ApiType::default());
            self.file.in_api_group = true;
        } else if let Some(constants) = self.block.api_constants.as_mut() {
            constants.new_constant();
        } else {
            let source = self.file.source.to_string();
            self.raise_with(0, ErrorCode::ProblemWithInputFile, &source);
        }
    }
}

#[cfg(test)]
mod tests;
