//! Comment and atom scanner.
//!
//! Works one line at a time. Outside comments the code is handed to the
//! declaration parser an earlier atom asked for; inside a `/**` block every
//! `@keyword` becomes records in the atom index. The state carried between
//! lines is small: which comment we are in, the atom that owns continuation
//! lines, and the function, API and application the records belong to.

use super::c_source::{
    code_extent, is_name_char, ConstantParser, Declarator, ParseStatus, PrototypeEvent, PrototypeParser, TypeParser,
};
use super::{ApiPrototype, CompilerState};
use crate::atom::Atom;
use crate::codec::compiled::{Counted, Record, RecordBody, DEFAULT_GROUP, RECORD_API_FLAG, RECORD_FUNCTION_FLAG};
use crate::config::CompileOptions;
use crate::core::{Diagnostics, ErrorCode};

/// Longest group or item name a record may carry.
const MAX_NAME_LENGTH: usize = 255;

const API_MASK: u8 = 0x01;
const FUNCTION_MASK: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comment {
    None,
    /// `/*` comment, or a doc comment after `@ignore`.
    Ignored,
    Doc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleState {
    Idle,
    /// `@sample` seen; collection starts after the comment closes.
    Waiting(u32),
    /// `mark` is the body length when the latest doc comment opened.
    Collecting { id: u32, mark: usize },
}

fn trim(text: &[u8]) -> &[u8] {
    let start = text.iter().position(|c| !c.is_ascii_whitespace()).unwrap_or(text.len());
    let end = text.iter().rposition(|c| !c.is_ascii_whitespace()).map_or(start, |end| end + 1);
    &text[start..end]
}

fn name_length(text: &[u8]) -> usize {
    text.iter().position(|c| !is_name_char(*c)).unwrap_or(text.len())
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Skip the continuation marker at the start of a comment line. A character
/// butted against the `*` is a horizontal rule and is dropped with all its
/// repeats. A `:` after that marks the text as fixed format.
fn trim_multiline(line: &[u8], mut pos: usize) -> (usize, bool) {
    if line.get(pos) == Some(&b'*') {
        pos += 1;
        match line.get(pos).copied() {
            Some(rule) if rule != b' ' && rule != b'\t' && rule != b':' => {
                while line.get(pos) == Some(&rule) {
                    pos += 1;
                }
            }
            _ => {
                while matches!(line.get(pos), Some(b' ') | Some(b'\t')) {
                    pos += 1;
                }
            }
        }
    }

    if line.get(pos) == Some(&b':') {
        (pos + 1, true)
    } else {
        (pos, false)
    }
}

/// Only these atoms may name an item in another group.
fn allows_group(atom: Atom) -> bool {
    matches!(atom, Atom::State | Atom::Trigger | Atom::Triggers | Atom::Timeline)
}

pub(super) struct Scanner<'o> {
    options: &'o CompileOptions,
    state: CompilerState,
    diagnostics: Diagnostics,
    line_number: u32,
    comment: Comment,
    /// Set when a comment closed on the current line.
    comment_closed: bool,
    multiline: Option<Atom>,
    in_file_block: bool,
    default_group: u16,
    current_group: u16,
    current_function: Option<u32>,
    current_api: Option<u32>,
    current_application: Option<u32>,
    function_mask: u8,
    prototype: Option<PrototypeParser>,
    type_parser: Option<TypeParser>,
    constants: Option<ConstantParser>,
    sample: SampleState,
}

impl<'o> Scanner<'o> {
    pub fn new(options: &'o CompileOptions, state: CompilerState, diagnostics: Diagnostics) -> Self {
        Self {
            options,
            state,
            diagnostics,
            line_number: 0,
            comment: Comment::None,
            comment_closed: false,
            multiline: None,
            in_file_block: false,
            default_group: DEFAULT_GROUP,
            current_group: DEFAULT_GROUP,
            current_function: None,
            current_api: None,
            current_application: None,
            function_mask: 0,
            prototype: None,
            type_parser: None,
            constants: None,
            sample: SampleState::Idle,
        }
    }

    pub fn scan(mut self, text: &[u8]) -> (CompilerState, Diagnostics) {
        let text = text.strip_suffix(b"\n").unwrap_or(text);
        for (index, line) in text.split(|c| *c == b'\n').enumerate() {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            self.line_number = index as u32 + 1;
            self.state
                .atoms
                .set_line_number(u16::try_from(self.line_number).unwrap_or(u16::MAX));
            self.scan_line(line);
        }
        self.finish();
        (self.state, self.diagnostics)
    }

    fn raise(&mut self, code: ErrorCode, parameter: Option<&str>) {
        self.diagnostics.raise(self.line_number, code, parameter);
    }

    fn add(&mut self, atom: Atom, group: u16, body: RecordBody) {
        let mut record = Record::new(atom, body);
        record.group = group;
        self.state.atoms.add(record);
    }

    fn in_body(&self) -> bool {
        self.prototype.as_ref().is_some_and(PrototypeParser::in_body)
    }

    fn function_scope(&self) -> u16 {
        self.current_function
            .map_or(DEFAULT_GROUP, |function| RECORD_FUNCTION_FLAG | (function as u16 & !RECORD_FUNCTION_FLAG))
    }

    fn api_scope(&self) -> u16 {
        self.current_api
            .map_or(DEFAULT_GROUP, |api| RECORD_API_FLAG | (api as u16 & !RECORD_FUNCTION_FLAG))
    }

    fn application_scope(&self) -> u16 {
        self.current_application.map_or(DEFAULT_GROUP, |application| application as u16)
    }

    fn scan_line(&mut self, line: &[u8]) {
        self.comment_closed = false;
        let mut pos = 0;
        while pos < line.len() {
            pos = match self.comment {
                Comment::None => self.scan_code(line, pos),
                Comment::Ignored | Comment::Doc => self.scan_comment(line, pos),
            };
        }
        self.collect_sample(line);
    }

    fn scan_code(&mut self, line: &[u8], pos: usize) -> usize {
        let rest = &line[pos..];
        if rest.starts_with(b"/**") && !rest.starts_with(b"/**/") {
            self.open_doc_comment();
            return pos + 3;
        }
        if rest.starts_with(b"/*") {
            self.comment = Comment::Ignored;
            return pos + 2;
        }
        if rest.starts_with(b"//") {
            return line.len();
        }

        let end = code_extent(line, pos);
        self.feed_code(&line[pos..end]);
        end
    }

    fn open_doc_comment(&mut self) {
        if self.prototype.as_ref().is_some_and(|parser| !parser.in_body()) {
            self.raise(ErrorCode::FoundCommentExpectingFunction, None);
        }

        self.current_group = self.default_group;
        self.state.atoms.next_block();
        self.comment = Comment::Doc;

        if let SampleState::Collecting { id, .. } = self.sample {
            let mark = self.sample_body(id).map_or(0, |body| body.len());
            self.sample = SampleState::Collecting { id, mark };
        }
    }

    fn close_comment(&mut self) {
        self.comment = Comment::None;
        self.comment_closed = true;
        self.multiline = None;
        self.in_file_block = false;
    }

    fn feed_code(&mut self, code: &[u8]) {
        let mut records = Vec::new();

        if let Some(parser) = self.constants.as_mut() {
            if parser.feed(code, &mut records) == ParseStatus::Failed {
                self.raise(ErrorCode::FailedToFindConstant, None);
            }
        } else if let Some(parser) = self.type_parser.as_mut() {
            match parser.feed(code, &mut records) {
                ParseStatus::Continue => {}
                ParseStatus::Finished => self.type_parser = None,
                ParseStatus::Failed => {
                    self.type_parser = None;
                    self.raise(ErrorCode::FailedToFindType, None);
                }
            }
        } else if let Some(parser) = self.prototype.as_mut() {
            for event in parser.feed(code) {
                self.prototype_event(event);
            }
        }

        for record in records {
            self.state.atoms.add(record);
        }
    }

    fn prototype_event(&mut self, event: PrototypeEvent) {
        match event {
            PrototypeEvent::Named(declarator) => self.name_function(declarator),
            PrototypeEvent::Parameter(parameter) => self.add_parameter(parameter),
            PrototypeEvent::Finished => self.end_function(),
            PrototypeEvent::Failed => {
                self.raise(ErrorCode::FailedToFindFunction, None);
                self.end_function();
            }
        }
    }

    fn name_function(&mut self, declarator: Declarator) {
        let name = lossy(&declarator.name);
        let line = self.line_number;

        if let Some(id) = self.current_function {
            if self.state.functions.get(id).is_some_and(|entry| entry.name.is_some()) {
                self.raise(ErrorCode::DuplicateName, Some(&name));
            } else if self.state.functions.find(&declarator.name).is_some() {
                self.raise(ErrorCode::DuplicateFunction, Some(&name));
            } else {
                self.state.functions.set_name(id, &declarator.name);
                if let Some(entry) = self.state.functions.get_mut(id) {
                    entry.line_num = line;
                }
            }
        }

        if let Some(id) = self.current_api {
            if self.state.apis.get(id).is_some_and(|entry| entry.name.is_some()) {
                self.raise(ErrorCode::DuplicateName, Some(&name));
            } else if self.state.apis.find(&declarator.name).is_some() {
                self.raise(ErrorCode::DuplicateFunction, Some(&name));
            } else {
                self.state.apis.set_name(id, &declarator.name);
                let group = self.current_group;
                if let Some(entry) = self.state.apis.get_mut(id) {
                    entry.line_num = line;
                    entry.group_id = u32::from(group);
                    let prototype = entry.payload.get_or_insert_with(ApiPrototype::default);
                    prototype.return_type = declarator.type_name;
                    prototype.name = declarator.name;
                }
            }
        }
    }

    fn add_parameter(&mut self, parameter: Declarator) {
        let Some(id) = self.current_api else {
            return;
        };
        let Some(entry) = self.state.apis.get_mut(id) else {
            return;
        };

        let function = lossy(entry.name_bytes());
        let prototype = entry.payload.get_or_insert_with(ApiPrototype::default);
        let duplicate =
            !parameter.name.is_empty() && prototype.parameters.iter().any(|known| known.name == parameter.name);
        if duplicate {
            self.raise(ErrorCode::DuplicateParameter, Some(&function));
        } else {
            prototype.parameters.push(parameter);
        }
    }

    fn end_function(&mut self) {
        self.prototype = None;
        self.function_mask = 0;
        self.current_function = None;
        self.current_api = None;
    }

    fn scan_comment(&mut self, line: &[u8], pos: usize) -> usize {
        let rest = &line[pos..];
        if rest.starts_with(b"*/") {
            self.close_comment();
            return pos + 2;
        }
        if self.comment == Comment::Ignored || line[pos].is_ascii_whitespace() {
            return pos + 1;
        }
        if rest.starts_with(b"@@") {
            return pos + 2;
        }
        if rest[0] == b'@' {
            return self.scan_atom(line, pos + 1);
        }

        match self.multiline {
            Some(atom) => {
                let (start, fixed) = trim_multiline(line, pos);
                start + self.add_multiline(atom, &line[start..], fixed)
            }
            None => pos + 1,
        }
    }

    /// Append a multiline record for the text up to the next atom or the end
    /// of the comment and return how much of `text` it used.
    fn add_multiline(&mut self, atom: Atom, text: &[u8], fixed: bool) -> usize {
        let mut end = text.len();
        let mut body = Vec::new();
        let mut i = 0;
        while i < text.len() {
            if text[i..].starts_with(b"*/") {
                end = i;
                break;
            }
            if text[i] == b'@' {
                if text.get(i + 1) == Some(&b'@') {
                    body.push(b'@');
                    i += 2;
                    continue;
                }
                end = i;
                break;
            }
            body.push(text[i]);
            i += 1;
        }

        if fixed {
            body.push(b'\n');
            self.add(atom, DEFAULT_GROUP, RecordBody::Multiline(Counted::fixed(&body)));
        } else {
            let body = trim(&body);
            if !body.is_empty() {
                self.add(atom, DEFAULT_GROUP, RecordBody::Multiline(Counted::new(body)));
            }
        }
        end
    }

    /// `pos` is just past the `@`.
    fn scan_atom(&mut self, line: &[u8], pos: usize) -> usize {
        let word_end = pos + name_length(&line[pos..]);
        let Some(atom) = Atom::match_keyword(&line[pos..]) else {
            let word = lossy(&line[pos..word_end]);
            self.raise(ErrorCode::UnknownCommand, Some(&word));
            return line.len();
        };

        let mut pos = word_end;
        match line.get(pos) {
            None => {}
            Some(b':') | Some(b' ') | Some(b'\t') => pos += 1,
            Some(_) => {
                self.raise(ErrorCode::WeirdStuffAfterCommand, Some(atom.keyword()));
                return line.len();
            }
        }
        while matches!(line.get(pos), Some(b' ') | Some(b'\t')) {
            pos += 1;
        }

        let mut end = line.len();
        while end > pos && line[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
        let closes = line[pos..end].ends_with(b"*/");
        if closes {
            end -= 2;
        }

        log::trace!("{}: {} at line {}", self.state.input_name, atom, self.line_number);
        match self.handle_atom(atom, &line[pos..end]) {
            // continue after the multiline text; a detached `*/` is seen again
            Some(used) => pos + used,
            None => {
                if closes {
                    self.close_comment();
                }
                line.len()
            }
        }
    }

    /// Emit the records for one atom. Multiline atoms return how much of
    /// `text` they consumed; everything else uses the rest of the line.
    fn handle_atom(&mut self, atom: Atom, text: &[u8]) -> Option<usize> {
        match atom {
            Atom::Ignore => {
                self.multiline = None;
                self.comment = Comment::Ignored;
            }

            Atom::Next | Atom::State | Atom::Timeline | Atom::Activation => {
                if self.prototype.is_some() {
                    self.raise(ErrorCode::CannotHaveTheseAtomsInAFunction, Some(atom.keyword()));
                } else {
                    self.decode_name(atom, text, DEFAULT_GROUP);
                }
            }

            Atom::To
            | Atom::Call
            | Atom::Send
            | Atom::After
            | Atom::Record
            | Atom::Waitfor
            | Atom::Trigger
            | Atom::Triggers
            | Atom::Responds => {
                let scope = self.function_scope();
                self.decode_name(atom, text, scope);
            }

            Atom::File => {
                if self.state.atoms.block_count() != 1 {
                    self.raise(ErrorCode::FileBlockNotFirstBlock, None);
                } else {
                    let scope = self.function_scope();
                    self.add_string(atom, text, scope);
                    self.in_file_block = true;
                }
            }

            Atom::Group => self.group(text),
            Atom::Sample => self.start_sample(text),
            Atom::EndSample => self.end_sample(),
            Atom::Constants => self.start_constants(),
            Atom::EndConstants => self.end_constants(),

            Atom::Type => {
                if self.type_parser.is_some() {
                    self.raise(ErrorCode::MultipleTypeRequestsWithoutType, None);
                } else if self.in_body() {
                    self.raise(ErrorCode::CannotHaveTheseAtomsInAFunction, Some(atom.keyword()));
                } else {
                    self.type_parser = Some(TypeParser::new(self.current_group));
                }
            }

            Atom::Application => {
                let name = trim(text);
                let (id, added) = self.state.applications.find_or_add(name);
                if added {
                    let line = self.line_number;
                    if let Some(entry) = self.state.applications.get_mut(id) {
                        entry.line_num = line;
                    }
                }
                self.current_application = Some(id);
            }

            Atom::Api | Atom::Function => self.start_function(atom, text),

            Atom::Synopsis => {
                let scope = self.application_scope();
                self.add_pair(atom, text, scope);
            }
            Atom::Parameter | Atom::Returns => {
                let scope = self.api_scope();
                self.add_pair(atom, text, scope);
            }

            Atom::Description | Atom::Desc | Atom::Action | Atom::Examples => {
                let atom = if atom == Atom::Desc { Atom::Description } else { atom };
                self.multiline = Some(atom);
                let fixed = text.first() == Some(&b':');
                let start = usize::from(fixed);
                return Some(start + self.add_multiline(atom, &text[start..], fixed));
            }

            Atom::Section | Atom::Subsection => {
                let scope = self.application_scope();
                self.add_string(atom, text, scope);
                self.multiline = Some(atom);
            }
            Atom::Option | Atom::Value | Atom::Command => {
                let scope = self.application_scope();
                self.add_string(atom, text, scope);
            }
            Atom::Brief | Atom::Author | Atom::Repeats | Atom::Condition | Atom::Copyright => {
                let scope = self.function_scope();
                self.add_string(atom, text, scope);
            }

            Atom::Required | Atom::Multiple => {
                let value = match trim(text) {
                    b"yes" => true,
                    b"no" => false,
                    other => {
                        let other = lossy(other);
                        self.raise(ErrorCode::ExpectedYesNo, Some(&other));
                        return None;
                    }
                };
                let scope = self.application_scope();
                self.add(atom, scope, RecordBody::Boolean(value));
            }

            _ => self.raise(ErrorCode::UnknownCommand, Some(atom.keyword())),
        }
        None
    }

    fn add_string(&mut self, atom: Atom, text: &[u8], group: u16) {
        self.add(atom, group, RecordBody::String(Counted::new(trim(text))));
    }

    /// `name rest of the line` as a pair.
    fn add_pair(&mut self, atom: Atom, text: &[u8], group: u16) {
        let text = trim(text);
        let split = text.iter().position(u8::is_ascii_whitespace).unwrap_or(text.len());
        let (name, rest) = text.split_at(split);
        self.add(
            atom,
            group,
            RecordBody::Pair {
                name: name.to_vec(),
                string: trim(rest).to_vec(),
            },
        );
    }

    /// Decode `item`, `group.item` or `$MACRO.item` into a NAME record.
    fn decode_name(&mut self, atom: Atom, text: &[u8], scope: u16) {
        let text = trim(text);
        let (group, item): (Option<Vec<u8>>, &[u8]) = if let Some(rest) = text.strip_prefix(b"$") {
            let macro_end = name_length(rest);
            let macro_name = lossy(&rest[..macro_end]);
            let Some(value) = self.options.macro_value(&macro_name) else {
                self.raise(ErrorCode::UnknownMacro, Some(&macro_name));
                return;
            };
            let Some(item) = rest[macro_end..].strip_prefix(b".") else {
                self.raise(ErrorCode::MacroNotGroup, Some(&macro_name));
                return;
            };
            (Some(value.as_bytes().to_vec()), &item[..name_length(item)])
        } else {
            let word_end = name_length(text);
            if word_end == 0 {
                let found = lossy(text);
                self.raise(ErrorCode::InvalidNameOrNameNotFound, Some(&found));
                return;
            }
            match text[word_end..].strip_prefix(b".") {
                Some(item) => (Some(text[..word_end].to_vec()), &item[..name_length(item)]),
                None => (None, &text[..word_end]),
            }
        };

        if item.is_empty() {
            let found = lossy(text);
            self.raise(ErrorCode::InvalidItemName, Some(&found));
            return;
        }

        let group_id = match group {
            Some(group) => {
                if !allows_group(atom) {
                    self.raise(ErrorCode::AtomNotAllowedToHaveGroup, Some(atom.keyword()));
                    return;
                }
                if group.len() > MAX_NAME_LENGTH {
                    self.raise(ErrorCode::GroupNameTooLong, None);
                    return;
                }
                self.state.groups.find_or_add(&group).0 as u16
            }
            None => DEFAULT_GROUP,
        };

        if item.len() > MAX_NAME_LENGTH {
            self.raise(ErrorCode::AtomNameTooLong, None);
            return;
        }

        let field = if scope != DEFAULT_GROUP { scope } else { group_id };
        self.add(atom, field, RecordBody::Name(Counted::new(item)));
    }

    fn group(&mut self, text: &[u8]) {
        let text = trim(text);
        let name = &text[..name_length(text)];
        if name.is_empty() {
            let found = lossy(text);
            self.raise(ErrorCode::InvalidNameOrNameNotFound, Some(&found));
            return;
        }
        if name.len() > MAX_NAME_LENGTH {
            self.raise(ErrorCode::GroupNameTooLong, None);
            return;
        }

        let (id, added) = self.state.groups.find_or_add(name);
        if added {
            let line = self.line_number;
            if let Some(entry) = self.state.groups.get_mut(id) {
                entry.line_num = line;
            }
        }

        let id = id as u16;
        self.add(Atom::Group, DEFAULT_GROUP, RecordBody::Numeric(u32::from(id)));
        self.current_group = id;
        if self.in_file_block {
            self.default_group = id;
        }
    }

    fn start_function(&mut self, atom: Atom, text: &[u8]) {
        let mask = if atom == Atom::Api { API_MASK } else { FUNCTION_MASK };
        let text = trim(text);
        let name = &text[..name_length(text)];

        if self.in_body() {
            self.raise(ErrorCode::NestedFunctionDefinitionsNotAllowed, None);
        } else if self.function_mask & mask != 0 {
            self.raise(ErrorCode::MultipleFunctionAtomsWithoutFunction, None);
        } else if !name.is_empty() && self.state.functions.find(name).is_some() {
            let name = lossy(name);
            self.raise(ErrorCode::MultipleDefinitionsOfFunction, Some(&name));
        } else {
            if atom == Atom::Api {
                let id = self.state.apis.new_lookup(Some(ApiPrototype::default()));
                self.add(Atom::Api, DEFAULT_GROUP, RecordBody::Numeric(id));
                self.current_api = Some(id);
            } else {
                self.current_function = Some(self.state.functions.new_lookup(None));
            }
            self.function_mask |= mask;
            self.prototype.get_or_insert_with(PrototypeParser::new);
        }
    }

    fn start_constants(&mut self) {
        if self.constants.is_some() {
            self.raise(ErrorCode::MultipleConstantsRequestWithoutEnd, None);
        } else if self.in_body() {
            self.raise(ErrorCode::CannotHaveTheseAtomsInAFunction, Some(Atom::Constants.keyword()));
        } else {
            self.add(Atom::Constants, DEFAULT_GROUP, RecordBody::Empty);
            self.constants = Some(ConstantParser::new(self.current_group));
        }
    }

    fn end_constants(&mut self) {
        if self.constants.take().is_some() {
            self.add(Atom::EndConstants, DEFAULT_GROUP, RecordBody::Empty);
        } else {
            self.raise(ErrorCode::EndConstantsWithoutStart, None);
        }
    }

    fn sample_body(&mut self, id: u32) -> Option<&mut Vec<u8>> {
        self.state.samples.get_mut(id).and_then(|entry| entry.payload.as_mut())
    }

    fn start_sample(&mut self, text: &[u8]) {
        let name = trim(text);
        if let SampleState::Collecting { .. } = self.sample {
            let name = lossy(name);
            self.raise(ErrorCode::MultipleSamplesWithoutEnd, Some(&name));
            return;
        }

        let id = self.state.samples.new_lookup(Some(Vec::new()));
        self.state.samples.set_name(id, name);
        let line = self.line_number;
        if let Some(entry) = self.state.samples.get_mut(id) {
            entry.line_num = line;
        }
        self.sample = SampleState::Waiting(id);
    }

    fn end_sample(&mut self) {
        let SampleState::Collecting { id, mark } = self.sample else {
            self.raise(ErrorCode::EndSampleWithoutStart, None);
            return;
        };

        if let Some(body) = self.sample_body(id) {
            body.truncate(mark);
            if body.last() == Some(&b'\n') {
                body.pop();
            }
        }
        self.sample = SampleState::Idle;
    }

    fn collect_sample(&mut self, line: &[u8]) {
        match self.sample {
            SampleState::Waiting(id) if self.comment_closed => {
                self.sample = SampleState::Collecting { id, mark: 0 };
            }
            SampleState::Collecting { id, .. } => {
                if let Some(body) = self.sample_body(id) {
                    body.extend_from_slice(line);
                    body.push(b'\n');
                }
            }
            _ => {}
        }
    }

    fn finish(&mut self) {
        if self.prototype.as_ref().is_some_and(|parser| !parser.in_body()) {
            self.raise(ErrorCode::FailedToFindFunction, None);
        }
        self.end_function();

        if let Some(mut parser) = self.type_parser.take() {
            self.raise(ErrorCode::FailedToFindType, None);
            let mut records = Vec::new();
            parser.abandon(&mut records);
            for record in records {
                self.state.atoms.add(record);
            }
        }

        if let SampleState::Collecting { id, .. } = self.sample {
            if let Some(body) = self.sample_body(id) {
                if body.last() == Some(&b'\n') {
                    body.pop();
                }
            }
        }
    }
}
