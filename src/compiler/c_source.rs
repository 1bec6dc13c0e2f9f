//! C declarations that follow `@function`, `@api`, `@type` and `@constants`.
//!
//! The scanner hands each parser the code part of a line (everything up to a
//! comment opener) and the parser keeps its own state between lines. Parsers
//! never see comments, so a documentation block in the middle of a structure
//! simply starts a new block for the records that follow it.

use crate::atom::{Atom, RECORD_GROUP_CONSTANT, RECORD_GROUP_RECORD, RECORD_GROUP_TYPE};
use crate::codec::compiled::{Counted, Record, RecordBody};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Word(&'a [u8]),
    Punct(u8),
    /// String or character literal, quotes included.
    Literal(&'a [u8]),
}

impl<'a> Token<'a> {
    fn text(&self) -> &'a [u8] {
        match *self {
            Token::Word(text) | Token::Literal(text) => text,
            Token::Punct(c) => std::slice::from_ref(&PUNCT_BYTES[c as usize]),
        }
    }

    fn is_identifier(&self) -> bool {
        match self {
            Token::Word(text) => text.first().is_some_and(|c| c.is_ascii_alphabetic() || *c == b'_'),
            _ => false,
        }
    }
}

// Backing storage so a punctuation token can hand out a `&'static [u8]`.
static PUNCT_BYTES: [u8; 256] = {
    let mut bytes = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        bytes[i] = i as u8;
        i += 1;
    }
    bytes
};

pub(crate) fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Splits code into words, punctuation and literals.
pub(crate) struct Tokens<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> Tokens<'a> {
    pub fn new(text: &'a [u8]) -> Self {
        Self { text, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.text.len() && self.text[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn read_literal(&mut self, quote: u8) -> &'a [u8] {
        let start = self.pos;
        self.pos += 1;
        while self.pos < self.text.len() {
            match self.text[self.pos] {
                b'\\' => self.pos += 2,
                c if c == quote => {
                    self.pos += 1;
                    break;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.text.len());
        &self.text[start..self.pos]
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        self.skip_whitespace();
        let c = *self.text.get(self.pos)?;

        if is_name_char(c) {
            let start = self.pos;
            while self.pos < self.text.len() && is_name_char(self.text[self.pos]) {
                self.pos += 1;
            }
            return Some(Token::Word(&self.text[start..self.pos]));
        }

        if c == b'"' || c == b'\'' {
            return Some(Token::Literal(self.read_literal(c)));
        }

        self.pos += 1;
        Some(Token::Punct(c))
    }
}

/// End of the code part of `line` starting at `pos`: the first comment opener
/// outside a literal, or the end of the line.
pub(crate) fn code_extent(line: &[u8], pos: usize) -> usize {
    let mut i = pos;
    let mut quote = None;
    while i < line.len() {
        let c = line[i];
        match quote {
            Some(q) => {
                if c == b'\\' {
                    i += 1;
                } else if c == q {
                    quote = None;
                }
            }
            None => {
                if c == b'"' || c == b'\'' {
                    quote = Some(c);
                } else if c == b'/' && matches!(line.get(i + 1), Some(b'*') | Some(b'/')) {
                    return i;
                }
            }
        }
        i += 1;
    }
    line.len()
}

/// Join tokens back into C text with single spaces where C needs them.
pub(crate) fn join_tokens(tokens: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for token in tokens {
        let first = token.first().copied().unwrap_or(b' ');
        let glue = matches!(first, b'[' | b']' | b')' | b',');
        let after_open = matches!(out.last(), Some(b'[') | Some(b'('));
        if !out.is_empty() && !glue && !after_open {
            out.push(b' ');
        }
        out.extend_from_slice(token);
    }
    out
}

fn trim(text: &[u8]) -> &[u8] {
    let start = text.iter().position(|c| !c.is_ascii_whitespace()).unwrap_or(text.len());
    let end = text.iter().rposition(|c| !c.is_ascii_whitespace()).map_or(start, |end| end + 1);
    &text[start..end]
}

/// A type and a name, as found in a parameter list or a structure field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarator {
    pub type_name: Vec<u8>,
    pub name: Vec<u8>,
}

impl Declarator {
    /// Split declaration tokens into type and name. The name is the last
    /// identifier before any array suffix; for a function pointer it is the
    /// identifier inside the first parentheses.
    pub(crate) fn from_tokens(tokens: &[Token<'_>]) -> Option<Declarator> {
        let name_at = if let Some(open) = tokens.iter().position(|t| *t == Token::Punct(b'(')) {
            tokens[open..].iter().position(Token::is_identifier).map(|at| open + at)
        } else {
            let end = tokens.iter().position(|t| *t == Token::Punct(b'[')).unwrap_or(tokens.len());
            tokens[..end].iter().rposition(Token::is_identifier)
        }?;

        let mut type_tokens: Vec<Vec<u8>> = Vec::new();
        for (index, token) in tokens.iter().enumerate() {
            if index != name_at {
                type_tokens.push(token.text().to_vec());
            }
        }

        // `f(int, char)` leaves a lone type; it has no name to document.
        if type_tokens.is_empty() {
            return Some(Declarator {
                type_name: tokens[name_at].text().to_vec(),
                name: Vec::new(),
            });
        }

        Some(Declarator {
            type_name: join_tokens(&type_tokens),
            name: tokens[name_at].text().to_vec(),
        })
    }
}

/// What a parser made of the code it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParseStatus {
    Continue,
    Finished,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PrototypeEvent {
    /// The function name and its return type.
    Named(Declarator),
    Parameter(Declarator),
    /// The body closed, or the prototype ended in `;`.
    Finished,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrototypeState {
    Searching,
    Parameters,
    Body,
}

/// Reads the function definition that follows a `@function` or `@api` block.
#[derive(Debug)]
pub(crate) struct PrototypeParser {
    state: PrototypeState,
    words: Vec<Vec<u8>>,
    parameter: Vec<Vec<u8>>,
    depth: usize,
    opened: bool,
}

impl PrototypeParser {
    pub fn new() -> Self {
        Self {
            state: PrototypeState::Searching,
            words: Vec::new(),
            parameter: Vec::new(),
            depth: 0,
            opened: false,
        }
    }

    pub fn in_body(&self) -> bool {
        self.state == PrototypeState::Body
    }

    pub fn feed(&mut self, code: &[u8]) -> Vec<PrototypeEvent> {
        let mut events = Vec::new();
        if self.state == PrototypeState::Searching && trim(code).first() == Some(&b'#') {
            return events;
        }

        for token in Tokens::new(code) {
            match self.state {
                PrototypeState::Searching => match token {
                    Token::Punct(b'(') => {
                        let name = self.words.pop().filter(|word| {
                            word.first().is_some_and(|c| !c.is_ascii_digit() && is_name_char(*c))
                        });
                        let Some(name) = name else {
                            events.push(PrototypeEvent::Failed);
                            return events;
                        };
                        events.push(PrototypeEvent::Named(Declarator {
                            type_name: join_tokens(&self.words),
                            name,
                        }));
                        self.words.clear();
                        self.state = PrototypeState::Parameters;
                        self.depth = 1;
                    }
                    Token::Word(_) | Token::Punct(b'*') | Token::Punct(b'&') => self.words.push(token.text().to_vec()),
                    _ => {
                        events.push(PrototypeEvent::Failed);
                        return events;
                    }
                },
                PrototypeState::Parameters => match token {
                    Token::Punct(b'(') => {
                        self.depth += 1;
                        self.parameter.push(b"(".to_vec());
                    }
                    Token::Punct(b')') => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            self.finish_parameter(&mut events);
                            self.state = PrototypeState::Body;
                        } else {
                            self.parameter.push(b")".to_vec());
                        }
                    }
                    Token::Punct(b',') if self.depth == 1 => self.finish_parameter(&mut events),
                    _ => self.parameter.push(token.text().to_vec()),
                },
                PrototypeState::Body => match token {
                    Token::Punct(b'{') => {
                        self.opened = true;
                        self.depth += 1;
                    }
                    Token::Punct(b'}') if self.opened => {
                        self.depth = self.depth.saturating_sub(1);
                        if self.depth == 0 {
                            events.push(PrototypeEvent::Finished);
                            return events;
                        }
                    }
                    Token::Punct(b';') if !self.opened => {
                        events.push(PrototypeEvent::Finished);
                        return events;
                    }
                    _ => {}
                },
            }
        }
        events
    }

    fn finish_parameter(&mut self, events: &mut Vec<PrototypeEvent>) {
        let text = std::mem::take(&mut self.parameter);
        if text.is_empty() || (text.len() == 1 && text[0] == b"void") {
            return;
        }

        let tokens: Vec<Token<'_>> = text.iter().flat_map(|part| Tokens::new(part)).collect();
        if let Some(declarator) = Declarator::from_tokens(&tokens) {
            events.push(PrototypeEvent::Parameter(declarator));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeState {
    Looking,
    Typedef,
    Tag,
    Alias,
    Fields,
    Members,
    Name,
    SubName,
}

/// Reads the structure, union, enumeration or alias that follows `@type`.
///
/// The records produced go straight into the compiled object: a START,
/// a STRING with the definition, one record per field or member, the type
/// name and an END.
#[derive(Debug)]
pub(crate) struct TypeParser {
    state: TypeState,
    group: u16,
    definition: Vec<Vec<u8>>,
    pending: Vec<Vec<u8>>,
    /// Depth of nested structure definitions.
    level: usize,
    started: bool,
    name: Option<Vec<u8>>,
    member: Option<Vec<u8>>,
    value: Vec<Vec<u8>>,
    enumeration: bool,
}

impl TypeParser {
    pub fn new(group: u16) -> Self {
        Self {
            state: TypeState::Looking,
            group,
            definition: Vec::new(),
            pending: Vec::new(),
            level: 0,
            started: false,
            name: None,
            member: None,
            value: Vec::new(),
            enumeration: false,
        }
    }

    fn start(&mut self, kind: u8, out: &mut Vec<Record>) {
        let mut start = Record::new(Atom::Action, RecordBody::Start);
        start.atom = kind;
        start.group = self.group;
        out.push(start);
        self.started = true;
    }

    fn end(&mut self, out: &mut Vec<Record>) {
        let mut end = Record::new(Atom::Action, RecordBody::End);
        end.group = self.group;
        out.push(end);
        self.started = false;
    }

    /// Close a definition cut off by the end of the file.
    pub fn abandon(&mut self, out: &mut Vec<Record>) {
        if self.started {
            self.end(out);
        }
    }

    fn fail(&mut self, out: &mut Vec<Record>) -> ParseStatus {
        if self.started {
            self.end(out);
        }
        ParseStatus::Failed
    }

    fn string(atom: Atom, text: &[u8]) -> Record {
        Record::new(atom, RecordBody::String(Counted::new(text)))
    }

    fn open_body(&mut self, out: &mut Vec<Record>) {
        let definition = join_tokens(&self.definition);
        self.start(RECORD_GROUP_RECORD, out);
        out.push(Self::string(Atom::Type, &definition));
        self.state = if self.enumeration { TypeState::Members } else { TypeState::Fields };
    }

    fn finish_member(&mut self, out: &mut Vec<Record>) {
        if let Some(name) = self.member.take() {
            let value = join_tokens(&std::mem::take(&mut self.value));
            out.push(Record::new(Atom::Type, RecordBody::Pair { name, string: value }));
        }
    }

    fn finish_field(&mut self, out: &mut Vec<Record>) -> bool {
        let text = std::mem::take(&mut self.pending);
        let tokens: Vec<Token<'_>> = text.iter().flat_map(|part| Tokens::new(part)).collect();
        match Declarator::from_tokens(&tokens) {
            Some(field) if !field.name.is_empty() => {
                out.push(Record::new(
                    Atom::Type,
                    RecordBody::Type {
                        type_name: field.type_name,
                        name: field.name,
                        brief: Vec::new(),
                    },
                ));
                true
            }
            _ => false,
        }
    }

    pub fn feed(&mut self, code: &[u8], out: &mut Vec<Record>) -> ParseStatus {
        if self.state == TypeState::Looking && trim(code).first() == Some(&b'#') {
            return ParseStatus::Continue;
        }

        for token in Tokens::new(code) {
            match self.state {
                TypeState::Looking => match token {
                    Token::Word(b"typedef") => {
                        self.definition.push(b"typedef".to_vec());
                        self.state = TypeState::Typedef;
                    }
                    Token::Word(b"struct") | Token::Word(b"union") | Token::Word(b"enum") => {
                        self.enumeration = token == Token::Word(b"enum");
                        self.definition.push(token.text().to_vec());
                        self.state = TypeState::Tag;
                    }
                    _ => return self.fail(out),
                },
                TypeState::Typedef => match token {
                    Token::Word(b"struct") | Token::Word(b"union") | Token::Word(b"enum") => {
                        self.enumeration = token == Token::Word(b"enum");
                        self.definition.push(token.text().to_vec());
                        self.state = TypeState::Tag;
                    }
                    _ => {
                        self.pending.push(token.text().to_vec());
                        self.state = TypeState::Alias;
                    }
                },
                TypeState::Alias => match token {
                    Token::Punct(b';') => {
                        let text = std::mem::take(&mut self.pending);
                        let tokens: Vec<Token<'_>> = text.iter().flat_map(|part| Tokens::new(part)).collect();
                        let Some(alias) = Declarator::from_tokens(&tokens).filter(|d| !d.name.is_empty()) else {
                            return self.fail(out);
                        };
                        let mut definition = std::mem::take(&mut self.definition);
                        definition.push(alias.type_name);
                        self.start(RECORD_GROUP_TYPE, out);
                        out.push(Self::string(Atom::Type, &join_tokens(&definition)));
                        out.push(Self::string(Atom::Name, &alias.name));
                        self.end(out);
                        return ParseStatus::Finished;
                    }
                    _ => self.pending.push(token.text().to_vec()),
                },
                TypeState::Tag => match token {
                    Token::Word(tag) if self.definition.len() < 3 => self.definition.push(tag.to_vec()),
                    Token::Punct(b'{') => self.open_body(out),
                    _ => return self.fail(out),
                },
                TypeState::Members => match token {
                    Token::Punct(b'}') => {
                        self.finish_member(out);
                        self.state = TypeState::Name;
                    }
                    Token::Punct(b',') => self.finish_member(out),
                    Token::Punct(b'=') if self.member.is_some() => {}
                    Token::Word(name) if self.member.is_none() => self.member = Some(name.to_vec()),
                    _ if self.member.is_some() => self.value.push(token.text().to_vec()),
                    _ => return self.fail(out),
                },
                TypeState::Fields => match token {
                    Token::Punct(b'{') => {
                        let kind = match self.pending.first().map(Vec::as_slice) {
                            Some(b"union") => b"union".as_slice(),
                            Some(b"struct") => b"struct".as_slice(),
                            _ => return self.fail(out),
                        };
                        self.pending.clear();
                        out.push(Self::string(Atom::Record, kind));
                        self.level += 1;
                    }
                    Token::Punct(b'}') => {
                        if !self.pending.is_empty() {
                            return self.fail(out);
                        }
                        if self.level == 0 {
                            self.state = TypeState::Name;
                        } else {
                            self.level -= 1;
                            self.state = TypeState::SubName;
                        }
                    }
                    Token::Punct(b';') => {
                        if !self.finish_field(out) {
                            return self.fail(out);
                        }
                    }
                    _ => self.pending.push(token.text().to_vec()),
                },
                TypeState::Name | TypeState::SubName => match token {
                    Token::Word(name) if self.name.is_none() => self.name = Some(name.to_vec()),
                    Token::Punct(b';') => {
                        let Some(name) = self.name.take() else {
                            return self.fail(out);
                        };
                        out.push(Self::string(Atom::Name, &name));
                        if self.state == TypeState::SubName {
                            self.state = TypeState::Fields;
                        } else {
                            self.end(out);
                            return ParseStatus::Finished;
                        }
                    }
                    // `} Name, *PName;` keeps the first name.
                    _ if self.name.is_some() => {}
                    _ => return self.fail(out),
                },
            }
        }
        ParseStatus::Continue
    }
}

/// Reads the constants between `@constants` and `@end_constants`.
///
/// `#define NAME VALUE` becomes a RECORD pair. A typed constant such as
/// `static const int limit = 10;` becomes a START/TYPE/STRING/END run.
/// Function-like macros and valueless defines are skipped.
#[derive(Debug)]
pub(crate) struct ConstantParser {
    group: u16,
    tokens: Vec<Vec<u8>>,
    value: Option<Vec<Vec<u8>>>,
    braces: usize,
}

impl ConstantParser {
    pub fn new(group: u16) -> Self {
        Self {
            group,
            tokens: Vec::new(),
            value: None,
            braces: 0,
        }
    }

    pub fn feed(&mut self, code: &[u8], out: &mut Vec<Record>) -> ParseStatus {
        let text = trim(code);
        if self.tokens.is_empty() && self.value.is_none() && text.first() == Some(&b'#') {
            return Self::directive(&text[1..], out);
        }

        for token in Tokens::new(code) {
            match self.value.as_mut() {
                None => match token {
                    Token::Punct(b'=') => self.value = Some(Vec::new()),
                    Token::Punct(b';') => {
                        self.tokens.clear();
                        return ParseStatus::Failed;
                    }
                    _ => self.tokens.push(token.text().to_vec()),
                },
                Some(value) => match token {
                    Token::Punct(b';') if self.braces == 0 => {
                        let value = join_tokens(value);
                        if !self.emit(value, out) {
                            return ParseStatus::Failed;
                        }
                    }
                    Token::Punct(b'{') => {
                        self.braces += 1;
                        value.push(b"{".to_vec());
                    }
                    Token::Punct(b'}') => {
                        self.braces = self.braces.saturating_sub(1);
                        value.push(b"}".to_vec());
                    }
                    _ => value.push(token.text().to_vec()),
                },
            }
        }
        ParseStatus::Continue
    }

    fn emit(&mut self, value: Vec<u8>, out: &mut Vec<Record>) -> bool {
        self.value = None;
        self.braces = 0;
        let text = std::mem::take(&mut self.tokens);
        let tokens: Vec<Token<'_>> = text.iter().flat_map(|part| Tokens::new(part)).collect();
        let Some(constant) = Declarator::from_tokens(&tokens).filter(|d| !d.name.is_empty()) else {
            return false;
        };

        let mut start = Record::new(Atom::Action, RecordBody::Start);
        start.atom = RECORD_GROUP_CONSTANT;
        start.group = self.group;
        out.push(start);
        out.push(Record::new(
            Atom::Constants,
            RecordBody::Type {
                type_name: constant.type_name,
                name: constant.name,
                brief: Vec::new(),
            },
        ));
        out.push(Record::new(Atom::Constants, RecordBody::String(Counted::new(&value))));
        let mut end = Record::new(Atom::Action, RecordBody::End);
        end.group = self.group;
        out.push(end);
        true
    }

    fn directive(text: &[u8], out: &mut Vec<Record>) -> ParseStatus {
        let text = trim(text);
        let Some(rest) = text.strip_prefix(b"define") else {
            return ParseStatus::Continue;
        };
        if !rest.first().is_some_and(u8::is_ascii_whitespace) {
            return ParseStatus::Continue;
        }

        let rest = trim(rest);
        let name_end = rest.iter().position(|c| !is_name_char(*c)).unwrap_or(rest.len());
        let (name, value) = rest.split_at(name_end);
        if name.is_empty() || !value.first().is_some_and(u8::is_ascii_whitespace) {
            return ParseStatus::Continue;
        }

        let value = trim(value);
        let value = value.strip_suffix(b"\\").map_or(value, trim);
        out.push(Record::new(
            Atom::Record,
            RecordBody::Pair {
                name: name.to_vec(),
                string: value.to_vec(),
            },
        ));
        ParseStatus::Continue
    }
}
