//! Markup keywords.
//!
//! An atom is the keyword after the `@` marker in a documentation comment. The
//! numeric value of each variant is what the compiled record's `atom` byte
//! carries, so the order of this enum is part of the object file format.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Atom {
    Action = 0,
    Activation,
    After,
    Api,
    Application,
    Author,
    Brief,
    Call,
    Command,
    Condition,
    Constants,
    Copyright,
    Description,
    Desc,
    Date,
    EndConstants,
    EndSample,
    Entry,
    Examples,
    File,
    Function,
    Group,
    Ignore,
    Licence,
    Message,
    Multiple,
    Name,
    Next,
    Option,
    Parameter,
    Parameters,
    Prototype,
    Record,
    Repeats,
    Required,
    Responds,
    Returns,
    Sample,
    Section,
    SeeAlso,
    Send,
    State,
    Subsection,
    Synopsis,
    Tag,
    Timeline,
    To,
    Trigger,
    Triggers,
    Type,
    Value,
    Waitfor,
}

const ALL_ATOMS: [Atom; 52] = [
    Atom::Action,
    Atom::Activation,
    Atom::After,
    Atom::Api,
    Atom::Application,
    Atom::Author,
    Atom::Brief,
    Atom::Call,
    Atom::Command,
    Atom::Condition,
    Atom::Constants,
    Atom::Copyright,
    Atom::Description,
    Atom::Desc,
    Atom::Date,
    Atom::EndConstants,
    Atom::EndSample,
    Atom::Entry,
    Atom::Examples,
    Atom::File,
    Atom::Function,
    Atom::Group,
    Atom::Ignore,
    Atom::Licence,
    Atom::Message,
    Atom::Multiple,
    Atom::Name,
    Atom::Next,
    Atom::Option,
    Atom::Parameter,
    Atom::Parameters,
    Atom::Prototype,
    Atom::Record,
    Atom::Repeats,
    Atom::Required,
    Atom::Responds,
    Atom::Returns,
    Atom::Sample,
    Atom::Section,
    Atom::SeeAlso,
    Atom::Send,
    Atom::State,
    Atom::Subsection,
    Atom::Synopsis,
    Atom::Tag,
    Atom::Timeline,
    Atom::To,
    Atom::Trigger,
    Atom::Triggers,
    Atom::Type,
    Atom::Value,
    Atom::Waitfor,
];

/// START record atom values naming the aggregate being opened.
pub const RECORD_GROUP_TYPE: u8 = 0x01;
pub const RECORD_GROUP_RECORD: u8 = 0x02;
pub const RECORD_GROUP_CONSTANT: u8 = 0x03;

impl Atom {
    pub fn from_u8(value: u8) -> Option<Atom> {
        ALL_ATOMS.get(value as usize).copied()
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// The keyword as written after the marker.
    pub fn keyword(self) -> &'static str {
        match self {
            Atom::Action => "action",
            Atom::Activation => "activation",
            Atom::After => "after",
            Atom::Api => "api",
            Atom::Application => "application",
            Atom::Author => "author",
            Atom::Brief => "brief",
            Atom::Call => "call",
            Atom::Command => "command",
            Atom::Condition => "condition",
            Atom::Constants => "constants",
            Atom::Copyright => "copyright",
            Atom::Description => "description",
            Atom::Desc => "desc",
            Atom::Date => "date",
            Atom::EndConstants => "end_constants",
            Atom::EndSample => "end_sample",
            Atom::Entry => "entry",
            Atom::Examples => "examples",
            Atom::File => "file",
            Atom::Function => "function",
            Atom::Group => "group",
            Atom::Ignore => "ignore",
            Atom::Licence => "licence",
            Atom::Message => "message",
            Atom::Multiple => "multiple",
            Atom::Name => "name",
            Atom::Next => "next",
            Atom::Option => "option",
            Atom::Parameter => "parameter",
            Atom::Parameters => "parameters",
            Atom::Prototype => "prototype",
            Atom::Record => "record",
            Atom::Repeats => "repeats",
            Atom::Required => "required",
            Atom::Responds => "responds",
            Atom::Returns => "returns",
            Atom::Sample => "sample",
            Atom::Section => "section",
            Atom::SeeAlso => "see_also",
            Atom::Send => "send",
            Atom::State => "state",
            Atom::Subsection => "subsection",
            Atom::Synopsis => "synopsis",
            Atom::Tag => "tag",
            Atom::Timeline => "timeline",
            Atom::To => "to",
            Atom::Trigger => "trigger",
            Atom::Triggers => "triggers",
            Atom::Type => "type",
            Atom::Value => "value",
            Atom::Waitfor => "waitfor",
        }
    }

    /// Match the keyword at the start of `text`. The keyword must end at a
    /// character that cannot continue a word.
    pub fn match_keyword(text: &[u8]) -> Option<Atom> {
        let end = text
            .iter()
            .position(|c| !(c.is_ascii_alphanumeric() || *c == b'_'))
            .unwrap_or(text.len());

        let word = &text[..end];
        ALL_ATOMS
            .iter()
            .copied()
            .find(|atom| atom.keyword().as_bytes() == word)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.keyword())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_follow_declaration_order() {
        assert_eq!(Atom::Action.as_u8(), 0);
        assert_eq!(Atom::Constants.as_u8(), 10);
        assert_eq!(Atom::Function.as_u8(), 20);
        assert_eq!(Atom::Parameters.as_u8(), 30);
        assert_eq!(Atom::Send.as_u8(), 40);
        assert_eq!(Atom::Value.as_u8(), 50);
        assert_eq!(Atom::Waitfor.as_u8(), 51);

        for (index, atom) in ALL_ATOMS.iter().enumerate() {
            assert_eq!(atom.as_u8() as usize, index);
            assert_eq!(Atom::from_u8(index as u8), Some(*atom));
        }
        assert_eq!(Atom::from_u8(52), None);
    }

    #[test]
    fn test_match_keyword_whole_word() {
        assert_eq!(Atom::match_keyword(b"desc: text"), Some(Atom::Desc));
        assert_eq!(Atom::match_keyword(b"description text"), Some(Atom::Description));
        assert_eq!(Atom::match_keyword(b"end_sample"), Some(Atom::EndSample));
        assert_eq!(Atom::match_keyword(b"states"), None);
        assert_eq!(Atom::match_keyword(b"to:"), Some(Atom::To));
    }
}
