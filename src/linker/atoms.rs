//! Per-record dispatch into the current block.

use super::block::BlockKind;
use super::Replay;
use crate::atom::Atom;
use crate::codec::compiled::{
    DEFAULT_GROUP, MAX_GROUPS_PER_FILE, RECORD_API_FLAG, RECORD_FUNCTION_FLAG, RECORD_FUNC_API_MASK,
};
use crate::core::ErrorCode;
use crate::model::{
    ApplicationId, BlockName, GroupId, ReturnValue, Synopsis, Text, TypeRecordKind, FLAG_GHOST, FLAG_IN_FUNCTION,
    FLAG_MESSAGE_CALL, FLAG_MESSAGE_RESPONDS, FLAG_MESSAGE_SEND, FLAG_SEQUENCE_WAITFOR,
};

/// Low bits of a function or API local id.
const LOCAL_ID_MASK: u16 = !RECORD_FUNC_API_MASK;

impl Replay<'_> {
    /// Decode the group field of a block atom. Function and API local ids
    /// attach the block to that definition; a plain group id names the group
    /// the atom's text belongs to.
    fn decode_owner(&mut self, group: u16, line: u32) -> Option<GroupId> {
        if group == DEFAULT_GROUP {
            return None;
        }

        match group & RECORD_FUNC_API_MASK {
            RECORD_FUNCTION_FLAG => {
                let local = (group & LOCAL_ID_MASK) as usize + 1;
                match self.file.local_functions.get(local).copied().flatten() {
                    Some(function) => self.block.function = Some(function),
                    None => self.raise(line, ErrorCode::UndefinedFunction),
                }
                self.block.flags |= FLAG_IN_FUNCTION;
                None
            }
            RECORD_API_FLAG => {
                let local = (group & LOCAL_ID_MASK) as usize;
                match self.file.local_api.get(local) {
                    Some(api) => self.block.api_function = Some(*api),
                    None => self.raise(line, ErrorCode::UndefinedApi),
                }
                None
            }
            _ => match self.file.local_group(group) {
                Some(id) => Some(id),
                None => {
                    self.raise(line, ErrorCode::UndefinedGroup);
                    None
                }
            },
        }
    }

    /// The application this block belongs to, if any.
    fn block_application(&self) -> Option<ApplicationId> {
        if self.block.application_id == 0 {
            return None;
        }
        self.file.local_applications.get(self.block.application_id as usize).copied()
    }

    fn claim_application(&mut self, group: u16) -> bool {
        if group != DEFAULT_GROUP && group != 0 {
            self.block.application_id = group;
            true
        } else {
            false
        }
    }

    pub(super) fn add_atom_to_block(&mut self, atom: u8, group: u16, line: u32, text: Text) {
        let Some(atom) = Atom::from_u8(atom) else {
            self.raise(line, ErrorCode::UnknownAtom);
            return;
        };

        // application atoms carry the application id in the group field
        let application_atom = matches!(
            atom,
            Atom::Section | Atom::Subsection | Atom::Option | Atom::Value | Atom::Command
        );
        let owner = if application_atom {
            None
        } else {
            self.decode_owner(group, line)
        };
        let default_group = self.file.default_group();

        match atom {
            Atom::File => self.block.kind = BlockKind::File,
            Atom::Author => {
                if self.block.author.is_some() {
                    self.raise(line, ErrorCode::MultipleAuthorsInOneBlock);
                } else {
                    self.block.author = Some(text);
                }
            }
            Atom::Action => self.block.action.append(&text.text, text.fixed),
            Atom::Desc | Atom::Description => self.block.description.append(&text.text, text.fixed),

            Atom::State => self.state_atom(owner.unwrap_or(default_group), line, &text.text),
            Atom::Next => {
                if self.block.timeline.is_some() {
                    self.raise(line, ErrorCode::WrongAtomInBlock);
                } else if self.block.transition.is_some() {
                    self.raise(line, ErrorCode::DuplicateTransition);
                } else {
                    self.block.transition = Some(BlockName::new(owner, text.text));
                }
            }
            Atom::Condition => {
                if self.block.condition.is_some() {
                    self.raise(line, ErrorCode::DuplicateConditionInTransition);
                } else if self.block.trigger.is_some() {
                    self.raise(line, ErrorCode::CannotHaveTriggerAndConditionInTransition);
                } else {
                    self.block.condition = Some(text.text);
                }
            }
            Atom::Trigger => {
                if self.block.condition.is_some() {
                    self.raise(line, ErrorCode::CannotHaveTriggerAndConditionInTransition);
                } else if self.block.trigger.is_some() {
                    self.raise(line, ErrorCode::MultipleTrigger);
                } else {
                    self.block.trigger = Some(BlockName::new(owner, text.text));
                }
            }
            Atom::Triggers => self.block.triggers.insert(0, BlockName::new(owner, text.text)),

            Atom::Timeline => self.timeline_atom(owner.unwrap_or(default_group), line, &text.text),
            Atom::Call | Atom::Send | Atom::Responds => {
                if self.block.state.is_some() {
                    self.raise(line, ErrorCode::WrongAtomInBlock);
                } else if self.block.message.is_some() {
                    self.raise(line, ErrorCode::DuplicateMessage);
                } else {
                    self.block.flags |= match atom {
                        Atom::Call => FLAG_MESSAGE_CALL,
                        Atom::Send => FLAG_MESSAGE_SEND,
                        _ => FLAG_MESSAGE_RESPONDS,
                    };
                    self.block.message = Some(text.text);
                }
            }
            Atom::After => {
                if self.block.state.is_some() {
                    self.raise(line, ErrorCode::WrongAtomInBlock);
                } else if self.block.after.is_some() {
                    self.raise(line, ErrorCode::DuplicateAfter);
                } else {
                    self.block.after = Some(text.text);
                }
            }
            Atom::Waitfor => {
                if self.block.state.is_some() {
                    self.raise(line, ErrorCode::WrongAtomInBlock);
                } else if self.block.wait.is_some() {
                    self.raise(line, ErrorCode::DuplicateSequence);
                } else {
                    self.block.flags |= FLAG_SEQUENCE_WAITFOR;
                    self.block.wait = Some(text.text);
                }
            }
            Atom::To => {
                if self.block.to_timeline.is_some() || self.block.function_to_timeline.is_some() {
                    self.raise(line, ErrorCode::MultipleToTimelinesInOneBlock);
                } else if self.block.state.is_some() {
                    self.raise(line, ErrorCode::MixedDiagramTypesInBlock);
                } else if self.block.in_function() {
                    self.block.function_to_timeline = Some(text.text);
                } else {
                    let group = owner.unwrap_or(default_group);
                    let source = self.file.source_ref(self.block.line);
                    let id = self.model.find_or_add_timeline(group, &text.text, Some(source), 0);
                    self.block.to_timeline = Some(id);
                }
            }
            Atom::Activation | Atom::Repeats | Atom::Copyright => {
                log::debug!("line {}: ignoring {}", line, atom);
            }

            Atom::Section => {
                if self.claim_application(group) {
                    match self.block_application() {
                        Some(application) => self.model.application_mut(application).new_section(text),
                        None => self.raise(line, ErrorCode::AtomRequiresApplicationAtom),
                    }
                } else {
                    self.extend_section(line, &text);
                }
            }
            Atom::Subsection => {
                if self.claim_application(group) {
                    match self.block_application() {
                        Some(application) => {
                            if !self.model.application_mut(application).new_sub_section(text) {
                                self.raise(line, ErrorCode::UnexpectedAtom);
                            }
                        }
                        None => self.raise(line, ErrorCode::AtomRequiresApplicationAtom),
                    }
                } else {
                    self.extend_section(line, &text);
                }
            }
            Atom::Option => {
                if self.block.option.is_some() {
                    self.raise(line, ErrorCode::MultipleDefinitionOption);
                } else {
                    self.claim_application(group);
                    self.block.option = Some(text);
                }
            }
            Atom::Value => {
                if self.block.value.is_some() {
                    self.raise(line, ErrorCode::MultipleDefinitionValue);
                } else {
                    self.claim_application(group);
                    self.block.value = Some(text);
                }
            }
            Atom::Command => {
                self.claim_application(group);
                self.block.command = Some(text);
            }

            _ => self.raise_with(line, ErrorCode::UnknownAtom, atom.keyword()),
        }
    }

    fn extend_section(&mut self, line: u32, text: &Text) {
        match self.block_application() {
            Some(application) => {
                self.model.application_mut(application).extend_section(text);
            }
            None => self.raise(line, ErrorCode::AtomRequiresApplicationAtom),
        }
    }

    fn state_atom(&mut self, group: GroupId, line: u32, name: &str) {
        self.block.group = Some(group);

        if self.block.state.is_some() {
            self.raise(line, ErrorCode::MultipleStatesInOneBlock);
            return;
        }
        if self.block.timeline.is_some() {
            self.raise(line, ErrorCode::MixedDiagramTypesInBlock);
            return;
        }

        let source = self.file.source_ref(self.block.line);
        let id = match self.model.find_state(group, name) {
            Some(id) => {
                let state = self.model.state_mut(id);
                if state.flags & FLAG_GHOST != 0 {
                    state.flags &= !FLAG_GHOST;
                    state.source = Some(source);
                }
                id
            }
            None => self.model.add_state(group, name, Some(source), 0),
        };
        self.block.state = Some(id);
    }

    fn timeline_atom(&mut self, group: GroupId, line: u32, name: &str) {
        if self.block.in_function() {
            self.raise(line, ErrorCode::CannotHaveTheseAtomsInAFunction);
            return;
        }
        if self.block.timeline.is_some() {
            self.raise(line, ErrorCode::MultipleTimelinesInOneBlock);
            return;
        }
        if self.block.state.is_some() {
            self.raise(line, ErrorCode::MixedDiagramTypesInBlock);
            return;
        }

        let source = self.file.source_ref(self.block.line);
        let id = match self.model.find_timeline(group, name) {
            Some(id) => {
                let timeline = self.model.timeline_mut(id);
                if timeline.flags & FLAG_GHOST != 0 {
                    timeline.flags &= !FLAG_GHOST;
                    timeline.source = Some(source);
                }
                id
            }
            None => self.model.add_timeline(group, name, Some(source), 0),
        };
        self.block.timeline = Some(id);
        self.block.group = Some(self.model.timeline(id).group);
    }

    pub(super) fn add_atom_to_constant(&mut self, atom: u8, line: u32, text: Text) {
        let Some(constants) = self.block.api_constants.as_mut() else {
            return;
        };

        match Atom::from_u8(atom) {
            Some(Atom::Desc | Atom::Description) => constants.description.append(&text.text, text.fixed),
            Some(Atom::Name) => constants.name = text,
            Some(Atom::Brief) => match constants.constants.last_mut() {
                Some(constant) if !constant.brief.is_empty() => {
                    self.raise(line, ErrorCode::DoubleDescriptorFound);
                }
                Some(constant) => constant.brief = text,
                None => self.raise(line, ErrorCode::BriefWithoutAType),
            },
            // the value of a typed constant arrives in pieces
            Some(Atom::Constants) => match constants.constants.last_mut() {
                Some(constant) => constant.value.text.push_str(&text.text),
                None => self.raise(line, ErrorCode::UnexpectedAtom),
            },
            _ => self.raise(line, ErrorCode::UnexpectedAtom),
        }
    }

    pub(super) fn add_atom_to_type(&mut self, atom: u8, line: u32, text: Text) {
        let Some(api_type) = self.block.api_type.as_mut() else {
            return;
        };

        match Atom::from_u8(atom) {
            Some(Atom::Desc | Atom::Description) => api_type.description.append(&text.text, text.fixed),
            Some(Atom::Name) => {
                if api_type.depth > 0 {
                    api_type.add_record(TypeRecordKind::Name, Text::default(), text, Text::default());
                } else {
                    api_type.name = text;
                }
                api_type.depth -= 1;
            }
            Some(Atom::Record) => {
                api_type.depth += 1;
                api_type.add_record(TypeRecordKind::Record, text, Text::default(), Text::default());
            }
            Some(Atom::Type) => api_type.add_record(TypeRecordKind::Type, text, Text::default(), Text::default()),
            Some(Atom::Brief) => match api_type.records.last_mut() {
                Some(record) if !record.brief.is_empty() => {
                    self.raise(line, ErrorCode::DoubleDescriptorFound);
                }
                Some(record) => record.brief = text,
                None => self.raise(line, ErrorCode::BriefWithoutAType),
            },
            _ => self.raise(line, ErrorCode::UnexpectedAtom),
        }
    }

    pub(super) fn add_numeric_to_block(&mut self, atom: u8, line: u32, value: u32) {
        match Atom::from_u8(atom) {
            Some(Atom::Api) => match self.local_index(value).and_then(|index| self.file.local_api.get(index)) {
                Some(api) => self.block.api_function = Some(*api),
                None => self.raise(line, ErrorCode::UndefinedApi),
            },
            Some(Atom::Group) => {
                match self.local_index(value).and_then(|index| self.file.local_group(index as u16)) {
                    Some(group) => self.block.group = Some(group),
                    None => self.raise(line, ErrorCode::UndefinedGroup),
                }
            }
            _ => self.raise(line, ErrorCode::UnknownAtom),
        }
    }

    fn local_index(&self, value: u32) -> Option<usize> {
        (value <= u32::from(MAX_GROUPS_PER_FILE)).then_some(value as usize)
    }

    pub(super) fn add_pair_to_block(&mut self, atom: u8, group: u16, line: u32, name: Text, string: Text) {
        match Atom::from_u8(atom) {
            Some(Atom::Parameter) => self.block.parameters.push((name, string)),
            Some(Atom::Returns) => self.block.returns.push(ReturnValue {
                value: name,
                brief: string,
            }),
            Some(Atom::Record) => match self.block.api_constants.as_mut() {
                Some(constants) => constants.add_define(name, string),
                None => self.raise(line, ErrorCode::UnexpectedAtom),
            },
            Some(Atom::Type) => match self.block.api_type.as_mut() {
                Some(api_type) => api_type.add_record(TypeRecordKind::Type, name, string, Text::default()),
                None => self.raise(line, ErrorCode::TypeDefinitionInInvalidPlace),
            },
            Some(Atom::Synopsis) => {
                self.claim_application(group);
                match self.block_application() {
                    Some(application) => self
                        .model
                        .application_mut(application)
                        .synopses
                        .push(Synopsis { name, items: string }),
                    None => self.raise(line, ErrorCode::AtomRequiresApplicationAtom),
                }
            }
            _ => self.raise(line, ErrorCode::UnknownAtom),
        }
    }
}
