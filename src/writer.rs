//! Linked object output.
//!
//! The resolved model is written in one pass: samples, then every named
//! application, then for each group in creation order its state machine,
//! sequence diagram and API. Each structure is bracketed by start and end
//! records so the renderer can rebuild the nesting while reading forward.
//!
//! States are numbered from 0 within their machine and sequence nodes from 1
//! across all timelines of their diagram before anything is written, so a
//! transition or message can refer to an item that comes later in the file.

use crate::codec::{BlockWriter, Counted, FileHeader, LinkedRecord, LinkedType, Magic};
use crate::core::{Diagnostics, DocError, DocResult, ErrorCode};
use crate::model::{Application, GroupId, MessageId, Model, Text, TriggerId, FLAG_BROADCAST};
use std::io::Write;
use std::path::Path;

/// Most options a synopsis line can list.
pub const MAX_SYNOPSIS_OPTIONS: usize = 255;

/// Shown as the destination of a message that reached no timeline.
const UNKNOWN_TIMELINE: &[u8] = b"Unknown";

/// Write the linked object for `model` to `out` and return the number of
/// bytes written. Synopsis problems are raised on `diagnostics`.
pub fn produce_output<W: Write>(model: &mut Model, diagnostics: &mut Diagnostics, out: W) -> DocResult<usize> {
    let mut writer = LinkedWriter {
        model,
        diagnostics,
        out: BlockWriter::new(out),
    };
    writer.write_all()?;
    writer.out.close()
}

/// Write the linked object for `model` to the file at `path`. The object is
/// built in memory and the file is only created when nothing has been raised
/// on `diagnostics`; `None` means no file was written.
pub fn write_linked_file(model: &mut Model, diagnostics: &mut Diagnostics, path: &Path) -> DocResult<Option<usize>> {
    let mut bytes = Vec::new();
    let written = produce_output(model, diagnostics, &mut bytes)?;
    if diagnostics.failed() {
        log::debug!("not writing {}: {} warnings", path.display(), diagnostics.raised().len());
        return Ok(None);
    }

    std::fs::write(path, &bytes).map_err(|source| DocError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(written))
}

fn counted(text: &Text) -> Counted {
    Counted {
        bytes: text.as_bytes().to_vec(),
        fixed: text.fixed,
    }
}

fn plain(text: &str) -> Counted {
    Counted::new(text.as_bytes())
}

struct LinkedWriter<'a, W: Write> {
    model: &'a mut Model,
    diagnostics: &'a mut Diagnostics,
    out: BlockWriter<W>,
}

impl<W: Write> LinkedWriter<'_, W> {
    fn write_all(&mut self) -> DocResult<()> {
        // Several inputs went into the object, so it names none of them.
        self.out.write_header(&FileHeader::new(Magic::Linked, b"", 0))?;

        self.write_samples()?;
        self.write_applications()?;

        let groups: Vec<GroupId> = self.model.group_ids().collect();
        for group in groups {
            if self.model.group(group).state_machine.is_some() {
                self.write_state_machine(group)?;
            }
            if self.model.group(group).sequence.is_some() {
                self.write_sequence(group)?;
            }
            if self.model.group(group).api.is_some() {
                self.write_api(group)?;
            }
        }
        Ok(())
    }

    fn record(&mut self, record: LinkedRecord) -> DocResult<()> {
        self.out.write_record(&record)
    }

    fn empty(&mut self, kind: LinkedType) -> DocResult<()> {
        self.record(LinkedRecord::Empty(kind))
    }

    fn group_name(&self, group: GroupId) -> Vec<u8> {
        self.model.group(group).name.as_bytes().to_vec()
    }

    fn trigger_record(&self, kind: LinkedType, trigger: TriggerId) -> LinkedRecord {
        let trigger = self.model.trigger(trigger);
        LinkedRecord::Group {
            kind,
            group: self.group_name(trigger.group),
            name: trigger.name.as_bytes().to_vec(),
        }
    }

    fn write_samples(&mut self) -> DocResult<()> {
        let samples: Vec<LinkedRecord> = self
            .model
            .samples
            .iter()
            .map(|sample| LinkedRecord::Pair {
                kind: LinkedType::Sample,
                name: sample.name.as_bytes().to_vec(),
                string: counted(&sample.body),
            })
            .collect();

        for sample in samples {
            self.record(sample)?;
        }
        Ok(())
    }

    fn write_applications(&mut self) -> DocResult<()> {
        let applications: Vec<Application> = self
            .model
            .applications
            .iter()
            .filter(|application| !application.name.is_empty())
            .cloned()
            .collect();

        for application in &applications {
            self.write_application(application)?;
        }
        Ok(())
    }

    fn write_application(&mut self, application: &Application) -> DocResult<()> {
        self.record(LinkedRecord::String(LinkedType::ApplicationStart, counted(&application.name)))?;

        for option in &application.options {
            self.record(LinkedRecord::Option {
                kind: LinkedType::ApplicationOption,
                flags: option.flags as u16,
                name: counted(&option.name),
                value: counted(&option.value),
                description: counted(&option.description),
            })?;
        }

        for synopsis in application.synopses.iter().filter(|synopsis| !synopsis.name.is_empty()) {
            let (index, missing) = application.resolve_synopsis(&synopsis.items.text, MAX_SYNOPSIS_OPTIONS);
            for name in &missing {
                self.diagnostics.raise(0, ErrorCode::OptionRequiredBySynopsisMissing, Some(name));
            }
            if index.len() == MAX_SYNOPSIS_OPTIONS {
                self.diagnostics.raise(0, ErrorCode::MaxNumberOfOptionsInSynopsis, None);
            }

            self.record(LinkedRecord::Synopsis {
                kind: LinkedType::ApplicationSynopsis,
                name: synopsis.name.as_bytes().to_vec(),
                index,
            })?;
        }

        for command in &application.commands {
            self.record(LinkedRecord::Type {
                kind: LinkedType::ApplicationCommand,
                type_name: command.name.as_bytes().to_vec(),
                name: command.parameters.as_bytes().to_vec(),
                brief: counted(&command.description),
            })?;
        }

        for section in &application.sections {
            self.record(LinkedRecord::Pair {
                kind: LinkedType::ApplicationSection,
                name: section.name.as_bytes().to_vec(),
                string: counted(&section.data),
            })?;
            for sub_section in &section.sub_sections {
                self.record(LinkedRecord::Pair {
                    kind: LinkedType::ApplicationSubSection,
                    name: sub_section.name.as_bytes().to_vec(),
                    string: counted(&sub_section.data),
                })?;
            }
        }

        self.empty(LinkedType::ApplicationEnd)
    }

    fn write_state_machine(&mut self, group: GroupId) -> DocResult<()> {
        let states = match self.model.group(group).state_machine.as_ref() {
            Some(machine) => machine.states.clone(),
            None => return Ok(()),
        };
        for (tag, state) in states.iter().enumerate() {
            self.model.state_mut(*state).tag = tag as u16;
        }

        let name = self.model.group(group).name.clone();
        self.record(LinkedRecord::String(LinkedType::StateMachineStart, plain(&name)))?;

        for id in states {
            let state = self.model.state(id).clone();
            if state.name.is_empty() {
                continue;
            }

            self.record(LinkedRecord::GroupId {
                kind: LinkedType::State,
                id: state.tag,
                group: self.group_name(state.group),
                name: state.name.as_bytes().to_vec(),
            })?;

            for transition in &state.transitions {
                let next = self.model.state(transition.next).tag;
                self.record(LinkedRecord::Numeric(LinkedType::Transition, next))?;

                if let Some(trigger) = transition.trigger {
                    let record = self.trigger_record(LinkedType::Trigger, trigger);
                    self.record(record)?;
                } else if let Some(condition) = &transition.condition {
                    self.record(LinkedRecord::String(LinkedType::Condition, plain(condition)))?;
                }

                for trigger in &transition.triggers {
                    let record = self.trigger_record(LinkedType::Triggers, *trigger);
                    self.record(record)?;
                }
            }

            self.empty(LinkedType::End)?;
        }

        self.empty(LinkedType::StateMachineEnd)
    }

    fn write_sequence(&mut self, group: GroupId) -> DocResult<()> {
        let timelines = match self.model.group(group).sequence.as_ref() {
            Some(sequence) => sequence.timelines.clone(),
            None => return Ok(()),
        };

        let mut level = 1;
        for timeline in &timelines {
            for node in self.model.timeline(*timeline).nodes.clone() {
                self.model.node_mut(node).level = level;
                level += 1;
            }
        }

        let name = self.model.group(group).name.clone();
        self.record(LinkedRecord::String(LinkedType::SequenceStart, plain(&name)))?;

        for timeline in timelines {
            let line = self.model.timeline(timeline).clone();
            if line.flags & FLAG_BROADCAST != 0 {
                continue;
            }

            self.record(LinkedRecord::Group {
                kind: LinkedType::Timeline,
                group: self.group_name(line.group),
                name: line.name.as_bytes().to_vec(),
            })?;

            for id in &line.nodes {
                let node = self.model.node(*id);
                let start = LinkedRecord::Numerics(LinkedType::NodeStart, node.level as u16, node.flags);
                let sent = node.sent_message.map(|message| self.message_record(node.level, message));

                self.record(start)?;
                if let Some(sent) = sent {
                    self.record(sent)?;
                }
                self.empty(LinkedType::NodeEnd)?;
            }
        }

        self.empty(LinkedType::SequenceEnd)
    }

    fn message_record(&self, level: u32, message: MessageId) -> LinkedRecord {
        let message = self.model.message(message);
        let to = message.receiver.map_or(0, |receiver| self.model.node(receiver).level);
        let timeline = message.target_timeline.map_or(UNKNOWN_TIMELINE.to_vec(), |target| {
            self.model.timeline(target).name.as_bytes().to_vec()
        });

        // Ids are a byte wide on the wire.
        LinkedRecord::Message {
            kind: LinkedType::SentMessage,
            from: (level & 0xff) as u8,
            to: (to & 0xff) as u8,
            timeline,
            message: message.name.as_bytes().to_vec(),
        }
    }

    fn write_api(&mut self, group: GroupId) -> DocResult<()> {
        let Some(api) = self.model.group(group).api.clone() else {
            return Ok(());
        };

        let name = self.model.group(group).name.clone();
        self.record(LinkedRecord::String(LinkedType::ApiStart, plain(&name)))?;

        for id in &api.functions {
            let function = self.model.api_function(*id).clone();
            self.record(LinkedRecord::Type {
                kind: LinkedType::ApiFunction,
                type_name: function.return_type.as_bytes().to_vec(),
                name: function.name.as_bytes().to_vec(),
                brief: Counted::default(),
            })?;
            self.record(LinkedRecord::String(LinkedType::ApiDescription, counted(&function.description)))?;
            self.record(LinkedRecord::String(LinkedType::ApiAction, counted(&function.action)))?;

            for parameter in &function.parameters {
                self.record(LinkedRecord::Type {
                    kind: LinkedType::ApiParameter,
                    type_name: parameter.type_name.as_bytes().to_vec(),
                    name: parameter.name.as_bytes().to_vec(),
                    brief: counted(&parameter.brief),
                })?;
            }
            for returns in &function.returns {
                self.record(LinkedRecord::Pair {
                    kind: LinkedType::ApiReturns,
                    name: returns.value.as_bytes().to_vec(),
                    string: counted(&returns.brief),
                })?;
            }

            self.empty(LinkedType::ApiFunctionEnd)?;
        }

        for api_type in &api.types {
            self.record(LinkedRecord::Pair {
                kind: LinkedType::ApiTypeStart,
                name: api_type.name.as_bytes().to_vec(),
                string: counted(&api_type.description),
            })?;
            for field in &api_type.records {
                self.record(LinkedRecord::Type {
                    kind: LinkedType::ApiTypeField,
                    type_name: field.type_item.as_bytes().to_vec(),
                    name: field.name_value.as_bytes().to_vec(),
                    brief: counted(&field.brief),
                })?;
            }
            self.empty(LinkedType::ApiTypeEnd)?;
        }

        for constants in &api.constants {
            self.record(LinkedRecord::Pair {
                kind: LinkedType::ApiConstantsStart,
                name: constants.name.as_bytes().to_vec(),
                string: counted(&constants.description),
            })?;
            for constant in &constants.constants {
                self.record(LinkedRecord::Constant {
                    kind: LinkedType::ApiConstant,
                    type_name: constant.type_name.as_bytes().to_vec(),
                    name: constant.name.as_bytes().to_vec(),
                    value: constant.value.as_bytes().to_vec(),
                    brief: counted(&constant.brief),
                })?;
            }
            self.empty(LinkedType::ApiConstantsEnd)?;
        }

        self.empty(LinkedType::ApiEnd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_linked;
    use crate::model::{Node, Transition, FLAG_MESSAGE_SEND};
    use LinkedType as L;

    fn write(model: &mut Model) -> (Vec<LinkedRecord>, Diagnostics) {
        let mut diagnostics = Diagnostics::silent();
        let mut bytes = Vec::new();
        let written = produce_output(model, &mut diagnostics, &mut bytes).unwrap();
        assert_eq!(written, bytes.len());

        let (header, records) = read_linked(&bytes).unwrap();
        assert_eq!(header.magic, Magic::Linked);
        assert_eq!(header.record_count, 0);
        assert!(header.input_name.is_empty());
        (records, diagnostics)
    }

    fn kinds(records: &[LinkedRecord]) -> Vec<LinkedType> {
        records.iter().map(LinkedRecord::kind).collect()
    }

    #[test]
    fn test_empty_model_is_header_only() {
        let mut model = Model::new();
        let mut diagnostics = Diagnostics::silent();
        let mut bytes = Vec::new();
        produce_output(&mut model, &mut diagnostics, &mut bytes).unwrap();
        assert_eq!(bytes.len(), 18);
    }

    #[test]
    fn test_state_machine_records() {
        let mut model = Model::new();
        let group = model.find_or_add_group("door");
        let start = model.add_state(group, "start", None, 0);
        let open = model.add_state(group, "open", None, 0);
        let bell = model.add_trigger(group, "bell", 0, None);
        model.state_mut(start).transitions.push(Transition {
            next: open,
            condition: None,
            trigger: Some(bell),
            triggers: Vec::new(),
        });
        model.state_mut(open).transitions.push(Transition {
            next: start,
            condition: Some("timeout".to_string()),
            trigger: None,
            triggers: vec![bell],
        });

        let (records, _) = write(&mut model);
        assert_eq!(
            kinds(&records),
            vec![
                L::StateMachineStart,
                L::State,
                L::Transition,
                L::Trigger,
                L::End,
                L::State,
                L::Transition,
                L::Condition,
                L::Triggers,
                L::End,
                L::StateMachineEnd,
            ]
        );
        assert_eq!(
            records[5],
            LinkedRecord::GroupId { kind: L::State, id: 1, group: b"door".to_vec(), name: b"open".to_vec() }
        );
        assert_eq!(records[6], LinkedRecord::Numeric(L::Transition, 0));
    }

    #[test]
    fn test_sequence_levels_span_timelines() {
        let mut model = Model::new();
        let group = model.find_or_add_group("net");
        let client = model.add_timeline(group, "Client", None, 0);
        let server = model.add_timeline(group, "Server", None, 0);
        model.add_timeline(group, "broadcast", None, FLAG_BROADCAST);

        let sender = model.push_node(Node::new(client, group, FLAG_MESSAGE_SEND));
        let receiver = model.push_node(Node::new(server, group, 0));
        let message = model.create_message(sender, Some(server), "hello", FLAG_MESSAGE_SEND);
        model.link_message(message, receiver, server);
        let lost = model.push_node(Node::new(server, group, FLAG_MESSAGE_SEND));
        model.create_message(lost, None, "nowhere", FLAG_MESSAGE_SEND);

        let (records, _) = write(&mut model);
        let timelines = records.iter().filter(|r| r.kind() == LinkedType::Timeline).count();
        assert_eq!(timelines, 2);

        let messages: Vec<&LinkedRecord> = records.iter().filter(|r| r.kind() == LinkedType::SentMessage).collect();
        assert_eq!(
            messages[0],
            &LinkedRecord::Message {
                kind: LinkedType::SentMessage,
                from: 1,
                to: 2,
                timeline: b"Server".to_vec(),
                message: b"hello".to_vec(),
            }
        );
        assert_eq!(
            messages[1],
            &LinkedRecord::Message {
                kind: LinkedType::SentMessage,
                from: 3,
                to: 0,
                timeline: b"Unknown".to_vec(),
                message: b"nowhere".to_vec(),
            }
        );
    }

    #[test]
    fn test_application_synopsis_resolves_option_ids() {
        let mut model = Model::new();
        let tool = model.find_add_application("tool");
        let application = model.application_mut(tool);
        application.add_option(Text::new("-v"), 0);
        application.add_option(Text::new("-o"), 0);
        application.synopses.push(crate::model::Synopsis {
            name: Text::new("tool"),
            items: Text::new("-o, -v, -x"),
        });

        let (records, diagnostics) = write(&mut model);
        assert_eq!(
            kinds(&records),
            vec![L::ApplicationStart, L::ApplicationOption, L::ApplicationOption, L::ApplicationSynopsis, L::ApplicationEnd]
        );
        assert_eq!(
            records[3],
            LinkedRecord::Synopsis { kind: L::ApplicationSynopsis, name: b"tool".to_vec(), index: vec![1, 0] }
        );
        assert_eq!(diagnostics.count(ErrorCode::OptionRequiredBySynopsisMissing), 1);
    }

    #[test]
    fn test_bad_synopsis_leaves_no_file() {
        let mut model = Model::new();
        let tool = model.find_add_application("tool");
        model.application_mut(tool).synopses.push(crate::model::Synopsis {
            name: Text::new("tool"),
            items: Text::new("-x"),
        });
        let path = std::env::temp_dir().join(format!("gendoc-synopsis-{}.pdsl", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut diagnostics = Diagnostics::silent();
        let written = write_linked_file(&mut model, &mut diagnostics, &path).unwrap();
        assert_eq!(written, None);
        assert_eq!(diagnostics.count(ErrorCode::OptionRequiredBySynopsisMissing), 1);
        assert!(!path.exists());
    }

    #[test]
    fn test_linked_file_written_when_clean() {
        let mut model = Model::new();
        let group = model.find_or_add_group("io");
        model.add_state(group, "start", None, 0);
        let path = std::env::temp_dir().join(format!("gendoc-clean-{}.pdsl", std::process::id()));

        let mut diagnostics = Diagnostics::silent();
        let written = write_linked_file(&mut model, &mut diagnostics, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written, Some(bytes.len()));
        assert!(read_linked(&bytes).is_ok());
    }

    #[test]
    fn test_samples_written_first() {
        let mut model = Model::new();
        let group = model.find_or_add_group("io");
        model.add_state(group, "start", None, 0);
        model.add_sample(b"example", b"int x;");

        let (records, _) = write(&mut model);
        assert_eq!(
            records[0],
            LinkedRecord::Pair { kind: LinkedType::Sample, name: b"example".to_vec(), string: Counted::fixed(b"int x;") }
        );
    }
}
