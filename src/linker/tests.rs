use super::*;
use crate::atom::{Atom, RECORD_GROUP_TYPE};
use crate::codec::compiled::{Counted, RECORD_API_FLAG, RECORD_FUNCTION_FLAG};
use crate::core::DocError;
use crate::model::{FLAG_IN_FUNCTION, FLAG_MESSAGE_SEND, FLAG_SEQUENCE_WAITFOR};

const D: u16 = DEFAULT_GROUP;

fn record(atom: Atom, group: u16, block: u16, line: u16, body: RecordBody) -> Record {
    Record {
        atom: atom.as_u8(),
        group,
        block,
        line,
        body,
    }
}

fn name(atom: Atom, group: u16, block: u16, line: u16, text: &str) -> Record {
    record(atom, group, block, line, RecordBody::Name(Counted::new(text.as_bytes())))
}

fn string(atom: Atom, block: u16, line: u16, text: &str) -> Record {
    record(atom, D, block, line, RecordBody::String(Counted::new(text.as_bytes())))
}

fn dump(atom: Atom, body: RecordBody) -> Record {
    record(atom, 0, 0, 1, body)
}

fn object(records: &[Record]) -> Vec<u8> {
    let mut out = Vec::new();
    FileHeader::new(Magic::Compiled, b"net.c", records.len() as u16)
        .encode(&mut out)
        .unwrap();
    for record in records {
        record.encode(&mut out).unwrap();
    }
    out
}

fn link(records: &[Record]) -> (Model, Diagnostics) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut linker = Linker::new(LinkOptions {
        quiet: true,
        ..LinkOptions::default()
    });
    linker.link_bytes("net.pdso", &object(records)).unwrap();
    linker.into_parts()
}

#[test]
fn test_state_blocks_build_transitions() {
    let (model, diagnostics) = link(&[
        dump(Atom::Action, RecordBody::Group(b"net".to_vec())),
        name(Atom::State, 1, 1, 3, "idle"),
        name(Atom::Next, 1, 1, 4, "connected"),
        name(Atom::Trigger, 1, 1, 5, "dial"),
        name(Atom::State, 1, 2, 8, "connected"),
        name(Atom::Next, 1, 2, 9, "idle"),
        string(Atom::Condition, 2, 10, "line drops"),
    ]);

    assert!(!diagnostics.failed(), "{:?}", diagnostics.raised());
    let net = model.find_group("net").unwrap();
    let idle = model.find_state(net, "idle").unwrap();
    let connected = model.find_state(net, "connected").unwrap();

    let state = model.state(idle);
    assert_eq!(state.transitions.len(), 1);
    assert_eq!(state.transitions[0].next, connected);
    let trigger = state.transitions[0].trigger.unwrap();
    assert_eq!(model.trigger(trigger).name, "dial");
    assert_eq!(model.trigger(trigger).flags & FLAG_GHOST, FLAG_GHOST);
    assert_eq!(model.trigger(trigger).source.as_ref().unwrap().line, 3);

    // the forward reference was filled in by the second block
    assert_eq!(model.state(connected).flags & FLAG_GHOST, 0);
    assert_eq!(model.state(connected).source.as_ref().unwrap().line, 8);
    assert_eq!(model.state(connected).transitions[0].condition.as_deref(), Some("line drops"));
}

#[test]
fn test_state_without_transition() {
    let (_, diagnostics) = link(&[name(Atom::State, D, 1, 3, "idle"), name(Atom::State, D, 2, 5, "finish")]);
    assert_eq!(diagnostics.count(ErrorCode::StateMustHaveTransition), 1);
    assert_eq!(diagnostics.raised()[0].line, 3);
    assert_eq!(diagnostics.raised()[0].parameter.as_deref(), Some("idle"));
}

#[test]
fn test_block_errors_are_reported() {
    let (_, diagnostics) = link(&[
        name(Atom::State, D, 1, 3, "a"),
        name(Atom::State, D, 1, 4, "b"),
        name(Atom::Next, D, 1, 5, "c"),
        name(Atom::Next, D, 1, 6, "d"),
        name(Atom::Timeline, D, 1, 7, "T"),
    ]);
    assert!(diagnostics.contains(ErrorCode::MultipleStatesInOneBlock));
    assert!(diagnostics.contains(ErrorCode::DuplicateTransition));
    assert!(diagnostics.contains(ErrorCode::MixedDiagramTypesInBlock));
}

#[test]
fn test_block_without_definer() {
    let (model, diagnostics) = link(&[string(Atom::Condition, 1, 3, "door open")]);
    assert_eq!(diagnostics.count(ErrorCode::BlockMustHaveDefiner), 1);
    assert_eq!(diagnostics.raised()[0].line, 3);
    assert!(model.group(model.default_group()).state_machine.is_none());
    assert!(model.group(model.default_group()).sequence.is_none());

    let (model, diagnostics) = link(&[
        dump(Atom::Action, RecordBody::Function(b"connect".to_vec())),
        name(Atom::Condition, RECORD_FUNCTION_FLAG, 1, 5, "ready"),
    ]);
    assert_eq!(diagnostics.count(ErrorCode::BlockMustHaveDefiner), 1);
    assert_eq!(diagnostics.raised()[0].line, 5);
    let connect = model.find_function("connect").unwrap();
    assert!(model.function(connect).body.is_empty());
}

#[test]
fn test_trigger_and_condition_conflict() {
    let (_, diagnostics) = link(&[
        name(Atom::State, D, 1, 3, "a"),
        name(Atom::Next, D, 1, 4, "a"),
        string(Atom::Condition, 1, 5, "x"),
        name(Atom::Trigger, D, 1, 6, "t"),
    ]);
    assert_eq!(diagnostics.count(ErrorCode::CannotHaveTriggerAndConditionInTransition), 1);
}

#[test]
fn test_duplicate_trigger_on_state() {
    let (model, diagnostics) = link(&[
        name(Atom::State, D, 1, 3, "a"),
        name(Atom::Next, D, 1, 4, "b"),
        name(Atom::Trigger, D, 1, 5, "go"),
        name(Atom::State, D, 2, 7, "a"),
        name(Atom::Next, D, 2, 8, "c"),
        name(Atom::Trigger, D, 2, 9, "go"),
    ]);
    assert_eq!(diagnostics.count(ErrorCode::DuplicateTrigger), 1);
    let a = model.find_state(model.default_group(), "a").unwrap();
    assert_eq!(model.state(a).transitions.len(), 1);
}

#[test]
fn test_sequence_blocks_build_nodes_and_messages() {
    let (model, diagnostics) = link(&[
        name(Atom::Timeline, D, 1, 3, "Client"),
        name(Atom::Send, D, 1, 4, "hello"),
        name(Atom::To, D, 1, 5, "Server"),
        name(Atom::Timeline, D, 2, 8, "Server"),
        name(Atom::Waitfor, D, 2, 9, "hello"),
    ]);
    assert!(!diagnostics.failed(), "{:?}", diagnostics.raised());

    let group = model.default_group();
    let client = model.find_timeline(group, "Client").unwrap();
    let server = model.find_timeline(group, "Server").unwrap();

    let sender = model.timeline(client).nodes[0];
    let message = model.node(sender).sent_message.unwrap();
    assert_eq!(model.message(message).name, "hello");
    assert_eq!(model.message(message).target_timeline, Some(server));
    assert_eq!(model.message(message).flags, FLAG_MESSAGE_SEND);

    let waiter = model.timeline(server).nodes[0];
    assert_eq!(model.node(waiter).wait.as_deref(), Some("hello"));
    assert!(model.node(waiter).has_flag(FLAG_SEQUENCE_WAITFOR));
}

#[test]
fn test_message_without_timeline() {
    let (_, diagnostics) = link(&[name(Atom::Send, D, 1, 3, "hello")]);
    assert!(diagnostics.contains(ErrorCode::SequenceNodeMissingTimeline));
}

#[test]
fn test_function_body_nodes() {
    let (model, diagnostics) = link(&[
        dump(Atom::Action, RecordBody::Function(b"connect".to_vec())),
        name(Atom::Send, RECORD_FUNCTION_FLAG, 1, 3, "syn"),
        name(Atom::To, RECORD_FUNCTION_FLAG, 1, 4, "Server"),
        name(Atom::Waitfor, RECORD_FUNCTION_FLAG, 2, 6, "ack"),
        name(Atom::Timeline, D, 3, 9, "Client"),
        name(Atom::Call, D, 3, 10, "connect"),
    ]);
    assert!(!diagnostics.failed(), "{:?}", diagnostics.raised());

    let connect = model.find_function("connect").unwrap();
    let body = &model.function(connect).body;
    assert_eq!(body.len(), 2);
    assert_eq!(body[0].message.as_deref(), Some("syn"));
    assert_eq!(body[0].to_timeline.as_deref(), Some("Server"));
    assert_ne!(body[0].flags & FLAG_IN_FUNCTION, 0);
    assert_eq!(body[1].wait.as_deref(), Some("ack"));

    let client = model.find_timeline(model.default_group(), "Client").unwrap();
    let call = model.timeline(client).nodes[0];
    assert_eq!(model.node(call).function, Some(connect));
}

#[test]
fn test_forward_call_then_definition() {
    let (model, _) = link(&[
        name(Atom::Timeline, D, 1, 3, "Client"),
        name(Atom::Call, D, 1, 4, "later"),
    ]);
    let later = model.find_function("later").unwrap();
    assert_eq!(model.function(later).flags, FLAG_GHOST);

    let mut linker = Linker::new(LinkOptions {
        quiet: true,
        ..LinkOptions::default()
    });
    let caller = object(&[name(Atom::Timeline, D, 1, 3, "Client"), name(Atom::Call, D, 1, 4, "later")]);
    linker.link_bytes("a.pdso", &caller).unwrap();
    linker
        .link_bytes("b.pdso", &object(&[dump(Atom::Action, RecordBody::Function(b"later".to_vec()))]))
        .unwrap();
    let (model, _) = linker.into_parts();
    let later = model.find_function("later").unwrap();
    assert_eq!(model.function(later).flags & FLAG_GHOST, 0);
}

#[test]
fn test_reserved_group_is_reported_and_added() {
    let (model, diagnostics) = link(&[dump(Atom::Action, RecordBody::Group(b"all".to_vec()))]);
    assert!(diagnostics.contains(ErrorCode::SpecifiedSpecialGroupInModel));
    assert!(model.find_group("all").is_some());
}

#[test]
fn test_file_block_sets_default_group() {
    let (model, diagnostics) = link(&[
        dump(Atom::Action, RecordBody::Group(b"io".to_vec())),
        name(Atom::File, D, 1, 1, "io.c"),
        record(Atom::Group, D, 1, 2, RecordBody::Numeric(1)),
        name(Atom::Timeline, D, 2, 5, "Reader"),
        name(Atom::Waitfor, D, 2, 6, "data"),
    ]);
    assert!(!diagnostics.failed(), "{:?}", diagnostics.raised());
    let io = model.find_group("io").unwrap();
    assert!(model.find_timeline(io, "Reader").is_some());
    assert!(model.group(model.default_group()).sequence.is_none());
}

#[test]
fn test_undefined_local_group() {
    let (_, diagnostics) = link(&[record(Atom::Group, D, 1, 2, RecordBody::Numeric(4))]);
    assert!(diagnostics.contains(ErrorCode::UndefinedGroup));
}

#[test]
fn test_api_function_from_dump_and_block() {
    let (model, diagnostics) = link(&[
        record(Atom::Action, D, 0, 2, RecordBody::Api(Vec::new())),
        record(
            Atom::Api,
            RECORD_API_FLAG,
            0,
            2,
            RecordBody::Type {
                type_name: b"int".to_vec(),
                name: b"io_open".to_vec(),
                brief: Vec::new(),
            },
        ),
        record(
            Atom::Parameter,
            RECORD_API_FLAG,
            0,
            2,
            RecordBody::Type {
                type_name: b"const char*".to_vec(),
                name: b"path".to_vec(),
                brief: Vec::new(),
            },
        ),
        record(Atom::Api, RECORD_API_FLAG, 0, 2, RecordBody::Empty),
        name(Atom::Description, RECORD_API_FLAG, 1, 3, "Opens a file."),
        record(
            Atom::Parameter,
            D,
            1,
            4,
            RecordBody::Pair {
                name: b"path".to_vec(),
                string: b"where".to_vec(),
            },
        ),
        record(
            Atom::Returns,
            D,
            1,
            5,
            RecordBody::Pair {
                name: b"-1".to_vec(),
                string: b"on failure".to_vec(),
            },
        ),
    ]);
    assert!(!diagnostics.failed(), "{:?}", diagnostics.raised());

    let api = model.find_api_function(model.default_group(), "io_open").unwrap();
    let function = model.api_function(api);
    assert_eq!(function.return_type.text, "int");
    assert_eq!(function.description.text, "Opens a file.");
    assert_eq!(function.parameters[0].brief.text, "where");
    assert_eq!(function.returns[0].value.text, "-1");
}

#[test]
fn test_type_spans_blocks() {
    let (model, diagnostics) = link(&[
        string(Atom::Description, 1, 3, "A point."),
        Record {
            atom: RECORD_GROUP_TYPE,
            group: D,
            block: 1,
            line: 4,
            body: RecordBody::Start,
        },
        record(
            Atom::Type,
            D,
            2,
            5,
            RecordBody::Type {
                type_name: b"int".to_vec(),
                name: b"x".to_vec(),
                brief: Vec::new(),
            },
        ),
        string(Atom::Brief, 2, 5, "across"),
        name(Atom::Name, D, 3, 7, "point"),
        Record {
            atom: RECORD_GROUP_TYPE,
            group: D,
            block: 3,
            line: 7,
            body: RecordBody::End,
        },
    ]);
    assert!(!diagnostics.failed(), "{:?}", diagnostics.raised());

    let api = model.group(model.default_group()).api.as_ref().unwrap();
    let point = &api.types[0];
    assert_eq!(point.name.text, "point");
    assert_eq!(point.description.text, "A point.");
    assert_eq!(point.records.len(), 1);
    assert_eq!(point.records[0].brief.text, "across");
}

#[test]
fn test_constants_group() {
    let (model, diagnostics) = link(&[
        record(Atom::Constants, D, 1, 3, RecordBody::Empty),
        string(Atom::Description, 1, 3, "Limits."),
        record(
            Atom::Record,
            D,
            1,
            4,
            RecordBody::Pair {
                name: b"MAX".to_vec(),
                string: b"10".to_vec(),
            },
        ),
        string(Atom::Brief, 1, 4, "upper"),
        string(Atom::Brief, 1, 4, "again"),
        record(Atom::EndConstants, D, 2, 6, RecordBody::Empty),
    ]);
    assert_eq!(diagnostics.count(ErrorCode::DoubleDescriptorFound), 1);

    let api = model.group(model.default_group()).api.as_ref().unwrap();
    let constants = &api.constants[0];
    assert_eq!(constants.description.text, "Limits.");
    assert_eq!(constants.constants[0].name.text, "MAX");
    assert_eq!(constants.constants[0].brief.text, "upper");
}

#[test]
fn test_application_option_block() {
    let (model, diagnostics) = link(&[
        dump(Atom::Action, RecordBody::Application(b"".to_vec())),
        dump(Atom::Action, RecordBody::Application(b"pdsc".to_vec())),
        name(Atom::Option, 1, 1, 3, "-o"),
        name(Atom::Value, 1, 1, 4, "file"),
        record(Atom::Required, D, 1, 5, RecordBody::Boolean(true)),
        string(Atom::Description, 1, 6, "Output name."),
        name(Atom::Section, 1, 2, 9, "NOTES"),
        name(Atom::Section, D, 2, 10, "Some notes."),
    ]);
    assert!(!diagnostics.failed(), "{:?}", diagnostics.raised());

    let application = &model.applications[1];
    assert_eq!(application.name.text, "pdsc");
    let option = &application.options[0];
    assert_eq!(option.name.text, "-o");
    assert_eq!(option.value.text, "file");
    assert_eq!(option.flags, crate::model::OPTION_FLAG_REQUIRED);
    assert_eq!(option.description.text, "Output name.");
    assert_eq!(application.sections[0].data.text, "Some notes.");
}

#[test]
fn test_value_without_option() {
    let (_, diagnostics) = link(&[
        dump(Atom::Action, RecordBody::Application(b"".to_vec())),
        dump(Atom::Action, RecordBody::Application(b"pdsc".to_vec())),
        name(Atom::Value, 1, 1, 4, "file"),
    ]);
    assert!(diagnostics.contains(ErrorCode::ValueMustBeAssociatedWithOption));
}

#[test]
fn test_samples_are_collected() {
    let (model, _) = link(&[dump(
        Atom::Sample,
        RecordBody::Sample {
            name: b"open".to_vec(),
            body: b"fd = open(path);".to_vec(),
        },
    )]);
    assert_eq!(model.samples[0].name, "open");
    assert_eq!(model.samples[0].body.text, "fd = open(path);");
}

#[test]
fn test_bad_magic_is_fatal() {
    let mut bytes = object(&[]);
    bytes[0] = b'X';
    let mut linker = Linker::new(LinkOptions::default());
    assert!(matches!(linker.link_bytes("bad", &bytes), Err(DocError::CorruptFile)));
}

#[test]
fn test_summary_counts() {
    let mut linker = Linker::new(LinkOptions {
        quiet: true,
        ..LinkOptions::default()
    });
    let summary = linker
        .link_bytes(
            "net.pdso",
            &object(&[
                name(Atom::State, D, 1, 3, "finish"),
                name(Atom::State, D, 2, 5, "start"),
                name(Atom::Next, D, 2, 6, "finish"),
            ]),
        )
        .unwrap();
    assert_eq!(summary, FileSummary { records: 3, blocks: 2 });
}
