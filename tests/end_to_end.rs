//! End-to-end tests: source text through the compiler, the linker, the
//! resolver and the writer, checking the model and the linked object.

use gendoc::codec::header::VERSION_MAJOR;
use gendoc::codec::{read_linked, FileHeader, LinkedRecord, LinkedType, Magic, RecordBody, RecordReader};
use gendoc::model::{FLAG_BROADCAST, FLAG_FUNCTION_END, FLAG_GHOST};
use gendoc::{
    compile_source, produce_output, semantic_check, CompileOptions, Diagnostics, DocError, ErrorCode, LinkOptions,
    Linker, Model,
};

fn compile(name: &str, source: &str) -> Vec<u8> {
    let _ = env_logger::builder().is_test(true).try_init();
    let options = CompileOptions {
        quiet: true,
        ..CompileOptions::default()
    };
    let compilation = compile_source(source.as_bytes(), name, &options)
        .unwrap_or_else(|e| panic!("failed to compile {name}: {e}"));
    assert!(
        compilation.diagnostics.raised().is_empty(),
        "{name}: {:?}",
        compilation.diagnostics.raised()
    );
    compilation.generate_output().unwrap()
}

fn link_with(objects: &[Vec<u8>], options: LinkOptions) -> (Model, Diagnostics) {
    let mut linker = Linker::new(LinkOptions { quiet: true, ..options });
    for (index, object) in objects.iter().enumerate() {
        linker.link_bytes(&format!("input{index}.pdso"), object).unwrap();
    }
    linker.into_parts()
}

fn link(objects: &[Vec<u8>]) -> (Model, Diagnostics) {
    link_with(objects, LinkOptions::default())
}

/// Resolve with the default depth, asserting nothing was raised.
fn resolve(model: &mut Model, diagnostics: &mut Diagnostics) {
    let ok = semantic_check(model, diagnostics, LinkOptions::default().max_call_depth);
    assert!(ok, "{:?}", diagnostics.raised());
}

fn write(model: &mut Model, diagnostics: &mut Diagnostics) -> Vec<LinkedRecord> {
    let mut bytes = Vec::new();
    let written = produce_output(model, diagnostics, &mut bytes).unwrap();
    assert_eq!(written, bytes.len());

    let (header, records) = read_linked(&bytes).unwrap();
    assert_eq!(header.magic, Magic::Linked);
    records
}

fn of_kind(records: &[LinkedRecord], kind: LinkedType) -> Vec<&LinkedRecord> {
    records.iter().filter(|record| record.kind() == kind).collect()
}

#[test]
fn test_single_state_compiles_to_group_and_transition() {
    let object = compile("door.c", "/**\n * @state g.A\n * @next finish\n */\n");

    let (header, start) = FileHeader::decode(&object, Magic::Compiled).unwrap();
    assert_eq!(header.input_name, b"door.c");
    let mut reader = RecordReader::new(&object, start);
    let mut records = Vec::new();
    while let Some(record) = reader.next_record().unwrap() {
        records.push(record);
    }

    let groups: Vec<_> = records
        .iter()
        .filter(|record| matches!(&record.body, RecordBody::Group(name) if !name.is_empty()))
        .collect();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].body, RecordBody::Group(b"g".to_vec()));

    let names: Vec<&[u8]> = records
        .iter()
        .filter_map(|record| match &record.body {
            RecordBody::Name(text) => Some(text.bytes.as_slice()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec![b"A".as_slice(), b"finish".as_slice()]);

    let (mut model, mut diagnostics) = link(&[object]);
    assert!(!diagnostics.failed(), "{:?}", diagnostics.raised());

    let g = model.find_group("g").unwrap();
    let a = model.find_state(g, "A").unwrap();
    let finish = model.find_state(g, "finish").unwrap();
    assert_eq!(model.group(g).state_machine.as_ref().unwrap().states.len(), 2);
    assert_ne!(model.state(finish).flags & FLAG_GHOST, 0);
    assert_eq!(model.state(a).transitions.len(), 1);
    assert_eq!(model.state(a).transitions[0].next, finish);

    // no state called start anywhere in the group
    assert!(!semantic_check(&mut model, &mut diagnostics, 10));
    assert_eq!(diagnostics.count(ErrorCode::StateMachineDoesNotHaveStart), 1);
    assert_eq!(diagnostics.count(ErrorCode::UndefinedReferencedStateFound), 0);
}

#[test]
fn test_state_machine_across_files() {
    let first = compile("door.c", "/**\n * @state g.A\n * @next finish\n */\n");
    let second = compile("door_init.c", "/**\n * @state g.start\n * @next A\n */\n");

    let (mut model, mut diagnostics) = link(&[first, second]);
    resolve(&mut model, &mut diagnostics);

    let g = model.find_group("g").unwrap();
    let start = model.find_state(g, "start").unwrap();
    assert_eq!(model.group(g).state_machine.as_ref().unwrap().init_state, Some(start));

    let records = write(&mut model, &mut diagnostics);
    assert_eq!(of_kind(&records, LinkedType::StateMachineStart).len(), 1);
    let states: Vec<&[u8]> = records
        .iter()
        .filter_map(|record| match record {
            LinkedRecord::GroupId {
                kind: LinkedType::State,
                name,
                ..
            } => Some(name.as_slice()),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![b"A".as_slice(), b"finish".as_slice(), b"start".as_slice()]);
}

#[test]
fn test_undeclared_state_is_reported() {
    let object = compile(
        "door.c",
        "/** @state g.start\n * @next opening */\n/** @state g.closed\n * @next finish */\n",
    );
    let (mut model, mut diagnostics) = link(&[object]);
    assert!(!semantic_check(&mut model, &mut diagnostics, 10));
    assert_eq!(diagnostics.count(ErrorCode::UndefinedReferencedStateFound), 1);
    let raised = diagnostics
        .raised()
        .iter()
        .find(|diagnostic| diagnostic.code == ErrorCode::UndefinedReferencedStateFound)
        .unwrap();
    assert_eq!(raised.parameter.as_deref(), Some("opening"));
}

#[test]
fn test_send_reaches_wait_on_target_timeline() {
    let object = compile(
        "ping.c",
        "\
/**
 * @timeline Client
 * @send ping
 * @to Server
 */
/**
 * @timeline Server
 * @waitfor ping
 */
",
    );
    let (mut model, mut diagnostics) = link(&[object]);
    resolve(&mut model, &mut diagnostics);

    let group = model.default_group();
    let client = model.find_timeline(group, "Client").unwrap();
    let server = model.find_timeline(group, "Server").unwrap();
    let sender = model.timeline(client).nodes[0];
    let waiter = model.timeline(server).nodes[0];

    let message = model.node(sender).sent_message.unwrap();
    assert_eq!(model.message(message).receiver, Some(waiter));
    assert_eq!(model.message(message).target_timeline, Some(server));
    assert_eq!(model.node(waiter).received_message, Some(message));

    let records = write(&mut model, &mut diagnostics);
    let sent = of_kind(&records, LinkedType::SentMessage);
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0],
        &LinkedRecord::Message {
            kind: LinkedType::SentMessage,
            from: 1,
            to: 2,
            timeline: b"Server".to_vec(),
            message: b"ping".to_vec(),
        }
    );
}

#[test]
fn test_send_without_wait_blocks_output() {
    let object = compile("ping.c", "/**\n * @timeline Client\n * @send ping\n * @to Server\n */\n");
    let (mut model, mut diagnostics) = link(&[object]);
    assert!(!semantic_check(&mut model, &mut diagnostics, 10));
    assert_eq!(diagnostics.count(ErrorCode::SendAndNoWait), 1);
}

#[test]
fn test_missing_after_target_leaves_order() {
    let object = compile(
        "queue.c",
        "\
/** @timeline Worker
 *  @send job
 *  @to Queue */
/** @timeline Worker
 *  @send done
 *  @to Queue
 *  @after missing_name */
/** @timeline Queue
 *  @waitfor job */
/** @timeline Queue
 *  @waitfor done */
",
    );
    let (mut model, mut diagnostics) = link(&[object]);
    let worker = model.find_timeline(model.default_group(), "Worker").unwrap();
    let before = model.timeline(worker).nodes.clone();

    assert!(!semantic_check(&mut model, &mut diagnostics, 10));
    assert_eq!(diagnostics.count(ErrorCode::AfterNodeDoesNotExist), 1);
    assert_eq!(model.timeline(worker).nodes, before);

    // the later passes still ran
    for node in &before {
        let message = model.node(*node).sent_message.unwrap();
        assert!(model.message(message).receiver.is_some());
    }
}

#[test]
fn test_after_reorder_runs_once() {
    let object = compile(
        "queue.c",
        "\
/** @timeline Worker
 *  @send second
 *  @to Queue
 *  @after first */
/** @timeline Worker
 *  @send first
 *  @to Queue */
/** @timeline Queue
 *  @waitfor first */
/** @timeline Queue
 *  @waitfor second */
",
    );
    let (mut model, mut diagnostics) = link(&[object]);
    let worker = model.find_timeline(model.default_group(), "Worker").unwrap();
    let linked = model.timeline(worker).nodes.clone();

    resolve(&mut model, &mut diagnostics);
    let ordered = model.timeline(worker).nodes.clone();
    assert_eq!(ordered, vec![linked[1], linked[0]]);

    // resolving an already ordered timeline changes nothing
    resolve(&mut model, &mut diagnostics);
    assert_eq!(model.timeline(worker).nodes, ordered);
}

#[test]
fn test_broadcast_copies_per_receiver() {
    let object = compile(
        "bus.c",
        "\
/** @timeline Hub
 *  @send reset
 *  @to broadcast */
/** @timeline A
 *  @waitfor reset */
/** @timeline B
 *  @waitfor reset */
/** @timeline B
 *  @waitfor other */
",
    );
    let (mut model, mut diagnostics) = link(&[object]);
    let group = model.default_group();
    let hub = model.find_timeline(group, "Hub").unwrap();
    let original = model.timeline(hub).nodes[0];

    resolve(&mut model, &mut diagnostics);

    let a = model.find_timeline(group, "A").unwrap();
    let b = model.find_timeline(group, "B").unwrap();
    let waits = [model.timeline(a).nodes[0], model.timeline(b).nodes[0]];

    let sent = model.node(original).sent_message.unwrap();
    assert_eq!(model.message(sent).receiver, None);
    assert_ne!(model.message(sent).flags & FLAG_BROADCAST, 0);

    let nodes = model.timeline(hub).nodes.clone();
    assert_eq!(nodes.len(), 3);
    let receivers: Vec<_> = nodes[1..]
        .iter()
        .map(|node| {
            let message = model.node(*node).sent_message.unwrap();
            model.message(message).receiver.unwrap()
        })
        .collect();
    assert_eq!(receivers, waits);

    // the unrelated wait on B stays unclaimed
    let other = model.timeline(b).nodes[1];
    assert_eq!(model.node(other).received_message, None);

    let records = write(&mut model, &mut diagnostics);
    let timelines: Vec<&[u8]> = records
        .iter()
        .filter_map(|record| match record {
            LinkedRecord::Group {
                kind: LinkedType::Timeline,
                name,
                ..
            } => Some(name.as_slice()),
            _ => None,
        })
        .collect();
    assert!(!timelines.contains(&b"broadcast".as_slice()));
}

#[test]
fn test_after_pulls_dependent_up_to_match() {
    let object = compile(
        "queue.c",
        "\
/** @timeline Worker
 *  @send hello
 *  @to Queue */
/** @timeline Worker
 *  @send other
 *  @to Queue */
/** @timeline Worker
 *  @send ack
 *  @to Queue
 *  @after hello */
/** @timeline Queue
 *  @waitfor hello */
/** @timeline Queue
 *  @waitfor other */
/** @timeline Queue
 *  @waitfor ack */
",
    );
    let (mut model, mut diagnostics) = link(&[object]);
    let worker = model.find_timeline(model.default_group(), "Worker").unwrap();
    let linked = model.timeline(worker).nodes.clone();

    resolve(&mut model, &mut diagnostics);
    assert_eq!(model.timeline(worker).nodes, vec![linked[0], linked[2], linked[1]]);
}

#[test]
fn test_repeated_request_gets_every_reply() {
    let object = compile(
        "ping.c",
        "\
/** @timeline Client
 *  @send ping
 *  @to Server */
/** @timeline Client
 *  @send ping
 *  @to Server */
/** @timeline Server
 *  @waitfor ping
 *  @send pong
 *  @to Client */
/** @timeline Client
 *  @waitfor pong */
/** @timeline Client
 *  @waitfor pong */
",
    );
    let (mut model, mut diagnostics) = link(&[object]);
    resolve(&mut model, &mut diagnostics);

    let group = model.default_group();
    let client = model.find_timeline(group, "Client").unwrap();
    let server = model.find_timeline(group, "Server").unwrap();
    assert_eq!(model.timeline(server).nodes.len(), 2);
    for node in &model.timeline(client).nodes[2..] {
        assert!(model.node(*node).received_message.is_some());
    }

    let records = write(&mut model, &mut diagnostics);
    let pongs = of_kind(&records, LinkedType::SentMessage)
        .into_iter()
        .filter(|record| matches!(record, LinkedRecord::Message { message, .. } if message == b"pong"))
        .count();
    assert_eq!(pongs, 2);
}

const SPIN: &str = "\
/**
 * @function
 * @call spin
 */
static void spin(void)
{
}

/**
 * @timeline Worker
 * @call spin
 */
";

#[test]
fn test_recursive_function_stops_at_depth() {
    let object = compile("spin.c", SPIN);
    let (mut model, mut diagnostics) = link(&[object]);

    assert!(!semantic_check(&mut model, &mut diagnostics, 10));
    assert_eq!(diagnostics.count(ErrorCode::MaxFunctionDepthReached), 1);

    let worker = model.find_timeline(model.default_group(), "Worker").unwrap();
    let ends = model
        .timeline(worker)
        .nodes
        .iter()
        .filter(|node| model.node(**node).has_flag(FLAG_FUNCTION_END))
        .count();
    assert_eq!(ends, 10);
}

#[test]
fn test_call_depth_is_configurable() {
    let object = compile("spin.c", SPIN);
    let options = LinkOptions {
        max_call_depth: 3,
        ..LinkOptions::default()
    };
    let (mut model, mut diagnostics) = link_with(&[object], options.clone());

    assert!(!semantic_check(&mut model, &mut diagnostics, options.max_call_depth));
    let worker = model.find_timeline(model.default_group(), "Worker").unwrap();
    let ends = model
        .timeline(worker)
        .nodes
        .iter()
        .filter(|node| model.node(**node).has_flag(FLAG_FUNCTION_END))
        .count();
    assert_eq!(ends, 3);
}

#[test]
fn test_function_defined_in_later_file() {
    let caller = compile(
        "client.c",
        "\
/** @timeline Client
 *  @call handshake */
/** @timeline Server
 *  @waitfor hello */
",
    );
    let callee = compile(
        "handshake.c",
        "\
/**
 * @function
 * @send hello
 * @to Server
 */
void handshake(void);
",
    );

    let (mut model, mut diagnostics) = link(&[caller, callee]);
    resolve(&mut model, &mut diagnostics);

    let group = model.default_group();
    let client = model.find_timeline(group, "Client").unwrap();
    let server = model.find_timeline(group, "Server").unwrap();
    let nodes = model.timeline(client).nodes.clone();
    assert_eq!(nodes.len(), 3);

    let message = model.node(nodes[1]).sent_message.unwrap();
    assert_eq!(model.message(message).name, "hello");
    assert_eq!(model.message(message).receiver, Some(model.timeline(server).nodes[0]));
    assert_eq!(model.node(nodes[2]).return_node, Some(nodes[0]));
}

#[test]
fn test_api_function_reaches_linked_object() {
    let object = compile(
        "port.h",
        "\
/**
 * @api
 * @brief opens a port
 * @parameter name the port name
 * @returns 0 on success
 */
int open_port(const char *name, int flags);
",
    );
    let (mut model, mut diagnostics) = link(&[object]);
    resolve(&mut model, &mut diagnostics);

    let records = write(&mut model, &mut diagnostics);
    let functions = of_kind(&records, LinkedType::ApiFunction);
    assert_eq!(functions.len(), 1);
    assert!(matches!(functions[0], LinkedRecord::Type { name, .. } if name == b"open_port"));

    let parameters = of_kind(&records, LinkedType::ApiParameter);
    assert_eq!(parameters.len(), 2);
    assert!(matches!(
        parameters[0],
        LinkedRecord::Type { name, brief, .. } if name == b"name" && brief.bytes == b"the port name"
    ));
}

#[test]
fn test_newer_major_version_is_rejected() {
    let mut object = compile("door.c", "/**\n * @state g.start\n * @next finish\n */\n");
    object[4] = VERSION_MAJOR + 1;

    let mut linker = Linker::new(LinkOptions {
        quiet: true,
        ..LinkOptions::default()
    });
    let result = linker.link_bytes("door.pdso", &object);
    assert!(matches!(result, Err(DocError::UnsupportedVersion { .. })));

    let (model, _) = linker.into_parts();
    assert_eq!(model.groups.len(), 1);
    assert!(model.states.is_empty());
}

#[test]
fn test_linked_object_version_gate() {
    let object = compile("door.c", "/**\n * @state g.start\n * @next finish\n */\n");
    let (mut model, mut diagnostics) = link(&[object]);
    resolve(&mut model, &mut diagnostics);

    let mut bytes = Vec::new();
    produce_output(&mut model, &mut diagnostics, &mut bytes).unwrap();
    assert!(read_linked(&bytes).is_ok());

    bytes[4] = VERSION_MAJOR + 1;
    assert!(matches!(read_linked(&bytes), Err(DocError::UnsupportedVersion { .. })));
}
