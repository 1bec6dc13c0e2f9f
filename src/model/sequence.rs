//! Sequence diagrams: timelines, the nodes on them and the messages between
//! them, plus the function bodies that get inlined into timelines.

use super::{BlockName, FunctionId, GroupId, MessageId, Model, NodeId, TimelineId, TriggerId, FLAG_BROADCAST, FLAG_WAIT};
use crate::core::SourceRef;

#[derive(Debug, Clone, Default)]
pub struct SequenceDiagram {
    pub timelines: Vec<TimelineId>,
    pub max_name_length: usize,
}

#[derive(Debug, Clone)]
pub struct Timeline {
    pub name: String,
    pub group: GroupId,
    pub flags: u32,
    /// Nodes in drawing order.
    pub nodes: Vec<NodeId>,
    pub source: Option<SourceRef>,
}

/// One beat on a timeline.
#[derive(Debug, Clone)]
pub struct Node {
    pub flags: u32,
    /// Output numbering, assigned by the writer.
    pub level: u32,
    pub timeline: TimelineId,
    pub group: GroupId,
    pub sent_message: Option<MessageId>,
    pub received_message: Option<MessageId>,
    /// Name of the message this node waits for.
    pub wait: Option<String>,
    /// Name of the message or function this node must follow.
    pub after: Option<String>,
    pub function: Option<FunctionId>,
    /// For a call node, the end marker of its inlined body.
    pub function_end: Option<NodeId>,
    /// For an end marker, the call node it closes.
    pub return_node: Option<NodeId>,
    pub trigger: Option<TriggerId>,
    pub triggers: Vec<TriggerId>,
    pub condition: Option<String>,
    pub source: Option<SourceRef>,
}

impl Node {
    pub fn new(timeline: TimelineId, group: GroupId, flags: u32) -> Self {
        Self {
            flags,
            level: 0,
            timeline,
            group,
            sent_message: None,
            received_message: None,
            wait: None,
            after: None,
            function: None,
            function_end: None,
            return_node: None,
            trigger: None,
            triggers: Vec::new(),
            condition: None,
            source: None,
        }
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag == flag
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub name: String,
    pub flags: u32,
    pub sender: NodeId,
    pub receiver: Option<NodeId>,
    pub sending_timeline: TimelineId,
    /// `None` when the message was sent without `@to`.
    pub target_timeline: Option<TimelineId>,
}

/// A function body: a template inlined at every call site.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub flags: u32,
    pub body: Vec<FunctionNode>,
}

#[derive(Debug, Clone, Default)]
pub struct FunctionNode {
    pub flags: u32,
    pub call: Option<FunctionId>,
    pub message: Option<String>,
    /// Resolved against the timeline the function is inlined into.
    pub to_timeline: Option<String>,
    pub after: Option<String>,
    pub wait: Option<String>,
    pub condition: Option<String>,
    pub trigger: Option<BlockName>,
    pub triggers: Vec<BlockName>,
}

impl Model {
    pub fn timeline(&self, id: TimelineId) -> &Timeline {
        &self.timelines[id.index()]
    }

    pub fn timeline_mut(&mut self, id: TimelineId) -> &mut Timeline {
        &mut self.timelines[id.index()]
    }

    pub fn find_timeline(&self, group: GroupId, name: &str) -> Option<TimelineId> {
        let sequence = self.group(group).sequence.as_ref()?;
        sequence
            .timelines
            .iter()
            .copied()
            .find(|id| self.timeline(*id).name == name)
    }

    /// Add a timeline to the group's sequence diagram, creating the diagram
    /// on first use. Does not check for an existing timeline.
    pub fn add_timeline(&mut self, group: GroupId, name: &str, source: Option<SourceRef>, flags: u32) -> TimelineId {
        let id = TimelineId(self.timelines.len() as u32);
        self.timelines.push(Timeline {
            name: name.to_string(),
            group,
            flags,
            nodes: Vec::new(),
            source,
        });

        let sequence = self.group_mut(group).sequence.get_or_insert_with(SequenceDiagram::default);
        sequence.timelines.push(id);
        sequence.max_name_length = sequence.max_name_length.max(name.len());
        id
    }

    pub fn find_or_add_timeline(&mut self, group: GroupId, name: &str, source: Option<SourceRef>, flags: u32) -> TimelineId {
        match self.find_timeline(group, name) {
            Some(id) => id,
            None => self.add_timeline(group, name, source, flags),
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Put a node in the arena without placing it on its timeline.
    pub fn alloc_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Put a node in the arena and append it to its timeline.
    pub fn push_node(&mut self, node: Node) -> NodeId {
        let timeline = node.timeline;
        let id = self.alloc_node(node);
        self.timeline_mut(timeline).nodes.push(id);
        id
    }

    /// Place `node` on its timeline directly after `after`, or at the head
    /// when `after` is `None` or not on that timeline.
    pub fn insert_node_after(&mut self, after: Option<NodeId>, node: NodeId) {
        let timeline = self.node(node).timeline;
        let position = after
            .and_then(|after| self.position(after))
            .map_or(0, |index| index + 1);
        self.timeline_mut(timeline).nodes.insert(position, node);
    }

    /// Index of `node` within its timeline.
    pub fn position(&self, node: NodeId) -> Option<usize> {
        let timeline = self.node(node).timeline;
        self.timeline(timeline).nodes.iter().position(|id| *id == node)
    }

    pub fn message(&self, id: MessageId) -> &Message {
        &self.messages[id.index()]
    }

    pub fn message_mut(&mut self, id: MessageId) -> &mut Message {
        &mut self.messages[id.index()]
    }

    /// Create a message sent by `sender` and attach it to the sender.
    pub fn create_message(&mut self, sender: NodeId, destination: Option<TimelineId>, name: &str, flags: u32) -> MessageId {
        let sending_timeline = self.node(sender).timeline;
        let group = self.timeline(sending_timeline).group;
        let owner = self.group_mut(group);
        owner.max_message_length = owner.max_message_length.max(name.len());

        let id = MessageId(self.messages.len() as u32);
        self.messages.push(Message {
            name: name.to_string(),
            flags,
            sender,
            receiver: None,
            sending_timeline,
            target_timeline: destination,
        });
        self.node_mut(sender).sent_message = Some(id);
        id
    }

    /// Give `sender` its own copy of `source`, not yet received by anyone.
    pub fn copy_message(&mut self, source: MessageId, sender: NodeId) -> MessageId {
        let mut copy = self.message(source).clone();
        copy.sender = sender;
        copy.receiver = None;

        let id = MessageId(self.messages.len() as u32);
        self.messages.push(copy);
        self.node_mut(sender).sent_message = Some(id);
        id
    }

    /// Deliver `message` to `receiver` on `target`, claiming the wait.
    pub fn link_message(&mut self, message: MessageId, receiver: NodeId, target: TimelineId) {
        let entry = self.message_mut(message);
        entry.receiver = Some(receiver);
        entry.target_timeline = Some(target);

        let node = self.node_mut(receiver);
        node.received_message = Some(message);
        node.flags |= FLAG_WAIT;
    }

    /// Copy a node's content into a fresh node that has received nothing.
    /// A message the source sends is copied too, unreceived, so the copy
    /// still has to be delivered.
    pub fn copy_node(&mut self, source: NodeId) -> NodeId {
        let mut copy = self.node(source).clone();
        let sent = copy.sent_message.take();
        copy.received_message = None;
        copy.flags &= !(FLAG_WAIT | FLAG_BROADCAST);

        let id = self.alloc_node(copy);
        if let Some(message) = sent {
            let copied = self.copy_message(message, id);
            self.message_mut(copied).flags &= !FLAG_BROADCAST;
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FLAG_GHOST;

    #[test]
    fn test_timelines_are_per_group() {
        let mut model = Model::new();
        let group = model.find_or_add_group("net");
        let client = model.add_timeline(group, "Client", None, 0);
        assert_eq!(model.find_or_add_timeline(group, "Client", None, 0), client);
        assert_eq!(model.find_timeline(model.default_group(), "Client"), None);

        let server = model.find_or_add_timeline(group, "Server", None, FLAG_GHOST);
        assert_ne!(client, server);
        assert_eq!(model.group(group).sequence.as_ref().unwrap().max_name_length, 6);
    }

    #[test]
    fn test_insert_after_and_position() {
        let mut model = Model::new();
        let group = model.default_group();
        let line = model.add_timeline(group, "T", None, 0);
        let first = model.push_node(Node::new(line, group, 0));
        let last = model.push_node(Node::new(line, group, 0));

        let middle = model.alloc_node(Node::new(line, group, 0));
        model.insert_node_after(Some(first), middle);
        assert_eq!(model.timeline(line).nodes, vec![first, middle, last]);

        let head = model.alloc_node(Node::new(line, group, 0));
        model.insert_node_after(None, head);
        assert_eq!(model.position(head), Some(0));
        assert_eq!(model.position(last), Some(3));
    }

    #[test]
    fn test_create_message_tracks_length() {
        let mut model = Model::new();
        let group = model.find_or_add_group("g");
        let line = model.add_timeline(group, "A", None, 0);
        let node = model.push_node(Node::new(line, group, 0));

        let message = model.create_message(node, None, "hello", 2);
        assert_eq!(model.node(node).sent_message, Some(message));
        assert_eq!(model.message(message).sending_timeline, line);
        assert_eq!(model.group(group).max_message_length, 5);

        let copy = model.copy_node(node);
        assert_eq!(model.position(copy), None);
        let copied = model.node(copy).sent_message.unwrap();
        assert_ne!(copied, message);
        assert_eq!(model.message(copied).sender, copy);
        assert_eq!(model.message(copied).name, "hello");
    }

    #[test]
    fn test_copied_message_is_unlinked() {
        let mut model = Model::new();
        let group = model.default_group();
        let a = model.add_timeline(group, "A", None, 0);
        let b = model.add_timeline(group, "B", None, 0);
        let sender = model.push_node(Node::new(a, group, 0));
        let waiter = model.push_node(Node::new(b, group, 0));

        let message = model.create_message(sender, None, "ping", 2);
        model.link_message(message, waiter, b);
        assert_eq!(model.message(message).receiver, Some(waiter));
        assert!(model.node(waiter).has_flag(FLAG_WAIT));

        let copy = model.copy_message(message, waiter);
        assert_eq!(model.node(waiter).sent_message, Some(copy));
        assert_eq!(model.message(copy).receiver, None);
        assert_eq!(model.message(copy).sender, waiter);
        assert_eq!(model.message(copy).name, "ping");

        let claimed = model.copy_node(waiter);
        assert_eq!(model.node(claimed).received_message, None);
        assert!(!model.node(claimed).has_flag(FLAG_WAIT));
        let resent = model.node(claimed).sent_message.unwrap();
        assert_eq!(model.message(resent).receiver, None);
        assert_eq!(model.message(resent).sender, claimed);
    }
}
