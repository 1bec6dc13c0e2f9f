//! Message wiring.
//!
//! A send is delivered to the first free node on the destination timeline
//! that waits for a message of the same name (the sender's own timeline
//! when no `@to` was given). When every such node is already taken, the
//! first one is copied so each delivery gets its own beat; the copy sends
//! its own copy of whatever the taken node sends, and that is delivered in
//! turn. A send to the `broadcast` timeline is copied once per waiting node
//! on every other timeline.
//!
//! A response goes back to the timeline that sent the request the
//! responding node received, or, inside an inlined function, the request
//! received by the innermost call on the stack.

use super::Resolver;
use crate::core::ErrorCode;
use crate::model::{
    GroupId, MessageId, Node, NodeId, TimelineId, BROADCAST_TIMELINE, FLAG_BROADCAST, FLAG_FUNCTION,
    FLAG_FUNCTION_END, FLAG_IN_FUNCTION, FLAG_MESSAGE_MASK, FLAG_MESSAGE_RESPONDS,
};

impl Resolver<'_> {
    pub(super) fn connect_sequence(&mut self, group: GroupId) {
        if let Some(broadcast) = self.model.find_timeline(group, BROADCAST_TIMELINE) {
            self.model.timeline_mut(broadcast).flags |= FLAG_BROADCAST;
        }

        let mut copies = Vec::new();
        for timeline in self.timelines(group) {
            let snapshot = self.model.timeline(timeline).nodes.clone();
            for sender in snapshot {
                self.connect_send(group, sender, &mut copies);
            }
        }
        self.deliver_copies(group, copies, false);
    }

    /// The message `node` sends, while it still has to be delivered.
    fn pending_message(&self, node: NodeId) -> Option<MessageId> {
        let message = self.model.node(node).sent_message?;
        let entry = self.model.message(message);
        (entry.receiver.is_none() && entry.flags & FLAG_BROADCAST == 0).then_some(message)
    }

    fn is_response(&self, message: MessageId) -> bool {
        self.model.message(message).flags & FLAG_MESSAGE_MASK == FLAG_MESSAGE_RESPONDS
    }

    fn connect_send(&mut self, group: GroupId, sender: NodeId, copies: &mut Vec<NodeId>) {
        let Some(message) = self.pending_message(sender) else {
            return;
        };
        if self.is_response(message) {
            return;
        }

        let entry = self.model.message(message);
        let (target, name) = (entry.target_timeline, entry.name.clone());
        let broadcast = self.model.find_timeline(group, BROADCAST_TIMELINE);

        match target {
            Some(target) if Some(target) == broadcast => self.broadcast(group, sender, message, target),
            target => {
                let target = target.unwrap_or(self.model.node(sender).timeline);
                if !self.find_wait(target, sender, message, copies) {
                    let source = self.model.node(sender).source.clone();
                    self.raise_at(source, ErrorCode::SendAndNoWait, &name);
                }
            }
        }
    }

    /// Deliver what copied waits send. A copy can land on a timeline the walk
    /// has already passed, and delivering it can copy further waits, so this
    /// runs in rounds; a chain still growing after `max_call_depth` rounds is
    /// reported rather than followed.
    fn deliver_copies(&mut self, group: GroupId, mut pending: Vec<NodeId>, responses: bool) {
        for _ in 0..self.max_call_depth {
            if pending.is_empty() {
                return;
            }

            let mut next = Vec::new();
            for copy in pending {
                let Some(message) = self.pending_message(copy) else {
                    continue;
                };
                if !self.is_response(message) {
                    self.connect_send(group, copy, &mut next);
                } else if responses {
                    let request = self.model.node(copy).received_message;
                    self.route_response(copy, message, request, &mut next);
                }
            }
            pending = next;
        }

        for copy in pending {
            if let Some(message) = self.pending_message(copy) {
                let source = self.model.node(copy).source.clone();
                let name = self.model.message(message).name.clone();
                self.raise_at(source, ErrorCode::NotYetSupported, &name);
            }
        }
    }

    fn broadcast(&mut self, group: GroupId, sender: NodeId, message: MessageId, broadcast: TimelineId) {
        self.model.message_mut(message).flags |= FLAG_BROADCAST;
        self.model.node_mut(sender).flags |= FLAG_BROADCAST;

        let name = self.model.message(message).name.clone();
        let own = self.model.node(sender).timeline;
        let mut cursor = sender;
        let mut delivered = 0;

        for timeline in self.timelines(group) {
            if timeline == own || timeline == broadcast {
                continue;
            }

            let waiting: Vec<NodeId> = self
                .model
                .timeline(timeline)
                .nodes
                .iter()
                .copied()
                .filter(|id| {
                    let node = self.model.node(*id);
                    node.received_message.is_none() && node.wait.as_deref() == Some(name.as_str())
                })
                .collect();

            for receiver in waiting {
                // Each copy only carries the message; the sender keeps its
                // own wait, ordering and triggers.
                let origin = self.model.node(sender);
                let flags = (origin.flags & (FLAG_MESSAGE_MASK | FLAG_IN_FUNCTION)) | FLAG_BROADCAST;
                let mut copy = Node::new(own, origin.group, flags);
                copy.source = origin.source.clone();

                let copy = self.model.alloc_node(copy);
                self.model.insert_node_after(Some(cursor), copy);
                cursor = copy;

                let copied = self.model.copy_message(message, copy);
                self.model.link_message(copied, receiver, timeline);
                delivered += 1;
            }
        }
        log::trace!("broadcast '{}' delivered to {} node(s)", name, delivered);
    }

    /// Deliver `message` to a wait on `target`. Returns `false` when nothing
    /// on `target` waits for it.
    fn find_wait(&mut self, target: TimelineId, sender: NodeId, message: MessageId, copies: &mut Vec<NodeId>) -> bool {
        let name = self.model.message(message).name.clone();
        let mut first_taken = None;

        for candidate in self.model.timeline(target).nodes.clone() {
            let node = self.model.node(candidate);
            if node.wait.as_deref() != Some(name.as_str()) || candidate == sender {
                continue;
            }
            if node.received_message.is_none() {
                self.model.link_message(message, candidate, target);
                return true;
            }
            first_taken.get_or_insert(candidate);
        }

        let Some(taken) = first_taken else {
            return false;
        };

        match self.copy_wait(taken, copies) {
            Some(copy) => {
                self.model.link_message(message, copy, target);
                log::trace!("copied wait for '{}' on timeline {}", name, self.model.timeline(target).name);
            }
            None => {
                let source = self.model.node(sender).source.clone();
                self.raise_at(source, ErrorCode::NotYetSupported, &name);
            }
        }
        true
    }

    /// Place a copy of a taken wait right after it. A call node cannot be
    /// copied apart from its inlined body, so that gives `None`.
    fn copy_wait(&mut self, taken: NodeId, copies: &mut Vec<NodeId>) -> Option<NodeId> {
        if self.model.node(taken).has_flag(FLAG_FUNCTION) {
            return None;
        }

        let copy = self.model.copy_node(taken);
        self.model.insert_node_after(Some(taken), copy);
        if self.model.node(copy).sent_message.is_some() {
            copies.push(copy);
        }
        Some(copy)
    }

    pub(super) fn connect_responses(&mut self, group: GroupId) {
        let mut copies = Vec::new();

        for timeline in self.timelines(group) {
            let mut calls: Vec<NodeId> = Vec::new();
            let snapshot = self.model.timeline(timeline).nodes.clone();

            for id in snapshot {
                let node = self.model.node(id);
                if node.has_flag(FLAG_FUNCTION) {
                    calls.push(id);
                    continue;
                }
                if node.has_flag(FLAG_FUNCTION_END) {
                    calls.pop();
                    continue;
                }

                let Some(response) = self.pending_message(id) else {
                    continue;
                };
                if !self.is_response(response) {
                    continue;
                }

                let request = node.received_message.or_else(|| {
                    calls
                        .iter()
                        .rev()
                        .find_map(|call| self.model.node(*call).received_message)
                });
                self.route_response(id, response, request, &mut copies);
            }
        }
        self.deliver_copies(group, copies, true);
    }

    fn route_response(
        &mut self,
        responder: NodeId,
        response: MessageId,
        request: Option<MessageId>,
        copies: &mut Vec<NodeId>,
    ) {
        let source = self.model.node(responder).source.clone();
        let name = self.model.message(response).name.clone();

        let Some(request) = request else {
            self.raise_at(source, ErrorCode::RespondAndNoWait, &name);
            return;
        };
        let request = self.model.message(request).clone();
        if request.flags & FLAG_MESSAGE_MASK == FLAG_MESSAGE_RESPONDS {
            self.raise_at(source, ErrorCode::NotYetSupported, &name);
            return;
        }

        let search = request.sending_timeline;
        let mut first_taken = None;
        let mut free = None;
        for &candidate in &self.model.timeline(search).nodes {
            let node = self.model.node(candidate);
            if node.wait.as_deref() != Some(name.as_str()) {
                continue;
            }
            if node.received_message.is_none() {
                free = Some(candidate);
                break;
            }
            first_taken.get_or_insert(candidate);
        }

        let receiver = match (free, first_taken) {
            (Some(free), _) => free,
            // Every recipient of a broadcast answers into the same wait.
            (None, Some(taken)) if request.flags & FLAG_BROADCAST != 0 => match self.copy_wait(taken, copies) {
                Some(copy) => copy,
                None => {
                    self.raise_at(source, ErrorCode::NotYetSupported, &name);
                    return;
                }
            },
            _ => {
                self.raise_at(source, ErrorCode::RespondAndNoWait, &name);
                return;
            }
        };

        self.model.link_message(response, receiver, search);
    }
}
