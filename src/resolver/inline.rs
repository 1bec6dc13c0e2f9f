//! Function inlining.
//!
//! Every call node on a timeline is followed by a fresh copy of the called
//! function's body and an end marker pointing back at the call. Calls inside
//! a body are expanded recursively up to the configured depth. Messages in a
//! body resolve their `@to` against the group of the timeline they land on,
//! so one function can be drawn in any diagram.

use super::Resolver;
use crate::core::ErrorCode;
use crate::model::{
    FunctionId, GroupId, Node, NodeId, TimelineId, FLAG_DEPENDENCY, FLAG_FUNCTION, FLAG_FUNCTION_END, FLAG_GHOST,
    FLAG_IN_FUNCTION, FLAG_MESSAGE_MASK, FLAG_SEQUENCE_WAITFOR,
};

impl Resolver<'_> {
    pub(super) fn function_fixup(&mut self, group: GroupId) {
        for timeline in self.timelines(group) {
            let mut index = 0;
            while let Some(&call) = self.model.timeline(timeline).nodes.get(index) {
                index += 1;

                let node = self.model.node(call);
                if node.has_flag(FLAG_IN_FUNCTION) || node.has_flag(FLAG_FUNCTION) {
                    continue;
                }
                let Some(function) = node.function else {
                    continue;
                };

                if self.is_ghost(function) {
                    let (source, name) = (node.source.clone(), self.model.function(function).name.clone());
                    self.raise_at(source, ErrorCode::UndefinedFunction, &name);
                    continue;
                }

                let end = self.insert_function(timeline, call, function, 1);
                if let Some(position) = self.model.position(end) {
                    index = position + 1;
                }
            }
        }
    }

    fn is_ghost(&self, function: FunctionId) -> bool {
        self.model.function(function).flags & FLAG_GHOST != 0
    }

    /// Expand `function` after `call` and return the last node placed,
    /// normally the end marker.
    fn insert_function(&mut self, timeline: TimelineId, call: NodeId, function: FunctionId, depth: usize) -> NodeId {
        let source = self.model.node(call).source.clone();
        if depth > self.max_call_depth {
            let name = self.model.function(function).name.clone();
            self.raise_at(source, ErrorCode::MaxFunctionDepthReached, &name);
            return call;
        }

        self.model.node_mut(call).flags |= FLAG_FUNCTION;
        let group = self.model.timeline(timeline).group;
        let body = self.model.function(function).body.clone();
        log::trace!(
            "inlining '{}' ({} nodes) at depth {}",
            self.model.function(function).name,
            body.len(),
            depth
        );

        let mut cursor = call;
        for item in &body {
            let flags = FLAG_IN_FUNCTION | FLAG_DEPENDENCY | (item.flags & (FLAG_MESSAGE_MASK | FLAG_SEQUENCE_WAITFOR));
            let mut node = Node::new(timeline, group, flags);
            node.source = source.clone();
            node.wait = item.wait.clone();
            node.after = item.after.clone();
            node.condition = item.condition.clone();

            let id = self.model.alloc_node(node);
            self.model.insert_node_after(Some(cursor), id);
            cursor = id;

            let target = item.to_timeline.as_deref().map(|name| match self.model.find_timeline(group, name) {
                Some(found) => found,
                None => self.model.add_timeline(group, name, source.clone(), FLAG_GHOST),
            });

            if let Some(message) = item.message.as_deref() {
                self.model.create_message(id, target, message, item.flags & FLAG_MESSAGE_MASK);
            }
            if let Some(callee) = item.call {
                self.model.node_mut(id).function = Some(callee);
                if self.is_ghost(callee) {
                    let name = self.model.function(callee).name.clone();
                    self.raise_at(source.clone(), ErrorCode::UndefinedFunction, &name);
                } else {
                    cursor = self.insert_function(timeline, id, callee, depth + 1);
                }
            }

            let trigger = item
                .trigger
                .as_ref()
                .map(|trigger| self.model.handle_trigger(trigger, group, source.clone()));
            let triggers = self.model.add_triggers(&item.triggers, group);
            let node = self.model.node_mut(id);
            node.trigger = trigger;
            node.triggers = triggers;
        }

        let mut end = Node::new(timeline, group, FLAG_IN_FUNCTION | FLAG_FUNCTION_END);
        end.source = source;
        end.return_node = Some(call);
        let end = self.model.alloc_node(end);
        self.model.insert_node_after(Some(cursor), end);
        self.model.node_mut(call).function_end = Some(end);
        end
    }
}
