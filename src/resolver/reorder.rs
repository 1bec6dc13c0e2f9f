//! `@after` placement.
//!
//! A node that names a message or function in `@after` is moved, together
//! with the run of wait and inlined nodes that trails it, to just past the
//! run trailing the node it names. Several nodes naming the same match line
//! up behind it in the order they were placed, and a node already in that
//! line stays put, so reordering twice changes nothing.

use super::Resolver;
use crate::core::ErrorCode;
use crate::model::{NodeId, TimelineId, FLAG_DEPENDENCY, FLAG_IN_FUNCTION, FLAG_WAIT};

const TRAILING_FLAGS: u32 = FLAG_WAIT | FLAG_IN_FUNCTION;

impl Resolver<'_> {
    pub(super) fn reorder_timeline(&mut self, timeline: TimelineId) {
        let snapshot = self.model.timeline(timeline).nodes.clone();

        for dependent in snapshot {
            let Some(after) = self.model.node(dependent).after.clone() else {
                continue;
            };

            match self.find_after(timeline, dependent, &after) {
                Some(found) => {
                    self.model.node_mut(found).flags |= FLAG_DEPENDENCY;
                    self.move_after(timeline, dependent, found);
                }
                None => {
                    let source = self.model.node(dependent).source.clone();
                    self.raise_at(source, ErrorCode::AfterNodeDoesNotExist, &after);
                }
            }
        }
    }

    fn find_after(&self, timeline: TimelineId, dependent: NodeId, name: &str) -> Option<NodeId> {
        self.model.timeline(timeline).nodes.iter().copied().find(|&candidate| {
            candidate != dependent && !self.model.node(candidate).has_flag(FLAG_WAIT) && self.node_is_named(candidate, name)
        })
    }

    /// True when the node sends `name` or calls the function `name`.
    fn node_is_named(&self, id: NodeId, name: &str) -> bool {
        let node = self.model.node(id);
        let calls = node.function.is_some_and(|function| self.model.function(function).name == name);
        let sends = node
            .sent_message
            .is_some_and(|message| self.model.message(message).name == name);
        calls || sends
    }

    fn move_after(&mut self, timeline: TimelineId, dependent: NodeId, found: NodeId) {
        let mut nodes = self.model.timeline(timeline).nodes.clone();
        let (Some(from), Some(target)) = (
            nodes.iter().position(|id| *id == dependent),
            nodes.iter().position(|id| *id == found),
        ) else {
            return;
        };

        let from_end = self.run_end(&nodes, from);
        let target_end = self.run_end(&nodes, target);
        if (from..from_end).contains(&target) || (target..target_end).contains(&from) {
            return;
        }

        // Skip the dependents of the same match that are already lined up.
        let after = self.model.node(dependent).after.clone();
        let mut insert_at = target_end;
        while insert_at < nodes.len() && insert_at != from && self.model.node(nodes[insert_at]).after == after {
            insert_at = self.run_end(&nodes, insert_at);
        }
        if insert_at == from {
            return;
        }

        let moved: Vec<NodeId> = nodes.drain(from..from_end).collect();
        if insert_at > from {
            insert_at -= moved.len();
        }
        log::trace!("moving {} node(s) from {} to {}", moved.len(), from, insert_at);
        nodes.splice(insert_at..insert_at, moved);
        self.model.timeline_mut(timeline).nodes = nodes;
    }

    /// One past the last node of the run that starts at `start`.
    fn run_end(&self, nodes: &[NodeId], start: usize) -> usize {
        let trailing = nodes[start + 1..]
            .iter()
            .take_while(|id| self.model.node(**id).flags & TRAILING_FLAGS != 0)
            .count();
        start + 1 + trailing
    }
}
