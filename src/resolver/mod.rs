// The resolver runs once every compiled object has been replayed into the model. It walks the
// groups in creation order and rewrites each one in place: the state machine gets its start
// state and every ghost state is reported, the timelines are reordered so that `@after` holds,
// function calls are expanded into copies of the function body bracketed by an end marker, and
// finally every send is paired with a wait and every response with the wait of whoever sent the
// request. Problems are raised on the shared diagnostics sink and the passes keep going, so one
// run reports everything it can find.

//! Semantic resolution of a linked model.
//!
//! ```no_run
//! # use gendoc::{Linker, LinkOptions, resolver};
//! # let bytes: Vec<u8> = Vec::new();
//! let mut linker = Linker::new(LinkOptions::default());
//! linker.link_bytes("net.pdso", &bytes)?;
//! let depth = linker.options().max_call_depth;
//! let (mut model, mut diagnostics) = linker.into_parts();
//! if resolver::semantic_check(&mut model, &mut diagnostics, depth) {
//!     // safe to write the linked object
//! }
//! # Ok::<(), gendoc::DocError>(())
//! ```

mod connect;
mod inline;
mod reorder;
mod state;

use crate::core::{Diagnostics, ErrorCode, SourceRef};
use crate::model::{GroupId, Model, TimelineId, FLAG_GHOST};

/// Run every pass over every group. Returns `true` when nothing has been
/// raised on `diagnostics`, including anything raised before the call.
pub fn semantic_check(model: &mut Model, diagnostics: &mut Diagnostics, max_call_depth: usize) -> bool {
    let mut resolver = Resolver::new(model, diagnostics, max_call_depth);
    resolver.run();
    !diagnostics.failed()
}

pub struct Resolver<'a> {
    model: &'a mut Model,
    diagnostics: &'a mut Diagnostics,
    max_call_depth: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(model: &'a mut Model, diagnostics: &'a mut Diagnostics, max_call_depth: usize) -> Self {
        Self {
            model,
            diagnostics,
            max_call_depth,
        }
    }

    pub fn run(&mut self) {
        let groups: Vec<GroupId> = self.model.group_ids().collect();
        for group in groups {
            self.resolve_group(group);
        }
    }

    fn resolve_group(&mut self, group: GroupId) {
        log::debug!("resolving group '{}'", self.model.group(group).name);

        if self.model.group(group).state_machine.is_some() {
            self.check_state_machine(group);
        }

        if self.model.group(group).sequence.is_some() {
            for timeline in self.timelines(group) {
                self.reorder_timeline(timeline);
            }
            self.function_fixup(group);
            self.connect_sequence(group);
            self.connect_responses(group);
        }

        self.check_triggers(group);
    }

    /// Snapshot of the group's timelines. Passes may add ghost timelines
    /// while they run.
    fn timelines(&self, group: GroupId) -> Vec<TimelineId> {
        self.model
            .group(group)
            .sequence
            .as_ref()
            .map(|sequence| sequence.timelines.clone())
            .unwrap_or_default()
    }

    fn check_triggers(&mut self, group: GroupId) {
        let ghosts: Vec<(String, Option<SourceRef>)> = self
            .model
            .group(group)
            .triggers
            .iter()
            .map(|id| self.model.trigger(*id))
            .filter(|trigger| trigger.flags & FLAG_GHOST != 0)
            .map(|trigger| (trigger.name.clone(), trigger.source.clone()))
            .collect();

        for (name, source) in ghosts {
            self.raise_at(source, ErrorCode::UndefinedTrigger, &name);
        }
    }

    fn raise_at(&mut self, source: Option<SourceRef>, code: ErrorCode, parameter: &str) {
        self.diagnostics.raise_at(source.as_ref(), code, Some(parameter));
    }
}
