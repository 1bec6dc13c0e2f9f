//! State machine checks.

use super::Resolver;
use crate::core::ErrorCode;
use crate::model::{GroupId, FINISH_STATE, FLAG_GHOST, START_STATE};

impl Resolver<'_> {
    /// Pick the start state and report every state that was only referenced.
    /// `finish` never needs a definition.
    pub(super) fn check_state_machine(&mut self, group: GroupId) {
        let states = match self.model.group(group).state_machine.as_ref() {
            Some(machine) => machine.states.clone(),
            None => return,
        };

        let mut init_state = None;
        for id in states {
            let state = self.model.state(id);
            if state.name == START_STATE {
                init_state = Some(id);
            }

            if state.flags & FLAG_GHOST != 0 && state.name != FINISH_STATE {
                let (source, name) = (state.source.clone(), state.name.clone());
                self.raise_at(source, ErrorCode::UndefinedReferencedStateFound, &name);
            }
        }

        if let Some(machine) = self.model.group_mut(group).state_machine.as_mut() {
            machine.init_state = init_state;
        }

        if init_state.is_none() {
            let name = self.model.group(group).name.clone();
            self.diagnostics.raise(0, ErrorCode::StateMachineDoesNotHaveStart, Some(&name));
        }
    }
}
