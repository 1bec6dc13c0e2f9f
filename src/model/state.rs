//! State machines and triggers.

use super::{BlockName, GroupId, Model, StateId, TriggerId, FLAG_GHOST};
use crate::core::SourceRef;

#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    pub states: Vec<StateId>,
    pub init_state: Option<StateId>,
    pub max_state_length: usize,
}

#[derive(Debug, Clone)]
pub struct State {
    pub name: String,
    pub group: GroupId,
    pub flags: u32,
    /// Output numbering, assigned by the writer.
    pub tag: u16,
    pub transitions: Vec<Transition>,
    pub source: Option<SourceRef>,
}

/// An edge guarded by a condition or a trigger, never both.
#[derive(Debug, Clone)]
pub struct Transition {
    pub next: StateId,
    pub condition: Option<String>,
    pub trigger: Option<TriggerId>,
    /// Triggers fired when the transition is taken.
    pub triggers: Vec<TriggerId>,
}

#[derive(Debug, Clone)]
pub struct Trigger {
    pub name: String,
    pub flags: u32,
    pub group: GroupId,
    /// Where the trigger was first referenced.
    pub source: Option<SourceRef>,
}

impl Model {
    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.index()]
    }

    pub fn state_mut(&mut self, id: StateId) -> &mut State {
        &mut self.states[id.index()]
    }

    pub fn find_state(&self, group: GroupId, name: &str) -> Option<StateId> {
        let machine = self.group(group).state_machine.as_ref()?;
        machine
            .states
            .iter()
            .copied()
            .find(|id| self.state(*id).name == name)
    }

    /// Add a state to the group's state machine, creating the machine on
    /// first use. Does not check for an existing state.
    pub fn add_state(&mut self, group: GroupId, name: &str, source: Option<SourceRef>, flags: u32) -> StateId {
        let id = StateId(self.states.len() as u32);
        self.states.push(State {
            name: name.to_string(),
            group,
            flags,
            tag: 0,
            transitions: Vec::new(),
            source,
        });

        let machine = self.group_mut(group).state_machine.get_or_insert_with(StateMachine::default);
        machine.states.push(id);
        machine.max_state_length = machine.max_state_length.max(name.len());
        id
    }

    pub fn trigger(&self, id: TriggerId) -> &Trigger {
        &self.triggers[id.index()]
    }

    pub fn find_trigger(&self, group: GroupId, name: &str) -> Option<TriggerId> {
        self.group(group)
            .triggers
            .iter()
            .copied()
            .find(|id| self.trigger(*id).name == name)
    }

    pub fn add_trigger(&mut self, group: GroupId, name: &str, flags: u32, source: Option<SourceRef>) -> TriggerId {
        let id = TriggerId(self.triggers.len() as u32);
        self.triggers.push(Trigger {
            name: name.to_string(),
            flags,
            group,
            source,
        });
        self.group_mut(group).triggers.push(id);
        id
    }

    /// Resolve a trigger a transition or node waits for. An unknown trigger
    /// is added as a ghost until something fires it.
    pub fn handle_trigger(
        &mut self,
        trigger: &BlockName,
        default_group: GroupId,
        source: Option<SourceRef>,
    ) -> TriggerId {
        let group = trigger.group.unwrap_or(default_group);
        match self.find_trigger(group, &trigger.name) {
            Some(id) => id,
            None => self.add_trigger(group, &trigger.name, FLAG_GHOST, source),
        }
    }

    /// Resolve the triggers a transition or node fires. Firing a trigger
    /// defines it.
    pub fn add_triggers(&mut self, names: &[BlockName], default_group: GroupId) -> Vec<TriggerId> {
        names
            .iter()
            .map(|name| {
                let group = name.group.unwrap_or(default_group);
                match self.find_trigger(group, &name.name) {
                    Some(id) => {
                        self.triggers[id.index()].flags &= !FLAG_GHOST;
                        id
                    }
                    None => self.add_trigger(group, &name.name, 0, None),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_are_per_group() {
        let mut model = Model::new();
        let a = model.find_or_add_group("a");
        let b = model.find_or_add_group("b");

        let idle = model.add_state(a, "idle", None, 0);
        assert_eq!(model.find_state(a, "idle"), Some(idle));
        assert_eq!(model.find_state(b, "idle"), None);

        model.add_state(a, "connecting", None, FLAG_GHOST);
        let machine = model.group(a).state_machine.as_ref().unwrap();
        assert_eq!(machine.states.len(), 2);
        assert_eq!(machine.max_state_length, 10);
    }

    #[test]
    fn test_fired_trigger_clears_ghost() {
        let mut model = Model::new();
        let group = model.find_or_add_group("net");

        let waited = model.handle_trigger(&BlockName::new(None, "ready"), group, None);
        assert_eq!(model.trigger(waited).flags, FLAG_GHOST);

        let fired = model.add_triggers(&[BlockName::new(None, "ready")], group);
        assert_eq!(fired, vec![waited]);
        assert_eq!(model.trigger(waited).flags, 0);
    }

    #[test]
    fn test_trigger_uses_explicit_group() {
        let mut model = Model::new();
        let net = model.find_or_add_group("net");
        let io = model.find_or_add_group("io");

        let id = model.handle_trigger(&BlockName::new(Some(io), "flush"), net, None);
        assert_eq!(model.trigger(id).group, io);
        assert_eq!(model.find_trigger(net, "flush"), None);
    }
}
