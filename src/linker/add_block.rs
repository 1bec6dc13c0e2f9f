//! Merging a finished block into the model.
//!
//! A block is classified by what it declared, in priority order: the file
//! block, a state, a sequence node, a constant group, a type, an application
//! item, and finally an API function and/or a function body node. A block
//! that is none of these has no definer.

use super::block::{BlockKind, BlockNode};
use super::Replay;
use crate::core::ErrorCode;
use crate::model::{
    ApiFunctionId, Command, FunctionNode, GroupId, Node, Parameter, StateId, Text, TimelineId, Transition,
    FINISH_STATE, FLAG_GHOST, FLAG_MESSAGE_CALL, FLAG_MESSAGE_MASK,
};

impl Replay<'_> {
    pub(super) fn add_block(&mut self, block: BlockNode) {
        log::trace!("block {} at line {}", block.block_number, block.line);

        if block.kind == BlockKind::File {
            if let Some(group) = block.group {
                self.file.local_groups[0] = group;
            }
        } else if let Some(state) = block.state {
            self.add_block_state(state, block);
        } else if block.is_sequence() {
            match block.timeline {
                Some(timeline) => self.add_block_sequence(timeline, block),
                None => self.raise(block.line, ErrorCode::SequenceNodeMissingTimeline),
            }
        } else if block.api_constants.is_some() {
            self.add_block_constants(block);
        } else if block.api_type.is_some() {
            self.add_block_type(block);
        } else if block.application_id != 0 {
            self.add_block_application(block);
        } else if block.api_function.is_some() || block.in_function() {
            if let Some(api) = block.api_function {
                self.add_block_api(api, &block);
            }
            if block.in_function() {
                self.add_block_function(block);
            }
        } else {
            self.raise(block.line, ErrorCode::BlockMustHaveDefiner);
        }
    }

    fn add_block_state(&mut self, state: StateId, block: BlockNode) {
        let (group, name) = {
            let state = self.model.state(state);
            (state.group, state.name.clone())
        };

        let Some(next) = block.transition.as_ref() else {
            if name != FINISH_STATE {
                self.raise_with(block.line, ErrorCode::StateMustHaveTransition, &name);
            }
            return;
        };

        let next = match self.model.find_state(group, &next.name) {
            Some(id) => id,
            None => {
                let source = Some(self.file.source_ref(block.line));
                self.model.add_state(group, &next.name, source, FLAG_GHOST)
            }
        };

        let trigger_group = block.group.unwrap_or(group);
        let source = self.file.source_ref(block.line);
        let trigger = block
            .trigger
            .as_ref()
            .map(|trigger| self.model.handle_trigger(trigger, trigger_group, Some(source)));

        if trigger.is_some() && self.model.state(state).transitions.iter().any(|t| t.trigger == trigger) {
            self.raise_with(block.line, ErrorCode::DuplicateTrigger, &name);
            return;
        }

        let triggers = self.model.add_triggers(&block.triggers, trigger_group);
        self.model.state_mut(state).transitions.push(Transition {
            next,
            condition: block.condition,
            trigger,
            triggers,
        });
    }

    fn add_block_sequence(&mut self, timeline: TimelineId, block: BlockNode) {
        let group = block.group.unwrap_or(self.model.timeline(timeline).group);

        let mut node = Node::new(timeline, group, block.flags);
        node.source = Some(self.file.source_ref(block.line));
        node.wait = block.wait;
        node.after = block.after;
        node.condition = block.condition;
        let id = self.model.push_node(node);

        if let Some(message) = block.message.as_deref() {
            let kind = block.flags & FLAG_MESSAGE_MASK;
            if kind == FLAG_MESSAGE_CALL {
                let function = self.model.find_or_ghost_function(message);
                self.model.node_mut(id).function = Some(function);
            } else {
                self.model.create_message(id, block.to_timeline, message, kind);
            }
        }

        let source = self.model.node(id).source.clone();
        let trigger = block
            .trigger
            .as_ref()
            .map(|trigger| self.model.handle_trigger(trigger, group, source));
        let triggers = self.model.add_triggers(&block.triggers, group);
        let node = self.model.node_mut(id);
        node.trigger = trigger;
        node.triggers = triggers;
    }

    fn item_group(&self, block: &BlockNode) -> GroupId {
        block.group.unwrap_or(self.file.default_group())
    }

    fn add_block_constants(&mut self, mut block: BlockNode) {
        let group = self.item_group(&block);
        if let Some(mut constants) = block.api_constants.take() {
            if !block.description.is_empty() {
                constants.description.append(&block.description.text, block.description.fixed);
            }
            self.model.api_mut(group).constants.push(constants);
        }
    }

    fn add_block_type(&mut self, mut block: BlockNode) {
        let group = self.item_group(&block);
        if let Some(mut api_type) = block.api_type.take() {
            if !block.description.is_empty() {
                api_type.description.append(&block.description.text, block.description.fixed);
            }
            self.model.api_mut(group).types.push(api_type);
        }
    }

    fn add_block_application(&mut self, block: BlockNode) {
        if let Some(group) = block.group {
            self.file.local_groups[0] = group;
        }

        let application = self
            .file
            .local_applications
            .get(block.application_id as usize)
            .copied();

        if let Some(option) = block.option {
            let Some(application) = application else {
                self.raise(block.line, ErrorCode::OptionMustHaveApplicationScope);
                return;
            };

            let application = self.model.application_mut(application);
            let index = application.add_option(option, block.application_flag);
            let option = &mut application.options[index];
            if let Some(value) = block.value {
                option.value = value;
            }
            option.description = block.description.clone();
        } else if block.value.is_some() {
            self.raise(block.line, ErrorCode::ValueMustBeAssociatedWithOption);
        }

        if let Some(command) = block.command {
            let Some(application) = application else {
                self.raise(block.line, ErrorCode::AtomRequiresApplicationAtom);
                return;
            };

            let (name, parameters) = match command.text.split_once(char::is_whitespace) {
                Some((name, parameters)) => (name, parameters.trim()),
                None => (command.text.as_str(), ""),
            };
            let command = Command {
                name: Text::new(name),
                parameters: Text::new(parameters),
                description: block.description,
            };
            self.model.application_mut(application).commands.push(command);
        }
    }

    fn add_block_api(&mut self, api: ApiFunctionId, block: &BlockNode) {
        let mut duplicates = Vec::new();

        let function = self.model.api_function_mut(api);
        if !block.description.is_empty() {
            function.description.append(&block.description.text, block.description.fixed);
        }
        if !block.action.is_empty() {
            function.action.append(&block.action.text, block.action.fixed);
        }

        for (name, brief) in &block.parameters {
            match function.parameters.iter_mut().find(|p| p.name.text == name.text) {
                Some(parameter) if !parameter.brief.is_empty() => duplicates.push(brief.text.clone()),
                Some(parameter) => parameter.brief = brief.clone(),
                None => function.parameters.push(Parameter {
                    type_name: Text::default(),
                    name: name.clone(),
                    brief: brief.clone(),
                }),
            }
        }
        function.returns.extend(block.returns.iter().cloned());

        for duplicate in duplicates {
            self.raise_with(block.line, ErrorCode::DuplicateParameter, &duplicate);
        }
    }

    fn add_block_function(&mut self, block: BlockNode) {
        if block.message.is_none() && block.wait.is_none() {
            self.raise(block.line, ErrorCode::BlockMustHaveDefiner);
            return;
        }
        let Some(function) = block.function else {
            self.raise(block.line, ErrorCode::UndefinedFunction);
            return;
        };

        let mut body_node = FunctionNode {
            flags: block.flags,
            to_timeline: block.function_to_timeline,
            after: block.after,
            wait: block.wait,
            condition: block.condition,
            trigger: block.trigger,
            triggers: block.triggers,
            ..FunctionNode::default()
        };

        if let Some(message) = block.message {
            if block.flags & FLAG_MESSAGE_MASK == FLAG_MESSAGE_CALL {
                body_node.call = Some(self.model.find_or_ghost_function(&message));
            } else {
                body_node.message = Some(message);
            }
        }

        self.model.functions[function.index()].body.push(body_node);
    }
}
