// This module holds the in-memory graph the linker builds while it replays compiled objects and
// the resolver later rewrites in place. Every entity lives in a Vec arena on Model and is named
// by a Copy index handle, so the passes that splice nodes into timelines, copy nodes on a
// send/wait conflict or inline function bodies never hold a borrow across a mutation. Groups are
// the namespaces; each owns at most one state machine, one sequence diagram and one API, plus
// the triggers declared in it. Functions, applications and samples are link-wide. Name lookups
// go through hashbrown indexes keyed by the exact name; per-group lookups (states, timelines,
// triggers) scan the group's own list because those lists are short and ordered.

//! Model graph.
//!
//! - [`state`]: states, transitions and triggers
//! - [`sequence`]: timelines, nodes, messages and function bodies
//! - [`api`]: API functions, types and constants
//! - [`application`]: command-line application documentation

pub mod api;
pub mod application;
pub mod sequence;
pub mod state;

use hashbrown::HashMap;

pub use api::{Api, ApiConstants, ApiFunction, ApiType, Constant, Parameter, ReturnValue, TypeRecord, TypeRecordKind};
pub use application::{AppOption, Application, Command, Section, Synopsis};
pub use sequence::{Function, FunctionNode, Message, Node, SequenceDiagram, Timeline};
pub use state::{State, StateMachine, Transition, Trigger};

macro_rules! define_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);

            impl $name {
                pub fn index(self) -> usize {
                    self.0 as usize
                }
            }
        )*
    };
}

define_id!(
    /// Group 0 is the default (unnamed) group.
    GroupId,
    StateId,
    TimelineId,
    NodeId,
    MessageId,
    FunctionId,
    TriggerId,
    ApiFunctionId,
    /// Application 0 is the unnamed head application and is never written.
    ApplicationId,
);

/// The item is referenced but has not been defined.
pub const FLAG_GHOST: u32 = 0x8000;
pub const FLAG_MESSAGE: u32 = 0x4000;
/// Another node was placed after this one by `@after`.
pub const FLAG_DEPENDENCY: u32 = 0x2000;
/// A wait has been claimed on this node.
pub const FLAG_WAIT: u32 = 0x1000;
pub const FLAG_IN_FUNCTION: u32 = 0x0800;
pub const FLAG_TAGGED: u32 = 0x0400;
pub const FLAG_ACTIVE: u32 = 0x0200;
/// The node calls a function whose body follows it.
pub const FLAG_FUNCTION: u32 = 0x0100;
pub const FLAG_FUNCTION_END: u32 = 0x0080;
pub const FLAG_BROADCAST: u32 = 0x0040;

pub const FLAG_MESSAGE_MASK: u32 = 0x0003;
pub const FLAG_MESSAGE_CALL: u32 = 0x0003;
pub const FLAG_MESSAGE_SEND: u32 = 0x0002;
pub const FLAG_MESSAGE_RESPONDS: u32 = 0x0001;
pub const FLAG_SEQUENCE_WAITFOR: u32 = 0x0004;

pub const OPTION_FLAG_MULTIPLE: u32 = 0x0001;
pub const OPTION_FLAG_REQUIRED: u32 = 0x0002;

/// Group names the renderer reserves for itself.
pub const RESERVED_GROUP_NAMES: [&str; 2] = ["all", "document"];

pub const FINISH_STATE: &str = "finish";
pub const START_STATE: &str = "start";
pub const BROADCAST_TIMELINE: &str = "broadcast";

/// A text value and whether its layout must be kept as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Text {
    pub text: String,
    pub fixed: bool,
}

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), fixed: false }
    }

    pub fn from_bytes(bytes: &[u8], fixed: bool) -> Self {
        Self {
            text: String::from_utf8_lossy(bytes).into_owned(),
            fixed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    /// Append `more`, separated by a space when there is already text.
    pub fn append(&mut self, more: &str, fixed: bool) {
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(more);
        self.fixed |= fixed;
    }
}

/// A name qualified by the group it was written against. `group` is `None`
/// until the owning block decides on the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockName {
    pub group: Option<GroupId>,
    pub name: String,
}

impl BlockName {
    pub fn new(group: Option<GroupId>, name: impl Into<String>) -> Self {
        Self { group, name: name.into() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Group {
    pub name: String,
    pub state_machine: Option<StateMachine>,
    pub sequence: Option<SequenceDiagram>,
    pub api: Option<Api>,
    pub triggers: Vec<TriggerId>,
    pub max_message_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub name: String,
    pub body: Text,
}

/// The whole linked model.
#[derive(Debug, Clone)]
pub struct Model {
    pub groups: Vec<Group>,
    pub states: Vec<State>,
    pub timelines: Vec<Timeline>,
    pub nodes: Vec<Node>,
    pub messages: Vec<Message>,
    pub functions: Vec<Function>,
    pub triggers: Vec<Trigger>,
    pub api_functions: Vec<ApiFunction>,
    pub applications: Vec<Application>,
    /// Newest first.
    pub samples: Vec<Sample>,

    group_index: HashMap<String, GroupId>,
    function_index: HashMap<String, FunctionId>,
    application_index: HashMap<String, ApplicationId>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        let mut model = Self {
            groups: Vec::new(),
            states: Vec::new(),
            timelines: Vec::new(),
            nodes: Vec::new(),
            messages: Vec::new(),
            functions: Vec::new(),
            triggers: Vec::new(),
            api_functions: Vec::new(),
            applications: Vec::new(),
            samples: Vec::new(),
            group_index: HashMap::new(),
            function_index: HashMap::new(),
            application_index: HashMap::new(),
        };

        model.add_group("");
        model.find_add_application("");
        model
    }

    pub fn default_group(&self) -> GroupId {
        GroupId(0)
    }

    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.index()]
    }

    pub fn group_mut(&mut self, id: GroupId) -> &mut Group {
        &mut self.groups[id.index()]
    }

    pub fn group_ids(&self) -> impl Iterator<Item = GroupId> {
        (0..self.groups.len() as u32).map(GroupId)
    }

    pub fn find_group(&self, name: &str) -> Option<GroupId> {
        self.group_index.get(name).copied()
    }

    /// Add a group without checking for an existing one of the same name.
    pub fn add_group(&mut self, name: &str) -> GroupId {
        let id = GroupId(self.groups.len() as u32);
        self.groups.push(Group {
            name: name.to_string(),
            ..Group::default()
        });
        self.group_index.entry(name.to_string()).or_insert(id);
        id
    }

    pub fn find_or_add_group(&mut self, name: &str) -> GroupId {
        match self.find_group(name) {
            Some(id) => id,
            None => self.add_group(name),
        }
    }

    pub fn find_function(&self, name: &str) -> Option<FunctionId> {
        self.function_index.get(name).copied()
    }

    pub fn add_function(&mut self, name: &str, flags: u32) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(Function {
            name: name.to_string(),
            flags,
            body: Vec::new(),
        });
        self.function_index.entry(name.to_string()).or_insert(id);
        id
    }

    /// The function named `name`, adding a ghost for a forward reference.
    pub fn find_or_ghost_function(&mut self, name: &str) -> FunctionId {
        match self.find_function(name) {
            Some(id) => id,
            None => self.add_function(name, FLAG_GHOST),
        }
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn find_add_application(&mut self, name: &str) -> ApplicationId {
        if let Some(id) = self.application_index.get(name) {
            return *id;
        }

        let id = ApplicationId(self.applications.len() as u32);
        self.applications.push(Application::new(name));
        self.application_index.insert(name.to_string(), id);
        id
    }

    pub fn application_mut(&mut self, id: ApplicationId) -> &mut Application {
        &mut self.applications[id.index()]
    }

    /// Samples arrive in no particular order; the newest goes first.
    pub fn add_sample(&mut self, name: &[u8], body: &[u8]) {
        self.samples.insert(
            0,
            Sample {
                name: String::from_utf8_lossy(name).into_owned(),
                body: Text::from_bytes(body, true),
            },
        );
    }
}
