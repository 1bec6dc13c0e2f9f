//! The block being collected while records are replayed.

use crate::model::{
    ApiConstants, ApiFunctionId, ApiType, BlockName, FunctionId, GroupId, ReturnValue, StateId, Text, TimelineId,
    FLAG_IN_FUNCTION,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockKind {
    #[default]
    Unknown,
    /// The block describes the source file itself.
    File,
}

/// Everything one documentation block said, before it is merged into the
/// model. A block becomes exactly one of: a state, a sequence node, a
/// function body node, an API item, an application item or the file block.
#[derive(Debug, Clone, Default)]
pub struct BlockNode {
    pub block_number: u16,
    /// Source line of the block's first record; 0 for an empty block.
    pub line: u32,
    pub kind: BlockKind,
    pub group: Option<GroupId>,
    /// Node flags: message kind, `@waitfor` and `FLAG_IN_FUNCTION`.
    pub flags: u32,

    pub state: Option<StateId>,
    pub transition: Option<BlockName>,
    pub condition: Option<String>,
    pub trigger: Option<BlockName>,
    pub triggers: Vec<BlockName>,

    pub timeline: Option<TimelineId>,
    pub to_timeline: Option<TimelineId>,
    /// `@to` inside a function names a timeline of the call site.
    pub function_to_timeline: Option<String>,
    pub message: Option<String>,
    pub after: Option<String>,
    pub wait: Option<String>,

    pub function: Option<FunctionId>,
    pub api_function: Option<ApiFunctionId>,
    pub author: Option<Text>,
    pub action: Text,
    pub description: Text,
    /// `(name, brief)` pairs for the API function's parameters.
    pub parameters: Vec<(Text, Text)>,
    pub returns: Vec<ReturnValue>,
    pub api_type: Option<ApiType>,
    pub api_constants: Option<ApiConstants>,

    /// Raw application id from the record group field; 0 when none.
    pub application_id: u16,
    pub application_flag: u32,
    pub option: Option<Text>,
    pub value: Option<Text>,
    pub command: Option<Text>,
}

impl BlockNode {
    pub fn new(block_number: u16, line: u32) -> Self {
        Self {
            block_number,
            line,
            ..Self::default()
        }
    }

    pub fn in_function(&self) -> bool {
        self.flags & FLAG_IN_FUNCTION != 0
    }

    /// Part of a sequence diagram rather than a state machine or an API.
    pub fn is_sequence(&self) -> bool {
        self.timeline.is_some()
            || (!self.in_function() && (self.message.is_some() || self.wait.is_some() || self.to_timeline.is_some()))
    }
}
