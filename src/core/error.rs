// This module defines the error types for gendoc using the thiserror crate. ErrorCode is the
// catalogue of every diagnostic the compiler and linker can raise; its Display text is the
// message printed by the warning sink, so the codes double as the user-facing wording. Most
// codes are non-fatal: they are raised through Diagnostics, set the sticky failure flag and
// processing carries on so that one run surfaces as many problems as possible. DocError is
// the fatal category: I/O failures, corrupt or truncated object files, version mismatches and
// internal format desyncs (an unknown record type means the reader and writer disagree about
// the format, not that the input is merely wrong). DocResult<T> is the usual alias.

//! Error types for the documentation compiler and linker.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Diagnostic codes raised through the warning sink.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    #[error("Failed.")]
    Failed,

    #[error("Undefined macro")]
    UnknownMacro,

    #[error("macro must only be used for atom group names")]
    MacroNotGroup,

    #[error("Invalid item name")]
    InvalidItemName,

    #[error("Invalid name or name not found")]
    InvalidNameOrNameNotFound,

    #[error("Unknown command")]
    UnknownCommand,

    #[error("Unexpected characters after the command.")]
    WeirdStuffAfterCommand,

    #[error("Input file built with later major version.")]
    InputFileBuiltWithLaterMajorVersion,

    #[error("Input file corrupt.")]
    ProblemWithInputFile,

    #[error("Unknown atom.")]
    UnknownAtom,

    #[error("Multiple definitions in one block.")]
    MultipleStatesInOneBlock,

    #[error("Mixed diagram types in one block")]
    MixedDiagramTypesInBlock,

    #[error("Wrong atom in the block.")]
    WrongAtomInBlock,

    #[error("Atom not allowed to specify a group name")]
    AtomNotAllowedToHaveGroup,

    #[error("Group name more than 255 characters")]
    GroupNameTooLong,

    #[error("Atom name more than 255 characters")]
    AtomNameTooLong,

    #[error("Duplicate transition within same block/state")]
    DuplicateTransition,

    #[error("Block must have a defining atom @state, @message or @command")]
    BlockMustHaveDefiner,

    #[error("State must have a transition to the next state")]
    StateMustHaveTransition,

    #[error("Duplicate trigger defined for state")]
    DuplicateTrigger,

    #[error("State referenced that has not been defined.")]
    UndefinedReferencedStateFound,

    #[error("State machine does not have a start node defined.")]
    StateMachineDoesNotHaveStart,

    #[error("Duplicate condition for the state transition.")]
    DuplicateConditionInTransition,

    #[error("Cannot have condition and trigger for the state transition.")]
    CannotHaveTriggerAndConditionInTransition,

    #[error("Multiple trigger definitions for state.")]
    MultipleTrigger,

    #[error("Trigger referenced that is not defined.")]
    UndefinedTrigger,

    #[error("Block can only be assigned to one timeline.")]
    MultipleTimelinesInOneBlock,

    #[error("Multiple messages/calls defined in one block.")]
    DuplicateMessage,

    #[error("Multiple @after atoms for the same message.")]
    DuplicateAfter,

    #[error("Multiple sequence atoms for the same message.")]
    DuplicateSequence,

    #[error("Multiple @to atoms defined for the same message.")]
    MultipleToTimelinesInOneBlock,

    #[error("Sequence nodes must have @timeline specified.")]
    SequenceNodeMissingTimeline,

    #[error("Multiple @functions found without a function defined in between.")]
    MultipleFunctionAtomsWithoutFunction,

    #[error("Nested @function found.")]
    NestedFunctionDefinitionsNotAllowed,

    #[error("Multiple definition of the same function")]
    MultipleDefinitionsOfFunction,

    #[error("Not allowed to have state and/or local atoms in the function")]
    CannotHaveTheseAtomsInAFunction,

    #[error("Max nested call depth reached.")]
    MaxFunctionDepthReached,

    #[error("@after waiting for a message/function/wait that does not exist")]
    AfterNodeDoesNotExist,

    #[error("Undefined function reference:")]
    UndefinedFunction,

    #[error("@send without a receiving @waitfor.")]
    SendAndNoWait,

    #[error("input file signature incorrect.")]
    InputFileSignatureIncorrect,

    #[error("Multiple authors in a single block")]
    MultipleAuthorsInOneBlock,

    #[error("Undefined group referenced")]
    UndefinedGroup,

    #[error("@file MUST be in the first block of the file")]
    FileBlockNotFirstBlock,

    #[error("Unsupported input file type")]
    UnsupportedInputFile,

    #[error("Undefined API referenced")]
    UndefinedApi,

    #[error("Duplicate parameter defined in function")]
    DuplicateParameter,

    #[error("Type defined in an invalid place")]
    TypeDefinitionInInvalidPlace,

    #[error("duplicate name defined")]
    DuplicateName,

    #[error("duplicate function defined")]
    DuplicateFunction,

    #[error("multiple type requests without a type in between")]
    MultipleTypeRequestsWithoutType,

    #[error("multiple @constants requests without @end_constants")]
    MultipleConstantsRequestWithoutEnd,

    #[error("@end_constants without a @constants")]
    EndConstantsWithoutStart,

    #[error("multiple @sample without @end_sample")]
    MultipleSamplesWithoutEnd,

    #[error("@end_sample without a @sample")]
    EndSampleWithoutStart,

    #[error("failed to find function")]
    FailedToFindFunction,

    #[error("failed to find constant")]
    FailedToFindConstant,

    #[error("failed to find type")]
    FailedToFindType,

    #[error("comment found when expected function")]
    FoundCommentExpectingFunction,

    #[error("@descriptor found after @descriptor has been defined for the item")]
    DoubleDescriptorFound,

    #[error("@brief without a defined item")]
    BriefWithoutAType,

    #[error("unexpected atom found")]
    UnexpectedAtom,

    #[error("expected \"yes\" or \"no\" for boolean item")]
    ExpectedYesNo,

    #[error("atom requires an @application to be defined")]
    AtomRequiresApplicationAtom,

    #[error("multiple definitions of @option found in the same block")]
    MultipleDefinitionOption,

    #[error("multiple definitions of @value found in the same block")]
    MultipleDefinitionValue,

    #[error("@option must be defined within @application scope")]
    OptionMustHaveApplicationScope,

    #[error("@value defined for @option already")]
    OptionValueRedefined,

    #[error("@value must be associated with @option")]
    ValueMustBeAssociatedWithOption,

    #[error("Maximum number of options found in synopsis list.")]
    MaxNumberOfOptionsInSynopsis,

    #[error("option referenced in synopsis list is missing.")]
    OptionRequiredBySynopsisMissing,

    #[error("Failed to open input file")]
    FailedToOpenInputFile,

    #[error("You cannot reference one of the reserved group names.")]
    SpecifiedSpecialGroupInModel,

    #[error("cascaded message duplication is not yet supported")]
    NotYetSupported,

    #[error("@responds without a matching @waitfor.")]
    RespondAndNoWait,
}

/// Fatal errors that abort the current file or the whole run.
#[derive(Error, Debug)]
pub enum DocError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("input file signature incorrect")]
    CorruptFile,

    #[error("input file built with later major version {found} (supported {supported})")]
    UnsupportedVersion {
        found: u8,
        supported: u8,
    },

    #[error("input file corrupt: record at offset {offset} needs {needed} bytes, {available} available")]
    TruncatedRecord {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("INTERNAL ERROR: unknown record type {record_type} at offset {offset}")]
    UnknownRecordType {
        record_type: u8,
        offset: usize,
    },

    #[error("INTERNAL ERROR: data too large ({size} bytes)")]
    DataTooLarge {
        size: usize,
    },

    #[error("{0}")]
    Failed(ErrorCode),
}

/// Result type alias for compile and link operations.
pub type DocResult<T> = Result<T, DocError>;

impl From<ErrorCode> for DocError {
    fn from(code: ErrorCode) -> Self {
        DocError::Failed(code)
    }
}
