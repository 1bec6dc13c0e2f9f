// This module serves as the central hub for the infrastructure shared by the documentation
// compiler and linker. It exports the error catalogue (ErrorCode for diagnostics, DocError for
// fatal failures), the warning sink that prints and remembers diagnostics with their source
// locations, and the arena-backed link session that keeps every input object alive while the
// model is built and resolved.

//! Core gendoc infrastructure.
//!
//! # Key Components
//!
//! ## Errors (`error`)
//! - `ErrorCode` diagnostics with their message text
//! - `DocError` for failures that abort a file or the run
//!
//! ## Diagnostics (`diagnostics`)
//! - `file:line: warning: message [parameter]` reporting
//! - Sticky failure flag checked before any output is written
//!
//! ## Session Management (`session`)
//! - Arena-based storage for input object bytes using `bumpalo`
//! - Link statistics

pub mod diagnostics;
pub mod error;
pub mod session;

pub use diagnostics::{Diagnostic, Diagnostics, SourceRef};

pub use error::{DocError, DocResult, ErrorCode};

pub use session::{LinkSession, LinkStats, LoadedInput};
