//! gendoc - documentation compiler and linker.
//!
//! Structured markup in source-code comments (`@state`, `@send`, `@api`,
//! `@application`, ...) is compiled one file at a time into a compact
//! record stream, and any number of those streams are linked into a single
//! resolved model that renderers read.
//!
//! # Primary Usage
//!
//! ```ignore
//! use gendoc::{compile_source, semantic_check, produce_output, CompileOptions, LinkOptions, Linker};
//!
//! let compilation = compile_source(text, "net.c", &CompileOptions::default())?;
//! let object = compilation.generate_output()?;
//!
//! let mut linker = Linker::new(LinkOptions::default());
//! linker.link_bytes("net.pdso", &object)?;
//! let (mut model, mut diagnostics) = linker.into_parts();
//! if semantic_check(&mut model, &mut diagnostics, 10) {
//!     produce_output(&mut model, &mut diagnostics, std::io::stdout())?;
//! }
//! ```
//!
//! # Architecture
//!
//! - [`compiler`] - comment scanner and compiled object writer (pdsc)
//! - [`codec`] - compiled and linked record formats
//! - [`linker`] - replays compiled objects into the [`model`]
//! - [`resolver`] - inlining, message matching, `@after` ordering and checks
//! - [`writer`] - linked object output
//! - [`core`] - errors, diagnostics and the link session

pub mod atom;
pub mod atom_index;
pub mod codec;
pub mod compiler;
pub mod config;
pub mod core;
pub mod linker;
pub mod lookup;
pub mod model;
pub mod resolver;
pub mod writer;

pub use crate::atom::Atom;
pub use crate::compiler::{compile_file, compile_source, generate_output, Compilation, CompilerState};
pub use crate::config::{CompileOptions, LinkOptions};
pub use crate::core::{
    // Errors and reporting
    Diagnostic, Diagnostics, DocError, DocResult, ErrorCode,
    // Link inputs
    LinkSession, LinkStats, LoadedInput,
};
pub use crate::linker::Linker;
pub use crate::model::Model;
pub use crate::resolver::semantic_check;
pub use crate::writer::{produce_output, write_linked_file};
