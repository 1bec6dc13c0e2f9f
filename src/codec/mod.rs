//! Object file formats.
//!
//! - `header`: the file header both formats start with
//! - `compiled`: per-source records written by the compiler
//! - `linked`: blocked records written by the linker

pub mod compiled;
pub mod header;
pub mod linked;

pub use compiled::{Counted, Record, RecordBody, RecordReader, RecordType};
pub use header::{FileHeader, Magic, Timestamp};
pub use linked::{read_linked, BlockWriter, LinkedRecord, LinkedType, FILE_BLOCK_SIZE};
