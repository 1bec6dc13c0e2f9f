// This module provides arena-based link session management using the bumpalo crate. A link
// reads every compiled object named on the command line before the model is resolved, and the
// record decoder borrows straight out of those byte buffers, so the buffers must outlive the
// whole replay. LinkSession owns a reference to the arena that holds them, remembers which
// files were loaded, and gathers the link statistics (files, records, blocks, groups) that the
// linker prints in verbose mode. LinkStats has a Display impl for that summary.

//! Arena-based link session management.
//!
//! Input object files are loaded once into the session arena and stay
//! borrowed for the lifetime of the link.

use crate::core::error::{DocError, DocResult};
use bumpalo::Bump;
use std::cell::RefCell;
use std::fmt;
use std::path::Path;

/// Arena-backed storage for the inputs of one link run.
pub struct LinkSession<'arena> {
    /// Arena allocator holding input bytes and names.
    arena: &'arena Bump,

    /// Link statistics for verbose output.
    stats: RefCell<LinkStats>,

    /// Files loaded so far, in command-line order.
    inputs: RefCell<Vec<LoadedInput<'arena>>>,
}

/// One object file held by the session.
#[derive(Debug, Clone, Copy)]
pub struct LoadedInput<'arena> {
    pub name: &'arena str,
    pub bytes: &'arena [u8],
}

impl<'arena> LinkSession<'arena> {
    /// Create a new link session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(LinkStats::default()),
            inputs: RefCell::new(Vec::new()),
        }
    }

    /// Read an object file into the arena.
    pub fn load(&self, path: &Path) -> DocResult<LoadedInput<'arena>> {
        let bytes = std::fs::read(path).map_err(|source| DocError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Ok(self.load_bytes(&path.display().to_string(), &bytes))
    }

    /// Copy an in-memory object into the arena.
    pub fn load_bytes(&self, name: &str, bytes: &[u8]) -> LoadedInput<'arena> {
        let input = LoadedInput {
            name: self.arena.alloc_str(name),
            bytes: self.arena.alloc_slice_copy(bytes),
        };

        log::debug!("loaded {} ({} bytes)", name, bytes.len());
        self.inputs.borrow_mut().push(input);
        self.stats.borrow_mut().bytes_read += bytes.len();

        input
    }

    /// Inputs loaded so far.
    pub fn inputs(&self) -> Vec<LoadedInput<'arena>> {
        self.inputs.borrow().clone()
    }

    /// Record that a file was replayed into the model.
    pub fn record_file_linked(&self, records: usize, blocks: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.files_linked += 1;
        stats.records_replayed += records;
        stats.blocks_added += blocks;
    }

    /// Record the shape of the finished model.
    pub fn record_model(&self, groups: usize, nodes: usize, states: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.groups = groups;
        stats.nodes = nodes;
        stats.states = states;
    }

    pub fn record_output(&self, bytes: usize) {
        self.stats.borrow_mut().bytes_written = bytes;
    }

    /// Get a snapshot of the link statistics.
    pub fn stats(&self) -> LinkStats {
        self.stats.borrow().clone()
    }
}

/// Link statistics.
#[derive(Debug, Clone, Default)]
pub struct LinkStats {
    pub files_linked: usize,
    pub records_replayed: usize,
    pub blocks_added: usize,
    pub bytes_read: usize,
    pub bytes_written: usize,
    pub groups: usize,
    pub states: usize,
    pub nodes: usize,
}

impl fmt::Display for LinkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Link Statistics:")?;
        writeln!(f, "  Files linked: {}", self.files_linked)?;
        writeln!(f, "  Records replayed: {}", self.records_replayed)?;
        writeln!(f, "  Blocks added: {}", self.blocks_added)?;
        writeln!(f, "  Bytes read: {}", self.bytes_read)?;
        writeln!(f, "  Bytes written: {}", self.bytes_written)?;
        writeln!(f, "  Groups: {}", self.groups)?;
        writeln!(f, "  States: {}", self.states)?;
        writeln!(f, "  Sequence nodes: {}", self.nodes)?;
        Ok(())
    }
}
