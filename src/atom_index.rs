//! Append-only record store for one compile unit.
//!
//! Records are kept in fixed-capacity chunks so growing the index never moves
//! records that were already added. Each record is stamped with the block and
//! line it was scanned from at the moment it is appended.

use crate::codec::compiled::Record;

pub const ATOM_BLOCK_SIZE: usize = 100;

/// Handle returned by [`AtomIndex::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomHandle(u32);

impl AtomHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Default)]
pub struct AtomIndex {
    chunks: Vec<Vec<Record>>,
    block_count: u16,
    line_number: u16,
    number_atoms: usize,
}

impl AtomIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new source comment block.
    pub fn next_block(&mut self) {
        self.block_count = self.block_count.wrapping_add(1);
    }

    pub fn block_count(&self) -> u16 {
        self.block_count
    }

    pub fn set_line_number(&mut self, line: u16) {
        self.line_number = line;
    }

    pub fn line_number(&self) -> u16 {
        self.line_number
    }

    pub fn number_atoms(&self) -> usize {
        self.number_atoms
    }

    pub fn is_empty(&self) -> bool {
        self.number_atoms == 0
    }

    /// Append a record, stamping it with the current block and line.
    pub fn add(&mut self, mut record: Record) -> AtomHandle {
        record.block = self.block_count;
        record.line = self.line_number;

        let needs_chunk = self
            .chunks
            .last()
            .map_or(true, |chunk| chunk.len() == ATOM_BLOCK_SIZE);
        if needs_chunk {
            self.chunks.push(Vec::with_capacity(ATOM_BLOCK_SIZE));
        }

        let handle = AtomHandle(self.number_atoms as u32);
        if let Some(chunk) = self.chunks.last_mut() {
            chunk.push(record);
        }
        self.number_atoms += 1;
        handle
    }

    pub fn get(&self, handle: AtomHandle) -> Option<&Record> {
        let index = handle.index();
        self.chunks
            .get(index / ATOM_BLOCK_SIZE)
            .and_then(|chunk| chunk.get(index % ATOM_BLOCK_SIZE))
    }

    pub fn get_mut(&mut self, handle: AtomHandle) -> Option<&mut Record> {
        let index = handle.index();
        self.chunks
            .get_mut(index / ATOM_BLOCK_SIZE)
            .and_then(|chunk| chunk.get_mut(index % ATOM_BLOCK_SIZE))
    }

    /// Last record appended, if any.
    pub fn last_mut(&mut self) -> Option<&mut Record> {
        self.chunks.last_mut().and_then(|chunk| chunk.last_mut())
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.chunks.iter().flatten()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}
