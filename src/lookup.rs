//! Name tables with stable integer ids.
//!
//! A `LookupTable` maps names (groups, macros, functions, APIs, samples,
//! applications) to ids of the form `chunk * LOOKUP_BLOCK_SIZE + slot`. Ids are
//! handed out in insertion order and never reused. Names are bucketed by their
//! FNV-1 hash, but a hit is only reported after the full names compare equal,
//! so two names that hash alike still get different ids.

use hashbrown::HashMap;

pub const LOOKUP_BLOCK_SIZE: usize = 100;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1 hash.
pub fn fnv_hash(name: &[u8]) -> u32 {
    name.iter()
        .fold(FNV_OFFSET_BASIS, |hash, byte| hash.wrapping_mul(FNV_PRIME) ^ u32::from(*byte))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupEntry<P> {
    pub hash: u32,
    /// `None` for a slot reserved with [`LookupTable::new_lookup`] that has
    /// not been named yet.
    pub name: Option<Vec<u8>>,
    pub payload: Option<P>,
    pub line_num: u32,
    pub group_id: u32,
}

impl<P> LookupEntry<P> {
    pub fn name_bytes(&self) -> &[u8] {
        self.name.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct LookupTable<P = Vec<u8>> {
    chunks: Vec<Vec<LookupEntry<P>>>,
    buckets: HashMap<u32, Vec<u32>>,
    hasher: fn(&[u8]) -> u32,
    count: u32,
}

impl<P> Default for LookupTable<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> LookupTable<P> {
    pub fn new() -> Self {
        Self::with_hasher(fnv_hash)
    }

    /// Table using a different hash function. Only the bucketing changes;
    /// lookups still compare whole names.
    pub fn with_hasher(hasher: fn(&[u8]) -> u32) -> Self {
        Self {
            chunks: Vec::new(),
            buckets: HashMap::new(),
            hasher,
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, id: u32) -> Option<&LookupEntry<P>> {
        let id = id as usize;
        self.chunks
            .get(id / LOOKUP_BLOCK_SIZE)
            .and_then(|chunk| chunk.get(id % LOOKUP_BLOCK_SIZE))
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut LookupEntry<P>> {
        let id = id as usize;
        self.chunks
            .get_mut(id / LOOKUP_BLOCK_SIZE)
            .and_then(|chunk| chunk.get_mut(id % LOOKUP_BLOCK_SIZE))
    }

    /// Id of the entry named `name`.
    pub fn find(&self, name: &[u8]) -> Option<u32> {
        let hash = (self.hasher)(name);
        self.buckets.get(&hash)?.iter().copied().find(|id| {
            self.get(*id)
                .and_then(|entry| entry.name.as_deref())
                .is_some_and(|existing| existing == name)
        })
    }

    fn push(&mut self, entry: LookupEntry<P>) -> u32 {
        let needs_chunk = self
            .chunks
            .last()
            .map_or(true, |chunk| chunk.len() == LOOKUP_BLOCK_SIZE);
        if needs_chunk {
            self.chunks.push(Vec::with_capacity(LOOKUP_BLOCK_SIZE));
        }

        let id = self.count;
        if entry.name.is_some() {
            self.buckets.entry(entry.hash).or_default().push(id);
        }
        if let Some(chunk) = self.chunks.last_mut() {
            chunk.push(entry);
        }
        self.count += 1;
        id
    }

    /// Add a named entry without checking for an existing one.
    pub fn add(&mut self, name: &[u8], payload: Option<P>) -> u32 {
        let hash = (self.hasher)(name);
        self.push(LookupEntry {
            hash,
            name: Some(name.to_vec()),
            payload,
            line_num: 0,
            group_id: 0,
        })
    }

    /// Id of `name`, adding it if it is not in the table yet. The flag is
    /// `true` when the entry was added by this call.
    pub fn find_or_add(&mut self, name: &[u8]) -> (u32, bool) {
        match self.find(name) {
            Some(id) => (id, false),
            None => (self.add(name, None), true),
        }
    }

    /// Reserve an unnamed slot that is named later with [`set_name`](Self::set_name).
    pub fn new_lookup(&mut self, payload: Option<P>) -> u32 {
        self.push(LookupEntry {
            hash: 0,
            name: None,
            payload,
            line_num: 0,
            group_id: 0,
        })
    }

    /// Name (or rename) an entry. Returns `false` for an unknown id.
    pub fn set_name(&mut self, id: u32, name: &[u8]) -> bool {
        let hash = (self.hasher)(name);
        let Some(entry) = self.get_mut(id) else {
            return false;
        };

        let old_hash = entry.hash;
        let was_named = entry.name.is_some();
        entry.hash = hash;
        entry.name = Some(name.to_vec());

        if was_named {
            if let Some(bucket) = self.buckets.get_mut(&old_hash) {
                bucket.retain(|existing| *existing != id);
            }
        }
        self.buckets.entry(hash).or_default().push(id);
        true
    }

    /// Entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &LookupEntry<P>)> {
        self.chunks
            .iter()
            .flatten()
            .enumerate()
            .map(|(id, entry)| (id as u32, entry))
    }
}
