//! Primary-key map from external node id to pool slot.
//!
//! At most one mapping per id; active node slots are indexed, tombstoned
//! slots are not. Updates happen inside the same writer-lock critical
//! section as the pool mutation they belong to, so the index is consistent
//! with the node pool at every commit boundary.

use crate::section::{SectionReader, SectionWriter};
use nendb_core::{Error, Result};
use rustc_hash::FxHashMap;

/// Node id → slot index map.
#[derive(Debug)]
pub struct IdIndex {
    map: FxHashMap<u64, u32>,
}

impl IdIndex {
    /// Create an empty index pre-sized for the node pool capacity.
    pub fn with_capacity(capacity: u32) -> Self {
        IdIndex {
            map: FxHashMap::with_capacity_and_hasher(capacity as usize, Default::default()),
        }
    }

    /// Insert a mapping.
    ///
    /// # Errors
    ///
    /// `DuplicateId` if the id is already present.
    pub fn insert(&mut self, id: u64, slot: u32) -> Result<()> {
        match self.map.entry(id) {
            std::collections::hash_map::Entry::Occupied(_) => Err(Error::DuplicateId(id)),
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(slot);
                Ok(())
            }
        }
    }

    /// Slot for an id, if mapped.
    pub fn lookup(&self, id: u64) -> Option<u32> {
        self.map.get(&id).copied()
    }

    /// Whether the id is mapped.
    pub fn contains(&self, id: u64) -> bool {
        self.map.contains_key(&id)
    }

    /// Remove a mapping. Used on node delete and during snapshot reload.
    pub fn remove(&mut self, id: u64) -> Option<u32> {
        self.map.remove(&id)
    }

    /// Number of mappings. Equals the node pool's live count at every
    /// commit boundary.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Entries sorted by id, for deterministic serialization.
    pub fn snapshot_iter(&self) -> Vec<(u64, u32)> {
        let mut entries: Vec<(u64, u32)> = self.map.iter().map(|(&id, &slot)| (id, slot)).collect();
        entries.sort_unstable_by_key(|&(id, _)| id);
        entries
    }

    /// Dump as a section: count, then (id, slot) pairs sorted by id.
    pub fn encode_section(&self, buf: &mut Vec<u8>) {
        let entries = self.snapshot_iter();
        let mut w = SectionWriter::new(buf);
        w.put_u32(entries.len() as u32);
        for (id, slot) in entries {
            w.put_u64(id);
            w.put_u32(slot);
        }
    }

    /// Rebuild from a section written by [`Self::encode_section`].
    pub fn decode_section(bytes: &[u8], capacity: u32) -> Result<Self> {
        let mut r = SectionReader::new(bytes);
        let count = r.take_u32()?;
        let mut index = IdIndex::with_capacity(capacity);
        for _ in 0..count {
            let id = r.take_u64()?;
            let slot = r.take_u32()?;
            index
                .insert(id, slot)
                .map_err(|_| Error::snapshot_corruption(format!("duplicate id {} in index dump", id)))?;
        }
        r.finish()?;
        Ok(index)
    }
}
