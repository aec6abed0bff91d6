//! Fixed-capacity embedding pool.
//!
//! One fixed-dimension `f32` vector per owning node. The vector column is a
//! single flat allocation strided by the dimension, aligned for wide loads.
//! Lookup by owner is a linear scan over the `node_id` column; the primary
//! node-id map is the only index this engine maintains.

use crate::section::{SectionReader, SectionWriter};
use crate::slots::SlotMeta;
use nendb_core::{Embedding, Error, PoolStats, Result};

/// Struct-of-arrays embedding storage.
#[derive(Debug)]
pub struct EmbeddingPool {
    meta: SlotMeta,
    node_ids: Vec<u64>,
    /// `capacity * dim` lanes, one fixed-width vector per slot.
    vectors: Vec<f32>,
    dim: usize,
}

impl EmbeddingPool {
    /// Allocate an empty pool with all columns sized to `capacity`.
    pub fn new(capacity: u32, dim: u32) -> Self {
        let cap = capacity as usize;
        let dim = dim as usize;
        EmbeddingPool {
            meta: SlotMeta::new(capacity),
            node_ids: vec![0u64; cap],
            vectors: vec![0f32; cap * dim],
            dim,
        }
    }

    /// Configured vector dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Place a vector at the next free slot. `vector.len()` must equal the
    /// configured dimension (validated upstream at batch-add time).
    ///
    /// # Errors
    ///
    /// `PoolExhausted` when the cursor has reached capacity.
    pub fn alloc(&mut self, node_id: u64, vector: &[f32]) -> Result<u32> {
        debug_assert_eq!(vector.len(), self.dim);
        let slot = self
            .meta
            .alloc()
            .ok_or_else(|| Error::pool_exhausted("embeddings", self.meta.capacity()))?;
        let i = slot as usize;
        self.node_ids[i] = node_id;
        self.vectors[i * self.dim..(i + 1) * self.dim].copy_from_slice(vector);
        Ok(slot)
    }

    /// Overwrite the vector of an active slot in place (upsert path).
    pub fn overwrite(&mut self, slot: u32, vector: &[f32]) -> Result<()> {
        debug_assert_eq!(vector.len(), self.dim);
        self.meta.check_slot(slot)?;
        if !self.meta.is_active(slot) {
            return Ok(());
        }
        let i = slot as usize;
        self.vectors[i * self.dim..(i + 1) * self.dim].copy_from_slice(vector);
        Ok(())
    }

    /// Read the embedding at a slot, or `None` if tombstoned / past the
    /// cursor.
    ///
    /// # Errors
    ///
    /// `InvalidSlot` if `slot >= capacity`.
    pub fn get(&self, slot: u32) -> Result<Option<Embedding>> {
        self.meta.check_slot(slot)?;
        if !self.meta.is_active(slot) {
            return Ok(None);
        }
        Ok(Some(self.record_at(slot)))
    }

    /// Slot of the active embedding owned by `node_id`, if any. Linear scan
    /// of the owner column.
    pub fn find_by_node(&self, node_id: u64) -> Option<u32> {
        self.meta
            .iter_active()
            .find(|&slot| self.node_ids[slot as usize] == node_id)
    }

    /// Tombstone a slot; see [`SlotMeta::mark_deleted`].
    pub fn mark_deleted(&mut self, slot: u32) -> Result<bool> {
        self.meta.mark_deleted(slot)
    }

    /// Lazy iterator over `(slot, record)` pairs in slot order.
    pub fn iter_active(&self) -> impl Iterator<Item = (u32, Embedding)> + '_ {
        self.meta
            .iter_active()
            .map(move |slot| (slot, self.record_at(slot)))
    }

    /// Scan the owner column with an arbitrary predicate.
    pub fn filter_by<F>(&self, pred: F, out: &mut [u32]) -> usize
    where
        F: Fn(u64) -> bool,
    {
        let mut n = 0;
        for slot in self.meta.iter_active() {
            if n == out.len() {
                break;
            }
            if pred(self.node_ids[slot as usize]) {
                out[n] = slot;
                n += 1;
            }
        }
        n
    }

    /// Pool counters.
    pub fn stats(&self) -> PoolStats {
        self.meta.stats()
    }

    fn record_at(&self, slot: u32) -> Embedding {
        let i = slot as usize;
        Embedding {
            node_id: self.node_ids[i],
            vector: self.vectors[i * self.dim..(i + 1) * self.dim].to_vec(),
        }
    }

    /// Dump the active records as a compacted column-major section:
    /// cursor, live, then node ids, flags, vectors.
    pub fn encode_section(&self, buf: &mut Vec<u8>) {
        let active: Vec<u32> = self.meta.iter_active().collect();
        let count = active.len() as u32;
        let mut w = SectionWriter::new(buf);
        w.put_u32(count);
        w.put_u32(count);
        for &slot in &active {
            w.put_u64(self.node_ids[slot as usize]);
        }
        for _ in &active {
            w.put_u8(1);
        }
        for &slot in &active {
            let i = slot as usize;
            for &lane in &self.vectors[i * self.dim..(i + 1) * self.dim] {
                w.put_f32(lane);
            }
        }
    }

    /// Rebuild a pool from a section written by [`Self::encode_section`].
    pub fn decode_section(bytes: &[u8], capacity: u32, dim: u32) -> Result<Self> {
        let mut r = SectionReader::new(bytes);
        let cursor = r.take_u32()?;
        let live = r.take_u32()?;
        if cursor != live {
            return Err(Error::snapshot_corruption(format!(
                "embedding section not compacted: cursor {} != live {}",
                cursor, live
            )));
        }
        let count = live as usize;

        let mut node_ids = Vec::with_capacity(count);
        for _ in 0..count {
            node_ids.push(r.take_u64()?);
        }
        for _ in 0..count {
            if r.take_u8()? != 1 {
                return Err(Error::snapshot_corruption(
                    "inactive record in compacted embedding section",
                ));
            }
        }
        let mut lanes = Vec::with_capacity(count * dim as usize);
        for _ in 0..count * dim as usize {
            lanes.push(r.take_f32()?);
        }
        r.finish()?;

        // Embedding generations are not exposed; restore with zeros.
        let meta = SlotMeta::restore(capacity, &vec![0u32; count])?;
        let mut pool = EmbeddingPool::new(capacity, dim);
        pool.meta = meta;
        pool.node_ids[..count].copy_from_slice(&node_ids);
        pool.vectors[..lanes.len()].copy_from_slice(&lanes);
        Ok(pool)
    }
}
