//! Fixed-capacity node pool.
//!
//! Columns: external id (`u64`), kind (`u8`), property blob (strided
//! `u8`), plus the shared slot metadata (active bitset, generations,
//! cursor). The id → slot mapping lives in [`crate::IdIndex`]; the pool
//! itself is position-addressed.

use crate::section::{SectionReader, SectionWriter};
use crate::slots::SlotMeta;
use nendb_core::{Error, Node, PoolStats, Result};

/// Struct-of-arrays node storage.
#[derive(Debug)]
pub struct NodePool {
    meta: SlotMeta,
    ids: Vec<u64>,
    kinds: Vec<u8>,
    /// `capacity * prop_size` bytes, one fixed-width blob per slot.
    props: Vec<u8>,
    prop_size: usize,
}

impl NodePool {
    /// Allocate an empty pool. All columns are sized to `capacity` up
    /// front; no further allocation happens at runtime.
    pub fn new(capacity: u32, prop_size: u32) -> Self {
        let cap = capacity as usize;
        let prop_size = prop_size as usize;
        NodePool {
            meta: SlotMeta::new(capacity),
            ids: vec![0u64; cap],
            kinds: vec![0u8; cap],
            props: vec![0u8; cap * prop_size],
            prop_size,
        }
    }

    /// Fixed property blob width in bytes.
    pub fn prop_size(&self) -> usize {
        self.prop_size
    }

    /// Place a record at the next free slot.
    ///
    /// `props` must not exceed the fixed width; shorter blobs are
    /// zero-padded. Does not touch the WAL or the id index; that is the
    /// caller's responsibility.
    ///
    /// # Errors
    ///
    /// `PoolExhausted` when the cursor has reached capacity.
    pub fn alloc(&mut self, id: u64, kind: u8, props: &[u8]) -> Result<u32> {
        debug_assert!(props.len() <= self.prop_size);
        let slot = self
            .meta
            .alloc()
            .ok_or_else(|| Error::pool_exhausted("nodes", self.meta.capacity()))?;
        let i = slot as usize;
        self.ids[i] = id;
        self.kinds[i] = kind;
        let range = i * self.prop_size..(i + 1) * self.prop_size;
        let blob = &mut self.props[range];
        blob.fill(0);
        blob[..props.len()].copy_from_slice(props);
        Ok(slot)
    }

    /// Read the record at a slot, or `None` if the slot is tombstoned or
    /// past the cursor.
    ///
    /// # Errors
    ///
    /// `InvalidSlot` if `slot >= capacity`.
    pub fn get(&self, slot: u32) -> Result<Option<Node>> {
        self.meta.check_slot(slot)?;
        if !self.meta.is_active(slot) {
            return Ok(None);
        }
        Ok(Some(self.record_at(slot)))
    }

    /// External id stored at a slot, active or not. Used by the engine to
    /// cross-check index entries.
    pub fn id_at(&self, slot: u32) -> Result<u64> {
        self.meta.check_slot(slot)?;
        Ok(self.ids[slot as usize])
    }

    /// Overwrite kind and properties of an active slot. A tombstoned slot
    /// is left untouched.
    pub fn update(&mut self, slot: u32, kind: u8, props: &[u8]) -> Result<()> {
        debug_assert!(props.len() <= self.prop_size);
        self.meta.check_slot(slot)?;
        if !self.meta.is_active(slot) {
            return Ok(());
        }
        let i = slot as usize;
        self.kinds[i] = kind;
        let blob = &mut self.props[i * self.prop_size..(i + 1) * self.prop_size];
        blob.fill(0);
        blob[..props.len()].copy_from_slice(props);
        Ok(())
    }

    /// Tombstone a slot; see [`SlotMeta::mark_deleted`].
    pub fn mark_deleted(&mut self, slot: u32) -> Result<bool> {
        self.meta.mark_deleted(slot)
    }

    /// Whether the slot holds an active record.
    pub fn is_active(&self, slot: u32) -> bool {
        self.meta.is_active(slot)
    }

    /// Lazy iterator over `(slot, record)` pairs in slot order.
    pub fn iter_active(&self) -> impl Iterator<Item = (u32, Node)> + '_ {
        self.meta
            .iter_active()
            .map(move |slot| (slot, self.record_at(slot)))
    }

    /// Scan the kind column for active records matching `kind`, writing
    /// slot indices into `out`. Returns the number written, saturating at
    /// `out.len()`.
    pub fn filter_by_kind(&self, kind: u8, out: &mut [u32]) -> usize {
        self.filter_by(|_, k| k == kind, out)
    }

    /// Scan the id and kind columns with an arbitrary predicate.
    pub fn filter_by<F>(&self, pred: F, out: &mut [u32]) -> usize
    where
        F: Fn(u64, u8) -> bool,
    {
        let mut n = 0;
        for slot in self.meta.iter_active() {
            if n == out.len() {
                break;
            }
            let i = slot as usize;
            if pred(self.ids[i], self.kinds[i]) {
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

    fn record_at(&self, slot: u32) -> Node {
        let i = slot as usize;
        Node {
            id: self.ids[i],
            kind: self.kinds[i],
            generation: self.meta.generation(slot),
            properties: self.props[i * self.prop_size..(i + 1) * self.prop_size].to_vec(),
        }
    }

    /// Dump the active records as a compacted column-major section:
    /// cursor, live, then ids, kinds, flags, generations, properties.
    pub fn encode_section(&self, buf: &mut Vec<u8>) {
        let active: Vec<u32> = self.meta.iter_active().collect();
        let count = active.len() as u32;
        let mut w = SectionWriter::new(buf);
        w.put_u32(count); // cursor after reload
        w.put_u32(count); // live after reload
        for &slot in &active {
            w.put_u64(self.ids[slot as usize]);
        }
        for &slot in &active {
            w.put_u8(self.kinds[slot as usize]);
        }
        for _ in &active {
            w.put_u8(1); // active flag
        }
        for &slot in &active {
            w.put_u32(self.meta.generation(slot));
        }
        for &slot in &active {
            let i = slot as usize;
            w.put_bytes(&self.props[i * self.prop_size..(i + 1) * self.prop_size]);
        }
    }

    /// Rebuild a pool from a section written by [`Self::encode_section`].
    ///
    /// Records land in slots `[0, count)`: reloading a snapshot is the
    /// compaction point where tombstoned slots are reclaimed.
    pub fn decode_section(bytes: &[u8], capacity: u32, prop_size: u32) -> Result<Self> {
        let mut r = SectionReader::new(bytes);
        let cursor = r.take_u32()?;
        let live = r.take_u32()?;
        if cursor != live {
            return Err(Error::snapshot_corruption(format!(
                "node section not compacted: cursor {} != live {}",
                cursor, live
            )));
        }
        let count = live as usize;

        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(r.take_u64()?);
        }
        let mut kinds = Vec::with_capacity(count);
        for _ in 0..count {
            kinds.push(r.take_u8()?);
        }
        for _ in 0..count {
            if r.take_u8()? != 1 {
                return Err(Error::snapshot_corruption(
                    "inactive record in compacted node section",
                ));
            }
        }
        let mut generations = Vec::with_capacity(count);
        for _ in 0..count {
            generations.push(r.take_u32()?);
        }
        let prop_bytes = r.take_bytes(count * prop_size as usize)?;
        r.finish()?;

        let meta = SlotMeta::restore(capacity, &generations)?;
        let mut pool = NodePool::new(capacity, prop_size);
        pool.meta = meta;
        pool.ids[..count].copy_from_slice(&ids);
        pool.kinds[..count].copy_from_slice(&kinds);
        pool.props[..prop_bytes.len()].copy_from_slice(prop_bytes);
        Ok(pool)
    }
}
