//! Fixed-capacity edge pool.
//!
//! Edges store external node ids for both endpoints and are dereferenced
//! through the id index, so there are no pointer cycles in storage. The
//! only secondary access path is the `from`-column scan used by
//! `scan_edges_from`; anything richer is out of scope.

use crate::section::{SectionReader, SectionWriter};
use crate::slots::SlotMeta;
use nendb_core::{Edge, Error, PoolStats, Result};

/// Struct-of-arrays edge storage.
#[derive(Debug)]
pub struct EdgePool {
    meta: SlotMeta,
    froms: Vec<u64>,
    tos: Vec<u64>,
    labels: Vec<u16>,
    props: Vec<u8>,
    prop_size: usize,
}

impl EdgePool {
    /// Allocate an empty pool with all columns sized to `capacity`.
    pub fn new(capacity: u32, prop_size: u32) -> Self {
        let cap = capacity as usize;
        let prop_size = prop_size as usize;
        EdgePool {
            meta: SlotMeta::new(capacity),
            froms: vec![0u64; cap],
            tos: vec![0u64; cap],
            labels: vec![0u16; cap],
            props: vec![0u8; cap * prop_size],
            prop_size,
        }
    }

    /// Fixed property blob width in bytes.
    pub fn prop_size(&self) -> usize {
        self.prop_size
    }

    /// Place an edge at the next free slot. Endpoint validation is the
    /// caller's responsibility.
    ///
    /// # Errors
    ///
    /// `PoolExhausted` when the cursor has reached capacity.
    pub fn alloc(&mut self, from: u64, to: u64, label: u16, props: &[u8]) -> Result<u32> {
        debug_assert!(props.len() <= self.prop_size);
        let slot = self
            .meta
            .alloc()
            .ok_or_else(|| Error::pool_exhausted("edges", self.meta.capacity()))?;
        let i = slot as usize;
        self.froms[i] = from;
        self.tos[i] = to;
        self.labels[i] = label;
        let blob = &mut self.props[i * self.prop_size..(i + 1) * self.prop_size];
        blob.fill(0);
        blob[..props.len()].copy_from_slice(props);
        Ok(slot)
    }

    /// Read the edge at a slot, or `None` if tombstoned / past the cursor.
    ///
    /// # Errors
    ///
    /// `InvalidSlot` if `slot >= capacity`.
    pub fn get(&self, slot: u32) -> Result<Option<Edge>> {
        self.meta.check_slot(slot)?;
        if !self.meta.is_active(slot) {
            return Ok(None);
        }
        Ok(Some(self.record_at(slot)))
    }

    /// Tombstone a slot; see [`SlotMeta::mark_deleted`].
    pub fn mark_deleted(&mut self, slot: u32) -> Result<bool> {
        self.meta.mark_deleted(slot)
    }

    /// Lazy iterator over `(slot, record)` pairs in slot order.
    pub fn iter_active(&self) -> impl Iterator<Item = (u32, Edge)> + '_ {
        self.meta
            .iter_active()
            .map(move |slot| (slot, self.record_at(slot)))
    }

    /// Lazy iterator over active edges leaving `from`, in slot order.
    pub fn iter_from(&self, from: u64) -> impl Iterator<Item = (u32, Edge)> + '_ {
        self.meta.iter_active().filter_map(move |slot| {
            if self.froms[slot as usize] == from {
                Some((slot, self.record_at(slot)))
            } else {
                None
            }
        })
    }

    /// Slots of all active edges matching `(from, to, label)` exactly.
    pub fn find_matching(&self, from: u64, to: u64, label: u16) -> Vec<u32> {
        self.meta
            .iter_active()
            .filter(|&slot| {
                let i = slot as usize;
                self.froms[i] == from && self.tos[i] == to && self.labels[i] == label
            })
            .collect()
    }

    /// Slots of all active edges touching `node` on either endpoint.
    pub fn find_touching(&self, node: u64) -> Vec<u32> {
        self.meta
            .iter_active()
            .filter(|&slot| {
                let i = slot as usize;
                self.froms[i] == node || self.tos[i] == node
            })
            .collect()
    }

    /// Scan the `from` column for active edges leaving `from`, writing slot
    /// indices into `out`. Returns the number written, saturating at
    /// `out.len()`.
    pub fn filter_by_endpoint(&self, from: u64, out: &mut [u32]) -> usize {
        self.filter_by(|f, _, _| f == from, out)
    }

    /// Scan the endpoint and label columns with an arbitrary predicate.
    pub fn filter_by<F>(&self, pred: F, out: &mut [u32]) -> usize
    where
        F: Fn(u64, u64, u16) -> bool,
    {
        let mut n = 0;
        for slot in self.meta.iter_active() {
            if n == out.len() {
                break;
            }
            let i = slot as usize;
            if pred(self.froms[i], self.tos[i], self.labels[i]) {
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

    fn record_at(&self, slot: u32) -> Edge {
        let i = slot as usize;
        Edge {
            from: self.froms[i],
            to: self.tos[i],
            label: self.labels[i],
            generation: self.meta.generation(slot),
            properties: self.props[i * self.prop_size..(i + 1) * self.prop_size].to_vec(),
        }
    }

    /// Dump the active records as a compacted column-major section:
    /// cursor, live, then from, to, labels, flags, generations, properties.
    pub fn encode_section(&self, buf: &mut Vec<u8>) {
        let active: Vec<u32> = self.meta.iter_active().collect();
        let count = active.len() as u32;
        let mut w = SectionWriter::new(buf);
        w.put_u32(count);
        w.put_u32(count);
        for &slot in &active {
            w.put_u64(self.froms[slot as usize]);
        }
        for &slot in &active {
            w.put_u64(self.tos[slot as usize]);
        }
        for &slot in &active {
            w.put_u16(self.labels[slot as usize]);
        }
        for _ in &active {
            w.put_u8(1);
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
    pub fn decode_section(bytes: &[u8], capacity: u32, prop_size: u32) -> Result<Self> {
        let mut r = SectionReader::new(bytes);
        let cursor = r.take_u32()?;
        let live = r.take_u32()?;
        if cursor != live {
            return Err(Error::snapshot_corruption(format!(
                "edge section not compacted: cursor {} != live {}",
                cursor, live
            )));
        }
        let count = live as usize;

        let mut froms = Vec::with_capacity(count);
        for _ in 0..count {
            froms.push(r.take_u64()?);
        }
        let mut tos = Vec::with_capacity(count);
        for _ in 0..count {
            tos.push(r.take_u64()?);
        }
        let mut labels = Vec::with_capacity(count);
        for _ in 0..count {
            labels.push(r.take_u16()?);
        }
        for _ in 0..count {
            if r.take_u8()? != 1 {
                return Err(Error::snapshot_corruption(
                    "inactive record in compacted edge section",
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
        let mut pool = EdgePool::new(capacity, prop_size);
        pool.meta = meta;
        pool.froms[..count].copy_from_slice(&froms);
        pool.tos[..count].copy_from_slice(&tos);
        pool.labels[..count].copy_from_slice(&labels);
        pool.props[..prop_bytes.len()].copy_from_slice(prop_bytes);
        Ok(pool)
    }
}
