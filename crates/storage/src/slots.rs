//! Slot bookkeeping shared by every pool.
//!
//! Tracks which slots are live (packed bitset), each slot's generation, the
//! monotonic allocation cursor, and the live count. The cursor never moves
//! backwards at runtime; tombstoned slots stay allocated until a compacted
//! snapshot image is reloaded.

use nendb_core::{Error, PoolStats, Result};
use std::sync::atomic::{AtomicU32, Ordering};

/// Per-pool slot metadata: active bitset, generations, cursor, live count.
#[derive(Debug)]
pub struct SlotMeta {
    capacity: u32,
    /// Packed active flags, one bit per slot.
    words: Vec<u64>,
    /// Generation counter per slot, bumped on every tombstone.
    generations: Vec<u32>,
    cursor: AtomicU32,
    live: AtomicU32,
}

impl SlotMeta {
    /// Create metadata for an empty pool of the given capacity.
    pub fn new(capacity: u32) -> Self {
        let word_count = (capacity as usize + 63) / 64;
        SlotMeta {
            capacity,
            words: vec![0u64; word_count],
            generations: vec![0u32; capacity as usize],
            cursor: AtomicU32::new(0),
            live: AtomicU32::new(0),
        }
    }

    /// Rebuild metadata from a compacted dump: slots `[0, count)` are
    /// active with the given generations, cursor == live == count.
    pub fn restore(capacity: u32, active_generations: &[u32]) -> Result<Self> {
        let count = active_generations.len();
        if count > capacity as usize {
            return Err(Error::invalid_configuration(format!(
                "image holds {} records but capacity is {}",
                count, capacity
            )));
        }
        let mut meta = SlotMeta::new(capacity);
        for (slot, gen) in active_generations.iter().enumerate() {
            meta.words[slot / 64] |= 1u64 << (slot % 64);
            meta.generations[slot] = *gen;
        }
        meta.cursor.store(count as u32, Ordering::Release);
        meta.live.store(count as u32, Ordering::Release);
        Ok(meta)
    }

    /// Configured slot count.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Allocation cursor (acquire load; safe from any thread).
    pub fn cursor(&self) -> u32 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Live record count (acquire load; safe from any thread).
    pub fn live(&self) -> u32 {
        self.live.load(Ordering::Acquire)
    }

    /// Counters as a [`PoolStats`] value.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            live: self.live(),
            cursor: self.cursor(),
        }
    }

    /// Allocate the next slot, marking it active with its current
    /// generation. Returns `None` when the cursor has reached capacity;
    /// the caller maps that to `PoolExhausted` for its pool.
    pub fn alloc(&mut self) -> Option<u32> {
        let slot = self.cursor.load(Ordering::Relaxed);
        if slot >= self.capacity {
            return None;
        }
        self.words[slot as usize / 64] |= 1u64 << (slot % 64);
        self.cursor.store(slot + 1, Ordering::Release);
        self.live
            .store(self.live.load(Ordering::Relaxed) + 1, Ordering::Release);
        Some(slot)
    }

    /// Bounds check against the configured capacity.
    pub fn check_slot(&self, slot: u32) -> Result<()> {
        if slot >= self.capacity {
            return Err(Error::invalid_slot(slot, self.capacity));
        }
        Ok(())
    }

    /// Whether the slot is allocated and not tombstoned.
    pub fn is_active(&self, slot: u32) -> bool {
        slot < self.cursor.load(Ordering::Acquire)
            && (self.words[slot as usize / 64] >> (slot % 64)) & 1 == 1
    }

    /// Slot generation. Bumped once per active→deleted transition.
    pub fn generation(&self, slot: u32) -> u32 {
        self.generations[slot as usize]
    }

    /// Tombstone a slot. Idempotent: a second delete of the same slot does
    /// not bump the generation again. Returns whether the slot was active.
    ///
    /// # Errors
    ///
    /// `InvalidSlot` if `slot >= capacity`.
    pub fn mark_deleted(&mut self, slot: u32) -> Result<bool> {
        self.check_slot(slot)?;
        if !self.is_active(slot) {
            return Ok(false);
        }
        self.words[slot as usize / 64] &= !(1u64 << (slot % 64));
        self.generations[slot as usize] += 1;
        self.live
            .store(self.live.load(Ordering::Relaxed) - 1, Ordering::Release);
        Ok(true)
    }

    /// Restartable iterator over active slot indices, in slot order.
    pub fn iter_active(&self) -> impl Iterator<Item = u32> + '_ {
        let cursor = self.cursor();
        self.words
            .iter()
            .enumerate()
            .flat_map(move |(word_idx, &word)| {
                let base = word_idx as u32 * 64;
                BitIter { word }.map(move |bit| base + bit)
            })
            .take_while(move |&slot| slot < cursor)
    }
}

/// Iterator over set bit positions of one word, low to high.
struct BitIter {
    word: u64,
}

impl Iterator for BitIter {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.word == 0 {
            return None;
        }
        let bit = self.word.trailing_zeros();
        self.word &= self.word - 1;
        Some(bit)
    }
}
