//! Struct-of-arrays storage pools for the NenDB engine.
//!
//! Three fixed-capacity pools ([`NodePool`], [`EdgePool`],
//! [`EmbeddingPool`]) store records as parallel columns of primitive
//! values, plus the primary-key [`IdIndex`] mapping external node ids to
//! slots.
//!
//! # Memory model
//!
//! - Every column is allocated once at pool construction to the full
//!   configured capacity. No per-record heap allocation afterwards.
//! - Allocation uses a monotonic cursor; deletion is a tombstone (clear the
//!   active bit, bump the generation). Slots are reclaimed only when a
//!   compacted snapshot image is reloaded.
//! - Active flags are a packed `u64` bitset so scans touch 64 slots per
//!   word.
//!
//! # Concurrency
//!
//! Pools are plain data: all mutation happens under the engine's writer
//! lock, all column reads under its read lock. The cursor and live counter
//! are additionally published through atomics (release store on mutation,
//! acquire load on read) so `stats()` never needs a lock.

pub mod edge;
pub mod embedding;
pub mod index;
pub mod node;
pub mod section;
pub mod slots;

pub use edge::EdgePool;
pub use embedding::EmbeddingPool;
pub use index::IdIndex;
pub use node::NodePool;
pub use slots::SlotMeta;
