//! The NenDB engine: batch commit protocol, recovery orchestration, and
//! the public API surface.
//!
//! # Write path
//!
//! ```text
//! caller → Batch (pre-allocated messages)
//!        → validate (against committed state, under the commit lock)
//!        → WAL append (one write, fsync per policy)
//!        → apply to pools + id index (under the state write lock)
//! ```
//!
//! A batch either fully applies or has no effect. Readers take the state
//! read lock and observe either the full pre-batch or full post-batch
//! state, never a partial one.
//!
//! # Concurrency
//!
//! One writer at a time (the commit mutex), any number of readers. The
//! snapshot path holds the commit mutex (quiescing writers) but only a
//! read lock on state, so readers continue during a snapshot.

pub mod batch;
pub mod engine;
pub mod lockfile;
pub mod state;

pub use batch::{Batch, BatchMessage, BatchResult};
pub use engine::{Engine, EngineStats};
pub use lockfile::{Lockfile, LOCK_FILE_NAME};
pub use state::EngineState;
