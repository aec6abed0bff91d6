//! Error types for the NenDB engine.
//!
//! A single [`Error`] enum covers every layer: pools, id index, WAL,
//! snapshots, batch processing, and the open/close lifecycle. All write and
//! recovery paths return [`Result`]; nothing is silently swallowed.
//!
//! ## Error categories
//!
//! - **Capacity**: `PoolExhausted`, `BatchFull` — a fixed limit was reached.
//! - **Validation**: `DuplicateId`, `UnknownNode`, `SelfLoopRejected`,
//!   `PropertyOverflow`, `DimensionMismatch` — the batch is invalid and will
//!   not be retried successfully without changing it.
//! - **Durability**: `WalIo`, `WalUnhealthy`, `WalCorruption`,
//!   `SnapshotCorruption` — disk-level failures.
//! - **Lifecycle**: `DatabaseLocked`, `InvalidConfiguration`, `InvalidSlot`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for NenDB operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all NenDB engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A pool's fixed capacity was reached. Retry after compaction
    /// (snapshot + reopen) or open with a larger capacity.
    #[error("pool exhausted: {pool} (capacity {capacity})")]
    PoolExhausted {
        /// Which pool ran out of slots.
        pool: &'static str,
        /// The configured capacity.
        capacity: u32,
    },

    /// A node with this id already exists among active slots.
    #[error("duplicate node id: {0}")]
    DuplicateId(u64),

    /// An edge endpoint or embedding owner does not resolve to an active node.
    #[error("unknown node id: {0}")]
    UnknownNode(u64),

    /// Internal bounds violation; should not occur from external input.
    #[error("invalid slot index {slot} (limit {limit})")]
    InvalidSlot {
        /// The offending slot index.
        slot: u32,
        /// The capacity it was checked against.
        limit: u32,
    },

    /// Disk write failure on the WAL append path. The batch was rejected
    /// before any pool mutation and the WAL is now marked unhealthy.
    #[error("WAL I/O error: {0}")]
    WalIo(String),

    /// A write was attempted on a WAL that already observed an I/O error.
    /// The engine must be restarted.
    #[error("WAL is unhealthy; restart the engine")]
    WalUnhealthy,

    /// Corruption detected while reading the WAL at recovery. The tail was
    /// truncated; the engine continues in a degraded but consistent state.
    #[error("WAL corruption in segment {segment} at offset {offset}")]
    WalCorruption {
        /// Segment number containing the bad record.
        segment: u64,
        /// Byte offset of the first invalid record.
        offset: u64,
    },

    /// Both `snapshot` and `snapshot.bak` failed validation.
    #[error("snapshot corruption: {0}")]
    SnapshotCorruption(String),

    /// The batch already holds `batch_max_size` messages.
    #[error("batch full (capacity {capacity})")]
    BatchFull {
        /// The configured maximum batch size.
        capacity: u32,
    },

    /// Another process holds the data-directory lockfile.
    #[error("database locked: {path}")]
    DatabaseLocked {
        /// Path of the contended lockfile.
        path: PathBuf,
    },

    /// Capacities or dimensions out of the allowed range, or a persisted
    /// image is incompatible with the provided configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A property blob longer than the configured fixed size.
    #[error("property blob too large: {got} bytes (max {max})")]
    PropertyOverflow {
        /// Length of the supplied blob.
        got: usize,
        /// The configured fixed property size.
        max: usize,
    },

    /// An embedding vector whose length differs from `embedding_dim`.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// The configured embedding dimension.
        expected: usize,
        /// The supplied vector length.
        got: usize,
    },

    /// An edge with `from == to` while the configuration forbids self-loops.
    #[error("self-loop rejected by configuration: node {0}")]
    SelfLoopRejected(u64),

    /// I/O error outside the WAL append path (snapshot files, lockfile,
    /// directory creation). WAL append failures are reported as `WalIo`.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a `PoolExhausted` error for the named pool.
    pub fn pool_exhausted(pool: &'static str, capacity: u32) -> Self {
        Error::PoolExhausted { pool, capacity }
    }

    /// Create an `InvalidSlot` error.
    pub fn invalid_slot(slot: u32, limit: u32) -> Self {
        Error::InvalidSlot { slot, limit }
    }

    /// Create an `InvalidConfiguration` error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration(message.into())
    }

    /// Create a `WalIo` error from any I/O failure on the append path.
    pub fn wal_io(err: &io::Error) -> Self {
        Error::WalIo(err.to_string())
    }

    /// Create a `SnapshotCorruption` error.
    pub fn snapshot_corruption(message: impl Into<String>) -> Self {
        Error::SnapshotCorruption(message.into())
    }

    /// True for errors caused by a fixed limit (`PoolExhausted`, `BatchFull`).
    ///
    /// Capacity errors are resolved by compaction or configuration, not by
    /// retrying the same batch.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            Error::PoolExhausted { .. } | Error::BatchFull { .. }
        )
    }

    /// True for data-integrity failures detected on disk.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::WalCorruption { .. } | Error::SnapshotCorruption(_)
        )
    }

    /// True for batch-validation failures. The batch must be changed before
    /// it can commit; the engine state is untouched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::DuplicateId(_)
                | Error::UnknownNode(_)
                | Error::SelfLoopRejected(_)
                | Error::PropertyOverflow { .. }
                | Error::DimensionMismatch { .. }
        )
    }
}
