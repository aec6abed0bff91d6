//! Durability layer for the NenDB engine: write-ahead log, snapshot
//! images, and recovery.
//!
//! # Responsibilities
//!
//! - [`format`] — on-disk byte formats: WAL records and segment headers.
//! - [`wal`] — the append path ([`wal::WalWriter`]) and the validation-side
//!   scan ([`wal::WalReader`]), plus [`wal::WalHealth`].
//! - [`snapshot`] — crash-safe point-in-time images
//!   (write → fsync → rename, with `snapshot.bak` preservation).
//! - [`recovery`] — snapshot load plus batch-sealed WAL replay with tail
//!   repair.
//!
//! This crate knows nothing about pools; state is exchanged as byte
//! sections and replay is driven through an apply callback supplied by the
//! engine.

pub mod format;
pub mod recovery;
pub mod snapshot;
pub mod wal;

pub use format::wal_record::{RecordLayout, RecordType, WalOp, WalRecord, WalRecordError};
pub use recovery::{RecoveryCoordinator, RecoveryOutcome};
pub use snapshot::{SnapshotConfig, SnapshotImage, SnapshotInfo, SnapshotSection};
pub use wal::{WalHealth, WalReader, WalWriter};
