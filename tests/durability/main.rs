//! Integration tests for the durability layer.
//!
//! These exercise WAL, snapshot, and recovery behaviors through a real
//! engine lifecycle (open → write → crash/corrupt → reopen). Encoding,
//! corruption detection, and replay logic in isolation are unit-tested
//! inside `crates/durability`.

#[path = "../common/mod.rs"]
mod common;

mod crash_recovery;
mod snapshot_lifecycle;
mod wal_lifecycle;
