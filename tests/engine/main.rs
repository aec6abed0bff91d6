//! Integration tests for the engine surface.
//!
//! These cover lifecycle and batch behaviors that need a real data
//! directory (open → write → close → reopen). Validation and pool edge
//! cases in isolation are unit-tested inside the crates.

#[path = "../common/mod.rs"]
mod common;

mod batches;
mod invariants;
mod lifecycle;
