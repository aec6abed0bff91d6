//! Shared foundation for the NenDB engine.
//!
//! This crate defines the vocabulary used by every other layer:
//!
//! - [`Error`] / [`Result`] — the unified error type for all engine
//!   operations.
//! - [`EngineConfig`] — capacities, fixed sizes, durability knobs, and the
//!   `nendb.toml` file layer.
//! - Record types ([`Node`], [`Edge`], [`Embedding`]) handed to callers by
//!   value, plus [`PoolStats`].
//!
//! Nothing in this crate touches the filesystem except the config file
//! helpers; storage and durability build on top of it.

pub mod config;
pub mod error;
pub mod types;

pub use config::{EngineConfig, WalSyncPolicy, CONFIG_FILE_NAME};
pub use error::{Error, Result};
pub use types::{Edge, Embedding, Lsn, Node, NodeId, PoolStats, SlotIndex};
