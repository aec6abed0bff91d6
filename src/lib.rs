//! # NenDB
//!
//! An embedded graph database engine with statically sized memory pools
//! and crash-safe, write-ahead-logged persistence.
//!
//! Nodes, edges, and fixed-dimension embeddings live in struct-of-arrays
//! pools whose capacities are fixed at open time. Writes go through
//! batches that commit atomically: the whole batch is appended to the WAL
//! (CRC-protected, sealed by a batch marker), fsynced per policy, and only
//! then applied to memory. A crash at any point recovers to either the
//! pre-batch or the post-batch state, never a hybrid.
//!
//! # Quick Start
//!
//! ```no_run
//! use nendb::{Engine, EngineConfig};
//!
//! fn main() -> nendb::Result<()> {
//!     let config = EngineConfig::new("./my-graph")
//!         .with_capacities(1024, 4096, 128)
//!         .with_embedding_dim(4);
//!     let engine = Engine::open(config)?;
//!
//!     let mut batch = engine.batch();
//!     batch.add_create_node(1, b'A', b"alice")?;
//!     batch.add_create_node(2, b'B', b"bob")?;
//!     batch.add_create_edge(1, 2, 10, b"knows")?;
//!     let result = engine.execute(&mut batch);
//!     assert!(result.success);
//!
//!     let node = engine.lookup_node(1).unwrap();
//!     assert_eq!(node.kind, b'A');
//!     for edge in engine.scan_edges_from(1) {
//!         println!("{} -[{}]-> {}", edge.from, edge.label, edge.to);
//!     }
//!
//!     engine.snapshot()?;
//!     engine.close()
//! }
//! ```
//!
//! # Architecture
//!
//! | Crate | Responsibility |
//! |-------|----------------|
//! | `nendb-core` | Errors, configuration, record types |
//! | `nendb-storage` | Struct-of-arrays pools and the id index |
//! | `nendb-durability` | WAL, snapshot images, recovery |
//! | `nendb-engine` | Batch commit protocol and the API surface |
//!
//! Only the surface re-exported here is considered stable. One writer at
//! a time is enforced per process by an internal mutex and across
//! processes by the `nendb.lock` file in the data directory.

pub use nendb_core::{
    Edge, Embedding, EngineConfig, Error, Lsn, Node, NodeId, PoolStats, Result, SlotIndex,
    WalSyncPolicy,
};
pub use nendb_durability::wal::WalHealth;
pub use nendb_durability::SnapshotInfo;
pub use nendb_engine::{Batch, BatchResult, Engine, EngineStats};
