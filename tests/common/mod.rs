//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's
//! main.rs.

#![allow(dead_code)]

use nendb::{Engine, EngineConfig};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Engine wrapper owning its data directory, with reopen support for
/// crash/recovery tests.
pub struct TestEngine {
    engine: Option<Engine>,
    pub dir: TempDir,
    configure: fn(&mut EngineConfig),
}

impl TestEngine {
    /// Scenario-default engine: capacities (1024, 4096, 128), dim 4,
    /// immediate WAL sync.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Engine with scenario defaults plus a config override.
    pub fn with_config(configure: fn(&mut EngineConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let config = Self::build_config(dir.path(), configure);
        let engine = Engine::open(config).unwrap();
        TestEngine {
            engine: Some(engine),
            dir,
            configure,
        }
    }

    fn build_config(dir: &Path, configure: fn(&mut EngineConfig)) -> EngineConfig {
        let mut config = EngineConfig::new(dir)
            .with_capacities(1024, 4096, 128)
            .with_embedding_dim(4);
        config.node_prop_size = 16;
        config.edge_prop_size = 8;
        configure(&mut config);
        config
    }

    /// The open engine.
    pub fn engine(&self) -> &Engine {
        self.engine.as_ref().expect("engine is open")
    }

    /// Clean shutdown followed by a fresh open.
    pub fn reopen(&mut self) {
        self.engine.take().expect("engine is open").close().unwrap();
        self.open_again();
    }

    /// Drop the engine without closing (simulated crash), then open again.
    pub fn crash_and_reopen(&mut self) {
        drop(self.engine.take());
        self.open_again();
    }

    /// Drop the engine without closing and leave the directory untouched,
    /// for tests that damage files before reopening.
    pub fn crash(&mut self) {
        drop(self.engine.take());
    }

    /// Open the engine on the existing directory.
    pub fn open_again(&mut self) {
        let config = Self::build_config(self.dir.path(), self.configure);
        self.engine = Some(Engine::open(config).unwrap());
    }

    /// Like `open_again` but surfacing the error.
    pub fn try_open_again(&mut self) -> nendb::Result<()> {
        let config = Self::build_config(self.dir.path(), self.configure);
        self.engine = Some(Engine::open(config)?);
        Ok(())
    }

    /// Data directory path.
    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Paths of all WAL segments, ascending by number.
    pub fn wal_segments(&self) -> Vec<PathBuf> {
        let mut segments: Vec<PathBuf> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("wal."))
                    .unwrap_or(false)
            })
            .collect();
        segments.sort();
        segments
    }

    /// Path of the current snapshot image.
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.path().join("snapshot")
    }

    /// Path of the previous snapshot image.
    pub fn snapshot_bak_path(&self) -> PathBuf {
        self.dir.path().join("snapshot.bak")
    }
}

/// Commit one batch of node creates, panicking on rejection.
pub fn commit_nodes(engine: &Engine, nodes: &[(u64, u8)]) {
    let mut batch = engine.batch();
    for &(id, kind) in nodes {
        batch.add_create_node(id, kind, b"").unwrap();
    }
    let result = engine.execute(&mut batch);
    assert!(result.success, "commit failed: {:?}", result.first_error);
}

/// Size of a file in bytes.
pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

/// Cut a file down to `len` bytes.
pub fn truncate_file(path: &Path, len: u64) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(len).unwrap();
}

/// Overwrite bytes at an offset.
pub fn corrupt_file_at_offset(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}
