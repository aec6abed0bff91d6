//! Engine configuration and the `nendb.toml` file layer.
//!
//! The engine is always opened with an explicit [`EngineConfig`] value.
//! For drivers that prefer a config file in the data directory, the same
//! struct round-trips through `nendb.toml`; edit the file and restart to
//! change settings.
//!
//! Capacities, the embedding dimension, and property sizes are fixed at
//! open time and never change at runtime. They are also stamped into every
//! snapshot image, so a reopened database is checked for compatibility.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file name placed in the database data directory.
pub const CONFIG_FILE_NAME: &str = "nendb.toml";

/// Default node property blob size in bytes.
pub const DEFAULT_NODE_PROP_SIZE: u32 = 128;
/// Default edge property blob size in bytes.
pub const DEFAULT_EDGE_PROP_SIZE: u32 = 64;
/// Default embedding vector dimension.
pub const DEFAULT_EMBEDDING_DIM: u32 = 256;
/// Default maximum number of messages per batch.
pub const DEFAULT_BATCH_MAX_SIZE: u32 = 8192;
/// Default maximum WAL segment size before rotation.
pub const DEFAULT_WAL_SEGMENT_MAX_BYTES: u64 = 64 * 1024 * 1024;

/// When the WAL writer fsyncs appended batches.
///
/// `Immediate` is the default: every committed batch is durable before
/// `execute` returns. The other two policies trade durability of the last
/// few batches for throughput.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalSyncPolicy {
    /// fsync after every batch append.
    Immediate,
    /// fsync once at least this many records have been appended since the
    /// last sync.
    EveryNRecords(u32),
    /// fsync when at least this many milliseconds have elapsed since the
    /// last sync.
    PeriodicMs(u32),
}

impl Default for WalSyncPolicy {
    fn default() -> Self {
        WalSyncPolicy::Immediate
    }
}

/// Configuration for a NenDB engine instance.
///
/// # Example
///
/// ```
/// use nendb_core::EngineConfig;
///
/// let config = EngineConfig::new("/tmp/nendb-data")
///     .with_capacities(1024, 4096, 128)
///     .with_embedding_dim(4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Data directory holding the lockfile, snapshot images, and WAL
    /// segments. Not persisted in `nendb.toml` (the file lives inside it).
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Maximum number of node slots.
    #[serde(default = "default_node_capacity")]
    pub node_capacity: u32,

    /// Maximum number of edge slots.
    #[serde(default = "default_edge_capacity")]
    pub edge_capacity: u32,

    /// Maximum number of embedding slots.
    #[serde(default = "default_embedding_capacity")]
    pub embedding_capacity: u32,

    /// Embedding vector dimension (f32 lanes per vector).
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: u32,

    /// Fixed node property blob size in bytes.
    #[serde(default = "default_node_prop_size")]
    pub node_prop_size: u32,

    /// Fixed edge property blob size in bytes.
    #[serde(default = "default_edge_prop_size")]
    pub edge_prop_size: u32,

    /// WAL fsync policy.
    #[serde(default)]
    pub wal_sync_policy: WalSyncPolicy,

    /// Maximum WAL segment size before rotation.
    #[serde(default = "default_wal_segment_max_bytes")]
    pub wal_segment_max_bytes: u64,

    /// Maximum number of messages per batch.
    #[serde(default = "default_batch_max_size")]
    pub batch_max_size: u32,

    /// Age in milliseconds after which a non-empty batch is considered due
    /// for auto-commit. Zero disables the timeout.
    #[serde(default)]
    pub batch_timeout_ms: u32,

    /// Message count at which a batch is considered due for auto-commit.
    /// Zero disables the threshold.
    #[serde(default)]
    pub auto_commit_threshold: u32,

    /// Whether edges with `from == to` are accepted.
    #[serde(default = "default_true")]
    pub allow_self_loops: bool,

    /// Whether the engine may start empty when both `snapshot` and
    /// `snapshot.bak` fail validation. When false (the default) such a
    /// database refuses to open.
    #[serde(default)]
    pub start_empty_on_corruption: bool,
}

fn default_node_capacity() -> u32 {
    65_536
}
fn default_edge_capacity() -> u32 {
    262_144
}
fn default_embedding_capacity() -> u32 {
    65_536
}
fn default_embedding_dim() -> u32 {
    DEFAULT_EMBEDDING_DIM
}
fn default_node_prop_size() -> u32 {
    DEFAULT_NODE_PROP_SIZE
}
fn default_edge_prop_size() -> u32 {
    DEFAULT_EDGE_PROP_SIZE
}
fn default_wal_segment_max_bytes() -> u64 {
    DEFAULT_WAL_SEGMENT_MAX_BYTES
}
fn default_batch_max_size() -> u32 {
    DEFAULT_BATCH_MAX_SIZE
}
fn default_true() -> bool {
    true
}

impl EngineConfig {
    /// Create a configuration with default limits for the given data
    /// directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        EngineConfig {
            data_dir: data_dir.into(),
            node_capacity: default_node_capacity(),
            edge_capacity: default_edge_capacity(),
            embedding_capacity: default_embedding_capacity(),
            embedding_dim: default_embedding_dim(),
            node_prop_size: default_node_prop_size(),
            edge_prop_size: default_edge_prop_size(),
            wal_sync_policy: WalSyncPolicy::default(),
            wal_segment_max_bytes: default_wal_segment_max_bytes(),
            batch_max_size: default_batch_max_size(),
            batch_timeout_ms: 0,
            auto_commit_threshold: 0,
            allow_self_loops: true,
            start_empty_on_corruption: false,
        }
    }

    /// Set node, edge, and embedding capacities.
    pub fn with_capacities(mut self, nodes: u32, edges: u32, embeddings: u32) -> Self {
        self.node_capacity = nodes;
        self.edge_capacity = edges;
        self.embedding_capacity = embeddings;
        self
    }

    /// Set the embedding vector dimension.
    pub fn with_embedding_dim(mut self, dim: u32) -> Self {
        self.embedding_dim = dim;
        self
    }

    /// Set the WAL sync policy.
    pub fn with_sync_policy(mut self, policy: WalSyncPolicy) -> Self {
        self.wal_sync_policy = policy;
        self
    }

    /// Set the maximum batch size.
    pub fn with_batch_max_size(mut self, max: u32) -> Self {
        self.batch_max_size = max;
        self
    }

    /// Check that every limit is in its allowed range.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.node_capacity == 0 {
            return Err(Error::invalid_configuration("node_capacity must be > 0"));
        }
        if self.edge_capacity == 0 {
            return Err(Error::invalid_configuration("edge_capacity must be > 0"));
        }
        if self.embedding_capacity == 0 {
            return Err(Error::invalid_configuration(
                "embedding_capacity must be > 0",
            ));
        }
        if self.embedding_dim == 0 {
            return Err(Error::invalid_configuration("embedding_dim must be > 0"));
        }
        if self.node_prop_size == 0 {
            return Err(Error::invalid_configuration("node_prop_size must be > 0"));
        }
        if self.edge_prop_size == 0 {
            return Err(Error::invalid_configuration("edge_prop_size must be > 0"));
        }
        if self.batch_max_size == 0 {
            return Err(Error::invalid_configuration("batch_max_size must be > 0"));
        }
        if self.wal_segment_max_bytes == 0 {
            return Err(Error::invalid_configuration(
                "wal_segment_max_bytes must be > 0",
            ));
        }
        match self.wal_sync_policy {
            WalSyncPolicy::EveryNRecords(0) => {
                return Err(Error::invalid_configuration(
                    "wal_sync_policy every_n_records must be > 0",
                ));
            }
            WalSyncPolicy::PeriodicMs(0) => {
                return Err(Error::invalid_configuration(
                    "wal_sync_policy periodic_ms must be > 0",
                ));
            }
            _ => {}
        }
        Ok(())
    }

    /// Read and parse a config file. The parent directory of the file
    /// becomes `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the file cannot be read or parsed,
    /// or if the parsed values fail [`EngineConfig::validate`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_configuration(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let mut config: EngineConfig = toml::from_str(&content).map_err(|e| {
            Error::invalid_configuration(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.data_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.validate()?;
        Ok(config)
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            Error::invalid_configuration(format!("failed to serialize config: {}", e))
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Write this config to `nendb.toml` in the data directory unless the
    /// file already exists.
    pub fn write_default_if_missing(&self) -> Result<()> {
        let path = self.data_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            self.write_to_file(&path)?;
        }
        Ok(())
    }
}
