//! Batch container for the write path.
//!
//! A [`Batch`] is a fixed-capacity set of messages assembled by the caller
//! and committed as a unit. The message array is allocated once at
//! `batch()` time; `add_*` never reallocates, and a full batch reports
//! `BatchFull`. Fixed-width fields are validated and padded at add time so
//! the commit path serializes them without further checks.

use nendb_core::{EngineConfig, Error, Result};
use nendb_durability::WalOp;
use std::time::{Duration, Instant};

/// One queued mutation inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchMessage {
    CreateNode {
        id: u64,
        kind: u8,
        /// Padded to `node_prop_size` bytes.
        props: Vec<u8>,
    },
    CreateEdge {
        from: u64,
        to: u64,
        label: u16,
        /// Padded to `edge_prop_size` bytes.
        props: Vec<u8>,
    },
    SetEmbedding {
        node_id: u64,
        /// Exactly `embedding_dim` lanes.
        vector: Vec<f32>,
    },
    DeleteNode {
        id: u64,
    },
    DeleteEdge {
        from: u64,
        to: u64,
        label: u16,
    },
    UpdateNode {
        id: u64,
        kind: u8,
        /// Padded to `node_prop_size` bytes.
        props: Vec<u8>,
    },
}

impl BatchMessage {
    /// Convert into the WAL operation it commits as.
    pub(crate) fn into_wal_op(self) -> WalOp {
        match self {
            BatchMessage::CreateNode { id, kind, props } => WalOp::CreateNode { id, kind, props },
            BatchMessage::CreateEdge {
                from,
                to,
                label,
                props,
            } => WalOp::CreateEdge {
                from,
                to,
                label,
                props,
            },
            BatchMessage::SetEmbedding { node_id, vector } => {
                WalOp::CreateEmbedding { node_id, vector }
            }
            BatchMessage::DeleteNode { id } => WalOp::DeleteNode { id },
            BatchMessage::DeleteEdge { from, to, label } => WalOp::DeleteEdge { from, to, label },
            BatchMessage::UpdateNode { id, kind, props } => WalOp::UpdateNode { id, kind, props },
        }
    }
}

/// A caller-assembled unit of work, committed atomically by
/// [`crate::Engine::execute`].
pub struct Batch {
    messages: Vec<BatchMessage>,
    max_size: u32,
    node_prop_size: usize,
    edge_prop_size: usize,
    embedding_dim: usize,
    created_at: Instant,
}

impl Batch {
    /// Create an empty batch sized per the engine configuration.
    pub(crate) fn new(config: &EngineConfig) -> Self {
        Batch {
            messages: Vec::with_capacity(config.batch_max_size as usize),
            max_size: config.batch_max_size,
            node_prop_size: config.node_prop_size as usize,
            edge_prop_size: config.edge_prop_size as usize,
            embedding_dim: config.embedding_dim as usize,
            created_at: Instant::now(),
        }
    }

    fn check_capacity(&self) -> Result<()> {
        if self.messages.len() as u32 >= self.max_size {
            return Err(Error::BatchFull {
                capacity: self.max_size,
            });
        }
        Ok(())
    }

    fn pad(props: &[u8], size: usize) -> Result<Vec<u8>> {
        if props.len() > size {
            return Err(Error::PropertyOverflow {
                got: props.len(),
                max: size,
            });
        }
        let mut padded = vec![0u8; size];
        padded[..props.len()].copy_from_slice(props);
        Ok(padded)
    }

    /// Queue a node create.
    pub fn add_create_node(&mut self, id: u64, kind: u8, props: &[u8]) -> Result<()> {
        self.check_capacity()?;
        let props = Self::pad(props, self.node_prop_size)?;
        self.messages.push(BatchMessage::CreateNode { id, kind, props });
        Ok(())
    }

    /// Queue an edge create.
    pub fn add_create_edge(&mut self, from: u64, to: u64, label: u16, props: &[u8]) -> Result<()> {
        self.check_capacity()?;
        let props = Self::pad(props, self.edge_prop_size)?;
        self.messages.push(BatchMessage::CreateEdge {
            from,
            to,
            label,
            props,
        });
        Ok(())
    }

    /// Queue an embedding set (insert or overwrite).
    pub fn add_set_embedding(&mut self, node_id: u64, vector: &[f32]) -> Result<()> {
        self.check_capacity()?;
        if vector.len() != self.embedding_dim {
            return Err(Error::DimensionMismatch {
                expected: self.embedding_dim,
                got: vector.len(),
            });
        }
        self.messages.push(BatchMessage::SetEmbedding {
            node_id,
            vector: vector.to_vec(),
        });
        Ok(())
    }

    /// Queue a node delete (cascades to its edges and embedding at apply).
    pub fn add_delete_node(&mut self, id: u64) -> Result<()> {
        self.check_capacity()?;
        self.messages.push(BatchMessage::DeleteNode { id });
        Ok(())
    }

    /// Queue an edge delete; tombstones every active `(from, to, label)`
    /// match.
    pub fn add_delete_edge(&mut self, from: u64, to: u64, label: u16) -> Result<()> {
        self.check_capacity()?;
        self.messages.push(BatchMessage::DeleteEdge { from, to, label });
        Ok(())
    }

    /// Queue a node update (overwrites kind and properties).
    pub fn add_update_node(&mut self, id: u64, kind: u8, props: &[u8]) -> Result<()> {
        self.check_capacity()?;
        let props = Self::pad(props, self.node_prop_size)?;
        self.messages.push(BatchMessage::UpdateNode { id, kind, props });
        Ok(())
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the batch holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Time since the batch was created (or last cleared).
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Drop all queued messages, keeping the allocation, and restart the
    /// age clock.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.created_at = Instant::now();
    }

    /// Whether auto-commit should fire: the message count reached
    /// `auto_commit_threshold`, or the batch is non-empty and older than
    /// `batch_timeout_ms`. Zero disables either trigger.
    pub fn is_due(&self, config: &EngineConfig) -> bool {
        if self.messages.is_empty() {
            return false;
        }
        if config.auto_commit_threshold > 0
            && self.messages.len() as u32 >= config.auto_commit_threshold
        {
            return true;
        }
        config.batch_timeout_ms > 0
            && self.age() >= Duration::from_millis(config.batch_timeout_ms as u64)
    }

    pub(crate) fn messages(&self) -> &[BatchMessage] {
        &self.messages
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, BatchMessage> {
        self.messages.drain(..)
    }
}

/// Outcome of [`crate::Engine::execute`]: all-or-nothing.
#[derive(Debug)]
pub struct BatchResult {
    /// Whether the batch committed.
    pub success: bool,
    /// Messages applied (zero on rejection).
    pub processed: u32,
    /// First validation or durability error, on rejection.
    pub first_error: Option<Error>,
}

impl BatchResult {
    pub(crate) fn committed(processed: u32) -> Self {
        BatchResult {
            success: true,
            processed,
            first_error: None,
        }
    }

    pub(crate) fn rejected(err: Error) -> Self {
        BatchResult {
            success: false,
            processed: 0,
            first_error: Some(err),
        }
    }
}
