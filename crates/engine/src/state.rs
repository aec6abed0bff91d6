//! Committed engine state and the single record-apply path.
//!
//! [`EngineState`] bundles the three pools and the id index. Every
//! mutation, whether from a live commit or from recovery replay, flows
//! through [`EngineState::apply_record`]; there is no second write path.
//! Application is guarded by the record's LSN, which makes replaying an
//! already-applied record a no-op.

use nendb_core::{EngineConfig, Error, Result};
use nendb_durability::snapshot::{section_tags, SnapshotConfig, SnapshotImage, SnapshotSection};
use nendb_durability::{WalOp, WalRecord};
use nendb_storage::{EdgePool, EmbeddingPool, IdIndex, NodePool};

/// Pools, id index, and the LSN they are current to.
pub struct EngineState {
    pub nodes: NodePool,
    pub edges: EdgePool,
    pub embeddings: EmbeddingPool,
    pub index: IdIndex,
    /// LSN of the last applied record; records at or below it are skipped.
    pub applied_lsn: u64,
}

impl EngineState {
    /// Empty state with the configured capacities.
    pub fn new(config: &EngineConfig) -> Self {
        EngineState {
            nodes: NodePool::new(config.node_capacity, config.node_prop_size),
            edges: EdgePool::new(config.edge_capacity, config.edge_prop_size),
            embeddings: EmbeddingPool::new(config.embedding_capacity, config.embedding_dim),
            index: IdIndex::with_capacity(config.node_capacity),
            applied_lsn: 0,
        }
    }

    /// Rebuild state from a snapshot image.
    ///
    /// Fixed widths (embedding dim, property sizes) must match the running
    /// configuration exactly; capacities may grow (records must still
    /// fit). Reload is the compaction point: records land in a dense
    /// prefix of each pool.
    pub fn from_image(image: &SnapshotImage, config: &EngineConfig) -> Result<Self> {
        let c = &image.config;
        if c.embedding_dim != config.embedding_dim {
            return Err(Error::invalid_configuration(format!(
                "snapshot embedding_dim {} != configured {}",
                c.embedding_dim, config.embedding_dim
            )));
        }
        if c.node_prop_size != config.node_prop_size || c.edge_prop_size != config.edge_prop_size {
            return Err(Error::invalid_configuration(
                "snapshot property sizes differ from configuration",
            ));
        }

        let section = |tag: u8, name: &str| {
            image
                .section(tag)
                .ok_or_else(|| Error::snapshot_corruption(format!("missing {} section", name)))
        };

        let nodes = NodePool::decode_section(
            section(section_tags::NODES, "node")?,
            config.node_capacity,
            config.node_prop_size,
        )?;
        let edges = EdgePool::decode_section(
            section(section_tags::EDGES, "edge")?,
            config.edge_capacity,
            config.edge_prop_size,
        )?;
        let embeddings = EmbeddingPool::decode_section(
            section(section_tags::EMBEDDINGS, "embedding")?,
            config.embedding_capacity,
            config.embedding_dim,
        )?;
        let index = IdIndex::decode_section(
            section(section_tags::ID_INDEX, "id-index")?,
            config.node_capacity,
        )?;

        if index.len() != nodes.stats().live as usize {
            return Err(Error::snapshot_corruption(format!(
                "id-index has {} entries but node pool has {} live records",
                index.len(),
                nodes.stats().live
            )));
        }
        // Every index entry must point at an active slot whose stored id is
        // the key; a dump written against a different slot numbering fails
        // here instead of corrupting unrelated records later.
        for (id, slot) in index.snapshot_iter() {
            let matches =
                nodes.is_active(slot) && nodes.id_at(slot).map_or(false, |stored| stored == id);
            if !matches {
                return Err(Error::snapshot_corruption(format!(
                    "id-index entry {} -> {} does not match the node pool",
                    id, slot
                )));
            }
        }

        Ok(EngineState {
            nodes,
            edges,
            embeddings,
            index,
            applied_lsn: image.lsn,
        })
    }

    /// Dump the current state as a snapshot image at `applied_lsn`.
    pub fn to_image(&self, config: &EngineConfig) -> SnapshotImage {
        let mut node_section = Vec::new();
        self.nodes.encode_section(&mut node_section);
        let mut edge_section = Vec::new();
        self.edges.encode_section(&mut edge_section);
        let mut embedding_section = Vec::new();
        self.embeddings.encode_section(&mut embedding_section);

        // Pool sections compact active records into dense slots [0, live);
        // the index dump must use that same numbering, not the live slot
        // numbers, or reload would resolve ids to the wrong records.
        let mut dense_index = IdIndex::with_capacity(self.nodes.stats().live);
        for (dense, (_, node)) in self.nodes.iter_active().enumerate() {
            dense_index
                .insert(node.id, dense as u32)
                .expect("active node ids are unique");
        }
        let mut index_section = Vec::new();
        dense_index.encode_section(&mut index_section);

        SnapshotImage {
            lsn: self.applied_lsn,
            config: SnapshotConfig {
                node_capacity: config.node_capacity,
                edge_capacity: config.edge_capacity,
                embedding_capacity: config.embedding_capacity,
                embedding_dim: config.embedding_dim,
                node_prop_size: config.node_prop_size,
                edge_prop_size: config.edge_prop_size,
            },
            sections: vec![
                SnapshotSection::new(section_tags::NODES, node_section),
                SnapshotSection::new(section_tags::EDGES, edge_section),
                SnapshotSection::new(section_tags::EMBEDDINGS, embedding_section),
                SnapshotSection::new(section_tags::ID_INDEX, index_section),
            ],
        }
    }

    /// Apply one WAL record.
    ///
    /// Skips records with `lsn <= applied_lsn` (idempotence under replay).
    /// Validation has already run by the time a record reaches the WAL, so
    /// errors here mean the log does not fit the configuration (for
    /// example a capacity that shrank between runs).
    pub fn apply_record(&mut self, record: &WalRecord) -> Result<()> {
        if record.lsn <= self.applied_lsn {
            return Ok(());
        }

        match &record.op {
            WalOp::CreateNode { id, kind, props } => {
                if !self.index.contains(*id) {
                    let slot = self.nodes.alloc(*id, *kind, props)?;
                    self.index.insert(*id, slot)?;
                }
            }
            WalOp::UpdateNode { id, kind, props } => {
                if let Some(slot) = self.index.lookup(*id) {
                    self.nodes.update(slot, *kind, props)?;
                }
            }
            WalOp::CreateEdge {
                from,
                to,
                label,
                props,
            } => {
                self.edges.alloc(*from, *to, *label, props)?;
            }
            WalOp::CreateEmbedding { node_id, vector } => {
                match self.embeddings.find_by_node(*node_id) {
                    Some(slot) => self.embeddings.overwrite(slot, vector)?,
                    None => {
                        self.embeddings.alloc(*node_id, vector)?;
                    }
                }
            }
            WalOp::DeleteNode { id } => {
                if let Some(slot) = self.index.remove(*id) {
                    self.nodes.mark_deleted(slot)?;
                    // Dangling references are never visible: edges and the
                    // embedding of a deleted node go with it.
                    for edge_slot in self.edges.find_touching(*id) {
                        self.edges.mark_deleted(edge_slot)?;
                    }
                    if let Some(em_slot) = self.embeddings.find_by_node(*id) {
                        self.embeddings.mark_deleted(em_slot)?;
                    }
                }
            }
            WalOp::DeleteEdge { from, to, label } => {
                for slot in self.edges.find_matching(*from, *to, *label) {
                    self.edges.mark_deleted(slot)?;
                }
            }
            WalOp::BatchMarker { .. } => {}
        }

        self.applied_lsn = record.lsn;
        Ok(())
    }
}
