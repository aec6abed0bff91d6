//! The engine: lifecycle, commit protocol, snapshots, and reads.

use crate::batch::{Batch, BatchMessage, BatchResult};
use crate::lockfile::Lockfile;
use crate::state::EngineState;
use nendb_core::{Edge, Embedding, EngineConfig, Error, Node, PoolStats, Result};
use nendb_durability::recovery::RecoveryCoordinator;
use nendb_durability::wal::WalHealth;
use nendb_durability::{snapshot, RecordLayout, SnapshotInfo, WalOp, WalRecord, WalWriter};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Per-pool counters, WAL health, and commit statistics.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub nodes: PoolStats,
    pub edges: PoolStats,
    pub embeddings: PoolStats,
    pub wal: WalHealth,
    /// LSN the committed state is current to.
    pub applied_lsn: u64,
    /// LSN of the most recent snapshot (0 if none).
    pub last_snapshot_lsn: u64,
    pub batches_committed: u64,
    pub batches_rejected: u64,
    pub records_committed: u64,
}

/// Reusable validation scratch; cleared per batch so steady-state commits
/// do not allocate.
#[derive(Default)]
struct ValidateScratch {
    created: FxHashSet<u64>,
    deleted: FxHashSet<u64>,
    embedded: FxHashSet<u64>,
}

/// Writer-side state, serialized by the commit mutex.
struct CommitState {
    wal: WalWriter,
    next_lsn: u64,
    /// Encode buffer reused across batches.
    scratch: Vec<u8>,
    validate: ValidateScratch,
}

/// An open NenDB database.
///
/// `Engine` is `Send + Sync`: share it behind an `Arc` and call reads from
/// any thread. Writes are serialized internally by the commit mutex. There
/// is no process-wide registry; every `open` is an independent instance
/// and cross-process exclusion comes from the data-directory lockfile.
pub struct Engine {
    config: EngineConfig,
    layout: RecordLayout,
    state: RwLock<EngineState>,
    commit: Mutex<CommitState>,
    wal_health: Arc<parking_lot::RwLock<WalHealth>>,
    batches_committed: AtomicU64,
    batches_rejected: AtomicU64,
    records_committed: AtomicU64,
    last_snapshot_lsn: AtomicU64,
    _lockfile: Lockfile,
}

impl Engine {
    /// Open (or create) the database in `config.data_dir`.
    ///
    /// Runs the full recovery sequence: load `snapshot` (falling back to
    /// `snapshot.bak`), replay sealed WAL batches past the snapshot LSN
    /// with tail repair, then position the WAL writer for new appends.
    pub fn open(config: EngineConfig) -> Result<Engine> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;
        let lockfile = Lockfile::acquire(&config.data_dir)?;

        let layout = RecordLayout {
            node_prop_size: config.node_prop_size as usize,
            edge_prop_size: config.edge_prop_size as usize,
            embedding_dim: config.embedding_dim as usize,
        };

        let (mut state, snapshot_lsn, used_backup) = match snapshot::load(&config.data_dir) {
            Ok(Some((image, used_backup))) => {
                let lsn = image.lsn;
                (EngineState::from_image(&image, &config)?, lsn, used_backup)
            }
            Ok(None) => (EngineState::new(&config), 0, false),
            Err(e @ Error::SnapshotCorruption(_)) => {
                if config.start_empty_on_corruption {
                    warn!(error = %e, "all snapshot images invalid, starting empty by configuration");
                    (EngineState::new(&config), 0, false)
                } else {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        };

        let coordinator = RecoveryCoordinator::new(&config.data_dir, layout);
        let outcome = coordinator.replay(state.applied_lsn, |record| state.apply_record(record))?;
        state.applied_lsn = state.applied_lsn.max(outcome.applied_lsn);

        let wal = WalWriter::open(
            &config.data_dir,
            config.wal_sync_policy,
            config.wal_segment_max_bytes,
            state.applied_lsn + 1,
        )?;
        let wal_health = wal.health_handle();
        {
            let mut health = wal_health.write();
            health.repair_events = outcome.repair_events;
            if let Some((segment, offset)) = outcome.repaired_at {
                let err = Error::WalCorruption { segment, offset };
                warn!(%err, discarded = outcome.records_discarded, "recovered from WAL damage");
                health.last_error = Some(err.to_string());
            }
        }

        info!(
            data_dir = %config.data_dir.display(),
            applied_lsn = state.applied_lsn,
            snapshot_lsn,
            used_backup_snapshot = used_backup,
            records_replayed = outcome.records_applied,
            batches_replayed = outcome.batches_applied,
            tail_repairs = outcome.repair_events,
            "engine open"
        );

        let next_lsn = state.applied_lsn + 1;
        Ok(Engine {
            config,
            layout,
            state: RwLock::new(state),
            commit: Mutex::new(CommitState {
                wal,
                next_lsn,
                scratch: Vec::with_capacity(64 * 1024),
                validate: ValidateScratch::default(),
            }),
            wal_health,
            batches_committed: AtomicU64::new(0),
            batches_rejected: AtomicU64::new(0),
            records_committed: AtomicU64::new(0),
            last_snapshot_lsn: AtomicU64::new(snapshot_lsn),
            _lockfile: lockfile,
        })
    }

    /// The configuration this engine was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// New empty batch sized per this engine's configuration.
    pub fn batch(&self) -> Batch {
        Batch::new(&self.config)
    }

    /// Commit a batch atomically: validate everything, append the whole
    /// batch (sealed by its marker) to the WAL, then apply it to the pools
    /// and id index in one write-lock critical section.
    ///
    /// All-or-nothing: on any validation error the result carries
    /// `processed == 0`, the first error, and the batch is left intact for
    /// correction. On a WAL I/O error the WAL is marked unhealthy, no pool
    /// mutation has happened, and the engine must be reopened; the batch
    /// contents are consumed.
    pub fn execute(&self, batch: &mut Batch) -> BatchResult {
        if batch.is_empty() {
            return BatchResult::committed(0);
        }

        let mut commit_guard = self.commit.lock();
        let commit = &mut *commit_guard;

        {
            let state = self.state.read();
            if let Err(e) = validate_batch(&state, batch, &self.config, &mut commit.validate) {
                self.batches_rejected.fetch_add(1, Ordering::Relaxed);
                return BatchResult::rejected(e);
            }
        }

        let first_lsn = commit.next_lsn;
        let timestamp = commit.wal.timestamp();
        let count = batch.len() as u32;

        let mut records: Vec<WalRecord> = Vec::with_capacity(count as usize + 1);
        let mut lsn = first_lsn;
        for message in batch.drain() {
            records.push(WalRecord::new(lsn, timestamp, message.into_wal_op()));
            lsn += 1;
        }
        records.push(WalRecord::new(
            lsn,
            timestamp,
            WalOp::BatchMarker { batch_size: count },
        ));

        commit.scratch.clear();
        for record in &records {
            record.encode_into(&self.layout, &mut commit.scratch);
        }

        if let Err(e) = commit.wal.append_batch(&commit.scratch, first_lsn, count + 1) {
            self.batches_rejected.fetch_add(1, Ordering::Relaxed);
            return BatchResult::rejected(e);
        }
        commit.next_lsn = lsn + 1;

        {
            let mut state = self.state.write();
            for record in &records {
                // The batch was validated against this exact state under
                // the commit lock; failure here is a logic error.
                state
                    .apply_record(record)
                    .expect("validated batch must apply cleanly");
            }
        }

        self.batches_committed.fetch_add(1, Ordering::Relaxed);
        self.records_committed
            .fetch_add(count as u64, Ordering::Relaxed);
        BatchResult::committed(count)
    }

    /// Commit the batch if its auto-commit trigger fired
    /// (`auto_commit_threshold` reached, or older than
    /// `batch_timeout_ms`). Returns `None` when the batch is not due. The
    /// timeout never interrupts a commit already in progress.
    pub fn execute_if_due(&self, batch: &mut Batch) -> Option<BatchResult> {
        if batch.is_due(&self.config) {
            Some(self.execute(batch))
        } else {
            None
        }
    }

    /// Write a snapshot image and rotate the WAL behind it.
    ///
    /// Holds the commit mutex (no writer can interleave) but only a read
    /// lock on state, so readers proceed. After this returns, the data
    /// directory holds a durable image at the current LSN and a fresh WAL
    /// segment starting just past it; earlier segments are gone.
    pub fn snapshot(&self) -> Result<SnapshotInfo> {
        let mut commit = self.commit.lock();

        let image = {
            let state = self.state.read();
            state.to_image(&self.config)
        };

        let snapshot_info = snapshot::write(&self.config.data_dir, &image)?;
        commit.wal.rotate_after_snapshot(image.lsn)?;
        self.last_snapshot_lsn.store(image.lsn, Ordering::Release);

        info!(
            lsn = snapshot_info.lsn,
            bytes = snapshot_info.bytes,
            "snapshot complete"
        );
        Ok(snapshot_info)
    }

    /// Active node by external id.
    pub fn lookup_node(&self, id: u64) -> Option<Node> {
        let state = self.state.read();
        let slot = state.index.lookup(id)?;
        state
            .nodes
            .get(slot)
            .expect("id index points inside the node pool")
    }

    /// First active edge matching `(from, to, label)`.
    pub fn lookup_edge(&self, from: u64, to: u64, label: u16) -> Option<Edge> {
        let state = self.state.read();
        let result = state
            .edges
            .iter_from(from)
            .map(|(_, edge)| edge)
            .find(|edge| edge.to == to && edge.label == label);
        result
    }

    /// Active embedding owned by `node_id`.
    pub fn get_embedding(&self, node_id: u64) -> Option<Embedding> {
        let state = self.state.read();
        let slot = state.embeddings.find_by_node(node_id)?;
        state
            .embeddings
            .get(slot)
            .expect("find_by_node returned an in-range slot")
    }

    /// All active nodes, optionally restricted to one kind, in slot order.
    pub fn scan_nodes(&self, kind: Option<u8>) -> Vec<Node> {
        let state = self.state.read();
        state
            .nodes
            .iter_active()
            .map(|(_, node)| node)
            .filter(|node| kind.map_or(true, |k| node.kind == k))
            .collect()
    }

    /// All active edges leaving `node_id`, in slot order.
    pub fn scan_edges_from(&self, node_id: u64) -> Vec<Edge> {
        let state = self.state.read();
        state.edges.iter_from(node_id).map(|(_, e)| e).collect()
    }

    /// Point-in-time counters and health.
    pub fn stats(&self) -> EngineStats {
        let (nodes, edges, embeddings, applied_lsn) = {
            let state = self.state.read();
            (
                state.nodes.stats(),
                state.edges.stats(),
                state.embeddings.stats(),
                state.applied_lsn,
            )
        };
        EngineStats {
            nodes,
            edges,
            embeddings,
            wal: self.wal_health.read().clone(),
            applied_lsn,
            last_snapshot_lsn: self.last_snapshot_lsn.load(Ordering::Acquire),
            batches_committed: self.batches_committed.load(Ordering::Relaxed),
            batches_rejected: self.batches_rejected.load(Ordering::Relaxed),
            records_committed: self.records_committed.load(Ordering::Relaxed),
        }
    }

    /// Flush and close the WAL and release the lockfile.
    ///
    /// Returns `WalUnhealthy` if the WAL observed an I/O error during this
    /// run, so drivers can map an unclean close to a non-zero exit code.
    pub fn close(self) -> Result<()> {
        let healthy = self.wal_health.read().healthy;
        self.commit.into_inner().wal.close()?;
        if healthy {
            Ok(())
        } else {
            Err(Error::WalUnhealthy)
        }
    }
}

/// Check every message against committed state plus the batch's own
/// earlier effects. Nothing is mutated; any error rejects the whole batch.
fn validate_batch(
    state: &EngineState,
    batch: &Batch,
    config: &EngineConfig,
    scratch: &mut ValidateScratch,
) -> Result<()> {
    scratch.created.clear();
    scratch.deleted.clear();
    scratch.embedded.clear();

    let mut new_nodes = 0u32;
    let mut new_edges = 0u32;
    let mut new_embeddings = 0u32;

    for message in batch.messages() {
        match message {
            BatchMessage::CreateNode { id, .. } => {
                if resolves(state, scratch, *id) || scratch.created.contains(id) {
                    return Err(Error::DuplicateId(*id));
                }
                scratch.created.insert(*id);
                scratch.deleted.remove(id);
                new_nodes += 1;
            }
            BatchMessage::UpdateNode { id, .. } => {
                if !resolves(state, scratch, *id) && !scratch.created.contains(id) {
                    return Err(Error::UnknownNode(*id));
                }
            }
            BatchMessage::CreateEdge { from, to, label: _, .. } => {
                if from == to && !config.allow_self_loops {
                    return Err(Error::SelfLoopRejected(*from));
                }
                for endpoint in [from, to] {
                    if !resolves(state, scratch, *endpoint)
                        && !scratch.created.contains(endpoint)
                    {
                        return Err(Error::UnknownNode(*endpoint));
                    }
                }
                new_edges += 1;
            }
            BatchMessage::SetEmbedding { node_id, .. } => {
                if !resolves(state, scratch, *node_id) && !scratch.created.contains(node_id) {
                    return Err(Error::UnknownNode(*node_id));
                }
                // A node (re)created in this batch never has a reusable
                // slot: a delete-then-recreate cascades its old embedding
                // away before the set applies.
                let has_slot = !scratch.deleted.contains(node_id)
                    && !scratch.created.contains(node_id)
                    && state.embeddings.find_by_node(*node_id).is_some();
                if !has_slot && !scratch.embedded.contains(node_id) {
                    scratch.embedded.insert(*node_id);
                    new_embeddings += 1;
                }
            }
            BatchMessage::DeleteNode { id } => {
                // Deleting a missing node is a legal no-op; it still
                // produces a WAL record.
                scratch.deleted.insert(*id);
                scratch.created.remove(id);
            }
            BatchMessage::DeleteEdge { .. } => {}
        }
    }

    if state.nodes.stats().cursor + new_nodes > config.node_capacity {
        return Err(Error::pool_exhausted("nodes", config.node_capacity));
    }
    if state.edges.stats().cursor + new_edges > config.edge_capacity {
        return Err(Error::pool_exhausted("edges", config.edge_capacity));
    }
    if state.embeddings.stats().cursor + new_embeddings > config.embedding_capacity {
        return Err(Error::pool_exhausted(
            "embeddings",
            config.embedding_capacity,
        ));
    }
    Ok(())
}

/// Whether `id` names an active node once the batch's earlier messages
/// have taken effect.
fn resolves(state: &EngineState, scratch: &ValidateScratch, id: u64) -> bool {
    if scratch.deleted.contains(&id) {
        return false;
    }
    if scratch.created.contains(&id) {
        return true;
    }
    state.index.lookup(id).is_some()
}
