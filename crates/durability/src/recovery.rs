//! WAL replay with batch sealing and tail repair.
//!
//! Replay walks segments in ascending order and buffers records until
//! their sealing `BatchMarker` arrives. Only sealed batches are applied:
//! a batch whose marker never reached disk was not committed, so its
//! records are discarded and the segment is truncated back to the last
//! sealed boundary. The same happens at the first length/CRC failure, and
//! no later segment is read after a repair.
//!
//! Replay is deterministic (records are applied in LSN order) and
//! idempotent (records at or below the watermark are skipped).

use crate::format::segment::{list_segments, WalSegment, SEGMENT_HEADER_SIZE};
use crate::format::wal_record::{RecordLayout, WalOp, WalRecord};
use crate::wal::{ReadStop, WalReader};
use nendb_core::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Statistics and final positions produced by one replay pass.
#[derive(Debug, Clone, Default)]
pub struct RecoveryOutcome {
    /// Highest LSN applied (or the watermark, if nothing was).
    pub applied_lsn: u64,
    /// Operations applied through the callback (markers excluded).
    pub records_applied: u64,
    /// Sealed batches above the watermark.
    pub batches_applied: u64,
    /// Records discarded because their batch was never sealed.
    pub records_discarded: u64,
    /// Tail repairs performed (0 or 1; reading stops at the first).
    pub repair_events: u32,
    /// Segment number and byte offset of the repair, if one happened.
    pub repaired_at: Option<(u64, u64)>,
}

/// Drives WAL replay against an apply callback supplied by the engine.
pub struct RecoveryCoordinator {
    data_dir: PathBuf,
    layout: RecordLayout,
}

impl RecoveryCoordinator {
    /// Create a coordinator for the given data directory and record
    /// layout.
    pub fn new(data_dir: impl Into<PathBuf>, layout: RecordLayout) -> Self {
        RecoveryCoordinator {
            data_dir: data_dir.into(),
            layout,
        }
    }

    /// Data directory being recovered.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Replay every sealed record with `LSN > watermark` through
    /// `apply`, in LSN order. Markers are passed through as well so the
    /// engine can advance its applied LSN on batch boundaries.
    ///
    /// On the first invalid record or unsealed batch, the segment is
    /// truncated at the last sealed boundary and no further segment is
    /// read.
    pub fn replay<F>(&self, watermark: u64, mut apply: F) -> Result<RecoveryOutcome>
    where
        F: FnMut(&WalRecord) -> Result<()>,
    {
        let reader = WalReader::new(self.layout);
        let mut outcome = RecoveryOutcome {
            applied_lsn: watermark,
            ..RecoveryOutcome::default()
        };

        let segments = list_segments(&self.data_dir)?;
        for (position, &number) in segments.iter().enumerate() {
            let scan = reader.read_segment(&self.data_dir, number)?;

            let mut pending: Vec<&WalRecord> = Vec::new();
            let mut sealed_end = SEGMENT_HEADER_SIZE as u64;

            for (record, end) in &scan.records {
                pending.push(record);
                if let WalOp::BatchMarker { .. } = record.op {
                    let marker_lsn = record.lsn;
                    for sealed in pending.drain(..) {
                        if sealed.lsn > outcome.applied_lsn {
                            apply(sealed)?;
                            if !matches!(sealed.op, WalOp::BatchMarker { .. }) {
                                outcome.records_applied += 1;
                            }
                        }
                    }
                    if marker_lsn > watermark {
                        outcome.batches_applied += 1;
                    }
                    outcome.applied_lsn = outcome.applied_lsn.max(marker_lsn);
                    sealed_end = *end;
                }
            }

            let unsealed = pending.len() as u64;
            let needs_repair = unsealed > 0 || scan.has_invalid_tail();
            if !needs_repair {
                continue;
            }

            outcome.records_discarded += unsealed;
            outcome.repair_events += 1;
            let bad_offset = match scan.stop {
                ReadStop::PartialRecord { offset } | ReadStop::Corrupt { offset } => offset,
                ReadStop::EndOfData => sealed_end,
            };
            outcome.repaired_at = Some((number, bad_offset));

            if sealed_end < scan.file_size {
                let mut segment = WalSegment::open_append(&self.data_dir, number)?;
                segment.truncate(sealed_end)?;
                segment.close()?;
            }

            warn!(
                target: "nendb::recovery",
                segment = number,
                sealed_end,
                discarded = unsealed,
                stop = ?scan.stop,
                "repaired WAL tail"
            );

            // The log is not trusted past a repair: later segments hold
            // records that were never applied and must not resurface on
            // the next recovery.
            for &later in &segments[position + 1..] {
                std::fs::remove_file(WalSegment::segment_path(&self.data_dir, later))?;
                warn!(
                    target: "nendb::recovery",
                    segment = later,
                    "removed WAL segment past the repair point"
                );
            }
            break;
        }

        info!(
            target: "nendb::recovery",
            applied_lsn = outcome.applied_lsn,
            records = outcome.records_applied,
            batches = outcome.batches_applied,
            discarded = outcome.records_discarded,
            "WAL replay complete"
        );
        Ok(outcome)
    }
}
