//! WAL append path.
//!
//! The writer owns the active segment. A committing batch arrives as one
//! pre-encoded buffer and goes to disk with a single positional write,
//! followed by an fsync when the configured policy calls for one. Any I/O
//! error on this path marks the WAL unhealthy; the engine refuses further
//! writes until restarted.

use crate::format::segment::{list_segments, WalSegment, SEGMENT_HEADER_SIZE};
use crate::wal::WalHealth;
use nendb_core::config::WalSyncPolicy;
use nendb_core::{Error, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Append-side WAL handle.
pub struct WalWriter {
    dir: PathBuf,
    segment: WalSegment,
    segment_number: u64,
    policy: WalSyncPolicy,
    segment_max_bytes: u64,
    records_since_sync: u32,
    last_sync: Instant,
    /// Timestamp origin; record timestamps are microseconds since this
    /// writer was opened (monotonic per process start, opaque on disk).
    epoch: Instant,
    health: Arc<RwLock<WalHealth>>,
}

impl WalWriter {
    /// Open the WAL in `dir`, resuming the newest segment or creating the
    /// first one. `next_lsn` seeds the header of a freshly created segment.
    pub fn open(
        dir: &Path,
        policy: WalSyncPolicy,
        segment_max_bytes: u64,
        next_lsn: u64,
    ) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let segments = list_segments(dir)?;
        let (segment, segment_number) = match segments.last() {
            Some(&num) => match WalSegment::open_append(dir, num) {
                Ok(seg) => (seg, num),
                Err(e) => {
                    // Unreadable active segment: leave it for inspection
                    // and start the next one.
                    warn!(segment = num, error = %e, "could not resume WAL segment, creating next");
                    let next = num + 1;
                    (WalSegment::create(dir, next, next_lsn)?, next)
                }
            },
            None => (WalSegment::create(dir, 1, next_lsn)?, 1),
        };

        let mut health = WalHealth::default();
        health.end_position = segment.size();
        health.segment_bytes = segment.size();

        Ok(WalWriter {
            dir: dir.to_path_buf(),
            segment,
            segment_number,
            policy,
            segment_max_bytes,
            records_since_sync: 0,
            last_sync: Instant::now(),
            epoch: Instant::now(),
            health: Arc::new(RwLock::new(health)),
        })
    }

    /// Opaque monotonic timestamp for new records.
    pub fn timestamp(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Shared handle to the health struct (engine stats read it without
    /// taking the commit lock).
    pub fn health_handle(&self) -> Arc<RwLock<WalHealth>> {
        Arc::clone(&self.health)
    }

    /// Point-in-time copy of the health struct.
    pub fn health(&self) -> WalHealth {
        self.health.read().clone()
    }

    /// Active segment number.
    pub fn segment_number(&self) -> u64 {
        self.segment_number
    }

    /// Append one encoded batch with a single write, then apply the sync
    /// policy.
    ///
    /// # Errors
    ///
    /// - `WalUnhealthy` if a previous append failed.
    /// - `WalIo` on any I/O failure; the WAL is marked unhealthy and the
    ///   caller must reject its batch (no pool mutation has happened yet).
    pub fn append_batch(
        &mut self,
        encoded: &[u8],
        first_lsn: u64,
        record_count: u32,
    ) -> Result<()> {
        if !self.health.read().healthy {
            return Err(Error::WalUnhealthy);
        }

        // Rotate first so a batch never spans segments; replay relies on
        // markers and their records living in the same file.
        if self.segment.size() > SEGMENT_HEADER_SIZE as u64
            && self.segment.size() + encoded.len() as u64 > self.segment_max_bytes
        {
            if let Err(e) = self.rotate(first_lsn) {
                return Err(self.fail("segment rotation", e));
            }
        }

        if let Err(e) = self.segment.write(encoded) {
            return Err(self.fail("batch append", e));
        }

        self.records_since_sync += record_count;
        if let Err(e) = self.maybe_sync() {
            return Err(self.fail("fsync", e));
        }

        let mut health = self.health.write();
        health.end_position = self.segment.size();
        health.segment_bytes = self.segment.size();
        Ok(())
    }

    fn maybe_sync(&mut self) -> std::io::Result<()> {
        let due = match self.policy {
            WalSyncPolicy::Immediate => true,
            WalSyncPolicy::EveryNRecords(n) => self.records_since_sync >= n,
            WalSyncPolicy::PeriodicMs(ms) => self.last_sync.elapsed().as_millis() as u64 >= ms as u64,
        };
        if due {
            self.segment.sync()?;
            self.records_since_sync = 0;
            self.last_sync = Instant::now();
        }
        Ok(())
    }

    fn fail(&self, context: &str, e: std::io::Error) -> Error {
        let mut health = self.health.write();
        health.healthy = false;
        health.io_error_count += 1;
        health.last_error = Some(format!("{}: {}", context, e));
        warn!(context, error = %e, "WAL marked unhealthy");
        Error::wal_io(&e)
    }

    /// Close the current segment and start the next one, numbered one
    /// higher, with `start_lsn` in its header.
    fn rotate(&mut self, start_lsn: u64) -> std::io::Result<()> {
        self.segment.close()?;
        self.segment_number += 1;
        self.segment = WalSegment::create(&self.dir, self.segment_number, start_lsn)?;
        self.records_since_sync = 0;
        Ok(())
    }

    /// Post-snapshot rotation: start a fresh segment whose first LSN is
    /// `snapshot_lsn + 1`, delete every earlier segment, and fsync the
    /// directory. The snapshot image is already durable when this runs.
    pub fn rotate_after_snapshot(&mut self, snapshot_lsn: u64) -> Result<()> {
        self.rotate(snapshot_lsn + 1)
            .map_err(|e| self.fail("post-snapshot rotation", e))?;

        for num in list_segments(&self.dir)? {
            if num < self.segment_number {
                std::fs::remove_file(WalSegment::segment_path(&self.dir, num))?;
            }
        }
        let dir = std::fs::File::open(&self.dir)?;
        dir.sync_all()?;

        let mut health = self.health.write();
        health.end_position = self.segment.size();
        health.segment_bytes = self.segment.size();
        drop(health);

        info!(
            segment = self.segment_number,
            start_lsn = snapshot_lsn + 1,
            "WAL rotated after snapshot"
        );
        Ok(())
    }

    /// fsync regardless of policy.
    pub fn flush(&mut self) -> Result<()> {
        self.segment.sync().map_err(|e| self.fail("flush", e))?;
        self.records_since_sync = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Flush and close the active segment.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.segment.close().map_err(|e| self.fail("close", e))?;
        Ok(())
    }
}
