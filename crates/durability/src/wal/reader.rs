//! WAL validation-side scan.
//!
//! The reader walks a segment record by record, validating length bounds
//! and CRC. The first invalid record ends the scan: everything after it is
//! considered lost, and the scan reports the last valid boundary so
//! recovery can truncate there. There is no attempt to resynchronize past
//! corruption; a length field inside a damaged region cannot be trusted.

use crate::format::segment::{WalSegment, SEGMENT_HEADER_SIZE};
use crate::format::wal_record::{RecordLayout, WalRecord, WalRecordError};
use nendb_core::Result;
use std::io::Read;
use std::path::Path;

/// Why a segment scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStop {
    /// All bytes decoded cleanly.
    EndOfData,
    /// A record extends past the end of the file (torn write).
    PartialRecord {
        /// Byte offset of the partial record within the segment.
        offset: u64,
    },
    /// Checksum or framing failure.
    Corrupt {
        /// Byte offset of the first invalid record within the segment.
        offset: u64,
    },
}

/// Result of scanning one segment.
#[derive(Debug)]
pub struct SegmentScan {
    /// Segment number scanned.
    pub segment_number: u64,
    /// Starting LSN from the segment header.
    pub start_lsn: u64,
    /// Decoded records with the byte offset just past each record.
    pub records: Vec<(WalRecord, u64)>,
    /// Offset just past the last valid record (truncation boundary).
    pub valid_end: u64,
    /// Total file size at scan time.
    pub file_size: u64,
    /// Why the scan stopped.
    pub stop: ReadStop,
}

impl SegmentScan {
    /// Whether the segment held bytes past the last valid record.
    pub fn has_invalid_tail(&self) -> bool {
        self.valid_end < self.file_size
    }
}

/// Sequential reader over WAL segments.
pub struct WalReader {
    layout: RecordLayout,
}

impl WalReader {
    /// Create a reader for records written under `layout`.
    pub fn new(layout: RecordLayout) -> Self {
        WalReader { layout }
    }

    /// Scan one segment, stopping at the first invalid record.
    pub fn read_segment(&self, dir: &Path, number: u64) -> Result<SegmentScan> {
        let mut segment = WalSegment::open_read(dir, number)?;
        let start_lsn = segment.start_lsn();
        let file_size = segment.size();

        segment.seek_to(SEGMENT_HEADER_SIZE as u64)?;
        let mut buffer = Vec::new();
        segment.file_mut().read_to_end(&mut buffer)?;

        let mut records = Vec::new();
        let mut offset = 0usize;
        let mut stop = ReadStop::EndOfData;

        while offset < buffer.len() {
            match WalRecord::decode(&buffer[offset..], &self.layout) {
                Ok((record, consumed)) => {
                    offset += consumed;
                    records.push((record, SEGMENT_HEADER_SIZE as u64 + offset as u64));
                }
                Err(WalRecordError::InsufficientData) => {
                    stop = ReadStop::PartialRecord {
                        offset: SEGMENT_HEADER_SIZE as u64 + offset as u64,
                    };
                    break;
                }
                Err(_) => {
                    stop = ReadStop::Corrupt {
                        offset: SEGMENT_HEADER_SIZE as u64 + offset as u64,
                    };
                    break;
                }
            }
        }

        let valid_end = records
            .last()
            .map(|(_, end)| *end)
            .unwrap_or(SEGMENT_HEADER_SIZE as u64);

        Ok(SegmentScan {
            segment_number: number,
            start_lsn,
            records,
            valid_end,
            file_size,
            stop,
        })
    }
}
