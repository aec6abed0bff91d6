//! On-disk byte formats for the WAL.
//!
//! Serialization lives here, separate from how segments and records are
//! managed operationally, so format evolution stays contained.
//!
//! - `wal_record`: record framing and typed payloads
//! - `segment`: segment files and their headers

pub mod segment;
pub mod wal_record;

pub use segment::{
    list_segments, SegmentHeader, WalSegment, SEGMENT_FORMAT_VERSION, SEGMENT_HEADER_SIZE,
    SEGMENT_MAGIC,
};
pub use wal_record::{
    RecordLayout, RecordType, WalOp, WalRecord, WalRecordError, RECORD_HEADER_SIZE,
};
