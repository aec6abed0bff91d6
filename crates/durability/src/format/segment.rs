//! WAL segment files.
//!
//! Segments are named `wal.NNNNNN` in the data directory, numbered in
//! ascending order by starting LSN. Only the newest segment is writable;
//! earlier segments are immutable until the post-snapshot rotation deletes
//! them.
//!
//! # Segment Layout
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ Segment Header (24 bytes)           │
//! ├─────────────────────────────────────┤
//! │ Record 1                            │
//! ├─────────────────────────────────────┤
//! │ ...                                 │
//! └─────────────────────────────────────┘
//! ```

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes identifying a WAL segment file.
pub const SEGMENT_MAGIC: [u8; 4] = *b"NWAL";

/// Current segment format version.
pub const SEGMENT_FORMAT_VERSION: u32 = 1;

/// Size of the segment header in bytes (8 reserved bytes at the end).
pub const SEGMENT_HEADER_SIZE: usize = 24;

/// Segment header: magic, format version, and the LSN of the first record
/// this segment may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Magic bytes.
    pub magic: [u8; 4],
    /// Format version for forward compatibility.
    pub format_version: u32,
    /// Starting LSN of this segment.
    pub start_lsn: u64,
}

impl SegmentHeader {
    /// Create a header for a new segment.
    pub fn new(start_lsn: u64) -> Self {
        SegmentHeader {
            magic: SEGMENT_MAGIC,
            format_version: SEGMENT_FORMAT_VERSION,
            start_lsn,
        }
    }

    /// Serialize to the fixed on-disk layout.
    pub fn to_bytes(&self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut bytes = [0u8; SEGMENT_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.start_lsn.to_le_bytes());
        // bytes[16..24] reserved, zero
        bytes
    }

    /// Deserialize from the fixed on-disk layout.
    pub fn from_bytes(bytes: &[u8; SEGMENT_HEADER_SIZE]) -> Option<Self> {
        Some(SegmentHeader {
            magic: bytes[0..4].try_into().ok()?,
            format_version: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            start_lsn: u64::from_le_bytes(bytes[8..16].try_into().ok()?),
        })
    }

    /// Whether the magic bytes match.
    pub fn is_valid(&self) -> bool {
        self.magic == SEGMENT_MAGIC
    }
}

/// An open WAL segment file.
pub struct WalSegment {
    file: File,
    number: u64,
    start_lsn: u64,
    write_position: u64,
    path: PathBuf,
    closed: bool,
}

impl WalSegment {
    /// Path of segment `number` inside `dir`: `wal.NNNNNN`.
    pub fn segment_path(dir: &Path, number: u64) -> PathBuf {
        dir.join(format!("wal.{:06}", number))
    }

    /// Create a new segment and durably write its header before any record
    /// is appended.
    pub fn create(dir: &Path, number: u64, start_lsn: u64) -> std::io::Result<Self> {
        let path = Self::segment_path(dir, number);
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let header = SegmentHeader::new(start_lsn);
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;

        Ok(WalSegment {
            file,
            number,
            start_lsn,
            write_position: SEGMENT_HEADER_SIZE as u64,
            path,
            closed: false,
        })
    }

    /// Open an existing segment for appending, validating the header.
    pub fn open_append(dir: &Path, number: u64) -> std::io::Result<Self> {
        let (file, header, size, path) = Self::open_validated(dir, number, true)?;
        let mut segment = WalSegment {
            file,
            number,
            start_lsn: header.start_lsn,
            write_position: size,
            path,
            closed: false,
        };
        segment.file.seek(SeekFrom::End(0))?;
        Ok(segment)
    }

    /// Open an existing segment read-only.
    pub fn open_read(dir: &Path, number: u64) -> std::io::Result<Self> {
        let (file, header, size, path) = Self::open_validated(dir, number, false)?;
        Ok(WalSegment {
            file,
            number,
            start_lsn: header.start_lsn,
            write_position: size,
            path,
            closed: true,
        })
    }

    fn open_validated(
        dir: &Path,
        number: u64,
        writable: bool,
    ) -> std::io::Result<(File, SegmentHeader, u64, PathBuf)> {
        let path = Self::segment_path(dir, number);
        let mut file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(&path)?;

        let mut header_bytes = [0u8; SEGMENT_HEADER_SIZE];
        file.read_exact(&mut header_bytes)?;
        let header = SegmentHeader::from_bytes(&header_bytes).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid segment header")
        })?;
        if !header.is_valid() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "invalid segment magic bytes",
            ));
        }
        if header.format_version != SEGMENT_FORMAT_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unsupported segment version {}", header.format_version),
            ));
        }

        let size = file.seek(SeekFrom::End(0))?;
        Ok((file, header, size, path))
    }

    /// Segment number.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Starting LSN recorded in the header.
    pub fn start_lsn(&self) -> u64 {
        self.start_lsn
    }

    /// Current size in bytes (header included).
    pub fn size(&self) -> u64 {
        self.write_position
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append raw bytes.
    pub fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        if self.closed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "cannot write to closed segment",
            ));
        }
        self.file.write_all(data)?;
        self.write_position += data.len() as u64;
        Ok(())
    }

    /// fsync segment contents.
    pub fn sync(&mut self) -> std::io::Result<()> {
        self.file.sync_all()
    }

    /// Seek the underlying file for reading.
    pub fn seek_to(&mut self, position: u64) -> std::io::Result<u64> {
        self.file.seek(SeekFrom::Start(position))
    }

    /// Read access to the underlying file.
    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// Cut the segment at `position`, dropping everything after it. Used
    /// by recovery for tail repair.
    pub fn truncate(&mut self, position: u64) -> std::io::Result<()> {
        self.file.set_len(position)?;
        self.write_position = position;
        self.file.seek(SeekFrom::Start(position))?;
        self.file.sync_all()
    }

    /// fsync and mark immutable.
    pub fn close(&mut self) -> std::io::Result<()> {
        if !self.closed {
            self.file.sync_all()?;
            self.closed = true;
        }
        Ok(())
    }
}

/// All segment numbers present in `dir`, ascending.
pub fn list_segments(dir: &Path) -> std::io::Result<Vec<u64>> {
    let mut segments = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        // Expected format: "wal.NNNNNN"
        if let Some(digits) = name.strip_prefix("wal.") {
            if digits.len() >= 6 && digits.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(num) = digits.parse::<u64>() {
                    segments.push(num);
                }
            }
        }
    }
    segments.sort_unstable();
    Ok(segments)
}
