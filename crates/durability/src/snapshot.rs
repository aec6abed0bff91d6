//! Crash-safe snapshot images.
//!
//! A snapshot is a single file in the data directory holding a
//! point-in-time image of the engine state. Creation uses the
//! write-fsync-rename pattern so that either the complete image exists or
//! the previous one does; a half-written snapshot is never visible:
//!
//! 1. Write the image to `snapshot.tmp`.
//! 2. fsync the temp file.
//! 3. Rename `snapshot` (if any) to `snapshot.bak`.
//! 4. Rename `snapshot.tmp` to `snapshot`.
//! 5. fsync the directory.
//!
//! # Image Layout
//!
//! ```text
//! ┌──────────────────┬─────────────┬──────────┬───────────────┬──────────┬──────────┐
//! │ Magic (16)       │ Version (4) │ LSN (8)  │ Config (24)   │ Sections │ CRC32 (4)│
//! └──────────────────┴─────────────┴──────────┴───────────────┴──────────┴──────────┘
//!
//! Sections: count (4), then per section: tag (1) | length (8) | bytes
//! ```
//!
//! The trailing CRC32 covers the entire preceding image.

use crc32fast::Hasher;
use nendb_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes identifying a snapshot image.
pub const SNAPSHOT_MAGIC: [u8; 16] = *b"NENDB-SNAPSHOT\0\0";

/// Current snapshot format version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Current snapshot file name.
pub const SNAPSHOT_FILE: &str = "snapshot";
/// Previous snapshot file name.
pub const SNAPSHOT_BAK_FILE: &str = "snapshot.bak";
/// In-progress snapshot file name.
pub const SNAPSHOT_TMP_FILE: &str = "snapshot.tmp";

/// Section tags within a snapshot image.
pub mod section_tags {
    /// Node pool dump.
    pub const NODES: u8 = 1;
    /// Edge pool dump.
    pub const EDGES: u8 = 2;
    /// Embedding pool dump.
    pub const EMBEDDINGS: u8 = 3;
    /// Id-index dump.
    pub const ID_INDEX: u8 = 4;
}

/// Engine limits stamped into every image. A reopened database is checked
/// against these before any section is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotConfig {
    pub node_capacity: u32,
    pub edge_capacity: u32,
    pub embedding_capacity: u32,
    pub embedding_dim: u32,
    pub node_prop_size: u32,
    pub edge_prop_size: u32,
}

/// One tagged byte section of an image.
#[derive(Debug, Clone)]
pub struct SnapshotSection {
    /// Section tag (see [`section_tags`]).
    pub tag: u8,
    /// Serialized section bytes.
    pub data: Vec<u8>,
}

impl SnapshotSection {
    /// Create a section.
    pub fn new(tag: u8, data: Vec<u8>) -> Self {
        SnapshotSection { tag, data }
    }
}

/// A complete snapshot image.
#[derive(Debug, Clone)]
pub struct SnapshotImage {
    /// LSN at which the image was taken; replay resumes after it.
    pub lsn: u64,
    /// Engine limits at snapshot time.
    pub config: SnapshotConfig,
    /// Pool and index dumps.
    pub sections: Vec<SnapshotSection>,
}

impl SnapshotImage {
    /// Section bytes for a tag, if present.
    pub fn section(&self, tag: u8) -> Option<&[u8]> {
        self.sections
            .iter()
            .find(|s| s.tag == tag)
            .map(|s| s.data.as_slice())
    }
}

/// Information about a written snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    /// LSN of the image.
    pub lsn: u64,
    /// Final path of the image.
    pub path: PathBuf,
    /// Image size in bytes.
    pub bytes: u64,
    /// Trailing checksum.
    pub crc: u32,
}

/// Serialize an image to its on-disk byte form.
fn encode_image(image: &SnapshotImage) -> Vec<u8> {
    let section_bytes: usize = image.sections.iter().map(|s| 9 + s.data.len()).sum();
    let mut buf = Vec::with_capacity(16 + 4 + 8 + 24 + 4 + section_bytes + 4);

    buf.extend_from_slice(&SNAPSHOT_MAGIC);
    buf.extend_from_slice(&SNAPSHOT_FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&image.lsn.to_le_bytes());

    let c = &image.config;
    for field in [
        c.node_capacity,
        c.edge_capacity,
        c.embedding_capacity,
        c.embedding_dim,
        c.node_prop_size,
        c.edge_prop_size,
    ] {
        buf.extend_from_slice(&field.to_le_bytes());
    }

    buf.extend_from_slice(&(image.sections.len() as u32).to_le_bytes());
    for section in &image.sections {
        buf.push(section.tag);
        buf.extend_from_slice(&(section.data.len() as u64).to_le_bytes());
        buf.extend_from_slice(&section.data);
    }

    let mut hasher = Hasher::new();
    hasher.update(&buf);
    let crc = hasher.finalize();
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Parse and validate an on-disk image.
fn decode_image(bytes: &[u8]) -> Result<SnapshotImage> {
    let corrupt = |msg: &str| Error::snapshot_corruption(msg.to_string());

    if bytes.len() < 16 + 4 + 8 + 24 + 4 + 4 {
        return Err(corrupt("image shorter than fixed header"));
    }

    let stored_crc = u32::from_le_bytes(bytes[bytes.len() - 4..].try_into().unwrap());
    let mut hasher = Hasher::new();
    hasher.update(&bytes[..bytes.len() - 4]);
    if hasher.finalize() != stored_crc {
        return Err(corrupt("image checksum mismatch"));
    }

    if bytes[0..16] != SNAPSHOT_MAGIC {
        return Err(corrupt("bad magic"));
    }
    let version = u32::from_le_bytes(bytes[16..20].try_into().unwrap());
    if version != SNAPSHOT_FORMAT_VERSION {
        return Err(Error::snapshot_corruption(format!(
            "unsupported format version {}",
            version
        )));
    }

    let lsn = u64::from_le_bytes(bytes[20..28].try_into().unwrap());
    let mut fields = [0u32; 6];
    for (i, field) in fields.iter_mut().enumerate() {
        let at = 28 + i * 4;
        *field = u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
    }
    let config = SnapshotConfig {
        node_capacity: fields[0],
        edge_capacity: fields[1],
        embedding_capacity: fields[2],
        embedding_dim: fields[3],
        node_prop_size: fields[4],
        edge_prop_size: fields[5],
    };

    let mut pos = 52;
    let section_count = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
    pos += 4;

    let body_end = bytes.len() - 4;
    let mut sections = Vec::with_capacity(section_count as usize);
    for _ in 0..section_count {
        if pos + 9 > body_end {
            return Err(corrupt("section header past end of image"));
        }
        let tag = bytes[pos];
        let len = u64::from_le_bytes(bytes[pos + 1..pos + 9].try_into().unwrap()) as usize;
        pos += 9;
        if pos + len > body_end {
            return Err(corrupt("section body past end of image"));
        }
        sections.push(SnapshotSection::new(tag, bytes[pos..pos + len].to_vec()));
        pos += len;
    }
    if pos != body_end {
        return Err(corrupt("trailing bytes after last section"));
    }

    Ok(SnapshotImage {
        lsn,
        config,
        sections,
    })
}

/// Write an image with the crash-safe protocol. The caller holds the
/// writer lock; readers are unaffected.
pub fn write(data_dir: &Path, image: &SnapshotImage) -> Result<SnapshotInfo> {
    let tmp_path = data_dir.join(SNAPSHOT_TMP_FILE);
    let final_path = data_dir.join(SNAPSHOT_FILE);
    let bak_path = data_dir.join(SNAPSHOT_BAK_FILE);

    let bytes = encode_image(image);
    let crc = u32::from_le_bytes(bytes[bytes.len() - 4..].try_into().unwrap());

    // A leftover temp file from a crashed snapshot is dead weight.
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    drop(file);

    if final_path.exists() {
        std::fs::rename(&final_path, &bak_path)?;
    }
    std::fs::rename(&tmp_path, &final_path)?;

    let dir = File::open(data_dir)?;
    dir.sync_all()?;

    Ok(SnapshotInfo {
        lsn: image.lsn,
        path: final_path,
        bytes: bytes.len() as u64,
        crc,
    })
}

/// Load the newest valid image.
///
/// Tries `snapshot` first, then `snapshot.bak` with a warning. Returns
/// `Ok(None)` when neither file exists (fresh database). Returns
/// `SnapshotCorruption` when at least one file exists but none validates;
/// the engine decides whether that is fatal.
///
/// The boolean is true when the backup image was used.
pub fn load(data_dir: &Path) -> Result<Option<(SnapshotImage, bool)>> {
    let final_path = data_dir.join(SNAPSHOT_FILE);
    let bak_path = data_dir.join(SNAPSHOT_BAK_FILE);

    let mut any_present = false;

    if final_path.exists() {
        any_present = true;
        match std::fs::read(&final_path).map_err(Error::from).and_then(|b| decode_image(&b)) {
            Ok(image) => return Ok(Some((image, false))),
            Err(e) => {
                warn!(target: "nendb::recovery", path = %final_path.display(), error = %e,
                    "snapshot failed validation, trying backup");
            }
        }
    }

    if bak_path.exists() {
        any_present = true;
        match std::fs::read(&bak_path).map_err(Error::from).and_then(|b| decode_image(&b)) {
            Ok(image) => {
                warn!(target: "nendb::recovery", "loaded state from snapshot.bak");
                return Ok(Some((image, true)));
            }
            Err(e) => {
                warn!(target: "nendb::recovery", path = %bak_path.display(), error = %e,
                    "backup snapshot failed validation");
            }
        }
    }

    if any_present {
        return Err(Error::snapshot_corruption(
            "both snapshot and snapshot.bak failed validation",
        ));
    }
    Ok(None)
}
