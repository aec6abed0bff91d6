//! WAL record framing and typed payloads.
//!
//! # Record Layout
//!
//! ```text
//! ┌──────────────┬───────────┬──────────┬───────────────┬──────────┬──────────┐
//! │ Length (4)   │ Type (2)  │ LSN (8)  │ Timestamp (8) │ Payload  │ CRC32 (4)│
//! └──────────────┴───────────┴──────────┴───────────────┴──────────┴──────────┘
//! ```
//!
//! The length field counts payload bytes only. The CRC32 covers everything
//! before it, length field included. All integers are little-endian.
//!
//! Property blobs and vectors are fixed-width, so payload sizes are fully
//! determined by the record type and the engine's [`RecordLayout`]; decode
//! rejects any size mismatch before trusting the content.

use crc32fast::Hasher;

/// Fixed bytes before the payload: length + type + LSN + timestamp.
pub const RECORD_HEADER_SIZE: usize = 4 + 2 + 8 + 8;

/// Bytes of the trailing checksum.
pub const RECORD_TRAILER_SIZE: usize = 4;

/// Upper bound on a single payload; larger length fields are treated as
/// corruption rather than allocated.
const MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

/// Fixed widths needed to encode and decode payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    /// Node property blob size in bytes.
    pub node_prop_size: usize,
    /// Edge property blob size in bytes.
    pub edge_prop_size: usize,
    /// Embedding vector dimension.
    pub embedding_dim: usize,
}

/// On-disk record type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RecordType {
    CreateNode = 1,
    CreateEdge = 2,
    CreateEmbedding = 3,
    DeleteNode = 4,
    DeleteEdge = 5,
    UpdateNode = 6,
    BatchMarker = 7,
}

impl RecordType {
    /// Parse a wire tag.
    pub fn from_u16(tag: u16) -> Option<Self> {
        match tag {
            1 => Some(RecordType::CreateNode),
            2 => Some(RecordType::CreateEdge),
            3 => Some(RecordType::CreateEmbedding),
            4 => Some(RecordType::DeleteNode),
            5 => Some(RecordType::DeleteEdge),
            6 => Some(RecordType::UpdateNode),
            7 => Some(RecordType::BatchMarker),
            _ => None,
        }
    }
}

/// One logical mutation, the unit the WAL persists and replay applies.
#[derive(Debug, Clone, PartialEq)]
pub enum WalOp {
    CreateNode {
        id: u64,
        kind: u8,
        /// Exactly `node_prop_size` bytes.
        props: Vec<u8>,
    },
    CreateEdge {
        from: u64,
        to: u64,
        label: u16,
        /// Exactly `edge_prop_size` bytes.
        props: Vec<u8>,
    },
    CreateEmbedding {
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
        /// Exactly `node_prop_size` bytes.
        props: Vec<u8>,
    },
    /// Seals the preceding records of a batch; its presence on disk means
    /// the batch is committed.
    BatchMarker {
        batch_size: u32,
    },
}

impl WalOp {
    /// Wire tag for this operation.
    pub fn record_type(&self) -> RecordType {
        match self {
            WalOp::CreateNode { .. } => RecordType::CreateNode,
            WalOp::CreateEdge { .. } => RecordType::CreateEdge,
            WalOp::CreateEmbedding { .. } => RecordType::CreateEmbedding,
            WalOp::DeleteNode { .. } => RecordType::DeleteNode,
            WalOp::DeleteEdge { .. } => RecordType::DeleteEdge,
            WalOp::UpdateNode { .. } => RecordType::UpdateNode,
            WalOp::BatchMarker { .. } => RecordType::BatchMarker,
        }
    }

    /// Payload size for this operation under the given layout.
    pub fn payload_len(&self, layout: &RecordLayout) -> usize {
        match self {
            WalOp::CreateNode { .. } | WalOp::UpdateNode { .. } => 9 + layout.node_prop_size,
            WalOp::CreateEdge { .. } => 18 + layout.edge_prop_size,
            WalOp::CreateEmbedding { .. } => 8 + 4 * layout.embedding_dim,
            WalOp::DeleteNode { .. } => 8,
            WalOp::DeleteEdge { .. } => 18,
            WalOp::BatchMarker { .. } => 4,
        }
    }
}

/// A WAL record: framing plus one [`WalOp`].
#[derive(Debug, Clone, PartialEq)]
pub struct WalRecord {
    /// Log sequence number, monotonically increasing across all records.
    pub lsn: u64,
    /// Opaque timestamp, monotonic per process start (microseconds).
    pub timestamp: u64,
    /// The mutation carried by this record.
    pub op: WalOp,
}

impl WalRecord {
    /// Create a record.
    pub fn new(lsn: u64, timestamp: u64, op: WalOp) -> Self {
        WalRecord { lsn, timestamp, op }
    }

    /// Total encoded size under the given layout.
    pub fn encoded_len(&self, layout: &RecordLayout) -> usize {
        RECORD_HEADER_SIZE + self.op.payload_len(layout) + RECORD_TRAILER_SIZE
    }

    /// Append the encoded record to `buf`.
    ///
    /// Fixed-width fields (`props`, `vector`) must already match the
    /// layout; the batch processor pads them at add time.
    pub fn encode_into(&self, layout: &RecordLayout, buf: &mut Vec<u8>) {
        let start = buf.len();
        let payload_len = self.op.payload_len(layout) as u32;

        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(&(self.op.record_type() as u16).to_le_bytes());
        buf.extend_from_slice(&self.lsn.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());

        match &self.op {
            WalOp::CreateNode { id, kind, props } | WalOp::UpdateNode { id, kind, props } => {
                debug_assert_eq!(props.len(), layout.node_prop_size);
                buf.extend_from_slice(&id.to_le_bytes());
                buf.push(*kind);
                buf.extend_from_slice(props);
            }
            WalOp::CreateEdge {
                from,
                to,
                label,
                props,
            } => {
                debug_assert_eq!(props.len(), layout.edge_prop_size);
                buf.extend_from_slice(&from.to_le_bytes());
                buf.extend_from_slice(&to.to_le_bytes());
                buf.extend_from_slice(&label.to_le_bytes());
                buf.extend_from_slice(props);
            }
            WalOp::CreateEmbedding { node_id, vector } => {
                debug_assert_eq!(vector.len(), layout.embedding_dim);
                buf.extend_from_slice(&node_id.to_le_bytes());
                for lane in vector {
                    buf.extend_from_slice(&lane.to_le_bytes());
                }
            }
            WalOp::DeleteNode { id } => {
                buf.extend_from_slice(&id.to_le_bytes());
            }
            WalOp::DeleteEdge { from, to, label } => {
                buf.extend_from_slice(&from.to_le_bytes());
                buf.extend_from_slice(&to.to_le_bytes());
                buf.extend_from_slice(&label.to_le_bytes());
            }
            WalOp::BatchMarker { batch_size } => {
                buf.extend_from_slice(&batch_size.to_le_bytes());
            }
        }

        let crc = compute_crc(&buf[start..]);
        buf.extend_from_slice(&crc.to_le_bytes());
    }

    /// Decode one record from the front of `bytes`.
    ///
    /// Returns `(record, bytes_consumed)` on success.
    pub fn decode(bytes: &[u8], layout: &RecordLayout) -> Result<(Self, usize), WalRecordError> {
        if bytes.len() < RECORD_HEADER_SIZE {
            return Err(WalRecordError::InsufficientData);
        }

        let payload_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(WalRecordError::InvalidFormat);
        }

        let total = RECORD_HEADER_SIZE + payload_len + RECORD_TRAILER_SIZE;
        if bytes.len() < total {
            return Err(WalRecordError::InsufficientData);
        }

        let stored_crc = u32::from_le_bytes(bytes[total - 4..total].try_into().unwrap());
        let computed_crc = compute_crc(&bytes[..total - 4]);
        if stored_crc != computed_crc {
            return Err(WalRecordError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        let tag = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        let record_type =
            RecordType::from_u16(tag).ok_or(WalRecordError::UnknownRecordType(tag))?;
        let lsn = u64::from_le_bytes(bytes[6..14].try_into().unwrap());
        let timestamp = u64::from_le_bytes(bytes[14..22].try_into().unwrap());
        let payload = &bytes[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + payload_len];

        let op = decode_payload(record_type, payload, layout)?;
        Ok((WalRecord { lsn, timestamp, op }, total))
    }
}

fn decode_payload(
    record_type: RecordType,
    payload: &[u8],
    layout: &RecordLayout,
) -> Result<WalOp, WalRecordError> {
    let expect = |len: usize| {
        if payload.len() == len {
            Ok(())
        } else {
            Err(WalRecordError::InvalidFormat)
        }
    };

    match record_type {
        RecordType::CreateNode | RecordType::UpdateNode => {
            expect(9 + layout.node_prop_size)?;
            let id = u64::from_le_bytes(payload[0..8].try_into().unwrap());
            let kind = payload[8];
            let props = payload[9..].to_vec();
            Ok(if record_type == RecordType::CreateNode {
                WalOp::CreateNode { id, kind, props }
            } else {
                WalOp::UpdateNode { id, kind, props }
            })
        }
        RecordType::CreateEdge => {
            expect(18 + layout.edge_prop_size)?;
            Ok(WalOp::CreateEdge {
                from: u64::from_le_bytes(payload[0..8].try_into().unwrap()),
                to: u64::from_le_bytes(payload[8..16].try_into().unwrap()),
                label: u16::from_le_bytes(payload[16..18].try_into().unwrap()),
                props: payload[18..].to_vec(),
            })
        }
        RecordType::CreateEmbedding => {
            expect(8 + 4 * layout.embedding_dim)?;
            let node_id = u64::from_le_bytes(payload[0..8].try_into().unwrap());
            let vector = payload[8..]
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            Ok(WalOp::CreateEmbedding { node_id, vector })
        }
        RecordType::DeleteNode => {
            expect(8)?;
            Ok(WalOp::DeleteNode {
                id: u64::from_le_bytes(payload[0..8].try_into().unwrap()),
            })
        }
        RecordType::DeleteEdge => {
            expect(18)?;
            Ok(WalOp::DeleteEdge {
                from: u64::from_le_bytes(payload[0..8].try_into().unwrap()),
                to: u64::from_le_bytes(payload[8..16].try_into().unwrap()),
                label: u16::from_le_bytes(payload[16..18].try_into().unwrap()),
            })
        }
        RecordType::BatchMarker => {
            expect(4)?;
            Ok(WalOp::BatchMarker {
                batch_size: u32::from_le_bytes(payload[0..4].try_into().unwrap()),
            })
        }
    }
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// WAL record parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalRecordError {
    /// Not enough bytes for a whole record; expected at a torn tail.
    #[error("insufficient data to parse record")]
    InsufficientData,

    /// Length or payload size is inconsistent with the record type.
    #[error("invalid record format")]
    InvalidFormat,

    /// Checksum verification failed.
    #[error("checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Checksum computed over the bytes read.
        computed: u32,
    },

    /// Unrecognized record type tag.
    #[error("unknown record type: {0}")]
    UnknownRecordType(u16),
}
