//! Little-endian section codec for pool and index dumps.
//!
//! Snapshot sections are flat byte images: the writer concatenates columns,
//! the reader consumes them in the same order. A reader underflow means the
//! image is damaged and is reported as `SnapshotCorruption`; the caller
//! falls back to the backup image.

use nendb_core::{Error, Result};

/// Append-only little-endian writer over a caller-owned buffer.
pub struct SectionWriter<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> SectionWriter<'a> {
    /// Wrap a buffer; bytes are appended to its end.
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        SectionWriter { buf }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }
}

/// Sequential little-endian reader over a section image.
pub struct SectionReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SectionReader<'a> {
    /// Start reading at the beginning of the section.
    pub fn new(bytes: &'a [u8]) -> Self {
        SectionReader { bytes, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::snapshot_corruption(format!(
                "section truncated: wanted {} bytes, {} left",
                n,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn take_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn take_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn take_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    pub fn take_f32(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn take_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Fail unless the whole section was consumed.
    pub fn finish(self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(Error::snapshot_corruption(format!(
                "section has {} trailing bytes",
                self.remaining()
            )));
        }
        Ok(())
    }
}
