//! Bounded bulk I/O
//!
//! Fixed-capacity record buffers between the transport and the file. They
//! know record counts and byte sizes, nothing about lattice coordinates.

use crate::error::{Result, TransferError};
use std::io::{ErrorKind, Read, Write};
use tracing::debug;

/// Accumulates fixed-size records and writes them out in bulk.
///
/// A flush happens when the buffer is full and once more on [`Self::finish`],
/// so a block of records produces at most one short trailing write.
#[derive(Debug)]
pub struct BulkWriter<W> {
    inner: W,
    buf: Vec<u8>,
    capacity: usize,
    record_bytes: usize,
    flushes: usize,
}

impl<W: Write> BulkWriter<W> {
    /// Buffer of `capacity` records of `record_bytes` each
    pub fn new(inner: W, capacity: usize, record_bytes: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner,
            buf: Vec::with_capacity(capacity * record_bytes),
            capacity,
            record_bytes,
            flushes: 0,
        }
    }

    /// Append one record, flushing if the buffer fills up
    pub fn push(&mut self, record: &[u8]) -> Result<()> {
        if record.len() != self.record_bytes {
            return Err(TransferError::InvalidOperation(format!(
                "record of {} bytes pushed to a {}-byte record buffer",
                record.len(),
                self.record_bytes
            )));
        }
        self.buf.extend_from_slice(record);
        if self.buf.len() == self.capacity * self.record_bytes {
            self.flush_buffer()?;
        }
        Ok(())
    }

    /// Write out whatever is buffered
    pub fn finish(&mut self) -> Result<()> {
        if !self.buf.is_empty() {
            self.flush_buffer()?;
        }
        self.inner
            .flush()
            .map_err(|e| TransferError::io("flush", e))
    }

    fn flush_buffer(&mut self) -> Result<()> {
        debug!(
            "Flushing {} records ({} bytes)",
            self.buf.len() / self.record_bytes,
            self.buf.len()
        );
        self.inner
            .write_all(&self.buf)
            .map_err(|e| TransferError::io("write", e))?;
        self.buf.clear();
        self.flushes += 1;
        Ok(())
    }

    /// Number of bulk writes issued so far
    pub const fn flushes(&self) -> usize {
        self.flushes
    }

    /// Records waiting in the buffer
    pub fn pending(&self) -> usize {
        self.buf.len() / self.record_bytes
    }

    /// Unwrap the output stream; buffered records are discarded
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads a known number of fixed-size records in bulk.
///
/// Each refill reads `min(capacity, records remaining)` records. Fewer bytes
/// than requested is a [`TransferError::ShortTransfer`]; nothing is retried.
#[derive(Debug)]
pub struct BulkReader<R> {
    inner: R,
    buf: Vec<u8>,
    capacity: usize,
    record_bytes: usize,
    unread: u64,
    cursor: usize,
    refills: usize,
}

impl<R: Read> BulkReader<R> {
    /// Reader of `total` records of `record_bytes` each, `capacity` at a time
    pub fn new(inner: R, capacity: usize, record_bytes: usize, total: u64) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(capacity.max(1) * record_bytes),
            capacity: capacity.max(1),
            record_bytes,
            unread: total,
            cursor: 0,
            refills: 0,
        }
    }

    /// Next record, refilling from the stream when the buffer is drained
    pub fn next_record(&mut self) -> Result<&[u8]> {
        if self.cursor == self.buf.len() {
            self.refill()?;
        }
        let start = self.cursor;
        self.cursor += self.record_bytes;
        Ok(&self.buf[start..self.cursor])
    }

    fn refill(&mut self) -> Result<()> {
        if self.unread == 0 {
            return Err(TransferError::InvalidOperation(
                "read past the last record of the block".to_string(),
            ));
        }
        let records = usize::try_from(self.unread).map_or(self.capacity, |n| n.min(self.capacity));
        let expected = records * self.record_bytes;
        self.buf.resize(expected, 0);

        let mut filled = 0;
        while filled < expected {
            match self.inner.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(TransferError::io("read", e)),
            }
        }
        if filled < expected {
            return Err(TransferError::ShortTransfer {
                expected,
                actual: filled,
            });
        }

        debug!("Read {} records ({} bytes)", records, expected);
        self.unread -= records as u64;
        self.cursor = 0;
        self.refills += 1;
        Ok(())
    }

    /// Number of bulk reads issued so far
    pub const fn refills(&self) -> usize {
        self.refills
    }

    /// Unwrap the input stream
    pub fn into_inner(self) -> R {
        self.inner
    }
}
