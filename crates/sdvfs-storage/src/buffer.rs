//! Write-coalescing buffer for journal files
//!
//! Transaction logs are written as long runs of small, back-to-back
//! writes. Staging them here turns each contiguous run into a few
//! capacity-sized physical writes.
//!
//! The buffer never touches the driver itself. Callers pass the direct
//! write path as a closure so the buffer can stay a plain owned value
//! next to the driver handle.

use sdvfs_common::{Error, Result};
use tracing::debug;

/// Default capacity of a journal write buffer
pub const JOURNAL_BUFFER_SIZE: usize = 8192;

/// Counters for one buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Non-empty `stage` calls
    pub staged_writes: u64,
    pub staged_bytes: u64,
    /// Physical writes issued by successful flushes
    pub flushes: u64,
    pub flushed_bytes: u64,
    pub failed_flushes: u64,
}

/// Staging area for one open file
///
/// Whenever `valid_bytes() > 0` the region
/// `[start_offset, start_offset + valid_bytes)` is the only data of this
/// file that has not reached the driver.
#[derive(Debug)]
pub struct WriteBuffer<const CAPACITY: usize = JOURNAL_BUFFER_SIZE> {
    data: Vec<u8>,
    start_offset: u64,
    stats: BufferStats,
}

impl<const CAPACITY: usize> WriteBuffer<CAPACITY> {
    /// Allocate the buffer, reporting allocation failure instead of aborting
    pub fn try_new() -> Result<Self> {
        const { assert!(CAPACITY > 0, "write buffer capacity must be non-zero") };

        let mut data = Vec::new();
        data.try_reserve_exact(CAPACITY).map_err(|e| {
            Error::OutOfMemory(format!("write buffer of {CAPACITY} bytes: {e}"))
        })?;

        Ok(Self {
            data,
            start_offset: 0,
            stats: BufferStats::default(),
        })
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        CAPACITY
    }

    #[must_use]
    pub fn valid_bytes(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.data.len() == CAPACITY
    }

    /// Buffered region as `(start offset, bytes)`, if any
    #[must_use]
    pub fn pending(&self) -> Option<(u64, &[u8])> {
        (!self.data.is_empty()).then_some((self.start_offset, self.data.as_slice()))
    }

    #[must_use]
    pub const fn stats(&self) -> BufferStats {
        self.stats
    }

    fn end_offset(&self) -> u64 {
        self.start_offset + self.data.len() as u64
    }

    /// Stage `data` for the file region starting at `offset`.
    ///
    /// Buffered bytes are flushed through `write` first when the buffer is
    /// full or when `offset` does not continue the buffered region. Input
    /// larger than the free space is staged in capacity-sized pieces, each
    /// full piece flushed before the next is copied.
    ///
    /// If a flush fails the error is returned and every byte of this call
    /// still in the buffer is discarded, so only data from earlier
    /// successful calls stays pending. Pieces already flushed by this call
    /// remain written.
    pub fn stage<W>(&mut self, data: &[u8], offset: u64, write: &mut W) -> Result<()>
    where
        W: FnMut(u64, &[u8]) -> Result<()>,
    {
        if data.is_empty() {
            return Ok(());
        }
        self.stats.staged_writes += 1;

        let mut remaining = data;
        let mut offset = offset;
        // Buffered bytes that predate this call
        let mut kept = self.data.len();
        while !remaining.is_empty() {
            if self.is_full() || (!self.is_empty() && offset != self.end_offset()) {
                if let Err(e) = self.flush(write) {
                    let discarded = self.data.len() - kept;
                    self.data.truncate(kept);
                    self.stats.staged_bytes -= discarded as u64;
                    return Err(e);
                }
                kept = 0;
            }

            self.start_offset = offset - self.data.len() as u64;
            let take = remaining.len().min(CAPACITY - self.data.len());
            self.data.extend_from_slice(&remaining[..take]);

            remaining = &remaining[take..];
            offset += take as u64;
            self.stats.staged_bytes += take as u64;
        }

        Ok(())
    }

    /// Write the buffered region with one call to `write`.
    ///
    /// The buffer is cleared only when the write succeeds.
    pub fn flush<W>(&mut self, write: &mut W) -> Result<()>
    where
        W: FnMut(u64, &[u8]) -> Result<()>,
    {
        if self.data.is_empty() {
            return Ok(());
        }

        let len = self.data.len();
        if let Err(e) = write(self.start_offset, &self.data) {
            self.stats.failed_flushes += 1;
            return Err(e);
        }

        debug!(offset = self.start_offset, len, "flushed write buffer");
        self.stats.flushes += 1;
        self.stats.flushed_bytes += len as u64;
        self.data.clear();
        Ok(())
    }
}
