//! Open-file sessions
//!
//! A session owns one driver handle and, for journal files, one
//! [`WriteBuffer`]. Every read, sync, size query, truncate and close
//! drains the buffer before it touches the driver, so the engine never
//! observes a file that differs from what it wrote.
//!
//! Locking is a no-op: at most one connection may use a database file.

use crate::buffer::{BufferStats, WriteBuffer};
use crate::driver::{DriverFile, Filesystem, OpenMode};
use sdvfs_common::{DeviceCharacteristics, Error, LockLevel, OpenFlags, Result, SyncFlags, VfsConfig};
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

/// Operations the engine performs on an open file
pub trait VfsFile: Send {
    /// Fill `buf` from `offset`.
    ///
    /// A read that reaches end of file zero-fills the rest of `buf` and
    /// returns [`Error::ShortRead`].
    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<()>;

    /// Write `data` at `offset`
    fn write(&mut self, data: &[u8], offset: u64) -> Result<()>;

    /// Shrink the file to `size` bytes; never grows it
    fn truncate(&mut self, size: u64) -> Result<()>;

    /// Make all written data durable
    fn sync(&mut self, flags: SyncFlags) -> Result<()>;

    /// Current file size including data not yet written to the driver
    fn file_size(&mut self) -> Result<u64>;

    fn lock(&mut self, level: LockLevel) -> Result<()>;

    fn unlock(&mut self, level: LockLevel) -> Result<()>;

    /// Check if another connection holds a reserved lock
    fn check_reserved_lock(&mut self) -> Result<bool>;

    fn file_control(&mut self, op: i32) -> Result<()>;

    fn sector_size(&self) -> u32;

    fn device_characteristics(&self) -> DeviceCharacteristics;

    /// Drain pending writes and release the driver handle.
    ///
    /// The handle is released even when draining fails. The first error
    /// of the session's write path is returned in preference to later ones.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Write `data` at `offset` through the driver in one call
fn direct_write<F: DriverFile>(handle: &mut F, offset: u64, data: &[u8]) -> Result<()> {
    handle
        .seek(offset)
        .map_err(|e| Error::write(format!("seek to {offset} failed: {e}")))?;

    let written = handle.write(data).map_err(|e| {
        Error::write(format!("write of {} bytes at {offset} failed: {e}", data.len()))
    })?;
    if written != data.len() {
        return Err(Error::write(format!(
            "short write at {offset}: {written} of {} bytes",
            data.len()
        )));
    }

    debug!(offset, len = data.len(), "direct write");
    Ok(())
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "file already closed")
}

/// File session on top of a storage driver
#[derive(Debug)]
pub struct SdFile<F: DriverFile> {
    handle: Option<F>,
    buffer: Option<WriteBuffer>,
    flags: OpenFlags,
    path: String,
    config: Arc<VfsConfig>,
    lock_level: LockLevel,
    /// First write-path failure; reported again by `close`
    write_failure: Option<Error>,
}

impl<F: DriverFile> SdFile<F> {
    /// Open `path` on `fs`.
    ///
    /// Journal files get a write buffer unless
    /// [`VfsConfig::journal_buffering`] is off. The buffer is allocated
    /// before the driver handle so an allocation failure leaves nothing
    /// to release.
    pub fn open<FS>(fs: &FS, path: &str, flags: OpenFlags, config: Arc<VfsConfig>) -> Result<Self>
    where
        FS: Filesystem<File = F>,
    {
        if path.is_empty() {
            return Err(Error::cannot_open(path, "temporary files are not supported"));
        }

        let buffer = if flags.is_journal() && config.journal_buffering() {
            Some(WriteBuffer::try_new()?)
        } else {
            None
        };

        let handle = fs
            .open(path, OpenMode::from_flags(flags))
            .map_err(|e| Error::cannot_open(path, e))?;

        debug!(path, ?flags, buffered = buffer.is_some(), "opened file");
        Ok(Self {
            handle: Some(handle),
            buffer,
            flags,
            path: path.to_string(),
            config,
            lock_level: LockLevel::None,
            write_failure: None,
        })
    }

    /// Get the flags the file was opened with
    pub const fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check if writes go through a write buffer
    pub const fn is_buffered(&self) -> bool {
        self.buffer.is_some()
    }

    /// Get the write buffer counters, if the file is buffered
    pub fn buffer_stats(&self) -> Option<BufferStats> {
        self.buffer.as_ref().map(WriteBuffer::stats)
    }

    /// Get the lock level last requested by the engine
    pub const fn lock_level(&self) -> LockLevel {
        self.lock_level
    }

    fn driver(&mut self) -> io::Result<&mut F> {
        self.handle.as_mut().ok_or_else(closed)
    }

    /// Remember write-path failures and forward hard errors to the log sink
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_write_failure() && self.write_failure.is_none() {
                self.write_failure = Some(e.clone());
            }
            if !e.is_benign() {
                self.config.report(e);
            }
        }
        result
    }

    fn flush_pending(&mut self) -> Result<()> {
        let Some(buffer) = self.buffer.as_mut() else {
            return Ok(());
        };
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| Error::write(closed().to_string()))?;

        buffer.flush(&mut |offset, bytes| direct_write(handle, offset, bytes))
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        self.flush_pending()?;

        let handle = self.driver().map_err(|e| Error::read(e.to_string()))?;
        let size = handle
            .size()
            .map_err(|e| Error::read(format!("size query failed: {e}")))?;
        let start = offset.min(size);
        handle
            .seek(start)
            .map_err(|e| Error::read(format!("seek to {start} failed: {e}")))?;

        let mut filled = 0;
        while filled < buf.len() {
            match handle.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(Error::read(format!(
                        "read of {} bytes at {offset} failed: {e}",
                        buf.len()
                    )));
                }
            }
        }

        debug!(offset, len = buf.len(), read = filled, "read");
        if filled < buf.len() {
            buf[filled..].fill(0);
            return Err(Error::ShortRead {
                requested: buf.len(),
                read: filled,
            });
        }
        Ok(())
    }

    fn write_at(&mut self, data: &[u8], offset: u64) -> Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::write(closed().to_string()));
        };

        match self.buffer.as_mut() {
            Some(buffer) => buffer.stage(data, offset, &mut |at, bytes| direct_write(handle, at, bytes)),
            None if data.is_empty() => Ok(()),
            None => direct_write(handle, offset, data),
        }
    }

    fn truncate_to(&mut self, size: u64) -> Result<()> {
        self.flush_pending()?;

        let handle = self
            .driver()
            .map_err(|e| Error::TruncateFailed(e.to_string()))?;
        let current = handle
            .size()
            .map_err(|e| Error::TruncateFailed(format!("size query failed: {e}")))?;
        if current <= size {
            return Ok(());
        }

        handle
            .truncate(size)
            .map_err(|e| Error::TruncateFailed(format!("{current} -> {size} bytes: {e}")))?;
        debug!(path = %self.path, from = current, to = size, "truncated");
        Ok(())
    }

    fn sync_all(&mut self, flags: SyncFlags) -> Result<()> {
        self.flush_pending()?;
        self.driver()
            .and_then(|h| h.flush())
            .map_err(|e| Error::FsyncFailed(e.to_string()))?;
        debug!(path = %self.path, ?flags, "synced");
        Ok(())
    }

    fn size(&mut self) -> Result<u64> {
        self.flush_pending()?;
        self.driver()
            .and_then(|h| h.size())
            .map_err(|e| Error::FileSizeFailed(e.to_string()))
    }

    /// Drain the buffer, free it and release the handle
    fn shutdown(&mut self) -> Result<()> {
        let flushed = self.flush_pending();
        if let Err(e) = &flushed {
            self.config.report(e);
        }
        self.buffer = None;

        let released = match self.handle.take() {
            Some(handle) => handle
                .close()
                .map_err(|e| Error::CloseFailed(format!("{}: {e}", self.path))),
            None => Ok(()),
        };
        if let Err(e) = &released {
            self.config.report(e);
        }

        debug!(path = %self.path, "closed file");
        let earlier = self.write_failure.take().map_or(Ok(()), Err);
        earlier.and(flushed).and(released)
    }
}

impl<F: DriverFile> VfsFile for SdFile<F> {
    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        let result = self.read_at(buf, offset);
        self.track(result)
    }

    fn write(&mut self, data: &[u8], offset: u64) -> Result<()> {
        debug!(offset, len = data.len(), "write");
        let result = self.write_at(data, offset);
        self.track(result)
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        let result = self.truncate_to(size);
        self.track(result)
    }

    fn sync(&mut self, flags: SyncFlags) -> Result<()> {
        let result = self.sync_all(flags);
        self.track(result)
    }

    fn file_size(&mut self) -> Result<u64> {
        let result = self.size();
        self.track(result)
    }

    fn lock(&mut self, level: LockLevel) -> Result<()> {
        self.lock_level = self.lock_level.max(level);
        Ok(())
    }

    fn unlock(&mut self, level: LockLevel) -> Result<()> {
        self.lock_level = self.lock_level.min(level);
        Ok(())
    }

    fn check_reserved_lock(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn file_control(&mut self, op: i32) -> Result<()> {
        Err(Error::unsupported(format!("file control {op}")))
    }

    fn sector_size(&self) -> u32 {
        self.config.sector_size()
    }

    fn device_characteristics(&self) -> DeviceCharacteristics {
        self.config.device_characteristics()
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.shutdown()
    }
}

impl<F: DriverFile> Drop for SdFile<F> {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        warn!(path = %self.path, "file dropped without close");
        if let Err(e) = self.shutdown() {
            warn!(path = %self.path, error = %e, "implicit close failed");
        }
    }
}
