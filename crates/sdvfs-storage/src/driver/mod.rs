//! Storage driver interface
//!
//! The adapter never talks to an operating system file API directly. It
//! consumes a minimal filesystem driver through these traits:
//! - [`Filesystem`]: open / exists / remove, plus an optional directory sync
//! - [`DriverFile`]: positioned byte I/O on one open handle
//! - [`DeviceMetadata`]: raw card registers used to size sectors
//!
//! Backends:
//! - [`LocalFilesystem`]: `std::fs` rooted at a mount directory
//! - [`MemoryFilesystem`]: RAM-backed, records physical writes, injects faults
//! - [`SysfsCsd`]: CSD register exported by the Linux MMC subsystem

pub mod local;
pub mod memory;
pub mod sysfs;

pub use local::{LocalFile, LocalFilesystem};
pub use memory::{Fault, MemoryFile, MemoryFilesystem, PhysicalWrite};
pub use sysfs::SysfsCsd;

use sdvfs_common::OpenFlags;
use std::io;

/// Length of the SD card CSD register in bytes
pub const CSD_LEN: usize = 16;

/// How a driver-level file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    /// Allow writes through the handle
    pub write: bool,
    /// Create the file when it does not exist (requires `write`)
    pub create: bool,
}

impl OpenMode {
    pub const READ: Self = Self {
        write: false,
        create: false,
    };

    pub const READ_WRITE: Self = Self {
        write: true,
        create: false,
    };

    pub const READ_WRITE_CREATE: Self = Self {
        write: true,
        create: true,
    };

    /// Derive the driver mode from engine open flags
    #[must_use]
    pub const fn from_flags(flags: OpenFlags) -> Self {
        if flags.is_read_only() {
            Self::READ
        } else if flags.contains(OpenFlags::CREATE) {
            Self::READ_WRITE_CREATE
        } else {
            Self::READ_WRITE
        }
    }
}

/// One open handle of the underlying filesystem driver
pub trait DriverFile: Send {
    /// Read at the current position; `Ok(0)` means end of file
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write at the current position, returning the bytes transferred
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Move the position to an absolute offset
    fn seek(&mut self, offset: u64) -> io::Result<()>;

    /// Push driver-cached data to the medium
    fn flush(&mut self) -> io::Result<()>;

    /// Current file length in bytes
    fn size(&mut self) -> io::Result<u64>;

    /// Set the file length
    fn truncate(&mut self, size: u64) -> io::Result<()>;

    /// Release the handle
    fn close(self) -> io::Result<()>
    where
        Self: Sized;
}

/// Minimal filesystem driver
pub trait Filesystem: Send + Sync {
    type File: DriverFile;

    /// Open or create a file
    fn open(&self, path: &str, mode: OpenMode) -> io::Result<Self::File>;

    /// Check if a file exists
    fn exists(&self, path: &str) -> bool;

    /// Remove a file
    fn remove(&self, path: &str) -> io::Result<()>;

    /// Make a directory's entry changes durable.
    ///
    /// Drivers without directory metadata to sync keep the default.
    fn sync_directory(&self, _path: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Source of raw storage-card metadata
pub trait DeviceMetadata {
    /// Read the 128-bit CSD register, most significant byte first
    fn read_csd(&mut self) -> io::Result<[u8; CSD_LEN]>;
}
