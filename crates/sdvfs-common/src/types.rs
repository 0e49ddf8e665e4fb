//! Core type definitions for SDVFS
//!
//! Flag sets and enums exchanged with the database engine. Bit values
//! follow the engine's open/sync/capability constants so they can be
//! passed through unchanged.

use bitflags::bitflags;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Name under which the default provider registers itself
pub const VFS_NAME: &str = "sdvfs";

/// Maximum pathname length in bytes
pub const MAX_PATHNAME: usize = 512;

/// Baseline sector size of SD media
pub const BASE_SECTOR_SIZE: u64 = 512;

bitflags! {
    /// Flags passed to `open`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u32 {
        const READONLY = 0x0000_0001;
        const READWRITE = 0x0000_0002;
        const CREATE = 0x0000_0004;
        const DELETEONCLOSE = 0x0000_0008;
        const EXCLUSIVE = 0x0000_0010;
        const MAIN_DB = 0x0000_0100;
        const TEMP_DB = 0x0000_0200;
        const TRANSIENT_DB = 0x0000_0400;
        const MAIN_JOURNAL = 0x0000_0800;
        const TEMP_JOURNAL = 0x0000_1000;
        const SUBJOURNAL = 0x0000_2000;
        const SUPER_JOURNAL = 0x0000_4000;
        const WAL = 0x0008_0000;
    }
}

impl OpenFlags {
    /// Sequentially appended log files that benefit from write coalescing
    pub const JOURNAL_KINDS: Self = Self::MAIN_JOURNAL.union(Self::WAL);

    /// Check if the file is a journal or write-ahead log
    #[must_use]
    pub const fn is_journal(self) -> bool {
        self.intersects(Self::JOURNAL_KINDS)
    }

    /// Check if the file must be opened read-only
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        self.contains(Self::READONLY)
    }
}

bitflags! {
    /// Capability flags describing guarantees of the storage medium
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DeviceCharacteristics: u32 {
        const ATOMIC = 0x0000_0001;
        const ATOMIC512 = 0x0000_0002;
        const ATOMIC1K = 0x0000_0004;
        const ATOMIC2K = 0x0000_0008;
        const ATOMIC4K = 0x0000_0010;
        const ATOMIC8K = 0x0000_0020;
        const ATOMIC16K = 0x0000_0040;
        const ATOMIC32K = 0x0000_0080;
        const ATOMIC64K = 0x0000_0100;
        const SAFE_APPEND = 0x0000_0200;
        const SEQUENTIAL = 0x0000_0400;
        const UNDELETABLE_WHEN_OPEN = 0x0000_0800;
        const POWERSAFE_OVERWRITE = 0x0000_1000;
        const IMMUTABLE = 0x0000_2000;
        const BATCH_ATOMIC = 0x0000_4000;
    }
}

bitflags! {
    /// Flags passed to `sync`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SyncFlags: u32 {
        const NORMAL = 0x0000_0002;
        const FULL = 0x0000_0003;
        const DATAONLY = 0x0000_0010;
    }
}

/// Query kind for `access`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[repr(i32)]
pub enum AccessMode {
    #[display("exists")]
    Exists = 0,
    #[display("read-write")]
    ReadWrite = 1,
    #[display("read")]
    Read = 2,
}

/// Lock levels requested by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Display)]
#[repr(i32)]
pub enum LockLevel {
    #[default]
    #[display("none")]
    None = 0,
    #[display("shared")]
    Shared = 1,
    #[display("reserved")]
    Reserved = 2,
    #[display("pending")]
    Pending = 3,
    #[display("exclusive")]
    Exclusive = 4,
}
