//! Error types for SDVFS
//!
//! Every primitive operation reports its outcome to the immediate caller.
//! Nothing in this layer retries, and nothing panics on an I/O failure.
//! The variants carry rendered messages rather than `std::io::Error`
//! values so that a file session can hold on to its first write failure
//! and report it again at close.

use thiserror::Error;

/// Common result type for SDVFS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result codes understood by the database engine.
///
/// Primary codes occupy the low byte, extended I/O codes put a
/// sub-code in the second byte.
pub mod codes {
    pub const OK: i32 = 0;
    pub const ERROR: i32 = 1;
    pub const NOMEM: i32 = 7;
    pub const IOERR: i32 = 10;
    pub const NOTFOUND: i32 = 12;
    pub const CANTOPEN: i32 = 14;

    pub const IOERR_READ: i32 = IOERR | (1 << 8);
    pub const IOERR_SHORT_READ: i32 = IOERR | (2 << 8);
    pub const IOERR_WRITE: i32 = IOERR | (3 << 8);
    pub const IOERR_FSYNC: i32 = IOERR | (4 << 8);
    pub const IOERR_DIR_FSYNC: i32 = IOERR | (5 << 8);
    pub const IOERR_TRUNCATE: i32 = IOERR | (6 << 8);
    pub const IOERR_FSTAT: i32 = IOERR | (7 << 8);
    pub const IOERR_DELETE: i32 = IOERR | (10 << 8);
    pub const IOERR_CLOSE: i32 = IOERR | (16 << 8);
    pub const CANTOPEN_FULLPATH: i32 = CANTOPEN | (3 << 8);
}

/// Common error type for SDVFS
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("cannot open {path}: {reason}")]
    CannotOpen { path: String, reason: String },

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("read error: {0}")]
    ReadError(String),

    /// Fewer bytes than requested were available. The destination tail has
    /// been zero-filled. Not an I/O failure.
    #[error("short read: requested {requested} bytes, got {read}")]
    ShortRead { requested: usize, read: usize },

    #[error("write error: {0}")]
    WriteError(String),

    #[error("truncate failed: {0}")]
    TruncateFailed(String),

    #[error("fsync failed: {0}")]
    FsyncFailed(String),

    #[error("close failed: {0}")]
    CloseFailed(String),

    #[error("file size query failed: {0}")]
    FileSizeFailed(String),

    #[error("delete failed for {path}: {reason}")]
    DeleteFailed { path: String, reason: String },

    /// The file was removed but its directory could not be synced.
    #[error("directory sync failed for {path}: {reason}")]
    DirectorySyncFailed { path: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("path of {len} bytes exceeds the {max} byte limit")]
    PathTooLong { len: usize, max: usize },

    #[error("device metadata error: {0}")]
    DeviceMetadata(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a cannot-open error
    pub fn cannot_open(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::CannotOpen {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a read error
    pub fn read(msg: impl Into<String>) -> Self {
        Self::ReadError(msg.into())
    }

    /// Create a write error
    pub fn write(msg: impl Into<String>) -> Self {
        Self::WriteError(msg.into())
    }

    /// Create an unsupported-operation error
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }

    /// Create a device metadata error
    pub fn device_metadata(msg: impl Into<String>) -> Self {
        Self::DeviceMetadata(msg.into())
    }

    /// Short reads are an expected outcome near end-of-file.
    #[must_use]
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::ShortRead { .. })
    }

    /// A failed directory sync after a successful remove still counts
    /// as a completed delete.
    #[must_use]
    pub const fn is_fatal_to_delete(&self) -> bool {
        !matches!(self, Self::DirectorySyncFailed { .. })
    }

    /// Check if this error means data handed to a write did not persist
    #[must_use]
    pub const fn is_write_failure(&self) -> bool {
        matches!(self, Self::WriteError(_))
    }

    /// Get the engine result code for this error
    #[must_use]
    pub const fn result_code(&self) -> i32 {
        match self {
            Self::CannotOpen { .. } => codes::CANTOPEN,
            Self::PathTooLong { .. } => codes::CANTOPEN_FULLPATH,
            Self::OutOfMemory(_) => codes::NOMEM,
            Self::ReadError(_) => codes::IOERR_READ,
            Self::ShortRead { .. } => codes::IOERR_SHORT_READ,
            Self::WriteError(_) => codes::IOERR_WRITE,
            Self::TruncateFailed(_) => codes::IOERR_TRUNCATE,
            Self::FsyncFailed(_) => codes::IOERR_FSYNC,
            Self::CloseFailed(_) => codes::IOERR_CLOSE,
            Self::FileSizeFailed(_) => codes::IOERR_FSTAT,
            Self::DeleteFailed { .. } => codes::IOERR_DELETE,
            Self::DirectorySyncFailed { .. } => codes::IOERR_DIR_FSYNC,
            Self::NotFound(_) | Self::Unsupported(_) => codes::NOTFOUND,
            Self::DeviceMetadata(_) => codes::IOERR,
            Self::Configuration(_) => codes::ERROR,
        }
    }
}
