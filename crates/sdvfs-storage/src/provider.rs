//! Engine-facing VFS provider
//!
//! The provider creates file sessions, resolves and removes paths, and
//! exposes the clock and randomness the engine asks its VFS for.
//!
//! It holds only a weak reference to the filesystem: mounting and
//! unmounting the card belongs to the application, so once the driver
//! is gone opens fail instead of keeping it alive.

use crate::clock;
use crate::driver::{DriverFile, Filesystem, OpenMode};
use crate::file::{SdFile, VfsFile};
use chrono::Utc;
use rand::RngCore;
use sdvfs_common::{AccessMode, Error, MAX_PATHNAME, OpenFlags, Result, VFS_NAME, VfsConfig};
use std::io;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

/// Primitive operations the engine expects from a VFS
pub trait Vfs: Send + Sync {
    /// Get the name the provider registers under
    fn name(&self) -> &str;

    /// Get the longest pathname `full_pathname` may return
    fn max_pathname(&self) -> usize {
        MAX_PATHNAME
    }

    /// Open a file session, returning it with the effective open flags
    fn open(&self, path: &str, flags: OpenFlags) -> Result<(Box<dyn VfsFile>, OpenFlags)>;

    /// Remove a file, optionally syncing its directory afterwards
    fn delete(&self, path: &str, sync_dir: bool) -> Result<()>;

    /// Check if `path` exists or can be opened in `mode`
    fn access(&self, path: &str, mode: AccessMode) -> Result<bool>;

    /// Resolve `path` to an absolute pathname
    fn full_pathname(&self, path: &str) -> Result<String>;

    fn load_extension(&self, path: &str) -> Result<()> {
        Err(Error::unsupported(format!("loading extension {path}")))
    }

    /// Fill `buf` with random bytes and return the number written
    fn randomness(&self, buf: &mut [u8]) -> usize;

    /// Sleep for at least `duration`, returning the time actually slept
    fn sleep(&self, duration: Duration) -> Duration;

    /// Current time as a Julian day
    fn current_time(&self) -> f64;

    /// Current time as Julian day milliseconds
    fn current_time_millis(&self) -> i64;
}

/// Directory containing `path`, for syncing after a remove
fn parent_directory(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}

/// VFS provider backed by a storage driver
pub struct SdVfs<FS> {
    name: String,
    filesystem: Weak<FS>,
    config: Arc<VfsConfig>,
}

impl<FS> SdVfs<FS>
where
    FS: Filesystem + 'static,
    FS::File: 'static,
{
    /// Create a provider named [`VFS_NAME`]
    pub fn new(filesystem: &Arc<FS>, config: Arc<VfsConfig>) -> Self {
        Self {
            name: VFS_NAME.to_string(),
            filesystem: Arc::downgrade(filesystem),
            config,
        }
    }

    /// Register under a different name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub const fn config(&self) -> &Arc<VfsConfig> {
        &self.config
    }

    /// Open a session with its concrete type
    pub fn open_session(&self, path: &str, flags: OpenFlags) -> Result<SdFile<FS::File>> {
        let fs = self.filesystem().map_err(|e| Error::cannot_open(path, e))?;
        SdFile::open(&*fs, path, flags, Arc::clone(&self.config))
    }

    fn filesystem(&self) -> io::Result<Arc<FS>> {
        self.filesystem
            .upgrade()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "storage not mounted"))
    }

    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.config.report(e);
        }
        result
    }

    fn remove(&self, path: &str, sync_dir: bool) -> Result<()> {
        let delete_failed = |e: io::Error| Error::DeleteFailed {
            path: path.to_string(),
            reason: e.to_string(),
        };

        let fs = self.filesystem().map_err(delete_failed)?;
        fs.remove(path).map_err(delete_failed)?;
        debug!(path, "deleted file");

        if sync_dir {
            let dir = parent_directory(path);
            if let Err(e) = fs.sync_directory(dir) {
                warn!(path, dir, error = %e, "directory sync after delete failed");
                return Err(Error::DirectorySyncFailed {
                    path: dir.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    fn can_open(fs: &FS, path: &str, mode: OpenMode) -> bool {
        fs.exists(path) && fs.open(path, mode).and_then(DriverFile::close).is_ok()
    }
}

impl<FS> Vfs for SdVfs<FS>
where
    FS: Filesystem + 'static,
    FS::File: 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, path: &str, flags: OpenFlags) -> Result<(Box<dyn VfsFile>, OpenFlags)> {
        let file = self.report(self.open_session(path, flags))?;
        Ok((Box::new(file), flags))
    }

    fn delete(&self, path: &str, sync_dir: bool) -> Result<()> {
        self.report(self.remove(path, sync_dir))
    }

    fn access(&self, path: &str, mode: AccessMode) -> Result<bool> {
        let Ok(fs) = self.filesystem() else {
            debug!(path, %mode, "access check without mounted storage");
            return Ok(false);
        };

        let allowed = match mode {
            AccessMode::Exists => fs.exists(path),
            AccessMode::Read => Self::can_open(&fs, path, OpenMode::READ),
            AccessMode::ReadWrite => Self::can_open(&fs, path, OpenMode::READ_WRITE),
        };
        debug!(path, %mode, allowed, "access check");
        Ok(allowed)
    }

    fn full_pathname(&self, path: &str) -> Result<String> {
        let full = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}{path}", self.config.root_path())
        };

        if full.len() > MAX_PATHNAME {
            return self.report(Err(Error::PathTooLong {
                len: full.len(),
                max: MAX_PATHNAME,
            }));
        }
        Ok(full)
    }

    fn randomness(&self, buf: &mut [u8]) -> usize {
        rand::thread_rng().fill_bytes(buf);
        buf.len()
    }

    fn sleep(&self, duration: Duration) -> Duration {
        clock::sleep(duration)
    }

    fn current_time(&self) -> f64 {
        clock::julian_day(Utc::now())
    }

    fn current_time_millis(&self) -> i64 {
        clock::julian_day_millis(Utc::now())
    }
}

impl<FS> std::fmt::Debug for SdVfs<FS> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdVfs")
            .field("name", &self.name)
            .field("mounted", &(self.filesystem.strong_count() > 0))
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Fault, LocalFilesystem, MemoryFilesystem};
    use sdvfs_common::SyncFlags;
    use tempfile::tempdir;

    fn memory_vfs() -> (Arc<MemoryFilesystem>, SdVfs<MemoryFilesystem>) {
        let fs = Arc::new(MemoryFilesystem::new());
        let mut config = VfsConfig::new();
        config.set_root_path("/sd/db");
        let vfs = SdVfs::new(&fs, Arc::new(config));
        (fs, vfs)
    }

    #[test]
    fn test_full_pathname() {
        let (_fs, vfs) = memory_vfs();
        assert_eq!(vfs.full_pathname("app.db").unwrap(), "/sd/db/app.db");
        assert_eq!(vfs.full_pathname("/abs/app.db").unwrap(), "/abs/app.db");
        assert_eq!(vfs.full_pathname("../up.db").unwrap(), "/sd/db/../up.db");

        let long = "x".repeat(MAX_PATHNAME);
        let err = vfs.full_pathname(&long).unwrap_err();
        assert!(matches!(err, Error::PathTooLong { max: MAX_PATHNAME, .. }));

        let exact = format!("/{}", "y".repeat(MAX_PATHNAME - 1));
        assert_eq!(vfs.full_pathname(&exact).unwrap().len(), MAX_PATHNAME);
    }

    #[test]
    fn test_open_write_and_reopen() {
        let (fs, vfs) = memory_vfs();
        let path = vfs.full_pathname("app.db").unwrap();
        let flags = OpenFlags::READWRITE | OpenFlags::CREATE | OpenFlags::MAIN_DB;

        let (mut file, out) = vfs.open(&path, flags).unwrap();
        assert_eq!(out, flags);
        file.write(b"header", 0).unwrap();
        file.sync(SyncFlags::FULL).unwrap();
        file.close().unwrap();

        let (mut file, _) = vfs.open(&path, OpenFlags::READONLY | OpenFlags::MAIN_DB).unwrap();
        let mut buf = [0u8; 6];
        file.read(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"header");
        file.close().unwrap();

        assert_eq!(fs.open_handles(), 0);
    }

    #[test]
    fn test_open_after_unmount_fails() {
        let (fs, vfs) = memory_vfs();
        drop(fs);
        let Err(err) = vfs.open("/sd/db/app.db", OpenFlags::READWRITE | OpenFlags::CREATE) else {
            panic!("open succeeded without mounted storage");
        };
        assert!(matches!(err, Error::CannotOpen { .. }));
        assert!(!vfs.access("/sd/db/app.db", AccessMode::Exists).unwrap());
    }

    #[test]
    fn test_access_modes() {
        let (fs, vfs) = memory_vfs();
        fs.insert("/sd/db/app.db", b"x");

        assert!(vfs.access("/sd/db/app.db", AccessMode::Exists).unwrap());
        assert!(vfs.access("/sd/db/app.db", AccessMode::Read).unwrap());
        assert!(vfs.access("/sd/db/app.db", AccessMode::ReadWrite).unwrap());
        assert!(!vfs.access("/sd/db/missing.db", AccessMode::Exists).unwrap());
        assert!(!vfs.access("/sd/db/missing.db", AccessMode::ReadWrite).unwrap());

        fs.inject(Fault::Open, true);
        assert!(vfs.access("/sd/db/app.db", AccessMode::Exists).unwrap());
        assert!(!vfs.access("/sd/db/app.db", AccessMode::Read).unwrap());
        assert_eq!(fs.open_handles(), 0);
    }

    #[test]
    fn test_delete() {
        let (fs, vfs) = memory_vfs();
        fs.insert("/sd/db/app.db-journal", b"j");

        vfs.delete("/sd/db/app.db-journal", true).unwrap();
        assert!(!fs.exists("/sd/db/app.db-journal"));

        let err = vfs.delete("/sd/db/app.db-journal", false).unwrap_err();
        assert!(matches!(err, Error::DeleteFailed { .. }));
        assert!(err.is_fatal_to_delete());
    }

    #[test]
    fn test_delete_directory_sync_failure_is_distinct() {
        let (fs, vfs) = memory_vfs();
        fs.insert("/sd/db/app.db-wal", b"w");
        fs.inject(Fault::DirectorySync, true);

        let err = vfs.delete("/sd/db/app.db-wal", true).unwrap_err();
        assert_eq!(
            err,
            Error::DirectorySyncFailed {
                path: "/sd/db".to_string(),
                reason: "injected DirectorySync fault".to_string(),
            }
        );
        assert!(!err.is_fatal_to_delete());
        assert!(!fs.exists("/sd/db/app.db-wal"));

        fs.insert("/sd/db/app.db-wal", b"w");
        vfs.delete("/sd/db/app.db-wal", false).unwrap();
    }

    #[test]
    fn test_parent_directory() {
        assert_eq!(parent_directory("/sd/db/app.db"), "/sd/db");
        assert_eq!(parent_directory("/app.db"), "/");
        assert_eq!(parent_directory("app.db"), ".");
    }

    #[test]
    fn test_utility_calls() {
        let (_fs, vfs) = memory_vfs();
        assert_eq!(vfs.name(), VFS_NAME);
        assert_eq!(vfs.max_pathname(), MAX_PATHNAME);
        assert!(vfs.load_extension("/sd/ext.so").is_err());

        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        assert_eq!(vfs.randomness(&mut a), 32);
        vfs.randomness(&mut b);
        assert_ne!(a, b);

        // Any time after 2020-01-01 (JD 2458849.5)
        assert!(vfs.current_time() > 2_458_849.5);
        assert!(vfs.current_time_millis() > 212_380_000_000_000);
    }

    #[test]
    fn test_with_name() {
        let (_fs, vfs) = memory_vfs();
        let vfs = vfs.with_name("sdvfs-secondary");
        assert_eq!(vfs.name(), "sdvfs-secondary");
    }

    #[test]
    fn test_local_filesystem_session() {
        let dir = tempdir().unwrap();
        let fs = Arc::new(LocalFilesystem::new(dir.path()));
        let vfs = SdVfs::new(&fs, Arc::new(VfsConfig::new()));
        let path = vfs.full_pathname("local.db-journal").unwrap();
        assert_eq!(path, "/local.db-journal");

        let flags = OpenFlags::READWRITE | OpenFlags::CREATE | OpenFlags::MAIN_JOURNAL;
        let mut file = vfs.open_session(&path, flags).unwrap();
        assert!(file.is_buffered());
        file.write(&[3u8; 600], 0).unwrap();
        file.write(&[4u8; 600], 600).unwrap();
        assert_eq!(file.file_size().unwrap(), 1200);
        Box::new(file).close().unwrap();

        assert_eq!(std::fs::read(dir.path().join("local.db-journal")).unwrap().len(), 1200);
        assert!(vfs.access(&path, AccessMode::ReadWrite).unwrap());
        vfs.delete(&path, true).unwrap();
        assert!(!vfs.access(&path, AccessMode::Exists).unwrap());
    }
}
