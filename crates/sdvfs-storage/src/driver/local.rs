//! `std::fs` backend
//!
//! Stands in for the card's FAT/exFAT driver on a host machine. Engine
//! paths are '/'-separated and resolved below a mount directory, so
//! `/db/app.db` on a filesystem mounted at `/mnt/sd` maps to
//! `/mnt/sd/db/app.db`.

use super::{DriverFile, Filesystem, OpenMode};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Filesystem rooted at a host directory
#[derive(Debug, Clone)]
pub struct LocalFilesystem {
    mount: PathBuf,
}

impl LocalFilesystem {
    /// Create a filesystem rooted at `mount`
    pub fn new(mount: impl AsRef<Path>) -> Self {
        Self {
            mount: mount.as_ref().to_path_buf(),
        }
    }

    /// Get the mount directory
    pub fn mount(&self) -> &Path {
        &self.mount
    }

    /// Map an engine path onto the host filesystem
    pub fn resolve(&self, path: &str) -> PathBuf {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            self.mount.clone()
        } else {
            self.mount.join(relative)
        }
    }
}

impl Filesystem for LocalFilesystem {
    type File = LocalFile;

    fn open(&self, path: &str, mode: OpenMode) -> io::Result<LocalFile> {
        let host_path = self.resolve(path);

        let mut options = OpenOptions::new();
        options.read(true);
        if mode.write {
            options.write(true).create(mode.create);
        }

        let file = options.open(&host_path)?;
        Ok(LocalFile {
            file,
            path: host_path,
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        std::fs::remove_file(self.resolve(path))
    }

    fn sync_directory(&self, path: &str) -> io::Result<()> {
        File::open(self.resolve(path))?.sync_all()
    }
}

/// Open host file
#[derive(Debug)]
pub struct LocalFile {
    file: File,
    path: PathBuf,
}

impl LocalFile {
    /// Get the host path of this file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DriverFile for LocalFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset)).map(|_| ())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    fn size(&mut self) -> io::Result<u64> {
        self.file.metadata().map(|m| m.len())
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.file.set_len(size)
    }

    fn close(self) -> io::Result<()> {
        drop(self.file);
        Ok(())
    }
}
