//! RAM-backed filesystem
//!
//! Every physical write that reaches a file is recorded so callers can
//! observe how the adapter batches I/O. Individual driver primitives can
//! be made to fail with [`MemoryFilesystem::inject`].

use super::{DriverFile, Filesystem, OpenMode};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Driver primitive that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Open,
    Read,
    Write,
    /// Writes transfer only half of the requested bytes
    ShortWrite,
    Seek,
    Flush,
    Size,
    Truncate,
    Remove,
    DirectorySync,
}

/// One write call as seen by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalWrite {
    pub offset: u64,
    pub len: usize,
}

#[derive(Debug, Default)]
struct Node {
    data: Vec<u8>,
    writes: Vec<PhysicalWrite>,
    flushes: u64,
}

#[derive(Debug, Default)]
struct Shared {
    faults: Mutex<HashSet<Fault>>,
    open_handles: AtomicUsize,
}

impl Shared {
    fn check(&self, fault: Fault) -> io::Result<()> {
        if self.faults.lock().contains(&fault) {
            Err(io::Error::other(format!("injected {fault:?} fault")))
        } else {
            Ok(())
        }
    }

    fn is_set(&self, fault: Fault) -> bool {
        self.faults.lock().contains(&fault)
    }
}

/// In-memory filesystem
#[derive(Debug, Default)]
pub struct MemoryFilesystem {
    files: Mutex<HashMap<String, Arc<Mutex<Node>>>>,
    shared: Arc<Shared>,
}

impl MemoryFilesystem {
    /// Create an empty filesystem
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable a fault
    pub fn inject(&self, fault: Fault, enabled: bool) {
        let mut faults = self.shared.faults.lock();
        if enabled {
            faults.insert(fault);
        } else {
            faults.remove(&fault);
        }
    }

    /// Create or replace a file with the given contents
    pub fn insert(&self, path: &str, data: &[u8]) {
        let node = Node {
            data: data.to_vec(),
            ..Node::default()
        };
        self.files
            .lock()
            .insert(path.to_string(), Arc::new(Mutex::new(node)));
    }

    /// Get a copy of a file's contents
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.node(path).map(|n| n.lock().data.clone())
    }

    /// Get the physical writes issued to a file, in order
    pub fn writes(&self, path: &str) -> Vec<PhysicalWrite> {
        self.node(path)
            .map(|n| n.lock().writes.clone())
            .unwrap_or_default()
    }

    /// Forget the recorded writes of a file
    pub fn clear_writes(&self, path: &str) {
        if let Some(node) = self.node(path) {
            node.lock().writes.clear();
        }
    }

    /// Get the number of driver flushes issued to a file
    pub fn flush_count(&self, path: &str) -> u64 {
        self.node(path).map_or(0, |n| n.lock().flushes)
    }

    /// Get the number of handles opened but not yet closed
    pub fn open_handles(&self) -> usize {
        self.shared.open_handles.load(Ordering::SeqCst)
    }

    fn node(&self, path: &str) -> Option<Arc<Mutex<Node>>> {
        self.files.lock().get(path).cloned()
    }
}

impl Filesystem for MemoryFilesystem {
    type File = MemoryFile;

    fn open(&self, path: &str, mode: OpenMode) -> io::Result<MemoryFile> {
        self.shared.check(Fault::Open)?;

        let node = {
            let mut files = self.files.lock();
            match files.get(path) {
                Some(node) => Arc::clone(node),
                None if mode.write && mode.create => {
                    let node = Arc::new(Mutex::new(Node::default()));
                    files.insert(path.to_string(), Arc::clone(&node));
                    node
                }
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("{path} does not exist"),
                    ));
                }
            }
        };

        self.shared.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryFile {
            node,
            position: 0,
            writable: mode.write,
            shared: Arc::clone(&self.shared),
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.files.lock().contains_key(path)
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        self.shared.check(Fault::Remove)?;
        self.files.lock().remove(path).map(|_| ()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{path} does not exist"))
        })
    }

    fn sync_directory(&self, _path: &str) -> io::Result<()> {
        self.shared.check(Fault::DirectorySync)
    }
}

/// Handle on a [`MemoryFilesystem`] file
#[derive(Debug)]
pub struct MemoryFile {
    node: Arc<Mutex<Node>>,
    position: u64,
    writable: bool,
    shared: Arc<Shared>,
}

fn to_index(offset: u64) -> io::Result<usize> {
    usize::try_from(offset).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("offset {offset} exceeds addressable memory"),
        )
    })
}

impl DriverFile for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.shared.check(Fault::Read)?;

        let node = self.node.lock();
        let start = to_index(self.position)?;
        if start >= node.data.len() {
            return Ok(0);
        }

        let n = buf.len().min(node.data.len() - start);
        buf[..n].copy_from_slice(&node.data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.shared.check(Fault::Write)?;
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file opened read-only",
            ));
        }

        let len = if self.shared.is_set(Fault::ShortWrite) {
            buf.len() / 2
        } else {
            buf.len()
        };

        let mut node = self.node.lock();
        let start = to_index(self.position)?;
        let end = start + len;
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[start..end].copy_from_slice(&buf[..len]);
        node.writes.push(PhysicalWrite {
            offset: self.position,
            len,
        });
        self.position += len as u64;
        Ok(len)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.shared.check(Fault::Seek)?;
        self.position = offset;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.shared.check(Fault::Flush)?;
        self.node.lock().flushes += 1;
        Ok(())
    }

    fn size(&mut self) -> io::Result<u64> {
        self.shared.check(Fault::Size)?;
        Ok(self.node.lock().data.len() as u64)
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.shared.check(Fault::Truncate)?;
        let size = to_index(size)?;
        self.node.lock().data.resize(size, 0);
        Ok(())
    }

    fn close(self) -> io::Result<()> {
        self.shared.open_handles.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
