//! SDVFS Storage - SD card VFS for an embedded database engine
//!
//! This crate sits between the engine's file primitives and a minimal
//! filesystem driver:
//! - [`driver`]: traits the adapter consumes, plus host, in-memory and sysfs backends
//! - [`buffer`]: write coalescing for journal files
//! - [`media`]: sector size and atomic-write detection from the card's CSD
//! - [`file`]: open-file sessions
//! - [`provider`]: the engine-facing provider
//! - [`registry`]: named provider lookup and default selection
//!
//! # Example
//!
//! ```no_run
//! use sdvfs_common::{OpenFlags, SyncFlags, VfsConfig};
//! use sdvfs_storage::driver::{LocalFilesystem, SysfsCsd};
//! use sdvfs_storage::{Vfs, VfsFile, VfsRegistry, install, media};
//! use std::sync::Arc;
//!
//! # fn main() -> sdvfs_common::Result<()> {
//! let mut config = VfsConfig::new();
//! config.set_root_path("/db");
//! if media::configure_sector_size(&mut config, &mut SysfsCsd::for_block_device("mmcblk0")).is_ok() {
//!     media::apply_single_sector_atomic(&mut config);
//! }
//!
//! let fs = Arc::new(LocalFilesystem::new("/mnt/sd"));
//! let registry = VfsRegistry::new();
//! let vfs = install(&registry, &fs, Arc::new(config));
//!
//! let path = vfs.full_pathname("app.db-journal")?;
//! let (mut journal, _) = vfs.open(&path, OpenFlags::READWRITE | OpenFlags::CREATE | OpenFlags::MAIN_JOURNAL)?;
//! journal.write(&[0u8; 512], 0)?;
//! journal.sync(SyncFlags::NORMAL)?;
//! journal.close()?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod clock;
pub mod driver;
pub mod file;
pub mod media;
pub mod provider;
pub mod registry;

pub use buffer::{BufferStats, JOURNAL_BUFFER_SIZE, WriteBuffer};
pub use file::{SdFile, VfsFile};
pub use media::{MediaCharacteristics, apply_single_sector_atomic, configure_sector_size, decode_sector_size};
pub use provider::{SdVfs, Vfs};
pub use registry::{VfsRegistry, install};
