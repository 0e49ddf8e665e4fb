//! CSD register exported by the Linux MMC subsystem
//!
//! The kernel publishes the card's CSD as 32 hex digits in
//! `/sys/block/<device>/device/csd`.

use super::{CSD_LEN, DeviceMetadata};
use std::io;
use std::path::{Path, PathBuf};

/// Reads the CSD register of an MMC/SD block device from sysfs
#[derive(Debug, Clone)]
pub struct SysfsCsd {
    path: PathBuf,
}

impl SysfsCsd {
    /// Read from an explicit sysfs attribute file
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read the CSD of a block device such as `mmcblk0`
    pub fn for_block_device(device: &str) -> Self {
        Self::new(Path::new("/sys/block").join(device).join("device/csd"))
    }

    /// Get the attribute path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the sysfs hex representation
    pub fn parse(text: &str) -> io::Result<[u8; CSD_LEN]> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad CSD hex: {e}")))?;

        bytes.try_into().map_err(|bytes: Vec<u8>| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("CSD is {} bytes, expected {CSD_LEN}", bytes.len()),
            )
        })
    }
}

impl DeviceMetadata for SysfsCsd {
    fn read_csd(&mut self) -> io::Result<[u8; CSD_LEN]> {
        let text = std::fs::read_to_string(&self.path)?;
        Self::parse(&text)
    }
}
