//! Configuration for SDVFS
//!
//! `VfsConfig` is built once at startup, optionally from a TOML file,
//! and then shared read-only (behind an `Arc`) by the provider and every
//! open file. Sector size and device characteristics must not change while
//! files are open, which the shared, immutable handle enforces.

use crate::error::{Error, Result};
use crate::types::DeviceCharacteristics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Diagnostic log callback receiving `(result code, message)`
pub type LogSink = Arc<dyn Fn(i32, &str) + Send + Sync>;

/// Process-wide adapter configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct VfsConfig {
    /// Directory prefix applied to relative paths (always ends with '/')
    #[serde(default = "default_root_path")]
    root_path: String,
    /// Sector size reported to the engine (0 = engine default)
    #[serde(default)]
    sector_size: u32,
    /// Capability flags reported to the engine
    #[serde(default)]
    device_characteristics: DeviceCharacteristics,
    /// Attach a coalescing write buffer to journal files
    #[serde(default = "default_journal_buffering")]
    journal_buffering: bool,
    #[serde(skip)]
    log_sink: Option<LogSink>,
}

fn default_root_path() -> String {
    "/".to_string()
}

const fn default_journal_buffering() -> bool {
    true
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            sector_size: 0,
            device_characteristics: DeviceCharacteristics::empty(),
            journal_buffering: default_journal_buffering(),
            log_sink: None,
        }
    }
}

impl fmt::Debug for VfsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VfsConfig")
            .field("root_path", &self.root_path)
            .field("sector_size", &self.sector_size)
            .field("device_characteristics", &self.device_characteristics)
            .field("journal_buffering", &self.journal_buffering)
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

impl VfsConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(text).map_err(|e| Error::Configuration(e.to_string()))?;
        let root = std::mem::take(&mut config.root_path);
        config.set_root_path(root);
        Ok(config)
    }

    /// Get the root path prefix
    #[must_use]
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Set the root path prefix; a trailing '/' is added when missing
    pub fn set_root_path(&mut self, root: impl Into<String>) {
        let mut root = root.into();
        if !root.ends_with('/') {
            root.push('/');
        }
        self.root_path = root;
    }

    /// Get the configured sector size
    #[must_use]
    pub const fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Set the sector size reported to the engine
    pub const fn set_sector_size(&mut self, size: u32) {
        self.sector_size = size;
    }

    /// Reset the sector size so the engine uses its own default
    pub const fn reset_sector_size(&mut self) {
        self.sector_size = 0;
    }

    /// Get the configured device characteristics
    #[must_use]
    pub const fn device_characteristics(&self) -> DeviceCharacteristics {
        self.device_characteristics
    }

    /// Replace the device characteristics reported to the engine
    pub const fn set_device_characteristics(&mut self, caps: DeviceCharacteristics) {
        self.device_characteristics = caps;
    }

    /// Clear all device characteristics
    pub const fn reset_device_characteristics(&mut self) {
        self.device_characteristics = DeviceCharacteristics::empty();
    }

    /// Check if journal files get a write buffer
    #[must_use]
    pub const fn journal_buffering(&self) -> bool {
        self.journal_buffering
    }

    /// Enable or disable journal write buffering
    pub const fn set_journal_buffering(&mut self, enabled: bool) {
        self.journal_buffering = enabled;
    }

    /// Install the diagnostic log callback
    pub fn set_log_sink<F>(&mut self, sink: F)
    where
        F: Fn(i32, &str) + Send + Sync + 'static,
    {
        self.log_sink = Some(Arc::new(sink));
    }

    /// Remove the diagnostic log callback
    pub fn clear_log_sink(&mut self) {
        self.log_sink = None;
    }

    /// Send a diagnostic message to the log sink, or to tracing if none is set
    pub fn log(&self, code: i32, message: &str) {
        match &self.log_sink {
            Some(sink) => sink(code, message),
            None => tracing::warn!(code, "{}", message),
        }
    }

    /// Report an error through the diagnostic log
    pub fn report(&self, err: &Error) {
        self.log(err.result_code(), &err.to_string());
    }
}
