//! SDVFS Common - Shared types and utilities
//!
//! This crate provides the error taxonomy, the configuration object and the
//! engine-facing flag types used by the SDVFS storage adapter.

pub mod config;
pub mod error;
pub mod types;

pub use config::{LogSink, VfsConfig};
pub use error::{Error, Result, codes};
pub use types::*;
