//! Configuration parsing for blobpack
//!
//! This crate handles parsing and validation of blobpack.toml files and
//! layers them with environment and command-line overrides into a resolved
//! [`BundleConfig`].

pub mod merge;
pub mod toml;

// Re-export main types
pub use crate::merge::{BundleConfig, ConfigLayering, ConfigLoader, ConfigSource};
pub use crate::toml::{BlobpackToml, BundleSection};

use blobpack_core::error::BlobpackError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, BlobpackError>;
