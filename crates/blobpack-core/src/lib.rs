//! # blobpack-core
//!
//! Core types and utilities shared across all blobpack crates.
//!
//! This crate provides:
//! - BlobpackError enum for unified error handling
//! - Path utilities for turning resource paths into stable index keys
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `error`: Error types and result aliases
//! - `utils`: Utility functions and helpers

pub mod error;
pub mod utils;

// Re-export commonly used types
pub use error::{BlobpackError, BlobpackResult};
