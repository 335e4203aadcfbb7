//! Utility functions and helpers.
//!
//! Common functionality used across multiple blobpack crates.

pub mod path;

// Re-export commonly used utilities
pub use path::{get_extension, normalize_path, relative_key};
