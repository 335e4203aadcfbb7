//! Blob assembly for blobpack
//!
//! This crate packs a set of resources (files or in-memory buffers) into a
//! single contiguous blob plus an index mapping each resource's relative
//! path to its `[start, length]` range. Lengths are resolved up front so the
//! index is complete before any blob byte is produced; the bytes themselves
//! are read lazily while the blob stream is drained.

pub mod bundler;
pub mod container;
pub mod index;
pub mod resource;
pub mod source;
pub mod stream;
pub mod transform;

// Re-export main types
pub use bundler::Bundler;
pub use container::{write_container, ContainerReader};
pub use index::{BundleIndex, IndexBuilder, IndexEntry};
pub use resource::{Resource, ResourceKind};
pub use source::{ByteSource, SourceFactory};
pub use stream::{BlobStream, StreamAssembler};
pub use transform::{
    ContentTransform, JsonMinifier, ResourceMinifier, ScriptMinifier, TransformError,
};

use blobpack_core::error::BlobpackError;

/// Result type for bundle operations
pub type BundleResult<T> = Result<T, BlobpackError>;
