//! Registration orchestrator
//!
//! [`Bundler`] resolves each resource's length up front (inline bytes, a
//! transform result, or a file size), commits it to the index, and queues a
//! lazy source so the blob can be streamed after the index is complete.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blobpack_core::error::BlobpackError;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::index::{BundleIndex, IndexBuilder, IndexEntry};
use crate::resource::{Resource, ResourceKind};
use crate::source::{file_factory, memory_factory};
use crate::stream::{BlobStream, StreamAssembler};
use crate::transform::ContentTransform;
use crate::BundleResult;

#[cfg(test)]
mod tests;

/// Length-resolved resource, ready to be committed
enum Resolved {
    Inline(Vec<u8>),
    File(u64),
}

/// One blob-assembly session.
pub struct Bundler {
    index: IndexBuilder,
    stream: StreamAssembler,
    transform: Option<Arc<dyn ContentTransform>>,
    registrations: usize,
}

impl Bundler {
    /// Start a session whose index keys are relative to `base_dir`
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            index: IndexBuilder::new(base_dir),
            stream: StreamAssembler::new(),
            transform: None,
            registrations: 0,
        }
    }

    /// Enable a content transform for eligible files
    pub fn with_transform(mut self, transform: Arc<dyn ContentTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Directory index keys are relative to
    pub fn base_dir(&self) -> &Path {
        self.index.base_dir()
    }

    /// Whether a transform is configured
    pub fn transform_enabled(&self) -> bool {
        self.transform.is_some()
    }

    /// Register a resource and return the byte range it was given.
    ///
    /// Relative paths are resolved against the base directory. On error
    /// nothing is registered.
    pub async fn add_resource(&mut self, resource: Resource) -> BundleResult<IndexEntry> {
        let (path, content) = resource.into_parts();
        let path = self.absolute(path);
        let resolved = resolve(&path, content, self.transform.clone()).await?;
        Ok(self.commit(path, resolved))
    }

    /// Register a file whose bytes are read at drain time
    pub async fn add_file<P: Into<PathBuf>>(&mut self, path: P) -> BundleResult<IndexEntry> {
        self.add_resource(Resource::file(path)).await
    }

    /// Register in-memory content under `path`
    pub async fn add_inline<P, C>(&mut self, path: P, content: C) -> BundleResult<IndexEntry>
    where
        P: Into<PathBuf>,
        C: Into<Vec<u8>>,
    {
        self.add_resource(Resource::inline(path, content)).await
    }

    /// Register many files, resolving their lengths concurrently.
    ///
    /// Registrations are committed in the order `paths` yields them, and only
    /// once every length has resolved; any failure registers none of them.
    pub async fn add_files<I, P>(&mut self, paths: I) -> BundleResult<Vec<IndexEntry>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut tasks = JoinSet::new();
        let mut count = 0;
        for (position, path) in paths.into_iter().enumerate() {
            let path = self.absolute(path.into());
            let transform = self.transform.clone();
            tasks.spawn(async move {
                let resolved = resolve(&path, None, transform).await;
                (position, path, resolved)
            });
            count += 1;
        }

        let mut slots: Vec<Option<(PathBuf, Resolved)>> = (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (position, path, resolved) = joined.map_err(|e| {
                BlobpackError::io(
                    "Length resolution task failed".to_string(),
                    io::Error::new(io::ErrorKind::Other, e),
                )
            })?;
            slots[position] = Some((path, resolved?));
        }

        Ok(slots
            .into_iter()
            .flatten()
            .map(|(path, resolved)| self.commit(path, resolved))
            .collect())
    }

    /// Total blob length registered so far
    pub fn blob_size(&self) -> u64 {
        self.index.blob_size()
    }

    /// Number of registrations, counting overwritten keys
    pub fn len(&self) -> usize {
        self.registrations
    }

    /// Check if nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.registrations == 0
    }

    /// Snapshot of the index
    pub fn index(&self) -> BundleIndex {
        self.index.snapshot()
    }

    /// Index serialized as JSON
    pub fn to_json(&self) -> BundleResult<String> {
        self.index.snapshot().to_json()
    }

    /// Eager concatenation is not offered; drain the stream instead.
    pub fn concat(&self) -> BundleResult<Vec<u8>> {
        Err(BlobpackError::Unsupported {
            operation: "concat",
            reason: "bundles are only produced as streams; use into_stream or write_to",
        })
    }

    /// Consume the session into its blob stream
    pub fn into_stream(self) -> BlobStream {
        info!(
            "Draining blob: {} resources, {} bytes",
            self.registrations,
            self.blob_size()
        );
        self.stream.drain()
    }

    /// Consume the session into its final index and blob stream
    pub fn finish(self) -> (BundleIndex, BlobStream) {
        let index = self.index.snapshot();
        (index, self.into_stream())
    }

    /// Drain the blob into `writer`, returning the number of bytes written
    pub async fn write_to<W>(self, writer: &mut W) -> BundleResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let expected = self.blob_size();
        let mut stream = self.into_stream();

        let written = tokio::io::copy(&mut stream, writer)
            .await
            .map_err(|e| BlobpackError::from_stream_error("Failed to write blob".to_string(), e))?;
        writer
            .flush()
            .await
            .map_err(|e| BlobpackError::io("Failed to flush blob".to_string(), e))?;

        if written != expected {
            return Err(BlobpackError::LengthMismatch {
                key: "<blob>".to_string(),
                expected,
                actual: written,
            });
        }

        Ok(written)
    }

    fn absolute(&self, path: PathBuf) -> PathBuf {
        if path.is_relative() {
            self.index.base_dir().join(path)
        } else {
            path
        }
    }

    fn commit(&mut self, path: PathBuf, resolved: Resolved) -> IndexEntry {
        let key = self.index.key_for(&path);
        let entry = match resolved {
            Resolved::Inline(content) => {
                let entry = self.index.register(key.clone(), content.len() as u64);
                self.stream.append(key.clone(), entry.length, memory_factory(content));
                entry
            },
            Resolved::File(length) => {
                let entry = self.index.register(key.clone(), length);
                self.stream.append(key.clone(), entry.length, file_factory(path));
                entry
            },
        };
        self.registrations += 1;

        debug!("Registered {} at {}+{}", key, entry.start, entry.length);
        entry
    }
}

impl fmt::Debug for Bundler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundler")
            .field("index", &self.index)
            .field("stream", &self.stream)
            .field("transform", &self.transform.as_ref().map(|t| t.name().to_string()))
            .field("registrations", &self.registrations)
            .finish()
    }
}

/// Work out how many bytes `path` will contribute to the blob.
async fn resolve(
    path: &Path,
    content: Option<Vec<u8>>,
    transform: Option<Arc<dyn ContentTransform>>,
) -> BundleResult<Resolved> {
    if let Some(content) = content {
        return Ok(Resolved::Inline(content));
    }

    if let Some(transform) = transform {
        if let Some(transformed) = try_transform(path, transform).await? {
            return Ok(Resolved::Inline(transformed));
        }
    }

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| BlobpackError::io(format!("Failed to stat {}", path.display()), e))?;
    if !metadata.is_file() {
        return Err(BlobpackError::io(
            format!("Cannot bundle {}", path.display()),
            io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }

    Ok(Resolved::File(metadata.len()))
}

/// Run the transform on an eligible file.
///
/// `Ok(None)` means the file should be packed untransformed, either because
/// it is not eligible or because the transform failed.
async fn try_transform(
    path: &Path,
    transform: Arc<dyn ContentTransform>,
) -> BundleResult<Option<Vec<u8>>> {
    let Some(kind) = ResourceKind::from_path(path) else {
        return Ok(None);
    };
    if !transform.supports(kind) {
        return Ok(None);
    }

    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| BlobpackError::io(format!("Failed to read {}", path.display()), e))?;
    let original_len = raw.len();

    info!("Transforming {} resource {} ({})", kind, path.display(), transform.name());
    let worker = Arc::clone(&transform);
    let outcome = tokio::task::spawn_blocking(move || worker.transform(kind, &raw)).await;

    match outcome {
        Ok(Ok(transformed)) => {
            debug!(
                "{} rewrote {} from {} to {} bytes",
                transform.name(),
                path.display(),
                original_len,
                transformed.len()
            );
            Ok(Some(transformed))
        },
        Ok(Err(err)) => {
            warn!(
                "{} failed on {}: {}; packing original bytes",
                transform.name(),
                path.display(),
                err
            );
            Ok(None)
        },
        Err(join_err) => {
            warn!(
                "{} aborted on {}: {}; packing original bytes",
                transform.name(),
                path.display(),
                join_err
            );
            Ok(None)
        },
    }
}
