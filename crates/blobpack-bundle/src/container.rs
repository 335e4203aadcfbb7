//! Header-then-body container
//!
//! Layout:
//!
//! ```text
//! b"BLOBPACK" | version: u32 LE | header_len: u64 LE | index JSON | blob
//! ```
//!
//! The index is fully known before the blob is streamed, so writing never
//! buffers resource bytes. Reading seeks straight to one resource's range.

use std::io::{self, SeekFrom};
use std::path::Path;

use blobpack_core::error::BlobpackError;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::bundler::Bundler;
use crate::index::{BundleIndex, IndexEntry};
use crate::BundleResult;

/// Leading bytes of every container
pub const MAGIC: &[u8; 8] = b"BLOBPACK";

/// Container format version written by this crate
pub const FORMAT_VERSION: u32 = 1;

const PREAMBLE_LEN: u64 = 8 + 4 + 8;

/// Write the container for `bundler` into `writer`.
///
/// Returns the total number of bytes written.
pub async fn write_container<W>(bundler: Bundler, writer: &mut W) -> BundleResult<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let header = bundler.to_json()?.into_bytes();
    let header_len = header.len() as u64;

    let write_err = |e: io::Error| BlobpackError::io("Failed to write container header".to_string(), e);
    writer.write_all(MAGIC).await.map_err(write_err)?;
    writer.write_u32_le(FORMAT_VERSION).await.map_err(write_err)?;
    writer.write_u64_le(header_len).await.map_err(write_err)?;
    writer.write_all(&header).await.map_err(write_err)?;

    let blob_len = bundler.write_to(writer).await?;
    debug!("Wrote container: {} header bytes, {} blob bytes", header_len, blob_len);

    Ok(PREAMBLE_LEN + header_len + blob_len)
}

/// Random-access reader over a container.
#[derive(Debug)]
pub struct ContainerReader<R> {
    reader: R,
    index: BundleIndex,
    body_offset: u64,
}

impl ContainerReader<File> {
    /// Open a container file on disk
    pub async fn open_path(path: &Path) -> BundleResult<Self> {
        let file = File::open(path)
            .await
            .map_err(|e| BlobpackError::io(format!("Failed to open {}", path.display()), e))?;
        Self::open(file).await
    }
}

impl<R> ContainerReader<R>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    /// Parse the header from the start of `reader`
    pub async fn open(mut reader: R) -> BundleResult<Self> {
        reader
            .seek(SeekFrom::Start(0))
            .await
            .map_err(|e| BlobpackError::io("Failed to seek container".to_string(), e))?;

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic).await.map_err(read_err)?;
        if &magic != MAGIC {
            return Err(BlobpackError::InvalidContainer {
                reason: "missing BLOBPACK magic".to_string(),
            });
        }

        let version = reader.read_u32_le().await.map_err(read_err)?;
        if version != FORMAT_VERSION {
            return Err(BlobpackError::InvalidContainer {
                reason: format!("unsupported format version {}", version),
            });
        }

        let header_len = reader.read_u64_le().await.map_err(read_err)?;
        let mut header = Vec::new();
        (&mut reader)
            .take(header_len)
            .read_to_end(&mut header)
            .await
            .map_err(read_err)?;
        if header.len() as u64 != header_len {
            return Err(BlobpackError::InvalidContainer {
                reason: format!("header truncated: expected {} bytes, found {}", header_len, header.len()),
            });
        }

        let index = BundleIndex::from_json_slice(&header)?;
        let body_offset = PREAMBLE_LEN + header_len;

        let file_len = reader
            .seek(SeekFrom::End(0))
            .await
            .map_err(|e| BlobpackError::io("Failed to seek container".to_string(), e))?;
        let body_len = file_len.checked_sub(body_offset).ok_or_else(|| {
            BlobpackError::InvalidContainer {
                reason: "header runs past the end of the file".to_string(),
            }
        })?;
        validate_ranges(&index, body_len)?;

        Ok(Self {
            reader,
            index,
            body_offset,
        })
    }

    /// The parsed index
    pub fn index(&self) -> &BundleIndex {
        &self.index
    }

    /// Look up the range for `key`
    pub fn entry(&self, key: &str) -> BundleResult<IndexEntry> {
        self.index.get(key).ok_or_else(|| BlobpackError::ResourceNotFound {
            key: key.to_string(),
        })
    }

    /// Read one resource's bytes
    pub async fn read_resource(&mut self, key: &str) -> BundleResult<Vec<u8>> {
        let entry = self.entry(key)?;
        let offset = self
            .body_offset
            .checked_add(entry.start)
            .ok_or_else(|| out_of_range(key))?;
        self.reader
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| BlobpackError::io(format!("Failed to seek to {}", key), e))?;

        let mut content = Vec::new();
        (&mut self.reader)
            .take(entry.length)
            .read_to_end(&mut content)
            .await
            .map_err(|e| BlobpackError::io(format!("Failed to read {}", key), e))?;

        if content.len() as u64 != entry.length {
            return Err(BlobpackError::LengthMismatch {
                key: key.to_string(),
                expected: entry.length,
                actual: content.len() as u64,
            });
        }

        Ok(content)
    }
}

/// Every entry must lie inside a body of `body_len` bytes
fn validate_ranges(index: &BundleIndex, body_len: u64) -> BundleResult<()> {
    for (key, entry) in index.iter() {
        match entry.end() {
            Some(end) if end <= body_len => {},
            _ => return Err(out_of_range(key)),
        }
    }
    Ok(())
}

fn out_of_range(key: &str) -> BlobpackError {
    BlobpackError::InvalidContainer {
        reason: format!("entry {} points outside the blob", key),
    }
}

fn read_err(e: io::Error) -> BlobpackError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        BlobpackError::InvalidContainer {
            reason: "file ends inside the header".to_string(),
        }
    } else {
        BlobpackError::io("Failed to read container header".to_string(), e)
    }
}
