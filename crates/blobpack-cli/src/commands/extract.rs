//! `blobpack extract`: copy one resource out of a container.

use std::path::Path;

use blobpack_bundle::ContainerReader;
use blobpack_core::error::{BlobpackError, BlobpackResult};
use blobpack_core::utils::path::KEY_PREFIX;
use tokio::io::AsyncWriteExt;

use super::CommandContext;

pub async fn execute(
    bundle: &Path,
    key: &str,
    output: Option<&Path>,
    ctx: &CommandContext,
) -> BlobpackResult<()> {
    let mut reader = ContainerReader::open_path(&ctx.resolve(bundle)).await?;
    let key = normalize_key(key);
    let content = reader.read_resource(&key).await?;

    match output {
        Some(path) => {
            let path = ctx.resolve(path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    BlobpackError::io(format!("Failed to create {}", parent.display()), e)
                })?;
            }
            tokio::fs::write(&path, &content)
                .await
                .map_err(|e| BlobpackError::io(format!("Failed to write {}", path.display()), e))?;
            ctx.output.success(&format!(
                "Extracted {} ({} bytes) to {}",
                key,
                content.len(),
                path.display()
            ));
        }
        None => {
            // stdout carries only the resource bytes
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(&content)
                .await
                .map_err(|e| BlobpackError::io("Failed to write to stdout".to_string(), e))?;
            stdout
                .flush()
                .await
                .map_err(|e| BlobpackError::io("Failed to flush stdout".to_string(), e))?;
        }
    }

    Ok(())
}

/// Accept keys with or without the leading `./`
pub fn normalize_key(key: &str) -> String {
    let trimmed = key.trim_start_matches(KEY_PREFIX).trim_start_matches('/');
    format!("{}{}", KEY_PREFIX, trimmed)
}
