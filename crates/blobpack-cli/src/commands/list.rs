//! `blobpack list`: print a container's index.

use std::path::Path;

use blobpack_bundle::{BundleIndex, ContainerReader};
use blobpack_core::error::BlobpackResult;

use super::CommandContext;

pub async fn execute(bundle: &Path, ctx: &CommandContext) -> BlobpackResult<()> {
    let reader = ContainerReader::open_path(&ctx.resolve(bundle)).await?;
    let index = reader.index();

    for line in format_entries(index) {
        ctx.output.line(&line);
    }

    ctx.output.info(&format!(
        "{} resources, {} bytes",
        index.len(),
        total_length(index)
    ));
    Ok(())
}

/// One `start length key` row per entry, in index order
pub fn format_entries(index: &BundleIndex) -> Vec<String> {
    index
        .iter()
        .map(|(key, entry)| format!("{:>12} {:>12}  {}", entry.start, entry.length, key))
        .collect()
}

/// Sum of entry lengths; overlapping entries may count bytes twice
pub fn total_length(index: &BundleIndex) -> u64 {
    index
        .iter()
        .fold(0u64, |total, (_, entry)| total.saturating_add(entry.length))
}
