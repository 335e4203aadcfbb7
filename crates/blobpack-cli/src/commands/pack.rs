//! `blobpack pack`: walk a directory and write a container.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use blobpack_bundle::{write_container, Bundler, ResourceMinifier};
use blobpack_config::{BundleConfig, ConfigLoader};
use blobpack_core::error::{BlobpackError, BlobpackResult};
use camino::Utf8Path;
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{utf8_path, CommandContext};

/// Flags given on the command line; unset values fall back to configuration
#[derive(Debug, Default, Clone)]
pub struct PackOptions {
    pub dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub minify: bool,
    pub index_out: Option<PathBuf>,
}

/// What a pack run produced
#[derive(Debug, Clone, PartialEq)]
pub struct PackSummary {
    pub output: PathBuf,
    pub resources: usize,
    pub bytes: u64,
}

pub async fn execute(options: PackOptions, ctx: &CommandContext) -> BlobpackResult<PackSummary> {
    let config = load_config(&options, ctx).await?;
    let files = collect_files(&config)?;
    if files.is_empty() {
        ctx.output.warn(&format!("No files found under {}", config.base_dir));
    }

    ctx.output.step(
        "📦",
        &format!("Packing {} files from {}", files.len(), config.base_dir),
    );

    let mut bundler = Bundler::new(config.base_dir.as_std_path());
    if config.minify {
        bundler = bundler.with_transform(Arc::new(ResourceMinifier));
    }
    bundler.add_files(files).await?;

    let index = bundler.index();
    let index_json = index.to_json()?;

    create_parent_dir(&config.output).await?;
    let bytes = write_atomically(bundler, &config.output).await?;
    info!("Wrote {} ({} bytes)", config.output, bytes);

    if let Some(index_path) = &config.index_output {
        create_parent_dir(index_path).await?;
        tokio::fs::write(index_path, index_json)
            .await
            .map_err(|e| BlobpackError::io(format!("Failed to write {}", index_path), e))?;
        ctx.output.info(&format!("Index written to {}", index_path));
    }

    ctx.output.success(&format!(
        "Packed {} resources ({} bytes) into {}",
        index.len(),
        bytes,
        config.output
    ));

    Ok(PackSummary {
        output: config.output.into_std_path_buf(),
        resources: index.len(),
        bytes,
    })
}

async fn load_config(options: &PackOptions, ctx: &CommandContext) -> BlobpackResult<BundleConfig> {
    let mut overrides = HashMap::new();
    if let Some(dir) = &options.dir {
        overrides.insert("base-dir".to_string(), utf8_path(dir, "DIR")?.into_string());
    }
    if let Some(output) = &options.output {
        overrides.insert("output".to_string(), utf8_path(output, "--output")?.into_string());
    }
    if let Some(index_out) = &options.index_out {
        overrides.insert(
            "index-output".to_string(),
            utf8_path(index_out, "--index-out")?.into_string(),
        );
    }
    // The flag can only switch minification on; configuration decides otherwise
    if options.minify {
        overrides.insert("minify".to_string(), "true".to_string());
    }

    let mut loader = ConfigLoader::new(ctx.utf8_cwd()?);
    if let Some(global) = &ctx.global_config {
        loader = loader.with_global_config_path(global.clone());
    }
    match &ctx.env_overrides {
        Some(env) => loader.load_with_env(env.clone(), overrides).await,
        None => loader.load(overrides).await,
    }
}

/// Write the container next to `output` and move it into place once complete.
///
/// A failed write leaves any existing file at `output` untouched and removes
/// the partial temporary file.
pub async fn write_atomically(bundler: Bundler, output: &Utf8Path) -> BlobpackResult<u64> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let staged = NamedTempFile::new_in(dir)
        .map_err(|e| BlobpackError::io(format!("Failed to create a temporary file in {}", dir), e))?;
    let handle = staged
        .as_file()
        .try_clone()
        .map_err(|e| BlobpackError::io(format!("Failed to open {}", staged.path().display()), e))?;

    let mut file = File::from_std(handle);
    let bytes = write_container(bundler, &mut file).await?;
    file.flush()
        .await
        .map_err(|e| BlobpackError::io(format!("Failed to flush {}", output), e))?;
    drop(file);

    debug!("Moving {} to {}", staged.path().display(), output);
    staged
        .persist(output)
        .map_err(|e| BlobpackError::io(format!("Failed to write {}", output), e.error))?;

    Ok(bytes)
}

/// Every regular file under the base directory, in sorted walk order.
///
/// Excluded directory names are pruned and the container's own output
/// files are skipped so a repack never swallows a previous result.
pub fn collect_files(config: &BundleConfig) -> BlobpackResult<Vec<PathBuf>> {
    let skip: Vec<&Utf8Path> = std::iter::once(config.output.as_path())
        .chain(config.index_output.as_deref())
        .collect();

    let walker = WalkDir::new(&config.base_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| config.is_excluded(name))
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            BlobpackError::io(format!("Failed to walk {}", config.base_dir), e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if skip.iter().any(|path| entry.path() == path.as_std_path()) {
            debug!("Skipping output file {}", entry.path().display());
            continue;
        }
        files.push(entry.into_path());
    }

    Ok(files)
}

async fn create_parent_dir(path: &Utf8Path) -> BlobpackResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BlobpackError::io(format!("Failed to create {}", parent), e)),
        _ => Ok(()),
    }
}
