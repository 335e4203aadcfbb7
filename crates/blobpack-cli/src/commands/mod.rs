//! Command implementations and dispatch logic.
//!
//! Each command is implemented as an async function that takes a
//! [`CommandContext`].

use blobpack_core::error::{BlobpackError, BlobpackResult};
use camino::Utf8PathBuf;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub mod extract;
pub mod list;
pub mod pack;


pub use pack::PackOptions;

use crate::{output::OutputHandler, Commands};

/// Shared context for all commands
pub struct CommandContext {
    pub cwd: PathBuf,
    pub output: OutputHandler,
    /// Global config file override; `None` uses `~/.blobpack/config.toml`
    pub global_config: Option<Utf8PathBuf>,
    /// `BLOBPACK_*` values to use; `None` reads the process environment
    pub env_overrides: Option<HashMap<String, String>>,
}

impl CommandContext {
    /// Create a new command context
    pub async fn new() -> BlobpackResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| BlobpackError::io("Failed to get current directory".to_string(), e))?;

        let output = OutputHandler::new();

        Ok(Self {
            cwd,
            output,
            global_config: None,
            env_overrides: None,
        })
    }

    /// Resolve a user-supplied path against the working directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.cwd.join(path)
    }

    /// Working directory as a UTF-8 path, which configuration requires
    pub fn utf8_cwd(&self) -> BlobpackResult<Utf8PathBuf> {
        utf8_path(&self.cwd, "cwd")
    }
}

/// Dispatch a command to its handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> BlobpackResult<()> {
    match command {
        Commands::Pack {
            dir,
            output,
            minify,
            index_out,
        } => {
            info!("Packing {:?} (minify: {})", dir, minify);
            let options = PackOptions {
                dir,
                output,
                minify,
                index_out,
            };
            pack::execute(options, ctx).await.map(|_| ())
        }
        Commands::List { bundle } => {
            info!("Listing {}", bundle.display());
            list::execute(&bundle, ctx).await
        }
        Commands::Extract {
            bundle,
            key,
            output,
        } => {
            info!("Extracting {} from {}", key, bundle.display());
            extract::execute(&bundle, &key, output.as_deref(), ctx).await
        }
    }
}

/// Convert a path to UTF-8, naming `field` when it is not
pub(crate) fn utf8_path(path: &Path, field: &str) -> BlobpackResult<Utf8PathBuf> {
    Utf8PathBuf::try_from(path.to_path_buf()).map_err(|e| BlobpackError::ConfigValidation {
        field: field.to_string(),
        reason: format!("path is not valid UTF-8: {}", e),
    })
}
