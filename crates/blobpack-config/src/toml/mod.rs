//! blobpack.toml configuration parsing and serialization

use blobpack_core::error::BlobpackError;
use serde::{Deserialize, Serialize};

use crate::ConfigResult;

/// Complete blobpack.toml configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlobpackToml {
    /// Bundle settings
    #[serde(default)]
    pub bundle: BundleSection,
}

/// `[bundle]` section.
///
/// Every field is optional so layers can be merged; unset fields fall back
/// to the next layer and finally to the defaults in [`crate::BundleConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleSection {
    /// Directory index keys are relative to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<String>,

    /// Container file to write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Optional standalone JSON copy of the index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_output: Option<String>,

    /// Minify eligible resources before packing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,

    /// Directory names skipped while collecting files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
}

impl BundleSection {
    /// Fill unset fields from `fallback`
    pub fn or(self, fallback: BundleSection) -> BundleSection {
        BundleSection {
            base_dir: self.base_dir.or(fallback.base_dir),
            output: self.output.or(fallback.output),
            index_output: self.index_output.or(fallback.index_output),
            minify: self.minify.or(fallback.minify),
            exclude: self.exclude.or(fallback.exclude),
        }
    }
}

/// Parse blobpack.toml content
pub fn parse_blobpack_toml(content: &str) -> ConfigResult<BlobpackToml> {
    let config: BlobpackToml = toml::from_str(content).map_err(|e| BlobpackError::ConfigParse {
        message: e.message().to_string(),
    })?;

    validate_config(&config)?;
    Ok(config)
}

/// Serialize configuration back to TOML
pub fn to_toml_string(config: &BlobpackToml) -> ConfigResult<String> {
    toml::to_string_pretty(config).map_err(|e| BlobpackError::ConfigParse {
        message: format!("Failed to serialize configuration: {}", e),
    })
}

/// Validate configuration values
pub fn validate_config(config: &BlobpackToml) -> ConfigResult<()> {
    let bundle = &config.bundle;

    if let Some(output) = &bundle.output {
        if output.trim().is_empty() {
            return Err(BlobpackError::ConfigValidation {
                field: "bundle.output".to_string(),
                reason: "output path cannot be empty".to_string(),
            });
        }
    }

    if let Some(exclude) = &bundle.exclude {
        for name in exclude {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                return Err(BlobpackError::ConfigValidation {
                    field: "bundle.exclude".to_string(),
                    reason: format!("'{}' must be a single directory name", name),
                });
            }
        }
    }

    Ok(())
}

/// Load and parse blobpack.toml from file path
pub async fn load_from_file(path: &camino::Utf8Path) -> ConfigResult<BlobpackToml> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BlobpackError::io(format!("Failed to read {}", path), e))?;

    parse_blobpack_toml(&content).map_err(|e| match e {
        BlobpackError::ConfigParse { message } => BlobpackError::ConfigParse {
            message: format!("In file {}: {}", path, message),
        },
        BlobpackError::ConfigValidation { field, reason } => BlobpackError::ConfigValidation {
            field,
            reason: format!("In file {}: {}", path, reason),
        },
        other => other,
    })
}
