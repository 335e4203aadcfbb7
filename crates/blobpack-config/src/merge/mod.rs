//! Configuration layering, fallback logic, and environment overrides

use std::collections::HashMap;

use blobpack_core::error::BlobpackError;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::toml::{BlobpackToml, BundleSection};
use crate::ConfigResult;

/// Project configuration file name
pub const CONFIG_FILE_NAME: &str = "blobpack.toml";

/// Container written when nothing else is configured
pub const DEFAULT_OUTPUT: &str = "bundle.blob";

/// Directory names skipped when nothing else is configured
pub const DEFAULT_EXCLUDE: &[&str] = &[".git"];

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
    /// Explicit global config path, bypassing the home directory lookup
    global_path: Option<Utf8PathBuf>,
}

/// Configuration layering and merging
pub struct ConfigLayering;

/// Configuration source tracking
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Global config file
    Global(Utf8PathBuf),
    /// Project blobpack.toml file
    ProjectToml(Utf8PathBuf),
    /// Environment variable
    Environment(String),
    /// CLI flag
    CommandLine,
    /// Built-in defaults only
    Defaults,
}

/// Fully resolved bundle settings.
///
/// Paths are absolute: values from a project file are anchored at that
/// file's directory, everything else at the working directory.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleConfig {
    pub base_dir: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub index_output: Option<Utf8PathBuf>,
    pub minify: bool,
    pub exclude: Vec<String>,
    /// Layers that contributed, lowest precedence first
    pub sources: Vec<ConfigSource>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self {
            cwd,
            global_path: None,
        }
    }

    /// Read the global layer from `path` instead of `~/.blobpack/config.toml`
    pub fn with_global_config_path(mut self, path: Utf8PathBuf) -> Self {
        self.global_path = Some(path);
        self
    }

    /// Find configuration file in project (walks up directory tree)
    pub fn resolve_config_path(&self, filename: &str) -> Option<Utf8PathBuf> {
        let mut current = Some(self.cwd.as_path());

        while let Some(dir) = current {
            let config_path = dir.join(filename);
            if config_path.is_file() {
                return Some(config_path);
            }
            current = dir.parent();
        }

        None
    }

    /// Load project configuration, if a blobpack.toml exists at or above cwd
    pub async fn load_project_config(&self) -> ConfigResult<Option<(BlobpackToml, ConfigSource)>> {
        let Some(path) = self.resolve_config_path(CONFIG_FILE_NAME) else {
            debug!("No {} found above {}", CONFIG_FILE_NAME, self.cwd);
            return Ok(None);
        };

        let config = crate::toml::load_from_file(&path).await?;
        Ok(Some((config, ConfigSource::ProjectToml(path))))
    }

    /// Load global configuration
    pub async fn load_global_config(&self) -> ConfigResult<Option<(BlobpackToml, ConfigSource)>> {
        let path = match &self.global_path {
            Some(path) => path.clone(),
            None => match Self::default_global_path()? {
                Some(path) => path,
                None => return Ok(None),
            },
        };

        if path.is_file() {
            let config = crate::toml::load_from_file(&path).await?;
            Ok(Some((config, ConfigSource::Global(path))))
        } else {
            Ok(None)
        }
    }

    /// Load every layer and resolve the final settings
    pub async fn load(&self, cli_overrides: HashMap<String, String>) -> ConfigResult<BundleConfig> {
        self.load_with_env(ConfigLayering::collect_env_overrides(), cli_overrides)
            .await
    }

    /// Like [`ConfigLoader::load`] with explicit environment overrides
    pub async fn load_with_env(
        &self,
        env_overrides: HashMap<String, String>,
        cli_overrides: HashMap<String, String>,
    ) -> ConfigResult<BundleConfig> {
        let mut sources = Vec::new();

        let global = self.load_global_config().await?.map(|(config, source)| {
            sources.push(source);
            anchor(config.bundle, &self.cwd)
        });

        let project = self.load_project_config().await?.map(|(config, source)| {
            let dir = match &source {
                ConfigSource::ProjectToml(path) => path.parent().unwrap_or(&self.cwd).to_path_buf(),
                _ => self.cwd.clone(),
            };
            sources.push(source);
            anchor(config.bundle, &dir)
        });

        for key in env_overrides.keys() {
            if ENV_KEYS.contains(&key.as_str()) {
                sources.push(ConfigSource::Environment(key.clone()));
            }
        }
        if !cli_overrides.is_empty() {
            sources.push(ConfigSource::CommandLine);
        }
        if sources.is_empty() {
            sources.push(ConfigSource::Defaults);
        }

        let merged = ConfigLayering::merge_configs(global, project, &env_overrides, &cli_overrides)?;
        let config = BundleConfig::from_section(merged, &self.cwd, sources);
        debug!("Resolved bundle config: {:?}", config);
        Ok(config)
    }

    fn default_global_path() -> ConfigResult<Option<Utf8PathBuf>> {
        let Some(home_dir) = dirs::home_dir() else {
            debug!("Could not determine home directory; skipping global config");
            return Ok(None);
        };

        let home_dir = Utf8PathBuf::try_from(home_dir).map_err(|e| BlobpackError::ConfigValidation {
            field: "home_dir".to_string(),
            reason: format!("Invalid home directory path: {}", e),
        })?;

        Ok(Some(home_dir.join(".blobpack").join("config.toml")))
    }
}

const ENV_KEYS: &[&str] = &["BLOBPACK_MINIFY", "BLOBPACK_OUTPUT"];

impl ConfigLayering {
    /// Merge configuration layers; later layers win field by field
    pub fn merge_configs(
        global: Option<BundleSection>,
        project: Option<BundleSection>,
        env_overrides: &HashMap<String, String>,
        cli_overrides: &HashMap<String, String>,
    ) -> ConfigResult<BundleSection> {
        let mut merged = project.unwrap_or_default().or(global.unwrap_or_default());

        Self::apply_env_overrides(&mut merged, env_overrides)?;
        Self::apply_cli_overrides(&mut merged, cli_overrides)?;

        Ok(merged)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(
        config: &mut BundleSection,
        overrides: &HashMap<String, String>,
    ) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "BLOBPACK_MINIFY" => {
                    config.minify = Some(parse_flag(key, value)?);
                }
                "BLOBPACK_OUTPUT" => {
                    config.output = Some(non_empty(key, value)?);
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Apply CLI flag overrides
    fn apply_cli_overrides(
        config: &mut BundleSection,
        overrides: &HashMap<String, String>,
    ) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "minify" => config.minify = Some(parse_flag("--minify", value)?),
                "output" => config.output = Some(non_empty("--output", value)?),
                "index-output" => config.index_output = Some(non_empty("--index-out", value)?),
                "base-dir" => config.base_dir = Some(non_empty("DIR", value)?),
                _ => {}
            }
        }

        Ok(())
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        Self::env_overrides_from(std::env::vars())
    }

    /// Keep only the variables this crate understands
    pub fn env_overrides_from<I>(vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter(|(key, _)| ENV_KEYS.contains(&key.as_str()))
            .collect()
    }
}

impl BundleConfig {
    /// Fill defaults and make every path absolute against `cwd`
    pub fn from_section(section: BundleSection, cwd: &Utf8Path, sources: Vec<ConfigSource>) -> Self {
        let base_dir = section
            .base_dir
            .map(|dir| cwd.join(dir))
            .unwrap_or_else(|| cwd.to_path_buf());

        Self {
            base_dir,
            output: cwd.join(section.output.as_deref().unwrap_or(DEFAULT_OUTPUT)),
            index_output: section.index_output.map(|path| cwd.join(path)),
            minify: section.minify.unwrap_or(false),
            exclude: section
                .exclude
                .unwrap_or_else(|| DEFAULT_EXCLUDE.iter().map(|s| s.to_string()).collect()),
            sources,
        }
    }

    /// Defaults anchored at `cwd`
    pub fn defaults(cwd: &Utf8Path) -> Self {
        Self::from_section(BundleSection::default(), cwd, vec![ConfigSource::Defaults])
    }

    /// Whether a directory named `name` is skipped during collection
    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclude.iter().any(|excluded| excluded == name)
    }
}

/// Make a layer's relative paths absolute against `dir`.
/// `Utf8Path::join` keeps absolute values as they are.
fn anchor(section: BundleSection, dir: &Utf8Path) -> BundleSection {
    let join = |value: String| dir.join(value).into_string();
    BundleSection {
        base_dir: section.base_dir.map(join),
        output: section.output.map(join),
        index_output: section.index_output.map(join),
        ..section
    }
}

fn parse_flag(field: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(BlobpackError::ConfigValidation {
            field: field.to_string(),
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}

fn non_empty(field: &str, value: &str) -> ConfigResult<String> {
    if value.trim().is_empty() {
        return Err(BlobpackError::ConfigValidation {
            field: field.to_string(),
            reason: "value cannot be empty".to_string(),
        });
    }
    Ok(value.to_string())
}
