//! Configuration file (blog.toml).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use folio_static::{BuildConfig, SiteInfo};
use serde::Deserialize;

/// Configuration file structure.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub site: SiteInfo,
    #[serde(default)]
    pub build: BuildSettings,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSettings {
    pub content_dir: PathBuf,
    pub output_dir: PathBuf,
    pub locales: Vec<String>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        let defaults = BuildConfig::default();
        Self {
            content_dir: defaults.content_dir,
            output_dir: defaults.output_dir,
            locales: defaults.locales,
        }
    }
}

/// Directory overrides given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub content: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl ConfigFile {
    /// Load the config file if it exists.
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn into_build_config(self, overrides: Overrides) -> BuildConfig {
        BuildConfig {
            content_dir: overrides.content.unwrap_or(self.build.content_dir),
            output_dir: overrides.output.unwrap_or(self.build.output_dir),
            locales: self.build.locales,
            site: self.site,
        }
    }
}
