use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::model::{Concurrency, EnvironmentMode, ExtensionAliases};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings for a [`Bundler`](crate::bundle::Bundler), loadable from JSON.
///
/// ```json
/// { "root": "/srv/app", "concurrency": "parallel", "aliases": { "styl": "css", "sass": "css" } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Directory every path is resolved against.
    pub root: PathBuf,
    /// Output directory, relative to `root` unless absolute.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub concurrency: Concurrency,
    /// Fixed mode. If missing, [`EnvironmentMode::from_env`] is read at the start of every build.
    #[serde(default)]
    pub mode: Option<EnvironmentMode>,
    #[serde(default)]
    pub aliases: ExtensionAliases,
    /// Per-sub-stage timeout in milliseconds. If missing, stages may run forever.
    #[serde(default)]
    pub stage_timeout_ms: Option<u64>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("build")
}

impl BuildConfig {
    /// Defaults for `root`: sequential, `build/` output, `styl` built as css.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_dir: default_output_dir(),
            concurrency: Concurrency::default(),
            mode: None,
            aliases: ExtensionAliases::default(),
            stage_timeout_ms: None,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_mode(mut self, mode: EnvironmentMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_aliases(mut self, aliases: ExtensionAliases) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&json)
    }

    /// Mode for a build starting now.
    pub fn current_mode(&self) -> EnvironmentMode {
        self.mode.unwrap_or_else(EnvironmentMode::from_env)
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_ms.map(Duration::from_millis)
    }
}
