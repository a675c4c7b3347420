//! Plain data shared by every stage of a build.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Environment variable that selects the [`EnvironmentMode`].
pub const MODE_ENV_VAR: &str = "ASSET_ENV";

/// Ordered list of paths relative to the build root. Duplicates are kept.
pub type FileSet = Vec<PathBuf>;

/// What to build: a glob pattern or an already-expanded list of files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileGlob {
    /// Pattern expanded against the build root.
    Pattern(String),
    /// Paths relative to the build root, used as-is.
    Files(FileSet),
}

impl From<&str> for FileGlob {
    fn from(pattern: &str) -> Self {
        FileGlob::Pattern(pattern.to_string())
    }
}

impl From<String> for FileGlob {
    fn from(pattern: String) -> Self {
        FileGlob::Pattern(pattern)
    }
}

impl From<Vec<PathBuf>> for FileGlob {
    fn from(files: Vec<PathBuf>) -> Self {
        FileGlob::Files(files)
    }
}

impl From<Vec<&str>> for FileGlob {
    fn from(files: Vec<&str>) -> Self {
        FileGlob::Files(files.into_iter().map(PathBuf::from).collect())
    }
}

/// Deployment mode. Production disables building entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentMode {
    #[default]
    Development,
    Production,
}

impl EnvironmentMode {
    /// Reads [`MODE_ENV_VAR`] from the process environment.
    pub fn from_env() -> Self {
        Self::from_value(std::env::var(MODE_ENV_VAR).ok().as_deref())
    }

    /// Only the exact value `production` selects production mode.
    pub fn from_value(value: Option<&str>) -> Self {
        match value {
            Some("production") => EnvironmentMode::Production,
            _ => EnvironmentMode::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == EnvironmentMode::Production
    }
}

/// Kind of bytes flowing through a pipeline, handed to transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Stylesheet,
    Script,
}

impl MediaType {
    /// Group name the segmenter files this media type under.
    pub fn group(self) -> &'static str {
        match self {
            MediaType::Stylesheet => "css",
            MediaType::Script => "js",
        }
    }
}

/// How many pipeline jobs may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Concurrency {
    /// One job at a time, in submission order.
    #[default]
    Sequential,
    /// Every job starts immediately.
    Parallel,
    /// At most `n` jobs in flight.
    Limited(usize),
}

impl Concurrency {
    /// Maximum jobs in flight, `None` when unbounded.
    pub fn limit(self) -> Option<usize> {
        match self {
            Concurrency::Sequential => Some(1),
            Concurrency::Parallel => None,
            Concurrency::Limited(n) => Some(n.max(1)),
        }
    }
}

/// Immutable mapping from a source extension to the group it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionAliases(HashMap<String, String>);

impl ExtensionAliases {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self(aliases)
    }

    /// Table with no aliases at all.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Group name for `ext`: the alias target if registered, else `ext` itself.
    pub fn normalize<'a>(&'a self, ext: &'a str) -> &'a str {
        self.0.get(ext).map(String::as_str).unwrap_or(ext)
    }
}

impl Default for ExtensionAliases {
    /// Stylus sources build through the stylesheet pipeline.
    fn default() -> Self {
        Self(HashMap::from([("styl".to_string(), "css".to_string())]))
    }
}

impl<const N: usize> From<[(&str, &str); N]> for ExtensionAliases {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        )
    }
}
