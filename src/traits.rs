//! Capabilities the build calls out to.
//!
//! The bundler, templating plugins and minifiers are external collaborators.
//! The pipeline only sees them through these traits, so tests drive it with
//! fakes and real integrations live outside this crate.

use crate::model::{EnvironmentMode, MediaType};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Failure reported by a [`Compiler`] or a [`CompilePlugin`].
#[derive(Error, Debug)]
pub enum CompileError {
    /// Entry or one of its imports could not be resolved
    #[error("Unresolved module '{0}'")]
    Unresolved(String),

    /// Source is not valid for the compiler
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// A templating plugin rejected its input
    #[error("Plugin '{plugin}' failed: {message}")]
    Plugin { plugin: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Failure reported by a [`Transform`].
#[derive(Error, Debug)]
pub enum TransformError {
    /// Input could not be parsed as the expected media type
    #[error("Invalid {media:?} input: {message}")]
    InvalidInput { media: MediaType, message: String },

    #[error("{0}")]
    Other(String),
}

// ============================================================================
// Compile
// ============================================================================

/// One entry file handed to a [`Compiler`].
pub struct CompileUnit<'a> {
    /// Build root; `entry` is relative to it
    pub root: &'a Path,

    /// Entry path relative to `root`
    pub entry: &'a Path,

    /// Raw bytes of the entry as loaded by the source stage
    pub source: &'a [u8],

    /// Mode of the running build; compilers may inline assets in production
    pub mode: EnvironmentMode,

    /// Templating plugins to apply to nested files the compiler pulls in
    pub plugins: &'a [Arc<dyn CompilePlugin>],
}

impl CompileUnit<'_> {
    /// First plugin registered for `path`'s extension.
    pub fn plugin_for(&self, path: &Path) -> Option<&Arc<dyn CompilePlugin>> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        self.plugins.iter().find(|p| p.extension() == ext)
    }
}

/// Module bundler: resolves an entry's dependency graph and emits bytes.
#[async_trait]
pub trait Compiler: Send + Sync {
    fn name(&self) -> &str;

    async fn compile(&self, unit: CompileUnit<'_>) -> Result<Vec<u8>, CompileError>;
}

/// Templating capability composed into the compile stage, keyed by extension.
#[async_trait]
pub trait CompilePlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Extension (without the dot) of the files this plugin renders.
    fn extension(&self) -> &str;

    async fn render(&self, path: &Path, source: &[u8]) -> Result<Vec<u8>, CompileError>;
}

// ============================================================================
// Transform
// ============================================================================

/// Bytes-in, bytes-out processor: CSS post-processors and minifiers.
#[async_trait]
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    async fn transform(&self, media: MediaType, input: Vec<u8>)
        -> Result<Vec<u8>, TransformError>;
}
