//! Per-group asset pipeline.
//!
//! [`AssetPipeline`] takes every file of one segment through the sub-stages
//! Source → Compile → Transform → Optimize (production only) → Sink:
//! - Async file I/O via `tokio::fs`
//! - Optional per-sub-stage timeout
//! - Per-file "building" / "built" events via `tracing`
//!
//! The first failing sub-stage ends the whole group. Files already written
//! stay on disk.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, info};

use crate::model::{EnvironmentMode, MediaType};
use crate::traits::{CompileError, CompilePlugin, CompileUnit, Compiler, Transform, TransformError};

// ============================================================================
// Pipeline Types
// ============================================================================

/// Everything a stage needs to know about the build it belongs to.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Build root; file paths are relative to it
    pub root: PathBuf,

    /// Output directory, relative to `root` unless absolute
    pub output_dir: PathBuf,

    /// Mode captured when the build started
    pub mode: EnvironmentMode,

    /// Limit applied to each sub-stage of each file. `None` waits forever.
    pub stage_timeout: Option<Duration>,
}

impl StageContext {
    /// Where the compiled bytes for `file` are written.
    ///
    /// The path relative to root is preserved under the output directory. A
    /// file outside root keeps only its file name.
    pub fn output_path(&self, file: &Path) -> PathBuf {
        let relative = file.strip_prefix(&self.root).unwrap_or(file);
        let relative = if relative.is_absolute() {
            relative.file_name().map(Path::new).unwrap_or(relative)
        } else {
            relative
        };
        self.root.join(&self.output_dir).join(relative)
    }
}

/// Statistics about one finished stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StageStats {
    /// Segment group the stage ran for
    pub group: String,

    /// Number of files written
    pub files_processed: usize,

    /// Total size of all written files (bytes)
    pub bytes_written: u64,

    /// Time spent on the whole group (milliseconds)
    pub duration_ms: u64,
}

// ============================================================================
// Build Errors
// ============================================================================

/// Errors that can end a build.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    /// Glob pattern could not be parsed
    #[error("Invalid glob pattern '{pattern}': {source}")]
    Resolution {
        pattern: String,
        source: glob::PatternError,
    },

    /// Source file could not be read
    #[error("Failed to read '{}': {source}", .path.display())]
    Source {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Compiler or one of its plugins failed
    #[error("Failed to compile '{}': {source}", .path.display())]
    Compile { path: PathBuf, source: CompileError },

    /// Always-on post-compile transform failed
    #[error("Transform '{stage}' failed on '{}': {source}", .path.display())]
    Transform {
        stage: String,
        path: PathBuf,
        source: TransformError,
    },

    /// Production optimizer failed
    #[error("Optimizer '{stage}' failed on '{}': {source}", .path.display())]
    Optimize {
        stage: String,
        path: PathBuf,
        source: TransformError,
    },

    /// Output could not be written
    #[error("Failed to write '{}': {source}", .path.display())]
    Sink {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Sub-stage exceeded its timeout
    #[error("Stage '{stage}' timed out after {timeout_ms}ms on '{}'", .path.display())]
    StageTimeout {
        stage: String,
        path: PathBuf,
        timeout_ms: u64,
    },

    /// Spawned build task panicked or was cancelled
    #[error("Build task failed: {0}")]
    Join(String),
}

// ============================================================================
// Pipeline
// ============================================================================

/// Compile/transform/optimize/write chain for one media type.
///
/// # Example
///
/// ```ignore
/// let styles = AssetPipeline::stylesheet(Arc::new(bundler))
///     .with_transform(Arc::new(autoprefix))
///     .with_optimizer(Arc::new(csso));
///
/// let stats = styles.run(&ctx, &files).await?;
/// ```
pub struct AssetPipeline {
    media: MediaType,
    compiler: Arc<dyn Compiler>,
    plugins: Vec<Arc<dyn CompilePlugin>>,
    transforms: Vec<Arc<dyn Transform>>,
    optimizers: Vec<Arc<dyn Transform>>,
}

impl AssetPipeline {
    pub fn new(media: MediaType, compiler: Arc<dyn Compiler>) -> Self {
        Self {
            media,
            compiler,
            plugins: Vec::new(),
            transforms: Vec::new(),
            optimizers: Vec::new(),
        }
    }

    pub fn stylesheet(compiler: Arc<dyn Compiler>) -> Self {
        Self::new(MediaType::Stylesheet, compiler)
    }

    pub fn script(compiler: Arc<dyn Compiler>) -> Self {
        Self::new(MediaType::Script, compiler)
    }

    /// Adds a templating plugin handed to the compiler.
    pub fn with_plugin(mut self, plugin: Arc<dyn CompilePlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Adds a transform that runs after compile in every mode.
    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Adds a transform that runs only in production.
    pub fn with_optimizer(mut self, optimizer: Arc<dyn Transform>) -> Self {
        self.optimizers.push(optimizer);
        self
    }

    pub fn media(&self) -> MediaType {
        self.media
    }

    /// Runs every file in `files` through the pipeline, in order.
    ///
    /// Returns once the sink has written the last file of the group.
    ///
    /// # Errors
    ///
    /// The first sub-stage error is returned and no further files are
    /// processed. Outputs written before the failure are left in place.
    pub async fn run(&self, ctx: &StageContext, files: &[PathBuf]) -> Result<StageStats, BuildError> {
        let start = Instant::now();
        let mut stats = StageStats {
            group: self.media.group().to_string(),
            ..StageStats::default()
        };

        info!(group = %stats.group, files = files.len(), "Starting stage");

        for file in files {
            stats.bytes_written += self.process(ctx, file).await?;
            stats.files_processed += 1;
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            group = %stats.group,
            files = stats.files_processed,
            size_bytes = stats.bytes_written,
            duration_ms = stats.duration_ms,
            "Stage completed"
        );

        Ok(stats)
    }

    async fn process(&self, ctx: &StageContext, file: &Path) -> Result<u64, BuildError> {
        let limit = ctx.stage_timeout;
        debug!(file = %file.display(), "building");

        // Source
        let source_path = ctx.root.join(file);
        let source = bounded(limit, "source", file, async {
            tokio::fs::read(&source_path)
                .await
                .map_err(|e| BuildError::Source {
                    path: file.to_path_buf(),
                    source: e,
                })
        })
        .await?;

        // Compile
        let unit = CompileUnit {
            root: &ctx.root,
            entry: file,
            source: &source,
            mode: ctx.mode,
            plugins: &self.plugins,
        };
        let mut bytes = bounded(limit, self.compiler.name(), file, async {
            self.compiler
                .compile(unit)
                .await
                .map_err(|e| BuildError::Compile {
                    path: file.to_path_buf(),
                    source: e,
                })
        })
        .await?;

        // Transform
        for transform in &self.transforms {
            bytes = bounded(limit, transform.name(), file, async {
                transform
                    .transform(self.media, bytes)
                    .await
                    .map_err(|e| BuildError::Transform {
                        stage: transform.name().to_string(),
                        path: file.to_path_buf(),
                        source: e,
                    })
            })
            .await?;
        }

        // Optimize
        if ctx.mode.is_production() {
            for optimizer in &self.optimizers {
                bytes = bounded(limit, optimizer.name(), file, async {
                    optimizer
                        .transform(self.media, bytes)
                        .await
                        .map_err(|e| BuildError::Optimize {
                            stage: optimizer.name().to_string(),
                            path: file.to_path_buf(),
                            source: e,
                        })
                })
                .await?;
            }
        }

        // Sink
        let dest = ctx.output_path(file);
        let written = bytes.len() as u64;
        bounded(limit, "sink", file, async {
            let sink_err = |e| BuildError::Sink {
                path: dest.clone(),
                source: e,
            };
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(sink_err)?;
            }
            tokio::fs::write(&dest, &bytes).await.map_err(sink_err)
        })
        .await?;

        debug!(file = %file.display(), size_bytes = written, "built");
        Ok(written)
    }
}

/// Awaits `fut`, failing with [`BuildError::StageTimeout`] once `limit` passes.
async fn bounded<T, F>(
    limit: Option<Duration>,
    stage: &str,
    file: &Path,
    fut: F,
) -> Result<T, BuildError>
where
    F: Future<Output = Result<T, BuildError>>,
{
    let Some(limit) = limit else {
        return fut.await;
    };

    timeout(limit, fut).await.map_err(|_| BuildError::StageTimeout {
        stage: stage.to_string(),
        path: file.to_path_buf(),
        timeout_ms: limit.as_millis() as u64,
    })?
}

// ============================================================================
// Tests
// ============================================================================
