//! Public entry point: resolve, segment, run.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::bundle::pipeline::{AssetPipeline, BuildError, StageContext};
use crate::bundle::resolve::resolve;
use crate::bundle::segment::segment;
use crate::config::BuildConfig;
use crate::executor::{job, BatchCoordinator, Job};
use crate::model::{FileGlob, MediaType};

/// Summary of one build call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildStats {
    /// True when the build was skipped in production mode
    pub skipped: bool,

    /// Files returned by the resolver
    pub files_discovered: usize,

    /// Pipeline jobs scheduled
    pub jobs: usize,

    pub files_written: usize,

    pub bytes_written: u64,

    pub total_duration_ms: u64,
}

impl BuildStats {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Builds stylesheets and scripts found under a root directory.
///
/// One [`AssetPipeline`] may be registered per media type. Jobs run in
/// registration order under the configured concurrency, so registering the
/// stylesheet pipeline first builds css before js in sequential mode.
///
/// ```ignore
/// let bundler = Bundler::new(BuildConfig::new("/srv/app"))
///     .with_pipeline(AssetPipeline::stylesheet(duo.clone()).with_transform(myth))
///     .with_pipeline(AssetPipeline::script(duo));
///
/// bundler.build("assets/*.{css,js}").await?;
/// ```
pub struct Bundler {
    config: BuildConfig,
    pipelines: Vec<(MediaType, Arc<AssetPipeline>)>,
}

impl Bundler {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            pipelines: Vec::new(),
        }
    }

    /// Registers `pipeline` for its media type, replacing any earlier one.
    pub fn with_pipeline(mut self, pipeline: AssetPipeline) -> Self {
        let media = pipeline.media();
        let pipeline = Arc::new(pipeline);
        match self.pipelines.iter_mut().find(|(m, _)| *m == media) {
            Some(slot) => slot.1 = pipeline,
            None => self.pipelines.push((media, pipeline)),
        }
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Builds every file selected by `input`.
    ///
    /// In production mode this returns immediately without touching the
    /// filesystem. Otherwise files are resolved, segmented by extension and
    /// each segment with a registered pipeline becomes one job; segments of
    /// any other group are ignored.
    ///
    /// # Errors
    ///
    /// Returns the first error of any job, or [`BuildError::Resolution`]
    /// before any job starts if the pattern is malformed.
    #[instrument(skip(self, input), fields(root = %self.config.root.display()))]
    pub async fn build(&self, input: impl Into<FileGlob>) -> Result<BuildStats, BuildError> {
        let mode = self.config.current_mode();
        if mode.is_production() {
            debug!("Production mode, skipping build");
            return Ok(BuildStats::skipped());
        }

        let start = Instant::now();
        let input = input.into();
        let root = self.config.root.clone();

        let files = tokio::task::spawn_blocking(move || resolve(&root, &input))
            .await
            .map_err(|e| BuildError::Join(format!("Resolver task: {}", e)))??;

        let names: Vec<_> = files.iter().map(|f| f.display().to_string()).collect();
        debug!(files = ?names, "building");

        let segments = segment(&files, &self.config.aliases);
        let ctx = Arc::new(StageContext {
            root: self.config.root.clone(),
            output_dir: self.config.output_dir.clone(),
            mode,
            stage_timeout: self.config.stage_timeout(),
        });

        let mut jobs: Vec<Job> = Vec::new();
        for (media, pipeline) in &self.pipelines {
            let Some(seg) = segments.get(media.group()) else {
                continue;
            };
            let pipeline = Arc::clone(pipeline);
            let ctx = Arc::clone(&ctx);
            let files = seg.files.clone();
            jobs.push(job(move || async move { pipeline.run(&ctx, &files).await }));
        }

        for seg in segments.iter() {
            if !self.pipelines.iter().any(|(m, _)| m.group() == seg.group) {
                debug!(group = %seg.group, files = seg.files.len(), "No pipeline for group, ignoring");
            }
        }

        let job_count = jobs.len();
        let outcome = BatchCoordinator::new(self.config.concurrency)
            .run(jobs)
            .await?;

        let stats = BuildStats {
            skipped: false,
            files_discovered: files.len(),
            jobs: job_count,
            files_written: outcome.stages.iter().map(|s| s.files_processed).sum(),
            bytes_written: outcome.stages.iter().map(|s| s.bytes_written).sum(),
            total_duration_ms: start.elapsed().as_millis() as u64,
        };

        debug!(files = ?names, "built");
        info!(
            files = stats.files_written,
            jobs = stats.jobs,
            duration_ms = stats.total_duration_ms,
            "Build completed"
        );
        Ok(stats)
    }
}
