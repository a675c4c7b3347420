//! Per-request hook around a [`Bundler`].
//!
//! Outside production the hook builds to completion before the request
//! continues; in production it does nothing. It is framework-agnostic: call
//! [`BuildHook::before`] from whatever request middleware the server uses.

use std::future::Future;
use std::sync::Arc;

use crate::bundle::{BuildError, BuildStats, Bundler};
use crate::model::FileGlob;

/// A bundler bound to the files it rebuilds on every request.
#[derive(Clone)]
pub struct BuildHook {
    bundler: Arc<Bundler>,
    input: FileGlob,
}

impl BuildHook {
    pub fn new(bundler: Arc<Bundler>, input: impl Into<FileGlob>) -> Self {
        Self {
            bundler,
            input: input.into(),
        }
    }

    /// Runs a build unless the bundler is in production mode.
    pub async fn before(&self) -> Result<BuildStats, BuildError> {
        self.bundler.build(self.input.clone()).await
    }

    /// Builds, then runs `next`. `next` is never called if the build fails.
    pub async fn around<F, Fut, T>(&self, next: F) -> Result<T, BuildError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.before().await?;
        Ok(next().await)
    }
}

impl Bundler {
    /// Binds this bundler to `input` for use as request middleware.
    pub fn hook(self: &Arc<Self>, input: impl Into<FileGlob>) -> BuildHook {
        BuildHook::new(Arc::clone(self), input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::AssetPipeline;
    use crate::config::BuildConfig;
    use crate::model::EnvironmentMode;
    use crate::traits::{CompileError, CompileUnit, Compiler};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Failing;

    #[async_trait]
    impl Compiler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn compile(&self, _unit: CompileUnit<'_>) -> Result<Vec<u8>, CompileError> {
            Err(CompileError::Unresolved("missing-dep".to_string()))
        }
    }

    fn bundler(root: &std::path::Path, mode: EnvironmentMode) -> Arc<Bundler> {
        Arc::new(
            Bundler::new(BuildConfig::new(root).with_mode(mode))
                .with_pipeline(AssetPipeline::script(Arc::new(Failing))),
        )
    }

    #[tokio::test]
    async fn test_failed_build_blocks_request() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.js"), b"require('missing-dep')").unwrap();

        let hook = bundler(dir.path(), EnvironmentMode::Development).hook("*.js");
        let handled = AtomicBool::new(false);
        let result = hook
            .around(|| async { handled.store(true, Ordering::SeqCst) })
            .await;

        assert!(matches!(result, Err(BuildError::Compile { .. })));
        assert!(!handled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_production_is_a_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.js"), b"").unwrap();

        let hook = bundler(dir.path(), EnvironmentMode::Production).hook("*.js");
        let response = hook.around(|| async { 200 }).await.unwrap();

        assert_eq!(response, 200);
        assert!(hook.before().await.unwrap().skipped);
    }
}
