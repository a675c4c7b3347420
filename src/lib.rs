pub mod bundle;
pub mod config;
pub mod executor;
pub mod logging;
pub mod middleware;
pub mod model;
pub mod traits;

// Re-export common types for convenience
pub use bundle::{AssetPipeline, BuildError, BuildStats, Bundler};
pub use config::{BuildConfig, ConfigError};
pub use executor::*;
pub use middleware::BuildHook;
pub use model::*;
pub use traits::*;
