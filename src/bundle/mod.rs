//! Bundle module - resolve, segment and build asset groups.
//!
//! - **Resolve**: glob expansion via [`resolve::resolve`]
//! - **Segment**: grouping by extension via [`segment::segment`]
//! - **Pipeline**: per-group compile chain via [`pipeline::AssetPipeline`]
//! - **Build**: the public entry point [`build::Bundler`]

pub mod build;
pub mod pipeline;
pub mod resolve;
pub mod segment;

pub use build::{BuildStats, Bundler};
pub use pipeline::{AssetPipeline, BuildError, StageContext, StageStats};
pub use resolve::resolve;
pub use segment::{extension_of, segment, Segment, Segments};
