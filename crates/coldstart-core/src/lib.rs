//! Snapshot script generation for cold-start images.
//!
//! [`generate_snapshot_script`] walks the require graph of an entry module,
//! reuses or fills a [`TransformCache`], and renders every inlined module into
//! one script with an embedded loader. See [`codegen::runtime`] for the
//! run-time surface of that script.

pub mod cache;
pub mod codegen;
pub mod collaborators;
pub mod config;
pub mod errors;
pub mod exclusion;
pub mod graph;
pub mod module_resolver;
pub mod transform;

pub use cache::{
    CacheEntry, CacheMode, CacheStore, MemoryCache, TransformCache, TransformRecord,
};
pub use codegen::{
    GeneratedScript, PositionSpan, PositionTable, SnapshotGenerator, Translation,
};
pub use collaborators::Collaborators;
pub use config::{CacheOptions, CliOverrides, SnapshotConfig};
pub use errors::{Result, SnapshotError};
pub use exclusion::ExclusionRules;
pub use graph::{GraphResolver, ModuleGraph, ModuleNode, MAIN_MODULE_KEY};

use std::path::{Path, PathBuf};
use tracing::info;

type ExclusionPredicate<'a> = Box<dyn Fn(&Path) -> bool + Send + Sync + 'a>;

/// Inputs of one generation run
pub struct GenerateOptions<'a> {
    pub base_dir: PathBuf,
    pub main_path: PathBuf,
    pub should_exclude: ExclusionPredicate<'a>,
    pub auxiliary_data: Option<serde_json::Value>,
}

impl<'a> GenerateOptions<'a> {
    /// Nothing excluded, no auxiliary data
    pub fn new(base_dir: impl Into<PathBuf>, main_path: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            main_path: main_path.into(),
            should_exclude: Box::new(|_| false),
            auxiliary_data: None,
        }
    }

    pub fn with_exclusion(mut self, predicate: impl Fn(&Path) -> bool + Send + Sync + 'a) -> Self {
        self.should_exclude = Box::new(predicate);
        self
    }

    pub fn with_auxiliary_data(mut self, data: serde_json::Value) -> Self {
        self.auxiliary_data = Some(data);
        self
    }
}

/// Resolve the graph from `options.main_path` and render it with the default
/// transform and resolver
pub fn generate_snapshot_script(
    cache: &dyn TransformCache,
    options: &GenerateOptions<'_>,
) -> Result<String> {
    generate_snapshot(cache, options, &Collaborators::new()).map(|generated| generated.script)
}

/// Like [`generate_snapshot_script`], with explicit collaborators and the
/// position table returned alongside the script
pub fn generate_snapshot(
    cache: &dyn TransformCache,
    options: &GenerateOptions<'_>,
    collaborators: &Collaborators,
) -> Result<GeneratedScript> {
    let should_exclude = |path: &Path| (options.should_exclude)(path);
    let graph = GraphResolver::new(
        cache,
        collaborators.transform(),
        collaborators.resolver(),
        &should_exclude,
    )
    .resolve(&options.base_dir, &options.main_path)?;

    let generated = SnapshotGenerator::new()
        .with_auxiliary_data(options.auxiliary_data.as_ref())
        .generate(&graph);
    info!(
        "Generated snapshot script for {} ({} bytes)",
        graph.main_path().display(),
        generated.script.len()
    );
    Ok(generated)
}
