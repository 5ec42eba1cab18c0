use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cache::derive_invalidation_key;
use crate::errors::{Result, SnapshotError};

/// Default project file looked up by the CLI
pub const DEFAULT_CONFIG_FILE: &str = "coldstart.yaml";

const INIT_HEADER: &str = "\
# coldstart project file
#
# main:            entry module, relative to this file
# baseDir:         root for display paths and relative exclude patterns
# output:          where the snapshot script is written
# exclude:         glob patterns for modules left to the host loader
# auxiliaryData:   any value, embedded as `snapshotAuxiliaryData`
# positionsOutput: optional JSON sidecar with the line position table
";

/// Transform cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOptions {
    /// Use the persistent cache (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache directory (default: .coldstart-cache)
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Extra input folded into the invalidation key
    #[serde(default)]
    pub invalidation_key: String,

    /// Keep going when the cache cannot be written (default: false)
    #[serde(default)]
    pub best_effort: bool,
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".coldstart-cache")
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_cache_dir(),
            invalidation_key: String::new(),
            best_effort: false,
        }
    }
}

impl CacheOptions {
    /// Key actually persisted in the store
    pub fn effective_invalidation_key(&self) -> String {
        derive_invalidation_key(&self.invalidation_key)
    }
}

/// Project configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotConfig {
    /// Entry module
    #[serde(default = "default_main")]
    pub main: PathBuf,

    /// Base directory (default: the entry module's directory)
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    /// Output script
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Modules deferred to the host loader (glob patterns)
    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub auxiliary_data: Option<serde_json::Value>,

    /// Position table sidecar
    #[serde(default)]
    pub positions_output: Option<PathBuf>,

    #[serde(default)]
    pub cache: CacheOptions,
}

fn default_main() -> PathBuf {
    PathBuf::from("index.js")
}

fn default_output() -> PathBuf {
    PathBuf::from("snapshot.js")
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            main: default_main(),
            base_dir: None,
            output: default_output(),
            exclude: Vec::new(),
            auxiliary_data: None,
            positions_output: None,
            cache: CacheOptions::default(),
        }
    }
}

/// Values given on the command line; set fields win over the project file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub main: Option<PathBuf>,
    pub base_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub exclude: Vec<String>,
    pub auxiliary_data: Option<serde_json::Value>,
    pub positions_output: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub invalidation_key: Option<String>,
    pub no_cache: bool,
    pub best_effort_cache: bool,
}

impl SnapshotConfig {
    /// Load a project file, YAML or JSON by extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SnapshotError::io(path, e))?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");

        let config = if is_json {
            serde_json::from_str(&content).map_err(|e| SnapshotError::Config(e.to_string()))?
        } else {
            serde_yaml::from_str(&content).map_err(|e| SnapshotError::Config(e.to_string()))?
        };
        Ok(config)
    }

    /// Create a default configuration and write it to a file
    pub fn init_file(path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(&SnapshotConfig::default())
            .map_err(|e| SnapshotError::Config(e.to_string()))?;
        std::fs::write(path, format!("{}\n{}", INIT_HEADER, yaml))
            .map_err(|e| SnapshotError::io(path, e))
    }

    /// Merge command line values over this configuration
    pub fn merge_with_cli(&mut self, cli: CliOverrides) {
        if let Some(main) = cli.main {
            self.main = main;
        }
        if let Some(base_dir) = cli.base_dir {
            self.base_dir = Some(base_dir);
        }
        if let Some(output) = cli.output {
            self.output = output;
        }
        self.exclude.extend(cli.exclude);
        if cli.auxiliary_data.is_some() {
            self.auxiliary_data = cli.auxiliary_data;
        }
        if cli.positions_output.is_some() {
            self.positions_output = cli.positions_output;
        }
        if let Some(dir) = cli.cache_dir {
            self.cache.dir = dir;
        }
        if let Some(key) = cli.invalidation_key {
            self.cache.invalidation_key = key;
        }
        if cli.no_cache {
            self.cache.enabled = false;
        }
        if cli.best_effort_cache {
            self.cache.best_effort = true;
        }
    }

    /// Resolve relative paths against the directory holding the project file
    pub fn anchor_to(&mut self, dir: &Path) {
        let anchor = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        };
        anchor(&mut self.main);
        anchor(&mut self.output);
        anchor(&mut self.cache.dir);
        if let Some(base_dir) = self.base_dir.as_mut() {
            anchor(base_dir);
        }
        if let Some(positions) = self.positions_output.as_mut() {
            anchor(positions);
        }
    }

    /// Base directory, falling back to the entry module's directory
    pub fn effective_base_dir(&self) -> PathBuf {
        match &self.base_dir {
            Some(dir) => dir.clone(),
            None => self
                .main
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}
