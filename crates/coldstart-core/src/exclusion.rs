use glob::Pattern;
use path_slash::PathExt as _;
use std::path::{Path, PathBuf};

use crate::errors::{Result, SnapshotError};

/// Glob-based exclusion predicate
///
/// A module is excluded when any pattern matches either its path relative to
/// the base directory or its absolute path, both in forward-slash form.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    base_dir: PathBuf,
    patterns: Vec<Pattern>,
}

impl ExclusionRules {
    pub fn new(base_dir: impl Into<PathBuf>, patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|raw| {
                Pattern::new(raw).map_err(|e| {
                    SnapshotError::Config(format!("Invalid exclude pattern '{}': {}", raw, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let base_dir = base_dir.into();
        let base_dir = std::fs::canonicalize(&base_dir).unwrap_or(base_dir);
        Ok(Self { base_dir, patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }

        let absolute = path.to_slash_lossy();
        let relative = path
            .strip_prefix(&self.base_dir)
            .ok()
            .map(|rel| rel.to_slash_lossy().into_owned());

        self.patterns.iter().any(|pattern| {
            relative.as_deref().is_some_and(|rel| pattern.matches(rel))
                || pattern.matches(&absolute)
        })
    }
}
