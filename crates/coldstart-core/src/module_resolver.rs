//! Specifier resolution collaborator
//!
//! Mirrors what the host loader does for `require`: extension probing, index
//! files, `package.json` main fields and the `node_modules` ancestor walk.

use oxc_resolver::{ResolveOptions, Resolver};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{Result, SnapshotError};

/// Where a require specifier leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A file that can be inlined (or excluded by the caller's predicate)
    File(PathBuf),
    /// A file that only the host loader can load, such as a native addon.
    /// Requested by absolute path, like an excluded module.
    Deferred(PathBuf),
    /// Left to the host loader using the specifier as written: builtins and
    /// packages that cannot be found
    Host,
}

pub trait SpecifierResolver: Send + Sync {
    fn resolve(&self, specifier: &str, requiring_file: &Path) -> Result<Resolution>;
}

/// Node-compatible resolver backed by `oxc_resolver`
pub struct NodeResolver {
    resolver: Resolver,
}

impl NodeResolver {
    pub fn new() -> Self {
        let extensions = [".js", ".json", ".node"]
            .into_iter()
            .map(|ext| ext.to_string())
            .collect();
        let condition_names = ["node", "require"]
            .into_iter()
            .map(|name| name.to_string())
            .collect();

        Self {
            resolver: Resolver::new(ResolveOptions {
                extensions,
                condition_names,
                ..Default::default()
            }),
        }
    }
}

impl Default for NodeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecifierResolver for NodeResolver {
    fn resolve(&self, specifier: &str, requiring_file: &Path) -> Result<Resolution> {
        let from_dir = requiring_file.parent().unwrap_or(requiring_file);

        match self.resolver.resolve(from_dir, specifier) {
            Ok(resolution) => {
                let path = resolution.into_path_buf();
                if path.extension().is_some_and(|ext| ext == "node") {
                    debug!("Deferring native addon {:?}", path);
                    Ok(Resolution::Deferred(path))
                } else {
                    Ok(Resolution::File(path))
                }
            }
            Err(e) if is_path_specifier(specifier) => {
                debug!("Failed to resolve {:?} from {:?}: {}", specifier, from_dir, e);
                Err(SnapshotError::ModuleResolution {
                    specifier: specifier.to_string(),
                    requiring_file: requiring_file.to_path_buf(),
                })
            }
            Err(e) => {
                debug!("Deferring {:?} to the host loader: {}", specifier, e);
                Ok(Resolution::Host)
            }
        }
    }
}

/// Relative and absolute specifiers name a file, so failing to find one is an
/// error rather than something the host loader could fix
pub fn is_path_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
}
