use std::sync::Arc;

use crate::module_resolver::{NodeResolver, SpecifierResolver};
use crate::transform::{RequireScanTransform, Transform};

/// The pluggable pieces of a generation run, wired once and shared
#[derive(Clone)]
pub struct Collaborators {
    transform: Arc<dyn Transform>,
    resolver: Arc<dyn SpecifierResolver>,
}

impl Collaborators {
    /// Production wiring: the require-scanning transform and the
    /// node-compatible resolver
    pub fn new() -> Self {
        Self {
            transform: Arc::new(RequireScanTransform::new()),
            resolver: Arc::new(NodeResolver::new()),
        }
    }

    /// Custom wiring, e.g. a real transpiler or test doubles
    pub fn with_dependencies(
        transform: Arc<dyn Transform>,
        resolver: Arc<dyn SpecifierResolver>,
    ) -> Self {
        Self {
            transform,
            resolver,
        }
    }

    pub fn transform(&self) -> &dyn Transform {
        self.transform.as_ref()
    }

    pub fn resolver(&self) -> &dyn SpecifierResolver {
        self.resolver.as_ref()
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new()
    }
}
