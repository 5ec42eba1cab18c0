use serde::{Deserialize, Serialize};

use super::{CacheError, Result, CACHE_VERSION};

/// Bookkeeping record persisted next to the entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreManifest {
    /// Schema version for the store layout
    pub version: u32,

    /// Invalidation key the current generation was opened with
    pub invalidation_key: String,

    /// Entries directory in use; bumped on every key change so entries written
    /// under an earlier key are never visible again
    pub generation: u64,
}

impl StoreManifest {
    pub fn new(invalidation_key: String, generation: u64) -> Self {
        Self {
            version: CACHE_VERSION,
            invalidation_key,
            generation,
        }
    }

    /// Check if manifest version matches current cache version
    pub fn is_version_compatible(&self) -> bool {
        self.version == CACHE_VERSION
    }

    /// Whether entries recorded under this manifest may be reused with `key`
    pub fn admits(&self, key: &str) -> bool {
        self.is_version_compatible() && self.invalidation_key == key
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(CacheError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(CacheError::from)
    }
}
