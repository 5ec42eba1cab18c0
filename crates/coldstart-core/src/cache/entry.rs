use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{hash_source, CacheError, Result};

/// A transform result as handed to [`TransformCache::put`](super::TransformCache::put).
///
/// The content hash is derived from `original`, so a record always lands under
/// the key the resolver will later look it up with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRecord {
    /// Absolute path of the source file
    pub file_path: PathBuf,

    /// Source text the transform ran on
    pub original: String,

    /// Transformed code
    pub transformed: String,

    /// Literal require specifiers, in source order
    pub requires: Vec<String>,
}

/// Persisted transform result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Absolute path of the source file
    pub file_path: PathBuf,

    /// Blake3 hash of the original source
    pub content_hash: String,

    /// Transformed code
    pub transformed_code: String,

    /// Literal require specifiers, in source order
    pub requires: Vec<String>,
}

impl CacheEntry {
    pub fn from_record(record: TransformRecord) -> Self {
        Self {
            content_hash: hash_source(record.original.as_bytes()),
            file_path: record.file_path,
            transformed_code: record.transformed,
            requires: record.requires,
        }
    }

    /// Serialize to binary format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(CacheError::from)
    }

    /// Deserialize from binary format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(CacheError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_hash_comes_from_original() {
        let entry = CacheEntry::from_record(TransformRecord {
            file_path: PathBuf::from("/project/index.js"),
            original: "require('./a')".to_string(),
            transformed: "global.x = 1".to_string(),
            requires: vec![],
        });

        assert_eq!(entry.content_hash, hash_source(b"require('./a')"));
        assert_eq!(entry.transformed_code, "global.x = 1");
        assert!(entry.requires.is_empty());
    }

    #[test]
    fn test_entry_bytes_keep_require_order() {
        let entry = CacheEntry {
            file_path: PathBuf::from("/project/index.js"),
            content_hash: "abc".to_string(),
            transformed_code: String::new(),
            requires: vec!["./b".to_string(), "./a".to_string()],
        };

        let decoded = CacheEntry::from_bytes(&entry.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.requires, vec!["./b", "./a"]);
    }
}
