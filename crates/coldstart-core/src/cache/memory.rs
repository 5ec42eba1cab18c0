use dashmap::DashMap;
use std::path::{Path, PathBuf};

use super::{CacheEntry, Result, TransformCache, TransformRecord};

/// Process-local cache used when persistence is disabled
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<(PathBuf, String), CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TransformCache for MemoryCache {
    fn get(&self, file_path: &Path, content_hash: &str) -> Result<Option<CacheEntry>> {
        let key = (file_path.to_path_buf(), content_hash.to_string());
        Ok(self.entries.get(&key).map(|entry| entry.clone()))
    }

    fn put(&self, record: TransformRecord) -> Result<CacheEntry> {
        let entry = CacheEntry::from_record(record);
        self.entries.insert(
            (entry.file_path.clone(), entry.content_hash.clone()),
            entry.clone(),
        );
        Ok(entry)
    }
}
