use dashmap::DashMap;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::hash::entry_file_stem;
use super::{
    CacheEntry, CacheError, Result, StoreManifest, TransformCache, TransformRecord,
    ENTRIES_DIR_NAME, MANIFEST_FILE_NAME,
};

const ENTRY_EXTENSION: &str = "bin";

/// How write failures are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Failed writes are returned to the caller
    #[default]
    Strict,
    /// Failed writes are logged and the entry is kept in memory only
    BestEffort,
}

type EntryKey = (PathBuf, String);

/// Directory-backed transform cache.
///
/// Layout under the cache directory:
///
/// ```text
/// manifest.bin              version, invalidation key, generation
/// entries/<generation>/     one bincode file per (path, content hash)
/// ```
///
/// Entries are written through on every `put`. `dispose` consumes the store,
/// so using it afterwards does not compile.
pub struct CacheStore {
    /// Base directory for the store
    cache_dir: PathBuf,

    /// Path to manifest file
    manifest_path: PathBuf,

    /// Key requested by this process
    invalidation_key: String,

    mode: CacheMode,

    /// Active generation, set by `load_or_create`
    generation: Option<u64>,

    /// Entries read or written during this session
    entries: DashMap<EntryKey, CacheEntry>,
}

impl CacheStore {
    /// Create a handle over `cache_dir`. Nothing touches the disk until
    /// [`load_or_create`](Self::load_or_create).
    pub fn new(cache_dir: impl Into<PathBuf>, invalidation_key: impl Into<String>) -> Self {
        let cache_dir = cache_dir.into();
        let manifest_path = cache_dir.join(MANIFEST_FILE_NAME);

        Self {
            cache_dir,
            manifest_path,
            invalidation_key: invalidation_key.into(),
            mode: CacheMode::default(),
            generation: None,
            entries: DashMap::new(),
        }
    }

    pub fn with_mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn invalidation_key(&self) -> &str {
        &self.invalidation_key
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Generation selected by the last `load_or_create`
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    /// Open the store, reusing the previous generation when its key matches
    /// and starting an empty one otherwise.
    ///
    /// Failures to read or write bookkeeping are logged and recovered from.
    /// When the generation directory or the manifest cannot be written, the
    /// store switches to [`CacheMode::BestEffort`] so later puts still
    /// succeed.
    pub fn load_or_create(&mut self) -> Result<()> {
        self.entries.clear();

        let generation = match self.read_manifest() {
            Some(manifest) if manifest.admits(&self.invalidation_key) => {
                info!(
                    "Reusing transform cache generation {} at {:?}",
                    manifest.generation, self.cache_dir
                );
                manifest.generation
            }
            Some(manifest) => {
                info!("Cache invalidation key changed, starting a new generation");
                self.next_generation(manifest.generation + 1)
            }
            None => {
                info!("No cache manifest found, creating new");
                self.next_generation(0)
            }
        };
        self.generation = Some(generation);

        let entries_dir = self.generation_dir(generation);
        let bookkeeping = std::fs::create_dir_all(&entries_dir)
            .map_err(|e| CacheError::io(&entries_dir, e))
            .and_then(|()| self.write_manifest(generation));
        if let Err(e) = bookkeeping {
            warn!("Cache directory is not writable, continuing best-effort: {}", e);
            self.mode = CacheMode::BestEffort;
        }

        Ok(())
    }

    /// Flush bookkeeping and release the store
    pub fn dispose(self) -> Result<()> {
        let generation = self.loaded_generation()?;

        match self.write_manifest(generation) {
            Ok(()) => {
                info!(
                    "Saved cache manifest ({} entries touched this session)",
                    self.entries.len()
                );
                Ok(())
            }
            Err(e) if self.mode == CacheMode::BestEffort => {
                warn!("Failed to persist cache manifest: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Number of entries visible under the current generation
    pub fn entry_count(&self) -> Result<usize> {
        Ok(self.visible_stems()?.len())
    }

    /// Keys of every entry visible under the current generation, sorted
    pub fn keys(&self) -> Result<Vec<(PathBuf, String)>> {
        let generation = self.loaded_generation()?;
        let mut keys: Vec<EntryKey> = self.entries.iter().map(|e| e.key().clone()).collect();

        for path in self.entry_files(generation) {
            let decoded = std::fs::read(&path)
                .ok()
                .and_then(|bytes| CacheEntry::from_bytes(&bytes).ok());
            if let Some(entry) = decoded {
                keys.push((entry.file_path, entry.content_hash));
            }
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn visible_stems(&self) -> Result<FxHashSet<String>> {
        let generation = self.loaded_generation()?;

        let mut stems: FxHashSet<String> = self
            .entry_files(generation)
            .into_iter()
            .filter_map(|path| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .collect();
        for entry in self.entries.iter() {
            let (path, hash) = entry.key();
            stems.insert(entry_file_stem(path, hash));
        }

        Ok(stems)
    }

    fn loaded_generation(&self) -> Result<u64> {
        self.generation.ok_or_else(|| CacheError::NotLoaded {
            path: self.cache_dir.clone(),
        })
    }

    fn entries_root(&self) -> PathBuf {
        self.cache_dir.join(ENTRIES_DIR_NAME)
    }

    fn generation_dir(&self, generation: u64) -> PathBuf {
        self.entries_root().join(generation.to_string())
    }

    fn entry_path(&self, generation: u64, file_path: &Path, content_hash: &str) -> PathBuf {
        self.generation_dir(generation).join(format!(
            "{}.{}",
            entry_file_stem(file_path, content_hash),
            ENTRY_EXTENSION
        ))
    }

    fn entry_files(&self, generation: u64) -> Vec<PathBuf> {
        let Ok(dir) = std::fs::read_dir(self.generation_dir(generation)) else {
            return Vec::new();
        };

        dir.filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION))
            .collect()
    }

    /// Pick a generation no earlier run has written to, so a missing or
    /// corrupted manifest never resurrects old entries
    fn next_generation(&self, floor: u64) -> u64 {
        let highest_on_disk = std::fs::read_dir(self.entries_root())
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u64>().ok())
            .max();

        match highest_on_disk {
            Some(highest) => floor.max(highest + 1),
            None => floor,
        }
    }

    fn read_manifest(&self) -> Option<StoreManifest> {
        if !self.manifest_path.exists() {
            return None;
        }

        match std::fs::read(&self.manifest_path) {
            Ok(bytes) => match StoreManifest::from_bytes(&bytes) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!("Corrupted cache manifest: {:?}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read cache manifest: {:?}", e);
                None
            }
        }
    }

    fn write_manifest(&self, generation: u64) -> Result<()> {
        let manifest = StoreManifest::new(self.invalidation_key.clone(), generation);
        write_atomic(&self.manifest_path, &manifest.to_bytes()?)
    }
}

impl TransformCache for CacheStore {
    fn get(&self, file_path: &Path, content_hash: &str) -> Result<Option<CacheEntry>> {
        let generation = self.loaded_generation()?;
        let key = (file_path.to_path_buf(), content_hash.to_string());

        if let Some(entry) = self.entries.get(&key) {
            return Ok(Some(entry.clone()));
        }

        let entry_file = self.entry_path(generation, file_path, content_hash);
        let bytes = match std::fs::read(&entry_file) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!("Failed to read cache file for {:?}: {:?}", file_path, e);
                return Ok(None); // Treat as cache miss
            }
        };

        match CacheEntry::from_bytes(&bytes) {
            Ok(entry) if entry.file_path == file_path && entry.content_hash == content_hash => {
                self.entries.insert(key, entry.clone());
                Ok(Some(entry))
            }
            Ok(_) => {
                warn!("Cache file for {:?} belongs to another key", file_path);
                Ok(None)
            }
            Err(e) => {
                warn!("Corrupted cache file for {:?}: {:?}", file_path, e);
                Ok(None)
            }
        }
    }

    fn put(&self, record: TransformRecord) -> Result<CacheEntry> {
        let generation = self.loaded_generation()?;
        let entry = CacheEntry::from_record(record);
        let entry_file = self.entry_path(generation, &entry.file_path, &entry.content_hash);
        let bytes = entry.to_bytes()?;

        // The shard lock is held across the write, serializing puts to one key
        let slot = self
            .entries
            .entry((entry.file_path.clone(), entry.content_hash.clone()));

        match write_atomic(&entry_file, &bytes) {
            Ok(()) => debug!("Cached transform of {:?}", entry.file_path),
            Err(e) if self.mode == CacheMode::BestEffort => {
                warn!("Keeping cache entry in memory only: {}", e);
            }
            Err(e) => return Err(e),
        }

        slot.insert(entry.clone());
        Ok(entry)
    }
}

/// Write through a sibling temp file and rename, so readers never observe a
/// partially written file
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
    }

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, bytes).map_err(|e| CacheError::io(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| CacheError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(path: &str, original: &str, transformed: &str) -> TransformRecord {
        TransformRecord {
            file_path: PathBuf::from(path),
            original: original.to_string(),
            transformed: transformed.to_string(),
            requires: vec!["./dep".to_string()],
        }
    }

    fn open(dir: &Path, key: &str) -> CacheStore {
        let mut store = CacheStore::new(dir, key);
        store.load_or_create().unwrap();
        store
    }

    #[test]
    fn test_get_before_load_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path(), "key");

        let result = store.get(Path::new("/a.js"), "hash");
        assert!(matches!(result, Err(CacheError::NotLoaded { .. })));
    }

    #[test]
    fn test_load_creates_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(temp_dir.path(), "key");

        assert!(temp_dir.path().join(MANIFEST_FILE_NAME).exists());
        assert_eq!(store.generation(), Some(0));
        assert_eq!(store.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_entries_survive_reload_with_same_key() {
        let temp_dir = TempDir::new().unwrap();

        let store = open(temp_dir.path(), "key");
        let stored = store.put(record("/p/a.js", "source", "code")).unwrap();
        store.dispose().unwrap();

        let store = open(temp_dir.path(), "key");
        let loaded = store
            .get(Path::new("/p/a.js"), &stored.content_hash)
            .unwrap()
            .expect("entry should be visible");
        assert_eq!(loaded, stored);
        assert_eq!(store.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_key_change_hides_entries() {
        let temp_dir = TempDir::new().unwrap();

        let store = open(temp_dir.path(), "key-a");
        let stored = store.put(record("/p/a.js", "source", "code")).unwrap();
        store.dispose().unwrap();

        let store = open(temp_dir.path(), "key-b");
        assert!(store
            .get(Path::new("/p/a.js"), &stored.content_hash)
            .unwrap()
            .is_none());
        assert_eq!(store.entry_count().unwrap(), 0);
        store.dispose().unwrap();

        // Switching back does not resurrect the first generation either
        let store = open(temp_dir.path(), "key-a");
        assert!(store
            .get(Path::new("/p/a.js"), &stored.content_hash)
            .unwrap()
            .is_none());
        assert_eq!(store.generation(), Some(2));
    }

    #[test]
    fn test_old_generation_is_not_deleted() {
        let temp_dir = TempDir::new().unwrap();

        let store = open(temp_dir.path(), "key-a");
        store.put(record("/p/a.js", "source", "code")).unwrap();
        store.dispose().unwrap();

        let store = open(temp_dir.path(), "key-b");
        store.dispose().unwrap();

        let old_dir = temp_dir.path().join(ENTRIES_DIR_NAME).join("0");
        assert_eq!(std::fs::read_dir(old_dir).unwrap().count(), 1);
    }

    #[test]
    fn test_put_overwrites_same_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(temp_dir.path(), "key");

        let first = store.put(record("/p/a.js", "source", "first")).unwrap();
        let second = store.put(record("/p/a.js", "source", "second")).unwrap();
        assert_eq!(first.content_hash, second.content_hash);
        store.dispose().unwrap();

        let store = open(temp_dir.path(), "key");
        let loaded = store
            .get(Path::new("/p/a.js"), &first.content_hash)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.transformed_code, "second");
        assert_eq!(store.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_corrupted_manifest_starts_fresh_generation() {
        let temp_dir = TempDir::new().unwrap();

        let store = open(temp_dir.path(), "key");
        let stored = store.put(record("/p/a.js", "source", "code")).unwrap();
        store.dispose().unwrap();

        std::fs::write(temp_dir.path().join(MANIFEST_FILE_NAME), b"garbage").unwrap();

        let store = open(temp_dir.path(), "key");
        assert_eq!(store.generation(), Some(1));
        assert!(store
            .get(Path::new("/p/a.js"), &stored.content_hash)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_corrupted_entry_is_a_miss() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(temp_dir.path(), "key");
        let stored = store.put(record("/p/a.js", "source", "code")).unwrap();
        store.dispose().unwrap();

        let entry_file = temp_dir
            .path()
            .join(ENTRIES_DIR_NAME)
            .join("0")
            .join(format!(
                "{}.bin",
                entry_file_stem(Path::new("/p/a.js"), &stored.content_hash)
            ));
        std::fs::write(entry_file, b"not bincode").unwrap();

        let store = open(temp_dir.path(), "key");
        assert!(store
            .get(Path::new("/p/a.js"), &stored.content_hash)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_strict_put_surfaces_write_failure() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(temp_dir.path(), "key");
        assert_eq!(store.mode(), CacheMode::Strict);

        // Replace the generation directory with a plain file
        let generation_dir = temp_dir.path().join(ENTRIES_DIR_NAME).join("0");
        std::fs::remove_dir_all(&generation_dir).unwrap();
        std::fs::write(&generation_dir, b"a file, not a directory").unwrap();

        let result = store.put(record("/p/a.js", "source", "code"));
        assert!(matches!(result, Err(CacheError::Io { .. })));
    }

    #[test]
    fn test_failed_load_falls_back_to_best_effort() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"a file, not a directory").unwrap();

        let mut store = CacheStore::new(&blocker, "key");
        store.load_or_create().unwrap();
        assert_eq!(store.mode(), CacheMode::BestEffort);

        let stored = store.put(record("/p/a.js", "source", "code")).unwrap();
        let loaded = store.get(Path::new("/p/a.js"), &stored.content_hash).unwrap();
        assert_eq!(loaded, Some(stored));
        assert!(store.dispose().is_ok());
    }

    #[test]
    fn test_best_effort_put_keeps_entry_in_memory() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"a file, not a directory").unwrap();

        let mut store = CacheStore::new(&blocker, "key").with_mode(CacheMode::BestEffort);
        store.load_or_create().unwrap();

        let stored = store.put(record("/p/a.js", "source", "code")).unwrap();
        let loaded = store.get(Path::new("/p/a.js"), &stored.content_hash).unwrap();
        assert_eq!(loaded, Some(stored));
        assert!(store.dispose().is_ok());
    }

    #[test]
    fn test_keys_lists_entries() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(temp_dir.path(), "key");
        let a = store.put(record("/p/a.js", "a", "a")).unwrap();
        let b = store.put(record("/p/b.js", "b", "b")).unwrap();

        let keys = store.keys().unwrap();
        assert_eq!(
            keys,
            vec![
                (PathBuf::from("/p/a.js"), a.content_hash),
                (PathBuf::from("/p/b.js"), b.content_hash),
            ]
        );
    }
}
