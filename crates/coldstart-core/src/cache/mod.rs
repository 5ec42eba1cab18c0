//! Persistent transform cache
//!
//! Transform results are stored per (absolute file path, content hash). The
//! whole store is gated by an invalidation key: opening a store with a key that
//! differs from the one persisted by the previous run makes every earlier entry
//! unreachable, so any change that affects transform output only needs to be
//! folded into the key (see [`derive_invalidation_key`]).
//!
//! Entries are trusted as-is. In particular the recorded require specifiers are
//! never re-checked against the file, which lets callers pre-seed an entry to
//! cut off a whole subtree of the graph. Seeding a stale entry silently prunes
//! real dependencies, so use it deliberately.

mod entry;
mod error;
mod hash;
mod manifest;
mod memory;
mod store;

pub use entry::{CacheEntry, TransformRecord};
pub use error::{CacheError, Result};
pub use hash::{derive_invalidation_key, hash_file, hash_source};
pub use manifest::StoreManifest;
pub use memory::MemoryCache;
pub use store::{CacheMode, CacheStore};

use std::path::Path;

/// Cache format version - increment when the on-disk layout changes
pub const CACHE_VERSION: u32 = 1;

/// Store manifest file name
pub const MANIFEST_FILE_NAME: &str = "manifest.bin";

/// Entries subdirectory name; each generation gets its own child directory
pub const ENTRIES_DIR_NAME: &str = "entries";

/// Lookup and insertion interface the graph resolver works against.
///
/// Implementations must be safe to call from several threads at once; puts to
/// the same key are serialized by the implementation.
pub trait TransformCache: Send + Sync {
    /// Look up the transform result recorded for `file_path` at `content_hash`.
    fn get(&self, file_path: &Path, content_hash: &str) -> Result<Option<CacheEntry>>;

    /// Record a transform result, keyed by the path and the hash of its
    /// original source. Overwrites an existing entry at the same key.
    fn put(&self, record: TransformRecord) -> Result<CacheEntry>;
}
