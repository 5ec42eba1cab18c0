use std::path::Path;

use super::CACHE_VERSION;

/// Compute the Blake3 content hash of a source buffer
pub fn hash_source(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Compute the Blake3 content hash of a file on disk
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let content = std::fs::read(path)?;
    Ok(hash_source(&content))
}

/// Fold the tool version and cache format into a caller-supplied key.
///
/// Upgrading coldstart can change what the default transform emits, so the
/// version is part of every key the CLI hands to a store.
pub fn derive_invalidation_key(user_key: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
    hasher.update(&CACHE_VERSION.to_le_bytes());
    hasher.update(user_key.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Stable file name for an entry key
pub(crate) fn entry_file_stem(file_path: &Path, content_hash: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(file_path.to_string_lossy().as_bytes());
    hasher.update(&[0]);
    hasher.update(content_hash.as_bytes());
    hasher.finalize().to_hex().to_string()
}
