//! Content-hash keyed embedding cache
//!
//! Identical text is embedded once. Entries are never invalidated: changed
//! text hashes to a new key, and stale keys are simply never read again.

use anyhow::{Context, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const EMBEDDING_CACHE_FILE: &str = "embeddings.json";

/// Hex SHA-256 of the text
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

pub struct EmbeddingCache {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, Vec<f32>>>,
}

impl EmbeddingCache {
    /// Cache that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Load `<cache_dir>/embeddings.json`. Missing or unreadable files give an
    /// empty cache.
    pub fn open(cache_dir: &Path) -> Self {
        let path = cache_dir.join(EMBEDDING_CACHE_FILE);
        let entries = if path.exists() {
            match Self::read_entries(&path) {
                Ok(entries) => {
                    tracing::debug!(path = %path.display(), entries = entries.len(), "Loaded embedding cache");
                    entries
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to load embedding cache, starting empty"
                    );
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    fn read_entries(path: &Path) -> Result<HashMap<String, Vec<f32>>> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open embedding cache: {}", path.display()))?;
        file.lock_shared()
            .with_context(|| format!("Failed to acquire shared lock on: {}", path.display()))?;
        let entries = serde_json::from_reader(BufReader::new(&file))
            .with_context(|| format!("Failed to parse embedding cache: {}", path.display()))?;
        Ok(entries)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Vec<f32>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.entries().get(&content_hash(text)).cloned()
    }

    pub fn insert(&self, text: &str, vector: Vec<f32>) {
        self.entries().insert(content_hash(text), vector);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Write the cache to disk with an exclusive lock. No-op for in-memory caches.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create embedding cache: {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to acquire exclusive lock on: {}", path.display()))?;

        let entries = self.entries();
        let mut writer = BufWriter::new(&file);
        serde_json::to_writer(&mut writer, &*entries)
            .with_context(|| format!("Failed to write embedding cache: {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush embedding cache: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }

    #[test]
    fn test_insert_and_get() {
        let cache = EmbeddingCache::in_memory();
        assert!(cache.is_empty());
        cache.insert("fn main() {}", vec![0.5, 0.5]);
        assert_eq!(cache.get("fn main() {}"), Some(vec![0.5, 0.5]));
        assert_eq!(cache.get("fn other() {}"), None);
        assert!(cache.save().is_ok());
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::open(dir.path());
        cache.insert("alpha", vec![1.0, 0.0, 0.0]);
        cache.insert("beta", vec![0.0, 1.0, 0.0]);
        cache.save().unwrap();

        let reopened = EmbeddingCache::open(dir.path());
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("beta"), Some(vec![0.0, 1.0, 0.0]));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_save_reports_flush_failure() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(full, dir.path().join(EMBEDDING_CACHE_FILE)).unwrap();
        let cache = EmbeddingCache::open(dir.path());
        cache.insert("alpha", vec![1.0, 0.0]);
        assert!(cache.save().is_err());
    }

    #[test]
    fn test_corrupt_file_gives_empty_cache() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(EMBEDDING_CACHE_FILE), "{not json").unwrap();
        let cache = EmbeddingCache::open(dir.path());
        assert!(cache.is_empty());
    }
}
