//! On-disk index cache
//!
//! Two artifacts live in the cache directory alongside the embedding cache
//! and the vector store:
//! - `file_index.json`: relative path -> modification time, unit count, last indexed
//! - `lexical_index.bin`: the unit corpus and fitted BM25 state
//!
//! Writes take an exclusive lock, reads a shared one. Each artifact can be lost
//! or corrupted independently; the loader degrades to an empty piece.

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

use crate::chunking::CodeUnit;
use crate::search::LexicalScorer;

pub const FILE_INDEX_FILE: &str = "file_index.json";
pub const LEXICAL_INDEX_FILE: &str = "lexical_index.bin";

/// Per-file bookkeeping for change detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Modification time in seconds since the epoch
    pub mtime: f64,
    #[serde(rename = "chunk_count")]
    pub unit_count: usize,
    /// RFC 3339 timestamp
    pub last_indexed: String,
}

impl FileRecord {
    pub fn new(mtime: f64, unit_count: usize) -> Self {
        Self {
            mtime,
            unit_count,
            last_indexed: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub type FileRecords = BTreeMap<String, FileRecord>;

/// Persisted lexical state
#[derive(Serialize, Deserialize)]
pub struct LexicalSnapshot {
    /// Version for forward compatibility
    pub version: u32,
    /// Chunking and scoring configuration the snapshot was built with
    pub fingerprint: String,
    pub units: Vec<CodeUnit>,
    pub scorer: LexicalScorer,
}

impl LexicalSnapshot {
    /// Current persistence format version (bump this when format changes)
    pub const CURRENT_VERSION: u32 = 1;
}

/// Borrowed twin of [`LexicalSnapshot`] so saving does not clone the corpus.
/// Field order and types must stay in step with the owned struct.
#[derive(Serialize)]
struct LexicalSnapshotRef<'a> {
    version: u32,
    fingerprint: &'a str,
    units: &'a [CodeUnit],
    scorer: &'a LexicalScorer,
}

/// Modification time of `path` in fractional seconds
pub fn get_mtime(path: &Path) -> Option<f64> {
    let modified = path.metadata().ok()?.modified().ok()?;
    Some(modified.duration_since(UNIX_EPOCH).ok()?.as_secs_f64())
}

#[derive(Debug, Clone)]
pub struct IndexCache {
    dir: PathBuf,
}

impl IndexCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_index_path(&self) -> PathBuf {
        self.dir.join(FILE_INDEX_FILE)
    }

    pub fn lexical_index_path(&self) -> PathBuf {
        self.dir.join(LEXICAL_INDEX_FILE)
    }

    /// Load the file index. Missing or unreadable gives an empty map.
    pub fn load_file_index(&self) -> FileRecords {
        let path = self.file_index_path();
        if !path.exists() {
            return FileRecords::new();
        }
        match read_file_index(&path) {
            Ok(records) => {
                debug!(path = %path.display(), files = records.len(), "Loaded file index");
                records
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load file index, starting fresh");
                FileRecords::new()
            }
        }
    }

    pub fn save_file_index(&self, records: &FileRecords) -> Result<()> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create cache directory: {}", self.dir.display())
        })?;
        let path = self.file_index_path();
        let file = File::create(&path)
            .with_context(|| format!("Failed to create file index: {}", path.display()))?;
        file.lock_exclusive()
            .context("Failed to acquire exclusive lock on file index")?;
        let mut writer = BufWriter::new(&file);
        serde_json::to_writer_pretty(&mut writer, records).context("Failed to write file index")?;
        writer.flush().context("Failed to flush file index")?;
        Ok(())
    }

    /// Load the lexical snapshot if present, readable, current, and built with
    /// the same configuration fingerprint.
    pub fn load_snapshot(&self, fingerprint: &str) -> Option<LexicalSnapshot> {
        let path = self.lexical_index_path();
        if !path.exists() {
            return None;
        }
        let snapshot = match read_snapshot(&path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load lexical index, rebuilding");
                return None;
            }
        };
        if snapshot.version != LexicalSnapshot::CURRENT_VERSION {
            warn!(
                found = snapshot.version,
                expected = LexicalSnapshot::CURRENT_VERSION,
                "Lexical index version mismatch, rebuilding"
            );
            return None;
        }
        if snapshot.fingerprint != fingerprint {
            warn!("Chunking or scoring configuration changed since last index, rebuilding");
            return None;
        }
        Some(snapshot)
    }

    pub fn save_snapshot(
        &self,
        fingerprint: &str,
        units: &[CodeUnit],
        scorer: &LexicalScorer,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create cache directory: {}", self.dir.display())
        })?;
        let path = self.lexical_index_path();
        let file = File::create(&path)
            .with_context(|| format!("Failed to create lexical index: {}", path.display()))?;
        file.lock_exclusive()
            .context("Failed to acquire exclusive lock on lexical index")?;

        let snapshot = LexicalSnapshotRef {
            version: LexicalSnapshot::CURRENT_VERSION,
            fingerprint,
            units,
            scorer,
        };
        let mut writer = BufWriter::new(&file);
        bincode::serialize_into(&mut writer, &snapshot)
            .context("Failed to serialize lexical index")?;
        writer.flush().context("Failed to flush lexical index")?;
        debug!(path = %path.display(), units = units.len(), "Saved lexical index");
        Ok(())
    }
}

fn read_file_index(path: &Path) -> Result<FileRecords> {
    let file = File::open(path)?;
    file.lock_shared()
        .context("Failed to acquire shared lock on file index")?;
    let records = serde_json::from_reader(BufReader::new(&file))?;
    Ok(records)
}

fn read_snapshot(path: &Path) -> Result<LexicalSnapshot> {
    let file = File::open(path)?;
    file.lock_shared()
        .context("Failed to acquire shared lock on lexical index")?;
    let snapshot = bincode::deserialize_from(BufReader::new(&file))?;
    Ok(snapshot)
}
