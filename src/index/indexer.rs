//! Corpus owner: drives chunking, lexical fitting, embedding and vector storage,
//! and keeps the on-disk cache in step.

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::discovery::FileFilter;
use super::persistence::{get_mtime, FileRecord, FileRecords, IndexCache};
use crate::chunking::{Chunker, CodeChunker, CodeUnit};
use crate::config::Config;
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::search::{FusionWeights, HybridSearcher, LexicalScorer, ScoredUnit};
use crate::utils::{format_number, is_binary_content};
use crate::vector::{create_vector_store, VectorBackend, VectorStore};

/// File counts from one `update()`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl UpdateSummary {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

impl fmt::Display for UpdateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} updated, {} removed",
            self.added, self.updated, self.removed
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub files: usize,
    pub units: usize,
    pub vectors: usize,
    pub backend: VectorBackend,
    pub embedding_model: String,
    pub embeddings_available: bool,
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Files:      {}", format_number(self.files))?;
        writeln!(f, "Units:      {}", format_number(self.units))?;
        writeln!(f, "Vectors:    {} ({})", format_number(self.vectors), self.backend)?;
        let status = if self.embeddings_available {
            "available"
        } else {
            "unavailable"
        };
        write!(f, "Embeddings: {} ({})", self.embedding_model, status)
    }
}

/// An eligible file as seen on disk right now
struct DiskFile {
    relative: String,
    path: PathBuf,
    mtime: f64,
}

struct ChunkedFile {
    relative: String,
    mtime: f64,
    units: Vec<CodeUnit>,
}

/// Incremental index over one project root.
///
/// The indexer is the only mutator of the corpus, the file table and the
/// vector store. The lexical scorer is always fitted over `units` in order, so
/// lexical document indices are positions in `units`.
pub struct IncrementalIndexer {
    root: PathBuf,
    cache: IndexCache,
    filter: FileFilter,
    chunker: Box<dyn Chunker>,
    scorer: LexicalScorer,
    store: Box<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    units: Vec<CodeUnit>,
    records: FileRecords,
    weights: FusionWeights,
    default_top_k: usize,
    fingerprint: String,
}

impl IncrementalIndexer {
    /// Build an indexer with the configured chunker, embedding provider and
    /// vector backend, reloading any cache under `root`.
    pub fn open(config: &Config, root: &Path) -> Result<Self> {
        config.validate()?;
        let cache_dir = root.join(&config.indexer.cache_dir);
        let embedder = create_provider(&config.embeddings, &cache_dir);
        let store = create_vector_store(&config.vector, &cache_dir);
        let chunker = Box::new(CodeChunker::new(config.chunking.clone()));
        Self::with_components(config, root, chunker, embedder, store)
    }

    /// Build an indexer around caller-supplied components.
    pub fn with_components(
        config: &Config,
        root: &Path,
        chunker: Box<dyn Chunker>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Box<dyn VectorStore>,
    ) -> Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("Project root is not a directory: {}", root.display());
        }
        let filter = FileFilter::new(root, &config.indexer)
            .context("Invalid include/exclude configuration")?;

        let mut indexer = Self {
            root: root.to_path_buf(),
            cache: IndexCache::new(root.join(&config.indexer.cache_dir)),
            filter,
            chunker,
            scorer: LexicalScorer::new(config.search.k1, config.search.b),
            store,
            embedder,
            units: Vec::new(),
            records: FileRecords::new(),
            weights: config.search.weights(),
            default_top_k: config.search.default_top_k,
            fingerprint: config.fingerprint(),
        };
        indexer.load_cache();
        Ok(indexer)
    }

    /// Replace in-memory state with whatever the cache holds.
    pub fn reload(&mut self) {
        self.units.clear();
        self.records.clear();
        self.scorer.clear();
        self.load_cache();
    }

    fn load_cache(&mut self) {
        let records = self.cache.load_file_index();
        let Some(snapshot) = self.cache.load_snapshot(&self.fingerprint) else {
            // Without the corpus the file table would hide every file from update()
            if !records.is_empty() {
                info!("Lexical index missing or stale, files will be re-chunked on next update");
            }
            self.store.clear();
            return;
        };

        let total = snapshot.units.len();
        let units: Vec<CodeUnit> = snapshot
            .units
            .into_iter()
            .filter(|u| records.contains_key(&u.file_path))
            .collect();

        if units.len() == total {
            self.scorer = snapshot.scorer;
        } else {
            warn!(
                dropped = total - units.len(),
                "Lexical index has units without file records, refitting"
            );
            self.scorer.fit(&contents(&units));
        }
        self.units = units;
        self.records = records;
        self.hydrate_vectors();

        info!(
            files = self.records.len(),
            units = self.units.len(),
            vectors = self.store.len(),
            "Loaded index from cache"
        );
    }

    /// Bring the vector store in line with the corpus without network calls
    fn hydrate_vectors(&mut self) {
        if self.units.is_empty() {
            self.store.clear();
            return;
        }
        if self.store.len() == self.units.len() {
            return;
        }

        self.store.clear();
        let mut units = Vec::new();
        let mut vectors = Vec::new();
        for unit in &self.units {
            if let Some(vector) = self.embedder.cached_embedding(&unit.content) {
                units.push(unit.clone());
                vectors.push(vector);
            }
        }
        if units.is_empty() {
            return;
        }
        let count = units.len();
        match self.store.add(&units, vectors) {
            Ok(()) => debug!(vectors = count, "Rebuilt vector index from embedding cache"),
            Err(e) => warn!(error = %e, "Failed to rebuild vector index from cache"),
        }
    }

    /// Full rebuild. Returns the number of units indexed.
    pub async fn index(&mut self) -> Result<usize> {
        let start = Instant::now();
        self.store.clear();
        self.units.clear();
        self.records.clear();

        let files = self.scan();
        let chunked = self.chunk_files(&files);
        for file in chunked {
            self.records
                .insert(file.relative, FileRecord::new(file.mtime, file.units.len()));
            self.units.extend(file.units);
        }

        self.refit();
        let all = self.units.clone();
        self.embed_units(&all).await;
        self.persist()?;

        info!(
            files = self.records.len(),
            units = self.units.len(),
            vectors = self.store.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Indexed project"
        );
        Ok(self.units.len())
    }

    /// Re-process files whose modification time changed since the last run.
    ///
    /// Nothing is written to disk when no file changed.
    pub async fn update(&mut self) -> Result<UpdateSummary> {
        let files = self.scan();

        let mut changed = Vec::new();
        let mut summary = UpdateSummary::default();
        for file in &files {
            match self.records.get(&file.relative) {
                None => {
                    summary.added += 1;
                    changed.push(file);
                }
                Some(record) if record.mtime != file.mtime => {
                    summary.updated += 1;
                    changed.push(file);
                }
                Some(_) => {}
            }
        }

        let on_disk: std::collections::HashSet<&str> =
            files.iter().map(|f| f.relative.as_str()).collect();
        let deleted: Vec<String> = self
            .records
            .keys()
            .filter(|k| !on_disk.contains(k.as_str()))
            .cloned()
            .collect();
        summary.removed = deleted.len();

        if summary.is_empty() {
            debug!("No changes detected");
            return Ok(summary);
        }

        for relative in &deleted {
            self.remove_file(relative);
        }
        for file in &changed {
            self.remove_file(&file.relative);
        }

        let chunked = self.chunk_files(changed.iter().copied());
        let mut fresh = Vec::new();
        for file in chunked {
            self.records
                .insert(file.relative, FileRecord::new(file.mtime, file.units.len()));
            fresh.extend(file.units);
        }
        self.units.extend(fresh.iter().cloned());

        self.refit();
        self.embed_units(&fresh).await;
        self.persist()?;

        info!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            units = self.units.len(),
            "Index updated"
        );
        Ok(summary)
    }

    /// Hybrid search over the current corpus.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<ScoredUnit> {
        HybridSearcher::new(
            &self.scorer,
            self.store.as_ref(),
            self.embedder.as_ref(),
            self.weights,
        )
        .search(query, top_k, &self.units)
        .await
    }

    fn scan(&self) -> Vec<DiskFile> {
        self.filter
            .collect()
            .into_iter()
            .filter_map(|path| {
                let mtime = get_mtime(&path)?;
                Some(DiskFile {
                    relative: self.filter.relative(&path),
                    path,
                    mtime,
                })
            })
            .collect()
    }

    /// Read and chunk files in parallel. Mutation happens afterwards on one thread.
    fn chunk_files<'f>(&self, files: impl IntoIterator<Item = &'f DiskFile>) -> Vec<ChunkedFile> {
        let files: Vec<&DiskFile> = files.into_iter().collect();
        files
            .par_iter()
            .map(|file| ChunkedFile {
                relative: file.relative.clone(),
                mtime: file.mtime,
                units: self.chunk_file(file),
            })
            .collect()
    }

    fn chunk_file(&self, file: &DiskFile) -> Vec<CodeUnit> {
        let content = match std::fs::read(&file.path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(content) => content,
                Err(_) => {
                    warn!(path = %file.relative, "Skipping file that is not valid UTF-8");
                    return Vec::new();
                }
            },
            Err(e) => {
                warn!(path = %file.relative, error = %e, "Failed to read file");
                return Vec::new();
            }
        };
        if is_binary_content(&content) {
            warn!(path = %file.relative, "Skipping binary content");
            return Vec::new();
        }
        let units = self.chunker.chunk(&file.relative, &content);
        debug!(path = %file.relative, units = units.len(), "Chunked file");
        units
    }

    fn remove_file(&mut self, relative: &str) {
        self.units.retain(|u| u.file_path != relative);
        self.store.remove(relative);
        self.records.remove(relative);
    }

    fn refit(&mut self) {
        if self.units.is_empty() {
            self.scorer.clear();
        } else {
            self.scorer.fit(&contents(&self.units));
        }
    }

    async fn embed_units(&mut self, units: &[CodeUnit]) {
        if units.is_empty() || !self.embedder.is_available() {
            return;
        }
        let texts: Vec<String> = units.iter().map(|u| u.content.clone()).collect();
        match self.embedder.embed(&texts).await {
            Ok(vectors) if vectors.len() == units.len() => {
                if let Err(e) = self.store.add(units, vectors) {
                    warn!(error = %e, "Failed to add vectors, vector search will be incomplete");
                }
            }
            Ok(vectors) if vectors.is_empty() => {
                debug!("Embedding provider returned nothing, skipping vector index");
            }
            Ok(vectors) => {
                warn!(
                    expected = units.len(),
                    actual = vectors.len(),
                    "Embedding count mismatch, skipping vector index"
                );
            }
            Err(e) => warn!(error = %e, "Embedding failed, using lexical search only"),
        }
    }

    fn persist(&self) -> Result<()> {
        self.cache.save_file_index(&self.records)?;
        self.cache
            .save_snapshot(&self.fingerprint, &self.units, &self.scorer)?;
        self.store.flush().context("Failed to save vector index")?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn units(&self) -> &[CodeUnit] {
        &self.units
    }

    pub fn filter(&self) -> &FileFilter {
        &self.filter
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    pub fn vector_store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache.dir()
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            files: self.records.len(),
            units: self.units.len(),
            vectors: self.store.len(),
            backend: self.store.backend(),
            embedding_model: self.embedder.model_name().to_string(),
            embeddings_available: self.embedder.is_available(),
        }
    }
}

fn contents(units: &[CodeUnit]) -> Vec<&str> {
    units.iter().map(|u| u.content.as_str()).collect()
}
