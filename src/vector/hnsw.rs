//! HNSW-backed approximate vector store
//!
//! The graph itself is not serialized. Live vectors are persisted to
//! `vectors.bin` and the graph is rebuilt from them on open. hnsw_rs has no
//! deletion, so removed entries are tombstoned and the graph is compacted once
//! tombstones outnumber live entries.

use fs2::FileExt;
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{cosine_similarity, is_zero_vector, validate_batch, VectorBackend, VectorStore, VectorStoreError};
use crate::chunking::CodeUnit;

const VECTORS_FILE: &str = "vectors.bin";
const MAX_LAYERS: usize = 16;

/// Graph construction and query parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HnswParams {
    pub max_connections: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub max_elements: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            max_connections: 16,
            ef_construction: 200,
            ef_search: 64,
            max_elements: 100_000,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedVectors {
    version: u32,
    dimension: Option<usize>,
    entries: Vec<(CodeUnit, Vec<f32>)>,
}

impl PersistedVectors {
    const CURRENT_VERSION: u32 = 1;
}

pub struct HnswVectorStore {
    dir: Option<PathBuf>,
    params: HnswParams,
    graph: Hnsw<'static, f32, DistCosine>,
    /// Indexed by graph data id; `None` marks a tombstone
    slots: Vec<Option<(CodeUnit, Vec<f32>)>>,
    live: usize,
    /// Points inserted into the current graph
    graph_points: usize,
    dimension: Option<usize>,
}

fn new_graph(params: &HnswParams) -> Hnsw<'static, f32, DistCosine> {
    Hnsw::<f32, DistCosine>::new(
        params.max_connections,
        params.max_elements,
        MAX_LAYERS,
        params.ef_construction,
        DistCosine {},
    )
}

impl HnswVectorStore {
    /// Store without persistence
    pub fn in_memory(params: HnswParams) -> Self {
        Self {
            dir: None,
            params,
            graph: new_graph(&params),
            slots: Vec::new(),
            live: 0,
            graph_points: 0,
            dimension: None,
        }
    }

    /// Open the store in `dir`, rebuilding the graph from any persisted vectors.
    /// An unreadable vector file gives an empty store.
    pub fn open(dir: &Path, params: HnswParams) -> Result<Self, VectorStoreError> {
        std::fs::create_dir_all(dir)?;

        let mut store = Self::in_memory(params);
        store.dir = Some(dir.to_path_buf());

        let path = dir.join(VECTORS_FILE);
        if path.exists() {
            match Self::load(&path) {
                Ok(persisted) => {
                    let (units, vectors): (Vec<CodeUnit>, Vec<Vec<f32>>) =
                        persisted.entries.into_iter().unzip();
                    store.add(&units, vectors)?;
                    debug!(path = %path.display(), vectors = store.live, "Rebuilt HNSW graph");
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to load persisted vectors, starting empty"
                    );
                }
            }
        }
        Ok(store)
    }

    fn load(path: &Path) -> Result<PersistedVectors, VectorStoreError> {
        let file = std::fs::File::open(path)?;
        file.lock_shared()?;
        let persisted: PersistedVectors = bincode::deserialize_from(std::io::BufReader::new(&file))
            .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
        if persisted.version != PersistedVectors::CURRENT_VERSION {
            return Err(VectorStoreError::Serialization(format!(
                "vector file version mismatch: found {}, expected {}",
                persisted.version,
                PersistedVectors::CURRENT_VERSION
            )));
        }
        Ok(persisted)
    }

    fn insert(&mut self, unit: CodeUnit, vector: Vec<f32>) {
        let slot = self.slots.len();
        if !is_zero_vector(&vector) {
            self.graph.insert_slice((vector.as_slice(), slot));
            self.graph_points += 1;
        }
        self.slots.push(Some((unit, vector)));
        self.live += 1;
    }

    fn tombstones(&self) -> usize {
        self.slots.len() - self.live
    }

    /// Rebuild the graph from live entries only
    fn compact(&mut self) {
        let entries: Vec<(CodeUnit, Vec<f32>)> = std::mem::take(&mut self.slots)
            .into_iter()
            .flatten()
            .collect();
        debug!(live = entries.len(), "Compacting HNSW graph");

        self.graph = new_graph(&self.params);
        self.live = 0;
        self.graph_points = 0;
        for (unit, vector) in entries {
            self.insert(unit, vector);
        }
    }
}

impl VectorStore for HnswVectorStore {
    fn add(&mut self, units: &[CodeUnit], vectors: Vec<Vec<f32>>) -> Result<(), VectorStoreError> {
        self.dimension = validate_batch(units, &vectors, self.dimension)?;
        for (unit, vector) in units.iter().cloned().zip(vectors) {
            self.insert(unit, vector);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Vec<(CodeUnit, f32)> {
        if top_k == 0 || self.graph_points == 0 || is_zero_vector(query) {
            return Vec::new();
        }
        if self.dimension.is_some_and(|d| d != query.len()) {
            return Vec::new();
        }

        // Over-fetch so tombstoned neighbours do not starve the result
        let knbn = top_k
            .saturating_mul(2)
            .saturating_add(self.tombstones())
            .min(self.graph_points)
            .max(1);
        let ef = self.params.ef_search.max(knbn);

        let mut results: Vec<(CodeUnit, f32)> = self
            .graph
            .search(query, knbn, ef)
            .into_iter()
            .filter_map(|n| {
                let (unit, vector) = self.slots.get(n.d_id)?.as_ref()?;
                Some((unit.clone(), cosine_similarity(query, vector)))
            })
            .collect();

        results.sort_by(|a, b| b.1.total_cmp(&a.1));
        results.truncate(top_k);
        results
    }

    fn remove(&mut self, file_path: &str) -> usize {
        let mut removed = 0;
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|(unit, _)| unit.file_path == file_path) {
                *slot = None;
                removed += 1;
            }
        }
        self.live -= removed;

        if removed > 0 && self.tombstones() > self.live {
            self.compact();
        }
        removed
    }

    fn clear(&mut self) {
        self.graph = new_graph(&self.params);
        self.slots.clear();
        self.live = 0;
        self.graph_points = 0;
        self.dimension = None;
    }

    fn len(&self) -> usize {
        self.live
    }

    fn backend(&self) -> VectorBackend {
        VectorBackend::Hnsw
    }

    fn flush(&self) -> Result<(), VectorStoreError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;

        let persisted = PersistedVectors {
            version: PersistedVectors::CURRENT_VERSION,
            dimension: self.dimension,
            entries: self.slots.iter().flatten().cloned().collect(),
        };

        let path = dir.join(VECTORS_FILE);
        let file = std::fs::File::create(&path)?;
        file.lock_exclusive()?;
        bincode::serialize_into(std::io::BufWriter::new(&file), &persisted)
            .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
        debug!(path = %path.display(), vectors = persisted.entries.len(), "Saved vectors");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::test_support::unit;
    use tempfile::TempDir;

    fn axis(dim: usize, i: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[i % dim] = 1.0;
        v
    }

    #[test]
    fn test_add_and_search() {
        let mut store = HnswVectorStore::in_memory(HnswParams::default());
        store
            .add(
                &[unit("a.rs", 1), unit("b.rs", 1), unit("c.rs", 1)],
                vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.8, 0.2, 0.0]],
            )
            .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.file_path, "a.rs");
        assert!((results[0].1 - 1.0).abs() < 1e-5);
        assert_eq!(results[1].0.file_path, "c.rs");
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut store = HnswVectorStore::in_memory(HnswParams::default());
        let err = store.add(&[unit("a.rs", 1)], vec![]).unwrap_err();
        assert!(matches!(err, VectorStoreError::LengthMismatch { .. }));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_empty_store_and_zero_query() {
        let mut store = HnswVectorStore::in_memory(HnswParams::default());
        assert!(store.search(&[1.0, 0.0], 3).is_empty());
        store.add(&[unit("a.rs", 1)], vec![vec![1.0, 0.0]]).unwrap();
        assert!(store.search(&[0.0, 0.0], 3).is_empty());
        assert!(store.search(&[1.0, 0.0], 0).is_empty());
    }

    #[test]
    fn test_huge_top_k_is_capped() {
        let mut store = HnswVectorStore::in_memory(HnswParams::default());
        store
            .add(
                &[unit("a.rs", 1), unit("b.rs", 1), unit("c.rs", 1)],
                vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
            )
            .unwrap();
        store.remove("b.rs");

        let results = store.search(&[1.0, 0.0], usize::MAX);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.file_path, "a.rs");
    }

    #[test]
    fn test_remove_tombstones_and_compacts() {
        let mut store = HnswVectorStore::in_memory(HnswParams::default());
        let units: Vec<_> = (0..8).map(|i| unit(if i < 5 { "old.rs" } else { "keep.rs" }, i * 10 + 1)).collect();
        let vectors: Vec<_> = (0..8).map(|i| axis(8, i)).collect();
        store.add(&units, vectors).unwrap();

        assert_eq!(store.remove("old.rs"), 5);
        assert_eq!(store.len(), 3);
        // 5 tombstones > 3 live entries triggers compaction
        assert_eq!(store.slots.len(), 3);

        let results = store.search(&axis(8, 0), 8);
        assert!(results.iter().all(|(u, _)| u.file_path == "keep.rs"));
        assert_eq!(store.remove("missing.rs"), 0);
    }

    #[test]
    fn test_flush_and_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = HnswVectorStore::open(dir.path(), HnswParams::default()).unwrap();
            store
                .add(
                    &[unit("a.rs", 1), unit("b.rs", 1)],
                    vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                )
                .unwrap();
            store.flush().unwrap();
        }

        let reopened = HnswVectorStore::open(dir.path(), HnswParams::default()).unwrap();
        assert_eq!(reopened.len(), 2);
        let results = reopened.search(&[0.0, 1.0], 1);
        assert_eq!(results[0].0.file_path, "b.rs");
    }

    #[test]
    fn test_corrupt_vector_file_gives_empty_store() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(VECTORS_FILE), b"garbage").unwrap();
        let store = HnswVectorStore::open(dir.path(), HnswParams::default()).unwrap();
        assert!(store.is_empty());
    }
}
