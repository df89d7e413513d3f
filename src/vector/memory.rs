use super::{cosine_similarity, is_zero_vector, validate_batch, VectorBackend, VectorStore, VectorStoreError};
use crate::chunking::CodeUnit;

/// Exact nearest-neighbor search by linear scan.
///
/// Adequate for corpora up to tens of thousands of units.
#[derive(Default)]
pub struct MemoryVectorStore {
    entries: Vec<(CodeUnit, Vec<f32>)>,
    dimension: Option<usize>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

impl VectorStore for MemoryVectorStore {
    fn add(&mut self, units: &[CodeUnit], vectors: Vec<Vec<f32>>) -> Result<(), VectorStoreError> {
        self.dimension = validate_batch(units, &vectors, self.dimension)?;
        self.entries
            .extend(units.iter().cloned().zip(vectors));
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Vec<(CodeUnit, f32)> {
        if top_k == 0 || is_zero_vector(query) {
            return Vec::new();
        }
        if self.dimension.is_some_and(|d| d != query.len()) {
            return Vec::new();
        }

        let mut results: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (_, v))| (i, cosine_similarity(query, v)))
            .collect();

        results.sort_by(|a, b| b.1.total_cmp(&a.1));
        results.truncate(top_k);

        results
            .into_iter()
            .map(|(i, score)| (self.entries[i].0.clone(), score))
            .collect()
    }

    fn remove(&mut self, file_path: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(unit, _)| unit.file_path != file_path);
        before - self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.dimension = None;
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn backend(&self) -> VectorBackend {
        VectorBackend::Memory
    }
}
