//! Vector storage and nearest-neighbor search
//!
//! Two interchangeable backends sit behind [`VectorStore`]: an exact
//! brute-force store and an HNSW graph persisted under the cache directory.
//! Callers pick one through [`create_vector_store`] and depend only on the trait.

mod hnsw;
mod memory;

pub use hnsw::{HnswParams, HnswVectorStore};
pub use memory::MemoryVectorStore;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::chunking::CodeUnit;
use crate::config::VectorConfig;

/// Subdirectory of the cache directory used by the HNSW backend
pub const ANN_DIR: &str = "ann";

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("got {units} units but {vectors} vectors")]
    LengthMismatch { units: usize, vectors: usize },

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vector store serialization error: {0}")]
    Serialization(String),
}

/// Which vector store implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Exact brute-force search in memory
    #[default]
    Memory,
    /// Approximate search over an HNSW graph
    Hnsw,
}

impl VectorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Hnsw => "hnsw",
        }
    }
}

impl fmt::Display for VectorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VectorBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "brute" => Ok(Self::Memory),
            "hnsw" | "ann" => Ok(Self::Hnsw),
            other => anyhow::bail!("Unknown vector backend: {}", other),
        }
    }
}

/// Storage of unit vectors with similarity search.
pub trait VectorStore: Send + Sync {
    /// Store one vector per unit. Fails without storing anything when the
    /// lengths differ or a vector has the wrong dimension.
    fn add(&mut self, units: &[CodeUnit], vectors: Vec<Vec<f32>>) -> Result<(), VectorStoreError>;

    /// Up to `top_k` units by descending cosine similarity.
    fn search(&self, query: &[f32], top_k: usize) -> Vec<(CodeUnit, f32)>;

    /// Drop every unit of `file_path`, returning how many were removed.
    fn remove(&mut self, file_path: &str) -> usize;

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn backend(&self) -> VectorBackend;

    /// Persist state, for backends that keep any.
    fn flush(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }
}

/// Compute cosine similarity between two vectors.
///
/// Zero-norm, mismatched or non-finite input gives 0.0, never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

pub(crate) fn is_zero_vector(v: &[f32]) -> bool {
    v.iter().all(|&x| x == 0.0)
}

/// Check lengths and dimensions before any mutation.
/// Returns the dimension the batch agrees on.
pub(crate) fn validate_batch(
    units: &[CodeUnit],
    vectors: &[Vec<f32>],
    dimension: Option<usize>,
) -> Result<Option<usize>, VectorStoreError> {
    if units.len() != vectors.len() {
        return Err(VectorStoreError::LengthMismatch {
            units: units.len(),
            vectors: vectors.len(),
        });
    }
    let mut expected = dimension;
    for v in vectors {
        match expected {
            Some(d) if d != v.len() => {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: d,
                    actual: v.len(),
                })
            }
            Some(_) => {}
            None => expected = Some(v.len()),
        }
    }
    Ok(expected)
}

/// Build the configured store, falling back to memory when the HNSW backend
/// cannot be opened.
pub fn create_vector_store(config: &VectorConfig, cache_dir: &Path) -> Box<dyn VectorStore> {
    match config.backend {
        VectorBackend::Memory => Box::new(MemoryVectorStore::new()),
        VectorBackend::Hnsw => {
            match HnswVectorStore::open(&cache_dir.join(ANN_DIR), config.hnsw_params()) {
                Ok(store) => Box::new(store),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "HNSW backend unavailable, falling back to in-memory vector store"
                    );
                    Box::new(MemoryVectorStore::new())
                }
            }
        }
    }
}
