//! Local embeddings by feature hashing
//!
//! Bag-of-tokens vectors built with the lexical tokenizer, hashed into a fixed
//! number of buckets and L2-normalized. No model download and no network, so
//! vector search works offline and deterministically.

use async_trait::async_trait;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

use super::{EmbeddingError, EmbeddingProvider};
use crate::search::tokenize;

pub const DEFAULT_DIMENSIONS: usize = 256;

pub struct HashedEmbeddings {
    dimensions: usize,
}

impl HashedEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Encode text to a unit-length vector (all zeros when it has no tokens)
    pub fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            let mut hasher = FxHasher::default();
            token.hash(&mut hasher);
            let hash = hasher.finish();
            let idx = (hash % self.dimensions as u64) as usize;
            // High bit picks the sign so collisions partly cancel
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[idx] += sign;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }
        embedding
    }
}

impl Default for HashedEmbeddings {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl EmbeddingProvider for HashedEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.encode(t)).collect())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "hashed"
    }

    fn cached_embedding(&self, text: &str) -> Option<Vec<f32>> {
        Some(self.encode(text))
    }
}
