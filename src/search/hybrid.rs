//! Score fusion of lexical and vector rankings.

use std::collections::HashMap;
use tracing::debug;

use super::LexicalScorer;
use crate::chunking::CodeUnit;
use crate::embeddings::EmbeddingProvider;
use crate::vector::VectorStore;

const NORMALIZE_EPS: f32 = 1e-9;

/// Relative weight of each ranker after normalization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub lexical: f32,
    pub vector: f32,
}

impl FusionWeights {
    pub fn new(lexical: f32, vector: f32) -> Self {
        Self { lexical, vector }
    }

    pub fn lexical_only() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self::new(0.6, 0.4)
    }
}

/// A ranked search result
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredUnit {
    pub unit: CodeUnit,
    pub score: f32,
}

/// Min-max scale scores into [0, 1]. A set with no spread maps to all 1.0.
pub fn normalize_scores(scores: &[f32]) -> Vec<f32> {
    let Some(min) = scores.iter().copied().reduce(f32::min) else {
        return Vec::new();
    };
    let max = scores.iter().copied().fold(min, f32::max);
    let range = max - min;
    if range < NORMALIZE_EPS {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// Fuses BM25 and vector similarity over one corpus snapshot.
///
/// `scorer` must have been fitted on `corpus` in order, and `store` populated
/// from the same units.
pub struct HybridSearcher<'a> {
    scorer: &'a LexicalScorer,
    store: &'a dyn VectorStore,
    embedder: &'a dyn EmbeddingProvider,
    weights: FusionWeights,
}

impl<'a> HybridSearcher<'a> {
    pub fn new(
        scorer: &'a LexicalScorer,
        store: &'a dyn VectorStore,
        embedder: &'a dyn EmbeddingProvider,
        weights: FusionWeights,
    ) -> Self {
        Self {
            scorer,
            store,
            embedder,
            weights,
        }
    }

    /// Vector candidates for `query`, or empty when the vector path is off or fails
    async fn vector_candidates(&self, query: &str, fetch: usize) -> Vec<(CodeUnit, f32)> {
        if self.weights.vector <= 0.0 || !self.embedder.is_available() || self.store.is_empty() {
            return Vec::new();
        }
        match self.embedder.embed_query(query).await {
            Ok(Some(vector)) => self.store.search(&vector, fetch),
            Ok(None) => Vec::new(),
            Err(e) => {
                debug!(error = %e, "Query embedding failed, using lexical ranking only");
                Vec::new()
            }
        }
    }

    pub async fn search(&self, query: &str, top_k: usize, corpus: &[CodeUnit]) -> Vec<ScoredUnit> {
        if query.trim().is_empty() || corpus.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let fetch = top_k.saturating_mul(2);

        let lexical: Vec<(&CodeUnit, f32)> = self
            .scorer
            .top_k(query, fetch)
            .into_iter()
            .filter_map(|(i, score)| corpus.get(i).map(|u| (u, score)))
            .collect();
        let vector = self.vector_candidates(query, fetch).await;

        let lexical_weight = if vector.is_empty() {
            1.0
        } else {
            self.weights.lexical
        };

        // Insertion order keeps lexical ranking for ties
        let mut fused: Vec<ScoredUnit> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut accumulate = |unit: &CodeUnit, contribution: f32| {
            let id = unit.id();
            match positions.get(&id) {
                Some(&pos) => fused[pos].score += contribution,
                None => {
                    positions.insert(id, fused.len());
                    fused.push(ScoredUnit {
                        unit: unit.clone(),
                        score: contribution,
                    });
                }
            }
        };

        let lexical_norm = normalize_scores(&lexical.iter().map(|(_, s)| *s).collect::<Vec<_>>());
        for ((unit, _), norm) in lexical.iter().zip(lexical_norm) {
            accumulate(*unit, lexical_weight * norm);
        }

        let vector_norm = normalize_scores(&vector.iter().map(|(_, s)| *s).collect::<Vec<_>>());
        for ((unit, _), norm) in vector.iter().zip(vector_norm) {
            accumulate(unit, self.weights.vector * norm);
        }

        debug!(
            query = %query,
            lexical = lexical.len(),
            vector = vector.len(),
            fused = fused.len(),
            "Hybrid search"
        );

        fused.sort_by(|a, b| b.score.total_cmp(&a.score));
        fused.truncate(top_k);
        fused
    }
}
