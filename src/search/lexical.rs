//! BM25 lexical scoring with a code-aware tokenizer.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use regex::Regex;

/// Default term frequency saturation
pub const DEFAULT_K1: f32 = 1.5;
/// Default length normalization
pub const DEFAULT_B: f32 = 0.75;

static LOWER_UPPER: OnceLock<Regex> = OnceLock::new();
static ACRONYM_WORD: OnceLock<Regex> = OnceLock::new();
static NON_WORD: OnceLock<Regex> = OnceLock::new();

/// Split text into lowercase terms.
///
/// Identifiers are broken at case transitions and underscores, so
/// `getUserById` and `get_user_by_id` both yield `get user by id`.
///
/// ```
/// use hybrid_code_search::search::tokenize;
///
/// assert_eq!(tokenize("parseHTTPResponse"), vec!["parse", "http", "response"]);
/// assert_eq!(tokenize("user_id: int"), vec!["user", "id", "int"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let lower_upper = LOWER_UPPER.get_or_init(|| Regex::new(r"([a-z])([A-Z])").unwrap());
    let acronym_word = ACRONYM_WORD.get_or_init(|| Regex::new(r"([A-Z])([A-Z][a-z])").unwrap());
    let non_word = NON_WORD.get_or_init(|| Regex::new(r"[^\p{Alphabetic}\p{N}\s]").unwrap());

    let split = lower_upper.replace_all(text, "$1 $2");
    let split = acronym_word.replace_all(&split, "$1 $2");
    let lowered = split.to_lowercase();
    let cleaned = non_word.replace_all(&lowered, " ");

    cleaned.split_whitespace().map(str::to_string).collect()
}

/// BM25 model over an ordered document set.
///
/// Document indices refer to the order passed to [`LexicalScorer::fit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalScorer {
    k1: f32,
    b: f32,
    doc_term_freqs: Vec<FxHashMap<String, u32>>,
    doc_lengths: Vec<u32>,
    doc_freqs: FxHashMap<String, u32>,
    avg_doc_length: f32,
    fitted: bool,
}

impl Default for LexicalScorer {
    fn default() -> Self {
        Self::new(DEFAULT_K1, DEFAULT_B)
    }
}

impl LexicalScorer {
    pub fn new(k1: f32, b: f32) -> Self {
        Self {
            k1,
            b,
            doc_term_freqs: Vec::new(),
            doc_lengths: Vec::new(),
            doc_freqs: FxHashMap::default(),
            avg_doc_length: 0.0,
            fitted: false,
        }
    }

    /// Rebuild term statistics from scratch.
    pub fn fit<S: AsRef<str>>(&mut self, documents: &[S]) {
        self.clear();

        let mut total_length: u64 = 0;
        for doc in documents {
            let mut freqs: FxHashMap<String, u32> = FxHashMap::default();
            let tokens = tokenize(doc.as_ref());
            total_length += tokens.len() as u64;
            self.doc_lengths.push(tokens.len() as u32);
            for token in tokens {
                *freqs.entry(token).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *self.doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            self.doc_term_freqs.push(freqs);
        }

        if documents.is_empty() || total_length == 0 {
            tracing::warn!(
                documents = documents.len(),
                "Lexical corpus has no terms, scorer left unfitted"
            );
            self.clear();
            return;
        }

        self.avg_doc_length = total_length as f32 / documents.len() as f32;
        self.fitted = true;
        tracing::debug!(
            documents = documents.len(),
            terms = self.doc_freqs.len(),
            avg_len = self.avg_doc_length,
            "Fitted lexical scorer"
        );
    }

    pub fn clear(&mut self) {
        self.doc_term_freqs.clear();
        self.doc_lengths.clear();
        self.doc_freqs.clear();
        self.avg_doc_length = 0.0;
        self.fitted = false;
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Number of documents the model was fitted on
    pub fn len(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lengths.is_empty()
    }

    fn idf(&self, term: &str) -> f32 {
        let df = self.doc_freqs.get(term).copied().unwrap_or(0);
        if df == 0 {
            return 0.0;
        }
        let n = self.doc_lengths.len() as f32;
        let df = df as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score_terms(&self, terms: &[String], doc_index: usize) -> f32 {
        let Some(freqs) = self.doc_term_freqs.get(doc_index) else {
            return 0.0;
        };
        let doc_length = self.doc_lengths[doc_index] as f32;
        let norm = 1.0 - self.b + self.b * (doc_length / self.avg_doc_length);

        terms
            .iter()
            .filter_map(|term| {
                let tf = *freqs.get(term)? as f32;
                let idf = self.idf(term);
                Some(idf * (tf * (self.k1 + 1.0)) / (tf + self.k1 * norm))
            })
            .sum()
    }

    /// BM25 score of one document. Zero before fitting or out of range.
    pub fn score(&self, query: &str, doc_index: usize) -> f32 {
        if !self.fitted || doc_index >= self.len() {
            return 0.0;
        }
        self.score_terms(&tokenize(query), doc_index)
    }

    /// Best `k` documents with a positive score, highest first.
    /// Equal scores keep document order.
    pub fn top_k(&self, query: &str, k: usize) -> Vec<(usize, f32)> {
        if !self.fitted || k == 0 {
            return Vec::new();
        }
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .map(|i| (i, self.score_terms(&terms, i)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
    }
}
