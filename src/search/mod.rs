pub mod hybrid;
pub mod lexical;

pub use hybrid::{normalize_scores, FusionWeights, HybridSearcher, ScoredUnit};
pub use lexical::{tokenize, LexicalScorer};
