//! Hybrid code search
//!
//! Turns a source tree into structurally chunked code units and answers
//! relevance queries by fusing BM25 lexical scores with embedding similarity.
//! The index is kept on disk per project and refreshed incrementally from
//! file modification times.

pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod query;
pub mod search;
pub mod telemetry;
pub mod utils;
pub mod vector;

pub use chunking::{Chunker, CodeChunker, CodeUnit, UnitKind};
pub use config::Config;
pub use embeddings::{EmbeddingError, EmbeddingProvider};
pub use index::{IncrementalIndexer, UpdateSummary};
pub use query::{QueryInterface, ToolResponse};
pub use search::{FusionWeights, HybridSearcher, LexicalScorer, ScoredUnit};
pub use vector::{VectorBackend, VectorStore, VectorStoreError};
