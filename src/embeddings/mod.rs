//! Embedding providers
//!
//! Converts code text into dense vectors for similarity search. Providers may
//! be unavailable (no credentials, exhausted retries); callers treat that as a
//! standing degradation to lexical-only search rather than as an error.

mod cache;
mod hashed;
mod http;
mod retry;

pub use cache::EmbeddingCache;
pub use hashed::HashedEmbeddings;
pub use http::HttpEmbeddingProvider;
pub use retry::{retry_with_backoff, RetryPolicy};

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};

/// Errors that can occur during embedding generation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("embedding provider is unavailable")]
    Unavailable,

    #[error("rate limited by embedding service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("embedding service error (HTTP {status})")]
    Server { status: u16 },

    #[error("embedding request rejected (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl EmbeddingError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Server { .. } | Self::Network(_)
        )
    }
}

/// Text-to-vector conversion.
///
/// Implementations should be Send + Sync to allow use in async contexts.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed texts, returning one vector per input in input order.
    ///
    /// An unavailable provider returns an empty vector without doing any work.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single query. `None` when the provider produced nothing.
    async fn embed_query(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        Ok(vectors.pop().filter(|v| !v.is_empty()))
    }

    fn is_available(&self) -> bool;

    /// Once true, stays true for the lifetime of the provider.
    fn permanently_unavailable(&self) -> bool {
        !self.is_available()
    }

    fn model_name(&self) -> &str;

    /// Vector for `text` if it can be produced without a network call.
    fn cached_embedding(&self, _text: &str) -> Option<Vec<f32>> {
        None
    }
}

/// Provider used when embeddings are switched off
#[derive(Debug, Default)]
pub struct DisabledEmbeddings;

#[async_trait]
impl EmbeddingProvider for DisabledEmbeddings {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(Vec::new())
    }

    fn is_available(&self) -> bool {
        false
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

/// Build the configured provider. `cache_dir` holds the embedding cache.
pub fn create_provider(config: &EmbeddingConfig, cache_dir: &Path) -> Arc<dyn EmbeddingProvider> {
    match config.provider {
        EmbeddingProviderKind::Voyage => {
            let cache = EmbeddingCache::open(cache_dir);
            Arc::new(HttpEmbeddingProvider::from_config(config, cache))
        }
        EmbeddingProviderKind::Hashed => Arc::new(HashedEmbeddings::new(config.dimensions)),
        EmbeddingProviderKind::None => {
            tracing::info!("Embeddings disabled, using lexical search only");
            Arc::new(DisabledEmbeddings)
        }
    }
}
