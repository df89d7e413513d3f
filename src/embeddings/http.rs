//! HTTP embedding provider for Voyage-compatible services.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{retry_with_backoff, EmbeddingCache, EmbeddingError, EmbeddingProvider, RetryPolicy};
use crate::config::EmbeddingConfig;

pub const DEFAULT_ENDPOINT: &str = "https://api.voyageai.com/v1/embeddings";
pub const DEFAULT_MODEL: &str = "voyage-3";
pub const DEFAULT_BATCH_SIZE: usize = 96;

/// Request body for embedding API
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Response from embedding API
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Batched, cached, retrying client for a remote embedding service.
///
/// Without an API key the provider starts permanently unavailable. Any request
/// that still fails after retries flips it to permanently unavailable as well;
/// from then on `embed` returns an empty result without network traffic.
pub struct HttpEmbeddingProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    batch_size: usize,
    retry: RetryPolicy,
    cache: EmbeddingCache,
    available: AtomicBool,
}

impl HttpEmbeddingProvider {
    pub fn new(api_key: Option<String>, model: impl Into<String>, cache: EmbeddingCache) -> Self {
        let available = api_key.is_some();
        if !available {
            warn!("No embedding API key configured, vector search disabled");
        }
        Self {
            client: Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: model.into(),
            api_key,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
            cache,
            available: AtomicBool::new(available),
        }
    }

    pub fn from_config(config: &EmbeddingConfig, cache: EmbeddingCache) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client with timeout, using defaults");
                Client::new()
            });

        Self {
            client,
            ..Self::new(config.api_key_from_env(), config.model.clone(), cache)
        }
        .with_base_url(config.endpoint.clone())
        .with_batch_size(config.batch_size)
        .with_retry_policy(config.retry_policy())
    }

    /// Set a custom base URL (useful for testing or proxies).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn mark_unavailable(&self, reason: &EmbeddingError) {
        if self.available.swap(false, Ordering::SeqCst) {
            error!(
                model = %self.model,
                error = %reason,
                "Embedding provider permanently unavailable, falling back to lexical search"
            );
        }
    }

    async fn request(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let api_key = self.api_key.as_deref().ok_or(EmbeddingError::Unavailable)?;

        debug!(texts = batch.len(), endpoint = %self.endpoint, "Sending embedding request");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: batch,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: EmbeddingResponse = response
                .json()
                .await
                .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

            let mut data = body.data;
            data.sort_by_key(|d| d.index);
            if data.len() != batch.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    data.len()
                )));
            }
            return Ok(data.into_iter().map(|d| d.embedding).collect());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(EmbeddingError::RateLimited { retry_after });
        }

        if status.is_server_error() {
            return Err(EmbeddingError::Server {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(EmbeddingError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() || !self.is_available() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Option<Vec<f32>>> = texts.iter().map(|t| self.cache.get(t)).collect();

        // Unique uncached texts, each with every position it fills
        let mut pending: Vec<String> = Vec::new();
        let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, text) in texts.iter().enumerate() {
            if results[i].is_some() {
                continue;
            }
            let slots = positions.entry(text.as_str()).or_default();
            if slots.is_empty() {
                pending.push(text.clone());
            }
            slots.push(i);
        }

        if !pending.is_empty() {
            debug!(
                total = texts.len(),
                uncached = pending.len(),
                "Embedding uncached texts"
            );
        }

        let mut fetched = 0usize;
        for batch in pending.chunks(self.batch_size) {
            match retry_with_backoff(&self.retry, || self.request(batch)).await {
                Ok(vectors) => {
                    for (text, vector) in batch.iter().zip(vectors) {
                        for &slot in positions.get(text.as_str()).into_iter().flatten() {
                            results[slot] = Some(vector.clone());
                        }
                        self.cache.insert(text, vector);
                        fetched += 1;
                    }
                }
                Err(e) => {
                    self.mark_unavailable(&e);
                    if fetched > 0 {
                        if let Err(e) = self.cache.save() {
                            warn!(error = %e, "Failed to save embedding cache");
                        }
                    }
                    return Ok(Vec::new());
                }
            }
        }

        if fetched > 0 {
            if let Err(e) = self.cache.save() {
                warn!(error = %e, "Failed to save embedding cache");
            }
        }

        Ok(results.into_iter().collect::<Option<Vec<_>>>().unwrap_or_default())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn cached_embedding(&self, text: &str) -> Option<Vec<f32>> {
        self.cache.get(text)
    }
}
