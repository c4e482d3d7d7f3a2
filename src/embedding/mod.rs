//! Embedding model abstraction
//!
//! Two layers live here. [`Embedder`] is a raw model client that either
//! returns a vector or an error. [`EmbeddingProvider`] is the contract the
//! storage layer consumes: it never fails, and reports success, latency and
//! cache hits in an [`EmbeddingResult`] instead.

mod cache;
mod mock;
mod ollama;
mod openai;

pub use cache::CachedEmbeddingProvider;
pub use mock::MockEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAIEmbedder;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::error::Result;

/// Raw embedding model client
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;
}

/// Outcome of one embedding request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingResult {
    pub success: bool,
    pub vector: Option<Vec<f32>>,
    /// Wall-clock latency of the request in milliseconds
    pub latency_ms: u64,
    /// Whether the vector came from the cache
    pub cached: bool,
    pub error: Option<String>,
}

impl EmbeddingResult {
    pub fn ok(vector: Vec<f32>, latency_ms: u64, cached: bool) -> Self {
        Self {
            success: true,
            vector: Some(vector),
            latency_ms,
            cached,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            success: false,
            vector: None,
            latency_ms,
            cached: false,
            error: Some(error.into()),
        }
    }
}

/// Embedding capability consumed by vector-capable storage backends
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute the vector for `text`. Failures are reported in the result.
    async fn generate_embedding(&self, text: &str) -> EmbeddingResult;

    /// Length of the vectors this provider produces
    fn dimension(&self) -> usize;
}

/// Create a raw embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" | "local" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dimension))),
        _ => Err(crate::A3SError::Config(format!(
            "Unknown embedding provider: {}",
            config.provider
        ))),
    }
}

/// Create the cached embedding provider handed to database backends
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder = create_embedder(config)?;
    Ok(Arc::new(CachedEmbeddingProvider::new(
        embedder,
        config.cache_size,
    )))
}
