//! Caching wrapper turning a raw [`Embedder`] into an [`EmbeddingProvider`]

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use xxhash_rust::xxh3::xxh3_64;

use super::{Embedder, EmbeddingProvider, EmbeddingResult};

/// Embedding provider with a bounded, concurrently readable vector cache
pub struct CachedEmbeddingProvider {
    embedder: Arc<dyn Embedder>,
    cache: DashMap<u64, Arc<Vec<f32>>>,
    capacity: usize,
}

impl CachedEmbeddingProvider {
    /// `capacity == 0` disables caching
    pub fn new(embedder: Arc<dyn Embedder>, capacity: usize) -> Self {
        Self {
            embedder,
            cache: DashMap::new(),
            capacity,
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    fn remember(&self, key: u64, vector: &[f32]) {
        if self.capacity == 0 {
            return;
        }
        self.cache.insert(key, Arc::new(vector.to_vec()));

        // Trim after inserting so concurrent misses cannot leave the cache
        // above capacity. Evicts arbitrary entries other than `key`.
        while self.cache.len() > self.capacity {
            // The iterator guard must drop before remove.
            let victim = self
                .cache
                .iter()
                .map(|entry| *entry.key())
                .find(|k| *k != key);
            match victim {
                Some(victim) => {
                    self.cache.remove(&victim);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    async fn generate_embedding(&self, text: &str) -> EmbeddingResult {
        let start = Instant::now();
        let key = xxh3_64(text.as_bytes());

        let hit = self.cache.get(&key).map(|entry| Arc::clone(entry.value()));
        if let Some(vector) = hit {
            return EmbeddingResult::ok(
                vector.as_ref().clone(),
                start.elapsed().as_millis() as u64,
                true,
            );
        }

        let outcome = self.embedder.embed(text).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(vector) if vector.len() == self.embedder.dimension() => {
                self.remember(key, &vector);
                EmbeddingResult::ok(vector, latency_ms, false)
            }
            Ok(vector) => {
                tracing::warn!(
                    expected = self.embedder.dimension(),
                    actual = vector.len(),
                    "Embedding dimension mismatch"
                );
                EmbeddingResult::failed(
                    format!(
                        "dimension mismatch: expected {}, got {}",
                        self.embedder.dimension(),
                        vector.len()
                    ),
                    latency_ms,
                )
            }
            Err(e) => {
                tracing::warn!(error = %e, latency_ms, "Embedding request failed");
                EmbeddingResult::failed(e.to_string(), latency_ms)
            }
        }
    }

    fn dimension(&self) -> usize {
        self.embedder.dimension()
    }
}
