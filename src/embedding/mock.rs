//! Mock embedder for testing (no API calls)

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::Embedder;
use crate::error::Result;

/// Deterministic embedder. Texts containing `fail_marker` (if set) error out,
/// which lets tests exercise degraded writes.
pub struct MockEmbedder {
    dimension: usize,
    fail_marker: Option<String>,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail_marker: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every text that contains `marker`
    pub fn failing_on(dimension: usize, marker: impl Into<String>) -> Self {
        Self {
            fail_marker: Some(marker.into()),
            ..Self::new(dimension)
        }
    }

    /// Number of `embed` calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                return Err(crate::A3SError::Embedding(format!(
                    "mock failure for text containing {:?}",
                    marker
                )));
            }
        }

        // Generate a deterministic embedding based on text hash
        let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_add(b as u64));
        let mut embedding = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            let val = ((hash.wrapping_add(i as u64 * 7) % 1000) as f32 / 1000.0) - 0.5;
            embedding.push(val);
        }
        // Normalize
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
