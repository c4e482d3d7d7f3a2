//! Local embedder backed by an Ollama model server

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::Result;

const DEFAULT_API_BASE: &str = "http://localhost:11434";

/// Offline embedder talking to a locally running model server
pub struct OllamaEmbedder {
    client: reqwest::Client,
    api_base: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.api_base))
            .json(&OllamaRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(crate::A3SError::Embedding(format!(
                "Local model server error: {}",
                response.status()
            )));
        }

        let result: OllamaResponse = response.json().await?;
        if result.embedding.is_empty() {
            return Err(crate::A3SError::Embedding(
                "Local model returned an empty vector".to_string(),
            ));
        }

        Ok(result.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
