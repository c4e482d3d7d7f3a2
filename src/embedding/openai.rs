//! OpenAI-compatible remote embedder

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::Result;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Remote embedder calling an OpenAI-compatible `/embeddings` endpoint
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| crate::A3SError::Config("No API key provided".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(crate::A3SError::Embedding(format!(
                "API error {}: {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response.json().await?;

        result
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| crate::A3SError::Embedding("Empty embedding response".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_embedder_requires_key() {
        let config = EmbeddingConfig {
            api_key: None,
            ..Default::default()
        };
        // Only assert the failure path when the environment does not supply a key.
        if std::env::var("OPENAI_API_KEY").is_err() {
            assert!(OpenAIEmbedder::new(&config).is_err());
        }
    }

    #[test]
    fn test_openai_embedder_defaults() {
        let config = EmbeddingConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let embedder = OpenAIEmbedder::new(&config).unwrap();
        assert_eq!(embedder.api_base, DEFAULT_API_BASE);
        assert_eq!(embedder.model, "text-embedding-3-small");
        assert_eq!(embedder.dimension(), 1536);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.1,-0.2,0.3]}],"model":"m"}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.1, -0.2, 0.3]);
    }
}
