//! HTTP-based embedder using external LLM service

use super::{Embedder, LLMClient};
use crate::config::LLMServiceConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Embedder that uses external HTTP service (vLLM, OpenAI, etc.)
pub struct HttpEmbedder {
    client: Arc<dyn LLMClient>,
}

impl HttpEmbedder {
    /// Create from LLM client
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }

    /// Create from configuration
    pub fn from_config(config: LLMServiceConfig) -> Result<Self> {
        let client = super::VLLMClient::new(config)?;
        Ok(Self::new(Arc::new(client)))
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Arc::new(super::VLLMClient::from_env()?)))
    }

    fn zeros(&self, n: usize) -> Vec<Vec<f32>> {
        vec![vec![0.0; self.client.embedding_dimensions()]; n]
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        match self.client.embed_batch(texts).await {
            Ok(vectors) if vectors.len() == texts.len() => Ok(vectors),
            Ok(vectors) => {
                tracing::warn!(
                    "Embedding service returned {} vectors for {} texts, using zero vectors",
                    vectors.len(),
                    texts.len()
                );
                Ok(self.zeros(texts.len()))
            }
            Err(e) => {
                tracing::warn!("Embedding batch of {} failed, using zero vectors: {}", texts.len(), e);
                Ok(self.zeros(texts.len()))
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.client.embedding_dimensions()
    }

    fn model_name(&self) -> &str {
        self.client.model_name()
    }
}
