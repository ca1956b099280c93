//! Answer synthesis using external LLM service

use super::{AnswerGenerator, ChatMessage, LLMClient};
use crate::config::LLMServiceConfig;
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You answer questions about a codebase. Use only the snippets \
     provided, cite snippet names and file paths, and say so when the snippets are not enough.";

/// Answer generator using external HTTP LLM service
pub struct HttpAnswerGenerator {
    client: Arc<dyn LLMClient>,
}

impl HttpAnswerGenerator {
    /// Create from LLM client
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }

    /// Create from configuration
    pub fn from_config(config: LLMServiceConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(super::VLLMClient::new(config)?)))
    }

    fn messages(prompt: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)]
    }
}

#[async_trait]
impl AnswerGenerator for HttpAnswerGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.client.chat_completion(Self::messages(prompt)).await
    }

    async fn complete_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        self.client.chat_completion_stream(Self::messages(prompt)).await
    }
}
