//! HyDE query rewriting using external LLM service

use super::cache::{CacheKey, CacheKind, LLMCache};
use super::{ChatMessage, LLMClient, QueryOrchestrator};
use crate::config::LLMServiceConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Separator between the original query and the hypothetical code
pub const HYDE_SEPARATOR: &str = "\n\nHypothetical code implementation:\n";

/// Query orchestrator that decides per query whether to append a hypothetical answer
pub struct HttpQueryOrchestrator {
    client: Arc<dyn LLMClient>,
    cache: LLMCache,
}

impl HttpQueryOrchestrator {
    /// Create from LLM client
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            client,
            cache: LLMCache::new(),
        }
    }

    /// Create from configuration
    pub fn from_config(config: LLMServiceConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(super::VLLMClient::new(config)?)))
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Arc::new(super::VLLMClient::from_env()?)))
    }

    async fn wants_hyde(&self, query: &str) -> Result<bool> {
        let messages = vec![
            ChatMessage::system(
                "Decide whether a code search query would be easier to answer if we first \
                 imagined the code that implements it. Answer with YES or NO only.",
            ),
            ChatMessage::user(format!("Query: {}", query)),
        ];
        let response = self.client.chat_completion(messages).await?;
        Ok(response.trim().to_uppercase().starts_with("YES"))
    }

    async fn hypothetical_code(&self, query: &str) -> Result<String> {
        let messages = vec![
            ChatMessage::system(
                "Write a short, plausible code snippet that would answer the query. \
                 Output only code, no explanation.",
            ),
            ChatMessage::user(query.to_string()),
        ];
        let response = self.client.chat_completion(messages).await?;
        Ok(strip_code_fences(&response))
    }
}

#[async_trait]
impl QueryOrchestrator for HttpQueryOrchestrator {
    async fn rewrite(&self, query: &str) -> Result<String> {
        let key = CacheKey::new(CacheKind::Rewrite, self.client.model_name(), query);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let rewritten = if self.wants_hyde(query).await? {
            let code = self.hypothetical_code(query).await?;
            if code.is_empty() {
                query.to_string()
            } else {
                augment_query(query, &code)
            }
        } else {
            query.to_string()
        };

        self.cache.insert(key, rewritten.clone());
        Ok(rewritten)
    }
}

/// `query` followed by the hypothetical implementation
pub fn augment_query(query: &str, code: &str) -> String {
    format!("{}{}{}", query, HYDE_SEPARATOR, code)
}

fn strip_code_fences(response: &str) -> String {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_augment_query() {
        assert_eq!(
            augment_query("parse config", "def parse(): ..."),
            "parse config\n\nHypothetical code implementation:\ndef parse(): ..."
        );
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```python\nx = 1\n```"), "x = 1");
        assert_eq!(strip_code_fences("  x = 1 "), "x = 1");
    }
}
