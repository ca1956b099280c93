//! HTTP-based reranker using external LLM service

use super::client::extract_json;
use super::{ChatMessage, LLMClient, RerankDocument, RerankResult, Reranker};
use crate::config::LLMServiceConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;

/// Documents scored per request; the tail keeps its input order
const MAX_SCORED_DOCS: usize = 20;
/// Characters of each document shown to the model
const MAX_DOC_CHARS: usize = 400;

/// Reranker using external HTTP LLM service
pub struct HttpReranker {
    client: Arc<dyn LLMClient>,
}

impl HttpReranker {
    /// Create from LLM client
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }

    /// Create from configuration, using the rerank model for chat
    pub fn from_config(mut config: LLMServiceConfig) -> Result<Self> {
        config.model = config.rerank_model().to_string();
        Ok(Self::new(Arc::new(super::VLLMClient::new(config)?)))
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(LLMServiceConfig::default())
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[RerankDocument],
        top_n: usize,
    ) -> Result<Vec<RerankResult>> {
        if documents.is_empty() || top_n == 0 {
            return Ok(vec![]);
        }

        let scored = &documents[..documents.len().min(MAX_SCORED_DOCS)];
        let messages = vec![
            ChatMessage::system(
                "Score how relevant each code document is to the query. \
                 Output ONLY JSON: {\"scores\": [0.0-1.0, ...]} with one score per document, in order.",
            ),
            ChatMessage::user(build_reranking_prompt(query, scored)),
        ];

        let response = self.client.chat_completion(messages).await?;
        let mut results = parse_reranking_response(&response, scored.len());
        results.extend((scored.len()..documents.len()).map(|index| RerankResult { index, score: 0.0 }));

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(top_n);
        Ok(results)
    }

    fn model_name(&self) -> &str {
        self.client.model_name()
    }
}

fn build_reranking_prompt(query: &str, documents: &[RerankDocument]) -> String {
    let mut prompt = format!("Q: \"{}\"\nDocs:\n", query);
    for (idx, doc) in documents.iter().enumerate() {
        let text = match doc.text.char_indices().nth(MAX_DOC_CHARS) {
            Some((end, _)) => &doc.text[..end],
            None => &doc.text,
        };
        prompt.push_str(&format!("[{}] {}\n", idx, text.replace('\n', " ")));
    }
    prompt.push_str("\nScore 0-1 JSON:\n{\"scores\":[0.0,...]}\n");
    prompt
}

/// Scores by index; unparseable output keeps input order with score 0.0
fn parse_reranking_response(response: &str, count: usize) -> Vec<RerankResult> {
    let fallback = || {
        (0..count)
            .map(|index| RerankResult { index, score: 0.0 })
            .collect::<Vec<_>>()
    };

    let Some(json_str) = extract_json(response) else {
        tracing::warn!("Reranker returned no JSON, keeping input order");
        return fallback();
    };

    let parsed: serde_json::Value = match serde_json::from_str(json_str) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("Failed to parse reranking JSON: {}, keeping input order", e);
            tracing::debug!("Raw LLM response: {}", response);
            return fallback();
        }
    };

    match parsed["scores"].as_array() {
        Some(arr) => (0..count)
            .map(|index| RerankResult {
                index,
                score: arr.get(index).and_then(|v| v.as_f64()).unwrap_or(0.0),
            })
            .collect(),
        None => fallback(),
    }
}
