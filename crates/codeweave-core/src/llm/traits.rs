//! Collaborator traits the pipeline and search engine depend on

use crate::error::Result;
use crate::model::Snippet;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// One vector per input, in input order.
    ///
    /// Implementations return zero vectors of the right width on transient
    /// failure so callers keep alignment.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Child summaries keyed by the parent snippet id
pub type ChildContext = HashMap<String, Vec<String>>;

/// Batch summarization trait
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Fill `summary` on every snippet of the batch.
    ///
    /// `child_context` holds the finished summaries of each member's
    /// children. An error fails the whole batch.
    async fn summarize_batch(&self, batch: &mut [Snippet], child_context: &ChildContext)
        -> Result<()>;

    fn model_name(&self) -> &str;
}

/// Document reranking trait
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank documents for a query, best first, at most `top_n` results
    async fn rerank(
        &self,
        query: &str,
        documents: &[RerankDocument],
        top_n: usize,
    ) -> Result<Vec<RerankResult>>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Document for reranking
#[derive(Debug, Clone)]
pub struct RerankDocument {
    pub id: String,
    pub text: String,
}

/// Reranking result pointing back into the input slice
#[derive(Debug, Clone, PartialEq)]
pub struct RerankResult {
    pub index: usize,
    pub score: f64,
}

/// Query rewriting trait; returning the input unchanged means no rewrite
#[async_trait]
pub trait QueryOrchestrator: Send + Sync {
    async fn rewrite(&self, query: &str) -> Result<String>;
}

/// Answer synthesis trait
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Stream the answer as text deltas
    async fn complete_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>>;
}
