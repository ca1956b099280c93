//! Load-once collaborator handles
//!
//! A [`Lazy`] defers building an expensive client until the first call and
//! hands every later caller the same instance. It implements each
//! collaborator trait by delegation, so it can be injected wherever the
//! trait object is expected.

use super::{
    AnswerGenerator, ChildContext, Embedder, QueryOrchestrator, RerankDocument, RerankResult,
    Reranker, Summarizer,
};
use crate::error::Result;
use crate::model::Snippet;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::OnceCell;

type Init<T> = Box<dyn Fn() -> Result<Arc<T>> + Send + Sync>;

pub struct Lazy<T: ?Sized> {
    name: String,
    cell: OnceCell<Arc<T>>,
    init: Init<T>,
}

impl<T: ?Sized + Send + Sync> Lazy<T> {
    pub fn new(
        name: impl Into<String>,
        init: impl Fn() -> Result<Arc<T>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            cell: OnceCell::new(),
            init: Box::new(init),
        }
    }

    /// The shared instance, built on first use.
    ///
    /// A failed build is not memoized; the next call retries.
    pub async fn get(&self) -> Result<Arc<T>> {
        self.cell
            .get_or_try_init(|| async {
                tracing::debug!(collaborator = %self.name, "initializing");
                (self.init)()
            })
            .await
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Embedder for Lazy<dyn Embedder> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.get().await?.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.get().await?.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.cell.get().map(|e| e.dimensions()).unwrap_or(0)
    }

    fn model_name(&self) -> &str {
        self.cell.get().map(|e| e.model_name()).unwrap_or(&self.name)
    }
}

#[async_trait]
impl Summarizer for Lazy<dyn Summarizer> {
    async fn summarize_batch(&self, batch: &mut [Snippet], child_context: &ChildContext) -> Result<()> {
        self.get().await?.summarize_batch(batch, child_context).await
    }

    fn model_name(&self) -> &str {
        self.cell.get().map(|s| s.model_name()).unwrap_or(&self.name)
    }
}

#[async_trait]
impl Reranker for Lazy<dyn Reranker> {
    async fn rerank(
        &self,
        query: &str,
        documents: &[RerankDocument],
        top_n: usize,
    ) -> Result<Vec<RerankResult>> {
        self.get().await?.rerank(query, documents, top_n).await
    }

    fn model_name(&self) -> &str {
        self.cell.get().map(|r| r.model_name()).unwrap_or(&self.name)
    }
}

#[async_trait]
impl QueryOrchestrator for Lazy<dyn QueryOrchestrator> {
    async fn rewrite(&self, query: &str) -> Result<String> {
        self.get().await?.rewrite(query).await
    }
}

#[async_trait]
impl AnswerGenerator for Lazy<dyn AnswerGenerator> {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.get().await?.complete(prompt).await
    }

    async fn complete_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        self.get().await?.complete_stream(prompt).await
    }
}
