//! LLM integration
//!
//! Collaborator traits used by the indexing pipeline and search engine, and
//! their implementations over an OpenAI-compatible HTTP service:
//! - Batch summarization
//! - Embedding generation
//! - Reranking
//! - HyDE query rewriting
//! - Answer synthesis (whole or streamed)

mod cache;
mod client;
mod http_answer;
mod http_embedder;
mod http_query_orchestrator;
mod http_reranker;
mod http_summarizer;
mod lazy;
mod traits;

pub use cache::{CacheKey, CacheKind, LLMCache};
pub use client::{ChatMessage, LLMClient, MetricsSnapshot, VLLMClient};
pub use http_answer::HttpAnswerGenerator;
pub use http_embedder::HttpEmbedder;
pub use http_query_orchestrator::{augment_query, HttpQueryOrchestrator, HYDE_SEPARATOR};
pub use http_reranker::HttpReranker;
pub use http_summarizer::HttpSummarizer;
pub use lazy::Lazy;
pub use traits::*;
