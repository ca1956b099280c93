//! Codeweave Core Library
//!
//! Incremental code knowledge-graph indexing with hybrid search.
//!
//! # Features
//! - Content-fingerprint change detection; only changed files are re-parsed
//! - Tree-sitter snippet extraction and typed relationships (Python, Rust)
//! - Bottom-up hierarchical summarization scheduled over the containment tree
//! - SQLite primary store with FTS5, a lean graph store and a vector store
//! - Hybrid search with Reciprocal Rank Fusion, HyDE and reranking

pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod index;
pub mod language;
pub mod llm;
pub mod model;
pub mod project;
pub mod search;
pub mod vector;

pub use config::{Config, IndexerConfig, LLMServiceConfig, SearchConfig};
pub use db::Database;
pub use error::{CodeweaveError, Error, Result};
pub use graph::{GraphStore, SqliteGraphStore};
pub use index::{IndexProgress, IndexReport, ProjectIndexer, VerifyReport};
pub use language::{LanguageRegistry, LanguageSupport};
pub use llm::{
    AnswerGenerator, Embedder, HttpAnswerGenerator, HttpEmbedder, HttpQueryOrchestrator,
    HttpReranker, HttpSummarizer, LLMClient, Lazy, QueryOrchestrator, Reranker, Summarizer,
    VLLMClient,
};
pub use model::{GraphNode, RelationKind, Relationship, Snippet, SnippetKind};
pub use project::{ProjectContext, ProjectStores};
pub use search::{HybridSearchEngine, SearchOptions, SearchResponse, SearchResult, SearchStatus};
pub use vector::{SqliteVectorStore, VectorStore};

/// Default data directory name
pub const DATA_DIR_NAME: &str = "codeweave";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "codeweave";
