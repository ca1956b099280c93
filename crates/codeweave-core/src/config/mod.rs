//! Configuration management

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Directories skipped during the source walk
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    ".cache",
    "vendor",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    "target",
];

/// File extensions never handed to a parser
pub const DEFAULT_EXCLUDE_EXTENSIONS: &[&str] = &[
    "pyc", "pyo", "so", "o", "a", "dll", "dylib", "exe", "bin", "class", "jar", "png", "jpg",
    "jpeg", "gif", "ico", "pdf", "zip", "gz", "tar", "lock", "sqlite", "db",
];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Root of all per-project data directories
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Indexing pipeline tuning
    #[serde(default)]
    pub indexer: IndexerConfig,

    /// Search tuning
    #[serde(default)]
    pub search: SearchConfig,

    /// LLM service configuration
    #[serde(default)]
    pub llm_service: LLMServiceConfig,
}

/// Indexing pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Snippets longer than this are split into a skeleton and chunks
    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,

    /// Snippets per summarization call
    #[serde(default = "default_summary_batch_size")]
    pub summary_batch_size: usize,

    /// Summarization batches allowed in flight at once
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,

    /// Depth of the top-down parent context pass
    #[serde(default = "default_context_depth")]
    pub context_depth: usize,

    /// Snippets per embedding call
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,

    /// Capacity of the queue between summarization and embedding
    #[serde(default = "default_embed_queue_capacity")]
    pub embed_queue_capacity: usize,

    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,

    #[serde(default = "default_exclude_extensions")]
    pub exclude_extensions: Vec<String>,

    /// Extra glob patterns, matched against paths relative to the project root
    #[serde(default)]
    pub exclude_globs: Vec<String>,

    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_snippet_chars: default_max_snippet_chars(),
            summary_batch_size: default_summary_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            context_depth: default_context_depth(),
            embed_batch_size: default_embed_batch_size(),
            embed_queue_capacity: default_embed_queue_capacity(),
            exclude_dirs: default_exclude_dirs(),
            exclude_extensions: default_exclude_extensions(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_max_snippet_chars() -> usize {
    3200
}

fn default_summary_batch_size() -> usize {
    5
}

fn default_max_concurrent_batches() -> usize {
    4
}

fn default_context_depth() -> usize {
    3
}

fn default_embed_batch_size() -> usize {
    16
}

fn default_embed_queue_capacity() -> usize {
    256
}

fn default_exclude_dirs() -> Vec<String> {
    DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect()
}

fn default_exclude_extensions() -> Vec<String> {
    DEFAULT_EXCLUDE_EXTENSIONS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Hybrid search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Reciprocal Rank Fusion constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,

    /// Floor for the vector candidate count (the engine asks for max(10k, this))
    #[serde(default = "default_min_vector_candidates")]
    pub min_vector_candidates: usize,

    /// Full-text hits fetched per query variant
    #[serde(default = "default_keyword_limit")]
    pub keyword_limit: usize,

    /// Fused candidates hydrated and handed to the reranker
    #[serde(default = "default_rerank_pool")]
    pub rerank_pool: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            min_vector_candidates: default_min_vector_candidates(),
            keyword_limit: default_keyword_limit(),
            rerank_pool: default_rerank_pool(),
        }
    }
}

fn default_rrf_k() -> f64 {
    60.0
}

fn default_min_vector_candidates() -> usize {
    100
}

fn default_keyword_limit() -> usize {
    50
}

fn default_rerank_pool() -> usize {
    40
}

/// LLM service configuration for external inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMServiceConfig {
    /// Base URL of the OpenAI-compatible service for chat/completions
    pub url: String,

    /// Model name for chat completions (summaries, HyDE, answers)
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Base URL for embeddings service (can be different from LLM URL)
    #[serde(default)]
    pub embedding_url: Option<String>,

    /// Model name for embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimensions (used for zero-vector fallbacks)
    #[serde(default)]
    pub embedding_dimensions: Option<usize>,

    /// Model name used for reranking (falls back to the chat model)
    #[serde(default)]
    pub rerank_model: Option<String>,

    /// API key (optional, for authenticated services)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl LLMServiceConfig {
    /// Get the embeddings URL (falls back to main URL if not specified)
    pub fn embeddings_url(&self) -> &str {
        self.embedding_url.as_deref().unwrap_or(&self.url)
    }

    /// Model used by the reranker
    pub fn rerank_model(&self) -> &str {
        self.rerank_model.as_deref().unwrap_or(&self.model)
    }
}

impl Default for LLMServiceConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("CODEWEAVE_LLM_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            model: default_chat_model(),
            embedding_url: std::env::var("CODEWEAVE_EMBEDDING_URL").ok(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: std::env::var("CODEWEAVE_EMBEDDING_DIMS")
                .ok()
                .and_then(|s| s.parse().ok()),
            rerank_model: std::env::var("CODEWEAVE_RERANK_MODEL").ok(),
            api_key: std::env::var("CODEWEAVE_LLM_API_KEY").ok(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_chat_model() -> String {
    std::env::var("CODEWEAVE_LLM_MODEL")
        .unwrap_or_else(|_| "Qwen/Qwen2.5-Coder-7B-Instruct".to_string())
}

fn default_embedding_model() -> String {
    std::env::var("CODEWEAVE_EMBEDDING_MODEL")
        .unwrap_or_else(|_| "sentence-transformers/all-MiniLM-L6-v2".to_string())
}

fn default_timeout() -> u64 {
    60
}

impl Config {
    /// Load config from default path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load config from an explicit path, falling back to defaults when absent
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Root under which per-project stores live.
    ///
    /// `CODEWEAVE_DATA_DIR` wins over the config file, which wins over the platform data dir.
    pub fn data_root(&self) -> PathBuf {
        if let Ok(dir) = std::env::var("CODEWEAVE_DATA_DIR") {
            return PathBuf::from(dir);
        }
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(crate::DATA_DIR_NAME)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.indexer.summary_batch_size, 5);
        assert_eq!(config.search.rrf_k, 60.0);
        assert!(config.indexer.exclude_dirs.iter().any(|d| d == ".git"));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "indexer:\n  summary_batch_size: 2\nsearch:\n  keyword_limit: 7\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.indexer.summary_batch_size, 2);
        assert_eq!(config.indexer.max_concurrent_batches, 4);
        assert_eq!(config.search.keyword_limit, 7);
        assert_eq!(config.search.min_vector_candidates, 100);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.yml")).unwrap();
        assert!(config.data_dir.is_none());
    }
}
