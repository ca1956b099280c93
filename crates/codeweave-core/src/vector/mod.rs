//! Vector store: one embedding per snippet with its document text

mod sqlite;

pub use sqlite::SqliteVectorStore;

use crate::error::Result;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// A vector entry keyed by snippet id
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub id: String,
    pub file_path: String,
    pub embedding: Vec<f32>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Text the embedding was computed from
    pub document: String,
}

/// A similarity match, highest score first
#[derive(Debug, Clone, Serialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub document: String,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Operations the indexer and search engine need from a vector backend
pub trait VectorStore: Send + Sync {
    fn upsert(&self, entries: &[VectorEntry]) -> Result<usize>;

    fn delete_by_file(&self, file_path: &str) -> Result<usize>;

    /// Top-`k` entries by cosine similarity to `query`
    fn query(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>>;

    /// Which of `ids` already have a vector
    fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>>;

    fn get_all_file_paths(&self) -> Result<Vec<String>>;

    fn count(&self) -> Result<usize>;
}

/// Zero vectors are the embedder's failure value and never stored
pub fn is_null_vector(embedding: &[f32]) -> bool {
    embedding.is_empty() || embedding.iter().all(|v| *v == 0.0)
}
