//! Deterministic collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use codeweave_core::language::{ParsedFile, RelationshipCandidate};
use codeweave_core::llm::ChildContext;
use codeweave_core::{
    Config, Embedder, LanguageSupport, ProjectIndexer, Result, Snippet, Summarizer,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const DIMS: usize = 16;

/// Summaries are `summary of {name}`; every summarized name is recorded
#[derive(Default)]
pub struct RecordingSummarizer {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingSummarizer {
    pub fn take_calls(&self) -> BTreeSet<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
            .into_iter()
            .collect()
    }
}

#[async_trait]
impl Summarizer for RecordingSummarizer {
    async fn summarize_batch(&self, batch: &mut [Snippet], _context: &ChildContext) -> Result<()> {
        let mut calls = self.calls.lock().unwrap();
        for snippet in batch.iter_mut() {
            calls.push(snippet.name.clone());
            snippet.summary = Some(format!("summary of {}", snippet.name));
        }
        Ok(())
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

/// Bag-of-words hashed into a fixed number of buckets
#[derive(Default)]
pub struct HashingEmbedder {
    pub embedded: AtomicUsize,
}

pub fn hash_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMS];
    vector[0] = 0.01;
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let bucket = word.bytes().map(|b| b as usize).sum::<usize>() % DIMS;
        vector[bucket] += 1.0;
    }
    vector
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(hash_embedding(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| hash_embedding(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

/// Wraps a language and counts how often each stage runs
pub struct CountingLanguage<L> {
    pub inner: L,
    pub parses: AtomicUsize,
    pub extractions: AtomicUsize,
}

impl<L> CountingLanguage<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            parses: AtomicUsize::new(0),
            extractions: AtomicUsize::new(0),
        }
    }
}

impl<L: LanguageSupport> LanguageSupport for CountingLanguage<L> {
    fn id(&self) -> &'static str {
        self.inner.id()
    }

    fn extensions(&self) -> &'static [&'static str] {
        self.inner.extensions()
    }

    fn parse(&self, source: &str, file_path: &str) -> Result<ParsedFile> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        self.inner.parse(source, file_path)
    }

    fn extract_relationships(&self, parsed: &ParsedFile) -> Result<Vec<RelationshipCandidate>> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        self.inner.extract_relationships(parsed)
    }
}

/// Source tree plus an isolated data directory
pub struct Workspace {
    pub src: TempDir,
    pub data: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            src: TempDir::new().unwrap(),
            data: TempDir::new().unwrap(),
        }
    }

    pub fn config(&self) -> Config {
        Config {
            data_dir: Some(self.data.path().to_path_buf()),
            ..Default::default()
        }
    }

    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) {
        let path = self.src.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        std::fs::remove_file(self.src.path().join(relative)).unwrap();
    }

    pub fn root(&self) -> &Path {
        self.src.path()
    }

    /// Indexer over on-disk stores
    pub fn indexer(&self) -> ProjectIndexer {
        let mut indexer = ProjectIndexer::new(self.root(), &self.config()).unwrap();
        indexer.initialize_storage().unwrap();
        indexer
    }

    pub fn online_indexer(
        &self,
        summarizer: &Arc<RecordingSummarizer>,
        embedder: &Arc<HashingEmbedder>,
    ) -> ProjectIndexer {
        self.indexer()
            .with_summarizer(summarizer.clone())
            .with_embedder(embedder.clone())
    }
}
