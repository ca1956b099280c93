//! Search over a freshly indexed project

mod common;

use async_trait::async_trait;
use codeweave_core::search::{answer, build_answer_prompt};
use codeweave_core::{
    AnswerGenerator, HybridSearchEngine, ProjectStores, RelationKind, Result, SearchConfig,
    SearchStatus,
};
use common::{HashingEmbedder, RecordingSummarizer, Workspace};
use futures::stream::BoxStream;
use std::sync::{Arc, Mutex};

const SOURCE: &str = r#"
def parse_config(path):
    """Read the YAML configuration file."""
    return load_yaml(path)


def load_yaml(path):
    return open(path).read()


class CacheStore:
    def evict(self, key):
        self.entries.pop(key)
"#;

#[derive(Default)]
struct CapturingAnswer {
    prompt: Mutex<Option<String>>,
}

#[async_trait]
impl AnswerGenerator for CapturingAnswer {
    async fn complete(&self, prompt: &str) -> Result<String> {
        *self.prompt.lock().unwrap() = Some(prompt.to_string());
        Ok("It reads YAML.".into())
    }

    async fn complete_stream(&self, _prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        unimplemented!("not used")
    }
}

async fn indexed() -> (Workspace, ProjectStores) {
    let ws = Workspace::new();
    ws.write("config.py", SOURCE);
    let summarizer = Arc::new(RecordingSummarizer::default());
    let embedder = Arc::new(HashingEmbedder::default());
    let indexer = ws.online_indexer(&summarizer, &embedder);
    indexer.run().await.unwrap();
    let stores = indexer.stores().unwrap().clone();
    (ws, stores)
}

#[tokio::test]
async fn test_search_before_indexing_signals_not_indexed() {
    let stores = ProjectStores::open_in_memory().unwrap();
    let engine = HybridSearchEngine::new(&stores, SearchConfig::default());
    let response = engine.search("parse config", 5).await;
    assert_eq!(response.status, SearchStatus::NotIndexed);
    assert!(response.results.is_empty());
}

#[tokio::test]
async fn test_hybrid_search_finds_definition_with_context() {
    let (_ws, stores) = indexed().await;
    let engine = HybridSearchEngine::new(&stores, SearchConfig::default())
        .with_embedder(Arc::new(HashingEmbedder::default()));

    let response = engine.search("parse_config", 3).await;
    assert_eq!(response.status, SearchStatus::Ok);
    assert!(response.results.len() <= 3);

    let top = response
        .results
        .iter()
        .find(|r| r.snippet.name == "parse_config")
        .expect("definition retrieved");
    assert_eq!(top.parent.as_ref().map(|p| p.name.as_str()), Some("config.py"));
    assert!(top.relations.iter().any(|r| {
        r.kind == RelationKind::Calls && r.target_name.as_deref() == Some("load_yaml")
    }));
    assert!(top.document.starts_with("Summary: summary of parse_config"));
}

#[tokio::test]
async fn test_keyword_search_works_without_vectors() {
    let (_ws, stores) = indexed().await;
    let engine = HybridSearchEngine::new(&stores, SearchConfig::default());
    let response = engine.search("evict", 5).await;
    assert_eq!(response.status, SearchStatus::Ok);
    let method = response
        .results
        .iter()
        .find(|r| r.snippet.name == "evict")
        .expect("method retrieved by keyword");
    assert_eq!(method.parent.as_ref().map(|p| p.name.as_str()), Some("CacheStore"));
}

#[tokio::test]
async fn test_answer_prompt_contains_hydrated_results() {
    let (_ws, stores) = indexed().await;
    let engine = HybridSearchEngine::new(&stores, SearchConfig::default());
    let response = engine.search("parse_config", 2).await;

    let generator = CapturingAnswer::default();
    let text = answer(&generator, "What does parse_config do?", &response)
        .await
        .unwrap();
    assert_eq!(text, "It reads YAML.");

    let prompt = generator.prompt.lock().unwrap().clone().unwrap();
    assert_eq!(prompt, build_answer_prompt("What does parse_config do?", &response.results));
    assert!(prompt.contains("[parse_config in config.py (function) at config.py:2] ---"));
    assert!(prompt.contains("CALLS -> load_yaml"));
}
