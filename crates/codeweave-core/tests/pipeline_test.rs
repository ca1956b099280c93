//! End-to-end tests for incremental indexing
//!
//! Every test indexes a real directory into on-disk stores and checks what
//! a second run does and does not touch.

mod common;

use codeweave_core::language::{LanguageRegistry, PythonSupport};
use codeweave_core::project::IndexLock;
use codeweave_core::{Error, ProjectIndexer, RelationKind, Snippet, SnippetKind};
use common::{CountingLanguage, HashingEmbedder, RecordingSummarizer, Workspace};
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const FILE_A: &str = "def foo():\n    return 1\n";
const FILE_B: &str = "class Bar:\n    def baz(self):\n        return foo()\n";
const FILE_A_EDITED: &str = "def foo():\n    return 2\n";
const FILE_B_EDITED: &str = "class Bar:\n    def baz(self):\n        return foo() + 1\n";

fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn all_snippets(indexer: &ProjectIndexer) -> Vec<Snippet> {
    let db = &indexer.stores().unwrap().db;
    db.get_all_file_paths()
        .unwrap()
        .iter()
        .flat_map(|f| db.get_snippets_by_file(f).unwrap())
        .collect()
}

fn find<'a>(snippets: &'a [Snippet], name: &str) -> &'a Snippet {
    snippets.iter().find(|s| s.name == name).unwrap()
}

#[tokio::test]
async fn test_two_file_project_end_to_end() {
    let ws = Workspace::new();
    ws.write("a.py", FILE_A);
    ws.write("b.py", FILE_B);
    let summarizer = Arc::new(RecordingSummarizer::default());
    let embedder = Arc::new(HashingEmbedder::default());
    let indexer = ws.online_indexer(&summarizer, &embedder);

    let report = indexer.run().await.unwrap();
    assert_eq!(report.files_changed, 2);
    assert_eq!(report.snippets, 5);
    assert!(report.parse_failures.is_empty());

    let snippets = all_snippets(&indexer);
    let kinds: Vec<SnippetKind> = snippets.iter().map(|s| s.kind).collect();
    assert_eq!(kinds.iter().filter(|k| **k == SnippetKind::File).count(), 2);
    assert_eq!(snippets.len(), 5);
    assert!(snippets.iter().all(|s| s.summary.is_some()));

    let foo = find(&snippets, "foo");
    let bar = find(&snippets, "Bar");
    let baz = find(&snippets, "baz");
    let graph = &indexer.stores().unwrap().graph;

    let calls: Vec<_> = graph
        .get_outgoing_edges(&baz.id)
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == RelationKind::Calls)
        .collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].target_id, foo.id);
    assert!(graph
        .get_outgoing_edges(&bar.id)
        .unwrap()
        .iter()
        .any(|e| e.kind == RelationKind::Defines && e.target_id == baz.id));
    assert_eq!(indexer.stores().unwrap().vectors.count().unwrap(), 5);

    summarizer.take_calls();
    embedder.embedded.store(0, Ordering::SeqCst);
    ws.write("b.py", FILE_B_EDITED);

    let report = indexer.run().await.unwrap();
    assert_eq!(report.files_changed, 1);
    assert_eq!(report.files_reused, 1);
    assert_eq!(summarizer.take_calls(), names(&["baz", "Bar", "b.py"]));
    assert_eq!(embedder.embedded.load(Ordering::SeqCst), 3);

    let after = all_snippets(&indexer);
    assert_eq!(find(&after, "foo"), foo);
    let new_baz = find(&after, "baz");
    assert_ne!(new_baz.id, baz.id);
    assert!(indexer
        .stores()
        .unwrap()
        .graph
        .get_outgoing_edges(&new_baz.id)
        .unwrap()
        .iter()
        .any(|e| e.kind == RelationKind::Calls && e.target_id == foo.id));
    assert_eq!(indexer.stores().unwrap().vectors.count().unwrap(), 5);
}

#[tokio::test]
async fn test_edges_from_unchanged_files_keep_their_endpoints() {
    let ws = Workspace::new();
    ws.write("a.py", FILE_A);
    ws.write("b.py", FILE_B);
    let indexer = ws.indexer();
    indexer.run().await.unwrap();
    let old_foo = find(&all_snippets(&indexer), "foo").id.clone();

    ws.write("a.py", FILE_A_EDITED);
    let report = indexer.run().await.unwrap();
    assert_eq!(report.files_changed, 1);

    let snippets = all_snippets(&indexer);
    assert_ne!(find(&snippets, "foo").id, old_foo);
    let graph = &indexer.stores().unwrap().graph;
    let mut edges = 0;
    for snippet in &snippets {
        for edge in graph.get_outgoing_edges(&snippet.id).unwrap() {
            edges += 1;
            assert!(graph.get_node(&edge.source_id).unwrap().is_some());
            let target = graph.get_node(&edge.target_id).unwrap();
            assert!(target.is_some(), "edge {} -> {} has no target", edge.source_id, edge.target_id);
        }
    }
    assert!(edges > 0);

    let baz = find(&snippets, "baz");
    let call = graph
        .get_outgoing_edges(&baz.id)
        .unwrap()
        .into_iter()
        .find(|e| e.kind == RelationKind::Calls)
        .unwrap();
    assert_eq!(graph.get_node(&call.target_id).unwrap().unwrap().name, "foo");
}

#[tokio::test]
async fn test_second_run_on_unchanged_tree_is_idempotent() {
    let ws = Workspace::new();
    ws.write("a.py", FILE_A);
    ws.write("pkg/b.py", FILE_B);
    let summarizer = Arc::new(RecordingSummarizer::default());
    let embedder = Arc::new(HashingEmbedder::default());
    let indexer = ws.online_indexer(&summarizer, &embedder);

    indexer.run().await.unwrap();
    let before = all_snippets(&indexer);
    let fingerprints = indexer.stores().unwrap().db.get_all_fingerprints().unwrap();
    summarizer.take_calls();
    embedder.embedded.store(0, Ordering::SeqCst);

    let report = indexer.run().await.unwrap();
    assert_eq!(report.files_changed, 0);
    assert_eq!(report.summary.model_calls, 0);
    assert!(summarizer.take_calls().is_empty());
    assert_eq!(embedder.embedded.load(Ordering::SeqCst), 0);
    assert_eq!(all_snippets(&indexer), before);
    assert_eq!(indexer.stores().unwrap().db.get_all_fingerprints().unwrap(), fingerprints);
}

#[tokio::test]
async fn test_unchanged_files_are_not_reparsed() {
    let ws = Workspace::new();
    ws.write("a.py", FILE_A);
    ws.write("b.py", FILE_B);
    let python = Arc::new(CountingLanguage::new(PythonSupport));
    let mut registry = LanguageRegistry::empty();
    registry.register(python.clone());
    let indexer = ws.indexer().with_registry(Arc::new(registry));

    indexer.run().await.unwrap();
    assert_eq!(python.parses.load(Ordering::SeqCst), 2);
    assert_eq!(python.extractions.load(Ordering::SeqCst), 2);
    let untouched: Vec<Snippet> = indexer.stores().unwrap().db.get_snippets_by_file("a.py").unwrap();

    ws.write("b.py", FILE_B_EDITED);
    indexer.run().await.unwrap();
    assert_eq!(python.parses.load(Ordering::SeqCst), 3);
    assert_eq!(python.extractions.load(Ordering::SeqCst), 3);
    assert_eq!(
        indexer.stores().unwrap().db.get_snippets_by_file("a.py").unwrap(),
        untouched
    );
}

#[tokio::test]
async fn test_deleted_file_is_removed_from_every_store() {
    let ws = Workspace::new();
    ws.write("a.py", FILE_A);
    ws.write("b.py", FILE_B);
    let summarizer = Arc::new(RecordingSummarizer::default());
    let embedder = Arc::new(HashingEmbedder::default());
    let indexer = ws.online_indexer(&summarizer, &embedder);
    indexer.run().await.unwrap();

    ws.remove("b.py");
    let report = indexer.run().await.unwrap();
    assert!(report.cleanup.files_removed.contains("b.py"));

    let stores = indexer.stores().unwrap();
    let deleted = "b.py".to_string();
    assert!(!stores.db.get_all_file_paths().unwrap().contains(&deleted));
    assert!(!stores.graph.get_all_file_paths().unwrap().contains(&deleted));
    assert!(!stores.vectors.get_all_file_paths().unwrap().contains(&deleted));
    assert!(stores.db.get_fingerprint("b.py").unwrap().is_none());
    assert_eq!(stores.db.get_all_file_paths().unwrap(), vec!["a.py"]);
}

#[tokio::test]
async fn test_cleanup_without_reindexing() {
    let ws = Workspace::new();
    ws.write("a.py", FILE_A);
    ws.write("b.py", FILE_B);
    let indexer = ws.indexer();
    indexer.run().await.unwrap();

    ws.remove("a.py");
    let report = indexer.cleanup().unwrap();
    assert_eq!(report.files_removed, names(&["a.py"]));
    assert_eq!(indexer.stores().unwrap().db.get_all_file_paths().unwrap(), vec!["b.py"]);
}

#[tokio::test]
async fn test_unparseable_file_is_isolated_and_retried() {
    let ws = Workspace::new();
    ws.write("a.py", FILE_A);
    ws.write("bad.py", [0xff, 0xfe, 0x00, 0x41]);
    let indexer = ws.indexer();

    let report = indexer.run().await.unwrap();
    assert_eq!(report.parse_failures.len(), 1);
    assert_eq!(report.parse_failures[0].file, "bad.py");
    let stores = indexer.stores().unwrap();
    assert!(stores.db.get_fingerprint("bad.py").unwrap().is_none());
    assert_eq!(stores.db.get_all_file_paths().unwrap(), vec!["a.py"]);

    // a previously indexed file that turns unparseable keeps its old state
    let old_hash = stores.db.get_fingerprint("a.py").unwrap();
    let old_snippets = stores.db.get_snippets_by_file("a.py").unwrap();
    ws.write("a.py", [0xff, 0xfe]);
    let report = indexer.run().await.unwrap();
    assert_eq!(report.parse_failures.len(), 2);
    assert_eq!(stores.db.get_fingerprint("a.py").unwrap(), old_hash);
    assert_eq!(stores.db.get_snippets_by_file("a.py").unwrap(), old_snippets);

    ws.write("a.py", FILE_A);
    ws.remove("bad.py");
    let report = indexer.run().await.unwrap();
    assert!(report.parse_failures.is_empty());
}

#[tokio::test]
async fn test_offline_run_is_completed_by_a_later_online_run() {
    let ws = Workspace::new();
    ws.write("a.py", FILE_A);
    ws.write("b.py", FILE_B);

    let offline = ws.indexer();
    offline.run().await.unwrap();
    assert!(all_snippets(&offline).iter().all(|s| s.summary.is_none()));
    assert_eq!(offline.stores().unwrap().vectors.count().unwrap(), 0);
    drop(offline);

    let summarizer = Arc::new(RecordingSummarizer::default());
    let embedder = Arc::new(HashingEmbedder::default());
    let online = ws.online_indexer(&summarizer, &embedder);
    let report = online.run().await.unwrap();
    assert_eq!(report.files_changed, 0);
    assert_eq!(summarizer.take_calls().len(), 5);
    assert!(all_snippets(&online).iter().all(|s| s.summary.is_some()));
    assert_eq!(online.stores().unwrap().vectors.count().unwrap(), 5);
}

#[tokio::test]
async fn test_concurrent_run_is_rejected() {
    let ws = Workspace::new();
    ws.write("a.py", FILE_A);
    let indexer = ws.indexer();

    let lock = IndexLock::acquire(indexer.context().lock_path()).unwrap();
    assert!(matches!(indexer.run().await, Err(Error::IndexLocked { .. })));
    drop(lock);

    std::fs::write(indexer.context().lock_path(), "12345").unwrap();
    assert!(indexer.force_unlock().unwrap());
    assert!(indexer.run().await.is_ok());
}

#[tokio::test]
async fn test_run_requires_storage() {
    let ws = Workspace::new();
    ws.write("a.py", FILE_A);
    let indexer = ProjectIndexer::new(ws.root(), &ws.config()).unwrap();
    assert!(matches!(
        indexer.run().await,
        Err(Error::StorageNotInitialized(_))
    ));
}

#[tokio::test]
async fn test_verify_reports_store_counts() {
    let ws = Workspace::new();
    ws.write("a.py", "import os\n\ndef foo():\n    return os.getcwd()\n");
    let indexer = ws.indexer();
    indexer.run().await.unwrap();

    let report = indexer.verify().unwrap();
    assert!(report.fts_consistent);
    assert_eq!(report.languages, vec!["python", "rust", "c"]);
    assert_eq!(report.snippets.total, 2);
    assert_eq!(report.fingerprinted_files, 1);
    assert_eq!(report.vectors, 0);
    assert!(report.graph.placeholder_nodes >= 1);
    assert_eq!(report.graph.nodes - report.graph.placeholder_nodes, 2);
}

#[tokio::test]
async fn test_c_calls_resolve_across_files() {
    let ws = Workspace::new();
    ws.write("src/util.c", "int helper(void) {\n    return 1;\n}\n");
    ws.write(
        "src/main.c",
        "#include \"util.h\"\n\nint main(void) {\n    return helper();\n}\n",
    );
    let indexer = ws.indexer();
    let report = indexer.run().await.unwrap();
    assert_eq!(report.files_changed, 2);
    assert!(report.parse_failures.is_empty());

    let snippets = all_snippets(&indexer);
    let main = find(&snippets, "main");
    let helper = find(&snippets, "helper");
    assert_eq!(main.kind, SnippetKind::Function);
    assert_eq!(main.metadata_str("language"), Some("c"));

    let graph = &indexer.stores().unwrap().graph;
    assert!(graph
        .get_outgoing_edges(&main.id)
        .unwrap()
        .iter()
        .any(|e| e.kind == RelationKind::Calls && e.target_id == helper.id));
}
