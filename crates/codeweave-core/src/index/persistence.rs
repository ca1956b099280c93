//! The only writer of durable state

use crate::db::Database;
use crate::error::{Error, Result};
use crate::graph::GraphStore;
use crate::model::{GraphNode, Relationship, Snippet};
use crate::project::ProjectStores;
use crate::vector::{is_null_vector, VectorEntry, VectorStore};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Everything one run hands to [`PersistenceCoordinator::save`]
pub struct SaveBatch<'a> {
    pub snippets: &'a [Snippet],
    pub relationships: &'a [Relationship],
    pub embeddings: &'a HashMap<String, Vec<f32>>,
    pub changed_files: &'a BTreeSet<String>,
    /// Snippets of unchanged files that must be rewritten
    pub dirty: &'a HashSet<String>,
    /// Fingerprint of every encountered file
    pub fingerprints: &'a BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub snippets_written: usize,
    pub edges_written: usize,
    pub vectors_written: usize,
    pub fingerprints_written: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub files_removed: BTreeSet<String>,
    pub snippets_removed: usize,
    pub nodes_removed: usize,
    pub vectors_removed: usize,
    pub fingerprints_removed: usize,
}

#[derive(Default)]
pub struct PersistenceCoordinator {
    db: Option<Arc<Database>>,
    graph: Option<Arc<dyn GraphStore>>,
    vectors: Option<Arc<dyn VectorStore>>,
}

impl PersistenceCoordinator {
    /// A coordinator with no stores; every write fails until stores are attached
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stores(stores: &ProjectStores) -> Self {
        Self {
            db: Some(stores.db.clone()),
            graph: Some(stores.graph.clone()),
            vectors: Some(stores.vectors.clone()),
        }
    }

    fn stores(&self) -> Result<(&Database, &dyn GraphStore, &dyn VectorStore)> {
        let db = self.db.as_deref().ok_or(Error::StorageNotInitialized("snippets"))?;
        let graph = self.graph.as_deref().ok_or(Error::StorageNotInitialized("graph"))?;
        let vectors = self.vectors.as_deref().ok_or(Error::StorageNotInitialized("vectors"))?;
        Ok((db, graph, vectors))
    }

    /// Replace changed files in every store, then write edges and fingerprints
    pub fn save(&self, batch: SaveBatch<'_>) -> Result<SaveReport> {
        let (db, graph, vectors) = self.stores()?;
        let mut report = SaveReport::default();

        let mut by_file: BTreeMap<&str, Vec<&Snippet>> = BTreeMap::new();
        for snippet in batch.snippets {
            by_file.entry(snippet.file_path.as_str()).or_default().push(snippet);
        }

        for file in batch.changed_files {
            db.delete_file_snippets(file)?;
            graph.delete_file_data(file)?;
            vectors.delete_by_file(file)?;

            let snippets: Vec<Snippet> = by_file
                .get(file.as_str())
                .map(|s| s.iter().map(|&s| s.clone()).collect())
                .unwrap_or_default();
            if snippets.is_empty() {
                continue;
            }
            report.snippets_written += db.upsert_snippets(&snippets)?;
            graph.upsert_nodes(&snippets.iter().map(GraphNode::from).collect::<Vec<_>>())?;
            report.vectors_written += vectors.upsert(&vector_entries(&snippets, batch.embeddings))?;
        }

        let dirty: Vec<Snippet> = batch
            .snippets
            .iter()
            .filter(|s| !batch.changed_files.contains(&s.file_path) && batch.dirty.contains(&s.id))
            .cloned()
            .collect();
        if !dirty.is_empty() {
            report.snippets_written += db.upsert_snippets(&dirty)?;
            graph.upsert_nodes(&dirty.iter().map(GraphNode::from).collect::<Vec<_>>())?;
        }

        // vectors for unchanged files: retries and re-summarized snippets
        let retried: Vec<Snippet> = batch
            .snippets
            .iter()
            .filter(|s| !batch.changed_files.contains(&s.file_path) && batch.embeddings.contains_key(&s.id))
            .cloned()
            .collect();
        report.vectors_written += vectors.upsert(&vector_entries(&retried, batch.embeddings))?;

        report.edges_written = graph.upsert_edges(batch.relationships)?;

        let fingerprints: Vec<(String, String)> = batch
            .fingerprints
            .iter()
            .map(|(file, hash)| (file.clone(), hash.clone()))
            .collect();
        report.fingerprints_written = db.set_fingerprints(&fingerprints)?;

        tracing::info!(
            snippets = report.snippets_written,
            edges = report.edges_written,
            vectors = report.vectors_written,
            "persisted index changes"
        );
        Ok(report)
    }

    /// Delete rows for every stored file not in `encountered`
    pub fn cleanup(&self, encountered: &BTreeSet<String>) -> Result<CleanupReport> {
        let (db, graph, vectors) = self.stores()?;
        let mut report = CleanupReport::default();
        let stale = |paths: Vec<String>| -> Vec<String> {
            paths.into_iter().filter(|p| !encountered.contains(p)).collect()
        };

        for file in stale(db.get_all_file_paths()?) {
            report.snippets_removed += db.delete_file_snippets(&file)?;
            report.files_removed.insert(file);
        }
        for file in stale(graph.get_all_file_paths()?) {
            report.nodes_removed += graph.delete_file_data(&file)?;
            report.files_removed.insert(file);
        }
        for file in stale(vectors.get_all_file_paths()?) {
            report.vectors_removed += vectors.delete_by_file(&file)?;
            report.files_removed.insert(file);
        }
        let fingerprinted = stale(db.get_all_fingerprints()?.into_keys().collect());
        report.fingerprints_removed = db.delete_fingerprints(&fingerprinted)?;
        report.files_removed.extend(fingerprinted);

        if !report.files_removed.is_empty() {
            tracing::info!(files = report.files_removed.len(), "removed deleted files from the index");
        }
        Ok(report)
    }
}

/// Entries for snippets with a usable vector
fn vector_entries(snippets: &[Snippet], embeddings: &HashMap<String, Vec<f32>>) -> Vec<VectorEntry> {
    snippets
        .iter()
        .filter_map(|snippet| {
            let embedding = embeddings.get(&snippet.id)?;
            if is_null_vector(embedding) {
                return None;
            }
            let mut metadata = BTreeMap::new();
            metadata.insert("name".to_string(), snippet.name.clone().into());
            metadata.insert("kind".to_string(), snippet.kind.as_str().into());
            metadata.insert("file_path".to_string(), snippet.file_path.clone().into());
            metadata.insert("start_line".to_string(), snippet.start_line.into());
            metadata.insert("end_line".to_string(), snippet.end_line.into());
            metadata.insert("is_skeleton".to_string(), snippet.is_skeleton.into());
            Some(VectorEntry {
                id: snippet.id.clone(),
                file_path: snippet.file_path.clone(),
                embedding: embedding.clone(),
                metadata,
                document: snippet.embedding_text(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RelationKind, SnippetKind};

    fn snippet(name: &str, file: &str) -> Snippet {
        Snippet::new(name, SnippetKind::Function, format!("def {}(): pass", name), file, (0, 10), (1, 1))
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_save_without_stores_fails_fast() {
        let coordinator = PersistenceCoordinator::new();
        let result = coordinator.cleanup(&BTreeSet::new());
        assert!(matches!(result, Err(Error::StorageNotInitialized(_))));
    }

    #[test]
    fn test_save_replaces_changed_files() {
        let stores = ProjectStores::open_in_memory().unwrap();
        let coordinator = PersistenceCoordinator::with_stores(&stores);
        let old = snippet("old", "a.py");
        stores.db.upsert_snippets(std::slice::from_ref(&old)).unwrap();

        let new = snippet("new", "a.py");
        let untouched = snippet("keep", "b.py");
        let embeddings: HashMap<String, Vec<f32>> = [
            (new.id.clone(), vec![1.0, 0.0]),
            (untouched.id.clone(), vec![0.0, 0.0]),
        ]
        .into_iter()
        .collect();
        let edges = vec![Relationship::new(&new.id, "print", RelationKind::Calls)];
        let fingerprints: BTreeMap<String, String> =
            [("a.py".to_string(), "h1".to_string()), ("b.py".to_string(), "h2".to_string())]
                .into_iter()
                .collect();

        let report = coordinator
            .save(SaveBatch {
                snippets: &[new.clone(), untouched.clone()],
                relationships: &edges,
                embeddings: &embeddings,
                changed_files: &set(&["a.py"]),
                dirty: &HashSet::new(),
                fingerprints: &fingerprints,
            })
            .unwrap();

        assert_eq!(report.snippets_written, 1);
        assert_eq!(report.vectors_written, 1);
        assert!(stores.db.get_snippet(&old.id).unwrap().is_none());
        assert!(stores.db.get_snippet(&new.id).unwrap().is_some());
        assert!(stores.db.get_snippet(&untouched.id).unwrap().is_none());
        assert_eq!(stores.graph.get_outgoing_edges(&new.id).unwrap().len(), 1);
        assert_eq!(stores.db.get_fingerprint("b.py").unwrap().as_deref(), Some("h2"));
        assert_eq!(stores.vectors.count().unwrap(), 1);
    }

    #[test]
    fn test_dirty_snippets_of_unchanged_files_are_written() {
        let stores = ProjectStores::open_in_memory().unwrap();
        let coordinator = PersistenceCoordinator::with_stores(&stores);
        let mut reused = snippet("foo", "a.py");
        reused.summary = Some("retried".into());
        let dirty: HashSet<String> = [reused.id.clone()].into_iter().collect();

        coordinator
            .save(SaveBatch {
                snippets: std::slice::from_ref(&reused),
                relationships: &[],
                embeddings: &[(reused.id.clone(), vec![0.5, 0.5])].into_iter().collect(),
                changed_files: &BTreeSet::new(),
                dirty: &dirty,
                fingerprints: &BTreeMap::new(),
            })
            .unwrap();

        let stored = stores.db.get_snippet(&reused.id).unwrap().unwrap();
        assert_eq!(stored.summary.as_deref(), Some("retried"));
        assert_eq!(stores.vectors.count().unwrap(), 1);
    }

    #[test]
    fn test_cleanup_removes_unseen_files() {
        let stores = ProjectStores::open_in_memory().unwrap();
        let coordinator = PersistenceCoordinator::with_stores(&stores);
        let a = snippet("a", "a.py");
        let b = snippet("b", "b.py");
        let embeddings = [(a.id.clone(), vec![1.0]), (b.id.clone(), vec![1.0])].into_iter().collect();
        let fingerprints = [("a.py".to_string(), "1".to_string()), ("b.py".to_string(), "2".to_string())]
            .into_iter()
            .collect();
        coordinator
            .save(SaveBatch {
                snippets: &[a, b],
                relationships: &[],
                embeddings: &embeddings,
                changed_files: &set(&["a.py", "b.py"]),
                dirty: &HashSet::new(),
                fingerprints: &fingerprints,
            })
            .unwrap();

        let report = coordinator.cleanup(&set(&["a.py"])).unwrap();
        assert_eq!(report.files_removed, set(&["b.py"]));
        assert_eq!(report.snippets_removed, 1);
        assert_eq!(report.vectors_removed, 1);
        assert_eq!(report.fingerprints_removed, 1);
        assert_eq!(stores.db.get_all_file_paths().unwrap(), vec!["a.py"]);
        assert_eq!(stores.graph.get_all_file_paths().unwrap(), vec!["a.py"]);
        assert_eq!(stores.vectors.get_all_file_paths().unwrap(), vec!["a.py"]);
    }
}
