//! SQLite-backed vector store with brute-force cosine search

use super::{VectorEntry, VectorHit, VectorStore};
use crate::db::sqlite::{placeholders, MAX_PARAMS};
use crate::db::{bytes_to_embedding, cosine_similarity, embedding_to_bytes, SqliteHandle};
use crate::error::Result;
use chrono::Utc;
use rusqlite::{params, params_from_iter};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS vectors (
    id TEXT PRIMARY KEY,
    file_path TEXT NOT NULL,
    embedding BLOB NOT NULL,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    document TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_vectors_file ON vectors(file_path);
"#;

pub struct SqliteVectorStore {
    handle: SqliteHandle,
}

impl SqliteVectorStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            handle: SqliteHandle::open(path)?,
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            handle: SqliteHandle::open_in_memory()?,
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        self.handle.with_conn(|conn| {
            conn.execute_batch(CREATE_TABLES)?;
            Ok(())
        })
    }
}

impl VectorStore for SqliteVectorStore {
    fn upsert(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let now = Utc::now().to_rfc3339();
        self.handle.transaction(|conn| {
            let mut stmt = conn.prepare(
                "INSERT OR REPLACE INTO vectors
                     (id, file_path, embedding, metadata_json, document, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.id,
                    entry.file_path,
                    embedding_to_bytes(&entry.embedding),
                    serde_json::to_string(&entry.metadata)?,
                    entry.document,
                    now,
                ])?;
            }
            Ok(entries.len())
        })
    }

    fn delete_by_file(&self, file_path: &str) -> Result<usize> {
        self.handle.transaction(|conn| {
            Ok(conn.execute("DELETE FROM vectors WHERE file_path = ?1", params![file_path])?)
        })
    }

    fn query(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        if k == 0 || query.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits = self.handle.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, embedding, document, metadata_json FROM vectors")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;

            let mut hits = Vec::new();
            for row in rows {
                let (id, bytes, document, metadata_json) = row?;
                let score = cosine_similarity(query, &bytes_to_embedding(&bytes));
                let metadata: BTreeMap<String, serde_json::Value> =
                    serde_json::from_str(&metadata_json)?;
                hits.push(VectorHit {
                    id,
                    score,
                    document,
                    metadata,
                });
            }
            Ok(hits)
        })?;

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        let mut found = HashSet::new();
        if ids.is_empty() {
            return Ok(found);
        }
        self.handle.with_conn(|conn| {
            for chunk in ids.chunks(MAX_PARAMS) {
                let sql = format!(
                    "SELECT id FROM vectors WHERE id IN ({})",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get(0))?;
                for row in rows {
                    found.insert(row?);
                }
            }
            Ok(())
        })?;
        Ok(found)
    }

    fn get_all_file_paths(&self) -> Result<Vec<String>> {
        self.handle.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT file_path FROM vectors ORDER BY file_path")?;
            let paths = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(paths)
        })
    }

    fn count(&self) -> Result<usize> {
        self.handle.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM vectors", [], |r| r.get(0))?;
            Ok(count as usize)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, file: &str, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry {
            id: id.to_string(),
            file_path: file.to_string(),
            embedding,
            metadata: BTreeMap::new(),
            document: format!("doc {}", id),
        }
    }

    #[test]
    fn test_query_orders_by_similarity() {
        let store = SqliteVectorStore::open_in_memory().unwrap();
        store
            .upsert(&[
                entry("a", "a.py", vec![1.0, 0.0]),
                entry("b", "a.py", vec![0.7, 0.7]),
                entry("c", "b.py", vec![0.0, 1.0]),
            ])
            .unwrap();

        let hits = store.query(&[1.0, 0.1], 2).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(hits[0].document, "doc a");
    }

    #[test]
    fn test_delete_by_file_and_existing() {
        let store = SqliteVectorStore::open_in_memory().unwrap();
        store
            .upsert(&[entry("a", "a.py", vec![1.0]), entry("c", "b.py", vec![1.0])])
            .unwrap();
        assert_eq!(store.delete_by_file("a.py").unwrap(), 1);
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get_all_file_paths().unwrap(), vec!["b.py"]);

        let existing = store
            .existing_ids(&["a".to_string(), "c".to_string()])
            .unwrap();
        assert!(existing.contains("c"));
        assert!(!existing.contains("a"));
    }
}
