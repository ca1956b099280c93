//! SQLite-backed graph store

use super::{GraphStats, GraphStore};
use crate::db::sqlite::{placeholders, MAX_PARAMS};
use crate::db::SqliteHandle;
use crate::error::Result;
use crate::model::{GraphNode, RelationKind, Relationship, SnippetKind};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    file_path TEXT
);

CREATE TABLE IF NOT EXISTS edges (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (source_id, target_id, kind)
);

CREATE INDEX IF NOT EXISTS idx_nodes_file ON nodes(file_path);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
"#;

pub struct SqliteGraphStore {
    handle: SqliteHandle,
}

impl SqliteGraphStore {
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

fn conversion_error(col: usize, e: crate::error::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(e))
}

fn node_from_row(row: &Row) -> rusqlite::Result<GraphNode> {
    let kind: String = row.get(2)?;
    Ok(GraphNode {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: kind.parse::<SnippetKind>().map_err(|e| conversion_error(2, e))?,
        file_path: row.get(3)?,
    })
}

fn edge_from_row(row: &Row) -> rusqlite::Result<Relationship> {
    let kind: String = row.get(2)?;
    let metadata_json: String = row.get(3)?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
    })?;
    Ok(Relationship {
        source_id: row.get(0)?,
        target_id: row.get(1)?,
        kind: kind.parse::<RelationKind>().map_err(|e| conversion_error(2, e))?,
        metadata,
    })
}

fn ensure_placeholder(conn: &Connection, id: &str) -> Result<()> {
    let node = GraphNode::placeholder(id);
    conn.execute(
        "INSERT OR IGNORE INTO nodes (id, name, kind, file_path) VALUES (?1, ?2, ?3, NULL)",
        params![node.id, node.name, node.kind.as_str()],
    )?;
    Ok(())
}

impl GraphStore for SqliteGraphStore {
    fn upsert_nodes(&self, nodes: &[GraphNode]) -> Result<usize> {
        if nodes.is_empty() {
            return Ok(0);
        }
        self.handle.transaction(|conn| {
            let mut stmt = conn.prepare(
                "INSERT INTO nodes (id, name, kind, file_path) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     kind = excluded.kind,
                     file_path = excluded.file_path",
            )?;
            for node in nodes {
                stmt.execute(params![node.id, node.name, node.kind.as_str(), node.file_path])?;
            }
            Ok(nodes.len())
        })
    }

    fn upsert_edges(&self, edges: &[Relationship]) -> Result<usize> {
        if edges.is_empty() {
            return Ok(0);
        }
        self.handle.transaction(|conn| {
            for edge in edges {
                ensure_placeholder(conn, &edge.source_id)?;
                ensure_placeholder(conn, &edge.target_id)?;
                conn.execute(
                    "INSERT INTO edges (source_id, target_id, kind, metadata_json)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(source_id, target_id, kind) DO UPDATE SET
                         metadata_json = excluded.metadata_json",
                    params![
                        edge.source_id,
                        edge.target_id,
                        edge.kind.as_str(),
                        serde_json::to_string(&edge.metadata)?
                    ],
                )?;
            }
            Ok(edges.len())
        })
    }

    fn get_outgoing_edges(&self, node_id: &str) -> Result<Vec<Relationship>> {
        self.handle.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT source_id, target_id, kind, metadata_json FROM edges
                 WHERE source_id = ?1 ORDER BY kind, target_id",
            )?;
            let edges = stmt
                .query_map(params![node_id], edge_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(edges)
        })
    }

    fn get_outgoing_edges_bulk(
        &self,
        node_ids: &[String],
    ) -> Result<HashMap<String, Vec<Relationship>>> {
        let mut out: HashMap<String, Vec<Relationship>> = HashMap::new();
        if node_ids.is_empty() {
            return Ok(out);
        }
        self.handle.with_conn(|conn| {
            for chunk in node_ids.chunks(MAX_PARAMS) {
                let sql = format!(
                    "SELECT source_id, target_id, kind, metadata_json FROM edges
                     WHERE source_id IN ({}) ORDER BY kind, target_id",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), edge_from_row)?;
                for row in rows {
                    let edge = row?;
                    out.entry(edge.source_id.clone()).or_default().push(edge);
                }
            }
            Ok(())
        })?;
        Ok(out)
    }

    fn get_node(&self, node_id: &str) -> Result<Option<GraphNode>> {
        self.handle.with_conn(|conn| {
            match conn.query_row(
                "SELECT id, name, kind, file_path FROM nodes WHERE id = ?1",
                params![node_id],
                node_from_row,
            ) {
                Ok(node) => Ok(Some(node)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn delete_file_data(&self, file_path: &str) -> Result<usize> {
        self.handle.transaction(|conn| {
            conn.execute(
                "DELETE FROM edges
                 WHERE source_id IN (SELECT id FROM nodes WHERE file_path = ?1)",
                params![file_path],
            )?;
            // nodes still targeted from other files become placeholders
            let detached = conn.execute(
                "UPDATE nodes SET kind = ?2, file_path = NULL
                 WHERE file_path = ?1 AND id IN (SELECT target_id FROM edges)",
                params![file_path, SnippetKind::Placeholder.as_str()],
            )?;
            let deleted = conn.execute("DELETE FROM nodes WHERE file_path = ?1", params![file_path])?;
            Ok(detached + deleted)
        })
    }

    fn get_all_file_paths(&self) -> Result<Vec<String>> {
        self.handle.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT file_path FROM nodes WHERE file_path IS NOT NULL ORDER BY file_path",
            )?;
            let paths = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(paths)
        })
    }

    fn stats(&self) -> Result<GraphStats> {
        self.handle.with_conn(|conn| {
            let nodes: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))?;
            let placeholder_nodes: i64 = conn.query_row(
                "SELECT COUNT(*) FROM nodes WHERE kind = ?1",
                params![SnippetKind::Placeholder.as_str()],
                |r| r.get(0),
            )?;
            let edges: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |r| r.get(0))?;
            Ok(GraphStats {
                nodes: nodes as usize,
                placeholder_nodes: placeholder_nodes as usize,
                edges: edges as usize,
            })
        })
    }
}
