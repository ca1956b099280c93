//! Snippet rows: upsert, delete and lookups

use super::sqlite::{placeholders, MAX_PARAMS};
use super::Database;
use crate::error::Result;
use crate::model::{Snippet, SnippetKind};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::{BTreeMap, HashMap, HashSet};

pub(crate) const SNIPPET_COLUMNS: &str = "s.id, s.name, s.kind, s.content, s.summary, s.parent_id, \
     s.docstring, s.signature, s.file_path, s.start_line, s.end_line, s.start_byte, s.end_byte, \
     s.is_skeleton, s.metadata_json";

/// Map a row selected with [`SNIPPET_COLUMNS`]
pub(crate) fn snippet_from_row(row: &Row) -> rusqlite::Result<Snippet> {
    let kind: String = row.get(2)?;
    let kind = kind
        .parse::<SnippetKind>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let metadata_json: String = row.get(14)?;
    let metadata: BTreeMap<String, serde_json::Value> = serde_json::from_str(&metadata_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(14, Type::Text, Box::new(e)))?;

    Ok(Snippet {
        id: row.get(0)?,
        name: row.get(1)?,
        kind,
        content: row.get(3)?,
        summary: row.get(4)?,
        parent_id: row.get(5)?,
        docstring: row.get(6)?,
        signature: row.get(7)?,
        file_path: row.get(8)?,
        start_line: row.get::<_, i64>(9)? as usize,
        end_line: row.get::<_, i64>(10)? as usize,
        start_byte: row.get::<_, i64>(11)? as usize,
        end_byte: row.get::<_, i64>(12)? as usize,
        is_skeleton: row.get::<_, i64>(13)? != 0,
        metadata,
    })
}

fn upsert_one(conn: &Connection, snippet: &Snippet, now: &str) -> Result<()> {
    let metadata_json = serde_json::to_string(&snippet.metadata)?;
    conn.execute(
        "INSERT INTO snippets (id, name, kind, content, summary, parent_id, docstring, signature,
                               file_path, start_line, end_line, start_byte, end_byte,
                               is_skeleton, metadata_json, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             kind = excluded.kind,
             content = excluded.content,
             summary = excluded.summary,
             parent_id = excluded.parent_id,
             docstring = excluded.docstring,
             signature = excluded.signature,
             file_path = excluded.file_path,
             start_line = excluded.start_line,
             end_line = excluded.end_line,
             start_byte = excluded.start_byte,
             end_byte = excluded.end_byte,
             is_skeleton = excluded.is_skeleton,
             metadata_json = excluded.metadata_json,
             updated_at = excluded.updated_at",
        params![
            snippet.id,
            snippet.name,
            snippet.kind.as_str(),
            snippet.content,
            snippet.summary,
            snippet.parent_id,
            snippet.docstring,
            snippet.signature,
            snippet.file_path,
            snippet.start_line as i64,
            snippet.end_line as i64,
            snippet.start_byte as i64,
            snippet.end_byte as i64,
            snippet.is_skeleton as i64,
            metadata_json,
            now,
        ],
    )?;
    Ok(())
}

impl Database {
    /// Insert or update snippets in one transaction
    pub fn upsert_snippets(&self, snippets: &[Snippet]) -> Result<usize> {
        if snippets.is_empty() {
            return Ok(0);
        }
        let now = Utc::now().to_rfc3339();
        self.write_with_recovery("upsert_snippets", |conn| {
            for snippet in snippets {
                upsert_one(conn, snippet, &now)?;
            }
            Ok(snippets.len())
        })
    }

    /// Delete every snippet of a file
    pub fn delete_file_snippets(&self, file_path: &str) -> Result<usize> {
        self.write_with_recovery("delete_file_snippets", |conn| {
            Ok(conn.execute("DELETE FROM snippets WHERE file_path = ?1", params![file_path])?)
        })
    }

    /// Delete snippets by id
    pub fn delete_snippets(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.write_with_recovery("delete_snippets", |conn| {
            let mut deleted = 0;
            for chunk in ids.chunks(MAX_PARAMS) {
                let sql = format!("DELETE FROM snippets WHERE id IN ({})", placeholders(chunk.len()));
                deleted += conn.execute(&sql, params_from_iter(chunk.iter()))?;
            }
            Ok(deleted)
        })
    }

    pub fn get_snippet(&self, id: &str) -> Result<Option<Snippet>> {
        self.handle.with_conn(|conn| {
            let sql = format!("SELECT {} FROM snippets s WHERE s.id = ?1", SNIPPET_COLUMNS);
            match conn.query_row(&sql, params![id], snippet_from_row) {
                Ok(snippet) => Ok(Some(snippet)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Snippets of one file in source order
    pub fn get_snippets_by_file(&self, file_path: &str) -> Result<Vec<Snippet>> {
        self.handle.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM snippets s WHERE s.file_path = ?1
                 ORDER BY s.start_byte, s.end_byte DESC, s.id",
                SNIPPET_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let snippets = stmt
                .query_map(params![file_path], snippet_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(snippets)
        })
    }

    /// Bulk fetch; results follow the order of `ids`, missing ids are skipped
    pub fn get_snippets_by_ids(&self, ids: &[String]) -> Result<Vec<Snippet>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut found: HashMap<String, Snippet> = HashMap::new();
        self.handle.with_conn(|conn| {
            for chunk in ids.chunks(MAX_PARAMS) {
                let sql = format!(
                    "SELECT {} FROM snippets s WHERE s.id IN ({})",
                    SNIPPET_COLUMNS,
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), snippet_from_row)?;
                for row in rows {
                    let snippet = row?;
                    found.insert(snippet.id.clone(), snippet);
                }
            }
            Ok(())
        })?;

        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| found.remove(id))
            .collect())
    }

    /// Distinct file paths with at least one snippet
    pub fn get_all_file_paths(&self) -> Result<Vec<String>> {
        self.handle.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT file_path FROM snippets ORDER BY file_path")?;
            let paths = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(paths)
        })
    }

    pub fn count_snippets(&self) -> Result<usize> {
        self.handle.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM snippets", [], |r| r.get(0))?;
            Ok(count as usize)
        })
    }

    /// Snippet counts by kind, and how many lack a summary
    pub fn snippet_stats(&self) -> Result<SnippetStats> {
        self.handle.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM snippets GROUP BY kind")?;
            let by_kind = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
                .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
            let unsummarized: i64 = conn.query_row(
                "SELECT COUNT(*) FROM snippets WHERE summary IS NULL OR summary = ''",
                [],
                |r| r.get(0),
            )?;
            let files: i64 =
                conn.query_row("SELECT COUNT(DISTINCT file_path) FROM snippets", [], |r| r.get(0))?;
            Ok(SnippetStats {
                total: by_kind.values().sum(),
                by_kind,
                unsummarized: unsummarized as usize,
                files: files as usize,
            })
        })
    }
}

/// Aggregate counts over the snippets table
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SnippetStats {
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub unsummarized: usize,
    pub files: usize,
}
