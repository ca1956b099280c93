//! Keyword lookups over the snippet table

use super::snippets::{snippet_from_row, SNIPPET_COLUMNS};
use super::Database;
use crate::error::Result;
use crate::model::Snippet;
use rusqlite::params;

/// A keyword match with its relevance score (higher is better)
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub snippet: Snippet,
    pub score: f64,
}

impl Database {
    /// BM25 full-text search; `match_expr` must already be valid FTS5 syntax
    pub fn search_fts(&self, match_expr: &str, limit: usize) -> Result<Vec<KeywordHit>> {
        if match_expr.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        self.handle.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, -bm25(snippets_fts, 10.0, 1.0, 2.0, 1.0) AS score
                 FROM snippets_fts
                 JOIN snippets s ON s.rowid = snippets_fts.rowid
                 WHERE snippets_fts MATCH ?1
                 ORDER BY score DESC
                 LIMIT ?2",
                SNIPPET_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let hits = stmt
                .query_map(params![match_expr, limit as i64], |row| {
                    Ok(KeywordHit {
                        snippet: snippet_from_row(row)?,
                        score: row.get(15)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(hits)
        })
    }

    /// Case-insensitive substring match on name, content and summary
    pub fn search_substring(&self, needle: &str, limit: usize) -> Result<Vec<KeywordHit>> {
        let needle = needle.trim();
        if needle.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let pattern = format!(
            "%{}%",
            needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        self.handle.with_conn(|conn| {
            let sql = format!(
                "SELECT {},
                        CASE WHEN s.name LIKE ?1 ESCAPE '\\' THEN 2.0 ELSE 1.0 END AS score
                 FROM snippets s
                 WHERE s.name LIKE ?1 ESCAPE '\\'
                    OR s.content LIKE ?1 ESCAPE '\\'
                    OR s.summary LIKE ?1 ESCAPE '\\'
                 ORDER BY score DESC, s.file_path, s.start_byte
                 LIMIT ?2",
                SNIPPET_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let hits = stmt
                .query_map(params![pattern, limit as i64], |row| {
                    Ok(KeywordHit {
                        snippet: snippet_from_row(row)?,
                        score: row.get(15)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(hits)
        })
    }
}
