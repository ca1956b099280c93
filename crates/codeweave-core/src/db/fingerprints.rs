//! Per-file content fingerprints

use super::sqlite::{placeholders, MAX_PARAMS};
use super::Database;
use crate::error::Result;
use chrono::Utc;
use rusqlite::{params, params_from_iter};
use std::collections::HashMap;

impl Database {
    pub fn get_fingerprint(&self, file_path: &str) -> Result<Option<String>> {
        self.handle.with_conn(|conn| {
            match conn.query_row(
                "SELECT content_hash FROM file_fingerprints WHERE file_path = ?1",
                params![file_path],
                |row| row.get(0),
            ) {
                Ok(hash) => Ok(Some(hash)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// All stored fingerprints keyed by relative file path
    pub fn get_all_fingerprints(&self) -> Result<HashMap<String, String>> {
        self.handle.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT file_path, content_hash FROM file_fingerprints")?;
            let map = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<HashMap<String, String>, _>>()?;
            Ok(map)
        })
    }

    /// Record `(file_path, content_hash)` pairs
    pub fn set_fingerprints(&self, entries: &[(String, String)]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let now = Utc::now().to_rfc3339();
        self.handle.transaction(|conn| {
            let mut stmt = conn.prepare(
                "INSERT INTO file_fingerprints (file_path, content_hash, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(file_path) DO UPDATE SET
                     content_hash = excluded.content_hash,
                     updated_at = excluded.updated_at",
            )?;
            for (path, hash) in entries {
                stmt.execute(params![path, hash, now])?;
            }
            Ok(entries.len())
        })
    }

    pub fn delete_fingerprints(&self, file_paths: &[String]) -> Result<usize> {
        if file_paths.is_empty() {
            return Ok(0);
        }
        self.handle.transaction(|conn| {
            let mut deleted = 0;
            for chunk in file_paths.chunks(MAX_PARAMS) {
                let sql = format!(
                    "DELETE FROM file_fingerprints WHERE file_path IN ({})",
                    placeholders(chunk.len())
                );
                deleted += conn.execute(&sql, params_from_iter(chunk.iter()))?;
            }
            Ok(deleted)
        })
    }
}
