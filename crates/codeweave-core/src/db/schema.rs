//! Primary store schema and initialization

use super::sqlite::SqliteHandle;
use crate::error::{Error, Result};
use rusqlite::{params, Connection};
use std::path::Path;

/// Primary snippet store handle
pub struct Database {
    pub(crate) handle: SqliteHandle,
}

const SCHEMA_VERSION: i32 = 1;

const CREATE_TABLES: &str = r#"
-- Snippets keyed by content-derived id
CREATE TABLE IF NOT EXISTS snippets (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    content TEXT NOT NULL,
    summary TEXT,
    parent_id TEXT,
    docstring TEXT,
    signature TEXT,
    file_path TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    start_byte INTEGER NOT NULL,
    end_byte INTEGER NOT NULL,
    is_skeleton INTEGER NOT NULL DEFAULT 0,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    updated_at TEXT NOT NULL
);

-- File content fingerprints for change detection
CREATE TABLE IF NOT EXISTS file_fingerprints (
    file_path TEXT PRIMARY KEY,
    content_hash TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Full-text index over the snippets table
CREATE VIRTUAL TABLE IF NOT EXISTS snippets_fts USING fts5(
    name,
    content,
    summary,
    docstring,
    content='snippets',
    content_rowid='rowid',
    tokenize='porter unicode61'
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

CREATE INDEX IF NOT EXISTS idx_snippets_file ON snippets(file_path);
CREATE INDEX IF NOT EXISTS idx_snippets_parent ON snippets(parent_id);
CREATE INDEX IF NOT EXISTS idx_snippets_name ON snippets(name);
"#;

const CREATE_TRIGGERS: &str = r#"
CREATE TRIGGER IF NOT EXISTS snippets_ai
AFTER INSERT ON snippets
BEGIN
    INSERT INTO snippets_fts(rowid, name, content, summary, docstring)
    VALUES (new.rowid, new.name, new.content, new.summary, new.docstring);
END;

CREATE TRIGGER IF NOT EXISTS snippets_ad
AFTER DELETE ON snippets
BEGIN
    INSERT INTO snippets_fts(snippets_fts, rowid, name, content, summary, docstring)
    VALUES ('delete', old.rowid, old.name, old.content, old.summary, old.docstring);
END;

CREATE TRIGGER IF NOT EXISTS snippets_au
AFTER UPDATE ON snippets
BEGIN
    INSERT INTO snippets_fts(snippets_fts, rowid, name, content, summary, docstring)
    VALUES ('delete', old.rowid, old.name, old.content, old.summary, old.docstring);
    INSERT INTO snippets_fts(rowid, name, content, summary, docstring)
    VALUES (new.rowid, new.name, new.content, new.summary, new.docstring);
END;
"#;

impl Database {
    /// Open database at path, creating if necessary
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            handle: SqliteHandle::open(path)?,
        })
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            handle: SqliteHandle::open_in_memory()?,
        })
    }

    /// Create tables and triggers, then repair the full-text index if it drifted
    pub fn initialize(&self) -> Result<()> {
        self.handle.with_conn(|conn| {
            conn.execute_batch(CREATE_TABLES)?;
            conn.execute_batch(CREATE_TRIGGERS)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
            Ok(())
        })?;

        if !self.check_fts_integrity()? {
            tracing::warn!("full-text index out of sync with snippets table, rebuilding");
            self.rebuild_fts()?;
        }
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<Option<i32>> {
        self.handle.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .ok())
        })
    }

    /// Whether the full-text index matches the snippets table
    pub fn check_fts_integrity(&self) -> Result<bool> {
        self.handle.with_conn(|conn| {
            match conn.execute(
                "INSERT INTO snippets_fts(snippets_fts, rank) VALUES ('integrity-check', 1)",
                [],
            ) {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if matches!(
                        err.code,
                        rusqlite::ErrorCode::DatabaseCorrupt
                            | rusqlite::ErrorCode::NotADatabase
                    ) =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Rebuild the full-text index from the snippets table
    pub fn rebuild_fts(&self) -> Result<()> {
        self.handle.with_conn(|conn| {
            conn.execute("INSERT INTO snippets_fts(snippets_fts) VALUES ('rebuild')", [])?;
            Ok(())
        })
    }

    /// Run a write; on corruption rebuild the full-text index and retry once
    pub(crate) fn write_with_recovery<T>(
        &self,
        op: &'static str,
        f: impl Fn(&Connection) -> Result<T>,
    ) -> Result<T> {
        match self.handle.transaction(&f) {
            Ok(value) => Ok(value),
            Err(e) if e.is_corruption() => {
                tracing::warn!(op, "write failed on corrupt full-text index, rebuilding: {}", e);
                self.rebuild_fts()?;
                self.handle.transaction(&f).map_err(|retry| {
                    if retry.is_corruption() {
                        Error::Corruption {
                            store: "snippets",
                            message: format!("{} failed after index rebuild: {}", op, retry),
                        }
                    } else {
                        retry
                    }
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn corrupt() -> Error {
        Error::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
            None,
        ))
    }

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        assert_eq!(db.schema_version().unwrap(), Some(SCHEMA_VERSION));
        assert!(db.check_fts_integrity().unwrap());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.sqlite");
        Database::open(&path).unwrap().initialize().unwrap();
        Database::open(&path).unwrap().initialize().unwrap();
    }

    #[test]
    fn test_detects_and_repairs_desynced_index() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.handle
            .with_conn(|c| {
                c.execute(
                    "INSERT INTO snippets_fts(rowid, name, content, summary, docstring)
                     VALUES (999, 'ghost', 'ghost body', NULL, NULL)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        assert!(!db.check_fts_integrity().unwrap());
        db.rebuild_fts().unwrap();
        assert!(db.check_fts_integrity().unwrap());
    }

    #[test]
    fn test_write_retries_once_after_rebuild() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let attempts = Cell::new(0);
        let value = db
            .write_with_recovery("test", |_| {
                attempts.set(attempts.get() + 1);
                if attempts.get() == 1 {
                    Err(corrupt())
                } else {
                    Ok(7)
                }
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn test_second_corruption_is_fatal() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let attempts = Cell::new(0);
        let result: Result<()> = db.write_with_recovery("test", |_| {
            attempts.set(attempts.get() + 1);
            Err(corrupt())
        });
        assert!(matches!(result, Err(Error::Corruption { .. })));
        assert_eq!(attempts.get(), 2);
    }
}
