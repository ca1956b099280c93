//! Shared SQLite connection handling for the three stores

use crate::error::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

/// A connection shared by async tasks; every statement runs under the lock
pub struct SqliteHandle {
    conn: Mutex<Connection>,
}

impl SqliteHandle {
    /// Open database at path, creating parent directories if necessary
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Run `f` with exclusive access to the connection
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Other(anyhow::anyhow!("sqlite connection mutex poisoned")))?;
        f(&conn)
    }

    /// Run `f` inside `BEGIN IMMEDIATE`, committing on success and rolling back on error
    pub fn transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.with_conn(|conn| {
            conn.execute("BEGIN IMMEDIATE", [])?;
            let result = f(conn);
            if result.is_ok() {
                conn.execute("COMMIT", [])?;
            } else {
                let _ = conn.execute("ROLLBACK", []);
            }
            result
        })
    }
}

/// `?,?,?` for an `IN (...)` clause
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

/// Upper bound on bound parameters per statement
pub(crate) const MAX_PARAMS: usize = 500;
