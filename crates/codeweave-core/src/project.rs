//! Per-project storage layout and the single-writer index lock

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::graph::{GraphStore, SqliteGraphStore};
use crate::vector::{SqliteVectorStore, VectorStore};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lock file name preventing concurrent indexing runs
const LOCK_FILE: &str = "index.lock";

/// Storage locations derived once per indexed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    pub project_id: String,
    pub source_root: PathBuf,
    pub data_dir: PathBuf,
}

impl ProjectContext {
    /// Derive the context for `source_root`, which must exist
    pub fn new(source_root: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let source_root = source_root.as_ref();
        if !source_root.is_dir() {
            return Err(Error::InvalidInput(format!(
                "not a directory: {}",
                source_root.display()
            )));
        }
        let source_root = source_root.canonicalize()?;
        let project_id = project_id(&source_root);
        let data_dir = config.data_root().join("projects").join(&project_id);

        Ok(Self {
            project_id,
            source_root,
            data_dir,
        })
    }

    pub fn snippets_db_path(&self) -> PathBuf {
        self.data_dir.join("snippets.sqlite")
    }

    pub fn graph_db_path(&self) -> PathBuf {
        self.data_dir.join("graph.sqlite")
    }

    pub fn vectors_db_path(&self) -> PathBuf {
        self.data_dir.join("vectors.sqlite")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE)
    }

    /// Whether any store has been created for this project
    pub fn has_storage(&self) -> bool {
        self.snippets_db_path().exists()
    }
}

/// The three backing stores of one project
#[derive(Clone)]
pub struct ProjectStores {
    pub db: Arc<Database>,
    pub graph: Arc<dyn GraphStore>,
    pub vectors: Arc<dyn VectorStore>,
}

impl ProjectStores {
    /// Open (creating if needed) every store under the project data directory
    pub fn open(context: &ProjectContext) -> Result<Self> {
        let db = Database::open(context.snippets_db_path())?;
        db.initialize()?;
        Ok(Self {
            db: Arc::new(db),
            graph: Arc::new(SqliteGraphStore::open(context.graph_db_path())?),
            vectors: Arc::new(SqliteVectorStore::open(context.vectors_db_path())?),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        db.initialize()?;
        Ok(Self {
            db: Arc::new(db),
            graph: Arc::new(SqliteGraphStore::open_in_memory()?),
            vectors: Arc::new(SqliteVectorStore::open_in_memory()?),
        })
    }
}

/// `{folder_name}_{8 hex chars of sha256(absolute path)}`
pub fn project_id(absolute_root: &Path) -> String {
    let digest = Sha256::digest(absolute_root.to_string_lossy().as_bytes());
    let hex: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    let folder = absolute_root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "root".to_string());
    format!("{}_{}", folder, hex)
}

/// Held for the duration of an indexing run; removes the lock file on drop
#[derive(Debug)]
pub struct IndexLock {
    path: PathBuf,
}

impl IndexLock {
    /// Create the lock file, failing if another run holds it
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let pid = std::fs::read_to_string(&path)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default();
                return Err(Error::IndexLocked { path, pid });
            }
            Err(e) => return Err(e.into()),
        };

        writeln!(file, "{}", std::process::id())?;
        tracing::debug!(lock = %path.display(), "acquired index lock");
        Ok(Self { path })
    }

    /// Remove a lock left behind by a crashed run
    pub fn force_release(path: &Path) -> Result<bool> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), "failed to release index lock: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_project_id_is_deterministic() {
        let path = Path::new("/home/dev/my-project");
        let a = project_id(path);
        let b = project_id(path);
        assert_eq!(a, b);
        assert!(a.starts_with("my-project_"));
        assert_eq!(a.len(), "my-project_".len() + 8);
        assert_ne!(a, project_id(Path::new("/tmp/my-project")));
    }

    #[test]
    fn test_context_paths_live_under_data_dir() {
        let src = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let config = Config {
            data_dir: Some(data.path().to_path_buf()),
            ..Default::default()
        };
        // CODEWEAVE_DATA_DIR would override the config, so only assert structure.
        let ctx = ProjectContext::new(src.path(), &config).unwrap();
        assert!(ctx.snippets_db_path().starts_with(&ctx.data_dir));
        assert!(ctx.data_dir.ends_with(&ctx.project_id));
        assert_eq!(ctx, ProjectContext::new(src.path(), &config).unwrap());
    }

    #[test]
    fn test_context_rejects_missing_dir() {
        let config = Config::default();
        assert!(ProjectContext::new("/definitely/not/here", &config).is_err());
    }

    #[test]
    fn test_lock_prevents_concurrent_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILE);

        let lock = IndexLock::acquire(&path).unwrap();
        let second = IndexLock::acquire(&path);
        assert!(matches!(second, Err(Error::IndexLocked { .. })));

        drop(lock);
        assert!(!path.exists());
        assert!(IndexLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_open_stores_creates_files() {
        let src = TempDir::new().unwrap();
        let ctx = ProjectContext {
            project_id: "p_00000000".into(),
            source_root: src.path().to_path_buf(),
            data_dir: src.path().join("data"),
        };
        assert!(!ctx.has_storage());
        let stores = ProjectStores::open(&ctx).unwrap();
        assert!(ctx.has_storage());
        assert!(ctx.graph_db_path().exists());
        assert_eq!(stores.db.count_snippets().unwrap(), 0);
        assert_eq!(stores.vectors.count().unwrap(), 0);
    }

    #[test]
    fn test_force_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILE);
        std::fs::write(&path, "999").unwrap();
        assert!(IndexLock::force_release(&path).unwrap());
        assert!(!IndexLock::force_release(&path).unwrap());
    }
}
