//! Error types for codeweave

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using CodeweaveError
pub type Result<T> = std::result::Result<T, CodeweaveError>;

/// Error type alias for convenience
pub type Error = CodeweaveError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
    pub const LOCKED: i32 = 4;
}

/// Main error type for codeweave
#[derive(Debug, Error)]
pub enum CodeweaveError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Storage not initialized: call initialize_storage() before {0}")]
    StorageNotInitialized(&'static str),

    #[error("Index is locked by process {pid} ({path})")]
    IndexLocked { path: PathBuf, pid: String },

    #[error("Storage corruption in {store}: {message}")]
    Corruption { store: &'static str, message: String },

    #[error("Project has not been indexed yet: {0}")]
    NotIndexed(String),

    #[error("Unsupported language for file: {0}")]
    UnsupportedLanguage(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {0}")]
    ExternalError(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CodeweaveError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotIndexed(_) => exit_codes::NOT_FOUND,
            Self::InvalidInput(_) | Self::Config(_) | Self::UnsupportedLanguage(_) => {
                exit_codes::INVALID_INPUT
            }
            Self::IndexLocked { .. } => exit_codes::LOCKED,
            _ => exit_codes::GENERAL_ERROR,
        }
    }

    /// Whether this error reports a damaged SQLite file or virtual table
    pub fn is_corruption(&self) -> bool {
        match self {
            Self::Corruption { .. } => true,
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            CodeweaveError::NotIndexed("x".into()).exit_code(),
            exit_codes::NOT_FOUND
        );
        assert_eq!(
            CodeweaveError::IndexLocked {
                path: PathBuf::from("index.lock"),
                pid: "42".into()
            }
            .exit_code(),
            exit_codes::LOCKED
        );
        assert_eq!(
            CodeweaveError::Llm("boom".into()).exit_code(),
            exit_codes::GENERAL_ERROR
        );
    }

    #[test]
    fn test_corruption_detection() {
        let corrupt = CodeweaveError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
            None,
        ));
        assert!(corrupt.is_corruption());
        assert!(!CodeweaveError::Parse("bad".into()).is_corruption());
    }
}
