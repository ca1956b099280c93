//! CLI command handlers

pub mod ask;
pub mod cleanup;
pub mod collaborators;
pub mod index;
pub mod search;
pub mod status;

use anyhow::Result;
use codeweave_core::{CodeweaveError, Config, ProjectIndexer};
use std::path::Path;

/// Indexer with its stores opened, for commands that read an indexed project
pub fn open_indexed(path: &Path, config: &Config) -> Result<ProjectIndexer> {
    let mut indexer = ProjectIndexer::new(path, config)?;
    if !indexer.context().snippets_db_path().exists() {
        return Err(CodeweaveError::NotIndexed(format!(
            "run `codeweave index {}` first",
            path.display()
        ))
        .into());
    }
    indexer.initialize_storage()?;
    Ok(indexer)
}
