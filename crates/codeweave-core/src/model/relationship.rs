//! Typed edges between snippets

use super::snippet::{Snippet, SnippetKind};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Relationship kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    Defines,
    Calls,
    Imports,
    Inherits,
    Overrides,
    Returns,
    DecoratedBy,
    Modifies,
    Instantiates,
}

impl RelationKind {
    pub const ALL: [RelationKind; 9] = [
        Self::Defines,
        Self::Calls,
        Self::Imports,
        Self::Inherits,
        Self::Overrides,
        Self::Returns,
        Self::DecoratedBy,
        Self::Modifies,
        Self::Instantiates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Defines => "DEFINES",
            Self::Calls => "CALLS",
            Self::Imports => "IMPORTS",
            Self::Inherits => "INHERITS",
            Self::Overrides => "OVERRIDES",
            Self::Returns => "RETURNS",
            Self::DecoratedBy => "DECORATED_BY",
            Self::Modifies => "MODIFIES",
            Self::Instantiates => "INSTANTIATES",
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown relationship kind: {}", s)))
    }
}

/// Directed typed edge `(source, target, kind, metadata)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    pub kind: RelationKind,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Relationship {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Identity used for deduplication and upserts
    pub fn key(&self) -> (&str, &str, RelationKind) {
        (&self.source_id, &self.target_id, self.kind)
    }
}

/// Lean projection of a snippet persisted in the graph store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub kind: SnippetKind,
    pub file_path: Option<String>,
}

impl GraphNode {
    /// Node for a referenced symbol with no local definition
    pub fn placeholder(symbol: &str) -> Self {
        Self {
            id: symbol.to_string(),
            name: symbol.to_string(),
            kind: SnippetKind::Placeholder,
            file_path: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == SnippetKind::Placeholder
    }
}

impl From<&Snippet> for GraphNode {
    fn from(snippet: &Snippet) -> Self {
        Self {
            id: snippet.id.clone(),
            name: snippet.name.clone(),
            kind: snippet.kind,
            file_path: Some(snippet.file_path.clone()),
        }
    }
}
