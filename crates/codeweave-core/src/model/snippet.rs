//! Snippet: a structural code unit

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Metadata key holding the order of a chunk under its skeleton parent
pub const META_CHUNK_INDEX: &str = "chunk_index";
/// Metadata key holding the tree-sitter node id within one parse pass
pub const META_TS_NODE_ID: &str = "ts_node_id";
/// Metadata key holding the byte offset of the body relative to the snippet start
pub const META_BODY_OFFSET: &str = "body_offset";
/// Metadata key holding the enclosing snippet's summary, written by the top-down pass
pub const META_PARENT_SUMMARY: &str = "parent_summary";
/// Metadata key holding comments directly above the definition
pub const META_LEADING_COMMENTS: &str = "leading_comments";
/// Metadata key holding the source language id
pub const META_LANGUAGE: &str = "language";

/// Marker appended to skeleton text where a body was elided
pub const ELISION_MARKER: &str = "...";

/// Kind of structural unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnippetKind {
    Function,
    Class,
    Struct,
    Method,
    File,
    Placeholder,
}

impl SnippetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Method => "method",
            Self::File => "file",
            Self::Placeholder => "placeholder",
        }
    }

    /// Kinds that register a name in the symbol table
    pub fn is_symbol_definition(&self) -> bool {
        matches!(self, Self::Function | Self::Class | Self::Struct)
    }
}

impl std::fmt::Display for SnippetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnippetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "function" => Ok(Self::Function),
            "class" => Ok(Self::Class),
            "struct" => Ok(Self::Struct),
            "method" => Ok(Self::Method),
            "file" | "module" => Ok(Self::File),
            "placeholder" => Ok(Self::Placeholder),
            other => Err(Error::InvalidInput(format!("unknown snippet kind: {}", other))),
        }
    }
}

/// A structural code unit with identity, content and position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: String,
    pub name: String,
    pub kind: SnippetKind,
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub docstring: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    #[serde(default)]
    pub is_skeleton: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Snippet {
    /// Build a snippet whose id is derived from its location and content
    pub fn new(
        name: impl Into<String>,
        kind: SnippetKind,
        content: impl Into<String>,
        file_path: impl Into<String>,
        (start_byte, end_byte): (usize, usize),
        (start_line, end_line): (usize, usize),
    ) -> Self {
        let content = content.into();
        let file_path = file_path.into();
        let id = snippet_id(&file_path, start_byte, end_byte, &content);
        Self {
            id,
            name: name.into(),
            kind,
            content,
            summary: None,
            parent_id: None,
            docstring: None,
            signature: None,
            file_path,
            start_line,
            end_line,
            start_byte,
            end_byte,
            is_skeleton: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == SnippetKind::File
    }

    /// Position among sibling chunks, for pieces of an oversized snippet
    pub fn chunk_index(&self) -> Option<usize> {
        self.metadata
            .get(META_CHUNK_INDEX)
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
    }

    /// Tree-sitter node id recorded at parse time
    pub fn ts_node_id(&self) -> Option<usize> {
        self.metadata
            .get(META_TS_NODE_ID)
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    /// Text handed to the embedding model
    pub fn embedding_text(&self) -> String {
        match self.summary.as_deref() {
            Some(summary) if !summary.is_empty() => {
                format!("Summary: {}\n\nCode:\n{}", summary, self.content)
            }
            _ => self.content.clone(),
        }
    }
}

/// Stable snippet id from `(file_path, position, content)`.
///
/// Re-parsing identical content at the same location yields the same id.
pub fn snippet_id(file_path: &str, start_byte: usize, end_byte: usize, content: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(file_path.as_bytes());
    hasher.update(&[0]);
    hasher.update(&(start_byte as u64).to_le_bytes());
    hasher.update(&(end_byte as u64).to_le_bytes());
    hasher.update(content.as_bytes());
    hasher.finalize().to_hex()[..32].to_string()
}

/// Content fingerprint of a whole file
pub fn content_fingerprint(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// 1-based line numbers spanned by a byte range
pub fn line_span(source: &str, start_byte: usize, end_byte: usize) -> (usize, usize) {
    let start = start_byte.min(source.len());
    let end = end_byte.min(source.len()).max(start);
    let start_line = source.as_bytes()[..start]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1;
    let end_line = start_line
        + source.as_bytes()[start..end]
            .iter()
            .filter(|&&b| b == b'\n')
            .count();
    (start_line, end_line)
}
