//! Language support: snippet extraction and relationship candidates per language
//!
//! Each language implements [`LanguageSupport`]; the [`LanguageRegistry`] resolves the
//! implementation for a file once, by extension.

mod c;
mod python;
mod rust;

pub use c::CSupport;
pub use python::PythonSupport;
pub use rust::RustSupport;

use crate::error::{Error, Result};
use crate::model::{RelationKind, Snippet};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tree_sitter::{Node, Parser, Tree};

/// Output of one parse pass over a file
pub struct ParsedFile {
    pub file_path: String,
    pub source: String,
    pub language: &'static str,
    pub snippets: Vec<Snippet>,
    pub tree: Tree,
}

/// A reference found in source, not yet mapped to a target snippet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipCandidate {
    /// Innermost enclosing snippet; `None` anchors the reference to the file itself
    pub source_id: Option<String>,
    /// Identifier as written at the reference site
    pub symbol: String,
    pub kind: RelationKind,
    pub metadata: BTreeMap<String, String>,
}

impl RelationshipCandidate {
    pub fn new(source_id: Option<String>, symbol: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            source_id,
            symbol: symbol.into(),
            kind,
            metadata: BTreeMap::new(),
        }
    }

    pub fn meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Capability interface for one source language
pub trait LanguageSupport: Send + Sync {
    /// Language id (e.g. "python")
    fn id(&self) -> &'static str;

    /// File extensions handled, without the dot
    fn extensions(&self) -> &'static [&'static str];

    /// Extract structural snippets. Snippet metadata carries the tree-sitter node id so
    /// [`extract_relationships`](Self::extract_relationships) can correlate nodes with
    /// snippets without re-parsing.
    fn parse(&self, source: &str, file_path: &str) -> Result<ParsedFile>;

    /// Relationship candidates of a parsed file, anchored to their enclosing snippets
    fn extract_relationships(&self, parsed: &ParsedFile) -> Result<Vec<RelationshipCandidate>>;
}

/// Extension-keyed registry of language supports
pub struct LanguageRegistry {
    supports: Vec<Arc<dyn LanguageSupport>>,
    by_extension: HashMap<String, usize>,
}

impl LanguageRegistry {
    /// Registry with no languages
    pub fn empty() -> Self {
        Self {
            supports: Vec::new(),
            by_extension: HashMap::new(),
        }
    }

    /// Registry with every built-in language
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(PythonSupport));
        registry.register(Arc::new(RustSupport));
        registry.register(Arc::new(CSupport));
        registry
    }

    /// Register a language; later registrations win for shared extensions
    pub fn register(&mut self, support: Arc<dyn LanguageSupport>) {
        let idx = self.supports.len();
        for ext in support.extensions() {
            self.by_extension.insert(ext.to_lowercase(), idx);
        }
        self.supports.push(support);
    }

    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn LanguageSupport>> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.by_extension
            .get(&ext)
            .map(|&idx| Arc::clone(&self.supports[idx]))
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }

    pub fn language_ids(&self) -> Vec<&'static str> {
        self.supports.iter().map(|s| s.id()).collect()
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Parse source with a tree-sitter grammar
pub(crate) fn parse_tree(source: &str, language: tree_sitter::Language) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| Error::Parse(e.to_string()))?;
    parser
        .parse(source, None)
        .ok_or_else(|| Error::Parse("Failed to parse source".to_string()))
}

pub(crate) fn node_text<'a>(source: &'a str, node: Node) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}

/// Declaration text up to the body, whitespace collapsed
pub(crate) fn signature_before(source: &str, start: usize, body_start: Option<usize>) -> String {
    let end = body_start.unwrap_or_else(|| {
        source[start..]
            .find('\n')
            .map(|p| start + p)
            .unwrap_or(source.len())
    });
    let raw = &source[start..end.max(start)];
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(|c: char| c == ':' || c == '{')
        .trim()
        .to_string()
}

/// Comment lines directly above a node
pub(crate) fn extract_leading_comments(source: &str, node: Node) -> String {
    let start_byte = node.start_byte();
    if start_byte == 0 {
        return String::new();
    }

    let preceding = &source[..start_byte];
    let mut trivia_lines = Vec::new();

    for line in preceding.lines().rev() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !trivia_lines.is_empty() {
                break;
            }
            continue;
        }
        if is_comment_line(trimmed) {
            trivia_lines.push(trimmed);
        } else {
            break;
        }
    }

    trivia_lines.reverse();
    trivia_lines.join("\n")
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with("//") || line.starts_with('#') || line.starts_with("/*") || line.starts_with('*')
}

/// Maps tree-sitter nodes back to the snippets produced from them
pub(crate) struct SnippetLocator {
    by_node: HashMap<usize, String>,
    by_range: HashMap<(usize, usize), String>,
}

impl SnippetLocator {
    pub(crate) fn new(snippets: &[Snippet]) -> Self {
        let mut by_node = HashMap::new();
        let mut by_range = HashMap::new();
        for snippet in snippets.iter().filter(|s| s.chunk_index().is_none()) {
            if let Some(node_id) = snippet.ts_node_id() {
                by_node.insert(node_id, snippet.id.clone());
            }
            by_range
                .entry((snippet.start_byte, snippet.end_byte))
                .or_insert_with(|| snippet.id.clone());
        }
        Self { by_node, by_range }
    }

    /// Snippet produced from exactly this node
    pub(crate) fn own(&self, node: Node) -> Option<String> {
        self.by_node
            .get(&node.id())
            .or_else(|| self.by_range.get(&(node.start_byte(), node.end_byte())))
            .cloned()
    }

    /// Innermost snippet enclosing this node
    pub(crate) fn containing(&self, node: Node) -> Option<String> {
        let mut current = Some(node);
        while let Some(n) = current {
            if let Some(id) = self.own(n) {
                return Some(id);
            }
            current = n.parent();
        }
        None
    }
}
