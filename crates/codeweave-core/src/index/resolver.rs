//! Relationship resolution for changed files

use super::assembler::SymbolTable;
use crate::language::RelationshipCandidate;
use crate::model::{RelationKind, Relationship, Snippet, SnippetKind};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Prefixes stripped from a reference before a second symbol lookup
const RECEIVER_PREFIXES: &[&str] = &["self.", "cls.", "Self::", "self::"];

/// Inputs for one resolve pass
pub struct ResolveInput<'a> {
    pub snippets: &'a [Snippet],
    /// Candidates extracted this run, keyed by file path
    pub candidates: &'a HashMap<String, Vec<RelationshipCandidate>>,
    pub symbols: &'a SymbolTable,
    pub changed_files: &'a BTreeSet<String>,
    pub file_nodes: &'a BTreeMap<String, String>,
    /// Snippets of unchanged files whose parent changed during assembly
    pub dirty: &'a HashSet<String>,
}

/// Map candidates of changed files to edges and derive containment edges.
///
/// Unresolved references keep the raw identifier as target; the graph store
/// turns it into a placeholder node.
pub fn resolve(input: ResolveInput<'_>) -> Vec<Relationship> {
    let by_id: HashMap<&str, &Snippet> = input.snippets.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut edges = EdgeSet::default();

    for snippet in input.snippets {
        if snippet.is_file() || snippet.chunk_index().is_some() {
            continue;
        }
        if !input.changed_files.contains(&snippet.file_path) && !input.dirty.contains(&snippet.id) {
            continue;
        }
        if let Some(parent) = snippet.parent_id.as_deref().filter(|p| *p != snippet.id) {
            edges.push(Relationship::new(parent, &snippet.id, RelationKind::Defines));
        }
    }

    let mut inherits = Vec::new();
    for file in input.changed_files {
        let Some(candidates) = input.candidates.get(file) else {
            continue;
        };
        for candidate in candidates {
            let source = match candidate.source_id.as_deref().or_else(|| input.file_nodes.get(file).map(String::as_str)) {
                Some(source) => source,
                None => {
                    tracing::debug!(file = %file, symbol = %candidate.symbol, "no anchor for file-level reference");
                    continue;
                }
            };
            let target = resolve_symbol(input.symbols, &candidate.symbol);
            let edge = Relationship::new(source, target, candidate.kind).with_metadata(candidate.metadata.clone());
            if candidate.kind == RelationKind::Inherits {
                inherits.push(edge.clone());
            }
            edges.push(edge);
        }
    }

    for edge in derive_overrides(&inherits, input.snippets, &by_id) {
        edges.push(edge);
    }

    edges.into_vec()
}

/// Exact name first, then without a receiver prefix, else the raw reference
pub fn resolve_symbol(symbols: &SymbolTable, symbol: &str) -> String {
    if let Some(id) = symbols.lookup(symbol) {
        return id.to_string();
    }
    RECEIVER_PREFIXES
        .iter()
        .filter_map(|prefix| symbol.strip_prefix(prefix))
        .find_map(|stripped| symbols.lookup(stripped))
        .map(str::to_string)
        .unwrap_or_else(|| symbol.to_string())
}

/// `method OVERRIDES base_method` for each INHERITS edge that landed on a local type
fn derive_overrides(
    inherits: &[Relationship],
    snippets: &[Snippet],
    by_id: &HashMap<&str, &Snippet>,
) -> Vec<Relationship> {
    let mut methods: HashMap<&str, Vec<&Snippet>> = HashMap::new();
    for snippet in snippets.iter().filter(|s| s.kind == SnippetKind::Method && s.chunk_index().is_none()) {
        if let Some(parent) = snippet.parent_id.as_deref() {
            methods.entry(parent).or_default().push(snippet);
        }
    }

    let mut edges = Vec::new();
    for edge in inherits {
        if !by_id.contains_key(edge.target_id.as_str()) || edge.source_id == edge.target_id {
            continue;
        }
        let (Some(own), Some(base)) = (
            methods.get(edge.source_id.as_str()),
            methods.get(edge.target_id.as_str()),
        ) else {
            continue;
        };
        for method in own {
            if let Some(overridden) = base.iter().find(|b| b.name == method.name) {
                edges.push(Relationship::new(&method.id, &overridden.id, RelationKind::Overrides));
            }
        }
    }
    edges
}

/// Edges in first-seen order, unique by `(source, target, kind)`
#[derive(Default)]
struct EdgeSet {
    seen: HashSet<(String, String, RelationKind)>,
    edges: Vec<Relationship>,
}

impl EdgeSet {
    fn push(&mut self, edge: Relationship) {
        let key = (edge.source_id.clone(), edge.target_id.clone(), edge.kind);
        if self.seen.insert(key) {
            self.edges.push(edge);
        }
    }

    fn into_vec(self) -> Vec<Relationship> {
        self.edges
    }
}
