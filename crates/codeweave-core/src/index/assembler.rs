//! Snippet graph assembly: file nodes, orphan linking and the symbol table

use crate::model::{line_span, snippet_id, Snippet, SnippetKind, META_LANGUAGE};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Snippets of one file as they enter assembly
#[derive(Debug, Clone)]
pub struct FileSnippets {
    pub file_path: String,
    pub snippets: Vec<Snippet>,
    /// Current source text, needed to synthesize the file node
    pub source: Option<String>,
    pub changed: bool,
}

/// Assembled snippet set for one run
#[derive(Debug, Default)]
pub struct Assembly {
    /// Every snippet, grouped by file in path order, file node first
    pub snippets: Vec<Snippet>,
    /// File path to file node id
    pub file_nodes: BTreeMap<String, String>,
    /// Snippets of unchanged files that assembly modified
    pub dirty: HashSet<String>,
}

/// Build file nodes and re-parent orphans to them
pub fn assemble(files: Vec<FileSnippets>) -> Assembly {
    let mut assembly = Assembly::default();
    let mut per_file: Vec<(String, bool, Vec<Snippet>)> = Vec::with_capacity(files.len());

    for file in files {
        let FileSnippets {
            file_path,
            mut snippets,
            source,
            changed,
        } = file;

        let existing = snippets.iter().find(|s| s.is_file()).map(|s| s.id.clone());
        let has_elements = snippets.iter().any(|s| !s.is_file());

        match (existing, changed) {
            (Some(id), false) => {
                assembly.file_nodes.insert(file_path.clone(), id);
            }
            _ if !has_elements => {
                snippets.retain(|s| !s.is_file());
            }
            _ => {
                snippets.retain(|s| !s.is_file());
                match source.as_deref() {
                    Some(source) => {
                        let node = synthesize_file_node(&file_path, source, &snippets);
                        if !changed {
                            assembly.dirty.insert(node.id.clone());
                        }
                        assembly.file_nodes.insert(file_path.clone(), node.id.clone());
                        snippets.insert(0, node);
                    }
                    None => {
                        tracing::warn!(file = %file_path, "no source available, file node not built");
                    }
                }
            }
        }

        sort_snippets(&mut snippets);
        per_file.push((file_path, changed, snippets));
    }

    let known: HashSet<String> = per_file
        .iter()
        .flat_map(|(_, _, snippets)| snippets.iter().map(|s| s.id.clone()))
        .collect();

    for (file_path, changed, mut snippets) in per_file {
        if let Some(file_node) = assembly.file_nodes.get(&file_path) {
            for snippet in snippets.iter_mut().filter(|s| !s.is_file()) {
                let orphan = match snippet.parent_id.as_deref() {
                    None => true,
                    Some(parent) => !known.contains(parent),
                };
                if orphan && snippet.parent_id.as_deref() != Some(file_node.as_str()) {
                    snippet.parent_id = Some(file_node.clone());
                    if !changed {
                        assembly.dirty.insert(snippet.id.clone());
                    }
                }
            }
        }
        assembly.snippets.extend(snippets);
    }

    assembly
}

/// File first, then by byte offset, outer before inner
fn sort_snippets(snippets: &mut [Snippet]) {
    snippets.sort_by(|a, b| {
        b.is_file()
            .cmp(&a.is_file())
            .then(a.start_byte.cmp(&b.start_byte))
            .then(b.end_byte.cmp(&a.end_byte))
            .then(a.chunk_index().cmp(&b.chunk_index()))
    });
}

/// Splice leading material, the text between elements, and each outermost
/// element's full text or skeleton, in byte order
pub fn synthesize_file_node(file_path: &str, source: &str, snippets: &[Snippet]) -> Snippet {
    let mut elements: Vec<&Snippet> = snippets
        .iter()
        .filter(|s| !s.is_file() && s.chunk_index().is_none())
        .collect();
    elements.sort_by(|a, b| a.start_byte.cmp(&b.start_byte).then(b.end_byte.cmp(&a.end_byte)));

    let mut content = String::with_capacity(source.len());
    let mut cursor = 0;
    for element in elements {
        if element.start_byte < cursor {
            continue;
        }
        content.push_str(source.get(cursor..element.start_byte).unwrap_or_default());
        content.push_str(&element.content);
        cursor = element.end_byte;
    }
    content.push_str(source.get(cursor..).unwrap_or_default());

    let (start_line, end_line) = line_span(source, 0, source.len());
    let mut node = Snippet {
        id: snippet_id(file_path, 0, source.len(), &content),
        name: file_path.to_string(),
        kind: SnippetKind::File,
        content,
        summary: None,
        parent_id: None,
        docstring: None,
        signature: None,
        file_path: file_path.to_string(),
        start_line,
        end_line,
        start_byte: 0,
        end_byte: source.len(),
        is_skeleton: snippets.iter().any(|s| s.is_skeleton),
        metadata: Default::default(),
    };
    if let Some(language) = snippets.iter().find_map(|s| s.metadata.get(META_LANGUAGE)) {
        node.metadata.insert(META_LANGUAGE.to_string(), language.clone());
    }
    node
}

/// Declared name to snippet id, first writer wins.
///
/// Functions, classes and structs register before methods; methods also
/// register as `Owner.method`.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    symbols: HashMap<String, String>,
}

impl SymbolTable {
    pub fn build(snippets: &[Snippet]) -> Self {
        let mut table = Self::default();
        let names: HashMap<&str, &str> = snippets
            .iter()
            .map(|s| (s.id.as_str(), s.name.as_str()))
            .collect();

        let declared = snippets.iter().filter(|s| s.chunk_index().is_none());
        for snippet in declared.clone().filter(|s| s.kind.is_symbol_definition()) {
            table.insert(&snippet.name, &snippet.id);
        }
        for snippet in declared.filter(|s| s.kind == SnippetKind::Method) {
            if let Some(owner) = snippet.parent_id.as_deref().and_then(|p| names.get(p)) {
                table.insert(&format!("{}.{}", owner, snippet.name), &snippet.id);
            }
            table.insert(&snippet.name, &snippet.id);
        }
        table
    }

    fn insert(&mut self, name: &str, id: &str) {
        self.symbols
            .entry(name.to_string())
            .or_insert_with(|| id.to_string());
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.symbols.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
