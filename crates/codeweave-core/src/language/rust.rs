//! Rust support via tree-sitter-rust

use super::{
    extract_leading_comments, node_text, parse_tree, signature_before, LanguageSupport,
    ParsedFile, RelationshipCandidate, SnippetLocator,
};
use crate::error::Result;
use crate::model::{
    line_span, RelationKind, Snippet, SnippetKind, META_BODY_OFFSET, META_LANGUAGE,
    META_LEADING_COMMENTS, META_TS_NODE_ID,
};
use std::collections::HashMap;
use tree_sitter::{Node, TreeCursor};

/// Metadata key naming the `impl` target of a method
const META_IMPL_TYPE: &str = "impl_type";

pub struct RustSupport;

impl LanguageSupport for RustSupport {
    fn id(&self) -> &'static str {
        "rust"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn parse(&self, source: &str, file_path: &str) -> Result<ParsedFile> {
        let tree = parse_tree(source, tree_sitter_rust::LANGUAGE.into())?;
        let mut snippets = Vec::new();
        {
            let mut cursor = tree.root_node().walk();
            collect_items(source, file_path, &mut cursor, &Scope::TopLevel, &mut snippets);
        }
        attach_impl_methods(&mut snippets);

        Ok(ParsedFile {
            file_path: file_path.to_string(),
            source: source.to_string(),
            language: self.id(),
            snippets,
            tree,
        })
    }

    fn extract_relationships(&self, parsed: &ParsedFile) -> Result<Vec<RelationshipCandidate>> {
        let locator = SnippetLocator::new(&parsed.snippets);
        let types: HashMap<&str, &str> = parsed
            .snippets
            .iter()
            .filter(|s| matches!(s.kind, SnippetKind::Struct | SnippetKind::Class))
            .map(|s| (s.name.as_str(), s.id.as_str()))
            .collect();

        let mut candidates = Vec::new();
        let mut cursor = parsed.tree.root_node().walk();
        collect_references(&parsed.source, &locator, &types, &mut cursor, &mut candidates);
        Ok(candidates)
    }
}

/// Where an item sits while walking
enum Scope {
    TopLevel,
    Item { id: String },
    Impl { type_name: String },
    Trait { id: String },
}

fn collect_items(
    source: &str,
    file_path: &str,
    cursor: &mut TreeCursor,
    scope: &Scope,
    out: &mut Vec<Snippet>,
) {
    if !cursor.goto_first_child() {
        return;
    }

    loop {
        let node = cursor.node();
        match node.kind() {
            "function_item" | "struct_item" | "enum_item" | "trait_item" => {
                let snippet = build_snippet(source, file_path, node, scope);
                let inner = match node.kind() {
                    "trait_item" => Scope::Trait {
                        id: snippet.id.clone(),
                    },
                    _ => Scope::Item {
                        id: snippet.id.clone(),
                    },
                };
                out.push(snippet);
                if let Some(body) = node.child_by_field_name("body") {
                    let mut body_cursor = body.walk();
                    collect_items(source, file_path, &mut body_cursor, &inner, out);
                }
            }
            "impl_item" => {
                let type_name = node
                    .child_by_field_name("type")
                    .map(|t| base_type_name(node_text(source, t)))
                    .unwrap_or_default();
                if let Some(body) = node.child_by_field_name("body") {
                    let mut body_cursor = body.walk();
                    collect_items(
                        source,
                        file_path,
                        &mut body_cursor,
                        &Scope::Impl { type_name },
                        out,
                    );
                }
            }
            _ => collect_items(source, file_path, cursor, scope, out),
        }

        if !cursor.goto_next_sibling() {
            break;
        }
    }
    cursor.goto_parent();
}

fn build_snippet(source: &str, file_path: &str, node: Node, scope: &Scope) -> Snippet {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(source, n).to_string())
        .unwrap_or_else(|| "<anonymous>".to_string());

    let kind = match node.kind() {
        "struct_item" | "enum_item" => SnippetKind::Struct,
        "trait_item" => SnippetKind::Class,
        _ => match scope {
            Scope::Impl { .. } | Scope::Trait { .. } => SnippetKind::Method,
            _ => SnippetKind::Function,
        },
    };

    let (start, end) = (node.start_byte(), node.end_byte());
    let body = node.child_by_field_name("body");
    let mut snippet = Snippet::new(
        name,
        kind,
        &source[start..end],
        file_path,
        (start, end),
        line_span(source, start, end),
    );

    snippet.parent_id = match scope {
        Scope::Item { id } | Scope::Trait { id } => Some(id.clone()),
        _ => None,
    };
    if let Scope::Impl { type_name } = scope {
        snippet.set_metadata(META_IMPL_TYPE, type_name.as_str());
    }

    snippet.signature = Some(signature_before(source, start, body.map(|b| b.start_byte())));
    snippet.set_metadata(META_TS_NODE_ID, node.id() as u64);
    snippet.set_metadata(META_LANGUAGE, "rust");
    if let Some(body) = body {
        snippet.set_metadata(META_BODY_OFFSET, (body.start_byte() - start) as u64);
    }

    let comments = extract_leading_comments(source, node);
    let doc: Vec<&str> = comments
        .lines()
        .filter_map(|l| l.strip_prefix("///"))
        .map(str::trim)
        .collect();
    if !doc.is_empty() {
        snippet.docstring = Some(doc.join("\n"));
    }
    if !comments.is_empty() {
        snippet.set_metadata(META_LEADING_COMMENTS, comments);
    }
    snippet
}

/// Methods of `impl Type` become children of `Type` when it is defined in this file
fn attach_impl_methods(snippets: &mut [Snippet]) {
    let types: HashMap<String, String> = snippets
        .iter()
        .filter(|s| matches!(s.kind, SnippetKind::Struct | SnippetKind::Class))
        .map(|s| (s.name.clone(), s.id.clone()))
        .collect();

    for snippet in snippets.iter_mut() {
        if snippet.parent_id.is_some() {
            continue;
        }
        if let Some(owner) = snippet
            .metadata_str(META_IMPL_TYPE)
            .and_then(|t| types.get(t))
        {
            snippet.parent_id = Some(owner.clone());
        }
    }
}

/// `Wrapper<T>` / `&mut crate::a::Thing` -> `Wrapper` / `Thing`
fn base_type_name(text: &str) -> String {
    let without_generics = text.split('<').next().unwrap_or(text);
    without_generics
        .trim_start_matches('&')
        .trim_start_matches("mut ")
        .rsplit("::")
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn collect_references(
    source: &str,
    locator: &SnippetLocator,
    types: &HashMap<&str, &str>,
    cursor: &mut TreeCursor,
    out: &mut Vec<RelationshipCandidate>,
) {
    loop {
        let node = cursor.node();
        match node.kind() {
            "call_expression" => call_reference(source, locator, node, out),
            "struct_expression" => {
                if let Some(name) = node.child_by_field_name("name") {
                    out.push(RelationshipCandidate::new(
                        locator.containing(node),
                        base_type_name(node_text(source, name)),
                        RelationKind::Instantiates,
                    ));
                }
            }
            "use_declaration" => {
                if let Some(arg) = node.child_by_field_name("argument") {
                    let path = node_text(source, arg);
                    for name in imported_names(path) {
                        out.push(
                            RelationshipCandidate::new(
                                locator.containing(node),
                                name,
                                RelationKind::Imports,
                            )
                            .meta("module", path),
                        );
                    }
                }
            }
            "impl_item" => {
                if let (Some(tr), Some(ty)) = (
                    node.child_by_field_name("trait"),
                    node.child_by_field_name("type"),
                ) {
                    let type_name = base_type_name(node_text(source, ty));
                    let owner = types.get(type_name.as_str()).map(|id| id.to_string());
                    out.push(
                        RelationshipCandidate::new(
                            owner,
                            base_type_name(node_text(source, tr)),
                            RelationKind::Inherits,
                        )
                        .meta("impl_type", type_name),
                    );
                }
            }
            "function_item" => {
                if let Some(ret) = node.child_by_field_name("return_type") {
                    out.push(RelationshipCandidate::new(
                        locator.own(node),
                        base_type_name(node_text(source, ret)),
                        RelationKind::Returns,
                    ));
                }
                attribute_references(source, locator, node, out);
            }
            "struct_item" | "enum_item" | "trait_item" => {
                attribute_references(source, locator, node, out)
            }
            "assignment_expression" | "compound_assignment_expr" => {
                if let (Some(container), Some(left)) =
                    (locator.containing(node), node.child_by_field_name("left"))
                {
                    if left.kind() == "field_expression" {
                        out.push(RelationshipCandidate::new(
                            Some(container),
                            node_text(source, left),
                            RelationKind::Modifies,
                        ));
                    }
                }
            }
            _ => {}
        }

        if cursor.goto_first_child() {
            collect_references(source, locator, types, cursor, out);
            cursor.goto_parent();
        }
        if !cursor.goto_next_sibling() {
            break;
        }
    }
}

fn call_reference(
    source: &str,
    locator: &SnippetLocator,
    node: Node,
    out: &mut Vec<RelationshipCandidate>,
) {
    let Some(function) = node.child_by_field_name("function") else {
        return;
    };
    let call_name = node_text(source, function);
    let (symbol, kind) = match function.kind() {
        "identifier" => (call_name.to_string(), RelationKind::Calls),
        "scoped_identifier" => {
            let mut segments: Vec<&str> = call_name.split("::").map(str::trim).collect();
            let last = segments.pop().unwrap_or_default();
            let owner = segments.last().copied().unwrap_or_default();
            let owner_is_type = owner.chars().next().is_some_and(|c| c.is_uppercase());
            if owner_is_type && is_constructor(last) {
                (base_type_name(owner), RelationKind::Instantiates)
            } else {
                (last.to_string(), RelationKind::Calls)
            }
        }
        "field_expression" => {
            let field = function
                .child_by_field_name("field")
                .map(|f| node_text(source, f))
                .unwrap_or_default();
            let receiver = function
                .child_by_field_name("value")
                .map(|v| node_text(source, v))
                .unwrap_or_default();
            if receiver == "self" {
                (format!("self.{}", field), RelationKind::Calls)
            } else {
                (field.to_string(), RelationKind::Calls)
            }
        }
        _ => return,
    };
    if symbol.is_empty() {
        return;
    }
    out.push(
        RelationshipCandidate::new(locator.containing(node), symbol, kind)
            .meta("call_name", call_name),
    );
}

/// Outer `#[...]` attributes directly above an item
fn attribute_references(
    source: &str,
    locator: &SnippetLocator,
    item: Node,
    out: &mut Vec<RelationshipCandidate>,
) {
    let owner = locator.own(item);
    let mut sibling = item.prev_named_sibling();
    while let Some(attr) = sibling {
        if attr.kind() != "attribute_item" {
            break;
        }
        let text = node_text(source, attr)
            .trim_start_matches("#[")
            .trim_end_matches(']');
        let name = text.split('(').next().unwrap_or_default().trim();
        if !name.is_empty() {
            out.push(RelationshipCandidate::new(
                owner.clone(),
                name,
                RelationKind::DecoratedBy,
            ));
        }
        sibling = attr.prev_named_sibling();
    }
}

fn is_constructor(name: &str) -> bool {
    name == "new" || name == "default" || name.starts_with("with_") || name.starts_with("from")
}

/// `a::b::{C, d as e}` -> `["C", "d"]`; `a::b::C` -> `["C"]`
fn imported_names(path: &str) -> Vec<String> {
    let (prefix, list) = match path.find('{') {
        Some(open) => (&path[..open], path[open + 1..].trim_end_matches('}')),
        None => path.rsplit_once("::").unwrap_or(("", path)),
    };
    let names: Vec<String> = list
        .split(',')
        .map(|part| part.split(" as ").next().unwrap_or_default().trim())
        .filter_map(|part| part.rsplit("::").next())
        .map(|s| s.trim().trim_matches(|c: char| c == '{' || c == '}').to_string())
        .filter(|s| !s.is_empty() && s != "*" && s != "self")
        .collect();
    if names.is_empty() {
        // `use a::b::*` / `use a::b::{self}`
        let module = prefix.trim_end_matches("::").rsplit("::").next().unwrap_or_default();
        if module.is_empty() {
            Vec::new()
        } else {
            vec![module.to_string()]
        }
    } else {
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"use crate::store::{Store, open as open_store};

/// A counter.
#[derive(Debug, Clone)]
pub struct Counter {
    value: u32,
}

impl Counter {
    pub fn new() -> Self {
        Counter { value: 0 }
    }

    pub fn bump(&mut self) {
        self.value += 1;
        self.log();
    }

    fn log(&self) {
        helper(self.value);
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

fn helper(v: u32) -> Store {
    let c = Counter::new();
    open_store(v)
}
"#;

    fn parsed() -> ParsedFile {
        RustSupport.parse(SOURCE, "src/counter.rs").unwrap()
    }

    fn by_name<'a>(parsed: &'a ParsedFile, name: &str) -> &'a Snippet {
        parsed.snippets.iter().find(|s| s.name == name).unwrap()
    }

    #[test]
    fn test_extracts_items_and_attaches_methods() {
        let parsed = parsed();
        let counter = by_name(&parsed, "Counter");
        let bump = by_name(&parsed, "bump");
        let helper = by_name(&parsed, "helper");

        assert_eq!(counter.kind, SnippetKind::Struct);
        assert_eq!(counter.docstring.as_deref(), Some("A counter."));
        assert_eq!(bump.kind, SnippetKind::Method);
        assert_eq!(bump.parent_id.as_deref(), Some(counter.id.as_str()));
        assert_eq!(helper.kind, SnippetKind::Function);
        assert!(helper.parent_id.is_none());
        assert_eq!(helper.signature.as_deref(), Some("fn helper(v: u32) -> Store"));
    }

    #[test]
    fn test_relationship_candidates() {
        let parsed = parsed();
        let candidates = RustSupport.extract_relationships(&parsed).unwrap();
        let counter = by_name(&parsed, "Counter").id.clone();
        let bump = by_name(&parsed, "bump").id.clone();
        let log = by_name(&parsed, "log").id.clone();
        let helper = by_name(&parsed, "helper").id.clone();

        let has = |source: Option<&str>, symbol: &str, kind: RelationKind| {
            candidates.iter().any(|c| {
                c.source_id.as_deref() == source && c.symbol == symbol && c.kind == kind
            })
        };

        assert!(has(Some(&log), "helper", RelationKind::Calls));
        assert!(has(Some(&bump), "self.log", RelationKind::Calls));
        assert!(has(Some(&bump), "self.value", RelationKind::Modifies));
        assert!(has(Some(&helper), "Counter", RelationKind::Instantiates));
        assert!(has(Some(&helper), "open_store", RelationKind::Calls));
        assert!(has(Some(&helper), "Store", RelationKind::Returns));
        assert!(has(Some(&counter), "Default", RelationKind::Inherits));
        assert!(has(Some(&counter), "derive", RelationKind::DecoratedBy));
        assert!(has(None, "Store", RelationKind::Imports));
        assert!(has(None, "open", RelationKind::Imports));
    }

    #[test]
    fn test_imported_names() {
        assert_eq!(imported_names("std::collections::HashMap"), vec!["HashMap"]);
        assert_eq!(imported_names("a::{B, c as d}"), vec!["B", "c"]);
        assert_eq!(imported_names("super::model::*"), vec!["model"]);
    }

    #[test]
    fn test_base_type_name() {
        assert_eq!(base_type_name("Wrapper<T>"), "Wrapper");
        assert_eq!(base_type_name("crate::a::Thing"), "Thing");
        assert_eq!(base_type_name("&mut Vec<u8>"), "Vec");
    }
}
