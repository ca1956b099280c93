//! Python support via tree-sitter-python

use super::{
    extract_leading_comments, node_text, parse_tree, signature_before, LanguageSupport,
    ParsedFile, RelationshipCandidate, SnippetLocator,
};
use crate::error::Result;
use crate::model::{
    line_span, RelationKind, Snippet, SnippetKind, META_BODY_OFFSET, META_LANGUAGE,
    META_LEADING_COMMENTS, META_TS_NODE_ID,
};
use lazy_static::lazy_static;
use regex::Regex;
use tree_sitter::{Node, TreeCursor};

lazy_static! {
    static ref CONSTANT_NAME: Regex = Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("valid regex");
}

pub struct PythonSupport;

impl LanguageSupport for PythonSupport {
    fn id(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn parse(&self, source: &str, file_path: &str) -> Result<ParsedFile> {
        let tree = parse_tree(source, tree_sitter_python::LANGUAGE.into())?;
        let mut snippets = Vec::new();
        {
            let mut cursor = tree.root_node().walk();
            collect_definitions(source, file_path, &mut cursor, None, &mut snippets);
        }

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
        let mut candidates = Vec::new();
        let mut cursor = parsed.tree.root_node().walk();
        collect_references(&parsed.source, &locator, &mut cursor, &mut candidates);
        Ok(candidates)
    }
}

/// Enclosing definition while walking
struct Enclosing {
    id: String,
    kind: SnippetKind,
}

fn collect_definitions(
    source: &str,
    file_path: &str,
    cursor: &mut TreeCursor,
    parent: Option<&Enclosing>,
    out: &mut Vec<Snippet>,
) {
    if !cursor.goto_first_child() {
        return;
    }

    loop {
        let node = cursor.node();
        let definition = match node.kind() {
            "function_definition" | "class_definition" => Some(node),
            "decorated_definition" => node.child_by_field_name("definition"),
            _ => None,
        };

        match definition {
            Some(def) => {
                let snippet = build_snippet(source, file_path, node, def, parent);
                let enclosing = Enclosing {
                    id: snippet.id.clone(),
                    kind: snippet.kind,
                };
                out.push(snippet);

                if let Some(body) = def.child_by_field_name("body") {
                    let mut body_cursor = body.walk();
                    collect_definitions(source, file_path, &mut body_cursor, Some(&enclosing), out);
                }
            }
            None => collect_definitions(source, file_path, cursor, parent, out),
        }

        if !cursor.goto_next_sibling() {
            break;
        }
    }
    cursor.goto_parent();
}

/// `outer` is the decorated wrapper when present, else the definition itself
fn build_snippet(
    source: &str,
    file_path: &str,
    outer: Node,
    def: Node,
    parent: Option<&Enclosing>,
) -> Snippet {
    let name = def
        .child_by_field_name("name")
        .map(|n| node_text(source, n).to_string())
        .unwrap_or_else(|| "<anonymous>".to_string());

    let kind = match def.kind() {
        "class_definition" => SnippetKind::Class,
        _ if parent.map(|p| p.kind) == Some(SnippetKind::Class) => SnippetKind::Method,
        _ => SnippetKind::Function,
    };

    let (start, end) = (outer.start_byte(), outer.end_byte());
    let body = def.child_by_field_name("body");
    let mut snippet = Snippet::new(
        name,
        kind,
        &source[start..end],
        file_path,
        (start, end),
        line_span(source, start, end),
    );
    snippet.parent_id = parent.map(|p| p.id.clone());
    snippet.signature = Some(signature_before(
        source,
        def.start_byte(),
        body.map(|b| b.start_byte()),
    ));
    snippet.docstring = body.and_then(|b| docstring(source, b));
    snippet.set_metadata(META_TS_NODE_ID, def.id() as u64);
    snippet.set_metadata(META_LANGUAGE, "python");
    if let Some(body) = body {
        snippet.set_metadata(META_BODY_OFFSET, (body.start_byte() - start) as u64);
    }
    let comments = extract_leading_comments(source, outer);
    if !comments.is_empty() {
        snippet.set_metadata(META_LEADING_COMMENTS, comments);
    }
    snippet
}

fn docstring(source: &str, body: Node) -> Option<String> {
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let text = node_text(source, string)
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .trim_matches(|c: char| c == '"' || c == '\'')
        .trim();
    Some(text.to_string())
}

fn collect_references(
    source: &str,
    locator: &SnippetLocator,
    cursor: &mut TreeCursor,
    out: &mut Vec<RelationshipCandidate>,
) {
    loop {
        let node = cursor.node();
        match node.kind() {
            "call" => call_reference(source, locator, node, out),
            "import_statement" => import_references(source, locator, node, None, out),
            "import_from_statement" => {
                let module = node
                    .child_by_field_name("module_name")
                    .map(|m| node_text(source, m).to_string());
                import_references(source, locator, node, module, out);
            }
            "class_definition" => {
                if let Some(bases) = node.child_by_field_name("superclasses") {
                    let owner = locator.own(node);
                    let mut bc = bases.walk();
                    for base in bases.named_children(&mut bc) {
                        if matches!(base.kind(), "identifier" | "attribute") {
                            out.push(RelationshipCandidate::new(
                                owner.clone(),
                                node_text(source, base),
                                RelationKind::Inherits,
                            ));
                        }
                    }
                }
            }
            "function_definition" => {
                if let Some(ret) = node.child_by_field_name("return_type") {
                    out.push(RelationshipCandidate::new(
                        locator.own(node),
                        node_text(source, ret),
                        RelationKind::Returns,
                    ));
                }
            }
            "decorated_definition" => {
                let owner = node
                    .child_by_field_name("definition")
                    .and_then(|d| locator.own(d));
                let mut dc = node.walk();
                for decorator in node.named_children(&mut dc) {
                    if decorator.kind() != "decorator" {
                        continue;
                    }
                    let name = decorator_name(node_text(source, decorator));
                    if !name.is_empty() {
                        out.push(RelationshipCandidate::new(
                            owner.clone(),
                            name,
                            RelationKind::DecoratedBy,
                        ));
                    }
                }
            }
            "assignment" | "augmented_assignment" => {
                modification_reference(source, locator, node, out)
            }
            _ => {}
        }

        if cursor.goto_first_child() {
            collect_references(source, locator, cursor, out);
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
    if !matches!(function.kind(), "identifier" | "attribute") {
        return;
    }
    let name = node_text(source, function);
    let kind = if is_constructor_name(name) {
        RelationKind::Instantiates
    } else {
        RelationKind::Calls
    };
    out.push(RelationshipCandidate::new(locator.containing(node), name, kind).meta("call_name", name));
}

fn import_references(
    source: &str,
    locator: &SnippetLocator,
    node: Node,
    module: Option<String>,
    out: &mut Vec<RelationshipCandidate>,
) {
    let owner = locator.containing(node);
    let mut ic = node.walk();
    let mut found = false;
    for name in node.children_by_field_name("name", &mut ic) {
        let imported = match name.kind() {
            "aliased_import" => name
                .child_by_field_name("name")
                .map(|n| node_text(source, n))
                .unwrap_or_default(),
            _ => node_text(source, name),
        };
        if imported.is_empty() {
            continue;
        }
        found = true;
        let module_name = module.clone().unwrap_or_else(|| imported.to_string());
        out.push(
            RelationshipCandidate::new(owner.clone(), imported, RelationKind::Imports)
                .meta("module", module_name),
        );
    }

    // `from pkg import *`
    if !found {
        if let Some(module) = module {
            out.push(
                RelationshipCandidate::new(owner, module.clone(), RelationKind::Imports)
                    .meta("module", module),
            );
        }
    }
}

fn modification_reference(
    source: &str,
    locator: &SnippetLocator,
    node: Node,
    out: &mut Vec<RelationshipCandidate>,
) {
    let Some(container) = locator.containing(node) else {
        return;
    };
    let Some(left) = node.child_by_field_name("left") else {
        return;
    };
    let target = node_text(source, left);
    let tracked = match left.kind() {
        "attribute" => true,
        "identifier" => CONSTANT_NAME.is_match(target),
        _ => false,
    };
    if tracked {
        out.push(RelationshipCandidate::new(
            Some(container),
            target,
            RelationKind::Modifies,
        ));
    }
}

/// `Foo(...)` reads as construction, `foo(...)` and `mod.Foo(...)` as calls
fn is_constructor_name(name: &str) -> bool {
    !name.contains('.') && name.chars().next().is_some_and(|c| c.is_uppercase())
}

/// `@app.route("/x")` -> `app.route`
fn decorator_name(text: &str) -> String {
    let stripped = text.trim().trim_start_matches('@');
    stripped
        .split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
