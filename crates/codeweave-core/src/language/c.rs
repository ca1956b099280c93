//! C support via tree-sitter-c

use super::{
    extract_leading_comments, node_text, parse_tree, signature_before, LanguageSupport,
    ParsedFile, RelationshipCandidate, SnippetLocator,
};
use crate::error::Result;
use crate::model::{
    line_span, RelationKind, Snippet, SnippetKind, META_BODY_OFFSET, META_LANGUAGE,
    META_LEADING_COMMENTS, META_TS_NODE_ID,
};
use tree_sitter::{Node, TreeCursor};

pub struct CSupport;

impl LanguageSupport for CSupport {
    fn id(&self) -> &'static str {
        "c"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["c", "h"]
    }

    fn parse(&self, source: &str, file_path: &str) -> Result<ParsedFile> {
        let tree = parse_tree(source, tree_sitter_c::LANGUAGE.into())?;
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

/// Functions are leaves; struct and enum bodies may nest further type definitions
fn collect_definitions(
    source: &str,
    file_path: &str,
    cursor: &mut TreeCursor,
    parent: Option<&str>,
    out: &mut Vec<Snippet>,
) {
    if !cursor.goto_first_child() {
        return;
    }

    loop {
        let node = cursor.node();
        match node.kind() {
            "function_definition" => {
                let name = node
                    .child_by_field_name("declarator")
                    .and_then(|d| declared_name(source, d));
                out.push(build_snippet(source, file_path, node, name, SnippetKind::Function, parent));
            }
            "struct_specifier" | "enum_specifier" if node.child_by_field_name("body").is_some() => {
                let snippet = build_snippet(
                    source,
                    file_path,
                    node,
                    type_name(source, node),
                    SnippetKind::Struct,
                    parent,
                );
                let id = snippet.id.clone();
                out.push(snippet);
                if let Some(body) = node.child_by_field_name("body") {
                    let mut body_cursor = body.walk();
                    collect_definitions(source, file_path, &mut body_cursor, Some(&id), out);
                }
            }
            _ => collect_definitions(source, file_path, cursor, parent, out),
        }

        if !cursor.goto_next_sibling() {
            break;
        }
    }
    cursor.goto_parent();
}

/// Innermost identifier of a (possibly pointer or parenthesized) declarator
fn declared_name(source: &str, mut node: Node) -> Option<String> {
    loop {
        match node.kind() {
            "identifier" | "field_identifier" | "type_identifier" => {
                return Some(node_text(source, node).to_string())
            }
            _ => {
                node = node
                    .child_by_field_name("declarator")
                    .or_else(|| node.named_child(0))?
            }
        }
    }
}

/// `struct point {..}` -> `point`; `typedef struct {..} Counter;` -> `Counter`
fn type_name(source: &str, node: Node) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return Some(node_text(source, name).to_string());
    }
    let parent = node.parent()?;
    if parent.kind() != "type_definition" {
        return None;
    }
    declared_name(source, parent.child_by_field_name("declarator")?)
}

fn build_snippet(
    source: &str,
    file_path: &str,
    node: Node,
    name: Option<String>,
    kind: SnippetKind,
    parent: Option<&str>,
) -> Snippet {
    let (start, end) = (node.start_byte(), node.end_byte());
    let body = node.child_by_field_name("body");
    let mut snippet = Snippet::new(
        name.unwrap_or_else(|| "<anonymous>".to_string()),
        kind,
        &source[start..end],
        file_path,
        (start, end),
        line_span(source, start, end),
    );
    snippet.parent_id = parent.map(str::to_string);
    snippet.signature = Some(signature_before(source, start, body.map(|b| b.start_byte())));
    snippet.set_metadata(META_TS_NODE_ID, node.id() as u64);
    snippet.set_metadata(META_LANGUAGE, "c");
    if let Some(body) = body {
        snippet.set_metadata(META_BODY_OFFSET, (body.start_byte() - start) as u64);
    }

    let comments = extract_leading_comments(source, node);
    let doc: Vec<&str> = comments
        .lines()
        .map(|l| {
            l.trim()
                .trim_start_matches("//")
                .trim_start_matches("/*")
                .trim_end_matches("*/")
                .trim_start_matches('*')
                .trim()
        })
        .filter(|l| !l.is_empty())
        .collect();
    if !doc.is_empty() {
        snippet.docstring = Some(doc.join("\n"));
    }
    if !comments.is_empty() {
        snippet.set_metadata(META_LEADING_COMMENTS, comments);
    }
    snippet
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
            "preproc_include" => {
                if let Some(path) = node.child_by_field_name("path") {
                    let raw = node_text(source, path);
                    let header = raw.trim_matches(|c: char| c == '"' || c == '<' || c == '>');
                    if !header.is_empty() {
                        out.push(
                            RelationshipCandidate::new(
                                locator.containing(node),
                                header,
                                RelationKind::Imports,
                            )
                            .meta("module", raw),
                        );
                    }
                }
            }
            "call_expression" => call_reference(source, locator, node, out),
            "assignment_expression" => {
                if let (Some(container), Some(left)) =
                    (locator.containing(node), node.child_by_field_name("left"))
                {
                    let target = node_text(source, left);
                    let tracked = match left.kind() {
                        "field_expression" => true,
                        "identifier" => is_constant_name(target),
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
    let call_name = node_text(source, function);
    // `ops->run(x)` resolves by the field name
    let symbol = match function.kind() {
        "identifier" => call_name,
        "field_expression" => function
            .child_by_field_name("field")
            .map(|f| node_text(source, f))
            .unwrap_or_default(),
        _ => return,
    };
    if symbol.is_empty() {
        return;
    }
    out.push(
        RelationshipCandidate::new(locator.containing(node), symbol, RelationKind::Calls)
            .meta("call_name", call_name),
    );
}

fn is_constant_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
