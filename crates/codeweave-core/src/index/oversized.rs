//! Skeleton and stride split of oversized snippets

use crate::model::{
    Snippet, ELISION_MARKER, META_BODY_OFFSET, META_CHUNK_INDEX, META_LANGUAGE,
};
use std::collections::HashSet;

const BREAK_SEARCH_PERCENT: usize = 30;

/// Replace every snippet longer than `max_chars` with a skeleton.
///
/// The skeleton keeps the snippet id and its signature followed by the
/// elision marker. When no other snippet nests inside it, the elided body is
/// emitted as ordered chunk children of the skeleton.
pub fn split_oversized(snippets: Vec<Snippet>, max_chars: usize) -> Vec<Snippet> {
    if max_chars == 0 {
        return snippets;
    }
    let has_children: HashSet<String> = snippets
        .iter()
        .filter_map(|s| s.parent_id.clone())
        .collect();

    let mut out = Vec::with_capacity(snippets.len());
    for snippet in snippets {
        if snippet.is_file() || snippet.content.len() <= max_chars {
            out.push(snippet);
            continue;
        }
        let nested = has_children.contains(&snippet.id);
        out.extend(skeletonize(snippet, max_chars, !nested));
    }
    out
}

fn skeletonize(mut snippet: Snippet, max_chars: usize, with_chunks: bool) -> Vec<Snippet> {
    let body_offset = body_offset(&snippet);
    let head = match body_offset {
        Some(offset) => snippet.content[..offset].trim_end().to_string(),
        None => snippet
            .signature
            .clone()
            .unwrap_or_else(|| snippet.content.lines().next().unwrap_or_default().to_string()),
    };
    let body = snippet.content[body_offset.unwrap_or(0)..].to_string();
    let body_start = body_offset.unwrap_or(0);
    let original = std::mem::replace(&mut snippet.content, format!("{} {}", head, ELISION_MARKER));
    snippet.is_skeleton = true;

    tracing::debug!(
        snippet = %snippet.name,
        chars = original.len(),
        "skeletonized oversized snippet"
    );

    let mut out = vec![snippet];
    if !with_chunks || body.trim().is_empty() {
        return out;
    }

    let parent = &out[0];
    let base_line = parent.start_line + original[..body_start].matches('\n').count();
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut lines_before = 0;
    while start < body.len() {
        let raw_end = (start + max_chars).min(body.len());
        let mut end = find_safe_boundary(&body, start, raw_end);
        if end <= start {
            end = find_safe_boundary_forward(&body, start + 1);
        }

        let text = &body[start..end];
        let start_line = base_line + lines_before;
        let end_line = start_line + text.matches('\n').count();
        let abs_start = parent.start_byte + body_start + start;

        let mut chunk = Snippet::new(
            format!("{}[{}]", parent.name, chunks.len()),
            parent.kind,
            text,
            parent.file_path.clone(),
            (abs_start, abs_start + text.len()),
            (start_line, end_line),
        );
        chunk.parent_id = Some(parent.id.clone());
        chunk.set_metadata(META_CHUNK_INDEX, chunks.len() as u64);
        if let Some(language) = parent.metadata.get(META_LANGUAGE) {
            chunk.metadata.insert(META_LANGUAGE.to_string(), language.clone());
        }
        chunks.push(chunk);

        lines_before += text.matches('\n').count();
        start = end;
    }
    out.extend(chunks);
    out
}

fn body_offset(snippet: &Snippet) -> Option<usize> {
    let offset = snippet.metadata.get(META_BODY_OFFSET)?.as_u64()? as usize;
    (offset > 0 && offset < snippet.content.len() && snippet.content.is_char_boundary(offset))
        .then_some(offset)
}

/// Find a char boundary in `(start, index]`, preferring natural break points
fn find_safe_boundary(s: &str, start: usize, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }

    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }

    let span = i.saturating_sub(start);
    let search_start = (i - span * BREAK_SEARCH_PERCENT / 100).max(start + 1);
    if search_start >= i {
        return i;
    }

    if let Some(pos) = s[search_start..i].rfind("\n\n") {
        return search_start + pos + 2;
    }
    if let Some(pos) = s[search_start..i].rfind('\n') {
        return search_start + pos + 1;
    }
    if let Some(pos) = s[search_start..i].rfind(' ') {
        return search_start + pos + 1;
    }

    i
}

/// Find a char boundary at or after index
fn find_safe_boundary_forward(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SnippetKind;

    fn function(body_lines: usize) -> Snippet {
        let head = "def big(x):\n";
        let body: String = (0..body_lines)
            .map(|i| format!("    total = x + {}\n", i))
            .collect();
        let content = format!("{}{}", head, body);
        let mut s = Snippet::new(
            "big",
            SnippetKind::Function,
            content.clone(),
            "a.py",
            (100, 100 + content.len()),
            (10, 10 + body_lines),
        );
        s.set_metadata(META_BODY_OFFSET, head.len() as u64);
        s
    }

    #[test]
    fn test_small_snippet_unchanged() {
        let s = function(2);
        let out = split_oversized(vec![s.clone()], 10_000);
        assert_eq!(out, vec![s]);
    }

    #[test]
    fn test_oversized_becomes_skeleton_with_chunks() {
        let s = function(200);
        let original_id = s.id.clone();
        let body = s.content["def big(x):\n".len()..].to_string();

        let out = split_oversized(vec![s], 1000);
        let skeleton = &out[0];
        assert!(skeleton.is_skeleton);
        assert_eq!(skeleton.id, original_id);
        assert_eq!(skeleton.content, "def big(x): ...");

        let chunks = &out[1..];
        assert!(chunks.len() > 1);
        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, body);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index(), Some(i));
            assert_eq!(chunk.parent_id.as_deref(), Some(original_id.as_str()));
            assert_eq!(chunk.name, format!("big[{}]", i));
            assert!(chunk.content.len() <= 1000);
        }
        assert_eq!(chunks[0].start_line, 11);
        assert_eq!(chunks[0].start_byte, 100 + "def big(x):\n".len());
    }

    #[test]
    fn test_long_unbroken_run_after_many_lines() {
        let head = "def big(x):\n";
        let mut body: String = (0..260).map(|i| format!("    y = {}\n", i)).collect();
        body.push_str(&format!("    s = '{}'\n", "x".repeat(6000)));
        let content = format!("{}{}", head, body);
        let mut s = Snippet::new(
            "big",
            SnippetKind::Function,
            content.clone(),
            "a.py",
            (0, content.len()),
            (1, 262),
        );
        s.set_metadata(META_BODY_OFFSET, head.len() as u64);

        let out = split_oversized(vec![s], 1000);
        let chunks = &out[1..];
        let rebuilt: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, body);
        assert!(chunks.len() <= body.len() / 700 + 2, "{} chunks", chunks.len());
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.content.len() >= 700, "chunk of {} bytes", chunk.content.len());
            assert!(chunk.content.len() <= 1000);
        }
    }

    #[test]
    fn test_parent_with_children_gets_no_chunks() {
        let class = {
            let mut c = function(200);
            c.kind = SnippetKind::Class;
            c
        };
        let mut method = Snippet::new("m", SnippetKind::Method, "def m(self): pass", "a.py", (120, 137), (11, 11));
        method.parent_id = Some(class.id.clone());

        let out = split_oversized(vec![class, method], 1000);
        assert_eq!(out.len(), 2);
        assert!(out[0].is_skeleton);
        assert_eq!(out[1].name, "m");
    }
}
