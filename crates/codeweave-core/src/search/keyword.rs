//! Lexical retrieval over the primary store

use crate::db::{Database, KeywordHit};
use crate::error::Result;
use std::collections::HashSet;

/// Common English stop words removed from natural language queries
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from",
    "has", "have", "he", "in", "is", "it", "its", "of", "on", "that",
    "the", "to", "was", "will", "with", "does", "do", "did", "can",
    "could", "should", "would", "what", "where", "when", "why", "how",
    "who", "which", "this", "these", "those", "there", "here",
];

/// Upper bound on terms in one match expression
const MAX_TERMS: usize = 32;

/// Identifier-like terms of a query, stop words removed, first occurrence kept
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .filter(|word| !STOP_WORDS.contains(&word.to_lowercase().as_str()))
        .filter(|word| seen.insert(word.to_lowercase()))
        .take(MAX_TERMS)
        .map(str::to_string)
        .collect()
}

/// FTS5 expression matching any term; `None` when nothing is left to match.
///
/// Terms are quoted, so no FTS5 operator in user input survives.
pub fn build_match_expression(query: &str) -> Option<String> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

/// Full-text hits for every query variant, deduplicated by snippet id.
///
/// Earlier variants rank first. Falls back to substring matching when the
/// full-text index finds nothing.
pub fn keyword_search(db: &Database, queries: &[&str], limit: usize) -> Result<Vec<KeywordHit>> {
    let mut seen = HashSet::new();
    let mut hits = Vec::new();

    for query in queries {
        let Some(expr) = build_match_expression(query) else {
            continue;
        };
        for hit in db.search_fts(&expr, limit)? {
            if seen.insert(hit.snippet.id.clone()) {
                hits.push(hit);
            }
        }
    }

    if hits.is_empty() {
        if let Some(original) = queries.first() {
            let mut needles = vec![original.trim().to_string()];
            let mut terms = query_terms(original);
            terms.sort_by_key(|t| std::cmp::Reverse(t.len()));
            needles.extend(terms);
            for needle in needles {
                let found = db.search_substring(&needle, limit)?;
                if !found.is_empty() {
                    tracing::debug!(needle = %needle, hits = found.len(), "substring fallback");
                    hits = found;
                    break;
                }
            }
        }
    }

    hits.truncate(limit);
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Snippet, SnippetKind};

    fn db_with(snippets: &[Snippet]) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.upsert_snippets(snippets).unwrap();
        db
    }

    #[test]
    fn test_query_terms_drop_stop_words_and_syntax() {
        assert_eq!(
            query_terms("how does the parse_config(path) work?"),
            vec!["parse_config", "path", "work"]
        );
        assert!(query_terms("the of a").is_empty());
    }

    #[test]
    fn test_match_expression_is_quoted() {
        assert_eq!(
            build_match_expression("load AND \"config\" NEAR(x)").as_deref(),
            Some("\"load\" OR \"config\" OR \"NEAR\" OR \"x\"")
        );
        assert_eq!(build_match_expression("?!"), None);
    }

    #[test]
    fn test_dedup_across_variants() {
        let foo = Snippet::new("load_config", SnippetKind::Function, "def load_config(): pass", "a.py", (0, 23), (1, 1));
        let bar = Snippet::new("save_cache", SnippetKind::Function, "def save_cache(): pass", "b.py", (0, 22), (1, 1));
        let db = db_with(&[foo.clone(), bar.clone()]);

        let hits = keyword_search(&db, &["load_config", "load_config save_cache"], 10).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.snippet.id.clone()).collect();
        assert_eq!(ids, vec![foo.id, bar.id]);
    }

    #[test]
    fn test_substring_fallback() {
        let snippet = Snippet::new("xyzzy_handler", SnippetKind::Function, "def xyzzy_handler(): pass", "a.py", (0, 25), (1, 1));
        let db = db_with(std::slice::from_ref(&snippet));
        let hits = keyword_search(&db, &["zzy_hand"], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snippet.id, snippet.id);
    }
}
