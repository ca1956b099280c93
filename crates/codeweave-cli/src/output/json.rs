//! JSON output formatter

use codeweave_core::SearchResult;
use serde::Serialize;

pub fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string()) + "\n"
}

pub fn format_answer(question: &str, answer: &str, results: &[SearchResult]) -> String {
    let sources: Vec<serde_json::Value> = results
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.snippet.id,
                "name": r.snippet.name,
                "file": r.snippet.file_path,
                "start_line": r.snippet.start_line,
                "end_line": r.snippet.end_line,
                "score": r.score,
            })
        })
        .collect();

    to_json(&serde_json::json!({
        "question": question,
        "answer": answer,
        "sources": sources,
    }))
}
