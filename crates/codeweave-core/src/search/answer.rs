//! Answer synthesis over hydrated search results

use super::hybrid::{SearchResponse, SearchResult, SearchStatus};
use crate::error::{Error, Result};
use crate::llm::AnswerGenerator;
use futures::stream::BoxStream;
use std::fmt::Write;

/// Code shown per snippet in the prompt
const MAX_CODE_CHARS: usize = 3000;

/// Render one result as a prompt block
pub fn render_result(index: usize, result: &SearchResult) -> String {
    let snippet = &result.snippet;
    let scope = result
        .parent
        .as_ref()
        .map(|p| p.name.as_str())
        .unwrap_or(snippet.file_path.as_str());

    let mut block = format!(
        "--- Snippet {} [{} in {} ({}) at {}:{}] ---\n",
        index, snippet.name, scope, snippet.kind, snippet.file_path, snippet.start_line
    );
    if let Some(summary) = snippet.summary.as_deref().filter(|s| !s.is_empty()) {
        let _ = writeln!(block, "Summary: {}", summary);
    }
    for relation in &result.relations {
        let target = relation.target_name.as_deref().unwrap_or(&relation.target_id);
        let _ = writeln!(block, "{} -> {}", relation.kind, target);
    }
    block.push_str("Code:\n");
    block.push_str(truncate_chars(&snippet.content, MAX_CODE_CHARS));
    block.push('\n');
    block
}

/// Prompt with every result as context, followed by the question
pub fn build_answer_prompt(question: &str, results: &[SearchResult]) -> String {
    let mut prompt = String::from("Code context:\n\n");
    for (i, result) in results.iter().enumerate() {
        prompt.push_str(&render_result(i + 1, result));
        prompt.push('\n');
    }
    let _ = write!(prompt, "Question: {}\n\nAnswer:", question);
    prompt
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn ensure_indexed(response: &SearchResponse) -> Result<()> {
    if response.status == SearchStatus::NotIndexed {
        return Err(Error::NotIndexed(
            "run `codeweave index` before asking questions".to_string(),
        ));
    }
    Ok(())
}

/// Single completion over the results of `response`
pub async fn answer(generator: &dyn AnswerGenerator, question: &str, response: &SearchResponse) -> Result<String> {
    ensure_indexed(response)?;
    generator
        .complete(&build_answer_prompt(question, &response.results))
        .await
}

/// Streamed completion as text deltas
pub async fn answer_stream(
    generator: &dyn AnswerGenerator,
    question: &str,
    response: &SearchResponse,
) -> Result<BoxStream<'static, Result<String>>> {
    ensure_indexed(response)?;
    generator
        .complete_stream(&build_answer_prompt(question, &response.results))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RelationKind, Snippet, SnippetKind};
    use crate::search::Relation;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Echo {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AnswerGenerator for Echo {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("answer".into())
        }

        async fn complete_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(futures::stream::iter(vec![Ok("ans".to_string()), Ok("wer".to_string())]).boxed())
        }
    }

    fn result() -> SearchResult {
        let class = Snippet::new("Bar", SnippetKind::Class, "class Bar: ...", "b.py", (0, 14), (1, 1));
        let mut method = Snippet::new("baz", SnippetKind::Method, "def baz(self):\n    return foo()", "b.py", (16, 45), (2, 3));
        method.summary = Some("Calls foo.".into());
        method.parent_id = Some(class.id.clone());
        SearchResult {
            snippet: method,
            parent: Some(class),
            relations: vec![Relation {
                kind: RelationKind::Calls,
                target_id: "abc".into(),
                target_name: Some("foo".into()),
            }],
            score: 1.0,
            fused_score: 0.5,
            document: String::new(),
        }
    }

    fn response(status: SearchStatus) -> SearchResponse {
        SearchResponse {
            query: "q".into(),
            effective_query: "q".into(),
            used_hyde: false,
            status,
            results: vec![result()],
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_render_result() {
        let block = render_result(1, &result());
        assert!(block.starts_with("--- Snippet 1 [baz in Bar (method) at b.py:2] ---\n"));
        assert!(block.contains("Summary: Calls foo.\n"));
        assert!(block.contains("CALLS -> foo\n"));
        assert!(block.contains("Code:\ndef baz(self):"));
    }

    #[test]
    fn test_prompt_ends_with_question() {
        let prompt = build_answer_prompt("what calls foo?", &[result()]);
        assert!(prompt.ends_with("Question: what calls foo?\n\nAnswer:"));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[tokio::test]
    async fn test_answer_and_stream() {
        let echo = Echo::default();
        let text = answer(&echo, "what calls foo?", &response(SearchStatus::Ok)).await.unwrap();
        assert_eq!(text, "answer");

        let stream = answer_stream(&echo, "q", &response(SearchStatus::Ok)).await.unwrap();
        let parts: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(parts.concat(), "answer");
        assert_eq!(echo.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_not_indexed_is_an_error() {
        let echo = Echo::default();
        let result = answer(&echo, "q", &response(SearchStatus::NotIndexed)).await;
        assert!(matches!(result, Err(Error::NotIndexed(_))));
        assert!(echo.prompts.lock().unwrap().is_empty());
    }
}
