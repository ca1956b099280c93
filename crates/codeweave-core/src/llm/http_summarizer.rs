//! HTTP-based batch summarizer using external LLM service

use super::client::extract_json;
use super::{ChatMessage, ChildContext, LLMClient, Summarizer};
use crate::config::LLMServiceConfig;
use crate::error::{Error, Result};
use crate::model::{Snippet, META_PARENT_SUMMARY};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Write;
use std::sync::Arc;

/// Characters of code shown per snippet in the prompt
const MAX_PROMPT_CODE_CHARS: usize = 4000;

/// Summarizer using external HTTP LLM service
pub struct HttpSummarizer {
    client: Arc<dyn LLMClient>,
}

impl HttpSummarizer {
    /// Create from LLM client
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }

    /// Create from configuration
    pub fn from_config(config: LLMServiceConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(super::VLLMClient::new(config)?)))
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Arc::new(super::VLLMClient::from_env()?)))
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize_batch(&self, batch: &mut [Snippet], child_context: &ChildContext) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let messages = vec![
            ChatMessage::system(
                "You summarize source code for a search index. For each numbered snippet write \
                 at most three sentences describing what it does and why it exists. \
                 Output ONLY JSON: {\"summaries\": [\"...\", ...]} in snippet order.",
            ),
            ChatMessage::user(build_summary_prompt(batch, child_context)),
        ];

        let response = self.client.chat_completion(messages).await?;
        let summaries = parse_summary_response(&response, batch.len())?;
        for (snippet, summary) in batch.iter_mut().zip(summaries) {
            snippet.summary = Some(summary);
        }
        Ok(())
    }

    fn model_name(&self) -> &str {
        self.client.model_name()
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn build_summary_prompt(batch: &[Snippet], child_context: &ChildContext) -> String {
    let mut prompt = String::new();
    for (i, snippet) in batch.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "### Snippet {} ({} `{}` in {})",
            i, snippet.kind, snippet.name, snippet.file_path
        );
        if let Some(parent) = snippet.metadata_str(META_PARENT_SUMMARY) {
            let _ = writeln!(prompt, "Enclosing scope: {}", parent);
        }
        if let Some(doc) = snippet.docstring.as_deref() {
            let _ = writeln!(prompt, "Docstring: {}", doc);
        }
        if let Some(children) = child_context.get(&snippet.id) {
            if !children.is_empty() {
                let _ = writeln!(prompt, "Contains:");
                for child in children {
                    let _ = writeln!(prompt, "- {}", child);
                }
            }
        }
        let _ = writeln!(
            prompt,
            "```\n{}\n```\n",
            truncate_chars(&snippet.content, MAX_PROMPT_CODE_CHARS)
        );
    }
    let _ = write!(prompt, "Return exactly {} summaries.", batch.len());
    prompt
}

fn parse_summary_response(response: &str, expected: usize) -> Result<Vec<String>> {
    #[derive(Deserialize)]
    struct SummaryResponse {
        summaries: Vec<String>,
    }

    let json = extract_json(response)
        .ok_or_else(|| Error::Llm("summary response contained no JSON".to_string()))?;
    let parsed: SummaryResponse = serde_json::from_str(json)
        .map_err(|e| Error::Llm(format!("Failed to parse summary JSON: {}", e)))?;

    if parsed.summaries.len() != expected {
        return Err(Error::Llm(format!(
            "expected {} summaries, got {}",
            expected,
            parsed.summaries.len()
        )));
    }
    Ok(parsed
        .summaries
        .into_iter()
        .map(|s| s.trim().to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SnippetKind;

    #[test]
    fn test_parse_summary_response() {
        let parsed =
            parse_summary_response("```json\n{\"summaries\": [\" a \", \"b\"]}\n```", 2).unwrap();
        assert_eq!(parsed, vec!["a", "b"]);
        assert!(parse_summary_response("{\"summaries\": [\"a\"]}", 2).is_err());
        assert!(parse_summary_response("sorry", 1).is_err());
    }

    #[test]
    fn test_prompt_includes_child_and_parent_context() {
        let mut s = Snippet::new("Bar", SnippetKind::Class, "class Bar: ...", "b.py", (0, 14), (1, 1));
        s.set_metadata(META_PARENT_SUMMARY, "Billing helpers.");
        let mut ctx = ChildContext::new();
        ctx.insert(s.id.clone(), vec!["baz: returns foo()".to_string()]);

        let prompt = build_summary_prompt(std::slice::from_ref(&s), &ctx);
        assert!(prompt.contains("Enclosing scope: Billing helpers."));
        assert!(prompt.contains("- baz: returns foo()"));
        assert!(prompt.contains("Return exactly 1 summaries."));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
