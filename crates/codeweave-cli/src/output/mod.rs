//! Output formatters

pub mod json;
pub mod terminal;

use crate::app::OutputFormat;
use codeweave_core::index::CleanupReport;
use codeweave_core::{IndexReport, SearchResponse, SearchResult, VerifyReport};

pub fn format_index_report(report: &IndexReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_json(report),
        OutputFormat::Cli => terminal::format_index_report(report),
    }
}

pub fn format_search_response(response: &SearchResponse, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_json(response),
        OutputFormat::Cli => terminal::format_results(&response.results),
    }
}

pub fn format_answer(
    question: &str,
    answer: &str,
    results: &[SearchResult],
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Json => json::format_answer(question, answer, results),
        OutputFormat::Cli => format!("{}\n\n{}", answer.trim_end(), format_sources(results)),
    }
}

pub fn format_sources(results: &[SearchResult]) -> String {
    terminal::format_sources(results)
}

pub fn format_verify_report(report: &VerifyReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_json(report),
        OutputFormat::Cli => terminal::format_verify_report(report),
    }
}

pub fn format_cleanup_report(report: &CleanupReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_json(report),
        OutputFormat::Cli => terminal::format_cleanup_report(report),
    }
}
