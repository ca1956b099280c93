//! Terminal output formatter

use codeweave_core::index::CleanupReport;
use codeweave_core::{IndexReport, SearchResult, VerifyReport};
use std::fmt::Write;

/// Lines of code shown under each result
const PREVIEW_LINES: usize = 5;

pub fn format_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results\n".to_string();
    }

    let mut output = String::new();
    for (i, result) in results.iter().enumerate() {
        let snippet = &result.snippet;
        let _ = writeln!(
            output,
            "{:>2}. {:.4} {} ({}) {}:{}-{}",
            i + 1,
            result.score,
            snippet.name,
            snippet.kind,
            snippet.file_path,
            snippet.start_line,
            snippet.end_line
        );
        if let Some(parent) = &result.parent {
            let _ = writeln!(output, "    in {} ({})", parent.name, parent.kind);
        }
        if let Some(summary) = snippet.summary.as_deref().filter(|s| !s.is_empty()) {
            let _ = writeln!(output, "    {}", summary);
        }
        for relation in &result.relations {
            let target = relation.target_name.as_deref().unwrap_or(&relation.target_id);
            let _ = writeln!(output, "    {} -> {}", relation.kind, target);
        }
        let lines: Vec<&str> = snippet.content.lines().take(PREVIEW_LINES).collect();
        for line in &lines {
            let _ = writeln!(output, "      | {}", line);
        }
        if snippet.content.lines().count() > PREVIEW_LINES {
            output.push_str("      | ...\n");
        }
        output.push('\n');
    }
    output
}

pub fn format_sources(results: &[SearchResult]) -> String {
    let mut output = String::from("Sources:\n");
    for result in results {
        let snippet = &result.snippet;
        let _ = writeln!(
            output,
            "  {} {}:{}-{}",
            snippet.name, snippet.file_path, snippet.start_line, snippet.end_line
        );
    }
    output
}

pub fn format_index_report(report: &IndexReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Project:         {}", report.project_id);
    let _ = writeln!(
        output,
        "Files:           {} scanned, {} changed, {} reused",
        report.files_scanned, report.files_changed, report.files_reused
    );
    let _ = writeln!(output, "Snippets:        {}", report.snippets);
    let _ = writeln!(output, "Relationships:   {}", report.relationships);
    let _ = writeln!(
        output,
        "Summaries:       {} new, {} pending",
        report.summary.summarized, report.summary.unsummarized
    );
    let _ = writeln!(
        output,
        "Embeddings:      {} new, {} failed",
        report.embedding.embedded, report.embedding.failed
    );
    if !report.cleanup.files_removed.is_empty() {
        let _ = writeln!(
            output,
            "Removed files:   {}",
            report.cleanup.files_removed.len()
        );
    }
    for failure in report.parse_failures.iter().chain(&report.read_failures) {
        let _ = writeln!(output, "  skipped {}: {}", failure.file, failure.error);
    }
    if !report.summary.cyclic.is_empty() {
        let _ = writeln!(
            output,
            "  {} snippets in a parent cycle were not summarized",
            report.summary.cyclic.len()
        );
    }
    let _ = writeln!(output, "Done in {} ms", report.duration_ms);
    output
}

pub fn format_verify_report(report: &VerifyReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Project:         {}", report.project_id);
    let _ = writeln!(output, "Source root:     {}", report.source_root.display());
    let _ = writeln!(output, "Languages:       {}", report.languages.join(", "));
    let _ = writeln!(output, "Files:           {}", report.fingerprinted_files);
    let _ = writeln!(output);
    let _ = writeln!(output, "Snippets:        {}", report.snippets.total);
    for (kind, count) in &report.snippets.by_kind {
        let _ = writeln!(output, "  {:<14} {}", kind, count);
    }
    let _ = writeln!(output, "  unsummarized   {}", report.snippets.unsummarized);
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Graph:           {} nodes ({} external), {} edges",
        report.graph.nodes, report.graph.placeholder_nodes, report.graph.edges
    );
    let _ = writeln!(output, "Vectors:         {}", report.vectors);
    let _ = writeln!(
        output,
        "Full-text index: {}",
        if report.fts_consistent { "ok" } else { "out of sync" }
    );
    output
}

pub fn format_cleanup_report(report: &CleanupReport) -> String {
    if report.files_removed.is_empty() {
        return "Nothing to clean up\n".to_string();
    }
    let mut output = String::new();
    for file in &report.files_removed {
        let _ = writeln!(output, "Removed {}", file);
    }
    let _ = writeln!(
        output,
        "{} snippets, {} graph nodes, {} vectors",
        report.snippets_removed, report.nodes_removed, report.vectors_removed
    );
    output
}
