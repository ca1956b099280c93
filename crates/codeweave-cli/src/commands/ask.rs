//! Ask command

use super::{collaborators, open_indexed};
use crate::app::{AskArgs, OutputFormat};
use crate::output;
use anyhow::Result;
use codeweave_core::search::{answer, answer_stream};
use codeweave_core::{Config, HybridSearchEngine, SearchOptions};
use futures::StreamExt;
use std::io::{self, Write};

pub async fn run(args: AskArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let question = args.question.join(" ");
    let indexer = open_indexed(&args.path, config)?;
    let llm = &config.llm_service;

    let engine = HybridSearchEngine::new(indexer.stores()?, config.search.clone())
        .with_embedder(collaborators::embedder(llm))
        .with_reranker(collaborators::reranker(llm))
        .with_orchestrator(collaborators::orchestrator(llm));
    let options = SearchOptions {
        limit: args.limit,
        ..SearchOptions::default()
    };
    let response = engine.search_with(&question, &options).await;
    for warning in &response.warnings {
        eprintln!("Warning: {}", warning);
    }

    let generator = collaborators::answer_generator(llm);

    if args.stream && format == OutputFormat::Cli {
        let mut deltas = answer_stream(generator.as_ref(), &question, &response).await?;
        let mut stdout = io::stdout();
        while let Some(delta) = deltas.next().await {
            write!(stdout, "{}", delta?)?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
        print!("{}", output::format_sources(&response.results));
        return Ok(());
    }

    let text = answer(generator.as_ref(), &question, &response).await?;
    print!("{}", output::format_answer(&question, &text, &response.results, format));
    Ok(())
}
