//! Index command

use super::collaborators;
use crate::app::{IndexArgs, OutputFormat};
use crate::output;
use crate::progress::ProgressReporter;
use anyhow::Result;
use codeweave_core::{Config, ProjectIndexer};

pub async fn run(args: IndexArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let mut indexer = ProjectIndexer::new(&args.path, config)?;
    if !args.offline {
        indexer = indexer
            .with_summarizer(collaborators::summarizer(&config.llm_service))
            .with_embedder(collaborators::embedder(&config.llm_service));
    }
    if format == OutputFormat::Cli {
        indexer = indexer.with_progress(ProgressReporter::callback());
    }
    indexer.initialize_storage()?;

    if args.force_unlock && indexer.force_unlock()? {
        eprintln!("Removed stale index lock");
    }

    let report = indexer.run().await?;
    print!("{}", output::format_index_report(&report, format));
    Ok(())
}
