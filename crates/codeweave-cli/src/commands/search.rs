//! Search command

use super::{collaborators, open_indexed};
use crate::app::{OutputFormat, SearchArgs};
use crate::output;
use anyhow::Result;
use codeweave_core::{CodeweaveError, Config, HybridSearchEngine, SearchOptions, SearchStatus};

pub async fn run(args: SearchArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let query = args.query.join(" ");
    let indexer = open_indexed(&args.path, config)?;

    let mut engine = HybridSearchEngine::new(indexer.stores()?, config.search.clone());
    if !args.offline {
        engine = engine
            .with_embedder(collaborators::embedder(&config.llm_service))
            .with_reranker(collaborators::reranker(&config.llm_service))
            .with_orchestrator(collaborators::orchestrator(&config.llm_service));
    }

    let options = SearchOptions {
        limit: args.limit,
        use_hyde: !args.no_hyde,
        use_rerank: !args.no_rerank,
    };
    let response = engine.search_with(&query, &options).await;
    if response.status == SearchStatus::NotIndexed {
        return Err(CodeweaveError::NotIndexed(args.path.display().to_string()).into());
    }

    for warning in &response.warnings {
        eprintln!("Warning: {}", warning);
    }
    print!("{}", output::format_search_response(&response, format));
    Ok(())
}
