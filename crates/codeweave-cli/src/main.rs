//! Codeweave CLI
//!
//! Index a source tree into a code knowledge graph and search it.

use anyhow::Result;
use clap::Parser;
use codeweave_core::error::exit_codes;
use codeweave_core::{CodeweaveError, Config};
use std::process::ExitCode;

mod app;
mod commands;
mod output;
mod progress;

use app::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<CodeweaveError>()
                .map(CodeweaveError::exit_code)
                .unwrap_or(exit_codes::GENERAL_ERROR);
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Index(args) => commands::index::run(args, &config, cli.format).await,
        Commands::Search(args) => commands::search::run(args, &config, cli.format).await,
        Commands::Ask(args) => commands::ask::run(args, &config, cli.format).await,
        Commands::Status(args) => commands::status::run(args, &config, cli.format),
        Commands::Cleanup(args) => commands::cleanup::run(args, &config, cli.format),
    }
}
