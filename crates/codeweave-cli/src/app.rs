//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codeweave")]
#[command(
    author,
    version,
    about = "Incremental code knowledge graph with hybrid search"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true, env = "CODEWEAVE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one incremental indexing pass
    Index(IndexArgs),

    /// Hybrid search over an indexed project
    Search(SearchArgs),

    /// Answer a question from search results
    Ask(AskArgs),

    /// Show store counts and consistency
    Status(ProjectArgs),

    /// Remove stored data of files no longer on disk
    Cleanup(ProjectArgs),
}

#[derive(Args)]
pub struct ProjectArgs {
    /// Project source root
    pub path: PathBuf,
}

#[derive(Args)]
pub struct IndexArgs {
    /// Project source root
    pub path: PathBuf,

    /// Skip summaries and embeddings; build the structural graph only
    #[arg(long)]
    pub offline: bool,

    /// Remove a lock left behind by a crashed run first
    #[arg(long)]
    pub force_unlock: bool,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Project source root
    pub path: PathBuf,

    /// Search query
    #[arg(required = true)]
    pub query: Vec<String>,

    /// Number of results
    #[arg(short = 'n', default_value = "10")]
    pub limit: usize,

    /// Skip hypothetical-document query expansion
    #[arg(long)]
    pub no_hyde: bool,

    /// Keep fused order instead of reranking
    #[arg(long)]
    pub no_rerank: bool,

    /// Full-text retrieval only, without any model service
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args)]
pub struct AskArgs {
    /// Project source root
    pub path: PathBuf,

    /// Question about the code
    #[arg(required = true)]
    pub question: Vec<String>,

    /// Number of snippets given to the model
    #[arg(short = 'n', default_value = "8")]
    pub limit: usize,

    /// Print the answer as it is generated
    #[arg(long)]
    pub stream: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
}
