//! Incremental indexing pipeline
//!
//! Scan and fingerprint, parse what changed, assemble the snippet graph,
//! resolve relationships, summarize bottom-up while embedding in the
//! background, then persist.

mod assembler;
mod change_detector;
mod embedder;
mod indexer;
mod oversized;
mod persistence;
mod resolver;
mod scanner;
mod summarizer;

pub use assembler::{assemble, synthesize_file_node, Assembly, FileSnippets, SymbolTable};
pub use change_detector::{fingerprint_bytes, ChangeDetector, ChangeSet, Classification, FileState};
pub use embedder::{EmbeddingPipeline, EmbeddingReport, EmbeddingSender};
pub use indexer::{
    FileFailure, IndexProgress, IndexReport, ProgressCallback, ProjectIndexer, VerifyReport,
};
pub use oversized::split_oversized;
pub use persistence::{CleanupReport, PersistenceCoordinator, SaveBatch, SaveReport};
pub use resolver::{resolve, resolve_symbol, ResolveInput};
pub use scanner::{relative_path, scan_files, ScanOptions, ScanResult};
pub use summarizer::{EmbedFilter, SchedulerOptions, SummaryReport, SummaryScheduler};
