//! One incremental indexing run over a project directory

use super::assembler::{assemble, FileSnippets, SymbolTable};
use super::change_detector::{ChangeDetector, ChangeSet, Classification};
use super::embedder::{EmbeddingPipeline, EmbeddingReport};
use super::oversized::split_oversized;
use super::persistence::{CleanupReport, PersistenceCoordinator, SaveBatch, SaveReport};
use super::resolver::{resolve, ResolveInput};
use super::scanner::{scan_files, ScanOptions};
use super::summarizer::{EmbedFilter, SchedulerOptions, SummaryReport, SummaryScheduler};
use crate::config::{Config, IndexerConfig};
use crate::db::SnippetStats;
use crate::error::{Error, Result};
use crate::graph::GraphStats;
use crate::language::{LanguageRegistry, RelationshipCandidate};
use crate::llm::{Embedder, Summarizer};
use crate::model::{Snippet, SnippetKind};
use crate::project::{IndexLock, ProjectContext, ProjectStores};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Pipeline phase reported to the progress callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexProgress {
    Scanned { files: usize, changed: usize },
    Parsed { files: usize, failed: usize },
    Resolved { snippets: usize, relationships: usize },
    Summarized { summarized: usize },
    Persisted,
}

/// A changed file that could not be parsed this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// Outcome of one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub project_id: String,
    pub files_scanned: usize,
    pub files_changed: usize,
    pub files_reused: usize,
    pub parse_failures: Vec<FileFailure>,
    pub read_failures: Vec<FileFailure>,
    pub snippets: usize,
    pub relationships: usize,
    pub summary: SummaryReport,
    pub embedding: EmbeddingReport,
    pub saved: SaveReport,
    pub cleanup: CleanupReport,
    pub duration_ms: u64,
}

/// Store health as reported by `status`
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub project_id: String,
    pub source_root: PathBuf,
    /// Languages the indexer parses
    pub languages: Vec<&'static str>,
    pub snippets: SnippetStats,
    pub graph: GraphStats,
    pub vectors: usize,
    pub fingerprinted_files: usize,
    pub fts_consistent: bool,
}

pub type ProgressCallback = Box<dyn Fn(IndexProgress) + Send + Sync>;

pub struct ProjectIndexer {
    context: ProjectContext,
    config: IndexerConfig,
    registry: Arc<LanguageRegistry>,
    summarizer: Option<Arc<dyn Summarizer>>,
    embedder: Option<Arc<dyn Embedder>>,
    stores: Option<ProjectStores>,
    progress: Option<ProgressCallback>,
}

impl ProjectIndexer {
    /// Indexer for `source_root`; storage is attached separately
    pub fn new(source_root: impl AsRef<Path>, config: &Config) -> Result<Self> {
        Ok(Self {
            context: ProjectContext::new(source_root, config)?,
            config: config.indexer.clone(),
            registry: Arc::new(LanguageRegistry::with_defaults()),
            summarizer: None,
            embedder: None,
            stores: None,
            progress: None,
        })
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_registry(mut self, registry: Arc<LanguageRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_stores(mut self, stores: ProjectStores) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Open the on-disk stores of this project
    pub fn initialize_storage(&mut self) -> Result<()> {
        self.stores = Some(ProjectStores::open(&self.context)?);
        Ok(())
    }

    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    pub fn stores(&self) -> Result<&ProjectStores> {
        self.stores.as_ref().ok_or(Error::StorageNotInitialized("indexing"))
    }

    fn report_progress(&self, event: IndexProgress) {
        if let Some(progress) = &self.progress {
            progress(event);
        }
    }

    /// Run the full pipeline once
    pub async fn run(&self) -> Result<IndexReport> {
        let stores = self.stores()?;
        let _lock = IndexLock::acquire(self.context.lock_path())?;
        let started = Instant::now();
        let root = &self.context.source_root;
        tracing::info!(root = %root.display(), project = %self.context.project_id, "indexing");

        let detector = ChangeDetector::new(&self.registry, ScanOptions::from(&self.config));
        let mut changes = detector.detect(root, &stores.db)?;
        let mut report = IndexReport {
            project_id: self.context.project_id.clone(),
            files_scanned: changes.files.len(),
            read_failures: changes
                .read_failures
                .iter()
                .map(|(file, error)| FileFailure {
                    file: file.clone(),
                    error: error.clone(),
                })
                .collect(),
            ..Default::default()
        };
        self.report_progress(IndexProgress::Scanned {
            files: changes.files.len(),
            changed: changes.changed_files.len(),
        });

        let (parsed, candidates) = self.parse_changed(&mut changes, stores, &mut report)?;
        report.files_changed = changes.changed_files.len();
        report.files_reused = changes.reused_count();
        self.report_progress(IndexProgress::Parsed {
            files: parsed.len(),
            failed: report.parse_failures.len(),
        });

        let inputs = self.assembly_inputs(&mut changes, parsed);
        let assembly = assemble(inputs);
        let symbols = SymbolTable::build(&assembly.snippets);
        let relationships = resolve(ResolveInput {
            snippets: &assembly.snippets,
            candidates: &candidates,
            symbols: &symbols,
            changed_files: &changes.changed_files,
            file_nodes: &assembly.file_nodes,
            dirty: &assembly.dirty,
        });
        report.snippets = assembly.snippets.len();
        report.relationships = relationships.len();
        self.report_progress(IndexProgress::Resolved {
            snippets: report.snippets,
            relationships: report.relationships,
        });

        let missing_vectors = match &self.embedder {
            Some(_) => self.missing_vectors(&assembly.snippets, &changes.changed_files, stores)?,
            None => HashSet::new(),
        };
        let pipeline = self.embedder.clone().map(|embedder| {
            EmbeddingPipeline::spawn(
                embedder,
                self.config.embed_batch_size,
                self.config.embed_queue_capacity,
            )
        });
        let sink = pipeline.as_ref().map(EmbeddingPipeline::sender);

        let scheduler = SummaryScheduler::new(self.summarizer.clone(), SchedulerOptions::from(&self.config));
        let (snippets, summary) = scheduler
            .run(
                assembly.snippets,
                EmbedFilter {
                    changed_files: &changes.changed_files,
                    missing_vectors: &missing_vectors,
                    sink: sink.as_ref(),
                },
            )
            .await;
        drop(sink);
        self.report_progress(IndexProgress::Summarized {
            summarized: summary.summarized,
        });

        let embeddings = match pipeline {
            Some(pipeline) => {
                let (vectors, embedding) = pipeline.finish().await?;
                report.embedding = embedding;
                vectors
            }
            None => HashMap::new(),
        };

        let mut dirty = assembly.dirty;
        dirty.extend(summary.updated.iter().cloned());
        report.summary = summary;

        let persistence = PersistenceCoordinator::with_stores(stores);
        report.saved = persistence.save(SaveBatch {
            snippets: &snippets,
            relationships: &relationships,
            embeddings: &embeddings,
            changed_files: &changes.changed_files,
            dirty: &dirty,
            fingerprints: &changes.fresh_hashes,
        })?;
        report.cleanup = persistence.cleanup(&changes.encountered())?;
        self.report_progress(IndexProgress::Persisted);

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            changed = report.files_changed,
            reused = report.files_reused,
            failed = report.parse_failures.len(),
            summarized = report.summary.summarized,
            ms = report.duration_ms,
            "indexing complete"
        );
        Ok(report)
    }

    /// Parse every changed file; a failure reverts the file to its persisted state
    #[allow(clippy::type_complexity)]
    fn parse_changed(
        &self,
        changes: &mut ChangeSet,
        stores: &ProjectStores,
        report: &mut IndexReport,
    ) -> Result<(HashMap<String, Vec<Snippet>>, HashMap<String, Vec<RelationshipCandidate>>)> {
        let targets: Vec<(String, PathBuf, Option<String>)> = changes
            .files
            .iter()
            .filter(|f| f.classification == Classification::Reparse)
            .map(|f| (f.relative_path.clone(), f.path.clone(), f.source.clone()))
            .collect();

        let mut parsed = HashMap::new();
        let mut candidates = HashMap::new();
        for (relative, path, source) in targets {
            match self.parse_file(&relative, &path, source.as_deref()) {
                Ok((snippets, found)) => {
                    parsed.insert(relative.clone(), split_oversized(snippets, self.config.max_snippet_chars));
                    candidates.insert(relative, found);
                }
                Err(e) => {
                    tracing::warn!(file = %relative, "skipping file: {}", e);
                    report.parse_failures.push(FileFailure {
                        file: relative.clone(),
                        error: e.to_string(),
                    });
                    let persisted = stores.db.get_snippets_by_file(&relative)?;
                    changes.revert(&relative, persisted);
                }
            }
        }
        Ok((parsed, candidates))
    }

    fn parse_file(
        &self,
        relative: &str,
        path: &Path,
        source: Option<&str>,
    ) -> Result<(Vec<Snippet>, Vec<RelationshipCandidate>)> {
        let support = self
            .registry
            .for_path(path)
            .ok_or_else(|| Error::UnsupportedLanguage(relative.to_string()))?;
        let source = source.ok_or_else(|| Error::Parse(format!("{} is not valid UTF-8", relative)))?;
        let parsed = support.parse(source, relative)?;
        let candidates = support.extract_relationships(&parsed)?;
        Ok((parsed.snippets, candidates))
    }

    fn assembly_inputs(
        &self,
        changes: &mut ChangeSet,
        mut parsed: HashMap<String, Vec<Snippet>>,
    ) -> Vec<FileSnippets> {
        let changed_files = &changes.changed_files;
        changes
            .files
            .iter_mut()
            .map(|state| {
                let changed = changed_files.contains(&state.relative_path);
                let snippets = match &mut state.classification {
                    Classification::Reuse(snippets) => std::mem::take(snippets),
                    Classification::Reparse => parsed.remove(&state.relative_path).unwrap_or_default(),
                };
                FileSnippets {
                    file_path: state.relative_path.clone(),
                    snippets,
                    source: state.source.take(),
                    changed,
                }
            })
            .collect()
    }

    /// Reused snippets that have no stored vector yet
    fn missing_vectors(
        &self,
        snippets: &[Snippet],
        changed_files: &BTreeSet<String>,
        stores: &ProjectStores,
    ) -> Result<HashSet<String>> {
        let reused: Vec<String> = snippets
            .iter()
            .filter(|s| !changed_files.contains(&s.file_path) && s.kind != SnippetKind::Placeholder)
            .map(|s| s.id.clone())
            .collect();
        if reused.is_empty() {
            return Ok(HashSet::new());
        }
        let existing = stores.vectors.existing_ids(&reused)?;
        Ok(reused.into_iter().filter(|id| !existing.contains(id)).collect())
    }

    /// Remove stored files that no longer exist, without re-indexing
    pub fn cleanup(&self) -> Result<CleanupReport> {
        let stores = self.stores()?;
        let _lock = IndexLock::acquire(self.context.lock_path())?;
        let encountered: BTreeSet<String> = scan_files(&self.context.source_root, &ScanOptions::from(&self.config))?
            .into_iter()
            .filter(|entry| self.registry.is_supported(&entry.path))
            .map(|entry| entry.relative_path)
            .collect();
        PersistenceCoordinator::with_stores(stores).cleanup(&encountered)
    }

    /// Counts and consistency of every store
    pub fn verify(&self) -> Result<VerifyReport> {
        let stores = self.stores()?;
        Ok(VerifyReport {
            project_id: self.context.project_id.clone(),
            source_root: self.context.source_root.clone(),
            languages: self.registry.language_ids(),
            snippets: stores.db.snippet_stats()?,
            graph: stores.graph.stats()?,
            vectors: stores.vectors.count()?,
            fingerprinted_files: stores.db.get_all_fingerprints()?.len(),
            fts_consistent: stores.db.check_fts_integrity()?,
        })
    }

    /// Remove a lock left by a crashed run
    pub fn force_unlock(&self) -> Result<bool> {
        let removed = IndexLock::force_release(&self.context.lock_path())?;
        if removed {
            tracing::warn!(lock = %self.context.lock_path().display(), "removed stale index lock");
        }
        Ok(removed)
    }
}
