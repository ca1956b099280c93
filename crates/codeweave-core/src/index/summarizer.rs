//! Bottom-up hierarchical summarization
//!
//! Snippets form a forest through `parent_id`. A node becomes ready once all
//! of its children are done, so a parent's summary request always carries the
//! finished summaries of its children. Nodes are stored in an arena indexed by
//! position; parent and child links are indices, never references.
//!
//! The coordinator loop owns the arena. Model calls run as concurrent futures
//! on cloned batches and their results are merged back when they complete, so
//! no lock is held across a call.

use super::embedder::EmbeddingSender;
use crate::config::IndexerConfig;
use crate::error::Result;
use crate::llm::{ChildContext, Summarizer};
use crate::model::{Snippet, META_PARENT_SUMMARY};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    Ready,
    InFlight,
    Done,
}

struct Node {
    snippet: Snippet,
    parent: Option<usize>,
    children: Vec<usize>,
    /// Children not yet done
    pending: usize,
    needs_summary: bool,
    state: NodeState,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    pub batch_size: usize,
    pub max_concurrent: usize,
    /// Levels below each root that receive their parent's summary as context
    pub context_depth: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from(&IndexerConfig::default())
    }
}

impl From<&IndexerConfig> for SchedulerOptions {
    fn from(config: &IndexerConfig) -> Self {
        Self {
            batch_size: config.summary_batch_size.max(1),
            max_concurrent: config.max_concurrent_batches.max(1),
            context_depth: config.context_depth,
        }
    }
}

/// What one scheduling pass did
#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryReport {
    /// Snippets that received a new summary
    pub summarized: usize,
    pub failed_batches: usize,
    /// Snippets that needed a summary and still have none
    pub unsummarized: usize,
    /// Members of parent cycles, left pending
    pub cyclic: Vec<String>,
    pub model_calls: usize,
    /// Snippets whose summary or parent context changed in this pass
    #[serde(skip)]
    pub updated: HashSet<String>,
}

/// Which completed snippets go to the embedding queue
pub struct EmbedFilter<'a> {
    pub changed_files: &'a BTreeSet<String>,
    /// Snippets of unchanged files with no stored vector
    pub missing_vectors: &'a HashSet<String>,
    pub sink: Option<&'a EmbeddingSender>,
}

type BatchOutcome = (Vec<usize>, Vec<Snippet>, Result<()>);

pub struct SummaryScheduler {
    summarizer: Option<Arc<dyn Summarizer>>,
    options: SchedulerOptions,
}

impl SummaryScheduler {
    pub fn new(summarizer: Option<Arc<dyn Summarizer>>, options: SchedulerOptions) -> Self {
        Self {
            summarizer,
            options,
        }
    }

    /// Summarize what needs it, leaves first, and return the snippets in input order
    pub async fn run(
        &self,
        snippets: Vec<Snippet>,
        embed: EmbedFilter<'_>,
    ) -> (Vec<Snippet>, SummaryReport) {
        let mut report = SummaryReport::default();
        let mut nodes = build_arena(snippets, embed.changed_files);

        let mut ready: VecDeque<usize> = VecDeque::new();
        for (idx, node) in nodes.iter_mut().enumerate() {
            if node.pending == 0 {
                node.state = NodeState::Ready;
                ready.push_back(idx);
            }
        }

        let mut filling: Vec<usize> = Vec::new();
        let mut queued: VecDeque<Vec<usize>> = VecDeque::new();
        let mut in_flight: FuturesUnordered<BoxFuture<'static, BatchOutcome>> = FuturesUnordered::new();

        loop {
            while let Some(idx) = ready.pop_front() {
                let summarize = self.summarizer.is_some() && nodes[idx].needs_summary;
                if summarize {
                    nodes[idx].state = NodeState::InFlight;
                    filling.push(idx);
                    if filling.len() >= self.options.batch_size {
                        queued.push_back(std::mem::take(&mut filling));
                    }
                } else {
                    self.complete(&mut nodes, idx, &mut ready, &embed, &report).await;
                }
            }

            // nothing else will join a partial batch while the pool has room
            if !filling.is_empty() && queued.is_empty() && in_flight.len() < self.options.max_concurrent {
                queued.push_back(std::mem::take(&mut filling));
            }

            while in_flight.len() < self.options.max_concurrent {
                let Some(batch) = queued.pop_front() else {
                    break;
                };
                if let Some(future) = self.submit(&nodes, batch) {
                    report.model_calls += 1;
                    in_flight.push(future);
                }
            }

            let Some((indices, batch, result)) = in_flight.next().await else {
                break;
            };

            match result {
                Ok(()) => {
                    for (&idx, summarized) in indices.iter().zip(batch) {
                        let node = &mut nodes[idx];
                        match summarized.summary.filter(|s| !s.trim().is_empty()) {
                            Some(summary) if node.snippet.summary.as_deref() != Some(summary.as_str()) => {
                                node.snippet.summary = Some(summary);
                                report.summarized += 1;
                                report.updated.insert(node.snippet.id.clone());
                            }
                            _ => {}
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(batch = indices.len(), "summary batch failed: {}", e);
                    report.failed_batches += 1;
                }
            }
            for idx in indices {
                self.complete(&mut nodes, idx, &mut ready, &embed, &report).await;
            }
        }

        for node in nodes.iter().filter(|n| n.state != NodeState::Done) {
            report.cyclic.push(node.snippet.id.clone());
        }
        if !report.cyclic.is_empty() {
            tracing::warn!(snippets = ?report.cyclic, "parent cycle detected, leaving members unsummarized");
        }
        report.unsummarized = nodes
            .iter()
            .filter(|n| n.needs_summary && n.snippet.summary.is_none())
            .count();

        propagate_parent_context(&mut nodes, self.options.context_depth, &mut report.updated);

        tracing::debug!(
            summarized = report.summarized,
            failed_batches = report.failed_batches,
            model_calls = report.model_calls,
            "summarization complete"
        );
        (nodes.into_iter().map(|n| n.snippet).collect(), report)
    }

    fn submit(&self, nodes: &[Node], indices: Vec<usize>) -> Option<BoxFuture<'static, BatchOutcome>> {
        let summarizer = self.summarizer.clone()?;
        let mut context = ChildContext::new();
        for &idx in &indices {
            let children: Vec<String> = nodes[idx]
                .children
                .iter()
                .filter_map(|&c| {
                    let child = &nodes[c].snippet;
                    child.summary.as_ref().map(|s| format!("{}: {}", child.name, s))
                })
                .collect();
            if !children.is_empty() {
                context.insert(nodes[idx].snippet.id.clone(), children);
            }
        }
        let mut batch: Vec<Snippet> = indices.iter().map(|&i| nodes[i].snippet.clone()).collect();

        Some(Box::pin(async move {
            let result = summarizer.summarize_batch(&mut batch, &context).await;
            (indices, batch, result)
        }))
    }

    /// Mark done, emit for embedding, and release the parent
    async fn complete(
        &self,
        nodes: &mut [Node],
        idx: usize,
        ready: &mut VecDeque<usize>,
        embed: &EmbedFilter<'_>,
        report: &SummaryReport,
    ) {
        nodes[idx].state = NodeState::Done;

        if let Some(sink) = embed.sink {
            let snippet = &nodes[idx].snippet;
            let wanted = embed.changed_files.contains(&snippet.file_path)
                || embed.missing_vectors.contains(&snippet.id)
                || report.updated.contains(&snippet.id);
            if wanted && !sink.send(snippet.id.clone(), snippet.embedding_text()).await {
                tracing::warn!(id = %snippet.id, "embedding queue closed");
            }
        }

        if let Some(parent) = nodes[idx].parent {
            if nodes[idx].needs_summary {
                nodes[parent].needs_summary = true;
            }
            let node = &mut nodes[parent];
            node.pending = node.pending.saturating_sub(1);
            if node.pending == 0 && node.state == NodeState::Pending {
                node.state = NodeState::Ready;
                ready.push_back(parent);
            }
        }
    }
}

fn build_arena(snippets: Vec<Snippet>, changed_files: &BTreeSet<String>) -> Vec<Node> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(snippets.len());
    for (i, snippet) in snippets.iter().enumerate() {
        index.entry(snippet.id.clone()).or_insert(i);
    }

    let mut nodes: Vec<Node> = snippets
        .into_iter()
        .map(|snippet| Node {
            needs_summary: changed_files.contains(&snippet.file_path)
                || snippet.summary.as_deref().map_or(true, |s| s.trim().is_empty()),
            snippet,
            parent: None,
            children: Vec::new(),
            pending: 0,
            state: NodeState::Pending,
        })
        .collect();

    for i in 0..nodes.len() {
        let Some(parent_id) = nodes[i].snippet.parent_id.as_deref() else {
            continue;
        };
        if parent_id == nodes[i].snippet.id {
            tracing::warn!(id = %parent_id, "snippet is its own parent, detaching");
            continue;
        }
        if let Some(&p) = index.get(parent_id) {
            nodes[i].parent = Some(p);
            nodes[p].children.push(i);
            nodes[p].pending += 1;
        }
    }
    nodes
}

/// Write each summary into its children's metadata, down to `depth` levels
fn propagate_parent_context(nodes: &mut [Node], depth: usize, updated: &mut HashSet<String>) {
    let mut frontier: Vec<usize> = (0..nodes.len())
        .filter(|&i| nodes[i].parent.is_none() && nodes[i].state == NodeState::Done)
        .collect();

    for _ in 0..depth {
        let mut next = Vec::new();
        for idx in frontier {
            let summary = nodes[idx].snippet.summary.clone();
            for child in nodes[idx].children.clone() {
                if let Some(summary) = &summary {
                    let snippet = &mut nodes[child].snippet;
                    if snippet.metadata_str(META_PARENT_SUMMARY) != Some(summary.as_str()) {
                        snippet.set_metadata(META_PARENT_SUMMARY, summary.clone());
                        updated.insert(snippet.id.clone());
                    }
                }
                next.push(child);
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
}
