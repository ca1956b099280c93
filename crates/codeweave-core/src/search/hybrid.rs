//! Hybrid retrieval: vector and keyword candidates fused with RRF, then reranked

use super::fusion::reciprocal_rank_fusion;
use super::keyword::keyword_search;
use crate::config::SearchConfig;
use crate::db::Database;
use crate::error::Result;
use crate::graph::GraphStore;
use crate::llm::{Embedder, QueryOrchestrator, RerankDocument, Reranker};
use crate::model::{RelationKind, Snippet};
use crate::project::ProjectStores;
use crate::vector::{is_null_vector, VectorHit, VectorStore};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Per-query switches
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub use_hyde: bool,
    pub use_rerank: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            use_hyde: true,
            use_rerank: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Ok,
    /// The project has no snippets yet
    NotIndexed,
    /// A retrieval stage failed; results come from the stages that worked
    Degraded,
}

/// Outgoing edge of a result, with the target's name when it is known
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relation {
    pub kind: RelationKind,
    pub target_id: String,
    pub target_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub snippet: Snippet,
    /// Enclosing snippet
    pub parent: Option<Snippet>,
    pub relations: Vec<Relation>,
    /// Reranker score, or the fused score when no reranker ran
    pub score: f64,
    pub fused_score: f64,
    /// Text the reranker saw
    #[serde(skip)]
    pub document: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    /// Query used for retrieval, augmented when HyDE ran
    pub effective_query: String,
    pub used_hyde: bool,
    pub status: SearchStatus,
    pub results: Vec<SearchResult>,
    pub warnings: Vec<String>,
}

impl SearchResponse {
    fn empty(query: &str, status: SearchStatus) -> Self {
        Self {
            query: query.to_string(),
            effective_query: query.to_string(),
            used_hyde: false,
            status,
            results: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.status = SearchStatus::Degraded;
        self.warnings.push(message);
    }
}

struct Candidate {
    id: String,
    fused_score: f64,
}

pub struct HybridSearchEngine {
    db: Arc<Database>,
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Option<Arc<dyn Embedder>>,
    reranker: Option<Arc<dyn Reranker>>,
    orchestrator: Option<Arc<dyn QueryOrchestrator>>,
    config: SearchConfig,
}

impl HybridSearchEngine {
    pub fn new(stores: &ProjectStores, config: SearchConfig) -> Self {
        Self {
            db: stores.db.clone(),
            graph: stores.graph.clone(),
            vectors: stores.vectors.clone(),
            embedder: None,
            reranker: None,
            orchestrator: None,
            config,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: Arc<dyn QueryOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    /// Top `k` results with every optional stage enabled
    pub async fn search(&self, query: &str, k: usize) -> SearchResponse {
        self.search_with(
            query,
            &SearchOptions {
                limit: k,
                ..Default::default()
            },
        )
        .await
    }

    /// Never fails: stage errors are reported as warnings with a degraded status
    pub async fn search_with(&self, query: &str, options: &SearchOptions) -> SearchResponse {
        let query = query.trim();
        if query.is_empty() || options.limit == 0 {
            return SearchResponse::empty(query, SearchStatus::Ok);
        }

        match self.db.count_snippets() {
            Ok(0) => return SearchResponse::empty(query, SearchStatus::NotIndexed),
            Ok(_) => {}
            Err(e) => {
                let mut response = SearchResponse::empty(query, SearchStatus::Degraded);
                response.warn(format!("snippet store unavailable: {}", e));
                return response;
            }
        }

        let mut response = SearchResponse::empty(query, SearchStatus::Ok);
        if options.use_hyde {
            if let Some(orchestrator) = &self.orchestrator {
                match orchestrator.rewrite(query).await {
                    Ok(rewritten) => response.effective_query = rewritten,
                    Err(e) => response.warn(format!("query rewrite failed: {}", e)),
                }
            }
        }
        response.used_hyde = response.effective_query != query;
        let used_hyde = response.used_hyde;
        let effective = response.effective_query.clone();

        let vector_k = (options.limit * 10).max(self.config.min_vector_candidates);
        let (vector_hits, keyword_hits) = tokio::join!(
            self.vector_candidates(&effective, vector_k),
            async {
                let variants: Vec<&str> = if used_hyde {
                    vec![query, effective.as_str()]
                } else {
                    vec![query]
                };
                keyword_search(&self.db, &variants, self.config.keyword_limit)
            }
        );

        let mut documents: HashMap<String, String> = HashMap::new();
        let mut lists = Vec::new();
        match vector_hits {
            Ok(hits) => {
                lists.push(hits.iter().map(|h| h.id.clone()).collect());
                for hit in hits {
                    documents.entry(hit.id).or_insert(hit.document);
                }
            }
            Err(e) => response.warn(format!("vector search failed: {}", e)),
        }
        match keyword_hits {
            Ok(hits) => {
                lists.push(hits.iter().map(|h| h.snippet.id.clone()).collect());
                for hit in hits {
                    let document = hit.snippet.embedding_text();
                    documents.entry(hit.snippet.id).or_insert(document);
                }
            }
            Err(e) => response.warn(format!("keyword search failed: {}", e)),
        }

        let pool = self.config.rerank_pool.max(options.limit);
        let candidates: Vec<Candidate> = reciprocal_rank_fusion(&lists, self.config.rrf_k)
            .into_iter()
            .take(pool)
            .map(|(id, fused_score)| Candidate { id, fused_score })
            .collect();

        let mut results = match self.hydrate(&candidates, &documents) {
            Ok(results) => results,
            Err(e) => {
                response.warn(format!("loading candidates failed: {}", e));
                return response;
            }
        };

        results = self.rerank(query, results, options, &mut response).await;
        if let Err(e) = self.attach_context(&mut results) {
            response.warn(format!("loading context failed: {}", e));
        }
        response.results = results;
        response
    }

    async fn vector_candidates(&self, query: &str, k: usize) -> Result<Vec<VectorHit>> {
        let Some(embedder) = &self.embedder else {
            return Ok(Vec::new());
        };
        let embedding = embedder.embed(query).await?;
        if is_null_vector(&embedding) {
            tracing::debug!("query embedding unavailable, skipping vector retrieval");
            return Ok(Vec::new());
        }
        self.vectors.query(&embedding, k)
    }

    /// Load candidates in fused order, skipping ids with no stored snippet
    fn hydrate(
        &self,
        candidates: &[Candidate],
        documents: &HashMap<String, String>,
    ) -> Result<Vec<SearchResult>> {
        let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
        let mut snippets: HashMap<String, Snippet> = self
            .db
            .get_snippets_by_ids(&ids)?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        Ok(candidates
            .iter()
            .filter_map(|candidate| {
                let snippet = snippets.remove(&candidate.id)?;
                let document = documents
                    .get(&candidate.id)
                    .cloned()
                    .unwrap_or_else(|| snippet.embedding_text());
                Some(SearchResult {
                    snippet,
                    parent: None,
                    relations: Vec::new(),
                    score: candidate.fused_score,
                    fused_score: candidate.fused_score,
                    document,
                })
            })
            .collect())
    }

    async fn rerank(
        &self,
        query: &str,
        mut results: Vec<SearchResult>,
        options: &SearchOptions,
        response: &mut SearchResponse,
    ) -> Vec<SearchResult> {
        let reranker = match &self.reranker {
            Some(reranker) if options.use_rerank && !results.is_empty() => reranker,
            _ => {
                results.truncate(options.limit);
                return results;
            }
        };

        let documents: Vec<RerankDocument> = results
            .iter()
            .map(|r| RerankDocument {
                id: r.snippet.id.clone(),
                text: r.document.clone(),
            })
            .collect();

        match reranker.rerank(query, &documents, options.limit).await {
            Ok(ranked) => {
                let mut slots: Vec<Option<SearchResult>> = results.into_iter().map(Some).collect();
                ranked
                    .into_iter()
                    .filter_map(|r| {
                        let mut result = slots.get_mut(r.index)?.take()?;
                        result.score = r.score;
                        Some(result)
                    })
                    .take(options.limit)
                    .collect()
            }
            Err(e) => {
                response.warn(format!("rerank failed, keeping fused order: {}", e));
                results.truncate(options.limit);
                results
            }
        }
    }

    /// Bulk-load parents, outgoing edges and edge target names
    fn attach_context(&self, results: &mut [SearchResult]) -> Result<()> {
        let parent_ids: Vec<String> = results
            .iter()
            .filter_map(|r| r.snippet.parent_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let parents: HashMap<String, Snippet> = self
            .db
            .get_snippets_by_ids(&parent_ids)?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        let ids: Vec<String> = results.iter().map(|r| r.snippet.id.clone()).collect();
        let mut edges = self.graph.get_outgoing_edges_bulk(&ids)?;

        let mut names: HashMap<String, Option<String>> = HashMap::new();
        for edge in edges.values().flatten() {
            if !names.contains_key(&edge.target_id) {
                let name = self.graph.get_node(&edge.target_id)?.map(|n| n.name);
                names.insert(edge.target_id.clone(), name);
            }
        }

        for result in results.iter_mut() {
            result.parent = match result.snippet.parent_id.as_deref() {
                Some(id) => parents.get(id).cloned(),
                None => None,
            };
            result.relations = edges
                .remove(&result.snippet.id)
                .unwrap_or_default()
                .into_iter()
                .map(|edge| Relation {
                    kind: edge.kind,
                    target_name: names.get(&edge.target_id).cloned().flatten(),
                    target_id: edge.target_id,
                })
                .collect();
        }
        Ok(())
    }
}
