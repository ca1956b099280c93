//! Hybrid search over an indexed project
//!
//! Vector and full-text candidates are fused with Reciprocal Rank Fusion,
//! optionally reranked, then hydrated with parents and typed edges.

mod answer;
mod fusion;
mod hybrid;
mod keyword;

pub use answer::{answer, answer_stream, build_answer_prompt, render_result};
pub use fusion::{reciprocal_rank_fusion, DEFAULT_RRF_K};
pub use hybrid::{
    HybridSearchEngine, Relation, SearchOptions, SearchResponse, SearchResult, SearchStatus,
};
pub use keyword::{build_match_expression, keyword_search, query_terms};
