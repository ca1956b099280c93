//! Core data model: snippets, relationships and graph nodes

mod relationship;
mod snippet;

pub use relationship::{GraphNode, RelationKind, Relationship};
pub use snippet::{
    content_fingerprint, line_span, snippet_id, Snippet, SnippetKind, ELISION_MARKER,
    META_BODY_OFFSET, META_CHUNK_INDEX, META_LANGUAGE, META_LEADING_COMMENTS,
    META_PARENT_SUMMARY, META_TS_NODE_ID,
};
