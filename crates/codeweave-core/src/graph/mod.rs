//! Lean code graph: nodes and typed edges
//!
//! Nodes carry only `id, name, kind, file_path`; content lives in the
//! primary store. Edges may point at placeholder nodes for symbols with no
//! local definition.

mod sqlite;

pub use sqlite::SqliteGraphStore;

use crate::error::Result;
use crate::model::{GraphNode, Relationship};
use std::collections::HashMap;

/// Node and edge counts reported by `status`
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub placeholder_nodes: usize,
    pub edges: usize,
}

/// Operations the indexer and search engine need from a graph backend
pub trait GraphStore: Send + Sync {
    fn upsert_nodes(&self, nodes: &[GraphNode]) -> Result<usize>;

    /// Upsert edges, materializing a placeholder node for any missing endpoint
    fn upsert_edges(&self, edges: &[Relationship]) -> Result<usize>;

    fn get_outgoing_edges(&self, node_id: &str) -> Result<Vec<Relationship>>;

    /// Outgoing edges for several nodes at once
    fn get_outgoing_edges_bulk(&self, node_ids: &[String])
        -> Result<HashMap<String, Vec<Relationship>>>;

    fn get_node(&self, node_id: &str) -> Result<Option<GraphNode>>;

    /// Delete every node of a file and the edges leaving those nodes.
    /// Nodes still targeted by other files' edges are kept as placeholders.
    fn delete_file_data(&self, file_path: &str) -> Result<usize>;

    fn get_all_file_paths(&self) -> Result<Vec<String>>;

    fn stats(&self) -> Result<GraphStats>;
}
