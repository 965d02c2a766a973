//! Knowledge graph domain model.
//!
//! # Responsibility
//! - Define node/edge records anchored to chunks.
//! - Keep graph identity independent of the chunk tree.
//!
//! # Invariants
//! - Every node references the chunk it was extracted from; many nodes may
//!   reference the same chunk.
//! - Edge endpoint existence is not enforced at insert time; traversal
//!   tolerates dangling endpoints.

use crate::model::chunk::ChunkId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stable graph node identifier.
pub type GraphNodeId = Uuid;

/// Stable graph edge identifier.
pub type GraphEdgeId = Uuid;

/// Free-form string-keyed property bag of JSON-representable values.
pub type PropertyMap = BTreeMap<String, serde_json::Value>;

/// Entity node in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Stable node id.
    pub id: GraphNodeId,
    /// Chunk this entity was extracted from.
    pub chunk_id: ChunkId,
    /// Entity name, e.g. `"Alice"`.
    pub entity_name: String,
    /// Entity type, e.g. `"Person"`.
    pub entity_type: String,
    /// Free-form properties.
    pub properties: PropertyMap,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}

/// Relationship edge in the knowledge graph.
///
/// Edges are stored directed; traversal treats them as undirected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Stable edge id.
    pub id: GraphEdgeId,
    /// Source node id.
    pub source_node_id: GraphNodeId,
    /// Target node id.
    pub target_node_id: GraphNodeId,
    /// Relationship label, e.g. `"KNOWS"`.
    pub relationship_type: String,
    /// Free-form properties.
    pub properties: PropertyMap,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}

impl GraphEdge {
    /// Returns the endpoint opposite to `node_id`, if `node_id` is an
    /// endpoint of this edge.
    pub fn other_endpoint(&self, node_id: GraphNodeId) -> Option<GraphNodeId> {
        if self.source_node_id == node_id {
            Some(self.target_node_id)
        } else if self.target_node_id == node_id {
            Some(self.source_node_id)
        } else {
            None
        }
    }

    /// Returns whether `node_id` is one of this edge's endpoints.
    pub fn touches(&self, node_id: GraphNodeId) -> bool {
        self.source_node_id == node_id || self.target_node_id == node_id
    }
}

/// Insert request for one graph node; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGraphNode {
    /// Chunk this entity was extracted from.
    pub chunk_id: ChunkId,
    /// Entity name.
    pub entity_name: String,
    /// Entity type.
    pub entity_type: String,
    /// Free-form properties.
    pub properties: PropertyMap,
}

/// Insert request for one graph edge; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGraphEdge {
    /// Source node id.
    pub source_node_id: GraphNodeId,
    /// Target node id.
    pub target_node_id: GraphNodeId,
    /// Relationship label.
    pub relationship_type: String,
    /// Free-form properties.
    pub properties: PropertyMap,
}

/// Result shape shared by all traversal queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    /// Nodes reached by the query.
    pub nodes: Vec<GraphNode>,
    /// Edges connecting the returned nodes, deduplicated by edge id.
    pub edges: Vec<GraphEdge>,
}

impl Subgraph {
    /// Returns an empty result (`found nothing`, not an error).
    pub fn empty() -> Self {
        Self::default()
    }
}
