//! Graph traversal engine: bounded BFS over the knowledge graph.
//!
//! # Responsibility
//! - Answer entity search, neighbor expansion, and path-finding queries
//!   within explicit depth and result-count bounds.
//! - Prefer the backend's aggregated subgraph query, falling back
//!   transparently to node-by-node BFS when the capability is absent.
//!
//! # Invariants
//! - Traversal state (visited set, queue) is per-call; the engine is
//!   stateless between invocations.
//! - A node/edge lookup failure mid-traversal skips that branch; the call
//!   still succeeds with a partial result. Only a malformed top-level query
//!   is a hard error.
//! - Returned edges connect visited nodes and are deduplicated by edge id.

use crate::model::chunk::ChunkId;
use crate::model::graph::{
    GraphEdge, GraphEdgeId, GraphNode, GraphNodeId, NewGraphEdge, NewGraphNode, Subgraph,
};
use crate::repo::graph_repo::{GraphRepoError, GraphRepository};
use crate::service::cancel::CancelToken;
use log::debug;
use std::collections::{HashMap, HashSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};

const DEFAULT_SEARCH_DEPTH: i64 = 3;
const DEFAULT_SEARCH_LIMIT: usize = 50;
const DEFAULT_NEIGHBOR_DEPTH: i64 = 1;
const DEFAULT_PATH_DEPTH: i64 = 5;

/// Entity search query. Non-positive bounds fall back to the defaults
/// (depth 3, limit 50).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySearchQuery {
    /// Entity name seeding the expansion.
    pub entity_name: String,
    /// Maximum expansion depth per branch.
    pub max_depth: i64,
    /// Maximum number of nodes in the result.
    pub limit: i64,
}

impl EntitySearchQuery {
    /// Builds a query with default bounds.
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            max_depth: 0,
            limit: 0,
        }
    }
}

/// Errors from graph operations.
#[derive(Debug)]
pub enum GraphServiceError {
    /// Entity name is blank after trim.
    BlankEntityName,
    /// Relationship label is blank after trim.
    BlankRelationType,
    /// Caller-requested cancellation observed mid-traversal.
    Cancelled,
    /// Repository-level failure outside a skippable branch.
    Repo(GraphRepoError),
}

impl Display for GraphServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankEntityName => write!(f, "entity name must not be blank"),
            Self::BlankRelationType => write!(f, "relationship type must not be blank"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GraphServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GraphRepoError> for GraphServiceError {
    fn from(value: GraphRepoError) -> Self {
        Self::Repo(value)
    }
}

/// Graph traversal engine facade.
pub struct GraphService<R: GraphRepository> {
    repo: R,
}

impl<R: GraphRepository> GraphService<R> {
    /// Creates the engine from a repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Stores entity nodes; empty input is a no-op.
    ///
    /// Every node must carry a non-blank entity name.
    pub fn insert_nodes(
        &self,
        nodes: &[NewGraphNode],
    ) -> Result<Vec<GraphNode>, GraphServiceError> {
        if nodes.iter().any(|node| node.entity_name.trim().is_empty()) {
            return Err(GraphServiceError::BlankEntityName);
        }
        self.repo.insert_nodes(nodes).map_err(Into::into)
    }

    /// Stores relationship edges; empty input is a no-op.
    ///
    /// Every edge must carry a non-blank relationship label.
    pub fn insert_edges(
        &self,
        edges: &[NewGraphEdge],
    ) -> Result<Vec<GraphEdge>, GraphServiceError> {
        if edges
            .iter()
            .any(|edge| edge.relationship_type.trim().is_empty())
        {
            return Err(GraphServiceError::BlankRelationType);
        }
        self.repo.insert_edges(edges).map_err(Into::into)
    }

    /// Exact-match node lookup by entity name.
    pub fn nodes_by_entity(
        &self,
        entity_name: &str,
    ) -> Result<Vec<GraphNode>, GraphServiceError> {
        self.repo.nodes_by_entity(entity_name).map_err(Into::into)
    }

    /// Exact-match node lookup by originating chunk.
    pub fn nodes_by_chunk(&self, chunk_id: ChunkId) -> Result<Vec<GraphNode>, GraphServiceError> {
        self.repo.nodes_by_chunk(chunk_id).map_err(Into::into)
    }

    /// Exact-match edge lookup by relationship label.
    pub fn edges_by_relation_type(
        &self,
        relation_type: &str,
    ) -> Result<Vec<GraphEdge>, GraphServiceError> {
        self.repo
            .edges_by_relation_type(relation_type)
            .map_err(Into::into)
    }

    /// Expands the graph around every node matching an entity name.
    ///
    /// Prefers the backend's aggregated subgraph query; falls back to
    /// multi-seed BFS when the capability is absent or the query fails. The
    /// result contract is identical either way.
    pub fn search_by_entity(
        &self,
        query: &EntitySearchQuery,
        cancel: &CancelToken,
    ) -> Result<Subgraph, GraphServiceError> {
        let entity_name = query.entity_name.trim();
        if entity_name.is_empty() {
            return Err(GraphServiceError::BlankEntityName);
        }
        let max_depth = positive_or(query.max_depth, DEFAULT_SEARCH_DEPTH);
        let limit = if query.limit <= 0 {
            DEFAULT_SEARCH_LIMIT
        } else {
            query.limit as usize
        };

        self.ensure_live(cancel)?;
        match self.repo.entity_subgraph(entity_name, max_depth, limit) {
            Ok(Some(subgraph)) => return Ok(subgraph),
            Ok(None) => {}
            Err(err) => {
                debug!(
                    "event=graph_search module=graph status=fallback reason=subgraph_query_failed error={err}"
                );
            }
        }

        self.ensure_live(cancel)?;
        let seeds = self.repo.nodes_by_entity(entity_name)?;
        if seeds.is_empty() {
            return Ok(Subgraph::empty());
        }
        self.bounded_expand(seeds, max_depth, Some(limit), cancel)
    }

    /// Expands outward from a single node.
    ///
    /// A non-existent seed yields an empty result, not an error. Default
    /// depth is 1.
    pub fn neighbors(
        &self,
        node_id: GraphNodeId,
        max_depth: i64,
        cancel: &CancelToken,
    ) -> Result<Subgraph, GraphServiceError> {
        let max_depth = positive_or(max_depth, DEFAULT_NEIGHBOR_DEPTH);

        self.ensure_live(cancel)?;
        let Some(seed) = self.repo.get_node(node_id)? else {
            return Ok(Subgraph::empty());
        };
        self.bounded_expand(vec![seed], max_depth, None, cancel)
    }

    /// Finds one shortest edge-path between two nodes within a depth bound.
    ///
    /// No reachable path yields an empty result. Default depth is 5.
    pub fn find_path(
        &self,
        source_id: GraphNodeId,
        target_id: GraphNodeId,
        max_depth: i64,
        cancel: &CancelToken,
    ) -> Result<Subgraph, GraphServiceError> {
        let max_depth = positive_or(max_depth, DEFAULT_PATH_DEPTH);

        let mut parent: HashMap<GraphNodeId, GraphNodeId> = HashMap::new();
        let mut depth_of: HashMap<GraphNodeId, i64> = HashMap::from([(source_id, 0)]);
        let mut queue: VecDeque<GraphNodeId> = VecDeque::from([source_id]);
        let mut found = false;

        'expand: while let Some(current) = queue.pop_front() {
            let current_depth = depth_of.get(&current).copied().unwrap_or(0);
            if current_depth >= max_depth {
                continue;
            }
            self.ensure_live(cancel)?;

            let edges = match self.repo.edges_touching(current) {
                Ok(edges) => edges,
                // Branch unreachable; other branches may still succeed.
                Err(_) => continue,
            };

            for edge in edges {
                let Some(other) = edge.other_endpoint(current) else {
                    continue;
                };
                if depth_of.contains_key(&other) {
                    continue;
                }
                match self.repo.get_node(other) {
                    Ok(Some(_)) => {}
                    // Dangling endpoint or unreachable node: skip.
                    Ok(None) | Err(_) => continue,
                }

                parent.insert(other, current);
                depth_of.insert(other, current_depth + 1);
                queue.push_back(other);

                if other == target_id {
                    found = true;
                    break 'expand;
                }
            }
        }

        if !found {
            return Ok(Subgraph::empty());
        }

        // Walk parent pointers target -> source, then flip into path order.
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut cursor = Some(target_id);
        while let Some(current) = cursor {
            self.ensure_live(cancel)?;
            let node = match self.repo.get_node(current) {
                Ok(Some(node)) => node,
                Ok(None) | Err(_) => break,
            };
            nodes.push(node);

            match parent.get(&current).copied() {
                Some(previous) => {
                    if let Ok(Some(edge)) = self.repo.edge_between(previous, current) {
                        edges.push(edge);
                    }
                    cursor = Some(previous);
                }
                None => cursor = None,
            }
        }
        nodes.reverse();
        edges.reverse();

        Ok(Subgraph { nodes, edges })
    }

    /// Breadth-first expansion shared by entity search and neighbor queries.
    fn bounded_expand(
        &self,
        seeds: Vec<GraphNode>,
        max_depth: i64,
        limit: Option<usize>,
        cancel: &CancelToken,
    ) -> Result<Subgraph, GraphServiceError> {
        let mut depth_of: HashMap<GraphNodeId, i64> = HashMap::new();
        let mut nodes: Vec<GraphNode> = Vec::new();
        let mut queue: VecDeque<GraphNode> = VecDeque::new();

        for seed in seeds {
            if depth_of.contains_key(&seed.id) {
                continue;
            }
            depth_of.insert(seed.id, 0);
            queue.push_back(seed.clone());
            nodes.push(seed);
        }

        let mut candidate_edges: Vec<GraphEdge> = Vec::new();
        let mut seen_edges: HashSet<GraphEdgeId> = HashSet::new();

        while let Some(current) = queue.pop_front() {
            if matches!(limit, Some(limit) if nodes.len() >= limit) {
                break;
            }
            let current_depth = depth_of.get(&current.id).copied().unwrap_or(0);
            if current_depth >= max_depth {
                continue;
            }
            self.ensure_live(cancel)?;

            let edges = match self.repo.edges_touching(current.id) {
                Ok(edges) => edges,
                // Branch unreachable; other branches may still succeed.
                Err(_) => continue,
            };

            for edge in edges {
                if seen_edges.insert(edge.id) {
                    candidate_edges.push(edge.clone());
                }

                let Some(other) = edge.other_endpoint(current.id) else {
                    continue;
                };
                if depth_of.contains_key(&other) {
                    continue;
                }
                if matches!(limit, Some(limit) if nodes.len() >= limit) {
                    continue;
                }

                let neighbor = match self.repo.get_node(other) {
                    Ok(Some(node)) => node,
                    // Dangling endpoint or unreachable node: skip.
                    Ok(None) | Err(_) => continue,
                };
                depth_of.insert(other, current_depth + 1);
                queue.push_back(neighbor.clone());
                nodes.push(neighbor);
            }
        }

        let edges = candidate_edges
            .into_iter()
            .filter(|edge| {
                depth_of.contains_key(&edge.source_node_id)
                    && depth_of.contains_key(&edge.target_node_id)
            })
            .collect();

        Ok(Subgraph { nodes, edges })
    }

    fn ensure_live(&self, cancel: &CancelToken) -> Result<(), GraphServiceError> {
        if cancel.is_cancelled() {
            return Err(GraphServiceError::Cancelled);
        }
        Ok(())
    }
}

fn positive_or(value: i64, default: i64) -> i64 {
    if value <= 0 {
        default
    } else {
        value
    }
}
