//! Knowledge graph repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide elementary node/edge storage with free-form property bags.
//! - Offer the optional aggregated entity-subgraph query; backends without
//!   it report `None` and the traversal engine falls back to client-side
//!   BFS.
//!
//! # Invariants
//! - Inserts assign ids and timestamps; empty batches are no-ops.
//! - Filter queries return empty sets, never errors, when nothing matches.
//! - Edge endpoint existence is not checked at insert time.

use crate::db::DbError;
use crate::model::chunk::ChunkId;
use crate::model::graph::{
    GraphEdge, GraphNode, GraphNodeId, NewGraphEdge, NewGraphNode, PropertyMap, Subgraph,
};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const NODE_SELECT_SQL: &str = "SELECT
    id,
    chunk_id,
    entity_name,
    entity_type,
    properties,
    created_at
FROM graph_nodes";

const EDGE_SELECT_SQL: &str = "SELECT
    id,
    source_node_id,
    target_node_id,
    relationship_type,
    properties,
    created_at
FROM graph_edges";

pub type GraphRepoResult<T> = Result<T, GraphRepoError>;

/// Repository error for graph storage and query operations.
#[derive(Debug)]
pub enum GraphRepoError {
    Db(DbError),
    InvalidData(String),
}

impl Display for GraphRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted graph data: {message}"),
        }
    }
}

impl Error for GraphRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for GraphRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for GraphRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for graph storage primitives.
pub trait GraphRepository {
    /// Persists nodes, assigning ids and timestamps. Empty input is a no-op.
    fn insert_nodes(&self, nodes: &[NewGraphNode]) -> GraphRepoResult<Vec<GraphNode>>;
    /// Persists edges, assigning ids and timestamps. Empty input is a no-op.
    fn insert_edges(&self, edges: &[NewGraphEdge]) -> GraphRepoResult<Vec<GraphEdge>>;
    /// Loads one node by id. Absence is `Ok(None)`, not an error.
    fn get_node(&self, id: GraphNodeId) -> GraphRepoResult<Option<GraphNode>>;
    /// Exact-match filter by entity name, newest first.
    fn nodes_by_entity(&self, entity_name: &str) -> GraphRepoResult<Vec<GraphNode>>;
    /// Exact-match filter by originating chunk, newest first.
    fn nodes_by_chunk(&self, chunk_id: ChunkId) -> GraphRepoResult<Vec<GraphNode>>;
    /// Exact-match filter by relationship label, newest first.
    fn edges_by_relation_type(&self, relation_type: &str) -> GraphRepoResult<Vec<GraphEdge>>;
    /// All edges with `node_id` as either endpoint.
    fn edges_touching(&self, node_id: GraphNodeId) -> GraphRepoResult<Vec<GraphEdge>>;
    /// One edge connecting the two nodes in either direction, if any.
    fn edge_between(
        &self,
        a: GraphNodeId,
        b: GraphNodeId,
    ) -> GraphRepoResult<Option<GraphEdge>>;
    /// Aggregated bounded expansion from all nodes matching an entity name.
    ///
    /// Returns `Ok(None)` when the backend does not support the capability;
    /// callers must then fall back to client-side traversal.
    fn entity_subgraph(
        &self,
        entity_name: &str,
        max_depth: i64,
        limit: usize,
    ) -> GraphRepoResult<Option<Subgraph>>;
}

/// SQLite-backed graph repository.
pub struct SqliteGraphRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGraphRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn edges_among(&self, node_ids: &[GraphNodeId]) -> GraphRepoResult<Vec<GraphEdge>> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; node_ids.len()].join(", ");
        let sql = format!(
            "{EDGE_SELECT_SQL}
             WHERE source_node_id IN ({placeholders})
               AND target_node_id IN ({placeholders})
             ORDER BY created_at ASC, id ASC;"
        );

        let mut bind_values: Vec<Value> = Vec::with_capacity(node_ids.len() * 2);
        for _ in 0..2 {
            for id in node_ids {
                bind_values.push(Value::Text(id.to_string()));
            }
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            edges.push(parse_edge_row(row)?);
        }
        Ok(edges)
    }
}

impl GraphRepository for SqliteGraphRepository<'_> {
    fn insert_nodes(&self, nodes: &[NewGraphNode]) -> GraphRepoResult<Vec<GraphNode>> {
        if nodes.is_empty() {
            return Ok(Vec::new());
        }

        let now = graph_now_epoch_ms();
        let mut stmt = self.conn.prepare(
            "INSERT INTO graph_nodes (id, chunk_id, entity_name, entity_type, properties, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        )?;

        let mut stored = Vec::with_capacity(nodes.len());
        for node in nodes {
            let id = Uuid::new_v4();
            stmt.execute(rusqlite::params![
                id.to_string(),
                node.chunk_id.to_string(),
                node.entity_name.as_str(),
                node.entity_type.as_str(),
                encode_properties(&node.properties)?,
                now,
            ])?;
            stored.push(GraphNode {
                id,
                chunk_id: node.chunk_id,
                entity_name: node.entity_name.clone(),
                entity_type: node.entity_type.clone(),
                properties: node.properties.clone(),
                created_at: now,
            });
        }
        Ok(stored)
    }

    fn insert_edges(&self, edges: &[NewGraphEdge]) -> GraphRepoResult<Vec<GraphEdge>> {
        if edges.is_empty() {
            return Ok(Vec::new());
        }

        let now = graph_now_epoch_ms();
        let mut stmt = self.conn.prepare(
            "INSERT INTO graph_edges (id, source_node_id, target_node_id, relationship_type, properties, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        )?;

        let mut stored = Vec::with_capacity(edges.len());
        for edge in edges {
            let id = Uuid::new_v4();
            stmt.execute(rusqlite::params![
                id.to_string(),
                edge.source_node_id.to_string(),
                edge.target_node_id.to_string(),
                edge.relationship_type.as_str(),
                encode_properties(&edge.properties)?,
                now,
            ])?;
            stored.push(GraphEdge {
                id,
                source_node_id: edge.source_node_id,
                target_node_id: edge.target_node_id,
                relationship_type: edge.relationship_type.clone(),
                properties: edge.properties.clone(),
                created_at: now,
            });
        }
        Ok(stored)
    }

    fn get_node(&self, id: GraphNodeId) -> GraphRepoResult<Option<GraphNode>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NODE_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_node_row(row)?));
        }
        Ok(None)
    }

    fn nodes_by_entity(&self, entity_name: &str) -> GraphRepoResult<Vec<GraphNode>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NODE_SELECT_SQL}
             WHERE entity_name = ?1
             ORDER BY created_at DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([entity_name])?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(parse_node_row(row)?);
        }
        Ok(nodes)
    }

    fn nodes_by_chunk(&self, chunk_id: ChunkId) -> GraphRepoResult<Vec<GraphNode>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NODE_SELECT_SQL}
             WHERE chunk_id = ?1
             ORDER BY created_at DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([chunk_id.to_string()])?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(parse_node_row(row)?);
        }
        Ok(nodes)
    }

    fn edges_by_relation_type(&self, relation_type: &str) -> GraphRepoResult<Vec<GraphEdge>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EDGE_SELECT_SQL}
             WHERE relationship_type = ?1
             ORDER BY created_at DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([relation_type])?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            edges.push(parse_edge_row(row)?);
        }
        Ok(edges)
    }

    fn edges_touching(&self, node_id: GraphNodeId) -> GraphRepoResult<Vec<GraphEdge>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EDGE_SELECT_SQL}
             WHERE source_node_id = ?1 OR target_node_id = ?1
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([node_id.to_string()])?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            edges.push(parse_edge_row(row)?);
        }
        Ok(edges)
    }

    fn edge_between(
        &self,
        a: GraphNodeId,
        b: GraphNodeId,
    ) -> GraphRepoResult<Option<GraphEdge>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EDGE_SELECT_SQL}
             WHERE (source_node_id = ?1 AND target_node_id = ?2)
                OR (source_node_id = ?2 AND target_node_id = ?1)
             ORDER BY created_at ASC, id ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query(rusqlite::params![a.to_string(), b.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_edge_row(row)?));
        }
        Ok(None)
    }

    fn entity_subgraph(
        &self,
        entity_name: &str,
        max_depth: i64,
        limit: usize,
    ) -> GraphRepoResult<Option<Subgraph>> {
        // Bounded undirected expansion in one round-trip. The depth bound
        // guarantees termination even on cyclic graphs.
        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE frontier(node_id, depth) AS (
                SELECT id, 0 FROM graph_nodes WHERE entity_name = ?1
                UNION
                SELECT CASE WHEN edge.source_node_id = frontier.node_id
                            THEN edge.target_node_id
                            ELSE edge.source_node_id END,
                       frontier.depth + 1
                FROM graph_edges edge, frontier
                WHERE frontier.depth < ?2
                  AND frontier.node_id IN (edge.source_node_id, edge.target_node_id)
            )
            SELECT n.id, n.chunk_id, n.entity_name, n.entity_type, n.properties, n.created_at
            FROM graph_nodes n
            JOIN (
                SELECT node_id, MIN(depth) AS depth
                FROM frontier
                GROUP BY node_id
            ) reach ON reach.node_id = n.id
            ORDER BY reach.depth ASC, n.created_at ASC, n.id ASC
            LIMIT ?3;",
        )?;

        let mut rows = stmt.query(rusqlite::params![entity_name, max_depth, limit as i64])?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(parse_node_row(row)?);
        }

        let node_ids: Vec<GraphNodeId> = nodes.iter().map(|node| node.id).collect();
        let edges = self.edges_among(&node_ids)?;
        Ok(Some(Subgraph { nodes, edges }))
    }
}

fn parse_node_row(row: &Row<'_>) -> GraphRepoResult<GraphNode> {
    Ok(GraphNode {
        id: parse_graph_uuid(row, "id")?,
        chunk_id: parse_graph_uuid(row, "chunk_id")?,
        entity_name: row.get("entity_name")?,
        entity_type: row.get("entity_type")?,
        properties: parse_properties(row)?,
        created_at: row.get("created_at")?,
    })
}

fn parse_edge_row(row: &Row<'_>) -> GraphRepoResult<GraphEdge> {
    Ok(GraphEdge {
        id: parse_graph_uuid(row, "id")?,
        source_node_id: parse_graph_uuid(row, "source_node_id")?,
        target_node_id: parse_graph_uuid(row, "target_node_id")?,
        relationship_type: row.get("relationship_type")?,
        properties: parse_properties(row)?,
        created_at: row.get("created_at")?,
    })
}

fn parse_graph_uuid(row: &Row<'_>, column: &'static str) -> GraphRepoResult<Uuid> {
    let value: String = row.get(column)?;
    Uuid::parse_str(&value)
        .map_err(|_| GraphRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn parse_properties(row: &Row<'_>) -> GraphRepoResult<PropertyMap> {
    let text: String = row.get("properties")?;
    serde_json::from_str(&text)
        .map_err(|err| GraphRepoError::InvalidData(format!("invalid properties JSON: {err}")))
}

fn encode_properties(properties: &PropertyMap) -> GraphRepoResult<String> {
    serde_json::to_string(properties)
        .map_err(|err| GraphRepoError::InvalidData(format!("unencodable property map: {err}")))
}

fn graph_now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
