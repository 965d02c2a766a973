use loomnote_core::db::open_db_in_memory;
use loomnote_core::{
    CancelToken, EntitySearchQuery, GraphEdge, GraphNode, GraphNodeId, GraphRepoError,
    GraphRepoResult, GraphRepository, GraphService, GraphServiceError, NewGraphEdge, NewGraphNode,
    PropertyMap, SqliteGraphRepository, Subgraph,
};
use std::collections::HashSet;
use uuid::Uuid;

fn node(entity_name: &str, entity_type: &str) -> NewGraphNode {
    NewGraphNode {
        chunk_id: Uuid::new_v4(),
        entity_name: entity_name.to_string(),
        entity_type: entity_type.to_string(),
        properties: PropertyMap::new(),
    }
}

fn edge(source: GraphNodeId, target: GraphNodeId, relation: &str) -> NewGraphEdge {
    NewGraphEdge {
        source_node_id: source,
        target_node_id: target,
        relationship_type: relation.to_string(),
        properties: PropertyMap::new(),
    }
}

fn node_ids(subgraph: &Subgraph) -> HashSet<GraphNodeId> {
    subgraph.nodes.iter().map(|node| node.id).collect()
}

/// Seeds the knows/works_for triangle from the acceptance scenario:
/// `A(Person, Alice)`, `B(Person, Bob)`, `C(Org, Acme)`,
/// edges `A->B KNOWS` and `A->C WORKS_FOR`.
fn seed_alice(service: &GraphService<impl GraphRepository>) -> (GraphNode, GraphNode, GraphNode) {
    let inserted = service
        .insert_nodes(&[
            node("Alice", "Person"),
            node("Bob", "Person"),
            node("Acme", "Org"),
        ])
        .unwrap();
    let (a, b, c) = (
        inserted[0].clone(),
        inserted[1].clone(),
        inserted[2].clone(),
    );
    service
        .insert_edges(&[edge(a.id, b.id, "KNOWS"), edge(a.id, c.id, "WORKS_FOR")])
        .unwrap();
    (a, b, c)
}

/// Wrapper without the aggregated subgraph capability; forces the engine's
/// client-side BFS fallback.
struct NoAggregateRepo<'conn> {
    inner: SqliteGraphRepository<'conn>,
}

impl GraphRepository for NoAggregateRepo<'_> {
    fn insert_nodes(&self, nodes: &[NewGraphNode]) -> GraphRepoResult<Vec<GraphNode>> {
        self.inner.insert_nodes(nodes)
    }
    fn insert_edges(&self, edges: &[NewGraphEdge]) -> GraphRepoResult<Vec<GraphEdge>> {
        self.inner.insert_edges(edges)
    }
    fn get_node(&self, id: GraphNodeId) -> GraphRepoResult<Option<GraphNode>> {
        self.inner.get_node(id)
    }
    fn nodes_by_entity(&self, entity_name: &str) -> GraphRepoResult<Vec<GraphNode>> {
        self.inner.nodes_by_entity(entity_name)
    }
    fn nodes_by_chunk(&self, chunk_id: Uuid) -> GraphRepoResult<Vec<GraphNode>> {
        self.inner.nodes_by_chunk(chunk_id)
    }
    fn edges_by_relation_type(&self, relation_type: &str) -> GraphRepoResult<Vec<GraphEdge>> {
        self.inner.edges_by_relation_type(relation_type)
    }
    fn edges_touching(&self, node_id: GraphNodeId) -> GraphRepoResult<Vec<GraphEdge>> {
        self.inner.edges_touching(node_id)
    }
    fn edge_between(
        &self,
        a: GraphNodeId,
        b: GraphNodeId,
    ) -> GraphRepoResult<Option<GraphEdge>> {
        self.inner.edge_between(a, b)
    }
    fn entity_subgraph(
        &self,
        _entity_name: &str,
        _max_depth: i64,
        _limit: usize,
    ) -> GraphRepoResult<Option<Subgraph>> {
        Ok(None)
    }
}

/// Wrapper that makes one node unreachable: point lookups and edge listings
/// for it fail, as a flaky backend would.
struct FlakyRepo<'conn> {
    inner: SqliteGraphRepository<'conn>,
    failing: GraphNodeId,
}

impl FlakyRepo<'_> {
    fn fault() -> GraphRepoError {
        GraphRepoError::InvalidData("injected lookup fault".to_string())
    }
}

impl GraphRepository for FlakyRepo<'_> {
    fn insert_nodes(&self, nodes: &[NewGraphNode]) -> GraphRepoResult<Vec<GraphNode>> {
        self.inner.insert_nodes(nodes)
    }
    fn insert_edges(&self, edges: &[NewGraphEdge]) -> GraphRepoResult<Vec<GraphEdge>> {
        self.inner.insert_edges(edges)
    }
    fn get_node(&self, id: GraphNodeId) -> GraphRepoResult<Option<GraphNode>> {
        if id == self.failing {
            return Err(Self::fault());
        }
        self.inner.get_node(id)
    }
    fn nodes_by_entity(&self, entity_name: &str) -> GraphRepoResult<Vec<GraphNode>> {
        self.inner.nodes_by_entity(entity_name)
    }
    fn nodes_by_chunk(&self, chunk_id: Uuid) -> GraphRepoResult<Vec<GraphNode>> {
        self.inner.nodes_by_chunk(chunk_id)
    }
    fn edges_by_relation_type(&self, relation_type: &str) -> GraphRepoResult<Vec<GraphEdge>> {
        self.inner.edges_by_relation_type(relation_type)
    }
    fn edges_touching(&self, node_id: GraphNodeId) -> GraphRepoResult<Vec<GraphEdge>> {
        if node_id == self.failing {
            return Err(Self::fault());
        }
        self.inner.edges_touching(node_id)
    }
    fn edge_between(
        &self,
        a: GraphNodeId,
        b: GraphNodeId,
    ) -> GraphRepoResult<Option<GraphEdge>> {
        self.inner.edge_between(a, b)
    }
    fn entity_subgraph(
        &self,
        _entity_name: &str,
        _max_depth: i64,
        _limit: usize,
    ) -> GraphRepoResult<Option<Subgraph>> {
        Ok(None)
    }
}

#[test]
fn insert_assigns_ids_and_timestamps_and_tolerates_empty_input() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(SqliteGraphRepository::new(&conn));

    assert!(service.insert_nodes(&[]).unwrap().is_empty());
    assert!(service.insert_edges(&[]).unwrap().is_empty());

    let nodes = service.insert_nodes(&[node("Alice", "Person")]).unwrap();
    assert_eq!(nodes.len(), 1);
    assert!(nodes[0].created_at > 0);
    assert_eq!(nodes[0].entity_name, "Alice");
}

#[test]
fn insert_validates_entity_name_and_relation_type() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(SqliteGraphRepository::new(&conn));

    let err = service.insert_nodes(&[node("  ", "Person")]).unwrap_err();
    assert!(matches!(err, GraphServiceError::BlankEntityName));

    let err = service
        .insert_edges(&[edge(Uuid::new_v4(), Uuid::new_v4(), " ")])
        .unwrap_err();
    assert!(matches!(err, GraphServiceError::BlankRelationType));
}

#[test]
fn exact_match_filters_return_empty_sets_when_nothing_matches() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(SqliteGraphRepository::new(&conn));
    seed_alice(&service);

    assert!(service.nodes_by_entity("Nobody").unwrap().is_empty());
    assert!(service.nodes_by_chunk(Uuid::new_v4()).unwrap().is_empty());
    assert!(service.edges_by_relation_type("UNUSED").unwrap().is_empty());

    assert_eq!(service.nodes_by_entity("Alice").unwrap().len(), 1);
    assert_eq!(service.edges_by_relation_type("KNOWS").unwrap().len(), 1);
}

#[test]
fn nodes_by_chunk_returns_all_anchored_entities() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(SqliteGraphRepository::new(&conn));

    let chunk_id = Uuid::new_v4();
    let mut first = node("Alice", "Person");
    first.chunk_id = chunk_id;
    let mut second = node("Acme", "Org");
    second.chunk_id = chunk_id;
    service.insert_nodes(&[first, second]).unwrap();

    assert_eq!(service.nodes_by_chunk(chunk_id).unwrap().len(), 2);
}

#[test]
fn neighbors_depth_one_is_exact_and_direction_agnostic() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(SqliteGraphRepository::new(&conn));
    let (a, b, c) = seed_alice(&service);

    // An extra reverse edge must not duplicate the neighbor.
    service.insert_edges(&[edge(b.id, a.id, "KNOWS")]).unwrap();

    let result = service.neighbors(a.id, 1, &CancelToken::new()).unwrap();
    assert_eq!(result.nodes.len(), 3);
    assert_eq!(node_ids(&result), HashSet::from([a.id, b.id, c.id]));

    // Incoming direction: Acme's depth-1 neighborhood still reaches Alice.
    let reverse = service.neighbors(c.id, 1, &CancelToken::new()).unwrap();
    assert_eq!(node_ids(&reverse), HashSet::from([a.id, c.id]));
}

#[test]
fn neighbors_missing_seed_yields_empty_result() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(SqliteGraphRepository::new(&conn));
    seed_alice(&service);

    let result = service
        .neighbors(Uuid::new_v4(), 1, &CancelToken::new())
        .unwrap();
    assert!(result.nodes.is_empty());
    assert!(result.edges.is_empty());
}

#[test]
fn neighbors_depth_defaults_to_one_on_non_positive_input() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(SqliteGraphRepository::new(&conn));
    let (a, _, _) = seed_alice(&service);

    let defaulted = service.neighbors(a.id, 0, &CancelToken::new()).unwrap();
    let explicit = service.neighbors(a.id, 1, &CancelToken::new()).unwrap();
    assert_eq!(node_ids(&defaulted), node_ids(&explicit));
}

#[test]
fn search_by_entity_expands_seed_neighborhood() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(SqliteGraphRepository::new(&conn));
    let (a, b, c) = seed_alice(&service);

    let result = service
        .search_by_entity(
            &EntitySearchQuery {
                entity_name: "Alice".to_string(),
                max_depth: 1,
                limit: 10,
            },
            &CancelToken::new(),
        )
        .unwrap();

    assert_eq!(node_ids(&result), HashSet::from([a.id, b.id, c.id]));
    assert_eq!(result.edges.len(), 2);
}

#[test]
fn search_fallback_matches_aggregated_query_results() {
    let conn = open_db_in_memory().unwrap();
    let aggregated = GraphService::new(SqliteGraphRepository::new(&conn));
    let (a, b, c) = seed_alice(&aggregated);

    let fallback = GraphService::new(NoAggregateRepo {
        inner: SqliteGraphRepository::new(&conn),
    });

    let query = EntitySearchQuery {
        entity_name: "Alice".to_string(),
        max_depth: 1,
        limit: 10,
    };
    let via_query = aggregated
        .search_by_entity(&query, &CancelToken::new())
        .unwrap();
    let via_bfs = fallback
        .search_by_entity(&query, &CancelToken::new())
        .unwrap();

    assert_eq!(node_ids(&via_query), HashSet::from([a.id, b.id, c.id]));
    assert_eq!(node_ids(&via_query), node_ids(&via_bfs));

    let query_edges: HashSet<Uuid> = via_query.edges.iter().map(|edge| edge.id).collect();
    let bfs_edges: HashSet<Uuid> = via_bfs.edges.iter().map(|edge| edge.id).collect();
    assert_eq!(query_edges, bfs_edges);
}

#[test]
fn search_unknown_entity_yields_empty_result() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(SqliteGraphRepository::new(&conn));
    seed_alice(&service);

    let result = service
        .search_by_entity(&EntitySearchQuery::new("Nobody"), &CancelToken::new())
        .unwrap();
    assert!(result.nodes.is_empty());
    assert!(result.edges.is_empty());
}

#[test]
fn search_honors_result_limit() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(SqliteGraphRepository::new(&conn));
    let (a, _, _) = seed_alice(&service);

    let result = service
        .search_by_entity(
            &EntitySearchQuery {
                entity_name: "Alice".to_string(),
                max_depth: 3,
                limit: 1,
            },
            &CancelToken::new(),
        )
        .unwrap();
    assert_eq!(node_ids(&result), HashSet::from([a.id]));
}

#[test]
fn search_rejects_blank_entity_name() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(SqliteGraphRepository::new(&conn));

    let err = service
        .search_by_entity(&EntitySearchQuery::new("   "), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, GraphServiceError::BlankEntityName));
}

#[test]
fn find_path_returns_connected_sequence_from_source_to_target() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(SqliteGraphRepository::new(&conn));

    let nodes = service
        .insert_nodes(&[
            node("Alice", "Person"),
            node("Bob", "Person"),
            node("Carol", "Person"),
        ])
        .unwrap();
    let (a, b, c) = (nodes[0].id, nodes[1].id, nodes[2].id);
    service
        .insert_edges(&[edge(a, b, "KNOWS"), edge(b, c, "KNOWS")])
        .unwrap();

    let path = service.find_path(a, c, 5, &CancelToken::new()).unwrap();
    let path_ids: Vec<GraphNodeId> = path.nodes.iter().map(|node| node.id).collect();
    assert_eq!(path_ids, vec![a, b, c]);
    assert_eq!(path.edges.len(), 2);
    assert!(path.edges[0].touches(a) && path.edges[0].touches(b));
    assert!(path.edges[1].touches(b) && path.edges[1].touches(c));
}

#[test]
fn find_path_respects_depth_bound_and_missing_routes() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(SqliteGraphRepository::new(&conn));

    let nodes = service
        .insert_nodes(&[
            node("Alice", "Person"),
            node("Bob", "Person"),
            node("Carol", "Person"),
            node("Island", "Place"),
        ])
        .unwrap();
    let (a, b, c, island) = (nodes[0].id, nodes[1].id, nodes[2].id, nodes[3].id);
    service
        .insert_edges(&[edge(a, b, "KNOWS"), edge(b, c, "KNOWS")])
        .unwrap();

    let too_shallow = service.find_path(a, c, 1, &CancelToken::new()).unwrap();
    assert!(too_shallow.nodes.is_empty());
    assert!(too_shallow.edges.is_empty());

    let unreachable = service.find_path(a, island, 5, &CancelToken::new()).unwrap();
    assert!(unreachable.nodes.is_empty());
}

#[test]
fn single_unreachable_node_does_not_abort_traversal() {
    let conn = open_db_in_memory().unwrap();
    let seeder = GraphService::new(SqliteGraphRepository::new(&conn));

    let nodes = seeder
        .insert_nodes(&[
            node("Alice", "Person"),
            node("Bob", "Person"),
            node("Acme", "Org"),
            node("Dave", "Person"),
        ])
        .unwrap();
    let (a, b, c, d) = (nodes[0].id, nodes[1].id, nodes[2].id, nodes[3].id);
    seeder
        .insert_edges(&[
            edge(a, b, "KNOWS"),
            edge(a, c, "WORKS_FOR"),
            edge(c, d, "EMPLOYS"),
        ])
        .unwrap();

    let flaky = GraphService::new(FlakyRepo {
        inner: SqliteGraphRepository::new(&conn),
        failing: c,
    });

    let result = flaky
        .search_by_entity(
            &EntitySearchQuery {
                entity_name: "Alice".to_string(),
                max_depth: 2,
                limit: 10,
            },
            &CancelToken::new(),
        )
        .unwrap();

    // Acme's branch (and Dave behind it) drops out; the Bob branch survives.
    assert_eq!(node_ids(&result), HashSet::from([a, b]));
}

#[test]
fn traversals_observe_cancellation() {
    let conn = open_db_in_memory().unwrap();
    let service = GraphService::new(NoAggregateRepo {
        inner: SqliteGraphRepository::new(&conn),
    });
    let (a, b, _) = seed_alice(&service);

    let token = CancelToken::new();
    token.cancel();

    assert!(matches!(
        service.search_by_entity(&EntitySearchQuery::new("Alice"), &token),
        Err(GraphServiceError::Cancelled)
    ));
    assert!(matches!(
        service.neighbors(a.id, 1, &token),
        Err(GraphServiceError::Cancelled)
    ));
    assert!(matches!(
        service.find_path(a.id, b.id, 5, &token),
        Err(GraphServiceError::Cancelled)
    ));
}
