//! Core domain logic for loomnote.
//! This crate is the single source of truth for business invariants over
//! the chunk forest, the template/slot encoding, and the knowledge graph.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::chunk::{
    slot_content, slot_display_name, template_content, template_display_name, Chunk, ChunkId,
    ChunkValidationError, MetadataMap, TextId, TextRecord, TextStatus, SLOT_MARKER,
    TEMPLATE_MARKER,
};
pub use model::graph::{
    GraphEdge, GraphEdgeId, GraphNode, GraphNodeId, NewGraphEdge, NewGraphNode, PropertyMap,
    Subgraph,
};
pub use repo::chunk_repo::{
    ChunkListQuery, ChunkOrder, ChunkPatch, ChunkRepository, ParentFilter, RepoError, RepoResult,
    SqliteChunkRepository,
};
pub use repo::graph_repo::{GraphRepoError, GraphRepoResult, GraphRepository, SqliteGraphRepository};
pub use repo::tag_repo::{SqliteTagRepository, TagRepository};
pub use repo::text_repo::{
    SqliteTextRepository, TextPage, TextPageQuery, TextPatch, TextRepository,
};
pub use service::cancel::CancelToken;
pub use service::chunk_service::{ChunkService, ChunkServiceError, NewChunkRequest, TextDetail};
pub use service::graph_service::{EntitySearchQuery, GraphService, GraphServiceError};
pub use service::hierarchy_service::{
    BulkChunkUpdate, ChunkSubtree, HierarchyService, HierarchyServiceError, MoveChunkRequest,
};
pub use service::tag_service::{TagService, TagServiceError};
pub use service::template_service::{
    TemplateDetail, TemplateInstance, TemplateService, TemplateServiceError, TemplateWithSlots,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
