//! Tag link repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist chunk-to-tag-chunk associations.
//! - Keep link idempotency inside the repository boundary.
//!
//! # Invariants
//! - At most one link per `(chunk, tag_chunk)` pair.
//! - Links disappear with either side through cascade rules.

use crate::model::chunk::ChunkId;
use crate::repo::chunk_repo::{parse_uuid, RepoResult};
use rusqlite::Connection;
use uuid::Uuid;

/// Repository interface for tag link storage primitives.
pub trait TagRepository {
    /// Associates a chunk with a tag chunk; repeated links are no-ops.
    fn link_tag(&self, chunk_id: ChunkId, tag_chunk_id: ChunkId) -> RepoResult<()>;
    /// Removes one association; removing a missing link is a no-op.
    fn unlink_tag(&self, chunk_id: ChunkId, tag_chunk_id: ChunkId) -> RepoResult<()>;
    /// Lists tag chunk ids attached to one chunk, oldest link first.
    fn tag_chunk_ids(&self, chunk_id: ChunkId) -> RepoResult<Vec<ChunkId>>;
    /// Lists chunk ids carrying one tag chunk, oldest link first.
    fn tagged_chunk_ids(&self, tag_chunk_id: ChunkId) -> RepoResult<Vec<ChunkId>>;
}

/// SQLite-backed tag link repository.
pub struct SqliteTagRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTagRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn link_ids(&self, filter_column: &str, value: ChunkId, select_column: &str) -> RepoResult<Vec<ChunkId>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {select_column}
             FROM chunk_tags
             WHERE {filter_column} = ?1
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([value.to_string()])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get(0)?;
            ids.push(parse_uuid(&id_text, "chunk_tags")?);
        }
        Ok(ids)
    }
}

impl TagRepository for SqliteTagRepository<'_> {
    fn link_tag(&self, chunk_id: ChunkId, tag_chunk_id: ChunkId) -> RepoResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO chunk_tags (id, chunk_id, tag_chunk_id)
             VALUES (?1, ?2, ?3);",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                chunk_id.to_string(),
                tag_chunk_id.to_string(),
            ],
        )?;
        Ok(())
    }

    fn unlink_tag(&self, chunk_id: ChunkId, tag_chunk_id: ChunkId) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM chunk_tags WHERE chunk_id = ?1 AND tag_chunk_id = ?2;",
            rusqlite::params![chunk_id.to_string(), tag_chunk_id.to_string()],
        )?;
        Ok(())
    }

    fn tag_chunk_ids(&self, chunk_id: ChunkId) -> RepoResult<Vec<ChunkId>> {
        self.link_ids("chunk_id", chunk_id, "tag_chunk_id")
    }

    fn tagged_chunk_ids(&self, tag_chunk_id: ChunkId) -> RepoResult<Vec<ChunkId>> {
        self.link_ids("tag_chunk_id", tag_chunk_id, "chunk_id")
    }
}
