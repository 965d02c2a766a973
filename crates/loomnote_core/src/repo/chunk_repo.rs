//! Chunk repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the narrow storage primitives for chunk records: point get,
//!   filtered list, insert (single/batch), update-by-ID, delete-by-ID.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths must call `Chunk::validate()` before SQL mutations.
//! - Read paths must reject invalid persisted state instead of masking it.
//! - Deletes cascade to descendants through the store's referential rules.

use crate::db::DbError;
use crate::model::chunk::{Chunk, ChunkId, ChunkValidationError, MetadataMap, TextId};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const CHUNK_SELECT_SQL: &str = "SELECT
    id,
    text_id,
    content,
    is_template,
    is_slot,
    parent_chunk_id,
    template_chunk_id,
    slot_value,
    indent_level,
    sequence_number,
    metadata,
    created_at,
    updated_at
FROM chunks";

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for chunk/text persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ChunkValidationError),
    Db(DbError),
    NotFound(Uuid),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ChunkValidationError> for RepoError {
    fn from(value: ChunkValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Parent constraint for chunk list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentFilter {
    /// Only root-level chunks (`parent_chunk_id IS NULL`).
    Root,
    /// Only direct children of one chunk.
    Chunk(ChunkId),
}

/// Result ordering for chunk list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChunkOrder {
    /// Sibling order: sequence number, then creation time.
    #[default]
    SequenceThenCreated,
    /// Newest first.
    CreatedDesc,
}

/// Equality filters + ordering + limit for listing chunks.
#[derive(Debug, Clone, Default)]
pub struct ChunkListQuery {
    pub text_id: Option<TextId>,
    pub parent: Option<ParentFilter>,
    pub template_chunk_id: Option<ChunkId>,
    pub is_template: Option<bool>,
    pub is_slot: Option<bool>,
    pub sequence_number: Option<i64>,
    /// Excludes one id from the result (sibling queries).
    pub exclude_id: Option<ChunkId>,
    pub order: ChunkOrder,
    pub limit: Option<u32>,
}

/// Partial update for one chunk.
///
/// Outer `None` leaves a field unchanged; for nullable columns the inner
/// `None` clears the stored value.
#[derive(Debug, Clone, Default)]
pub struct ChunkPatch {
    pub content: Option<String>,
    pub parent_chunk_id: Option<Option<ChunkId>>,
    pub sequence_number: Option<i64>,
    pub indent_level: Option<i64>,
    pub slot_value: Option<Option<String>>,
    pub metadata: Option<MetadataMap>,
}

/// Repository interface for chunk storage primitives.
pub trait ChunkRepository {
    /// Persists one chunk and returns the stored row (timestamps assigned).
    fn insert_chunk(&self, chunk: &Chunk) -> RepoResult<Chunk>;
    /// Persists a batch of chunks; no-op on empty input.
    fn insert_chunks(&self, chunks: &[Chunk]) -> RepoResult<Vec<Chunk>>;
    /// Loads one chunk by id. Absence is `Ok(None)`, not an error.
    fn get_chunk(&self, id: ChunkId) -> RepoResult<Option<Chunk>>;
    /// Loads the oldest chunk with exactly this content, if any.
    fn get_chunk_by_content(&self, content: &str) -> RepoResult<Option<Chunk>>;
    /// Lists chunks matching equality filters.
    fn list_chunks(&self, query: &ChunkListQuery) -> RepoResult<Vec<Chunk>>;
    /// Applies a partial update to one chunk.
    fn update_chunk(&self, id: ChunkId, patch: &ChunkPatch) -> RepoResult<()>;
    /// Deletes one chunk; descendants cascade.
    fn delete_chunk(&self, id: ChunkId) -> RepoResult<()>;
}

/// SQLite-backed chunk repository.
pub struct SqliteChunkRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteChunkRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ChunkRepository for SqliteChunkRepository<'_> {
    fn insert_chunk(&self, chunk: &Chunk) -> RepoResult<Chunk> {
        chunk.validate()?;

        let now = now_epoch_ms();
        let metadata = encode_metadata(&chunk.metadata)?;
        self.conn.execute(
            "INSERT INTO chunks (
                id,
                text_id,
                content,
                is_template,
                is_slot,
                parent_chunk_id,
                template_chunk_id,
                slot_value,
                indent_level,
                sequence_number,
                metadata,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
            rusqlite::params![
                chunk.id.to_string(),
                chunk.text_id.to_string(),
                chunk.content.as_str(),
                bool_to_int(chunk.is_template),
                bool_to_int(chunk.is_slot),
                chunk.parent_chunk_id.map(|value| value.to_string()),
                chunk.template_chunk_id.map(|value| value.to_string()),
                chunk.slot_value.as_deref(),
                chunk.indent_level,
                chunk.sequence_number,
                metadata,
                now,
                now,
            ],
        )?;

        let mut stored = chunk.clone();
        stored.created_at = now;
        stored.updated_at = now;
        Ok(stored)
    }

    fn insert_chunks(&self, chunks: &[Chunk]) -> RepoResult<Vec<Chunk>> {
        let mut stored = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            stored.push(self.insert_chunk(chunk)?);
        }
        Ok(stored)
    }

    fn get_chunk(&self, id: ChunkId) -> RepoResult<Option<Chunk>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CHUNK_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_chunk_row(row)?));
        }
        Ok(None)
    }

    fn get_chunk_by_content(&self, content: &str) -> RepoResult<Option<Chunk>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CHUNK_SELECT_SQL}
             WHERE content = ?1
             ORDER BY created_at ASC, id ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query([content])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_chunk_row(row)?));
        }
        Ok(None)
    }

    fn list_chunks(&self, query: &ChunkListQuery) -> RepoResult<Vec<Chunk>> {
        let mut sql = format!("{CHUNK_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(text_id) = query.text_id {
            sql.push_str(" AND text_id = ?");
            bind_values.push(Value::Text(text_id.to_string()));
        }

        match query.parent {
            None => {}
            Some(ParentFilter::Root) => sql.push_str(" AND parent_chunk_id IS NULL"),
            Some(ParentFilter::Chunk(parent_id)) => {
                sql.push_str(" AND parent_chunk_id = ?");
                bind_values.push(Value::Text(parent_id.to_string()));
            }
        }

        if let Some(template_id) = query.template_chunk_id {
            sql.push_str(" AND template_chunk_id = ?");
            bind_values.push(Value::Text(template_id.to_string()));
        }

        if let Some(is_template) = query.is_template {
            sql.push_str(" AND is_template = ?");
            bind_values.push(Value::Integer(bool_to_int(is_template)));
        }

        if let Some(is_slot) = query.is_slot {
            sql.push_str(" AND is_slot = ?");
            bind_values.push(Value::Integer(bool_to_int(is_slot)));
        }

        if let Some(sequence) = query.sequence_number {
            sql.push_str(" AND sequence_number = ?");
            bind_values.push(Value::Integer(sequence));
        }

        if let Some(exclude_id) = query.exclude_id {
            sql.push_str(" AND id <> ?");
            bind_values.push(Value::Text(exclude_id.to_string()));
        }

        match query.order {
            ChunkOrder::SequenceThenCreated => {
                sql.push_str(" ORDER BY sequence_number ASC, created_at ASC, id ASC");
            }
            ChunkOrder::CreatedDesc => sql.push_str(" ORDER BY created_at DESC, id ASC"),
        }

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut chunks = Vec::new();
        while let Some(row) = rows.next()? {
            chunks.push(parse_chunk_row(row)?);
        }
        Ok(chunks)
    }

    fn update_chunk(&self, id: ChunkId, patch: &ChunkPatch) -> RepoResult<()> {
        let mut assignments = vec!["updated_at = (strftime('%s', 'now') * 1000)".to_string()];
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(content) = &patch.content {
            assignments.push("content = ?".to_string());
            bind_values.push(Value::Text(content.clone()));
        }
        if let Some(parent) = &patch.parent_chunk_id {
            assignments.push("parent_chunk_id = ?".to_string());
            bind_values.push(match parent {
                Some(parent_id) => Value::Text(parent_id.to_string()),
                None => Value::Null,
            });
        }
        if let Some(sequence) = patch.sequence_number {
            assignments.push("sequence_number = ?".to_string());
            bind_values.push(Value::Integer(sequence));
        }
        if let Some(indent) = patch.indent_level {
            assignments.push("indent_level = ?".to_string());
            bind_values.push(Value::Integer(indent));
        }
        if let Some(slot_value) = &patch.slot_value {
            assignments.push("slot_value = ?".to_string());
            bind_values.push(match slot_value {
                Some(value) => Value::Text(value.clone()),
                None => Value::Null,
            });
        }
        if let Some(metadata) = &patch.metadata {
            assignments.push("metadata = ?".to_string());
            bind_values.push(Value::Text(encode_metadata(metadata)?));
        }

        let sql = format!("UPDATE chunks SET {} WHERE id = ?;", assignments.join(", "));
        bind_values.push(Value::Text(id.to_string()));

        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn delete_chunk(&self, id: ChunkId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM chunks WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }
}

fn parse_chunk_row(row: &Row<'_>) -> RepoResult<Chunk> {
    let id = parse_uuid_column(row, "id")?;
    let text_id = parse_uuid_column(row, "text_id")?;
    let parent_chunk_id = parse_optional_uuid_column(row, "parent_chunk_id")?;
    let template_chunk_id = parse_optional_uuid_column(row, "template_chunk_id")?;

    let metadata_text: String = row.get("metadata")?;
    let metadata: MetadataMap = serde_json::from_str(&metadata_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid metadata JSON in chunks.metadata: {err}"))
    })?;

    let chunk = Chunk {
        id,
        text_id,
        content: row.get("content")?,
        is_template: int_to_bool(row.get("is_template")?, "chunks.is_template")?,
        is_slot: int_to_bool(row.get("is_slot")?, "chunks.is_slot")?,
        parent_chunk_id,
        template_chunk_id,
        slot_value: row.get("slot_value")?,
        indent_level: row.get("indent_level")?,
        sequence_number: row.get("sequence_number")?,
        metadata,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    chunk.validate()?;
    Ok(chunk)
}

fn parse_uuid_column(row: &Row<'_>, column: &'static str) -> RepoResult<Uuid> {
    let value: String = row.get(column)?;
    parse_uuid(&value, column)
}

fn parse_optional_uuid_column(row: &Row<'_>, column: &'static str) -> RepoResult<Option<Uuid>> {
    row.get::<_, Option<String>>(column)?
        .map(|value| parse_uuid(&value, column))
        .transpose()
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn encode_metadata(metadata: &MetadataMap) -> RepoResult<String> {
    serde_json::to_string(metadata)
        .map_err(|err| RepoError::InvalidData(format!("unencodable metadata map: {err}")))
}

pub(crate) fn int_to_bool(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
