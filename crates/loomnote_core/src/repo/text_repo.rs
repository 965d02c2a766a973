//! Text document repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide persistence for the documents owning the chunk forest.
//! - Keep pagination and status encoding inside the repository boundary.
//!
//! # Invariants
//! - Deleting a text removes every chunk it owns (cascade).
//! - List ordering is deterministic: `created_at DESC, id ASC`.

use crate::model::chunk::{TextId, TextRecord, TextStatus};
use crate::repo::chunk_repo::{now_epoch_ms, parse_uuid, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

const TEXT_SELECT_SQL: &str = "SELECT
    id,
    title,
    content,
    status,
    created_at,
    updated_at
FROM texts";

const DEFAULT_PAGE_SIZE: u32 = 20;
const PAGE_SIZE_MAX: u32 = 100;

/// Pagination options for listing texts. Pages are 1-based.
#[derive(Debug, Clone, Copy)]
pub struct TextPageQuery {
    pub page: u32,
    pub page_size: u32,
}

impl Default for TextPageQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of text records plus the total row count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPage {
    pub texts: Vec<TextRecord>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Partial update for one text record.
#[derive(Debug, Clone, Default)]
pub struct TextPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: Option<TextStatus>,
}

/// Repository interface for text document storage primitives.
pub trait TextRepository {
    /// Persists one text record and returns the stored row.
    fn insert_text(&self, text: &TextRecord) -> RepoResult<TextRecord>;
    /// Loads one text by id. Absence is `Ok(None)`, not an error.
    fn get_text(&self, id: TextId) -> RepoResult<Option<TextRecord>>;
    /// Lists texts, newest first, with pagination.
    fn list_texts(&self, query: &TextPageQuery) -> RepoResult<TextPage>;
    /// Applies a partial update to one text.
    fn update_text(&self, id: TextId, patch: &TextPatch) -> RepoResult<()>;
    /// Deletes one text; owned chunks cascade.
    fn delete_text(&self, id: TextId) -> RepoResult<()>;
}

/// SQLite-backed text repository.
pub struct SqliteTextRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTextRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TextRepository for SqliteTextRepository<'_> {
    fn insert_text(&self, text: &TextRecord) -> RepoResult<TextRecord> {
        let now = now_epoch_ms();
        self.conn.execute(
            "INSERT INTO texts (id, title, content, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            rusqlite::params![
                text.id.to_string(),
                text.title.as_str(),
                text.content.as_str(),
                text_status_to_db(text.status),
                now,
                now,
            ],
        )?;

        let mut stored = text.clone();
        stored.created_at = now;
        stored.updated_at = now;
        Ok(stored)
    }

    fn get_text(&self, id: TextId) -> RepoResult<Option<TextRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TEXT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_text_row(row)?));
        }
        Ok(None)
    }

    fn list_texts(&self, query: &TextPageQuery) -> RepoResult<TextPage> {
        let page = query.page.max(1);
        let page_size = query.page_size.clamp(1, PAGE_SIZE_MAX);
        let offset = u64::from(page - 1) * u64::from(page_size);

        let total: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM texts;", [], |row| {
                row.get::<_, i64>(0)
            })?
            .max(0) as u64;

        let mut stmt = self.conn.prepare(&format!(
            "{TEXT_SELECT_SQL}
             ORDER BY created_at DESC, id ASC
             LIMIT ?1 OFFSET ?2;"
        ))?;
        let mut rows = stmt.query(rusqlite::params![i64::from(page_size), offset as i64])?;
        let mut texts = Vec::new();
        while let Some(row) = rows.next()? {
            texts.push(parse_text_row(row)?);
        }

        Ok(TextPage {
            texts,
            total,
            page,
            page_size,
        })
    }

    fn update_text(&self, id: TextId, patch: &TextPatch) -> RepoResult<()> {
        let mut assignments = vec!["updated_at = (strftime('%s', 'now') * 1000)".to_string()];
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(title) = &patch.title {
            assignments.push("title = ?".to_string());
            bind_values.push(Value::Text(title.clone()));
        }
        if let Some(content) = &patch.content {
            assignments.push("content = ?".to_string());
            bind_values.push(Value::Text(content.clone()));
        }
        if let Some(status) = patch.status {
            assignments.push("status = ?".to_string());
            bind_values.push(Value::Text(text_status_to_db(status).to_string()));
        }

        let sql = format!("UPDATE texts SET {} WHERE id = ?;", assignments.join(", "));
        bind_values.push(Value::Text(id.to_string()));

        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn delete_text(&self, id: TextId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM texts WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }
}

fn parse_text_row(row: &Row<'_>) -> RepoResult<TextRecord> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "texts.id")?;

    let status_text: String = row.get("status")?;
    let status = parse_text_status(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid text status `{status_text}` in texts.status"))
    })?;

    Ok(TextRecord {
        id,
        title: row.get("title")?,
        content: row.get("content")?,
        status,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn text_status_to_db(status: TextStatus) -> &'static str {
    match status {
        TextStatus::Pending => "pending",
        TextStatus::Processing => "processing",
        TextStatus::Completed => "completed",
        TextStatus::Failed => "failed",
    }
}

fn parse_text_status(value: &str) -> Option<TextStatus> {
    match value {
        "pending" => Some(TextStatus::Pending),
        "processing" => Some(TextStatus::Processing),
        "completed" => Some(TextStatus::Completed),
        "failed" => Some(TextStatus::Failed),
        _ => None,
    }
}
