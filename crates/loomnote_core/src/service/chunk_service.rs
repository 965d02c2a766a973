//! Text/chunk storage use-case service.
//!
//! # Responsibility
//! - Provide stable CRUD entry points over texts and raw chunks.
//! - Assign sibling sequence numbers and indent levels on insert.
//!
//! # Invariants
//! - Newly inserted chunks are appended at the end of their sibling set.
//! - Service APIs never bypass repository validation contracts.
//! - Deletes rely on the store's cascade rules for descendants.

use crate::model::chunk::{Chunk, ChunkId, MetadataMap, TextId, TextRecord, TextStatus};
use crate::repo::chunk_repo::{
    ChunkListQuery, ChunkPatch, ChunkRepository, ParentFilter, RepoError,
};
use crate::repo::text_repo::{TextPage, TextPageQuery, TextPatch, TextRepository};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Request model for creating one chunk.
#[derive(Debug, Clone, Default)]
pub struct NewChunkRequest {
    /// Owning text document.
    pub text_id: TextId,
    /// Chunk body.
    pub content: String,
    /// Optional parent; `None` creates a root-level chunk.
    pub parent_chunk_id: Option<ChunkId>,
    /// Free-form metadata.
    pub metadata: MetadataMap,
}

/// Text record together with its chunk forest, in sibling order.
#[derive(Debug, Clone, PartialEq)]
pub struct TextDetail {
    pub text: TextRecord,
    pub chunks: Vec<Chunk>,
}

/// Errors from text/chunk storage use cases.
#[derive(Debug)]
pub enum ChunkServiceError {
    /// Text content is blank after trim.
    BlankTextContent,
    /// Target text does not exist.
    TextNotFound(TextId),
    /// Target chunk does not exist.
    ChunkNotFound(ChunkId),
    /// Requested parent does not exist.
    ParentNotFound(ChunkId),
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for ChunkServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTextContent => write!(f, "text content must not be blank"),
            Self::TextNotFound(id) => write!(f, "text not found: {id}"),
            Self::ChunkNotFound(id) => write!(f, "chunk not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "parent chunk not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ChunkServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ChunkServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Text/chunk storage facade.
pub struct ChunkService<C: ChunkRepository, T: TextRepository> {
    chunks: C,
    texts: T,
}

impl<C: ChunkRepository, T: TextRepository> ChunkService<C, T> {
    /// Creates the service from repository implementations.
    pub fn new(chunks: C, texts: T) -> Self {
        Self { chunks, texts }
    }

    /// Creates a text document in `Pending` status.
    pub fn create_text(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<TextRecord, ChunkServiceError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ChunkServiceError::BlankTextContent);
        }
        self.texts
            .insert_text(&TextRecord::new(title, content))
            .map_err(Into::into)
    }

    /// Loads one text by id.
    pub fn get_text(&self, id: TextId) -> Result<Option<TextRecord>, ChunkServiceError> {
        self.texts.get_text(id).map_err(Into::into)
    }

    /// Loads one text together with all of its chunks in sibling order.
    pub fn text_detail(&self, id: TextId) -> Result<TextDetail, ChunkServiceError> {
        let text = self
            .texts
            .get_text(id)?
            .ok_or(ChunkServiceError::TextNotFound(id))?;
        let chunks = self.chunks.list_chunks(&ChunkListQuery {
            text_id: Some(id),
            ..ChunkListQuery::default()
        })?;
        Ok(TextDetail { text, chunks })
    }

    /// Lists texts, newest first.
    pub fn list_texts(&self, query: &TextPageQuery) -> Result<TextPage, ChunkServiceError> {
        self.texts.list_texts(query).map_err(Into::into)
    }

    /// Applies a partial update to one text.
    pub fn update_text(&self, id: TextId, patch: &TextPatch) -> Result<(), ChunkServiceError> {
        self.texts.update_text(id, patch).map_err(|err| match err {
            RepoError::NotFound(_) => ChunkServiceError::TextNotFound(id),
            other => other.into(),
        })
    }

    /// Marks one text's processing status.
    pub fn set_text_status(
        &self,
        id: TextId,
        status: TextStatus,
    ) -> Result<(), ChunkServiceError> {
        self.update_text(
            id,
            &TextPatch {
                status: Some(status),
                ..TextPatch::default()
            },
        )
    }

    /// Deletes one text; its chunks cascade.
    pub fn delete_text(&self, id: TextId) -> Result<(), ChunkServiceError> {
        self.texts.delete_text(id).map_err(|err| match err {
            RepoError::NotFound(_) => ChunkServiceError::TextNotFound(id),
            other => other.into(),
        })
    }

    /// Creates one chunk appended at the end of its sibling set.
    pub fn create_chunk(&self, request: &NewChunkRequest) -> Result<Chunk, ChunkServiceError> {
        self.texts
            .get_text(request.text_id)?
            .ok_or(ChunkServiceError::TextNotFound(request.text_id))?;

        let (indent_level, sequence_query) = match request.parent_chunk_id {
            Some(parent_id) => {
                let parent = self
                    .chunks
                    .get_chunk(parent_id)?
                    .ok_or(ChunkServiceError::ParentNotFound(parent_id))?;
                (
                    parent.indent_level + 1,
                    ChunkListQuery {
                        parent: Some(ParentFilter::Chunk(parent_id)),
                        ..ChunkListQuery::default()
                    },
                )
            }
            None => (
                0,
                ChunkListQuery {
                    text_id: Some(request.text_id),
                    parent: Some(ParentFilter::Root),
                    ..ChunkListQuery::default()
                },
            ),
        };

        let next_sequence = self
            .chunks
            .list_chunks(&sequence_query)?
            .iter()
            .filter_map(|sibling| sibling.sequence_number)
            .max()
            .map_or(0, |max| max + 1);

        let mut chunk = Chunk::new(request.text_id, request.content.clone());
        chunk.parent_chunk_id = request.parent_chunk_id;
        chunk.indent_level = indent_level;
        chunk.sequence_number = Some(next_sequence);
        chunk.metadata = request.metadata.clone();
        self.chunks.insert_chunk(&chunk).map_err(Into::into)
    }

    /// Loads one chunk by id.
    pub fn get_chunk(&self, id: ChunkId) -> Result<Option<Chunk>, ChunkServiceError> {
        self.chunks.get_chunk(id).map_err(Into::into)
    }

    /// Overwrites one chunk's content.
    pub fn update_chunk_content(
        &self,
        id: ChunkId,
        content: impl Into<String>,
    ) -> Result<(), ChunkServiceError> {
        self.chunks
            .update_chunk(
                id,
                &ChunkPatch {
                    content: Some(content.into()),
                    ..ChunkPatch::default()
                },
            )
            .map_err(|err| match err {
                RepoError::NotFound(_) => ChunkServiceError::ChunkNotFound(id),
                other => other.into(),
            })
    }

    /// Deletes one chunk; descendants cascade.
    pub fn delete_chunk(&self, id: ChunkId) -> Result<(), ChunkServiceError> {
        self.chunks.delete_chunk(id).map_err(|err| match err {
            RepoError::NotFound(_) => ChunkServiceError::ChunkNotFound(id),
            other => other.into(),
        })
    }
}
