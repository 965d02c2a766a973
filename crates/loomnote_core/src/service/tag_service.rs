//! Tag use-case service.
//!
//! # Responsibility
//! - Model tags as ordinary chunks found or created by content.
//! - Maintain chunk-to-tag associations through the link repository.
//!
//! # Invariants
//! - Tag content is trimmed; blank tags are rejected.
//! - Linking the same tag twice is a no-op.
//! - An unknown tag content yields an empty result, not an error.

use crate::model::chunk::{Chunk, ChunkId};
use crate::repo::chunk_repo::{ChunkRepository, RepoError};
use crate::repo::tag_repo::TagRepository;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from tag operations.
#[derive(Debug)]
pub enum TagServiceError {
    /// Tag content is blank after trim.
    BlankTag,
    /// Target chunk does not exist.
    ChunkNotFound(ChunkId),
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for TagServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTag => write!(f, "tag content must not be blank"),
            Self::ChunkNotFound(id) => write!(f, "chunk not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TagServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TagServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Tag engine facade.
pub struct TagService<C: ChunkRepository, L: TagRepository> {
    chunks: C,
    links: L,
}

impl<C: ChunkRepository, L: TagRepository> TagService<C, L> {
    /// Creates the service from repository implementations.
    pub fn new(chunks: C, links: L) -> Self {
        Self { chunks, links }
    }

    /// Tags one chunk, creating the tag chunk on first use.
    ///
    /// The tag chunk lives in the tagged chunk's text. Returns the tag
    /// chunk; repeated calls with the same content reuse it.
    pub fn add_tag(
        &self,
        chunk_id: ChunkId,
        tag_content: &str,
    ) -> Result<Chunk, TagServiceError> {
        let trimmed = tag_content.trim();
        if trimmed.is_empty() {
            return Err(TagServiceError::BlankTag);
        }

        let target = self
            .chunks
            .get_chunk(chunk_id)?
            .ok_or(TagServiceError::ChunkNotFound(chunk_id))?;

        let tag_chunk = match self.chunks.get_chunk_by_content(trimmed)? {
            Some(existing) => existing,
            None => self
                .chunks
                .insert_chunk(&Chunk::new(target.text_id, trimmed))?,
        };

        self.links.link_tag(chunk_id, tag_chunk.id)?;
        Ok(tag_chunk)
    }

    /// Removes one tag association; removing an absent link is a no-op.
    pub fn remove_tag(
        &self,
        chunk_id: ChunkId,
        tag_chunk_id: ChunkId,
    ) -> Result<(), TagServiceError> {
        self.links
            .unlink_tag(chunk_id, tag_chunk_id)
            .map_err(Into::into)
    }

    /// Lists the tag chunks attached to one chunk.
    pub fn chunk_tags(&self, chunk_id: ChunkId) -> Result<Vec<Chunk>, TagServiceError> {
        self.chunks
            .get_chunk(chunk_id)?
            .ok_or(TagServiceError::ChunkNotFound(chunk_id))?;

        let mut tags = Vec::new();
        for tag_chunk_id in self.links.tag_chunk_ids(chunk_id)? {
            if let Some(tag_chunk) = self.chunks.get_chunk(tag_chunk_id)? {
                tags.push(tag_chunk);
            }
        }
        Ok(tags)
    }

    /// Lists the chunks carrying one tag content.
    ///
    /// An unknown tag yields an empty set.
    pub fn chunks_by_tag(&self, tag_content: &str) -> Result<Vec<Chunk>, TagServiceError> {
        let trimmed = tag_content.trim();
        if trimmed.is_empty() {
            return Err(TagServiceError::BlankTag);
        }

        let Some(tag_chunk) = self.chunks.get_chunk_by_content(trimmed)? else {
            return Ok(Vec::new());
        };

        let mut chunks = Vec::new();
        for chunk_id in self.links.tagged_chunk_ids(tag_chunk.id)? {
            if let Some(chunk) = self.chunks.get_chunk(chunk_id)? {
                chunks.push(chunk);
            }
        }
        Ok(chunks)
    }
}
