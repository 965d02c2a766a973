//! Hierarchy engine over the chunk forest.
//!
//! # Responsibility
//! - Answer children/sibling/descendant queries with deterministic order.
//! - Keep sibling sequence numbers contiguous across structural mutations.
//!
//! # Invariants
//! - The parent relation stays acyclic; reparenting is cycle-checked.
//! - After every move, BOTH the old and the new sibling set are re-sequenced
//!   to a contiguous `0..k-1` range.
//! - Bulk updates are explicitly non-atomic; a failure leaves the applied
//!   prefix committed.

use crate::model::chunk::{Chunk, ChunkId, TextId};
use crate::repo::chunk_repo::{
    ChunkListQuery, ChunkPatch, ChunkRepository, ParentFilter, RepoError,
};
use crate::service::cancel::CancelToken;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One node of a depth-tagged descendant expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSubtree {
    /// The chunk at this position.
    pub chunk: Chunk,
    /// Depth relative to the expansion root (root = 0).
    pub depth: i64,
    /// Direct children in sibling order.
    pub children: Vec<ChunkSubtree>,
}

/// Request model for reparenting/reordering one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveChunkRequest {
    /// Chunk to move.
    pub chunk_id: ChunkId,
    /// Destination parent. `None` moves the chunk to root level.
    pub new_parent_id: Option<ChunkId>,
    /// Destination sibling index; clamped to the sibling range. `None`
    /// appends at the end.
    pub new_sequence: Option<i64>,
}

/// One entry of a bulk update batch.
#[derive(Debug, Clone, Default)]
pub struct BulkChunkUpdate {
    /// Chunk to update.
    pub chunk_id: ChunkId,
    /// Fields to change.
    pub patch: ChunkPatch,
}

impl BulkChunkUpdate {
    pub fn new(chunk_id: ChunkId, patch: ChunkPatch) -> Self {
        Self { chunk_id, patch }
    }
}

/// Errors from hierarchy operations.
#[derive(Debug)]
pub enum HierarchyServiceError {
    /// Target chunk does not exist.
    ChunkNotFound(ChunkId),
    /// Destination parent does not exist.
    ParentNotFound(ChunkId),
    /// Move would make a chunk its own ancestor.
    CycleDetected {
        chunk_id: ChunkId,
        parent_id: ChunkId,
    },
    /// Caller-requested cancellation observed mid-expansion.
    Cancelled,
    /// Bulk update aborted at `index`; earlier entries stay committed.
    BulkUpdateFailed { index: usize, source: RepoError },
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for HierarchyServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChunkNotFound(id) => write!(f, "chunk not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "parent chunk not found: {id}"),
            Self::CycleDetected {
                chunk_id,
                parent_id,
            } => write!(
                f,
                "move would create cycle: chunk {chunk_id} under parent {parent_id}"
            ),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::BulkUpdateFailed { index, source } => {
                write!(f, "bulk update failed at entry {index}: {source}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for HierarchyServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::BulkUpdateFailed { source, .. } => Some(source),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for HierarchyServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::ChunkNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Hierarchy engine facade.
pub struct HierarchyService<R: ChunkRepository> {
    repo: R,
}

impl<R: ChunkRepository> HierarchyService<R> {
    /// Creates the engine from a repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Lists direct children, ordered by sequence then creation time.
    ///
    /// An unknown parent yields an empty set, not an error.
    pub fn children(&self, parent_id: ChunkId) -> Result<Vec<Chunk>, HierarchyServiceError> {
        let query = ChunkListQuery {
            parent: Some(ParentFilter::Chunk(parent_id)),
            ..ChunkListQuery::default()
        };
        self.repo.list_chunks(&query).map_err(Into::into)
    }

    /// Lists the other chunks sharing this chunk's parent (or, for a root
    /// chunk, its text's root set), same ordering as `children`.
    pub fn siblings(&self, chunk_id: ChunkId) -> Result<Vec<Chunk>, HierarchyServiceError> {
        let chunk = self
            .repo
            .get_chunk(chunk_id)?
            .ok_or(HierarchyServiceError::ChunkNotFound(chunk_id))?;

        let query = match chunk.parent_chunk_id {
            Some(parent_id) => ChunkListQuery {
                parent: Some(ParentFilter::Chunk(parent_id)),
                exclude_id: Some(chunk_id),
                ..ChunkListQuery::default()
            },
            None => ChunkListQuery {
                text_id: Some(chunk.text_id),
                parent: Some(ParentFilter::Root),
                exclude_id: Some(chunk_id),
                ..ChunkListQuery::default()
            },
        };
        self.repo.list_chunks(&query).map_err(Into::into)
    }

    /// Expands the subtree under `root_id` pre-order, tagging each level
    /// with its depth.
    ///
    /// `max_depth <= 0` means unbounded; the acyclic parent relation
    /// guarantees termination.
    pub fn descendants(
        &self,
        root_id: ChunkId,
        max_depth: i64,
        cancel: &CancelToken,
    ) -> Result<ChunkSubtree, HierarchyServiceError> {
        let root = self
            .repo
            .get_chunk(root_id)?
            .ok_or(HierarchyServiceError::ChunkNotFound(root_id))?;
        self.expand_subtree(root, 0, max_depth, cancel)
    }

    /// Moves a chunk to a new parent and/or sibling index.
    ///
    /// Indent level is derived from the destination parent. Both affected
    /// sibling sets are re-sequenced to contiguous `0..k-1`.
    pub fn move_chunk(&self, request: &MoveChunkRequest) -> Result<(), HierarchyServiceError> {
        let chunk = self
            .repo
            .get_chunk(request.chunk_id)?
            .ok_or(HierarchyServiceError::ChunkNotFound(request.chunk_id))?;

        let new_indent = match request.new_parent_id {
            Some(parent_id) => {
                if parent_id == request.chunk_id {
                    return Err(HierarchyServiceError::CycleDetected {
                        chunk_id: request.chunk_id,
                        parent_id,
                    });
                }
                let parent = self
                    .repo
                    .get_chunk(parent_id)?
                    .ok_or(HierarchyServiceError::ParentNotFound(parent_id))?;
                if self.would_create_cycle(request.chunk_id, parent_id)? {
                    return Err(HierarchyServiceError::CycleDetected {
                        chunk_id: request.chunk_id,
                        parent_id,
                    });
                }
                parent.indent_level + 1
            }
            None => 0,
        };

        // Destination placement: remove, clamp, insert, renumber.
        let mut sibling_ids =
            self.sibling_ids(chunk.text_id, request.new_parent_id)?;
        sibling_ids.retain(|id| *id != request.chunk_id);
        let target_index = request
            .new_sequence
            .unwrap_or(sibling_ids.len() as i64)
            .clamp(0, sibling_ids.len() as i64) as usize;
        sibling_ids.insert(target_index, request.chunk_id);

        self.repo.update_chunk(
            request.chunk_id,
            &ChunkPatch {
                parent_chunk_id: Some(request.new_parent_id),
                indent_level: Some(new_indent),
                ..ChunkPatch::default()
            },
        )?;

        for (index, id) in sibling_ids.into_iter().enumerate() {
            self.repo.update_chunk(
                id,
                &ChunkPatch {
                    sequence_number: Some(index as i64),
                    ..ChunkPatch::default()
                },
            )?;
        }

        // The vacated sibling set must close its gap.
        if chunk.parent_chunk_id != request.new_parent_id {
            self.resequence(chunk.text_id, chunk.parent_chunk_id)?;
        }
        Ok(())
    }

    /// Applies independent partial updates in order.
    ///
    /// Not transactional: the first failure aborts the batch and leaves
    /// earlier updates committed.
    pub fn bulk_update(
        &self,
        updates: &[BulkChunkUpdate],
    ) -> Result<(), HierarchyServiceError> {
        for (index, update) in updates.iter().enumerate() {
            self.repo
                .update_chunk(update.chunk_id, &update.patch)
                .map_err(|source| HierarchyServiceError::BulkUpdateFailed { index, source })?;
        }
        Ok(())
    }

    /// Rewrites one sibling set's sequence numbers to contiguous `0..k-1`,
    /// keeping the current order.
    pub fn resequence(
        &self,
        text_id: TextId,
        parent_id: Option<ChunkId>,
    ) -> Result<(), HierarchyServiceError> {
        let query = match parent_id {
            Some(parent_id) => ChunkListQuery {
                parent: Some(ParentFilter::Chunk(parent_id)),
                ..ChunkListQuery::default()
            },
            None => ChunkListQuery {
                text_id: Some(text_id),
                parent: Some(ParentFilter::Root),
                ..ChunkListQuery::default()
            },
        };

        for (index, sibling) in self.repo.list_chunks(&query)?.into_iter().enumerate() {
            if sibling.sequence_number == Some(index as i64) {
                continue;
            }
            self.repo.update_chunk(
                sibling.id,
                &ChunkPatch {
                    sequence_number: Some(index as i64),
                    ..ChunkPatch::default()
                },
            )?;
        }
        Ok(())
    }

    fn expand_subtree(
        &self,
        chunk: Chunk,
        depth: i64,
        max_depth: i64,
        cancel: &CancelToken,
    ) -> Result<ChunkSubtree, HierarchyServiceError> {
        let mut node = ChunkSubtree {
            chunk,
            depth,
            children: Vec::new(),
        };

        if max_depth > 0 && depth >= max_depth {
            return Ok(node);
        }
        if cancel.is_cancelled() {
            return Err(HierarchyServiceError::Cancelled);
        }

        let children = self.children(node.chunk.id)?;
        for child in children {
            node.children
                .push(self.expand_subtree(child, depth + 1, max_depth, cancel)?);
        }
        Ok(node)
    }

    fn sibling_ids(
        &self,
        text_id: TextId,
        parent_id: Option<ChunkId>,
    ) -> Result<Vec<ChunkId>, HierarchyServiceError> {
        let query = match parent_id {
            Some(parent_id) => ChunkListQuery {
                parent: Some(ParentFilter::Chunk(parent_id)),
                ..ChunkListQuery::default()
            },
            None => ChunkListQuery {
                text_id: Some(text_id),
                parent: Some(ParentFilter::Root),
                ..ChunkListQuery::default()
            },
        };
        Ok(self
            .repo
            .list_chunks(&query)?
            .into_iter()
            .map(|chunk| chunk.id)
            .collect())
    }

    fn would_create_cycle(
        &self,
        chunk_id: ChunkId,
        candidate_parent_id: ChunkId,
    ) -> Result<bool, HierarchyServiceError> {
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate_parent_id);
        while let Some(current) = cursor {
            if current == chunk_id {
                return Ok(true);
            }
            if !visited.insert(current) {
                return Ok(true);
            }

            let node = self
                .repo
                .get_chunk(current)?
                .ok_or(HierarchyServiceError::ParentNotFound(current))?;
            cursor = node.parent_chunk_id;
        }
        Ok(false)
    }
}
