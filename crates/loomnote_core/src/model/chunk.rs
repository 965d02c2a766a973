//! Chunk domain model.
//!
//! # Responsibility
//! - Define the canonical record for hierarchical text chunks.
//! - Encode the template/slot conventions (reserved `#` marker).
//! - Provide structural validation for write paths.
//!
//! # Invariants
//! - `id` is stable and never reused for another chunk.
//! - A chunk is never both template and slot.
//! - A slot chunk always carries both parent and template reference.
//! - Sequence numbers are contiguous `0..k-1` within one sibling set after
//!   any structural mutation (enforced by the hierarchy layer).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for every chunk in the forest.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type ChunkId = Uuid;

/// Stable identifier for the text document owning a chunk.
pub type TextId = Uuid;

/// Free-form string-keyed map of JSON-representable values.
pub type MetadataMap = BTreeMap<String, serde_json::Value>;

/// Reserved suffix marking a template chunk's content (`{name}#template`).
pub const TEMPLATE_MARKER: &str = "#template";

/// Reserved prefix marking a slot chunk's content (`#{slot_name}`).
pub const SLOT_MARKER: &str = "#";

/// Lifecycle status of a text document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextStatus {
    /// Created, chunks not yet attached.
    Pending,
    /// Chunking in progress.
    Processing,
    /// Fully chunked and usable.
    Completed,
    /// Processing failed; chunks may be partial.
    Failed,
}

/// Text document owning a set of chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRecord {
    /// Stable document id.
    pub id: TextId,
    /// User-facing title.
    pub title: String,
    /// Raw document body.
    pub content: String,
    /// Processing status.
    pub status: TextStatus,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
}

impl TextRecord {
    /// Creates a new text record with a generated stable ID.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            status: TextStatus::Pending,
            created_at: 0,
            updated_at: 0,
        }
    }
}

/// Structural validation failures for chunk records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkValidationError {
    /// `is_template` and `is_slot` are mutually exclusive.
    TemplateAndSlot(ChunkId),
    /// A slot chunk must have a parent (its template).
    SlotWithoutParent(ChunkId),
    /// A slot chunk must reference its owning template.
    SlotWithoutTemplateRef(ChunkId),
    /// Indent level must be non-negative.
    NegativeIndent(ChunkId),
    /// Sequence number must be non-negative when present.
    NegativeSequence(ChunkId),
}

impl Display for ChunkValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TemplateAndSlot(id) => {
                write!(f, "chunk cannot be both template and slot: {id}")
            }
            Self::SlotWithoutParent(id) => write!(f, "slot chunk has no parent: {id}"),
            Self::SlotWithoutTemplateRef(id) => {
                write!(f, "slot chunk has no template reference: {id}")
            }
            Self::NegativeIndent(id) => write!(f, "chunk has negative indent level: {id}"),
            Self::NegativeSequence(id) => write!(f, "chunk has negative sequence number: {id}"),
        }
    }
}

impl Error for ChunkValidationError {}

/// Canonical record for one node in the chunk forest.
///
/// Parent linkage is an ID reference, not a live pointer; child enumeration
/// is a filtered scan by `parent_chunk_id` at the repository layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable global id used for linking and auditing.
    pub id: ChunkId,
    /// Owning text document.
    pub text_id: TextId,
    /// Textual content (template/slot chunks carry marker conventions).
    pub content: String,
    /// Marks a reusable record schema root.
    pub is_template: bool,
    /// Marks a named placeholder under a template.
    pub is_slot: bool,
    /// Parent chunk. `None` means root-level within the owning text.
    pub parent_chunk_id: Option<ChunkId>,
    /// Template this chunk is defined by (slot) or instantiates (instance,
    /// slot-value).
    pub template_chunk_id: Option<ChunkId>,
    /// Filled-in value; present only on slot-value chunks.
    pub slot_value: Option<String>,
    /// Indentation depth, `0` at root level.
    pub indent_level: i64,
    /// Order key within one sibling set; unique among siblings.
    pub sequence_number: Option<i64>,
    /// Free-form metadata.
    pub metadata: MetadataMap,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
}

impl Chunk {
    /// Creates a new root-level chunk with a generated stable ID.
    pub fn new(text_id: TextId, content: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), text_id, content)
    }

    /// Creates a new chunk with a caller-provided stable ID.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(id: ChunkId, text_id: TextId, content: impl Into<String>) -> Self {
        Self {
            id,
            text_id,
            content: content.into(),
            is_template: false,
            is_slot: false,
            parent_chunk_id: None,
            template_chunk_id: None,
            slot_value: None,
            indent_level: 0,
            sequence_number: None,
            metadata: MetadataMap::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Checks structural invariants before persistence.
    pub fn validate(&self) -> Result<(), ChunkValidationError> {
        if self.is_template && self.is_slot {
            return Err(ChunkValidationError::TemplateAndSlot(self.id));
        }
        if self.is_slot {
            if self.parent_chunk_id.is_none() {
                return Err(ChunkValidationError::SlotWithoutParent(self.id));
            }
            if self.template_chunk_id.is_none() {
                return Err(ChunkValidationError::SlotWithoutTemplateRef(self.id));
            }
        }
        if self.indent_level < 0 {
            return Err(ChunkValidationError::NegativeIndent(self.id));
        }
        if matches!(self.sequence_number, Some(sequence) if sequence < 0) {
            return Err(ChunkValidationError::NegativeSequence(self.id));
        }
        Ok(())
    }

    /// Returns whether this chunk realizes a template (references one while
    /// being neither template nor slot itself).
    pub fn is_instance(&self) -> bool {
        self.template_chunk_id.is_some() && !self.is_template && !self.is_slot
    }
}

/// Builds template chunk content from a template name.
pub fn template_content(name: &str) -> String {
    format!("{name}{TEMPLATE_MARKER}")
}

/// Recovers the template name from template chunk content.
pub fn template_display_name(content: &str) -> &str {
    content.strip_suffix(TEMPLATE_MARKER).unwrap_or(content)
}

/// Builds slot chunk content from a slot name.
pub fn slot_content(name: &str) -> String {
    format!("{SLOT_MARKER}{name}")
}

/// Strips the reserved slot marker; slot names are always compared in
/// stripped form.
pub fn slot_display_name(content: &str) -> &str {
    content.strip_prefix(SLOT_MARKER).unwrap_or(content)
}
