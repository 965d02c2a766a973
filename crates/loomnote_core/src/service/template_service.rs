//! Template/slot engine over the chunk forest.
//!
//! # Responsibility
//! - Encode reusable record schemas as template chunks with slot children.
//! - Instantiate templates into instance chunks with slot-value children.
//! - Resolve slot names back from positional sequence numbers.
//!
//! # Invariants
//! - A template's slots carry sequence numbers `0..N-1` in declaration
//!   order.
//! - Every instance of an N-slot template has exactly N slot-value
//!   children; unsupplied slots hold the empty string.
//! - Slot-value chunks copy the sequence number of the template slot they
//!   fill; names are recovered by sequence match with the marker stripped.
//! - Updating one instance's slot value never touches another instance.

use crate::model::chunk::{
    slot_content, slot_display_name, template_content, template_display_name, Chunk, ChunkId,
    TextRecord, TextStatus,
};
use crate::repo::chunk_repo::{
    ChunkListQuery, ChunkOrder, ChunkPatch, ChunkRepository, ParentFilter, RepoError,
};
use crate::repo::text_repo::TextRepository;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result of template creation: the template chunk plus its slot chunks in
/// declaration order. No instances exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateWithSlots {
    pub template: Chunk,
    pub slots: Vec<Chunk>,
}

/// One realized template instance with its slot values keyed by slot name.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateInstance {
    pub instance: Chunk,
    pub slot_values: BTreeMap<String, Chunk>,
}

/// Full template view: schema plus all instances.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDetail {
    pub template: Chunk,
    pub slots: Vec<Chunk>,
    pub instances: Vec<TemplateInstance>,
}

/// Errors from template/slot operations.
#[derive(Debug)]
pub enum TemplateServiceError {
    /// Template name is blank after trim.
    BlankTemplateName,
    /// A template needs at least one slot.
    NoSlots,
    /// A slot name is blank after trim.
    BlankSlotName,
    /// Referenced template chunk does not exist.
    TemplateNotFound(ChunkId),
    /// Referenced chunk exists but is not a template.
    NotATemplate(ChunkId),
    /// Referenced instance chunk does not exist.
    InstanceNotFound(ChunkId),
    /// Chunk exists but carries no template reference.
    InstanceWithoutTemplate(ChunkId),
    /// Template has no slot with this name.
    SlotNotFound {
        template_id: ChunkId,
        slot_name: String,
    },
    /// Instance is missing the slot-value chunk for this slot.
    SlotValueMissing {
        instance_id: ChunkId,
        slot_name: String,
    },
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for TemplateServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTemplateName => write!(f, "template name must not be blank"),
            Self::NoSlots => write!(f, "template needs at least one slot"),
            Self::BlankSlotName => write!(f, "slot name must not be blank"),
            Self::TemplateNotFound(id) => write!(f, "template not found: {id}"),
            Self::NotATemplate(id) => write!(f, "chunk is not a template: {id}"),
            Self::InstanceNotFound(id) => write!(f, "instance not found: {id}"),
            Self::InstanceWithoutTemplate(id) => {
                write!(f, "chunk is not a template instance: {id}")
            }
            Self::SlotNotFound {
                template_id,
                slot_name,
            } => write!(f, "slot `{slot_name}` not found in template {template_id}"),
            Self::SlotValueMissing {
                instance_id,
                slot_name,
            } => write!(
                f,
                "slot value for `{slot_name}` missing in instance {instance_id}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TemplateServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TemplateServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Template/slot engine facade.
pub struct TemplateService<C: ChunkRepository, T: TextRepository> {
    chunks: C,
    texts: T,
}

impl<C: ChunkRepository, T: TextRepository> TemplateService<C, T> {
    /// Creates the engine from repository implementations.
    pub fn new(chunks: C, texts: T) -> Self {
        Self { chunks, texts }
    }

    /// Declares a template with named slots in the given order.
    ///
    /// Creates a dedicated owning text, the template chunk, and one slot
    /// chunk per name with sequence numbers `0..N-1`.
    pub fn create_template(
        &self,
        name: impl Into<String>,
        slot_names: &[String],
    ) -> Result<TemplateWithSlots, TemplateServiceError> {
        let name = name.into();
        let name = name.trim();
        if name.is_empty() {
            return Err(TemplateServiceError::BlankTemplateName);
        }
        if slot_names.is_empty() {
            return Err(TemplateServiceError::NoSlots);
        }
        let trimmed_slots: Vec<&str> = slot_names.iter().map(|slot| slot.trim()).collect();
        if trimmed_slots.iter().any(|slot| slot.is_empty()) {
            return Err(TemplateServiceError::BlankSlotName);
        }

        let mut text = TextRecord::new(format!("Template: {name}"), format!("Template: {name}"));
        text.status = TextStatus::Completed;
        let text = self.texts.insert_text(&text)?;

        let mut template = Chunk::new(text.id, template_content(name));
        template.is_template = true;
        let template = self.chunks.insert_chunk(&template)?;

        let mut slots = Vec::with_capacity(trimmed_slots.len());
        for (index, slot_name) in trimmed_slots.iter().enumerate() {
            let mut slot = Chunk::new(text.id, slot_content(slot_name));
            slot.is_slot = true;
            slot.parent_chunk_id = Some(template.id);
            slot.template_chunk_id = Some(template.id);
            slot.indent_level = template.indent_level + 1;
            slot.sequence_number = Some(index as i64);
            slots.push(slot);
        }
        let slots = self.chunks.insert_chunks(&slots)?;

        Ok(TemplateWithSlots { template, slots })
    }

    /// Loads one template with its slots and all instances.
    pub fn get_template(
        &self,
        template_id: ChunkId,
    ) -> Result<TemplateDetail, TemplateServiceError> {
        let template = self.resolve_template(template_id)?;
        self.assemble_detail(template)
    }

    /// Lists every template, newest first, with slots and instances.
    pub fn templates(&self) -> Result<Vec<TemplateDetail>, TemplateServiceError> {
        let templates = self.chunks.list_chunks(&ChunkListQuery {
            is_template: Some(true),
            order: ChunkOrder::CreatedDesc,
            ..ChunkListQuery::default()
        })?;

        let mut details = Vec::with_capacity(templates.len());
        for template in templates {
            details.push(self.assemble_detail(template)?);
        }
        Ok(details)
    }

    /// Realizes one instance of a template.
    ///
    /// Every template slot yields a slot-value chunk carrying the slot's
    /// sequence number; slots absent from `slot_values` are filled with the
    /// empty string. Instantiation never fails on missing values.
    pub fn create_instance(
        &self,
        template_id: ChunkId,
        instance_name: impl Into<String>,
        slot_values: &BTreeMap<String, String>,
    ) -> Result<TemplateInstance, TemplateServiceError> {
        let template = self.resolve_template(template_id)?;
        let slots = self.template_slots(template.id)?;

        let instance_name = instance_name.into();
        let template_name = template_display_name(&template.content);
        let mut instance = Chunk::new(
            template.text_id,
            format!("{instance_name}#{template_name}"),
        );
        instance.template_chunk_id = Some(template.id);
        instance.indent_level = template.indent_level;
        let instance = self.chunks.insert_chunk(&instance)?;

        let mut values = BTreeMap::new();
        for slot in &slots {
            let slot_name = slot_display_name(&slot.content).to_string();
            let value = slot_values.get(&slot_name).cloned().unwrap_or_default();

            let mut slot_value = Chunk::new(template.text_id, value.clone());
            slot_value.parent_chunk_id = Some(instance.id);
            slot_value.template_chunk_id = Some(template.id);
            slot_value.slot_value = Some(value);
            slot_value.indent_level = slot.indent_level;
            slot_value.sequence_number = slot.sequence_number;
            let slot_value = self.chunks.insert_chunk(&slot_value)?;
            values.insert(slot_name, slot_value);
        }

        Ok(TemplateInstance {
            instance,
            slot_values: values,
        })
    }

    /// Lists the top-level instances of a template, newest first, each with
    /// its resolved slot-value map.
    pub fn instances(
        &self,
        template_id: ChunkId,
    ) -> Result<Vec<TemplateInstance>, TemplateServiceError> {
        let template = self.resolve_template(template_id)?;
        let slots = self.template_slots(template.id)?;
        self.collect_instances(&template, &slots)
    }

    /// Overwrites one slot value of one instance.
    ///
    /// Resolution chain: instance -> template -> slot by name -> sequence
    /// number -> the instance's slot-value chunk with that sequence. Other
    /// instances of the same template are never affected.
    pub fn update_slot_value(
        &self,
        instance_id: ChunkId,
        slot_name: &str,
        value: impl Into<String>,
    ) -> Result<(), TemplateServiceError> {
        let instance = self
            .chunks
            .get_chunk(instance_id)?
            .ok_or(TemplateServiceError::InstanceNotFound(instance_id))?;
        let template_id = instance
            .template_chunk_id
            .ok_or(TemplateServiceError::InstanceWithoutTemplate(instance_id))?;
        let template = self.resolve_template(template_id)?;
        let slots = self.template_slots(template.id)?;

        let wanted = slot_display_name(slot_name);
        let slot = slots
            .iter()
            .find(|slot| slot_display_name(&slot.content) == wanted)
            .ok_or_else(|| TemplateServiceError::SlotNotFound {
                template_id: template.id,
                slot_name: wanted.to_string(),
            })?;
        let sequence = slot
            .sequence_number
            .ok_or_else(|| TemplateServiceError::SlotNotFound {
                template_id: template.id,
                slot_name: wanted.to_string(),
            })?;

        let slot_value_chunk = self
            .chunks
            .list_chunks(&ChunkListQuery {
                parent: Some(ParentFilter::Chunk(instance_id)),
                sequence_number: Some(sequence),
                limit: Some(1),
                ..ChunkListQuery::default()
            })?
            .into_iter()
            .next()
            .ok_or_else(|| TemplateServiceError::SlotValueMissing {
                instance_id,
                slot_name: wanted.to_string(),
            })?;

        let value = value.into();
        self.chunks
            .update_chunk(
                slot_value_chunk.id,
                &ChunkPatch {
                    content: Some(value.clone()),
                    slot_value: Some(Some(value)),
                    ..ChunkPatch::default()
                },
            )
            .map_err(Into::into)
    }

    fn resolve_template(&self, template_id: ChunkId) -> Result<Chunk, TemplateServiceError> {
        let chunk = self
            .chunks
            .get_chunk(template_id)?
            .ok_or(TemplateServiceError::TemplateNotFound(template_id))?;
        if !chunk.is_template {
            return Err(TemplateServiceError::NotATemplate(template_id));
        }
        Ok(chunk)
    }

    fn template_slots(&self, template_id: ChunkId) -> Result<Vec<Chunk>, TemplateServiceError> {
        self.chunks
            .list_chunks(&ChunkListQuery {
                parent: Some(ParentFilter::Chunk(template_id)),
                is_slot: Some(true),
                ..ChunkListQuery::default()
            })
            .map_err(Into::into)
    }

    fn assemble_detail(&self, template: Chunk) -> Result<TemplateDetail, TemplateServiceError> {
        let slots = self.template_slots(template.id)?;
        let instances = self.collect_instances(&template, &slots)?;
        Ok(TemplateDetail {
            template,
            slots,
            instances,
        })
    }

    fn collect_instances(
        &self,
        template: &Chunk,
        slots: &[Chunk],
    ) -> Result<Vec<TemplateInstance>, TemplateServiceError> {
        let slot_names_by_sequence: BTreeMap<i64, String> = slots
            .iter()
            .filter_map(|slot| {
                slot.sequence_number
                    .map(|sequence| (sequence, slot_display_name(&slot.content).to_string()))
            })
            .collect();

        let instance_chunks = self.chunks.list_chunks(&ChunkListQuery {
            template_chunk_id: Some(template.id),
            is_template: Some(false),
            is_slot: Some(false),
            parent: Some(ParentFilter::Root),
            order: ChunkOrder::CreatedDesc,
            ..ChunkListQuery::default()
        })?;

        let mut instances = Vec::with_capacity(instance_chunks.len());
        for instance in instance_chunks {
            let value_chunks = self.chunks.list_chunks(&ChunkListQuery {
                parent: Some(ParentFilter::Chunk(instance.id)),
                template_chunk_id: Some(template.id),
                ..ChunkListQuery::default()
            })?;

            let mut slot_values = BTreeMap::new();
            for value_chunk in value_chunks {
                let Some(sequence) = value_chunk.sequence_number else {
                    continue;
                };
                if let Some(slot_name) = slot_names_by_sequence.get(&sequence) {
                    slot_values.insert(slot_name.clone(), value_chunk);
                }
            }

            instances.push(TemplateInstance {
                instance,
                slot_values,
            });
        }
        Ok(instances)
    }
}
