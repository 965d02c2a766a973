//! Core engines built over the repository contracts.
//!
//! # Responsibility
//! - Orchestrate storage primitives into the hierarchy, template/slot, tag,
//!   and graph traversal engines.
//! - Keep callers decoupled from storage details.
//!
//! # Invariants
//! - Engines hold no state between invocations beyond the injected
//!   repositories; concurrent callers operate on independent working sets.

pub mod cancel;
pub mod chunk_service;
pub mod graph_service;
pub mod hierarchy_service;
pub mod tag_service;
pub mod template_service;
