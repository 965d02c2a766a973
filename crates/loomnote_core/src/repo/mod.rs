//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the narrow storage contracts the engines are written against:
//!   point get-by-ID, filtered list, insert, update-by-ID, delete-by-ID.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repository writes enforce model validation before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors; "found nothing" list results are empty sets.
//! - Engines depend on these traits only, so tests can inject independent
//!   or fault-injecting store instances.

pub mod chunk_repo;
pub mod graph_repo;
pub mod tag_repo;
pub mod text_repo;
