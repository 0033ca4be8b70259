//! Pet domain model and schema catalog.
//!
//! # Responsibility
//! - Define the versioned `pets` schema and its validation rules.
//! - Define the record shape exchanged with store callers.
//!
//! # Invariants
//! - Every stored pet is identified by a store-assigned `PetId`.
//! - Deletion is a hard delete; there are no tombstones.

pub mod pet;
pub mod record;
pub mod schema;
