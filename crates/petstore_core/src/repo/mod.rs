//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define pet data access contracts.
//! - Isolate SQLite query details from the engine's routing and notification.
//!
//! # Invariants
//! - Repository writes validate through the schema catalog before persistence.
//! - Absent rows surface as zero affected rows or empty results, not errors.

pub mod pet_repo;
