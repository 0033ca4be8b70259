//! Reactive storage access layer for the pet shelter.
//! Consumers address data by resource URI; writes are validated, persisted in
//! SQLite and re-delivered to live query loaders.

pub mod config;
pub mod db;
pub mod engine;
pub mod loader;
pub mod logging;
pub mod model;
pub mod notify;
pub mod repo;
pub mod uri;

pub use config::{DatabaseTarget, StoreConfig};
pub use db::{DbError, DbResult};
pub use engine::StorageEngine;
pub use loader::{
    BackgroundExecutor, LoaderId, LoaderManager, LoaderState, ObserverId, PrimaryContext,
    PrimaryHandle, QueryObserver, QuerySpec, Snapshot,
};
pub use logging::{
    default_log_level, init_logging, init_logging_with, logging_status, LoggingOptions,
};
pub use model::pet::{Gender, Pet, PetId};
pub use model::record::{FieldValue, Record};
pub use model::schema::{is_valid_gender, SchemaCatalog, ValidationError, PETS_SCHEMA};
pub use notify::{ChangeEvent, ChangeNotifier, ChangeObserver, ChangeOperation, SubscriptionId};
pub use repo::pet_repo::{
    Filter, FilterOp, PetRepository, SortOrder, SqlitePetRepository, StoreError, StoreResult,
};
pub use uri::{ResourceUri, Route, RouteKind, UriMatcher};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
