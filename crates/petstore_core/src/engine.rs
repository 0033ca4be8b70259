//! Storage engine: routed, validated, notifying CRUD over the pets table.
//!
//! # Responsibility
//! - Own the single SQLite connection, opened and migrated at startup.
//! - Route resource URIs, dispatch CRUD to the repository, publish change
//!   events after committed writes.
//!
//! # Invariants
//! - One engine-wide mutex serializes access to the connection, so a query
//!   started after a write returns observes that write.
//! - Change events are published after commit and after the connection lock
//!   is released.
//! - Validation failures are returned to the caller and never retried.

use crate::config::{DatabaseTarget, StoreConfig};
use crate::db::{open_db_in_memory, open_db_with_timeout, DbError, DbResult};
use crate::model::pet::PetId;
use crate::model::record::Record;
use crate::model::schema::PATH_PETS;
use crate::notify::{ChangeEvent, ChangeNotifier, ChangeOperation};
use crate::repo::pet_repo::{
    validate_query_shape, Filter, PetRepository, SortOrder, SqlitePetRepository, StoreError,
    StoreResult,
};
use crate::uri::{pets_matcher, ResourceUri, Route, RouteKind, UriMatcher};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Instant;

pub struct StorageEngine {
    conn: Mutex<Connection>,
    router: UriMatcher,
    notifier: Arc<ChangeNotifier>,
    config: StoreConfig,
}

impl StorageEngine {
    /// Opens the configured database and applies pending migrations.
    ///
    /// # Errors
    /// - Any [`DbError`]; the engine is never built on a partially migrated
    ///   schema.
    pub fn open(config: &StoreConfig) -> DbResult<Self> {
        let config = config.validate().map_err(DbError::InvalidConfig)?;
        let conn = match &config.database {
            DatabaseTarget::File { path } => open_db_with_timeout(path, config.busy_timeout())?,
            DatabaseTarget::Memory => open_db_in_memory()?,
        };
        info!(
            "event=store_open module=store status=ok authority={} workers={}",
            config.authority, config.loader_workers
        );
        Ok(Self {
            conn: Mutex::new(conn),
            router: pets_matcher(&config.authority),
            notifier: Arc::new(ChangeNotifier::new()),
            config,
        })
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn authority(&self) -> &str {
        &self.config.authority
    }

    pub fn router(&self) -> &UriMatcher {
        &self.router
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    /// `content://<authority>/pets`
    pub fn collection_uri(&self) -> ResourceUri {
        ResourceUri::collection(&self.config.authority, PATH_PETS)
    }

    /// `content://<authority>/pets/<id>`
    pub fn item_uri(&self, id: PetId) -> ResourceUri {
        self.collection_uri().with_id(id)
    }

    /// MIME type token for `uri`.
    pub fn get_type(&self, uri: &str) -> StoreResult<String> {
        let route = self.router.route(uri)?;
        Ok(self.router.mime_type(&route))
    }

    /// Routes `uri` and validates the query columns without executing it.
    pub fn check_query(
        &self,
        uri: &str,
        projection: &[String],
        filter: &Filter,
        sort: &SortOrder,
    ) -> StoreResult<Route> {
        let route = self.router.route(uri)?;
        validate_query_shape(projection, filter, sort)?;
        Ok(route)
    }

    /// Inserts one pet into the collection at `uri` and returns its new id.
    pub fn insert(&self, uri: &str, record: &Record) -> StoreResult<PetId> {
        let started_at = Instant::now();
        let route = self.router.route(uri)?;
        if route.kind != RouteKind::Collection {
            return Err(StoreError::UnsupportedOperation(format!(
                "insert is not supported for {}",
                route.uri
            )));
        }

        let inserted = {
            let conn = self.conn.lock();
            SqlitePetRepository::new(&conn).insert_pet(record)
        };
        let id = match inserted {
            Ok(id) => id,
            Err(err) => {
                log_write_failure("store_insert", &route, &err);
                return Err(err);
            }
        };

        info!(
            "event=store_insert module=store status=ok uri={} id={} duration_ms={}",
            route.uri,
            id,
            started_at.elapsed().as_millis()
        );
        let item_uri = route.collection_uri().with_id(id);
        self.notifier
            .publish(&ChangeEvent::new(item_uri, ChangeOperation::Insert));
        Ok(id)
    }

    /// Applies `values` to the addressed rows and returns how many matched.
    ///
    /// For an item URI the merged row is validated like an insert; a missing
    /// row yields `Ok(0)`.
    pub fn update(&self, uri: &str, values: &Record, filter: &Filter) -> StoreResult<usize> {
        let started_at = Instant::now();
        let route = self.router.route(uri)?;

        let updated = {
            let conn = self.conn.lock();
            SqlitePetRepository::new(&conn).update_pets(route.row_id, values, filter)
        };
        let changed = match updated {
            Ok(changed) => changed,
            Err(err) => {
                log_write_failure("store_update", &route, &err);
                return Err(err);
            }
        };

        info!(
            "event=store_update module=store status=ok uri={} rows={} duration_ms={}",
            route.uri,
            changed,
            started_at.elapsed().as_millis()
        );
        if changed > 0 {
            self.notifier
                .publish(&ChangeEvent::new(route.uri, ChangeOperation::Update));
        }
        Ok(changed)
    }

    /// Read-only query; no matches is an empty vector.
    pub fn query(
        &self,
        uri: &str,
        projection: &[String],
        filter: &Filter,
        sort: &SortOrder,
    ) -> StoreResult<Vec<Record>> {
        let started_at = Instant::now();
        let route = self.router.route(uri)?;
        let rows = {
            let conn = self.conn.lock();
            SqlitePetRepository::new(&conn).query_pets(route.row_id, projection, filter, sort)?
        };
        debug!(
            "event=store_query module=store status=ok uri={} rows={} duration_ms={}",
            route.uri,
            rows.len(),
            started_at.elapsed().as_millis()
        );
        Ok(rows)
    }

    /// Deletes the addressed rows; the collection URI without a filter
    /// removes every row.
    pub fn delete(&self, uri: &str, filter: &Filter) -> StoreResult<usize> {
        let started_at = Instant::now();
        let route = self.router.route(uri)?;

        let deleted = {
            let conn = self.conn.lock();
            SqlitePetRepository::new(&conn).delete_pets(route.row_id, filter)
        };
        let removed = match deleted {
            Ok(removed) => removed,
            Err(err) => {
                log_write_failure("store_delete", &route, &err);
                return Err(err);
            }
        };

        info!(
            "event=store_delete module=store status=ok uri={} rows={} duration_ms={}",
            route.uri,
            removed,
            started_at.elapsed().as_millis()
        );
        if removed > 0 {
            self.notifier.publish(&ChangeEvent::new(
                route.collection_uri(),
                ChangeOperation::Delete,
            ));
        }
        Ok(removed)
    }
}

fn log_write_failure(event: &str, route: &Route, err: &StoreError) {
    let code = match err {
        StoreError::Validation(_) => "validation_failed",
        StoreError::Db(_) => "db_failed",
        _ => "rejected",
    };
    warn!(
        "event={} module=store status=error uri={} error_code={} error={}",
        event, route.uri, code, err
    );
}
