//! Per-consumer loader registry.
//!
//! # Responsibility
//! - Own the consumer's primary context, a background executor and the
//!   consumer's loaders keyed by small integer ids.
//!
//! # Invariants
//! - Dropping the manager detaches every loader it owns.

use super::executor::BackgroundExecutor;
use super::observer::{LoaderState, ObserverId, QueryObserver, QuerySpec, Snapshot};
use super::primary::{PrimaryContext, PrimaryHandle};
use crate::engine::StorageEngine;
use crate::repo::pet_repo::StoreResult;
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Consumer-chosen loader key.
pub type LoaderId = u32;

pub struct LoaderManager {
    engine: Arc<StorageEngine>,
    executor: BackgroundExecutor,
    primary: PrimaryContext,
    loaders: BTreeMap<LoaderId, QueryObserver>,
}

impl LoaderManager {
    /// Creates a manager with `engine.config().loader_workers` workers.
    pub fn new(engine: Arc<StorageEngine>) -> std::io::Result<Self> {
        let executor = BackgroundExecutor::new(engine.config().loader_workers)?;
        Ok(Self::with_executor(engine, executor))
    }

    /// Creates a manager that shares an existing executor.
    pub fn with_executor(engine: Arc<StorageEngine>, executor: BackgroundExecutor) -> Self {
        Self {
            engine,
            executor,
            primary: PrimaryContext::new(),
            loaders: BTreeMap::new(),
        }
    }

    pub fn engine(&self) -> &Arc<StorageEngine> {
        &self.engine
    }

    pub fn primary_handle(&self) -> PrimaryHandle {
        self.primary.handle()
    }

    /// Creates and attaches loader `id`, or returns the existing one untouched.
    pub fn init_loader<F>(
        &mut self,
        id: LoaderId,
        spec: QuerySpec,
        callback: F,
    ) -> StoreResult<ObserverId>
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        if let Some(existing) = self.loaders.get(&id) {
            debug!("event=loader_init module=loader status=reused loader={id}");
            return Ok(existing.id());
        }
        let observer = self.create(spec)?;
        let observer_id = observer.attach(callback);
        self.loaders.insert(id, observer);
        Ok(observer_id)
    }

    /// Replaces loader `id` with a fresh one for `spec`.
    pub fn restart_loader<F>(
        &mut self,
        id: LoaderId,
        spec: QuerySpec,
        callback: F,
    ) -> StoreResult<ObserverId>
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        let observer = self.create(spec)?;
        let observer_id = observer.attach(callback);
        if let Some(previous) = self.loaders.insert(id, observer) {
            previous.detach();
        }
        Ok(observer_id)
    }

    /// Detaches and forgets loader `id`.
    pub fn destroy_loader(&mut self, id: LoaderId) -> bool {
        match self.loaders.remove(&id) {
            Some(observer) => {
                observer.detach();
                true
            }
            None => false,
        }
    }

    pub fn loader(&self, id: LoaderId) -> Option<&QueryObserver> {
        self.loaders.get(&id)
    }

    pub fn state(&self, id: LoaderId) -> Option<LoaderState> {
        self.loaders.get(&id).map(QueryObserver::state)
    }

    pub fn snapshot(&self, id: LoaderId) -> Option<Snapshot> {
        self.loaders.get(&id).and_then(QueryObserver::snapshot)
    }

    pub fn run_pending(&self) -> usize {
        self.primary.run_pending()
    }

    pub fn run_next(&self, timeout: Duration) -> bool {
        self.primary.run_next(timeout)
    }

    pub fn run_until(&self, timeout: Duration, done: impl FnMut() -> bool) -> bool {
        self.primary.run_until(timeout, done)
    }

    fn create(&self, spec: QuerySpec) -> StoreResult<QueryObserver> {
        QueryObserver::new(
            Arc::clone(&self.engine),
            self.executor.clone(),
            self.primary.handle(),
            spec,
        )
    }
}
