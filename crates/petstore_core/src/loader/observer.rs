//! Query observer state machine.
//!
//! # Responsibility
//! - Execute one query spec on the background executor and hand the snapshot
//!   to the consumer callback on the primary context.
//! - Re-execute on matching change events or explicit restart.
//!
//! # Invariants
//! - Only the newest generation's result is delivered; older results are
//!   dropped on arrival.
//! - After `detach` no callback runs, including for results already posted.
//! - The notifier holds only a weak link back to the observer.

use super::executor::BackgroundExecutor;
use super::primary::PrimaryHandle;
use crate::engine::StorageEngine;
use crate::model::record::Record;
use crate::notify::{ChangeEvent, ChangeObserver, SubscriptionId};
use crate::repo::pet_repo::{Filter, SortOrder, StoreResult};
use crate::uri::ResourceUri;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Instant;
use uuid::Uuid;

pub type ObserverId = Uuid;

/// Immutable copy of one delivered result set.
pub type Snapshot = Arc<Vec<Record>>;

type Callback = Box<dyn FnMut(Snapshot) + Send + 'static>;

/// Loader lifecycle.
///
/// `Idle -> Loading -> Delivered -> Loading -> ... -> Reset`; `Failed` is
/// entered when an execution returns an error and left on the next change or
/// restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    Loading,
    Delivered,
    Failed,
    Reset,
}

impl LoaderState {
    fn is_attached(self) -> bool {
        matches!(self, Self::Loading | Self::Delivered | Self::Failed)
    }
}

/// What to load: URI, projection, filter and sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub uri: String,
    pub projection: Vec<String>,
    pub filter: Filter,
    pub sort: SortOrder,
}

impl QuerySpec {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            projection: Vec::new(),
            filter: Filter::default(),
            sort: SortOrder::default(),
        }
    }

    pub fn projection<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }
}

struct ObserverState {
    phase: LoaderState,
    generation: u64,
    snapshot: Option<Snapshot>,
    subscription: Option<SubscriptionId>,
    callback: Option<Callback>,
}

struct ObserverInner {
    id: ObserverId,
    spec: QuerySpec,
    subscription_uri: ResourceUri,
    engine: Arc<StorageEngine>,
    executor: BackgroundExecutor,
    primary: PrimaryHandle,
    state: Mutex<ObserverState>,
}

/// Live query bound to a consumer's active period.
///
/// Dropping the handle detaches it.
pub struct QueryObserver {
    inner: Arc<ObserverInner>,
}

impl QueryObserver {
    /// Validates `spec` and creates an idle observer.
    ///
    /// # Errors
    /// - `StoreError::NotFound` for an unroutable URI.
    /// - `StoreError::Validation` for unknown projected, filtered or sorted
    ///   columns.
    pub fn new(
        engine: Arc<StorageEngine>,
        executor: BackgroundExecutor,
        primary: PrimaryHandle,
        spec: QuerySpec,
    ) -> StoreResult<Self> {
        let route = engine.check_query(&spec.uri, &spec.projection, &spec.filter, &spec.sort)?;
        Ok(Self {
            inner: Arc::new(ObserverInner {
                id: Uuid::new_v4(),
                spec,
                subscription_uri: route.uri,
                engine,
                executor,
                primary,
                state: Mutex::new(ObserverState {
                    phase: LoaderState::Idle,
                    generation: 0,
                    snapshot: None,
                    subscription: None,
                    callback: None,
                }),
            }),
        })
    }

    pub fn id(&self) -> ObserverId {
        self.inner.id
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.inner.spec
    }

    pub fn state(&self) -> LoaderState {
        self.inner.state.lock().phase
    }

    /// Last delivered snapshot, if any.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.inner.state.lock().snapshot.clone()
    }

    /// Starts loading and subscribes to changes under the query URI.
    ///
    /// Attaching an observer that is already attached keeps the current
    /// callback and returns the same id.
    pub fn attach<F>(&self, callback: F) -> ObserverId
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        let generation = {
            let mut state = self.inner.state.lock();
            if state.phase.is_attached() {
                debug!(
                    "event=loader_attach module=loader status=skipped observer={} reason=already_attached",
                    self.inner.id
                );
                return self.inner.id;
            }
            state.callback = Some(Box::new(callback));
            state.phase = LoaderState::Loading;
            state.generation += 1;
            let link: Arc<dyn ChangeObserver> = Arc::new(ObserverLink {
                inner: Arc::downgrade(&self.inner),
            });
            state.subscription = Some(
                self.inner
                    .engine
                    .notifier()
                    .subscribe(self.inner.subscription_uri.clone(), link),
            );
            state.generation
        };

        info!(
            "event=loader_attach module=loader status=ok observer={} uri={}",
            self.inner.id, self.inner.subscription_uri
        );
        ObserverInner::schedule(&self.inner, generation);
        self.inner.id
    }

    /// Re-runs the query; returns `false` when the observer is not attached.
    pub fn restart(&self) -> bool {
        ObserverInner::reload(&self.inner, "restart")
    }

    /// Unsubscribes, drops callback and snapshot, and enters `Reset`.
    pub fn detach(&self) {
        let subscription = {
            let mut state = self.inner.state.lock();
            if !state.phase.is_attached() {
                return;
            }
            state.phase = LoaderState::Reset;
            state.generation += 1;
            state.callback = None;
            state.snapshot = None;
            state.subscription.take()
        };
        if let Some(id) = subscription {
            self.inner.engine.notifier().unsubscribe(id);
        }
        info!(
            "event=loader_detach module=loader status=ok observer={}",
            self.inner.id
        );
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        self.detach();
    }
}

impl ObserverInner {
    fn reload(this: &Arc<Self>, reason: &'static str) -> bool {
        let generation = {
            let mut state = this.state.lock();
            if !state.phase.is_attached() {
                return false;
            }
            state.phase = LoaderState::Loading;
            state.generation += 1;
            state.generation
        };
        debug!(
            "event=loader_reload module=loader status=start observer={} reason={} generation={}",
            this.id, reason, generation
        );
        Self::schedule(this, generation);
        true
    }

    fn schedule(this: &Arc<Self>, generation: u64) {
        let inner = Arc::clone(this);
        if !this.executor.execute(move || inner.run_query(generation)) {
            warn!(
                "event=loader_schedule module=loader status=error observer={} error_code=executor_closed",
                this.id
            );
            let mut state = this.state.lock();
            if state.generation == generation {
                state.phase = LoaderState::Failed;
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.state.lock();
        state.phase == LoaderState::Loading && state.generation == generation
    }

    fn run_query(self: Arc<Self>, generation: u64) {
        if !self.is_current(generation) {
            debug!(
                "event=loader_query module=loader status=skipped observer={} generation={}",
                self.id, generation
            );
            return;
        }

        let started_at = Instant::now();
        let result = self.engine.query(
            &self.spec.uri,
            &self.spec.projection,
            &self.spec.filter,
            &self.spec.sort,
        );
        debug!(
            "event=loader_query module=loader status=done observer={} generation={} duration_ms={}",
            self.id,
            generation,
            started_at.elapsed().as_millis()
        );

        let inner = Arc::clone(&self);
        if !self
            .primary
            .post(move || inner.deliver(generation, result))
        {
            debug!(
                "event=loader_deliver module=loader status=skipped observer={} reason=primary_closed",
                self.id
            );
        }
    }

    /// Runs on the primary context.
    fn deliver(&self, generation: u64, result: StoreResult<Vec<Record>>) {
        let (mut callback, snapshot) = {
            let mut state = self.state.lock();
            if state.phase != LoaderState::Loading || state.generation != generation {
                debug!(
                    "event=loader_deliver module=loader status=discarded observer={} generation={}",
                    self.id, generation
                );
                return;
            }
            match result {
                Ok(rows) => {
                    let snapshot: Snapshot = Arc::new(rows);
                    state.phase = LoaderState::Delivered;
                    state.snapshot = Some(Arc::clone(&snapshot));
                    match state.callback.take() {
                        Some(callback) => (callback, snapshot),
                        None => return,
                    }
                }
                Err(err) => {
                    state.phase = LoaderState::Failed;
                    error!(
                        "event=loader_deliver module=loader status=error observer={} error={}",
                        self.id, err
                    );
                    return;
                }
            }
        };

        info!(
            "event=loader_deliver module=loader status=ok observer={} rows={}",
            self.id,
            snapshot.len()
        );
        callback(snapshot);

        // The callback may have detached or re-attached this observer.
        let mut state = self.state.lock();
        if state.phase.is_attached() && state.callback.is_none() {
            state.callback = Some(callback);
        }
    }
}

struct ObserverLink {
    inner: Weak<ObserverInner>,
}

impl ChangeObserver for ObserverLink {
    fn on_change(&self, event: &ChangeEvent) {
        if let Some(inner) = self.inner.upgrade() {
            ObserverInner::reload(&inner, event.operation.as_str());
        }
    }
}
