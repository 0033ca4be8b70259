//! Reactive query loaders.
//!
//! # Responsibility
//! - Run store queries on a background executor.
//! - Deliver results on the consumer's primary context.
//! - Re-run queries when the change notifier reports a matching write.
//!
//! # Invariants
//! - Consumer callbacks only ever run inside `PrimaryContext::run_*`.
//! - No callback runs after its observer is detached.

mod executor;
mod manager;
mod observer;
mod primary;

pub use executor::BackgroundExecutor;
pub use manager::{LoaderId, LoaderManager};
pub use observer::{LoaderState, ObserverId, QueryObserver, QuerySpec, Snapshot};
pub use primary::{PrimaryContext, PrimaryHandle};
