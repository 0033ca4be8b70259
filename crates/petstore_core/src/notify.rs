//! Change notification registry.
//!
//! # Responsibility
//! - Keep subscriptions keyed by resource URI prefix.
//! - Fan out committed-write events to every matching subscriber.
//!
//! # Invariants
//! - Each matching subscription is notified exactly once per publish.
//! - A subscription on `pets` sees item events on `pets/<id>`; a subscription
//!   on `pets/<id>` also sees collection-level events on `pets`.
//! - Observers run after the registry lock is released, so they may
//!   subscribe or unsubscribe from inside `on_change`.

use crate::uri::ResourceUri;
use log::debug;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Notification that a write affecting `uri` has committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub uri: ResourceUri,
    pub operation: ChangeOperation,
}

impl ChangeEvent {
    pub fn new(uri: ResourceUri, operation: ChangeOperation) -> Self {
        Self { uri, operation }
    }
}

/// Receiver of change events.
///
/// Called on the publishing thread; implementations should only schedule
/// work.
pub trait ChangeObserver: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}

impl<F> ChangeObserver for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(Uuid);

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscription {
    prefix: ResourceUri,
    observer: Arc<dyn ChangeObserver>,
}

impl Subscription {
    fn affected_by(&self, event: &ChangeEvent) -> bool {
        self.prefix.is_ancestor_or_self_of(&event.uri)
            || event.uri.is_ancestor_or_self_of(&self.prefix)
    }
}

/// Publish/subscribe registry shared by the engine and its observers.
#[derive(Default)]
pub struct ChangeNotifier {
    subscriptions: RwLock<BTreeMap<SubscriptionId, Subscription>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        prefix: ResourceUri,
        observer: Arc<dyn ChangeObserver>,
    ) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        debug!(
            "event=notify_subscribe module=notify status=ok subscription={} uri={}",
            id, prefix
        );
        self.subscriptions
            .write()
            .insert(id, Subscription { prefix, observer });
        id
    }

    /// Returns `false` when the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscriptions.write().remove(&id).is_some();
        debug!(
            "event=notify_unsubscribe module=notify status=ok subscription={} removed={}",
            id, removed
        );
        removed
    }

    /// Notifies matching subscribers and returns how many were notified.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let targets = self
            .subscriptions
            .read()
            .values()
            .filter(|subscription| subscription.affected_by(event))
            .map(|subscription| Arc::clone(&subscription.observer))
            .collect::<Vec<_>>();

        for observer in &targets {
            observer.on_change(event);
        }

        debug!(
            "event=notify_publish module=notify status=ok op={} uri={} delivered={}",
            event.operation.as_str(),
            event.uri,
            targets.len()
        );
        targets.len()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeEvent, ChangeNotifier, ChangeObserver, ChangeOperation};
    use crate::uri::ResourceUri;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn ChangeObserver>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let observer: Arc<dyn ChangeObserver> = Arc::new(move |_: &ChangeEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, observer)
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let notifier = ChangeNotifier::new();
        let event = ChangeEvent::new(ResourceUri::collection("a", "pets"), ChangeOperation::Delete);
        assert_eq!(notifier.publish(&event), 0);
    }

    #[test]
    fn item_change_reaches_collection_and_matching_item_only() {
        let notifier = ChangeNotifier::new();
        let pets = ResourceUri::collection("a", "pets");
        let (collection_count, collection_observer) = counter();
        let (one_count, one_observer) = counter();
        let (twelve_count, twelve_observer) = counter();
        notifier.subscribe(pets.clone(), collection_observer);
        notifier.subscribe(pets.with_id(1), one_observer);
        notifier.subscribe(pets.with_id(12), twelve_observer);

        let delivered =
            notifier.publish(&ChangeEvent::new(pets.with_id(1), ChangeOperation::Update));

        assert_eq!(delivered, 2);
        assert_eq!(collection_count.load(Ordering::SeqCst), 1);
        assert_eq!(one_count.load(Ordering::SeqCst), 1);
        assert_eq!(twelve_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn collection_change_reaches_item_subscribers() {
        let notifier = ChangeNotifier::new();
        let pets = ResourceUri::collection("a", "pets");
        let (item_count, item_observer) = counter();
        notifier.subscribe(pets.with_id(3), item_observer);

        notifier.publish(&ChangeEvent::new(pets, ChangeOperation::Delete));
        assert_eq!(item_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribed_observer_is_not_notified() {
        let notifier = ChangeNotifier::new();
        let pets = ResourceUri::collection("a", "pets");
        let (count, observer) = counter();
        let id = notifier.subscribe(pets.clone(), observer);

        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.publish(&ChangeEvent::new(pets, ChangeOperation::Insert));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(notifier.is_empty());
    }

    #[test]
    fn other_authority_is_ignored() {
        let notifier = ChangeNotifier::new();
        let (count, observer) = counter();
        notifier.subscribe(ResourceUri::collection("a", "pets"), observer);
        notifier.publish(&ChangeEvent::new(
            ResourceUri::collection("b", "pets"),
            ChangeOperation::Insert,
        ));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
