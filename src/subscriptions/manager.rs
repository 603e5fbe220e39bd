//! Ordered listener registry.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::types::{Subscription, SubscriptionId};

/// Listeners keyed by a monotonically increasing id, so iteration order is
/// subscription order.
pub(crate) struct ListenerSet<L> {
    listeners: RwLock<BTreeMap<SubscriptionId, L>>,
    next_id: AtomicU64,
}

impl<L: Clone + Send + Sync + 'static> ListenerSet<L> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Register a listener. The returned handle only holds a weak reference
    /// to the set.
    pub(crate) fn add(self: &Arc<Self>, listener: L) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().insert(id, listener);

        let set = Arc::downgrade(self);
        Subscription::new(id, move || {
            if let Some(set) = set.upgrade() {
                set.remove(id);
            }
        })
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    /// Clone the current listeners out so they can run without the lock held.
    pub(crate) fn snapshot(&self) -> Vec<L> {
        self.listeners.read().values().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }
}
