//! UI binding: observe a store through a selector and re-render only when
//! the selected slice changes.
//!
//! Framework-agnostic: a binding exposes a snapshot and a change callback,
//! which is all a reactive UI needs to drive re-rendering.

use crate::store::{State, UniversalStore, Updater};
use crate::subscriptions::{ListenerSet, Subscription};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Caches the last selection and reports whether a new state changes it.
pub struct MemoizedSelector<S, T> {
    selector: Box<dyn Fn(&S) -> T + Send + Sync>,
    cached: Mutex<Option<T>>,
}

impl<S, T: Clone + PartialEq> MemoizedSelector<S, T> {
    pub fn new(selector: impl Fn(&S) -> T + Send + Sync + 'static) -> Self {
        Self {
            selector: Box::new(selector),
            cached: Mutex::new(None),
        }
    }

    /// Select from `state`. Returns the cached value when the new selection is
    /// equal to it, plus whether the selection changed.
    pub fn select(&self, state: &S) -> (T, bool) {
        let next = (self.selector)(state);
        let mut cached = self.cached.lock();
        match cached.as_ref() {
            Some(current) if *current == next => (current.clone(), false),
            _ => {
                *cached = Some(next.clone());
                (next, true)
            }
        }
    }

    pub fn cached(&self) -> Option<T> {
        self.cached.lock().clone()
    }
}

type RenderListener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct BindingInner<S, T> {
    memo: MemoizedSelector<S, T>,
    renders: Arc<ListenerSet<RenderListener<T>>>,
    render_count: AtomicU64,
}

/// A store observed through a selector.
///
/// Unsubscribes from the store when dropped.
pub struct StoreBinding<S: State, T> {
    store: Arc<dyn UniversalStore<S>>,
    inner: Arc<BindingInner<S, T>>,
    subscription: Subscription,
}

impl<S: State, T: Clone + PartialEq + Send + Sync + 'static> StoreBinding<S, T> {
    /// The current selection.
    pub fn snapshot(&self) -> T {
        match self.inner.memo.cached() {
            Some(value) => value,
            None => self.inner.memo.select(&self.store.get_state()).0,
        }
    }

    /// Selection plus a setter, the shape UI code usually wants.
    pub fn split(&self) -> (T, StateSetter<S>) {
        (
            self.snapshot(),
            StateSetter {
                store: Arc::clone(&self.store),
            },
        )
    }

    pub fn set_state(&self, state: S) {
        self.store.set_state(state);
    }

    pub fn update_state(&self, updater: Updater<S>) {
        self.store.update_state(updater);
    }

    /// Register a re-render callback, called with each new selection.
    pub fn on_change(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.inner.renders.add(Arc::new(listener))
    }

    /// How many times the selection changed since the binding was created.
    pub fn render_count(&self) -> u64 {
        self.inner.render_count.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &Arc<dyn UniversalStore<S>> {
        &self.store
    }
}

impl<S: State, T> Drop for StoreBinding<S, T> {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

/// Writes to the bound store.
#[derive(Clone)]
pub struct StateSetter<S: State> {
    store: Arc<dyn UniversalStore<S>>,
}

impl<S: State> StateSetter<S> {
    pub fn set(&self, state: S) {
        self.store.set_state(state);
    }

    pub fn update(&self, updater: Updater<S>) {
        self.store.update_state(updater);
    }
}

/// Bind `store` through `selector`.
pub fn use_universal_store<S, T, F>(store: Arc<dyn UniversalStore<S>>, selector: F) -> StoreBinding<S, T>
where
    S: State,
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(&S) -> T + Send + Sync + 'static,
{
    let inner = Arc::new(BindingInner {
        memo: MemoizedSelector::new(selector),
        renders: ListenerSet::new(),
        render_count: AtomicU64::new(0),
    });
    inner.memo.select(&store.get_state());

    let weak = Arc::downgrade(&inner);
    let subscription = store.on_state_change(Arc::new(move |state: &S, _prev: &S| {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let (selected, changed) = inner.memo.select(state);
        if !changed {
            return;
        }
        inner.render_count.fetch_add(1, Ordering::SeqCst);
        for render in inner.renders.snapshot() {
            render(&selected);
        }
    }));

    StoreBinding {
        store,
        inner,
        subscription,
    }
}

/// Bind the whole state.
pub fn use_universal_store_state<S: State>(store: Arc<dyn UniversalStore<S>>) -> StoreBinding<S, S> {
    use_universal_store(store, S::clone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LeaderStore, RealmConfig, StoreOptions};
    use std::collections::BTreeMap;

    type Providers = BTreeMap<String, String>;

    fn providers_store() -> Arc<dyn UniversalStore<Providers>> {
        LeaderStore::new(
            StoreOptions::leader("providers", Providers::new()),
            &RealmConfig::server(),
            None,
        )
    }

    fn with(state: &Providers, key: &str, value: &str) -> Providers {
        let mut next = state.clone();
        next.insert(key.to_string(), value.to_string());
        next
    }

    #[test]
    fn test_memoized_selector_reports_changes() {
        let memo = MemoizedSelector::new(|n: &u32| n / 10);
        assert_eq!(memo.select(&12), (1, true));
        assert_eq!(memo.select(&15), (1, false));
        assert_eq!(memo.select(&21), (2, true));
        assert_eq!(memo.cached(), Some(2));
    }

    #[test]
    fn test_binding_skips_unrelated_changes() {
        let store = providers_store();
        let binding = use_universal_store(Arc::clone(&store), |state: &Providers| {
            state.get("provider-1").cloned()
        });
        assert_eq!(binding.snapshot(), None);

        store.set_state(with(&store.get_state(), "provider-2", "running"));
        assert_eq!(binding.render_count(), 0);

        store.set_state(with(&store.get_state(), "provider-1", "running"));
        assert_eq!(binding.render_count(), 1);
        assert_eq!(binding.snapshot(), Some("running".to_string()));
    }

    #[test]
    fn test_binding_ignores_equal_replacement() {
        let store = providers_store();
        let binding = use_universal_store_state(Arc::clone(&store));

        let state = with(&Providers::new(), "provider-1", "pending");
        store.set_state(state.clone());
        // Different allocation, same value
        store.set_state(state.clone());

        assert_eq!(binding.render_count(), 1);
        assert_eq!(binding.snapshot(), state);
    }

    #[test]
    fn test_on_change_receives_selection() {
        let store = providers_store();
        let binding = use_universal_store(Arc::clone(&store), |state: &Providers| state.len());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let sub = binding.on_change(move |len: &usize| sink.lock().push(*len));
        store.set_state(with(&store.get_state(), "a", "x"));
        store.set_state(with(&store.get_state(), "a", "y"));
        store.set_state(with(&store.get_state(), "b", "x"));
        sub.unsubscribe();
        store.set_state(with(&store.get_state(), "c", "x"));

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_setter_writes_through() {
        let store = providers_store();
        let binding = use_universal_store_state(Arc::clone(&store));
        let (state, setter) = binding.split();
        assert!(state.is_empty());

        setter.set(with(&state, "a", "x"));
        assert_eq!(binding.snapshot().len(), 1);
    }

    #[test]
    fn test_dropped_binding_unsubscribes() {
        let store = providers_store();
        let binding = use_universal_store_state(Arc::clone(&store));
        drop(binding);

        // Must not panic or notify
        store.set_state(with(&Providers::new(), "a", "x"));
    }
}
