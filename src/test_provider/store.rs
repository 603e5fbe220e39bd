//! Test provider store operations layered on one synchronized store.

use crate::binding::{use_universal_store, StoreBinding};
use crate::error::Result;
use crate::store::UniversalStore;
use crate::subscriptions::Subscription;
use crate::types::{EventInfo, StoreEvent};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::types::{
    SettingsChangedPayload, TestProviderId, TestProviderState, TestProviderStateByProviderId,
    CLEAR_ALL_EVENT, RUN_ALL_EVENT, SETTINGS_CHANGED_EVENT,
};

type Universal = Arc<dyn UniversalStore<TestProviderStateByProviderId>>;

/// Entry point handing out the full and the per-provider stores.
#[derive(Clone)]
pub struct TestProviderStore {
    store: Universal,
}

impl TestProviderStore {
    pub fn new(universal_test_provider_store: Universal) -> Self {
        Self {
            store: universal_test_provider_store,
        }
    }

    pub fn universal_store(&self) -> &Universal {
        &self.store
    }

    pub fn full_test_provider_store(&self) -> FullTestProviderStore {
        FullTestProviderStore {
            store: Arc::clone(&self.store),
        }
    }

    pub fn test_provider_store_by_id(&self, test_provider_id: impl Into<String>) -> ScopedTestProviderStore {
        ScopedTestProviderStore {
            store: Arc::clone(&self.store),
            test_provider_id: test_provider_id.into(),
        }
    }

    /// Bind a selector over the whole provider map.
    pub fn use_test_provider_store<T, F>(&self, selector: F) -> StoreBinding<TestProviderStateByProviderId, T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&TestProviderStateByProviderId) -> T + Send + Sync + 'static,
    {
        use_universal_store(Arc::clone(&self.store), selector)
    }
}

/// Commands and state covering every provider.
#[derive(Clone)]
pub struct FullTestProviderStore {
    store: Universal,
}

impl FullTestProviderStore {
    pub fn get_full_state(&self) -> TestProviderStateByProviderId {
        self.store.get_state()
    }

    pub fn set_full_state(&self, state: TestProviderStateByProviderId) {
        self.store.set_state(state);
    }

    /// Ask every provider to run. Delivered once the store is synced.
    pub fn run_all(&self) -> Result<()> {
        self.store.send(StoreEvent::new(RUN_ALL_EVENT))
    }

    /// Ask every provider to clear its results. Delivered once synced.
    pub fn clear_all(&self) -> Result<()> {
        self.store.send(StoreEvent::new(CLEAR_ALL_EVENT))
    }

    /// Called with the id of the provider whose settings changed.
    pub fn on_settings_changed(
        &self,
        listener: impl Fn(&str) + Send + Sync + 'static,
    ) -> Subscription {
        self.store.subscribe(
            Some(SETTINGS_CHANGED_EVENT),
            Arc::new(move |event: &StoreEvent, _: &EventInfo| {
                match event.payload_as::<SettingsChangedPayload>() {
                    Ok(payload) => listener(&payload.test_provider_id),
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropped malformed settings-changed event");
                    }
                }
            }),
        )
    }
}

/// One provider's view of the store.
#[derive(Clone)]
pub struct ScopedTestProviderStore {
    store: Universal,
    test_provider_id: TestProviderId,
}

impl ScopedTestProviderStore {
    pub fn test_provider_id(&self) -> &str {
        &self.test_provider_id
    }

    /// Current state; pending if this provider never reported.
    pub fn get_state(&self) -> TestProviderState {
        self.store
            .get_state()
            .get(&self.test_provider_id)
            .copied()
            .unwrap_or_default()
    }

    /// Upsert only this provider's entry. Reaches other realms once synced.
    pub fn set_state(&self, state: TestProviderState) {
        let id = self.test_provider_id.clone();
        self.store.update_state(Arc::new(
            move |current: &TestProviderStateByProviderId| {
                let mut next = current.clone();
                next.insert(id.clone(), state);
                next
            },
        ));
    }

    /// Mark running, run `callback`, then mark succeeded or crashed.
    ///
    /// A returned error and a panic both end in
    /// [`TestProviderState::Crashed`]; neither reaches the caller.
    pub fn run_with_state<F, E>(&self, callback: F) -> TestProviderState
    where
        F: FnOnce() -> std::result::Result<(), E>,
        E: fmt::Display,
    {
        self.set_state(TestProviderState::Running);

        let outcome = match panic::catch_unwind(AssertUnwindSafe(callback)) {
            Ok(Ok(())) => TestProviderState::Succeeded,
            Ok(Err(e)) => {
                tracing::warn!(provider = %self.test_provider_id, error = %e, "Test provider run failed");
                TestProviderState::Crashed
            }
            Err(payload) => {
                tracing::warn!(provider = %self.test_provider_id, panic = panic_message(&*payload), "Test provider run panicked");
                TestProviderState::Crashed
            }
        };

        self.set_state(outcome);
        outcome
    }

    pub fn on_run_all(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.store.subscribe(
            Some(RUN_ALL_EVENT),
            Arc::new(move |_: &StoreEvent, _: &EventInfo| listener()),
        )
    }

    pub fn on_clear_all(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.store.subscribe(
            Some(CLEAR_ALL_EVENT),
            Arc::new(move |_: &StoreEvent, _: &EventInfo| listener()),
        )
    }

    /// Announce that this provider's settings changed.
    pub fn settings_changed(&self) -> Result<()> {
        let payload = SettingsChangedPayload {
            test_provider_id: self.test_provider_id.clone(),
        };
        self.store
            .send(StoreEvent::with_payload(SETTINGS_CHANGED_EVENT, &payload)?)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
