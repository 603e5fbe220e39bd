//! Synchronized store engine.
//!
//! One [`UniversalStore`] instance exists per store id per realm. Exactly one
//! realm creates a [`LeaderStore`], which owns the authoritative state; every
//! other realm creates a [`FollowerStore`], which keeps an optimistic replica
//! and defers to the leader on every broadcast.
//!
//! # Example
//!
//! ```ignore
//! let bus = MemoryBus::new();
//! let server = bus.endpoint("server");
//! let manager = bus.endpoint("manager");
//!
//! let leader = create_store(StoreOptions::leader("counter", 0u32), &RealmConfig::server(), Some(server as Arc<dyn Channel>));
//! let follower = create_store(StoreOptions::follower("counter", 0u32), &RealmConfig::manager(), Some(manager as Arc<dyn Channel>));
//! bus.flush();
//!
//! follower.set_state(5);
//! bus.flush();
//! assert_eq!(leader.get_state(), 5);
//! ```

mod follower;
mod leader;
pub mod protocol;
mod readiness;
mod shared;

pub use follower::FollowerStore;
pub use leader::LeaderStore;
pub use readiness::Readiness;

use crate::channel::Channel;
use crate::error::Result;
use crate::subscriptions::Subscription;
use crate::types::{Actor, Environment, EventInfo, StoreEvent, StoreStatus};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Bounds every synchronized state type must satisfy.
pub trait State: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> State for T where T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Called with `(state, prev_state)` after every local state change.
pub type StateListener<S> = Arc<dyn Fn(&S, &S) + Send + Sync>;

/// Called with each custom event and where it came from.
pub type EventListener = Arc<dyn Fn(&StoreEvent, &EventInfo) + Send + Sync>;

/// Computes the next state from the previous one. May run more than once on a
/// follower that writes before its handshake completes.
pub type Updater<S> = Arc<dyn Fn(&S) -> S + Send + Sync>;

/// Construction options for one store instance.
#[derive(Clone, Debug)]
pub struct StoreOptions<S> {
    /// Cross-realm key; must be unique per namespace.
    pub id: String,

    /// Exactly one realm per id sets this.
    pub leader: bool,

    /// Value before any write or sync.
    pub initial_state: S,
}

impl<S> StoreOptions<S> {
    pub fn leader(id: impl Into<String>, initial_state: S) -> Self {
        Self {
            id: id.into(),
            leader: true,
            initial_state,
        }
    }

    pub fn follower(id: impl Into<String>, initial_state: S) -> Self {
        Self {
            id: id.into(),
            leader: false,
            initial_state,
        }
    }
}

/// Which realm a store lives in and which namespace its messages use.
#[derive(Clone, Debug)]
pub struct RealmConfig {
    pub environment: Environment,

    /// Middle segment of every channel event name.
    /// Default: "default"
    pub namespace: String,
}

impl RealmConfig {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            ..Default::default()
        }
    }

    pub fn server() -> Self {
        Self::new(Environment::Server)
    }

    pub fn manager() -> Self {
        Self::new(Environment::Manager)
    }

    pub fn preview() -> Self {
        Self::new(Environment::Preview)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Unknown,
            namespace: "default".to_string(),
        }
    }
}

/// Typed get/set/subscribe surface shared by leaders and followers.
pub trait UniversalStore<S: State>: Send + Sync {
    fn id(&self) -> &str;

    fn actor(&self) -> &Actor;

    /// Current sync status. A follower that sees a new leader drops back to
    /// [`StoreStatus::Syncing`] until it resyncs, holding sends meanwhile.
    fn status(&self) -> StoreStatus;

    /// Local value. Never touches the channel.
    fn get_state(&self) -> S;

    /// Replace the state with `updater(previous)`.
    fn update_state(&self, updater: Updater<S>);

    fn set_state(&self, state: S) {
        self.update_state(Arc::new(move |_: &S| state.clone()));
    }

    fn on_state_change(&self, listener: StateListener<S>) -> Subscription;

    /// Broadcast a custom event to local and remote subscribers once ready.
    ///
    /// Fails if the event type uses the reserved `__` prefix.
    fn send(&self, event: StoreEvent) -> Result<()>;

    /// Subscribe to one custom event type, or to all of them with `None`.
    fn subscribe(&self, event_type: Option<&str>, listener: EventListener) -> Subscription;

    /// Resolves after the first handshake and never un-resolves. Check
    /// [`UniversalStore::status`] to see a later resync in progress.
    fn until_ready(&self) -> Readiness;
}

/// Create a leader or follower according to `options.leader`.
pub fn create_store<S: State>(
    options: StoreOptions<S>,
    realm: &RealmConfig,
    channel: Option<Arc<dyn Channel>>,
) -> Arc<dyn UniversalStore<S>> {
    if options.leader {
        return LeaderStore::new(options, realm, channel);
    }
    FollowerStore::new(options, realm, channel)
}
