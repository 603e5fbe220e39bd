//! # Realm Sync
//!
//! Keeps one piece of state consistent across isolated realms (a server
//! process, a control UI, a sandboxed content frame) that share nothing but
//! an asynchronous message channel.
//!
//! ## Core Concepts
//!
//! - **Channel**: abstract pub/sub transport keyed by event name
//! - **Universal store**: one instance per store id per realm; a single
//!   leader owns the state, followers apply writes optimistically and defer
//!   to the leader's broadcasts
//! - **Binding**: selector-based snapshot that only re-renders on change
//! - **Status store**: per-story statuses partitioned by type id
//! - **Test provider store**: per-provider run lifecycle plus broadcast
//!   commands
//!
//! ## Example
//!
//! ```ignore
//! use realm_sync::{MemoryBus, RealmConfig, StoreRegistry, Status, StatusValue};
//!
//! let bus = MemoryBus::new();
//! let server = StoreRegistry::with_channel(RealmConfig::server(), bus.endpoint("server"));
//! let manager = StoreRegistry::with_channel(RealmConfig::manager(), bus.endpoint("manager"));
//!
//! let leader = server.status_store()?;
//! let follower = manager.status_store()?;
//! bus.flush();
//!
//! follower.full_status_store().set(vec![
//!     Status::new("button--primary", "a11y", StatusValue::Warning),
//! ]);
//! bus.flush();
//!
//! assert_eq!(leader.full_status_store().get_all().len(), 1);
//! ```

pub mod binding;
pub mod channel;
pub mod error;
pub mod registry;
pub mod status;
pub mod store;
pub mod subscriptions;
pub mod test_provider;
pub mod types;

// Re-exports
pub use binding::{
    use_universal_store, use_universal_store_state, MemoizedSelector, StateSetter, StoreBinding,
};
pub use channel::{BusConfig, BusEndpoint, Channel, ChannelHandler, HandlerId, MemoryBus, WireCodec};
pub use error::{Result, SyncError};
pub use registry::StoreRegistry;
pub use status::{
    FullStatusStore, Status, StatusStore, StatusValue, StatusesByTypeId, TypeIdStatusStore,
};
pub use store::{
    create_store, EventListener, FollowerStore, LeaderStore, Readiness, RealmConfig, State,
    StateListener, StoreOptions, UniversalStore, Updater,
};
pub use subscriptions::{Subscription, SubscriptionId};
pub use test_provider::{
    FullTestProviderStore, ScopedTestProviderStore, TestProviderState,
    TestProviderStateByProviderId, TestProviderStore,
};
pub use types::*;
