//! Per-realm registry of synchronized stores.
//!
//! Built once at application start and passed to whatever needs a store, so
//! each id maps to exactly one instance per realm.

use crate::channel::Channel;
use crate::error::{Result, SyncError};
use crate::status::{StatusStore, StatusesByTypeId, STATUS_STORE_ID};
use crate::store::{create_store, RealmConfig, State, StoreOptions, UniversalStore};
use crate::test_provider::{TestProviderStateByProviderId, TestProviderStore, TEST_PROVIDER_STORE_ID};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type AnyStore = Arc<dyn Any + Send + Sync>;

/// Owns every store instance of one realm, keyed by store id.
pub struct StoreRegistry {
    realm: RealmConfig,
    channel: Option<Arc<dyn Channel>>,
    stores: RwLock<HashMap<String, AnyStore>>,
}

impl StoreRegistry {
    pub fn new(realm: RealmConfig, channel: Option<Arc<dyn Channel>>) -> Self {
        Self {
            realm,
            channel,
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// A registry whose stores talk over `channel`.
    pub fn with_channel<C: Channel + 'static>(realm: RealmConfig, channel: Arc<C>) -> Self {
        Self::new(realm, Some(channel as Arc<dyn Channel>))
    }

    /// A registry whose stores never leave this realm.
    pub fn standalone(realm: RealmConfig) -> Self {
        Self::new(realm, None)
    }

    pub fn realm(&self) -> &RealmConfig {
        &self.realm
    }

    /// Create and register a store. Fails if the id is taken.
    pub fn create<S: State>(&self, options: StoreOptions<S>) -> Result<Arc<dyn UniversalStore<S>>> {
        let mut stores = self.stores.write();
        if stores.contains_key(&options.id) {
            return Err(SyncError::StoreExists(options.id));
        }

        let id = options.id.clone();
        let store = create_store(options, &self.realm, self.channel.clone());
        stores.insert(id.clone(), Arc::new(Arc::clone(&store)));

        tracing::debug!(store = %id, environment = %self.realm.environment, "Registered store");
        Ok(store)
    }

    /// Look up a store. Fails if it was registered with another state type.
    pub fn get<S: State>(&self, id: &str) -> Result<Option<Arc<dyn UniversalStore<S>>>> {
        let stores = self.stores.read();
        match stores.get(id) {
            None => Ok(None),
            Some(store) => store
                .downcast_ref::<Arc<dyn UniversalStore<S>>>()
                .cloned()
                .map(Some)
                .ok_or_else(|| SyncError::StoreTypeMismatch(id.to_string())),
        }
    }

    pub fn get_or_create<S: State>(&self, options: StoreOptions<S>) -> Result<Arc<dyn UniversalStore<S>>> {
        if let Some(store) = self.get::<S>(&options.id)? {
            return Ok(store);
        }
        match self.create(options) {
            Err(SyncError::StoreExists(id)) => self
                .get::<S>(&id)?
                .ok_or(SyncError::StoreExists(id)),
            other => other,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.stores.read().contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.stores.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The built-in status store. The server realm leads it.
    pub fn status_store(&self) -> Result<StatusStore> {
        let store = self.get_or_create(StoreOptions {
            id: STATUS_STORE_ID.to_string(),
            leader: self.realm.environment.leads_by_default(),
            initial_state: StatusesByTypeId::new(),
        })?;
        Ok(StatusStore::new(store, Some(self.realm.environment)))
    }

    /// The built-in test provider store. The server realm leads it.
    pub fn test_provider_store(&self) -> Result<TestProviderStore> {
        let store = self.get_or_create(StoreOptions {
            id: TEST_PROVIDER_STORE_ID.to_string(),
            leader: self.realm.environment.leads_by_default(),
            initial_state: TestProviderStateByProviderId::new(),
        })?;
        Ok(TestProviderStore::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActorType, StoreStatus};

    #[test]
    fn test_create_and_get() {
        let registry = StoreRegistry::standalone(RealmConfig::server());
        let store = registry.create(StoreOptions::leader("n", 1u32)).unwrap();
        store.set_state(2);

        let again = registry.get::<u32>("n").unwrap().unwrap();
        assert_eq!(again.get_state(), 2);
        assert!(registry.get::<u32>("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = StoreRegistry::standalone(RealmConfig::server());
        registry.create(StoreOptions::leader("n", 1u32)).unwrap();

        let result = registry.create(StoreOptions::leader("n", 1u32));
        assert!(matches!(result, Err(SyncError::StoreExists(_))));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let registry = StoreRegistry::standalone(RealmConfig::server());
        registry.create(StoreOptions::leader("n", 1u32)).unwrap();

        let result = registry.get::<String>("n");
        assert!(matches!(result, Err(SyncError::StoreTypeMismatch(_))));
    }

    #[test]
    fn test_get_or_create_reuses_instance() {
        let registry = StoreRegistry::standalone(RealmConfig::server());
        let first = registry.get_or_create(StoreOptions::leader("n", 1u32)).unwrap();
        let second = registry.get_or_create(StoreOptions::leader("n", 5u32)).unwrap();

        assert_eq!(first.actor().id, second.actor().id);
        assert_eq!(second.get_state(), 1);
        assert_eq!(registry.ids(), vec!["n".to_string()]);
    }

    #[test]
    fn test_builtin_store_leadership_follows_environment() {
        let server = StoreRegistry::standalone(RealmConfig::server());
        let status = server.status_store().unwrap();
        assert_eq!(status.universal_store().actor().actor_type, ActorType::Leader);

        let manager = StoreRegistry::standalone(RealmConfig::manager());
        let providers = manager.test_provider_store().unwrap();
        assert_eq!(providers.universal_store().actor().actor_type, ActorType::Follower);
        assert_eq!(providers.universal_store().status(), StoreStatus::Unprepared);

        assert!(server.contains(STATUS_STORE_ID));
        assert!(manager.contains(TEST_PROVIDER_STORE_ID));
    }
}
