//! Status store operations layered on one synchronized store.

use crate::binding::{use_universal_store, StoreBinding};
use crate::error::{Result, SyncError};
use crate::store::UniversalStore;
use crate::subscriptions::Subscription;
use crate::types::{Environment, EventInfo, StoreEvent};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::types::{flatten, Status, StatusTypeId, StatusesByTypeId, SELECT_EVENT};

/// Called with `(statuses, prev_statuses)` on every relevant change.
pub type StatusListener = Arc<dyn Fn(&[Status], &[Status]) + Send + Sync>;

/// Called with the statuses a user selected.
pub type SelectListener = Arc<dyn Fn(&[Status]) + Send + Sync>;

type Universal = Arc<dyn UniversalStore<StatusesByTypeId>>;

/// Entry point handing out the full and the type-scoped status stores.
#[derive(Clone)]
pub struct StatusStore {
    store: Universal,
}

impl StatusStore {
    /// `environment` names the calling realm for diagnostics; leadership is
    /// already fixed by the universal store passed in.
    pub fn new(universal_status_store: Universal, environment: Option<Environment>) -> Self {
        tracing::debug!(
            store = %universal_status_store.id(),
            environment = %environment.unwrap_or_default(),
            actor = ?universal_status_store.actor().actor_type,
            "Status store attached"
        );
        Self {
            store: universal_status_store,
        }
    }

    pub fn universal_store(&self) -> &Universal {
        &self.store
    }

    /// Global view across all type ids.
    pub fn full_status_store(&self) -> FullStatusStore {
        FullStatusStore {
            store: Arc::clone(&self.store),
        }
    }

    /// View narrowed to one type id bucket.
    pub fn type_id_store(&self, type_id: impl Into<String>) -> TypeIdStatusStore {
        TypeIdStatusStore {
            store: Arc::clone(&self.store),
            type_id: type_id.into(),
        }
    }

    /// Bind a selector over the flattened list (or one bucket when `type_id`
    /// is given). The binding only re-renders when the selection changes.
    pub fn use_status_store<T, F>(&self, type_id: Option<&str>, selector: F) -> StoreBinding<StatusesByTypeId, T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&[Status]) -> T + Send + Sync + 'static,
    {
        let type_id = type_id.map(str::to_string);
        use_universal_store(Arc::clone(&self.store), move |state: &StatusesByTypeId| {
            match &type_id {
                Some(type_id) => selector(bucket(state, type_id)),
                None => selector(&flatten(state)),
            }
        })
    }
}

/// Operations over every bucket.
#[derive(Clone)]
pub struct FullStatusStore {
    store: Universal,
}

impl FullStatusStore {
    pub fn get_all(&self) -> Vec<Status> {
        flatten(&self.store.get_state())
    }

    /// Type ids that currently hold at least one status.
    pub fn type_ids(&self) -> Vec<StatusTypeId> {
        self.store.get_state().into_keys().collect()
    }

    /// Upsert every status by `(type_id, story_id)` in a single state update.
    pub fn set(&self, statuses: Vec<Status>) {
        if statuses.is_empty() {
            return;
        }
        let groups = group_by_type_id(statuses);
        self.store.update_state(Arc::new(move |state: &StatusesByTypeId| {
            let mut next = state.clone();
            for (type_id, statuses) in &groups {
                upsert(next.entry(type_id.clone()).or_default(), statuses);
            }
            next
        }));
    }

    /// Remove statuses matching both filters; `None` matches everything.
    pub fn unset(&self, type_ids: Option<&[&str]>, story_ids: Option<&[&str]>) {
        let type_ids = owned(type_ids);
        let story_ids = owned(story_ids);
        self.store.update_state(Arc::new(move |state: &StatusesByTypeId| {
            unset_statuses(state, type_ids.as_deref(), story_ids.as_deref())
        }));
    }

    pub fn on_status_change(&self, listener: StatusListener) -> Subscription {
        self.store.on_state_change(Arc::new(
            move |state: &StatusesByTypeId, prev: &StatusesByTypeId| {
                listener(&flatten(state), &flatten(prev));
            },
        ))
    }

    /// Tell every realm that these statuses were selected.
    pub fn select_statuses(&self, statuses: Vec<Status>) -> Result<()> {
        self.store
            .send(StoreEvent::with_payload(SELECT_EVENT, &statuses)?)
    }

    pub fn on_select(&self, listener: SelectListener) -> Subscription {
        subscribe_select(&self.store, None, listener)
    }
}

/// Operations narrowed to a single type id.
#[derive(Clone)]
pub struct TypeIdStatusStore {
    store: Universal,
    type_id: StatusTypeId,
}

impl TypeIdStatusStore {
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn get_all(&self) -> Vec<Status> {
        bucket(&self.store.get_state(), &self.type_id).to_vec()
    }

    /// Upsert statuses into this bucket.
    ///
    /// Fails without applying anything if a status names another type id.
    pub fn set(&self, statuses: Vec<Status>) -> Result<()> {
        self.check_type_ids(&statuses)?;
        if statuses.is_empty() {
            return Ok(());
        }

        let type_id = self.type_id.clone();
        self.store.update_state(Arc::new(move |state: &StatusesByTypeId| {
            let mut next = state.clone();
            upsert(next.entry(type_id.clone()).or_default(), &statuses);
            next
        }));
        Ok(())
    }

    /// Remove this bucket's statuses for `story_ids`, or the whole bucket.
    pub fn unset(&self, story_ids: Option<&[&str]>) {
        let type_ids = vec![self.type_id.clone()];
        let story_ids = owned(story_ids);
        self.store.update_state(Arc::new(move |state: &StatusesByTypeId| {
            unset_statuses(state, Some(type_ids.as_slice()), story_ids.as_deref())
        }));
    }

    /// Fires only when this bucket changes.
    pub fn on_status_change(&self, listener: StatusListener) -> Subscription {
        let type_id = self.type_id.clone();
        self.store.on_state_change(Arc::new(
            move |state: &StatusesByTypeId, prev: &StatusesByTypeId| {
                let next = bucket(state, &type_id);
                let prev = bucket(prev, &type_id);
                if next != prev {
                    listener(next, prev);
                }
            },
        ))
    }

    pub fn select_statuses(&self, statuses: Vec<Status>) -> Result<()> {
        self.check_type_ids(&statuses)?;
        self.store
            .send(StoreEvent::with_payload(SELECT_EVENT, &statuses)?)
    }

    /// Selection events, narrowed to this type id. Skips selections that
    /// contain none of our statuses.
    pub fn on_select(&self, listener: SelectListener) -> Subscription {
        subscribe_select(&self.store, Some(self.type_id.clone()), listener)
    }

    fn check_type_ids(&self, statuses: &[Status]) -> Result<()> {
        match statuses.iter().find(|s| s.type_id != self.type_id) {
            Some(status) => Err(SyncError::StatusTypeIdMismatch {
                expected: self.type_id.clone(),
                got: status.type_id.clone(),
                story_id: status.story_id.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn bucket<'a>(state: &'a StatusesByTypeId, type_id: &str) -> &'a [Status] {
    state.get(type_id).map(Vec::as_slice).unwrap_or(&[])
}

fn owned(ids: Option<&[&str]>) -> Option<Vec<String>> {
    ids.map(|ids| ids.iter().map(|id| id.to_string()).collect())
}

fn group_by_type_id(statuses: Vec<Status>) -> BTreeMap<StatusTypeId, Vec<Status>> {
    let mut groups: BTreeMap<StatusTypeId, Vec<Status>> = BTreeMap::new();
    for status in statuses {
        groups.entry(status.type_id.clone()).or_default().push(status);
    }
    groups
}

/// Replace the entry with the same story id, or append.
fn upsert(bucket: &mut Vec<Status>, statuses: &[Status]) {
    for status in statuses {
        match bucket.iter_mut().find(|s| s.story_id == status.story_id) {
            Some(existing) => *existing = status.clone(),
            None => bucket.push(status.clone()),
        }
    }
}

fn unset_statuses(
    state: &StatusesByTypeId,
    type_ids: Option<&[String]>,
    story_ids: Option<&[String]>,
) -> StatusesByTypeId {
    match (type_ids, story_ids) {
        (None, None) => StatusesByTypeId::new(),
        (Some(type_ids), None) => state
            .iter()
            .filter(|(type_id, _)| !type_ids.contains(*type_id))
            .map(|(type_id, statuses)| (type_id.clone(), statuses.clone()))
            .collect(),
        (type_ids, Some(story_ids)) => state
            .iter()
            .filter_map(|(type_id, statuses)| {
                let in_scope = type_ids.map_or(true, |ids| ids.contains(type_id));
                if !in_scope {
                    return Some((type_id.clone(), statuses.clone()));
                }
                let kept: Vec<Status> = statuses
                    .iter()
                    .filter(|s| !story_ids.contains(&s.story_id))
                    .cloned()
                    .collect();
                (!kept.is_empty()).then(|| (type_id.clone(), kept))
            })
            .collect(),
    }
}

fn subscribe_select(
    store: &Universal,
    type_id: Option<StatusTypeId>,
    listener: SelectListener,
) -> Subscription {
    store.subscribe(
        Some(SELECT_EVENT),
        Arc::new(move |event: &StoreEvent, _: &EventInfo| {
            let statuses: Vec<Status> = match event.payload_as() {
                Ok(statuses) => statuses,
                Err(e) => {
                    tracing::warn!(error = %e, "Dropped malformed status selection");
                    return;
                }
            };
            match &type_id {
                Some(type_id) => {
                    let ours: Vec<Status> = statuses
                        .into_iter()
                        .filter(|s| &s.type_id == type_id)
                        .collect();
                    if !ours.is_empty() {
                        listener(&ours);
                    }
                }
                None => listener(&statuses),
            }
        }),
    )
}
