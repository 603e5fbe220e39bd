//! Leader implementation: owns the authoritative state for a store id.

use crate::channel::Channel;
use crate::error::{Result, SyncError};
use crate::subscriptions::Subscription;
use crate::types::{Actor, ActorType, EventInfo, StoreEvent, StoreStatus};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

use super::protocol::Message;
use super::shared::StoreCore;
use super::{
    EventListener, Readiness, RealmConfig, State, StateListener, StoreOptions, UniversalStore,
    Updater,
};

/// The single writer for a store id.
///
/// Applies every write (local or relayed from a follower) and rebroadcasts the
/// full resulting state. Ready from the moment it is created. Once a rival
/// leader is detected the store is in error and stops accepting follower
/// writes; its own local writes still apply.
pub struct LeaderStore<S> {
    core: StoreCore<S>,
    state: RwLock<S>,
}

impl<S: State> LeaderStore<S> {
    /// Create the leader and announce it on the channel.
    ///
    /// `options.leader` is not consulted; see [`super::create_store`].
    pub fn new(
        options: StoreOptions<S>,
        realm: &RealmConfig,
        channel: Option<Arc<dyn Channel>>,
    ) -> Arc<Self> {
        let actor = Actor::new(ActorType::Leader, realm.environment);
        let store = Arc::new(Self {
            core: StoreCore::new(
                options.id,
                actor,
                &realm.namespace,
                channel,
                StoreStatus::Ready,
            ),
            state: RwLock::new(options.initial_state),
        });

        let weak: Weak<Self> = Arc::downgrade(&store);
        store.core.attach(Arc::new(move |payload| {
            if let Some(store) = weak.upgrade() {
                store.handle(payload);
            }
        }));

        tracing::debug!(store = %store.core.id, actor = %store.core.actor.id, standalone = !store.core.has_channel(), "Created leader");
        store.core.emit_own(Message::LeaderCreated);
        store
    }

    fn handle(&self, payload: &serde_json::Value) {
        let Some((message, info)) = self.core.receive(payload) else {
            return;
        };

        match message {
            Message::ExistingStateRequest => self.answer_existing_state(&info),
            Message::LeaderCreated => self.on_rival_leader(&info),
            Message::FollowerCreated => {
                tracing::debug!(store = %self.core.id, follower = %info.actor.id, environment = %info.actor.environment, "Follower joined");
            }
            Message::ExistingStateResponse { .. } => {
                tracing::trace!(store = %self.core.id, "Ignoring state response addressed to followers");
            }
            Message::SetState { state, seq } => {
                if info.actor.is_leader() {
                    return;
                }
                if let StoreStatus::Error(reason) = self.core.status() {
                    tracing::warn!(store = %self.core.id, follower = %info.actor.id, %reason, "Ignoring follower write while in error");
                    return;
                }
                if let Err(e) = self.apply_follower_write(state, seq, info) {
                    tracing::warn!(store = %self.core.id, error = %e, "Rejected follower write");
                }
            }
            Message::Custom(event) => {
                if info.actor.is_leader() {
                    return;
                }
                self.core.deliver_event(&event, &info);
                self.core.emit(Message::Custom(event), self.forwarded(info));
            }
        }
    }

    fn answer_existing_state(&self, info: &EventInfo) {
        let state = self.state.read().clone();
        match self.core.encode_state(&state) {
            Ok(state) => {
                tracing::debug!(store = %self.core.id, follower = %info.actor.id, "Answering existing state request");
                self.core.emit_own(Message::ExistingStateResponse {
                    state,
                    requester: info.actor.id.clone(),
                });
            }
            Err(e) => {
                tracing::warn!(store = %self.core.id, error = %e, "Failed to encode state for follower");
            }
        }
    }

    fn on_rival_leader(&self, info: &EventInfo) {
        let error = SyncError::DuplicateLeader(self.core.id.clone());
        tracing::error!(store = %self.core.id, rival = %info.actor.id, environment = %info.actor.environment, "{}", error);

        // Answer once so the rival learns about us too.
        let already_failed = matches!(self.core.status(), StoreStatus::Error(_));
        self.core.set_status(StoreStatus::Error(error.to_string()));
        if !already_failed {
            self.core.emit_own(Message::LeaderCreated);
        }
    }

    fn apply_follower_write(&self, state: serde_json::Value, seq: u64, info: EventInfo) -> Result<()> {
        let next: S = self.core.decode_state(state.clone())?;
        let prev = {
            let mut current = self.state.write();
            std::mem::replace(&mut *current, next.clone())
        };

        self.core.notify_state(&next, &prev);
        // Echo to everyone, the writer included, so it can settle its pending write.
        self.core
            .emit(Message::SetState { state, seq }, self.forwarded(info));
        Ok(())
    }

    fn forwarded(&self, info: EventInfo) -> EventInfo {
        EventInfo {
            actor: info.actor,
            forwarding_actor: Some(self.core.actor.clone()),
        }
    }
}

impl<S: State> UniversalStore<S> for LeaderStore<S> {
    fn id(&self) -> &str {
        &self.core.id
    }

    fn actor(&self) -> &Actor {
        &self.core.actor
    }

    fn status(&self) -> StoreStatus {
        self.core.status()
    }

    fn get_state(&self) -> S {
        self.state.read().clone()
    }

    fn update_state(&self, updater: Updater<S>) {
        let (next, prev) = {
            let mut current = self.state.write();
            let next = updater(&current);
            let prev = std::mem::replace(&mut *current, next.clone());
            (next, prev)
        };

        if next == prev {
            return;
        }

        self.core.notify_state(&next, &prev);
        match self.core.encode_state(&next) {
            Ok(state) => self.core.emit_own(Message::SetState { state, seq: 0 }),
            Err(e) => {
                tracing::warn!(store = %self.core.id, error = %e, "Failed to encode state broadcast");
            }
        }
    }

    fn on_state_change(&self, listener: StateListener<S>) -> Subscription {
        self.core.on_state_change(listener)
    }

    fn send(&self, event: StoreEvent) -> Result<()> {
        self.core.check_sendable(&event)?;

        let info = EventInfo::from_actor(self.core.actor.clone());
        self.core.deliver_event(&event, &info);
        self.core.emit(Message::Custom(event), info);
        Ok(())
    }

    fn subscribe(&self, event_type: Option<&str>, listener: EventListener) -> Subscription {
        self.core.subscribe(event_type, listener)
    }

    fn until_ready(&self) -> Readiness {
        self.core.readiness.clone()
    }
}
