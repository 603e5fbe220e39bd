//! Follower implementation: an optimistic replica of the leader's state.

use crate::channel::Channel;
use crate::error::Result;
use crate::subscriptions::Subscription;
use crate::types::{Actor, ActorId, ActorType, EventInfo, StoreEvent, StoreStatus};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use super::protocol::Message;
use super::shared::StoreCore;
use super::{
    EventListener, Readiness, RealmConfig, State, StateListener, StoreOptions, UniversalStore,
    Updater,
};

/// Events held while waiting for the leader. The oldest are dropped beyond this.
const OUTBOX_LIMIT: usize = 1024;

/// A local write not yet confirmed by the leader.
#[derive(Clone, Debug)]
struct PendingWrite<S> {
    state: S,
    /// 0 while the write is still queued behind the handshake.
    seq: u64,
}

/// Two-phase replica: what the leader last confirmed, plus our own
/// unconfirmed write on top of it.
struct Replica<S> {
    committed: S,
    pending: Option<PendingWrite<S>>,
    /// Updaters issued before the handshake, replayed on the leader's state.
    queued: Vec<Updater<S>>,
    next_seq: u64,
}

impl<S: State> Replica<S> {
    fn new(initial: S) -> Self {
        Self {
            committed: initial,
            pending: None,
            queued: Vec::new(),
            next_seq: 0,
        }
    }

    fn visible(&self) -> &S {
        self.pending
            .as_ref()
            .map(|p| &p.state)
            .unwrap_or(&self.committed)
    }

    fn stage(&mut self, state: S) -> u64 {
        self.next_seq += 1;
        self.pending = Some(PendingWrite {
            state,
            seq: self.next_seq,
        });
        self.next_seq
    }

    /// Take the leader's value. Our pending write survives only if this is
    /// the echo of an older write of ours.
    fn commit(&mut self, state: S, own_seq: Option<u64>) {
        self.committed = state;
        let keep = match (&self.pending, own_seq) {
            (Some(pending), Some(seq)) => pending.seq > seq,
            _ => false,
        };
        if !keep {
            self.pending = None;
        }
    }
}

/// A non-authoritative store instance.
///
/// Writes apply locally at once and are sent to the leader; whatever the
/// leader broadcasts back replaces the local value. Before the handshake
/// completes, writes and events are held back and replayed afterwards.
/// Without a channel there is nothing to wait for: writes commit locally and
/// events are delivered at once.
pub struct FollowerStore<S> {
    core: StoreCore<S>,
    replica: Mutex<Replica<S>>,
    /// Events sent before the handshake. Lock before `replica`.
    outbox: Mutex<VecDeque<StoreEvent>>,
}

impl<S: State> FollowerStore<S> {
    /// Create the follower and start the handshake with the leader.
    ///
    /// Without a channel the follower stays [`StoreStatus::Unprepared`] and
    /// works as a local-only store.
    pub fn new(
        options: StoreOptions<S>,
        realm: &RealmConfig,
        channel: Option<Arc<dyn Channel>>,
    ) -> Arc<Self> {
        let actor = Actor::new(ActorType::Follower, realm.environment);
        let status = if channel.is_some() {
            StoreStatus::Syncing
        } else {
            StoreStatus::Unprepared
        };

        let store = Arc::new(Self {
            core: StoreCore::new(options.id, actor, &realm.namespace, channel, status),
            replica: Mutex::new(Replica::new(options.initial_state)),
            outbox: Mutex::new(VecDeque::new()),
        });

        let weak: Weak<Self> = Arc::downgrade(&store);
        store.core.attach(Arc::new(move |payload| {
            if let Some(store) = weak.upgrade() {
                store.handle(payload);
            }
        }));

        tracing::debug!(store = %store.core.id, actor = %store.core.actor.id, "Created follower");
        store.core.emit_own(Message::FollowerCreated);
        store.core.emit_own(Message::ExistingStateRequest);
        store
    }

    /// Our unconfirmed write, if any.
    pub fn pending_state(&self) -> Option<S> {
        self.replica.lock().pending.as_ref().map(|p| p.state.clone())
    }

    /// The last value confirmed by the leader.
    pub fn committed_state(&self) -> S {
        self.replica.lock().committed.clone()
    }

    fn handle(&self, payload: &serde_json::Value) {
        let Some((message, info)) = self.core.receive(payload) else {
            return;
        };

        match message {
            Message::ExistingStateResponse { state, requester } => {
                if requester == self.core.actor.id {
                    self.complete_handshake(state);
                }
            }
            Message::SetState { state, seq } => {
                if !info.sender().is_leader() {
                    // Another follower's write; wait for the leader's relay.
                    return;
                }
                self.apply_leader_state(state, seq, &info.actor.id);
            }
            Message::LeaderCreated => {
                tracing::debug!(store = %self.core.id, leader = %info.actor.id, "Leader announced, resyncing");
                self.core.set_status(StoreStatus::Syncing);
                self.core.emit_own(Message::ExistingStateRequest);
            }
            Message::Custom(event) => {
                if info.actor.id == self.core.actor.id || !info.sender().is_leader() {
                    return;
                }
                self.core.deliver_event(&event, &info);
            }
            Message::ExistingStateRequest | Message::FollowerCreated => {}
        }
    }

    fn complete_handshake(&self, state: serde_json::Value) {
        let leader_state = match self.core.decode_state(state) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(store = %self.core.id, error = %e, "Dropped undecodable existing state");
                return;
            }
        };

        let mut outbox = self.outbox.lock();
        let (next, prev, rebased) = {
            let mut replica = self.replica.lock();
            let prev = replica.visible().clone();

            replica.commit(leader_state, None);
            let queued = std::mem::take(&mut replica.queued);
            let rebased = if queued.is_empty() {
                None
            } else {
                let state = queued
                    .iter()
                    .fold(replica.committed.clone(), |state, updater| updater(&state));
                let seq = replica.stage(state.clone());
                Some((state, seq))
            };

            self.core.set_status(StoreStatus::Ready);
            (replica.visible().clone(), prev, rebased)
        };
        let events = std::mem::take(&mut *outbox);
        drop(outbox);

        tracing::debug!(
            store = %self.core.id,
            replayed_events = events.len(),
            rebased = rebased.is_some(),
            "Follower synced with leader"
        );

        self.core.notify_state(&next, &prev);
        if let Some((state, seq)) = rebased {
            self.send_write(&state, seq);
        }
        for event in events {
            self.dispatch(event);
        }
        self.core.readiness.resolve();
    }

    fn apply_leader_state(&self, state: serde_json::Value, seq: u64, origin: &ActorId) {
        if !self.core.is_ready() {
            tracing::trace!(store = %self.core.id, "Ignoring broadcast before handshake");
            return;
        }

        let leader_state = match self.core.decode_state(state) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(store = %self.core.id, error = %e, "Dropped undecodable leader state");
                return;
            }
        };

        let (next, prev) = {
            let mut replica = self.replica.lock();
            let prev = replica.visible().clone();
            let own_seq = (origin == &self.core.actor.id).then_some(seq);
            replica.commit(leader_state, own_seq);
            (replica.visible().clone(), prev)
        };

        self.core.notify_state(&next, &prev);
    }

    fn send_write(&self, state: &S, seq: u64) {
        match self.core.encode_state(state) {
            Ok(state) => self.core.emit_own(Message::SetState { state, seq }),
            Err(e) => {
                tracing::warn!(store = %self.core.id, error = %e, "Failed to encode follower write");
            }
        }
    }

    /// Apply a local write. `replaces_state` marks writes that ignore the
    /// previous value, which make any updater queued before them moot.
    fn write(&self, updater: Updater<S>, replaces_state: bool) {
        let (next, prev, staged) = {
            let mut replica = self.replica.lock();
            let prev = replica.visible().clone();
            let next = updater(&prev);

            let staged = if !self.core.has_channel() {
                replica.commit(next.clone(), None);
                None
            } else if self.core.is_ready() {
                Some(replica.stage(next.clone()))
            } else {
                if replaces_state {
                    replica.queued.clear();
                }
                replica.queued.push(updater);
                replica.pending = Some(PendingWrite {
                    state: next.clone(),
                    seq: 0,
                });
                None
            };
            (next, prev, staged)
        };

        self.core.notify_state(&next, &prev);
        if let Some(seq) = staged {
            self.send_write(&next, seq);
        }
    }

    fn dispatch(&self, event: StoreEvent) {
        let info = EventInfo::from_actor(self.core.actor.clone());
        self.core.deliver_event(&event, &info);
        self.core.emit(Message::Custom(event), info);
    }
}

impl<S: State> UniversalStore<S> for FollowerStore<S> {
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
        self.replica.lock().visible().clone()
    }

    fn update_state(&self, updater: Updater<S>) {
        self.write(updater, false);
    }

    fn set_state(&self, state: S) {
        self.write(Arc::new(move |_: &S| state.clone()), true);
    }

    fn on_state_change(&self, listener: StateListener<S>) -> Subscription {
        self.core.on_state_change(listener)
    }

    fn send(&self, event: StoreEvent) -> Result<()> {
        self.core.check_sendable(&event)?;

        {
            let mut outbox = self.outbox.lock();
            if self.core.has_channel() && !self.core.is_ready() {
                if outbox.len() >= OUTBOX_LIMIT {
                    if let Some(dropped) = outbox.pop_front() {
                        tracing::warn!(store = %self.core.id, event = %dropped.event_type, "Outbox full, dropped oldest held event");
                    }
                }
                tracing::debug!(store = %self.core.id, event = %event.event_type, "Holding event until synced");
                outbox.push_back(event);
                return Ok(());
            }
        }

        self.dispatch(event);
        Ok(())
    }

    fn subscribe(&self, event_type: Option<&str>, listener: EventListener) -> Subscription {
        self.core.subscribe(event_type, listener)
    }

    fn until_ready(&self) -> Readiness {
        self.core.readiness.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryBus;

    #[test]
    fn test_replica_visible_prefers_pending() {
        let mut replica = Replica::new(1u32);
        assert_eq!(*replica.visible(), 1);

        replica.stage(2);
        assert_eq!(*replica.visible(), 2);
        assert_eq!(replica.committed, 1);
    }

    #[test]
    fn test_replica_own_echo_settles_pending() {
        let mut replica = Replica::new(0u32);
        let seq = replica.stage(5);

        replica.commit(5, Some(seq));
        assert!(replica.pending.is_none());
        assert_eq!(*replica.visible(), 5);
    }

    #[test]
    fn test_replica_keeps_newer_pending_on_stale_echo() {
        let mut replica = Replica::new(0u32);
        let first = replica.stage(1);
        replica.stage(2);

        replica.commit(1, Some(first));
        assert_eq!(replica.committed, 1);
        assert_eq!(*replica.visible(), 2);
    }

    #[test]
    fn test_replica_leader_wins_over_pending() {
        let mut replica = Replica::new(0u32);
        replica.stage(9);

        replica.commit(4, None);
        assert!(replica.pending.is_none());
        assert_eq!(*replica.visible(), 4);
    }

    #[test]
    fn test_follower_without_channel_works_locally() {
        let follower = FollowerStore::new(
            StoreOptions::follower("n", 0u32),
            &RealmConfig::manager(),
            None,
        );
        assert_eq!(follower.status(), StoreStatus::Unprepared);
        assert!(!follower.until_ready().is_ready());

        follower.set_state(3);
        assert_eq!(follower.get_state(), 3);
        assert_eq!(follower.pending_state(), None);
        assert_eq!(follower.committed_state(), 3);
    }

    #[test]
    fn test_standalone_follower_holds_nothing() {
        let follower = FollowerStore::new(
            StoreOptions::follower("n", 0u32),
            &RealmConfig::manager(),
            None,
        );
        let hits = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&hits);
        follower.subscribe(Some("ping"), Arc::new(move |_: &StoreEvent, _: &EventInfo| *sink.lock() += 1));

        for i in 0..10_000u32 {
            follower.set_state(i);
            follower.update_state(Arc::new(|n: &u32| n + 1));
            follower.send(StoreEvent::new("ping")).unwrap();
        }

        assert_eq!(follower.get_state(), 10_000);
        assert_eq!(*hits.lock(), 10_000);
        assert!(follower.replica.lock().queued.is_empty());
        assert!(follower.outbox.lock().is_empty());
    }

    fn unanswered_follower() -> Arc<FollowerStore<u32>> {
        let bus = MemoryBus::new();
        FollowerStore::new(
            StoreOptions::follower("n", 0u32),
            &RealmConfig::manager(),
            Some(bus.endpoint("manager") as Arc<dyn Channel>),
        )
    }

    #[test]
    fn test_unready_follower_holds_events() {
        let follower = unanswered_follower();
        let hits = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&hits);
        follower.subscribe(Some("ping"), Arc::new(move |_: &StoreEvent, _: &EventInfo| *sink.lock() += 1));

        follower.send(StoreEvent::new("ping")).unwrap();
        assert_eq!(*hits.lock(), 0);
        assert_eq!(follower.outbox.lock().len(), 1);
    }

    #[test]
    fn test_unanswered_follower_queues_stay_bounded() {
        let follower = unanswered_follower();
        assert_eq!(follower.status(), StoreStatus::Syncing);

        for i in 0..10_000u32 {
            follower.set_state(i);
            follower.send(StoreEvent::new("ping")).unwrap();
        }

        assert_eq!(follower.get_state(), 9_999);
        assert_eq!(follower.replica.lock().queued.len(), 1);
        assert_eq!(follower.outbox.lock().len(), OUTBOX_LIMIT);
    }

    #[test]
    fn test_whole_state_write_drops_earlier_updaters() {
        let follower = unanswered_follower();

        follower.update_state(Arc::new(|n: &u32| n + 1));
        follower.update_state(Arc::new(|n: &u32| n + 1));
        follower.set_state(10);
        follower.update_state(Arc::new(|n: &u32| n * 2));

        assert_eq!(follower.get_state(), 20);
        assert_eq!(follower.replica.lock().queued.len(), 2);
    }
}
