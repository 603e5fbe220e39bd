//! State shared by leader and follower implementations.

use crate::channel::{Channel, ChannelHandler, HandlerId};
use crate::error::{Result, SyncError};
use crate::subscriptions::{ListenerSet, Subscription};
use crate::types::{Actor, EventInfo, StoreEvent, StoreStatus};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use super::protocol::{channel_event_name, Envelope, Message};
use super::{EventListener, Readiness, State, StateListener};

type EventEntry = (Option<String>, EventListener);

/// Identity, listeners and channel wiring of one store instance.
pub(crate) struct StoreCore<S> {
    pub(crate) id: String,
    pub(crate) actor: Actor,
    event_name: String,
    channel: Option<Arc<dyn Channel>>,
    state_listeners: Arc<ListenerSet<StateListener<S>>>,
    event_listeners: Arc<ListenerSet<EventEntry>>,
    status: RwLock<StoreStatus>,
    pub(crate) readiness: Readiness,
    handler: Mutex<Option<HandlerId>>,
}

impl<S: State> StoreCore<S> {
    pub(crate) fn new(
        id: String,
        actor: Actor,
        namespace: &str,
        channel: Option<Arc<dyn Channel>>,
        status: StoreStatus,
    ) -> Self {
        let readiness = if status.is_ready() {
            Readiness::resolved()
        } else {
            Readiness::pending()
        };

        Self {
            event_name: channel_event_name(namespace, &id),
            id,
            actor,
            channel,
            state_listeners: ListenerSet::new(),
            event_listeners: ListenerSet::new(),
            status: RwLock::new(status),
            readiness,
            handler: Mutex::new(None),
        }
    }

    pub(crate) fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    /// Register the message handler on the channel.
    pub(crate) fn attach(&self, handler: ChannelHandler) {
        if let Some(channel) = &self.channel {
            let id = channel.on(&self.event_name, handler);
            *self.handler.lock() = Some(id);
        }
    }

    pub(crate) fn status(&self) -> StoreStatus {
        self.status.read().clone()
    }

    pub(crate) fn set_status(&self, status: StoreStatus) {
        let mut current = self.status.write();
        if *current != status {
            tracing::debug!(store = %self.id, from = ?*current, to = ?status, "Store status changed");
            *current = status;
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.status.read().is_ready()
    }

    /// Put a message on the channel. No-op without a channel.
    pub(crate) fn emit(&self, message: Message, info: EventInfo) {
        let Some(channel) = &self.channel else {
            return;
        };

        let encoded = message.into_event().and_then(|event| {
            Envelope {
                event,
                event_info: info,
            }
            .encode()
        });

        match encoded {
            Ok(payload) => channel.emit(&self.event_name, payload),
            Err(e) => {
                tracing::warn!(store = %self.id, error = %e, "Failed to encode store message");
            }
        }
    }

    /// Emit a message authored by this instance.
    pub(crate) fn emit_own(&self, message: Message) {
        self.emit(message, EventInfo::from_actor(self.actor.clone()));
    }

    /// Decode an incoming envelope, dropping our own messages.
    pub(crate) fn receive(&self, payload: &serde_json::Value) -> Option<(Message, EventInfo)> {
        let envelope = match Envelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(store = %self.id, error = %e, "Dropped malformed envelope");
                return None;
            }
        };

        if envelope.event_info.sender().id == self.actor.id {
            return None;
        }

        match Message::from_event(envelope.event) {
            Ok(message) => Some((message, envelope.event_info)),
            Err(e) => {
                tracing::warn!(store = %self.id, error = %e, "Dropped unknown store message");
                None
            }
        }
    }

    pub(crate) fn encode_state(&self, state: &S) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(state)?)
    }

    pub(crate) fn decode_state(&self, value: serde_json::Value) -> Result<S> {
        serde_json::from_value(value).map_err(|e| SyncError::Deserialization(e.to_string()))
    }

    pub(crate) fn on_state_change(&self, listener: StateListener<S>) -> Subscription {
        self.state_listeners.add(listener)
    }

    pub(crate) fn subscribe(&self, event_type: Option<&str>, listener: EventListener) -> Subscription {
        self.event_listeners
            .add((event_type.map(str::to_string), listener))
    }

    /// Notify state listeners in subscription order. Skips value-equal updates.
    pub(crate) fn notify_state(&self, state: &S, prev: &S) {
        if state == prev {
            return;
        }
        for listener in self.state_listeners.snapshot() {
            listener(state, prev);
        }
    }

    pub(crate) fn deliver_event(&self, event: &StoreEvent, info: &EventInfo) {
        for (filter, listener) in self.event_listeners.snapshot() {
            if filter.as_deref().map_or(true, |t| t == event.event_type) {
                listener(event, info);
            }
        }
    }

    pub(crate) fn check_sendable(&self, event: &StoreEvent) -> Result<()> {
        if event.is_reserved() {
            return Err(SyncError::ReservedEventType(event.event_type.clone()));
        }
        Ok(())
    }
}

impl<S> Drop for StoreCore<S> {
    fn drop(&mut self) {
        if let (Some(channel), Some(id)) = (&self.channel, self.handler.lock().take()) {
            channel.off(&self.event_name, id);
        }
    }
}
