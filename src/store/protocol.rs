//! Wire protocol spoken between store instances sharing an id.
//!
//! Every message is an [`Envelope`]: the event itself plus the [`EventInfo`]
//! naming who produced it. Internal messages use `__`-prefixed event types;
//! everything else is a custom event passed through to subscribers.

use crate::error::{Result, SyncError};
use crate::types::{ActorId, EventInfo, StoreEvent};
use serde::{Deserialize, Serialize};

/// Prefix of every store channel event name.
pub const CHANNEL_EVENT_PREFIX: &str = "UNIVERSAL_STORE";

pub const EXISTING_STATE_REQUEST: &str = "__EXISTING_STATE_REQUEST";
pub const EXISTING_STATE_RESPONSE: &str = "__EXISTING_STATE_RESPONSE";
pub const SET_STATE: &str = "__SET_STATE";
pub const LEADER_CREATED: &str = "__LEADER_CREATED";
pub const FOLLOWER_CREATED: &str = "__FOLLOWER_CREATED";

/// Channel event name for a store: `<prefix>:<namespace>:<store id>`.
pub fn channel_event_name(namespace: &str, store_id: &str) -> String {
    format!("{}:{}:{}", CHANNEL_EVENT_PREFIX, namespace, store_id)
}

/// What travels over the channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub event: StoreEvent,
    pub event_info: EventInfo,
}

impl Envelope {
    pub fn encode(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn decode(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| SyncError::InvalidEnvelope(e.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct ExistingStateResponsePayload {
    state: serde_json::Value,
    requester: ActorId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct SetStatePayload {
    state: serde_json::Value,
    /// Per-follower write counter; 0 for writes made by the leader itself.
    #[serde(default)]
    seq: u64,
}

/// Decoded protocol message.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Message {
    ExistingStateRequest,
    ExistingStateResponse {
        state: serde_json::Value,
        requester: ActorId,
    },
    SetState {
        state: serde_json::Value,
        seq: u64,
    },
    LeaderCreated,
    FollowerCreated,
    Custom(StoreEvent),
}

impl Message {
    pub(crate) fn from_event(event: StoreEvent) -> Result<Self> {
        let event_type = event.event_type.clone();
        let message = match event_type.as_str() {
            EXISTING_STATE_REQUEST => Message::ExistingStateRequest,
            EXISTING_STATE_RESPONSE => {
                let payload: ExistingStateResponsePayload = event.payload_as()?;
                Message::ExistingStateResponse {
                    state: payload.state,
                    requester: payload.requester,
                }
            }
            SET_STATE => {
                let payload: SetStatePayload = event.payload_as()?;
                Message::SetState {
                    state: payload.state,
                    seq: payload.seq,
                }
            }
            LEADER_CREATED => Message::LeaderCreated,
            FOLLOWER_CREATED => Message::FollowerCreated,
            other if other.starts_with(crate::types::RESERVED_EVENT_PREFIX) => {
                return Err(SyncError::InvalidEnvelope(format!(
                    "unknown protocol event {}",
                    other
                )))
            }
            _ => Message::Custom(event),
        };
        Ok(message)
    }

    pub(crate) fn into_event(self) -> Result<StoreEvent> {
        match self {
            Message::ExistingStateRequest => Ok(StoreEvent::new(EXISTING_STATE_REQUEST)),
            Message::ExistingStateResponse { state, requester } => StoreEvent::with_payload(
                EXISTING_STATE_RESPONSE,
                &ExistingStateResponsePayload { state, requester },
            ),
            Message::SetState { state, seq } => {
                StoreEvent::with_payload(SET_STATE, &SetStatePayload { state, seq })
            }
            Message::LeaderCreated => Ok(StoreEvent::new(LEADER_CREATED)),
            Message::FollowerCreated => Ok(StoreEvent::new(FOLLOWER_CREATED)),
            Message::Custom(event) => Ok(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Actor, ActorType, Environment};
    use serde_json::json;

    #[test]
    fn test_channel_event_name() {
        assert_eq!(
            channel_event_name("default", "core/status"),
            "UNIVERSAL_STORE:default:core/status"
        );
    }

    #[test]
    fn test_set_state_event_shape() {
        let event = Message::SetState {
            state: json!({"a": 1}),
            seq: 3,
        }
        .into_event()
        .unwrap();

        assert_eq!(event.event_type, SET_STATE);
        assert_eq!(event.payload, json!({"state": {"a": 1}, "seq": 3}));
        assert_eq!(
            Message::from_event(event).unwrap(),
            Message::SetState {
                state: json!({"a": 1}),
                seq: 3
            }
        );
    }

    #[test]
    fn test_custom_events_pass_through() {
        let event = StoreEvent::new("run-all");
        assert_eq!(
            Message::from_event(event.clone()).unwrap(),
            Message::Custom(event)
        );
    }

    #[test]
    fn test_unknown_reserved_event_rejected() {
        let result = Message::from_event(StoreEvent::new("__MYSTERY"));
        assert!(matches!(result, Err(SyncError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_envelope_decode_rejects_garbage() {
        assert!(matches!(
            Envelope::decode(&json!({"nope": true})),
            Err(SyncError::InvalidEnvelope(_))
        ));

        let envelope = Envelope {
            event: StoreEvent::new(LEADER_CREATED),
            event_info: EventInfo::from_actor(Actor::new(ActorType::Leader, Environment::Server)),
        };
        let value = envelope.encode().unwrap();
        assert!(value.get("eventInfo").is_some());
        assert_eq!(Envelope::decode(&value).unwrap(), envelope);
    }
}
