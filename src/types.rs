//! Core types shared by the store engine and the domain stores.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Prefix reserved for protocol-internal event types.
pub const RESERVED_EVENT_PREFIX: &str = "__";

/// Realm a store instance lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Server,
    Manager,
    Preview,
    #[default]
    Unknown,
}

impl Environment {
    /// Whether this realm leads the built-in stores by default.
    pub fn leads_by_default(self) -> bool {
        matches!(self, Environment::Server)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Server => "server",
            Environment::Manager => "manager",
            Environment::Preview => "preview",
            Environment::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Role an actor plays for one store id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActorType {
    Leader,
    Follower,
}

/// Identifier of a single store instance in a single realm.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

static NEXT_ACTOR: AtomicU64 = AtomicU64::new(1);

impl ActorId {
    /// Generate an id unique across realms.
    pub fn generate() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let n = NEXT_ACTOR.fetch_add(1, Ordering::Relaxed);
        ActorId(format!("{:x}-{:x}-{}", std::process::id(), nanos, n))
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.0)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The party that produced a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: ActorId,
    #[serde(rename = "type")]
    pub actor_type: ActorType,
    pub environment: Environment,
}

impl Actor {
    pub fn new(actor_type: ActorType, environment: Environment) -> Self {
        Self {
            id: ActorId::generate(),
            actor_type,
            environment,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.actor_type == ActorType::Leader
    }
}

/// Metadata delivered alongside every state change or event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    /// Actor that originated the change.
    pub actor: Actor,
    /// Leader that relayed it, when it came from another follower.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarding_actor: Option<Actor>,
}

impl EventInfo {
    pub fn from_actor(actor: Actor) -> Self {
        Self {
            actor,
            forwarding_actor: None,
        }
    }

    /// The actor that put this message on the channel.
    pub fn sender(&self) -> &Actor {
        self.forwarding_actor.as_ref().unwrap_or(&self.actor)
    }
}

/// Synchronization phase of a store instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreStatus {
    /// Created without a channel to sync over.
    Unprepared,
    /// Waiting for the leader to answer the handshake.
    Syncing,
    Ready,
    /// Irrecoverable protocol violation, e.g. a second leader.
    Error(String),
}

impl StoreStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, StoreStatus::Ready)
    }
}

/// Fire-and-forget signal carried alongside store state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl StoreEvent {
    /// An event with no payload.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// An event with a serialized payload.
    pub fn with_payload(event_type: impl Into<String>, payload: &impl Serialize) -> Result<Self> {
        Ok(Self {
            event_type: event_type.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Decode the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| crate::error::SyncError::Deserialization(e.to_string()))
    }

    pub fn is_reserved(&self) -> bool {
        self.event_type.starts_with(RESERVED_EVENT_PREFIX)
    }
}
