//! Abstract pub/sub transport connecting realms.
//!
//! Stores only ever talk to a [`Channel`]. The crate ships [`MemoryBus`], an
//! in-process bus whose endpoints stand in for realms: messages are encoded
//! with a [`WireCodec`] in transit and delivered when the bus is flushed.

mod bus;
mod codec;

pub use bus::{BusConfig, BusEndpoint, EndpointId, MemoryBus};
pub use codec::WireCodec;

use std::sync::Arc;

/// Callback invoked with the decoded payload of a channel message.
pub type ChannelHandler = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Identifier of a handler registered with [`Channel::on`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(pub u64);

/// Bidirectional transport keyed by string event names.
///
/// `emit` must not deliver a message back to the endpoint that sent it.
pub trait Channel: Send + Sync {
    fn on(&self, event_name: &str, handler: ChannelHandler) -> HandlerId;

    fn off(&self, event_name: &str, id: HandlerId);

    fn emit(&self, event_name: &str, payload: serde_json::Value);
}
