//! In-process message bus with one endpoint per realm.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::{Channel, ChannelHandler, HandlerId, WireCodec};

/// Bus configuration.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Encoding applied to every message in transit.
    pub codec: WireCodec,

    /// Upper bound on delivery rounds in a single `flush`.
    /// Default: 1000
    pub max_flush_rounds: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            codec: WireCodec::Json,
            max_flush_rounds: 1000,
        }
    }
}

/// Identifier of an endpoint on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EndpointId(pub u64);

/// An encoded message waiting in an endpoint inbox.
struct Message {
    event_name: String,
    bytes: Vec<u8>,
}

struct Peer {
    id: EndpointId,
    sender: Sender<Message>,
    connected: Arc<AtomicBool>,
}

struct BusShared {
    config: BusConfig,
    peers: RwLock<Vec<Peer>>,
    next_endpoint: AtomicU64,
}

/// Connects endpoints so that what one emits, every other one receives.
///
/// Delivery is deferred: messages sit in each endpoint's inbox until
/// [`BusEndpoint::pump`] or [`MemoryBus::flush`] runs.
pub struct MemoryBus {
    shared: Arc<BusShared>,
    endpoints: RwLock<Vec<Weak<BusEndpoint>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self {
            shared: Arc::new(BusShared {
                config,
                peers: RwLock::new(Vec::new()),
                next_endpoint: AtomicU64::new(1),
            }),
            endpoints: RwLock::new(Vec::new()),
        }
    }

    /// Attach a new endpoint (one realm) to the bus.
    pub fn endpoint(&self, name: &str) -> Arc<BusEndpoint> {
        let id = EndpointId(self.shared.next_endpoint.fetch_add(1, Ordering::SeqCst));
        let (sender, inbox) = unbounded();
        let connected = Arc::new(AtomicBool::new(true));

        self.shared.peers.write().push(Peer {
            id,
            sender,
            connected: Arc::clone(&connected),
        });

        let endpoint = Arc::new(BusEndpoint {
            id,
            name: name.to_string(),
            shared: Arc::clone(&self.shared),
            inbox,
            handlers: RwLock::new(HashMap::new()),
            next_handler: AtomicU64::new(1),
            connected,
        });
        self.endpoints.write().push(Arc::downgrade(&endpoint));

        tracing::debug!(endpoint = name, id = id.0, "Attached bus endpoint");
        endpoint
    }

    /// Deliver queued messages on every endpoint until the bus is quiet.
    ///
    /// Returns the number of messages delivered.
    pub fn flush(&self) -> usize {
        let mut delivered = 0;

        for _ in 0..self.shared.config.max_flush_rounds {
            let endpoints: Vec<Arc<BusEndpoint>> = {
                let mut list = self.endpoints.write();
                list.retain(|e| e.strong_count() > 0);
                list.iter().filter_map(Weak::upgrade).collect()
            };

            let round: usize = endpoints.iter().map(|e| e.pump()).sum();
            if round == 0 {
                return delivered;
            }
            delivered += round;
        }

        tracing::warn!(
            rounds = self.shared.config.max_flush_rounds,
            delivered,
            "Bus did not settle within the flush round limit"
        );
        delivered
    }

    /// Messages queued across all endpoints.
    pub fn pending(&self) -> usize {
        self.endpoints
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|e| e.pending())
            .sum()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One realm's view of the bus.
pub struct BusEndpoint {
    id: EndpointId,
    name: String,
    shared: Arc<BusShared>,
    inbox: Receiver<Message>,
    handlers: RwLock<HashMap<String, BTreeMap<HandlerId, ChannelHandler>>>,
    next_handler: AtomicU64,
    connected: Arc<AtomicBool>,
}

impl BusEndpoint {
    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Simulate losing (or regaining) the transport. While disconnected the
    /// endpoint neither sends nor receives; messages are dropped, not queued.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        tracing::debug!(endpoint = %self.name, connected, "Endpoint connectivity changed");
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Messages waiting in this endpoint's inbox.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// Deliver everything currently queued for this endpoint.
    ///
    /// Returns the number of messages taken from the inbox.
    pub fn pump(&self) -> usize {
        let messages: Vec<Message> = self.inbox.try_iter().collect();
        let count = messages.len();

        for message in messages {
            if !self.is_connected() {
                tracing::trace!(endpoint = %self.name, event = %message.event_name, "Dropped message while disconnected");
                continue;
            }

            let payload = match self.shared.config.codec.decode(&message.bytes) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(endpoint = %self.name, event = %message.event_name, error = %e, "Dropped undecodable message");
                    continue;
                }
            };

            let handlers: Vec<ChannelHandler> = self
                .handlers
                .read()
                .get(&message.event_name)
                .map(|by_id| by_id.values().cloned().collect())
                .unwrap_or_default();

            for handler in handlers {
                handler(&payload);
            }
        }

        count
    }

    pub fn handler_count(&self, event_name: &str) -> usize {
        self.handlers
            .read()
            .get(event_name)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

impl Channel for BusEndpoint {
    fn on(&self, event_name: &str, handler: ChannelHandler) -> HandlerId {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::SeqCst));
        self.handlers
            .write()
            .entry(event_name.to_string())
            .or_default()
            .insert(id, handler);
        id
    }

    fn off(&self, event_name: &str, id: HandlerId) {
        let mut handlers = self.handlers.write();
        if let Some(by_id) = handlers.get_mut(event_name) {
            by_id.remove(&id);
            if by_id.is_empty() {
                handlers.remove(event_name);
            }
        }
    }

    fn emit(&self, event_name: &str, payload: serde_json::Value) {
        if !self.is_connected() {
            tracing::trace!(endpoint = %self.name, event = event_name, "Emit skipped while disconnected");
            return;
        }

        let bytes = match self.shared.config.codec.encode(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(endpoint = %self.name, event = event_name, error = %e, "Failed to encode message");
                return;
            }
        };

        let peers = self.shared.peers.read();
        for peer in peers.iter() {
            if peer.id == self.id || !peer.connected.load(Ordering::SeqCst) {
                continue;
            }
            // A closed inbox means the peer endpoint is gone.
            let _ = peer.sender.send(Message {
                event_name: event_name.to_string(),
                bytes: bytes.clone(),
            });
        }
    }
}

impl Drop for BusEndpoint {
    fn drop(&mut self) {
        self.shared.peers.write().retain(|p| p.id != self.id);
    }
}

impl fmt::Debug for BusEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusEndpoint")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pending", &self.pending())
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder(endpoint: &BusEndpoint, event: &str) -> Arc<Mutex<Vec<serde_json::Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        endpoint.on(event, Arc::new(move |payload| sink.lock().push(payload.clone())));
        seen
    }

    #[test]
    fn test_emit_reaches_other_endpoints_only() {
        let bus = MemoryBus::new();
        let a = bus.endpoint("a");
        let b = bus.endpoint("b");
        let c = bus.endpoint("c");

        let seen_a = recorder(&a, "ping");
        let seen_b = recorder(&b, "ping");
        let seen_c = recorder(&c, "ping");

        a.emit("ping", json!({"n": 1}));
        assert_eq!(bus.pending(), 2);
        assert_eq!(bus.flush(), 2);

        assert!(seen_a.lock().is_empty());
        assert_eq!(*seen_b.lock(), vec![json!({"n": 1})]);
        assert_eq!(*seen_c.lock(), vec![json!({"n": 1})]);
    }

    #[test]
    fn test_delivery_is_deferred_until_pump() {
        let bus = MemoryBus::new();
        let a = bus.endpoint("a");
        let b = bus.endpoint("b");
        let seen = recorder(&b, "ping");

        a.emit("ping", json!(1));
        assert!(seen.lock().is_empty());

        assert_eq!(b.pump(), 1);
        assert_eq!(*seen.lock(), vec![json!(1)]);
    }

    #[test]
    fn test_off_removes_handler() {
        let bus = MemoryBus::new();
        let a = bus.endpoint("a");
        let b = bus.endpoint("b");

        let seen = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&seen);
        let id = b.on("ping", Arc::new(move |_| *sink.lock() += 1));
        b.off("ping", id);
        assert_eq!(b.handler_count("ping"), 0);

        a.emit("ping", json!(null));
        bus.flush();
        assert_eq!(*seen.lock(), 0);
    }

    #[test]
    fn test_disconnected_endpoint_drops_messages() {
        let bus = MemoryBus::new();
        let a = bus.endpoint("a");
        let b = bus.endpoint("b");
        let seen = recorder(&b, "ping");

        b.set_connected(false);
        a.emit("ping", json!(1));
        bus.flush();
        assert!(seen.lock().is_empty());

        b.set_connected(true);
        a.emit("ping", json!(2));
        bus.flush();
        assert_eq!(*seen.lock(), vec![json!(2)]);
    }

    #[test]
    fn test_messagepack_transport() {
        let bus = MemoryBus::with_config(BusConfig {
            codec: WireCodec::MessagePack,
            ..Default::default()
        });
        let a = bus.endpoint("a");
        let b = bus.endpoint("b");
        let seen = recorder(&b, "state");

        a.emit("state", json!({"provider-1": "test-provider-state:running"}));
        bus.flush();
        assert_eq!(
            *seen.lock(),
            vec![json!({"provider-1": "test-provider-state:running"})]
        );
    }

    #[test]
    fn test_dropped_endpoint_leaves_bus() {
        let bus = MemoryBus::new();
        let a = bus.endpoint("a");
        let b = bus.endpoint("b");
        drop(b);

        a.emit("ping", json!(1));
        assert_eq!(bus.flush(), 0);
    }

    #[test]
    fn test_flush_follows_replies() {
        let bus = MemoryBus::new();
        let a = bus.endpoint("a");
        let b = bus.endpoint("b");

        // b answers every ping with a pong
        let replier = Arc::clone(&b);
        b.on("ping", Arc::new(move |_| replier.emit("pong", json!(null))));
        let pongs = recorder(&a, "pong");

        a.emit("ping", json!(null));
        assert_eq!(bus.flush(), 2);
        assert_eq!(pongs.lock().len(), 1);
    }
}
