//! Listener bookkeeping for state changes and custom events.
//!
//! Every registration hands back a [`Subscription`] whose `unsubscribe` is
//! idempotent and keeps working after the owning store is dropped.
//!
//! # Example
//!
//! ```ignore
//! let listeners: Arc<ListenerSet<Arc<dyn Fn(&u32) + Send + Sync>>> = ListenerSet::new();
//! let sub = listeners.add(Arc::new(|n| println!("got {n}")));
//!
//! for listener in listeners.snapshot() {
//!     listener(&1);
//! }
//!
//! sub.unsubscribe();
//! sub.unsubscribe(); // no-op
//! ```

mod manager;
mod types;

pub(crate) use manager::ListenerSet;
pub use types::{Subscription, SubscriptionId};
