//! Status store: per-story statuses partitioned by type id.
//!
//! Each status-producing feature owns one type id bucket. The full store sees
//! every bucket; [`TypeIdStatusStore`] narrows every operation to one.

mod store;
mod types;

pub use store::{
    FullStatusStore, SelectListener, StatusListener, StatusStore, TypeIdStatusStore,
};
pub use types::{
    flatten, Status, StatusTypeId, StatusValue, StatusesByTypeId, StoryId, SELECT_EVENT,
    STATUS_STORE_ID,
};
