//! Test provider store: per-provider run lifecycle plus broadcast commands.
//!
//! ```text
//! pending ──run_with_state──▶ running ──Ok──▶ succeeded
//!                                 └──Err/panic──▶ crashed
//! ```
//!
//! Any state may also be set directly from any other.

mod store;
mod types;

pub use store::{FullTestProviderStore, ScopedTestProviderStore, TestProviderStore};
pub use types::{
    TestProviderId, TestProviderState, TestProviderStateByProviderId, CLEAR_ALL_EVENT,
    RUN_ALL_EVENT, SETTINGS_CHANGED_EVENT, TEST_PROVIDER_STORE_ID,
};
