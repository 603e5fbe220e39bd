//! Encoding of channel payloads in transit.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Wire format used by the in-memory bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WireCodec {
    #[default]
    Json,
    MessagePack,
}

impl WireCodec {
    pub fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>> {
        match self {
            WireCodec::Json => Ok(serde_json::to_vec(value)?),
            WireCodec::MessagePack => Ok(rmp_serde::to_vec_named(value)?),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value> {
        match self {
            WireCodec::Json => serde_json::from_slice(bytes)
                .map_err(|e| crate::error::SyncError::Deserialization(e.to_string())),
            WireCodec::MessagePack => Ok(rmp_serde::from_slice(bytes)?),
        }
    }
}
