//! Cache Payload Codec
//!
//! The single serialization boundary for cached values. Encoding failures are
//! caller bugs and surface as errors; decoding failures mean a corrupt or
//! outdated entry and are reported as `None` so the caller recomputes.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Serialize a value for storage
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Deserialize a stored payload, treating any failure as absence
pub fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, error = %e, "Discarding undecodable cache payload");
            None
        }
    }
}
