//! JSON encoding of stored payloads.

use rtcs_core::StoreError;
use serde::{Serialize, de::DeserializeOwned};

/// Encode a caller payload for storage.
pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|err| StoreError::Encode { reason: err.to_string() })
}

/// Decode the payload stored at `key`.
///
/// A payload that does not decode is a corrupt record, never "absent".
pub(crate) fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|err| StoreError::corrupt(key, err))
}
