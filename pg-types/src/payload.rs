//! MessagePack encoding of values exchanged between ranks.
//!
//! The store only ever sees opaque bytes; both ends agree on `T`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::WireError;

/// Serialize a value for storage.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, WireError> {
    rmp_serde::to_vec(value).map_err(WireError::Serialization)
}

/// Deserialize a value read from the store.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
}
