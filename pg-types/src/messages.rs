//! Key-value store protocol messages.
//!
//! A client sends one [`StoreRequest`] per frame and waits for exactly one
//! [`StoreResponse`]. `Get` is answered only once the key exists.

use serde::{Deserialize, Serialize};

use crate::WireError;

/// Requests a client can send to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreRequest {
    /// Upsert a value
    Set {
        /// Key to write
        key: String,
        /// Opaque value bytes
        #[serde(with = "serde_bytes_compat")]
        value: Vec<u8>,
    },
    /// Read a value, waiting until the key exists
    Get {
        /// Key to read
        key: String,
    },
    /// Remove a key (idempotent)
    Delete {
        /// Key to remove
        key: String,
    },
    /// Non-blocking existence check
    Check {
        /// Key to test
        key: String,
    },
    /// Atomically add to an integer counter stored under `key`
    Add {
        /// Counter key
        key: String,
        /// Amount to add (may be negative)
        amount: i64,
    },
    /// Liveness probe
    Ping,
}

impl StoreRequest {
    /// Short name of the request kind, for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreRequest::Set { .. } => "set",
            StoreRequest::Get { .. } => "get",
            StoreRequest::Delete { .. } => "delete",
            StoreRequest::Check { .. } => "check",
            StoreRequest::Add { .. } => "add",
            StoreRequest::Ping => "ping",
        }
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }
}

/// Responses sent by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreResponse {
    /// Write acknowledged
    Done,
    /// Value for a `Get`
    Value {
        /// The stored bytes
        #[serde(with = "serde_bytes_compat")]
        value: Vec<u8>,
    },
    /// Result of a `Delete`
    Deleted {
        /// Whether a key was actually removed
        existed: bool,
    },
    /// Result of a `Check`
    Exists {
        /// Whether the key is present
        exists: bool,
    },
    /// Counter value after an `Add`
    Counter {
        /// New counter value
        value: i64,
    },
    /// Answer to `Ping`
    Pong,
    /// The request was rejected
    Error {
        /// Human-readable reason
        message: String,
    },
}

impl StoreResponse {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }
}

/// Encode `Vec<u8>` as a MessagePack bin instead of an array of integers.
mod serde_bytes_compat {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        struct BytesVisitor;

        impl<'de> serde::de::Visitor<'de> for BytesVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a byte buffer")
            }

            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E: serde::de::Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
                Ok(v)
            }

            fn visit_seq<A: serde::de::SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> Result<Vec<u8>, A::Error> {
                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(b) = seq.next_element::<u8>()? {
                    out.push(b);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_byte_buf(BytesVisitor)
    }
}
