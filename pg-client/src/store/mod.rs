//! Key-value store abstraction.
//!
//! A process group needs nothing from its store beyond four operations:
//! - `set()` upserts a value, visible to every peer once acknowledged
//! - `get()` waits until a key exists and returns its value
//! - `delete_key()` removes a key (idempotent)
//! - `check()` tests for a key without waiting
//!
//! Implementations:
//! - [`TcpStore`] talks to a `pg-store` server
//! - [`MemoryStore`] is in-process, for tests and single-process groups
//! - [`PrefixStore`] namespaces another store so groups can share it

mod memory;
mod prefix;
mod tcp;

pub use memory::MemoryStore;
pub use prefix::PrefixStore;
pub use tcp::TcpStore;

use async_trait::async_trait;
use pg_types::WireError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not open a connection.
    #[error("connection to {address} failed: {source}")]
    ConnectionFailed {
        /// Store address.
        address: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Gave up connecting after retrying.
    #[error("could not reach store at {address} within {waited:?}")]
    Timeout {
        /// Store address.
        address: String,
        /// How long we kept retrying.
        waited: Duration,
    },

    /// The server closed the connection mid-request.
    #[error("connection closed")]
    ConnectionClosed,

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame or message.
    #[error("protocol error: {0}")]
    Protocol(#[from] WireError),

    /// The server answered with a response of the wrong kind.
    #[error("unexpected response to {request}: {response}")]
    UnexpectedResponse {
        /// Request kind that was sent.
        request: &'static str,
        /// Debug rendering of what came back.
        response: String,
    },

    /// The server rejected the request.
    #[error("server error: {0}")]
    Server(String),

    /// Failure injected by [`MemoryStore`].
    #[error("injected failure: {0}")]
    Injected(String),
}

/// The shared key-value store a process group rendezvous on.
///
/// Must be linearizable: once `set` returns, every subsequent `get` or
/// `check` from any peer observes the value.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace the value under `key`.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Return the value under `key`, waiting until some peer writes it.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Remove `key`. Returns whether it existed.
    async fn delete_key(&self, key: &str) -> Result<bool, StoreError>;

    /// Whether `key` currently exists. Never waits.
    async fn check(&self, key: &str) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        (**self).get(key).await
    }

    async fn delete_key(&self, key: &str) -> Result<bool, StoreError> {
        (**self).delete_key(key).await
    }

    async fn check(&self, key: &str) -> Result<bool, StoreError> {
        (**self).check(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn arc_store_delegates() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

        store.set("k", b"v").await.unwrap();
        assert!(store.check("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), b"v");
        assert!(store.delete_key("k").await.unwrap());
        assert!(!store.check("k").await.unwrap());
    }

    #[test]
    fn errors_render_context() {
        let err = StoreError::Timeout {
            address: "10.0.0.1:29500".into(),
            waited: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("10.0.0.1:29500"));

        let err = StoreError::UnexpectedResponse {
            request: "get",
            response: "Pong".into(),
        };
        assert_eq!(err.to_string(), "unexpected response to get: Pong");
    }
}
