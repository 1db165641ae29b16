//! Error types for pg-store.

use pg_types::WireError;

/// Main error type for store server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Could not bind the listening socket.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address that was requested.
        address: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-connection protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Malformed frame or message body.
    #[error("invalid message: {0}")]
    Wire(#[from] WireError),

    /// Client sent bytes while a blocking GET was outstanding.
    #[error("unexpected data while a request was pending")]
    UnexpectedData,

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(#[from] std::io::Error),
}

/// Table-level errors reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// `ADD` on a key whose value is not an integer.
    #[error("value under {key} is not an integer counter")]
    NotACounter {
        /// The key.
        key: String,
    },

    /// Counter arithmetic overflowed.
    #[error("counter {key} overflowed")]
    Overflow {
        /// The key.
        key: String,
    },
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
