//! Request size limits for pg-store.
//!
//! Checked before a request touches the table. Violations are reported to
//! the client as an error response; the connection stays open.

use crate::config::LimitsConfig;
use pg_types::StoreRequest;

/// Why a request was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    /// Key longer than `max_key_len`.
    #[error("key too long: {len} bytes (limit: {limit} bytes)")]
    KeyTooLong {
        /// Actual key length.
        len: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// Value larger than `max_value_size`.
    #[error("value too large: {size} bytes (limit: {limit} bytes)")]
    ValueTooLarge {
        /// Actual value size.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// Empty keys are reserved.
    #[error("key must not be empty")]
    EmptyKey,
}

/// Validate a request against the configured limits.
pub fn check_request(limits: &LimitsConfig, request: &StoreRequest) -> Result<(), LimitError> {
    let key = match request {
        StoreRequest::Set { key, value } => {
            if value.len() > limits.max_value_size {
                return Err(LimitError::ValueTooLarge {
                    size: value.len(),
                    limit: limits.max_value_size,
                });
            }
            key
        }
        StoreRequest::Get { key }
        | StoreRequest::Delete { key }
        | StoreRequest::Check { key }
        | StoreRequest::Add { key, .. } => key,
        StoreRequest::Ping => return Ok(()),
    };

    if key.is_empty() {
        return Err(LimitError::EmptyKey);
    }
    if key.len() > limits.max_key_len {
        return Err(LimitError::KeyTooLong {
            len: key.len(),
            limit: limits.max_key_len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> LimitsConfig {
        LimitsConfig {
            max_key_len: 16,
            max_value_size: 8,
        }
    }

    #[test]
    fn accepts_requests_within_limits() {
        let req = StoreRequest::Set {
            key: "send_to/1/0".into(),
            value: vec![0; 8],
        };
        assert!(check_request(&limits(), &req).is_ok());
        assert!(check_request(&limits(), &StoreRequest::Ping).is_ok());
    }

    #[test]
    fn rejects_large_values() {
        let req = StoreRequest::Set {
            key: "k".into(),
            value: vec![0; 9],
        };
        assert_eq!(
            check_request(&limits(), &req),
            Err(LimitError::ValueTooLarge { size: 9, limit: 8 })
        );
    }

    #[test]
    fn rejects_long_keys_on_every_keyed_request() {
        let key = "x".repeat(17);
        for req in [
            StoreRequest::Get { key: key.clone() },
            StoreRequest::Delete { key: key.clone() },
            StoreRequest::Check { key: key.clone() },
            StoreRequest::Add {
                key: key.clone(),
                amount: 1,
            },
        ] {
            assert!(matches!(
                check_request(&limits(), &req),
                Err(LimitError::KeyTooLong { len: 17, limit: 16 })
            ));
        }
    }

    #[test]
    fn rejects_empty_key() {
        let req = StoreRequest::Get { key: String::new() };
        assert_eq!(check_request(&limits(), &req), Err(LimitError::EmptyKey));
    }
}
