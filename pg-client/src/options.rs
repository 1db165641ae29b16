//! Tunables for a process group.
//!
//! Durations are given in seconds (fractions allowed) when deserialized:
//!
//! ```toml
//! [group]
//! data_expiration = 600
//! connect_timeout = 30
//! recv_timeout = 2.5
//! key_prefix = "job-42"
//! ```

use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Process group options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GroupOptions {
    /// How long a key this rank wrote survives before the next send deletes
    /// it (default: 3600s).
    #[serde(deserialize_with = "secs")]
    data_expiration: Duration,
    /// How long non-hosting ranks keep retrying the store (default: 300s).
    #[serde(deserialize_with = "secs")]
    connect_timeout: Duration,
    /// Bound on each wait in receive-side operations (default: none).
    #[serde(deserialize_with = "optional_secs")]
    recv_timeout: Option<Duration>,
    /// Namespace for every key this group touches (default: none).
    key_prefix: Option<String>,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            data_expiration: Duration::from_secs(3600),
            connect_timeout: Duration::from_secs(300),
            recv_timeout: None,
            key_prefix: None,
        }
    }
}

impl GroupOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key time-to-live.
    pub fn with_data_expiration(mut self, ttl: Duration) -> Self {
        self.data_expiration = ttl;
        self
    }

    /// Set how long to retry connecting to the store.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound every receive-side wait.
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    /// Namespace all keys under `prefix`.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Key time-to-live.
    pub fn data_expiration(&self) -> Duration {
        self.data_expiration
    }

    /// Store connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Default receive bound, if any.
    pub fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout
    }

    /// Key namespace, if any.
    pub fn key_prefix(&self) -> Option<&str> {
        self.key_prefix.as_deref()
    }
}

fn secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

fn optional_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    Option::<f64>::deserialize(deserializer)?
        .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = GroupOptions::default();
        assert_eq!(options.data_expiration(), Duration::from_secs(3600));
        assert_eq!(options.connect_timeout(), Duration::from_secs(300));
        assert_eq!(options.recv_timeout(), None);
        assert_eq!(options.key_prefix(), None);
    }

    #[test]
    fn builder_sets_fields() {
        let options = GroupOptions::new()
            .with_data_expiration(Duration::from_secs(10))
            .with_connect_timeout(Duration::from_secs(1))
            .with_recv_timeout(Duration::from_millis(250))
            .with_key_prefix("job");

        assert_eq!(options.data_expiration(), Duration::from_secs(10));
        assert_eq!(options.connect_timeout(), Duration::from_secs(1));
        assert_eq!(options.recv_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(options.key_prefix(), Some("job"));
    }

    #[test]
    fn deserializes_from_toml() {
        let toml = r#"
data_expiration = 600
recv_timeout = 2.5
key_prefix = "job-42"
"#;
        let options: GroupOptions = toml::from_str(toml).unwrap();

        assert_eq!(options.data_expiration(), Duration::from_secs(600));
        assert_eq!(options.connect_timeout(), Duration::from_secs(300));
        assert_eq!(options.recv_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(options.key_prefix(), Some("job-42"));
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let options: GroupOptions = toml::from_str("").unwrap();
        assert_eq!(options, GroupOptions::default());
    }

    #[test]
    fn negative_duration_is_rejected() {
        let result: Result<GroupOptions, _> = toml::from_str("data_expiration = -1");
        assert!(result.is_err());
    }
}
