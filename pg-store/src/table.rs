//! The shared key-value table.
//!
//! Values are opaque bytes. Readers that ask for a missing key park on a
//! [`Notify`] that every write signals, then re-check.

use crate::error::TableError;
use dashmap::DashMap;
use tokio::sync::Notify;

/// Concurrent key-value table with blocking reads.
#[derive(Debug, Default)]
pub struct KeyTable {
    entries: DashMap<String, Vec<u8>>,
    changed: Notify,
}

impl KeyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value and wake blocked readers.
    pub fn set(&self, key: String, value: Vec<u8>) {
        self.entries.insert(key, value);
        self.changed.notify_waiters();
    }

    /// Current value, if present.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    /// Wait until `key` exists and return its value.
    pub async fn wait_for(&self, key: &str) -> Vec<u8> {
        loop {
            // Register interest before checking so a concurrent set can't slip
            // between the check and the wait.
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.get(key) {
                return value;
            }
            notified.await;
        }
    }

    /// Remove a key. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Atomically add `amount` to the decimal counter under `key`.
    ///
    /// A missing key counts as zero.
    pub fn add(&self, key: &str, amount: i64) -> Result<i64, TableError> {
        let value = {
            let mut entry = self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| b"0".to_vec());

            let current: i64 = std::str::from_utf8(entry.value())
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| TableError::NotACounter {
                    key: key.to_string(),
                })?;
            let next = current
                .checked_add(amount)
                .ok_or_else(|| TableError::Overflow {
                    key: key.to_string(),
                })?;

            *entry.value_mut() = next.to_string().into_bytes();
            next
        };
        self.changed.notify_waiters();
        Ok(value)
    }

    /// Number of keys stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total bytes held in values.
    pub fn total_value_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn set_get_delete() {
        let table = KeyTable::new();
        assert!(table.get("k").is_none());

        table.set("k".into(), b"v".to_vec());
        assert_eq!(table.get("k"), Some(b"v".to_vec()));
        assert!(table.contains("k"));

        assert!(table.delete("k"));
        assert!(!table.delete("k"));
        assert!(table.is_empty());
    }

    #[test]
    fn set_overwrites() {
        let table = KeyTable::new();
        table.set("k".into(), b"one".to_vec());
        table.set("k".into(), b"two".to_vec());
        assert_eq!(table.get("k"), Some(b"two".to_vec()));
        assert_eq!(table.len(), 1);
        assert_eq!(table.total_value_bytes(), 3);
    }

    #[tokio::test]
    async fn wait_for_returns_existing_value() {
        let table = KeyTable::new();
        table.set("k".into(), b"ready".to_vec());
        assert_eq!(table.wait_for("k").await, b"ready".to_vec());
    }

    #[tokio::test]
    async fn wait_for_wakes_on_set() {
        let table = Arc::new(KeyTable::new());

        let waiter = {
            let table = table.clone();
            tokio::spawn(async move { table.wait_for("late").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        table.set("other".into(), b"x".to_vec());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "unrelated key must not satisfy the wait");

        table.set("late".into(), b"value".to_vec());
        let value = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert_eq!(value, b"value".to_vec());
    }

    #[test]
    fn add_starts_from_zero() {
        let table = KeyTable::new();
        assert_eq!(table.add("c", 1).unwrap(), 1);
        assert_eq!(table.add("c", 5).unwrap(), 6);
        assert_eq!(table.add("c", -10).unwrap(), -4);
        assert_eq!(table.get("c"), Some(b"-4".to_vec()));
    }

    #[test]
    fn add_rejects_non_counter() {
        let table = KeyTable::new();
        table.set("k".into(), vec![0xFF, 0x00]);
        assert_eq!(
            table.add("k", 1),
            Err(TableError::NotACounter { key: "k".into() })
        );
        // value left untouched
        assert_eq!(table.get("k"), Some(vec![0xFF, 0x00]));
    }

    #[test]
    fn add_detects_overflow() {
        let table = KeyTable::new();
        table.add("c", i64::MAX).unwrap();
        assert_eq!(
            table.add("c", 1),
            Err(TableError::Overflow { key: "c".into() })
        );
    }
}
