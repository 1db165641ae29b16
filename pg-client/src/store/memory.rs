//! In-process store for testing.
//!
//! Clones share one table, so handing a clone to each simulated rank gives
//! them a common rendezvous point. Failures can be injected per operation.

use super::{Store, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    inner: Mutex<MemoryStoreInner>,
    changed: Notify,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    values: HashMap<String, Vec<u8>>,
    sets: usize,
    deleted: Vec<String>,
    fail_next_set: Option<String>,
    fail_next_get: Option<String>,
    fail_next_delete: Option<String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently present, sorted.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.shared.inner.lock().unwrap();
        let mut keys: Vec<String> = inner.values.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        let inner = self.shared.inner.lock().unwrap();
        inner.values.contains_key(key)
    }

    /// Number of successful `set` calls.
    pub fn set_count(&self) -> usize {
        let inner = self.shared.inner.lock().unwrap();
        inner.sets
    }

    /// Keys removed by `delete_key`, in order (including absent ones).
    pub fn deleted_keys(&self) -> Vec<String> {
        let inner = self.shared.inner.lock().unwrap();
        inner.deleted.clone()
    }

    /// Cause the next set() to fail with the given error.
    pub fn fail_next_set(&self, error: &str) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.fail_next_set = Some(error.to_string());
    }

    /// Cause the next get() to fail with the given error.
    pub fn fail_next_get(&self, error: &str) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.fail_next_get = Some(error.to_string());
    }

    /// Cause the next delete_key() to fail with the given error.
    pub fn fail_next_delete(&self, error: &str) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.fail_next_delete = Some(error.to_string());
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        {
            let mut inner = self.shared.inner.lock().unwrap();

            // Check for forced failure
            if let Some(error) = inner.fail_next_set.take() {
                return Err(StoreError::Injected(error));
            }

            inner.values.insert(key.to_string(), value.to_vec());
            inner.sets += 1;
        }
        self.shared.changed.notify_waiters();
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let forced = self.shared.inner.lock().unwrap().fail_next_get.take();
        if let Some(error) = forced {
            return Err(StoreError::Injected(error));
        }

        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let existing = self.shared.inner.lock().unwrap().values.get(key).cloned();
            if let Some(value) = existing {
                return Ok(value);
            }
            notified.await;
        }
    }

    async fn delete_key(&self, key: &str) -> Result<bool, StoreError> {
        let mut inner = self.shared.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_delete.take() {
            return Err(StoreError::Injected(error));
        }

        inner.deleted.push(key.to_string());
        Ok(inner.values.remove(key).is_some())
    }

    async fn check(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.contains(key))
    }
}
