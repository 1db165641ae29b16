//! Key namespacing over another store.

use super::{Store, StoreError};
use async_trait::async_trait;

/// Prepends `{prefix}/` to every key before delegating.
///
/// Lets independent groups share one store without key collisions.
#[derive(Debug, Clone)]
pub struct PrefixStore<S> {
    prefix: String,
    inner: S,
}

impl<S: Store> PrefixStore<S> {
    /// Wrap `inner`, namespacing keys under `prefix`.
    pub fn new(prefix: impl Into<String>, inner: S) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    /// The namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}/{}", self.prefix, key)
    }
}

#[async_trait]
impl<S: Store> Store for PrefixStore<S> {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.inner.set(&self.scoped(key), value).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.get(&self.scoped(key)).await
    }

    async fn delete_key(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete_key(&self.scoped(key)).await
    }

    async fn check(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.check(&self.scoped(key)).await
    }
}
