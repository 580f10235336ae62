//! In-process key-value store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::KeyValueStore;
use crate::error::{Error, Result};

/// Volatile [`KeyValueStore`] with switchable read/write failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    yield_on_io: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` fail (or succeed again).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `set`/`remove` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Yield to the scheduler at the start of every call, like a real
    /// backend would while waiting on I/O.
    pub fn set_yield_on_io(&self, yield_on_io: bool) {
        self.yield_on_io.store(yield_on_io, Ordering::SeqCst);
    }

    /// Raw value under `key`, bypassing failure injection.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    async fn io_point(&self) {
        if self.yield_on_io.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.io_point().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::storage_read(key, "injected read failure"));
        }
        Ok(self.values().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.io_point().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::storage_write(key, "injected write failure"));
        }
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.io_point().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::storage_write(key, "injected write failure"));
        }
        self.values().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_and_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.remove("k").await.unwrap();
        assert_eq!(store.peek("k"), None);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();

        store.set_fail_reads(true);
        assert!(store.get("k").await.unwrap_err().is_storage_error());

        store.set_fail_writes(true);
        assert!(store.set("k", "w").await.is_err());
        assert!(store.remove("k").await.is_err());
        assert_eq!(store.peek("k").as_deref(), Some("v"));

        store.set_fail_reads(false);
        store.set_fail_writes(false);
        store.set("k", "w").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("w"));
    }
}
