//! Location history kept as one JSON array under a single key.

use std::sync::Arc;

use tracing::{debug, warn};

use super::KeyValueStore;
use crate::error::{Error, Result};
use crate::location::LocationPoint;

/// Storage key of the location history.
pub const DEFAULT_LOCATIONS_KEY: &str = "saved_locations";

/// Oldest-first list of [`LocationPoint`]s on top of a [`KeyValueStore`].
///
/// There is no incremental format: every append reads the whole array,
/// pushes one point and writes the array back.
#[derive(Debug, Clone)]
pub struct LocationStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl LocationStore {
    /// Wrap a key-value store, keeping the history under `key`.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }

    /// Storage key in use.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the full history, oldest first. A missing key is an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageRead`] if the backend fails or the stored
    /// value is not a valid location array.
    pub async fn load(&self) -> Result<Vec<LocationPoint>> {
        let raw = self
            .kv
            .get(&self.key)
            .await
            .map_err(|e| self.read_error(e))?;

        match raw {
            Some(value) if !value.is_empty() => serde_json::from_str(&value)
                .map_err(|e| Error::storage_read(&self.key, format!("corrupt history: {e}"))),
            _ => Ok(Vec::new()),
        }
    }

    /// Load the history, logging and returning an empty list on failure.
    pub async fn load_or_empty(&self) -> Vec<LocationPoint> {
        match self.load().await {
            Ok(points) => points,
            Err(e) => {
                warn!(error = %e, "Error reading saved locations");
                Vec::new()
            }
        }
    }

    /// Append one point and rewrite the history. Returns the new length.
    ///
    /// A read failure aborts the append instead of overwriting the history
    /// with a one-element array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageRead`] or [`Error::StorageWrite`].
    pub async fn append(&self, point: &LocationPoint) -> Result<usize> {
        let mut points = self.load().await?;
        points.push(point.clone());

        let encoded = serde_json::to_string(&points)
            .map_err(|e| Error::storage_write(&self.key, e.to_string()))?;
        self.kv
            .set(&self.key, &encoded)
            .await
            .map_err(|e| self.write_error(e))?;

        debug!(id = %point.id, total = points.len(), "Appended location");
        Ok(points.len())
    }

    /// Number of stored points.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageRead`] if the history cannot be read.
    pub async fn count(&self) -> Result<usize> {
        Ok(self.load().await?.len())
    }

    /// Remove the whole history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageWrite`] if the key cannot be removed.
    pub async fn clear(&self) -> Result<()> {
        self.kv
            .remove(&self.key)
            .await
            .map_err(|e| self.write_error(e))
    }

    fn read_error(&self, err: Error) -> Error {
        match err {
            Error::StorageRead { .. } => err,
            other => Error::storage_read(&self.key, other.to_string()),
        }
    }

    fn write_error(&self, err: Error) -> Error {
        match err {
            Error::StorageWrite { .. } => err,
            other => Error::storage_write(&self.key, other.to_string()),
        }
    }
}
