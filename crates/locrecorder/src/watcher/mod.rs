//! Location watcher abstraction.
//!
//! A watcher is the continuous, OS-driven source of fixes. It streams
//! [`WatcherEvent`]s into a channel until its source is exhausted or the
//! receiving side goes away.

mod replay;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::location::RawPosition;

pub use replay::{PermissionState, ReplayFix, ReplayWatcher};

/// Errors a location service can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatcherError {
    /// The user or the OS refused location access (`NOT_AUTHORIZED`).
    #[error("location access not authorized: {0}")]
    NotAuthorized(String),

    /// The location service cannot deliver fixes.
    #[error("location service unavailable: {0}")]
    Unavailable(String),

    /// The watcher could not read its source.
    #[error("failed to read fix source: {0}")]
    Source(String),
}

impl WatcherError {
    /// Wire code as reported by mobile location services.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAuthorized(_) => "NOT_AUTHORIZED",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Source(_) => "SOURCE",
        }
    }
}

/// One watcher callback: a fix or an error, never both.
pub type WatcherEvent = Result<RawPosition, WatcherError>;

/// Options handed to the location service when the watcher is added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Title of the persistent notification shown while tracking in the
    /// background.
    pub background_title: String,
    /// Body of the background notification.
    pub background_message: String,
    /// Prompt for location permission if it has not been decided yet.
    pub request_permissions: bool,
    /// Accept cached fixes instead of waiting for a fresh one.
    pub stale: bool,
    /// Minimum movement in metres between reported fixes; 0 reports every fix.
    pub distance_filter: f64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            background_title: "Location Tracker Active".to_string(),
            background_message: "Tracking location in the background".to_string(),
            request_permissions: true,
            stale: false,
            distance_filter: 0.0,
        }
    }
}

/// A continuous source of location fixes.
#[async_trait]
pub trait LocationWatcher: Send + Sync + std::fmt::Debug {
    /// Name of this watcher for logs.
    fn name(&self) -> &'static str;

    /// Stream fixes into `tx` until the source ends or `tx` is closed.
    ///
    /// Permission problems are delivered as an `Err` event rather than a
    /// return value so the receiver sees them in order with fixes.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot be registered at all.
    async fn watch(
        &mut self,
        config: &WatcherConfig,
        tx: mpsc::Sender<WatcherEvent>,
    ) -> Result<(), WatcherError>;
}
