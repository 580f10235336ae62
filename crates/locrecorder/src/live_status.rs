//! Live status surface.
//!
//! Mirrors the lock-screen indicator: a tracking flag, the time of the last
//! update and a running count. The tracker calls `start` when a session
//! begins, `update` after every saved point and `stop` when it ends.
//! Surfaces are best-effort; their errors are logged by the caller and never
//! interrupt tracking.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Format of [`LiveStatusState::last_update_time`].
const TIME_FORMAT: &str = "%H:%M:%S";

/// Content shown by the live status surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStatusState {
    /// Whether a tracking session is active.
    pub is_tracking: bool,
    /// Local time of the last change, `HH:MM:SS`.
    pub last_update_time: String,
    /// Number of saved locations.
    pub location_count: usize,
}

impl LiveStatusState {
    /// Build a state stamped with `at`.
    #[must_use]
    pub fn new(is_tracking: bool, location_count: usize, at: DateTime<Utc>) -> Self {
        Self {
            is_tracking,
            last_update_time: at.with_timezone(&Local).format(TIME_FORMAT).to_string(),
            location_count,
        }
    }
}

/// A surface that displays tracking status outside the app.
#[async_trait]
pub trait LiveStatus: Send + Sync + std::fmt::Debug {
    /// Show the surface for a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface cannot be shown.
    async fn start(&self, state: &LiveStatusState) -> Result<()>;

    /// Refresh the surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface cannot be updated.
    async fn update(&self, state: &LiveStatusState) -> Result<()>;

    /// Show the final state and dismiss the surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface cannot be stopped.
    async fn stop(&self, state: &LiveStatusState) -> Result<()>;
}

/// Surface that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLiveStatus;

#[async_trait]
impl LiveStatus for LogLiveStatus {
    async fn start(&self, state: &LiveStatusState) -> Result<()> {
        info!(count = state.location_count, "Live status started");
        Ok(())
    }

    async fn update(&self, state: &LiveStatusState) -> Result<()> {
        debug!(
            count = state.location_count,
            at = %state.last_update_time,
            "Live status updated"
        );
        Ok(())
    }

    async fn stop(&self, state: &LiveStatusState) -> Result<()> {
        info!(count = state.location_count, "Live status stopped");
        Ok(())
    }
}

/// Surface that writes the state as JSON to a file.
///
/// `locrec status` reads the same file to report on a running tracker.
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    /// Write status to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the status file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the last written state, `None` if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn read(&self) -> Result<Option<LiveStatusState>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, state: &LiveStatusState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| Error::DirectoryCreate {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }
        let json = serde_json::to_string_pretty(state)?;
        // Write-then-rename so readers never see a partial file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl LiveStatus for StatusFile {
    async fn start(&self, state: &LiveStatusState) -> Result<()> {
        self.write(state).await
    }

    async fn update(&self, state: &LiveStatusState) -> Result<()> {
        self.write(state).await
    }

    async fn stop(&self, state: &LiveStatusState) -> Result<()> {
        self.write(state).await
    }
}
