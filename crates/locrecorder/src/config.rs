//! Configuration management for locrecorder.
//!
//! Settings are layered with figment: built-in defaults, then a TOML file,
//! then `LOCRECORDER_` environment variables. Nested keys use a double
//! underscore, e.g. `LOCRECORDER_TRACKING__INTERVAL_MS=10000`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::platform::PlatformProfile;
use crate::recorder::RecorderOptions;
use crate::storage::DEFAULT_LOCATIONS_KEY;
use crate::watcher::WatcherConfig;

const CONFIG_FILE_NAME: &str = "config.toml";
const DATA_DIR_NAME: &str = "locrecorder";
const DATABASE_FILE_NAME: &str = "locations.db";
const STATUS_FILE_NAME: &str = "status.json";
const ENV_PREFIX: &str = "LOCRECORDER_";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where saved locations live.
    pub storage: StorageConfig,
    /// Sampling interval and platform.
    pub tracking: TrackingConfig,
    /// Options passed to the location watcher.
    pub watcher: WatcherSettings,
    /// Live status surface.
    pub live_status: LiveStatusConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    /// Defaults to `<data dir>/locrecorder/locations.db`.
    pub database_path: Option<PathBuf>,
    /// Key holding the location history.
    pub locations_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            locations_key: DEFAULT_LOCATIONS_KEY.to_string(),
        }
    }
}

/// Tracking-related configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Minimum spacing between saved points, in milliseconds.
    pub interval_ms: u64,
    /// Execution model to emulate.
    pub platform: PlatformProfile,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            platform: PlatformProfile::default(),
        }
    }
}

/// Watcher options as written in the config file.
///
/// Unlike [`WatcherConfig`], `stale` may be left unset and then follows the
/// platform profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    /// Title of the background notification.
    pub background_title: String,
    /// Body of the background notification.
    pub background_message: String,
    /// Ask for permission when undecided.
    pub request_permissions: bool,
    /// Accept cached fixes.
    pub stale: Option<bool>,
    /// Minimum movement in metres between fixes.
    pub distance_filter: f64,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        let defaults = WatcherConfig::default();
        Self {
            background_title: defaults.background_title,
            background_message: defaults.background_message,
            request_permissions: defaults.request_permissions,
            stale: None,
            distance_filter: defaults.distance_filter,
        }
    }
}

/// Live status configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveStatusConfig {
    /// Write the status file while tracking.
    pub enabled: bool,
    /// Status file location.
    /// Defaults to `<data dir>/locrecorder/status.json`.
    pub status_path: Option<PathBuf>,
}

impl Default for LiveStatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            status_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the default file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation
    /// fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// A missing file is not an error; defaults and the environment still
    /// apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation
    /// fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        let config: Self = Self::figment(&config_file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load a single TOML file over the defaults, ignoring the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or fails validation.
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigValidation {
                message: format!("config file not found: {}", path.display()),
            });
        }
        let config: Self = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(config_file: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_file))
    }

    /// Default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.tracking.interval_ms == 0 {
            return Err(invalid("tracking.interval_ms must be greater than 0"));
        }

        let filter = self.watcher.distance_filter;
        if !filter.is_finite() || filter < 0.0 {
            return Err(invalid(format!(
                "watcher.distance_filter must be a non-negative number of metres, got {filter}"
            )));
        }

        if self.storage.locations_key.trim().is_empty() {
            return Err(invalid("storage.locations_key must not be empty"));
        }

        Ok(())
    }

    /// Database path, resolving the default if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Status file path, resolving the default if not set.
    #[must_use]
    pub fn status_path(&self) -> PathBuf {
        self.live_status
            .status_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(STATUS_FILE_NAME))
    }

    /// Sampling interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.tracking.interval_ms)
    }

    /// Recorder options derived from the tracking section.
    #[must_use]
    pub fn recorder_options(&self) -> RecorderOptions {
        RecorderOptions {
            interval: self.interval(),
            background_capable: self.tracking.platform.background_capable(),
        }
    }

    /// Watcher options with `stale` resolved against the platform.
    #[must_use]
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            background_title: self.watcher.background_title.clone(),
            background_message: self.watcher.background_message.clone(),
            request_permissions: self.watcher.request_permissions,
            stale: self
                .watcher
                .stale
                .unwrap_or_else(|| self.tracking.platform.accepts_stale_fixes()),
            distance_filter: self.watcher.distance_filter,
        }
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
