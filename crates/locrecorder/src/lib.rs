//! `locrecorder` - Interval-gated location recorder
//!
//! Two sources report positions: a continuous location watcher and a fixed
//! interval timer. The [`Recorder`] lets whichever reaches an interval
//! boundary first save the latest fix, so the history holds at most one
//! point per interval with no duplicates. The [`Tracker`] drives a session
//! and the platform profile decides which source may save while the app is
//! in the background.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod live_status;
pub mod location;
pub mod logging;
pub mod platform;
pub mod recorder;
pub mod storage;
pub mod tracker;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
pub use location::{LocationPoint, RawPosition};
pub use logging::init_logging;
pub use platform::PlatformProfile;
pub use recorder::{LocationUpdate, Recorder, RecorderOptions, SampleOutcome, SampleSource};
pub use storage::{KeyValueStore, LocationStore, SqliteStore, StorageStats};
pub use tracker::{AppState, LifecycleHandle, SessionSummary, Tracker};
