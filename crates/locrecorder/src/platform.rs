//! Platform execution profiles.
//!
//! The two mobile platforms differ in what keeps running while the app is in
//! the background. A profile is chosen once from configuration and turned
//! into plain capability flags; nothing downstream compares platform names.

use serde::{Deserialize, Serialize};

/// Execution model of the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformProfile {
    /// Foreground location service keeps the watcher alive in the
    /// background while the app timer is suspended.
    #[default]
    Android,
    /// App timer keeps firing in the background; the watcher only feeds
    /// the sample cache.
    Ios,
}

impl PlatformProfile {
    /// Whether the watcher callback must persist samples itself.
    #[must_use]
    pub const fn background_capable(self) -> bool {
        matches!(self, Self::Android)
    }

    /// Whether the interval timer stops firing while backgrounded.
    #[must_use]
    pub const fn timer_suspends_in_background(self) -> bool {
        matches!(self, Self::Android)
    }

    /// Whether cached fixes are accepted by default.
    #[must_use]
    pub const fn accepts_stale_fixes(self) -> bool {
        matches!(self, Self::Ios)
    }

    /// Human-readable platform name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
        }
    }
}

impl std::fmt::Display for PlatformProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
