//! Core location types for locrecorder.
//!
//! [`RawPosition`] is what the watcher reports and lives only in the sample
//! cache. [`LocationPoint`] is the immutable record written to storage.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of every generated point id.
const ID_PREFIX: &str = "loc";

/// Length of the random part of a point id.
const ID_SUFFIX_LEN: usize = 9;

/// Format used for [`LocationPoint::date_string`].
const DATE_STRING_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

/// Mean Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A single fix as reported by the location service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPosition {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Horizontal accuracy radius in metres.
    pub accuracy: f64,
}

impl RawPosition {
    /// Create a new position.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
        }
    }

    /// Great-circle distance to `other` in metres (haversine).
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * other.latitude.to_radians().cos()
                * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }
}

/// A persisted location sample.
///
/// Serialized with the field names `id`, `latitude`, `longitude`,
/// `accuracy`, `timestamp` and `dateString`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPoint {
    /// Unique id, `loc_<epoch-ms>_<random>`.
    pub id: String,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Horizontal accuracy in metres, if the fix reported one.
    pub accuracy: Option<f64>,
    /// Gate-claim time in epoch milliseconds.
    pub timestamp: i64,
    /// Gate-claim time rendered in local time.
    pub date_string: String,
}

impl LocationPoint {
    /// Build a point from a fix, stamped with the gate-claim time `at`.
    ///
    /// The fix's own acquisition time plays no part: the point records when
    /// it was accepted, not when the hardware produced it.
    #[must_use]
    pub fn from_fix(position: &RawPosition, at: DateTime<Utc>) -> Self {
        let timestamp = at.timestamp_millis();
        Self {
            id: Self::generate_id(timestamp),
            latitude: position.latitude,
            longitude: position.longitude,
            accuracy: Some(position.accuracy),
            timestamp,
            date_string: Self::format_date(at),
        }
    }

    /// Generate an id from the creation time plus a random suffix.
    ///
    /// No collision check is made; a single writer saving at most once per
    /// interval makes clashes negligible.
    #[must_use]
    pub fn generate_id(timestamp_ms: i64) -> String {
        let random = uuid::Uuid::new_v4().simple().to_string();
        format!("{ID_PREFIX}_{timestamp_ms}_{}", &random[..ID_SUFFIX_LEN])
    }

    /// Render a time the way the history list shows it.
    #[must_use]
    pub fn format_date(at: DateTime<Utc>) -> String {
        at.with_timezone(&Local).format(DATE_STRING_FORMAT).to_string()
    }

    /// Gate-claim time as a `DateTime`.
    #[must_use]
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Accuracy worth showing: present and non-zero.
    #[must_use]
    pub fn display_accuracy(&self) -> Option<f64> {
        self.accuracy.filter(|a| *a != 0.0)
    }
}
