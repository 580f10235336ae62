//! Watcher that replays recorded or fixed positions.
//!
//! Stands in for a device location service: fixes are emitted at a fixed
//! period, filtered the same way a platform service would filter them.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace};

use super::{LocationWatcher, WatcherConfig, WatcherError, WatcherEvent};
use crate::location::RawPosition;

/// Location permission as the simulated OS sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// Access already granted.
    #[default]
    Granted,
    /// Access refused; requests are not shown again.
    Denied,
    /// Not decided yet; granted if the watcher asks for it.
    Prompt,
}

/// One entry of a replay file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayFix {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Accuracy in metres.
    #[serde(default)]
    pub accuracy: f64,
    /// Whether the service served this fix from its cache.
    #[serde(default)]
    pub cached: bool,
}

impl ReplayFix {
    fn position(&self) -> RawPosition {
        RawPosition::new(self.latitude, self.longitude, self.accuracy)
    }
}

impl From<RawPosition> for ReplayFix {
    fn from(p: RawPosition) -> Self {
        Self {
            latitude: p.latitude,
            longitude: p.longitude,
            accuracy: p.accuracy,
            cached: false,
        }
    }
}

/// Replays a list of fixes at a fixed period.
#[derive(Debug, Clone)]
pub struct ReplayWatcher {
    fixes: Vec<ReplayFix>,
    period: Duration,
    looped: bool,
    permission: PermissionState,
}

impl ReplayWatcher {
    /// Replay `fixes` once, one every `period`.
    #[must_use]
    pub fn new(fixes: Vec<ReplayFix>, period: Duration) -> Self {
        Self {
            fixes,
            period,
            looped: false,
            permission: PermissionState::Granted,
        }
    }

    /// Report the same position every `period`, forever.
    #[must_use]
    pub fn fixed(position: RawPosition, period: Duration) -> Self {
        Self::new(vec![position.into()], period).looping(true)
    }

    /// Load fixes from a JSON array file.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::Source`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>, period: Duration) -> Result<Self, WatcherError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| WatcherError::Source(format!("{}: {e}", path.display())))?;
        let fixes: Vec<ReplayFix> = serde_json::from_str(&raw)
            .map_err(|e| WatcherError::Source(format!("{}: {e}", path.display())))?;
        Ok(Self::new(fixes, period))
    }

    /// Start over from the first fix after the last one.
    #[must_use]
    pub fn looping(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    /// Set the simulated permission state.
    #[must_use]
    pub fn with_permission(mut self, permission: PermissionState) -> Self {
        self.permission = permission;
        self
    }

    /// Number of fixes in one pass.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    /// Whether there is nothing to replay.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    fn authorized(&self, config: &WatcherConfig) -> bool {
        match self.permission {
            PermissionState::Granted => true,
            PermissionState::Prompt => config.request_permissions,
            PermissionState::Denied => false,
        }
    }
}

#[async_trait]
impl LocationWatcher for ReplayWatcher {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn watch(
        &mut self,
        config: &WatcherConfig,
        tx: mpsc::Sender<WatcherEvent>,
    ) -> Result<(), WatcherError> {
        if !self.authorized(config) {
            let reason = match self.permission {
                PermissionState::Prompt => "permission not requested",
                _ => "permission denied",
            };
            let _ = tx
                .send(Err(WatcherError::NotAuthorized(reason.to_string())))
                .await;
            return Ok(());
        }

        if self.fixes.is_empty() {
            return Err(WatcherError::Unavailable("no fixes to replay".to_string()));
        }
        if self.period.is_zero() {
            return Err(WatcherError::Unavailable(
                "fix period must be greater than zero".to_string(),
            ));
        }

        info!(
            title = %config.background_title,
            fixes = self.fixes.len(),
            period_ms = self.period.as_millis(),
            stale = config.stale,
            distance_filter = config.distance_filter,
            "Replay watcher registered"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_reported: Option<RawPosition> = None;
        let mut index = 0;

        loop {
            if index == self.fixes.len() {
                if !self.looped {
                    break;
                }
                index = 0;
            }
            let fix = self.fixes[index];
            index += 1;

            ticker.tick().await;

            if fix.cached && !config.stale {
                trace!("Dropping cached fix");
                continue;
            }

            let position = fix.position();
            if config.distance_filter > 0.0 {
                if let Some(last) = last_reported {
                    let moved = last.distance_to(&position);
                    if moved < config.distance_filter {
                        trace!(moved, "Fix within distance filter");
                        continue;
                    }
                }
            }

            if tx.send(Ok(position)).await.is_err() {
                debug!("Watcher channel closed");
                break;
            }
            last_reported = Some(position);
        }

        debug!("Replay watcher finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(lat: f64, lon: f64) -> ReplayFix {
        ReplayFix {
            latitude: lat,
            longitude: lon,
            accuracy: 5.0,
            cached: false,
        }
    }

    async fn collect(mut watcher: ReplayWatcher, config: WatcherConfig) -> Vec<WatcherEvent> {
        let (tx, mut rx) = mpsc::channel(64);
        watcher.watch(&config, tx).await.unwrap();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_replays_all_fixes_in_order() {
        let watcher = ReplayWatcher::new(
            vec![fix(1.0, 1.0), fix(2.0, 2.0), fix(3.0, 3.0)],
            Duration::from_secs(1),
        );
        let events = collect(watcher, WatcherConfig::default()).await;

        let lats: Vec<f64> = events.iter().map(|e| e.as_ref().unwrap().latitude).collect();
        assert_eq!(lats, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_permission_reports_not_authorized() {
        let watcher = ReplayWatcher::new(vec![fix(1.0, 1.0)], Duration::from_secs(1))
            .with_permission(PermissionState::Denied);
        let events = collect(watcher, WatcherConfig::default()).await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap_err().code(), "NOT_AUTHORIZED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_needs_request_permissions() {
        let config = WatcherConfig {
            request_permissions: false,
            ..WatcherConfig::default()
        };
        let watcher = ReplayWatcher::new(vec![fix(1.0, 1.0)], Duration::from_secs(1))
            .with_permission(PermissionState::Prompt);
        let events = collect(watcher.clone(), config).await;
        assert!(events[0].is_err());

        let events = collect(watcher, WatcherConfig::default()).await;
        assert!(events[0].is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_fixes_need_stale() {
        let mut cached = fix(9.0, 9.0);
        cached.cached = true;
        let watcher = ReplayWatcher::new(vec![cached, fix(1.0, 1.0)], Duration::from_secs(1));

        let events = collect(watcher.clone(), WatcherConfig::default()).await;
        assert_eq!(events.len(), 1);

        let stale = WatcherConfig {
            stale: true,
            ..WatcherConfig::default()
        };
        let events = collect(watcher, stale).await;
        assert_eq!(events.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distance_filter_drops_small_moves() {
        // 0.0001 deg of latitude is about 11 m.
        let watcher = ReplayWatcher::new(
            vec![fix(0.0, 0.0), fix(0.0001, 0.0), fix(0.001, 0.0)],
            Duration::from_secs(1),
        );
        let config = WatcherConfig {
            distance_filter: 50.0,
            ..WatcherConfig::default()
        };
        let events = collect(watcher, config).await;

        let lats: Vec<f64> = events.iter().map(|e| e.as_ref().unwrap().latitude).collect();
        assert_eq!(lats, vec![0.0, 0.001]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_looping_stops_when_receiver_dropped() {
        let mut watcher =
            ReplayWatcher::fixed(RawPosition::new(1.0, 2.0, 3.0), Duration::from_secs(1));
        let (tx, mut rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move {
            watcher.watch(&WatcherConfig::default(), tx).await
        });

        for _ in 0..3 {
            assert!(rx.recv().await.unwrap().is_ok());
        }
        drop(rx);

        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_empty_replay_is_unavailable() {
        let mut watcher = ReplayWatcher::new(Vec::new(), Duration::from_secs(1));
        assert!(watcher.is_empty());
        let (tx, _rx) = mpsc::channel(1);
        let err = watcher.watch(&WatcherConfig::default(), tx).await.unwrap_err();
        assert!(matches!(err, WatcherError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_zero_period_is_unavailable() {
        let mut watcher = ReplayWatcher::fixed(RawPosition::new(1.0, 2.0, 3.0), Duration::ZERO);
        let (tx, mut rx) = mpsc::channel(1);
        let err = watcher.watch(&WatcherConfig::default(), tx).await.unwrap_err();

        assert!(matches!(err, WatcherError::Unavailable(_)));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("locrecorder_replay_{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"latitude": 1.5, "longitude": 2.5, "accuracy": 4.0},
                {"latitude": 1.6, "longitude": 2.6, "cached": true}]"#,
        )
        .unwrap();

        let watcher = ReplayWatcher::from_file(&path, Duration::from_secs(1)).unwrap();
        assert_eq!(watcher.len(), 2);
        assert!(watcher.fixes[1].cached);
        assert!(watcher.fixes[1].accuracy.abs() < f64::EPSILON);

        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            ReplayWatcher::from_file(&path, Duration::from_secs(1)),
            Err(WatcherError::Source(_))
        ));
    }
}
