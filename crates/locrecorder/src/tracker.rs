//! Tracking session driver.
//!
//! A [`Tracker`] owns one tracking session: it registers the location
//! watcher, runs the interval ticker and forwards both into the
//! [`Recorder`]. Everything runs on the calling task inside one
//! `tokio::select!` loop; only the watcher itself is spawned.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::live_status::{LiveStatus, LiveStatusState};
use crate::platform::PlatformProfile;
use crate::recorder::{Recorder, SampleOutcome};
use crate::watcher::{LocationWatcher, WatcherConfig, WatcherError};

const WATCHER_CHANNEL_CAPACITY: usize = 32;

/// Whether the host app is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppState {
    /// App in the foreground.
    #[default]
    Foreground,
    /// App in the background.
    Background,
}

/// Switches a running tracker between foreground and background.
#[derive(Debug, Clone)]
pub struct LifecycleHandle {
    tx: Arc<watch::Sender<AppState>>,
}

impl LifecycleHandle {
    fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(AppState::Foreground)),
        }
    }

    /// Report a new app state.
    pub fn set(&self, state: AppState) {
        self.tx.send_replace(state);
    }

    /// The app moved to the background.
    pub fn enter_background(&self) {
        self.set(AppState::Background);
    }

    /// The app returned to the foreground.
    pub fn enter_foreground(&self) {
        self.set(AppState::Foreground);
    }

    /// Last reported state.
    #[must_use]
    pub fn current(&self) -> AppState {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<AppState> {
        self.tx.subscribe()
    }
}

/// Counters for one finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Points persisted during the session.
    pub saved: usize,
    /// Events skipped because the gate was closed.
    pub throttled: usize,
    /// Gate claims whose write failed.
    pub failed_saves: usize,
    /// Total saved points when the session ended.
    pub location_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusPhase {
    Start,
    Update,
    Stop,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives a [`Recorder`] from a location watcher and an interval ticker.
#[derive(Debug)]
pub struct Tracker {
    recorder: Arc<Recorder>,
    profile: PlatformProfile,
    watcher_config: WatcherConfig,
    live_status: Option<Arc<dyn LiveStatus>>,
    lifecycle: LifecycleHandle,
    running: AtomicBool,
}

impl Tracker {
    /// Create a tracker for `recorder` on the given platform profile.
    #[must_use]
    pub fn new(
        recorder: Arc<Recorder>,
        profile: PlatformProfile,
        watcher_config: WatcherConfig,
    ) -> Self {
        Self {
            recorder,
            profile,
            watcher_config,
            live_status: None,
            lifecycle: LifecycleHandle::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Mirror the session on a live status surface.
    #[must_use]
    pub fn with_live_status(mut self, surface: Arc<dyn LiveStatus>) -> Self {
        self.live_status = Some(surface);
        self
    }

    /// Handle for reporting foreground/background changes.
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleHandle {
        self.lifecycle.clone()
    }

    /// The recorder this tracker feeds.
    #[must_use]
    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    /// Whether a session is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a tracking session until `shutdown` completes.
    ///
    /// The first timer tick comes one interval after start. Watcher errors,
    /// including a permission denial, are logged and the session keeps
    /// running on whatever source is left.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if the recorder interval is zero
    /// and [`Error::AlreadyTracking`] if a session is already running.
    pub async fn run<W, F>(&self, mut watcher: W, shutdown: F) -> Result<SessionSummary>
    where
        W: LocationWatcher + 'static,
        F: Future<Output = ()>,
    {
        let period = self.recorder.options().interval;
        if period.is_zero() {
            return Err(Error::ConfigValidation {
                message: "tracking interval must be greater than zero".to_string(),
            });
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyTracking);
        }
        let _running = RunningGuard(&self.running);
        self.recorder.start();

        let name = watcher.name();
        info!(
            watcher = name,
            platform = %self.profile,
            interval_ms = period.as_millis(),
            background_capable = self.recorder.options().background_capable,
            "Tracking started"
        );

        let mut summary = SessionSummary::default();
        self.publish(StatusPhase::Start, self.recorder.location_count().await)
            .await;

        let (tx, mut rx) = mpsc::channel(WATCHER_CHANNEL_CAPACITY);
        let config = self.watcher_config.clone();
        let mut watch_task = Some(tokio::spawn(async move {
            watcher.watch(&config, tx).await
        }));

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut app_state = self.lifecycle.subscribe();
        tokio::pin!(shutdown);

        loop {
            let timer_active = self.timer_active(*app_state.borrow());
            tokio::select! {
                () = &mut shutdown => {
                    debug!("Shutdown requested");
                    break;
                }
                event = rx.recv(), if watch_task.is_some() => match event {
                    Some(Ok(position)) => {
                        let outcome = self.recorder.on_fix(position).await;
                        self.record(outcome, &mut summary).await;
                    }
                    Some(Err(e)) => report_watcher_error(name, e),
                    None => {
                        if let Some(task) = watch_task.take() {
                            finish_watcher(name, task).await;
                        }
                    }
                },
                _ = ticker.tick(), if timer_active => {
                    let outcome = self.recorder.on_tick().await;
                    self.record(outcome, &mut summary).await;
                }
                Ok(()) = app_state.changed() => {
                    let state = *app_state.borrow_and_update();
                    info!(?state, timer_active = self.timer_active(state), "App state changed");
                }
            }
        }

        drop(rx);
        if let Some(task) = watch_task.take() {
            task.abort();
            finish_watcher(name, task).await;
        }

        summary.location_count = self.recorder.location_count().await;
        self.publish(StatusPhase::Stop, summary.location_count).await;
        let last_fix = self.recorder.last_fix();
        info!(
            last_lat = last_fix.map(|p| p.latitude),
            last_lon = last_fix.map(|p| p.longitude),
            saved = summary.saved,
            throttled = summary.throttled,
            failed = summary.failed_saves,
            total = summary.location_count,
            "Tracking stopped"
        );
        Ok(summary)
    }

    fn timer_active(&self, state: AppState) -> bool {
        !(state == AppState::Background && self.profile.timer_suspends_in_background())
    }

    async fn record(&self, outcome: SampleOutcome, summary: &mut SessionSummary) {
        match outcome {
            SampleOutcome::Saved(update) => {
                summary.saved += 1;
                summary.location_count = update.saved_count;
                self.publish(StatusPhase::Update, update.saved_count).await;
            }
            SampleOutcome::Throttled => summary.throttled += 1,
            SampleOutcome::SaveFailed => summary.failed_saves += 1,
            SampleOutcome::Cached | SampleOutcome::AwaitingFix => {}
        }
    }

    async fn publish(&self, phase: StatusPhase, location_count: usize) {
        let Some(surface) = &self.live_status else {
            return;
        };
        let state = LiveStatusState::new(
            phase != StatusPhase::Stop,
            location_count,
            self.recorder.now(),
        );
        let result = match phase {
            StatusPhase::Start => surface.start(&state).await,
            StatusPhase::Update => surface.update(&state).await,
            StatusPhase::Stop => surface.stop(&state).await,
        };
        if let Err(e) = result {
            warn!(?phase, error = %e, "Error updating live status");
        }
    }
}

fn report_watcher_error(name: &'static str, error: WatcherError) {
    let code = error.code();
    let error = Error::watcher(name, error);
    if error.is_permission_error() {
        warn!(watcher = name, code, %error, "Location permission denied");
    } else {
        warn!(watcher = name, code, %error, "Error in location watcher");
    }
}

async fn finish_watcher(name: &'static str, task: JoinHandle<std::result::Result<(), WatcherError>>) {
    match task.await {
        Ok(Ok(())) => debug!(watcher = name, "Watcher finished"),
        Ok(Err(e)) => report_watcher_error(name, e),
        Err(e) if e.is_cancelled() => debug!(watcher = name, "Watcher stopped"),
        Err(e) => warn!(watcher = name, error = %e, "Watcher task failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::sleep;

    use super::*;
    use crate::clock::MonotonicClock;
    use crate::location::RawPosition;
    use crate::recorder::RecorderOptions;
    use crate::storage::{LocationStore, MemoryStore, DEFAULT_LOCATIONS_KEY};
    use crate::watcher::{PermissionState, ReplayFix, ReplayWatcher};

    const INTERVAL: Duration = Duration::from_secs(5);

    fn tracker(profile: PlatformProfile) -> (Tracker, Arc<MemoryStore>) {
        tracker_every(profile, INTERVAL)
    }

    fn tracker_every(profile: PlatformProfile, interval: Duration) -> (Tracker, Arc<MemoryStore>) {
        let kv = Arc::new(MemoryStore::new());
        let recorder = Recorder::new(
            RecorderOptions {
                interval,
                background_capable: profile.background_capable(),
            },
            LocationStore::new(kv.clone(), DEFAULT_LOCATIONS_KEY),
            Arc::new(MonotonicClock::new()),
        );
        let tracker = Tracker::new(Arc::new(recorder), profile, WatcherConfig::default());
        (tracker, kv)
    }

    fn every_second() -> ReplayWatcher {
        ReplayWatcher::fixed(RawPosition::new(48.85, 2.35, 8.0), Duration::from_secs(1))
    }

    async fn timestamps(tracker: &Tracker) -> Vec<i64> {
        tracker
            .recorder()
            .saved_locations()
            .await
            .iter()
            .map(|p| p.timestamp)
            .collect()
    }

    #[derive(Debug, Default)]
    struct RecordingStatus {
        calls: Mutex<Vec<(StatusPhase, LiveStatusState)>>,
    }

    impl RecordingStatus {
        fn push(&self, phase: StatusPhase, state: &LiveStatusState) {
            self.calls.lock().unwrap().push((phase, state.clone()));
        }
    }

    #[async_trait]
    impl LiveStatus for RecordingStatus {
        async fn start(&self, state: &LiveStatusState) -> Result<()> {
            self.push(StatusPhase::Start, state);
            Ok(())
        }

        async fn update(&self, state: &LiveStatusState) -> Result<()> {
            self.push(StatusPhase::Update, state);
            Ok(())
        }

        async fn stop(&self, state: &LiveStatusState) -> Result<()> {
            self.push(StatusPhase::Stop, state);
            Err(Error::internal("surface gone"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_watcher_saves_once_per_interval() {
        crate::logging::init_test_logging();
        let (tracker, _kv) = tracker(PlatformProfile::Android);
        tracker.lifecycle().enter_background();

        let summary = tracker
            .run(every_second(), sleep(Duration::from_millis(9_500)))
            .await
            .unwrap();

        assert_eq!(summary.saved, 2);
        assert_eq!(summary.throttled, 8);
        assert_eq!(summary.location_count, 2);
        let ts = timestamps(&tracker).await;
        assert_eq!(ts[1] - ts[0], 5_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_timer_persists_cached_fix() {
        let (tracker, _kv) = tracker(PlatformProfile::Ios);
        let mut updates = tracker.recorder().subscribe();

        let summary = tracker
            .run(every_second(), sleep(Duration::from_secs(12)))
            .await
            .unwrap();

        assert_eq!(summary.saved, 2);
        let ts = timestamps(&tracker).await;
        assert_eq!(ts[1] - ts[0], 5_000);
        for _ in 0..2 {
            let update = updates.recv().await.unwrap();
            assert_eq!(update.source, crate::recorder::SampleSource::Timer);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_keeps_running_after_watcher_ends() {
        let (tracker, _kv) = tracker(PlatformProfile::Ios);
        let fixes = vec![
            ReplayFix::from(RawPosition::new(1.0, 1.0, 5.0)),
            ReplayFix::from(RawPosition::new(2.0, 2.0, 5.0)),
        ];
        let watcher = ReplayWatcher::new(fixes, Duration::from_secs(1));

        let summary = tracker
            .run(watcher, sleep(Duration::from_secs(11)))
            .await
            .unwrap();

        assert_eq!(summary.saved, 2);
        let points = tracker.recorder().saved_locations().await;
        assert!(points.iter().all(|p| (p.latitude - 2.0).abs() < f64::EPSILON));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_saves_nothing() {
        let (tracker, kv) = tracker(PlatformProfile::Android);
        let watcher = every_second().with_permission(PermissionState::Denied);

        let summary = tracker
            .run(watcher, sleep(Duration::from_secs(12)))
            .await
            .unwrap();

        assert_eq!(summary, SessionSummary::default());
        assert_eq!(kv.peek(DEFAULT_LOCATIONS_KEY), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_rejected() {
        let (tracker, _kv) = tracker(PlatformProfile::Android);

        let (first, second) = tokio::join!(
            tracker.run(every_second(), sleep(Duration::from_secs(1))),
            tracker.run(every_second(), sleep(Duration::from_secs(1))),
        );
        assert!(first.is_ok());
        assert!(matches!(second, Err(Error::AlreadyTracking)));
        assert!(!tracker.is_running());

        // A finished session can be followed by a new one.
        let summary = tracker
            .run(every_second(), sleep(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(summary.saved, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_status_follows_session() {
        let status = Arc::new(RecordingStatus::default());
        let (tracker, _kv) = tracker(PlatformProfile::Android);
        let tracker = tracker.with_live_status(status.clone());
        tracker.lifecycle().enter_background();

        tracker
            .run(every_second(), sleep(Duration::from_millis(5_500)))
            .await
            .unwrap();

        let calls = status.calls.lock().unwrap();
        let phases: Vec<StatusPhase> = calls.iter().map(|(p, _)| *p).collect();
        assert_eq!(
            phases,
            vec![
                StatusPhase::Start,
                StatusPhase::Update,
                StatusPhase::Update,
                StatusPhase::Stop
            ]
        );
        assert_eq!(calls[0].1.location_count, 0);
        assert_eq!(calls[2].1.location_count, 2);
        assert!(calls[2].1.is_tracking);
        assert!(!calls[3].1.is_tracking);
        assert_eq!(calls[3].1.location_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_resumes_after_returning_to_foreground() {
        let (tracker, _kv) = tracker(PlatformProfile::Android);
        let lifecycle = tracker.lifecycle();
        lifecycle.enter_background();

        // One fix at start, then nothing but the timer.
        let watcher = ReplayWatcher::new(
            vec![ReplayFix::from(RawPosition::new(3.0, 4.0, 5.0))],
            Duration::from_secs(1),
        );
        let switch = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move {
                sleep(Duration::from_secs(30)).await;
                lifecycle.enter_foreground();
            }
        });

        let summary = tracker
            .run(watcher, sleep(Duration::from_millis(40_500)))
            .await
            .unwrap();
        switch.await.unwrap();

        // Ticks missed while in the background are skipped, not replayed.
        let ts = timestamps(&tracker).await;
        let offsets: Vec<i64> = ts.iter().map(|t| t - ts[0]).collect();
        assert_eq!(offsets, vec![0, 30_000, 35_000, 40_000]);
        assert_eq!(summary.saved, 4);
        assert_eq!(lifecycle.current(), AppState::Foreground);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_rejected() {
        let (tracker, kv) = tracker_every(PlatformProfile::Android, Duration::ZERO);

        let result = tracker
            .run(every_second(), sleep(Duration::from_secs(12)))
            .await;

        assert!(matches!(result, Err(Error::ConfigValidation { .. })));
        assert!(!tracker.is_running());
        assert_eq!(kv.peek(DEFAULT_LOCATIONS_KEY), None);
    }

    #[test]
    fn test_timer_suspension_follows_profile() {
        let (android, _) = tracker(PlatformProfile::Android);
        assert!(android.timer_active(AppState::Foreground));
        assert!(!android.timer_active(AppState::Background));

        let (ios, _) = tracker(PlatformProfile::Ios);
        assert!(ios.timer_active(AppState::Background));
    }

    #[test]
    fn test_lifecycle_handle_shared() {
        let (tracker, _) = tracker(PlatformProfile::Android);
        let handle = tracker.lifecycle();
        assert_eq!(handle.current(), AppState::Foreground);

        handle.enter_background();
        assert_eq!(tracker.lifecycle().current(), AppState::Background);
        handle.enter_foreground();
        assert_eq!(tracker.lifecycle().current(), AppState::Foreground);
    }
}
