//! Interval-gated sample recorder.
//!
//! Two event sources feed one [`Recorder`]: the location watcher
//! ([`Recorder::on_fix`]) and the interval timer ([`Recorder::on_tick`]).
//! Both share a sample cache holding the latest fix and an interval gate
//! holding the time of the last persisted sample. Whichever source reaches
//! an interval boundary first claims the gate and persists; the other one
//! sees the gate closed and skips.
//!
//! The gate is claimed synchronously, under a lock that is released before
//! the first `.await`. Handlers may interleave at the storage suspension
//! point without ever persisting twice in one interval.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::location::{LocationPoint, RawPosition};
use crate::storage::LocationStore;

/// Capacity of the update broadcast; slow listeners lose the oldest updates.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Which event source is asking to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSource {
    /// The location watcher callback.
    Watcher,
    /// The interval timer.
    Timer,
}

impl std::fmt::Display for SampleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Watcher => write!(f, "watcher"),
            Self::Timer => write!(f, "timer"),
        }
    }
}

/// Tracking lifecycle as seen by the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    /// Tracking has not been started.
    Uninitialized,
    /// Started, no fix received yet.
    AwaitingFix,
    /// At least one fix is in the sample cache.
    HasFix,
}

/// A persisted point together with the new history length.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationUpdate {
    /// The point that was just saved.
    pub point: LocationPoint,
    /// Number of saved points after this one.
    pub saved_count: usize,
    /// Which source persisted it.
    pub source: SampleSource,
}

/// Result of one watcher or timer event.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// A point was persisted.
    Saved(LocationUpdate),
    /// The fix only refreshed the sample cache.
    Cached,
    /// The gate was closed: a sample was persisted less than one interval ago.
    Throttled,
    /// The timer fired before the first fix arrived.
    AwaitingFix,
    /// The gate was claimed but the write failed; the interval is lost.
    SaveFailed,
}

impl SampleOutcome {
    /// The saved update, if any.
    #[must_use]
    pub fn saved(&self) -> Option<&LocationUpdate> {
        match self {
            Self::Saved(update) => Some(update),
            _ => None,
        }
    }
}

/// Timestamp of the last claimed interval slot.
#[derive(Debug, Clone, Copy)]
struct IntervalGate {
    interval: chrono::Duration,
    last: Option<DateTime<Utc>>,
}

impl IntervalGate {
    fn new(interval: Duration) -> Self {
        Self {
            interval: chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX),
            last: None,
        }
    }

    /// Claim the slot at `now` if at least one interval has passed.
    fn try_claim(&mut self, now: DateTime<Utc>) -> bool {
        let open = self.last.map_or(true, |last| now - last >= self.interval);
        if open {
            self.last = Some(now);
        }
        open
    }
}

#[derive(Debug)]
struct GateState {
    started: bool,
    cache: Option<RawPosition>,
    gate: IntervalGate,
}

/// Options fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderOptions {
    /// Minimum spacing between persisted samples.
    pub interval: Duration,
    /// Whether the watcher persists samples itself because the timer may be
    /// suspended while fixes keep arriving.
    pub background_capable: bool,
}

/// Coordinates the watcher and timer paths over one sample cache and one
/// interval gate.
#[derive(Debug)]
pub struct Recorder {
    options: RecorderOptions,
    state: Mutex<GateState>,
    store: LocationStore,
    clock: Arc<dyn Clock>,
    updates: broadcast::Sender<LocationUpdate>,
}

impl Recorder {
    /// Create a recorder persisting into `store`.
    #[must_use]
    pub fn new(options: RecorderOptions, store: LocationStore, clock: Arc<dyn Clock>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(GateState {
                started: false,
                cache: None,
                gate: IntervalGate::new(options.interval),
            }),
            options,
            store,
            clock,
            updates,
        }
    }

    /// Construction options.
    #[must_use]
    pub fn options(&self) -> RecorderOptions {
        self.options
    }

    /// Receive an update after every successful persist.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LocationUpdate> {
        self.updates.subscribe()
    }

    /// Mark tracking as started. Returns `false` if it already was.
    pub fn start(&self) -> bool {
        let mut state = self.lock();
        let first = !state.started;
        state.started = true;
        first
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TrackingState {
        let state = self.lock();
        match (state.started, state.cache.is_some()) {
            (false, _) => TrackingState::Uninitialized,
            (true, false) => TrackingState::AwaitingFix,
            (true, true) => TrackingState::HasFix,
        }
    }

    /// Most recent fix, if any.
    #[must_use]
    pub fn last_fix(&self) -> Option<RawPosition> {
        self.lock().cache
    }

    /// Current time on the recorder's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Time of the last gate claim.
    #[must_use]
    pub fn last_claim(&self) -> Option<DateTime<Utc>> {
        self.lock().gate.last
    }

    /// Handle a watcher callback.
    ///
    /// Always refreshes the sample cache. Persists only when the recorder is
    /// background-capable and the gate is open.
    pub async fn on_fix(&self, position: RawPosition) -> SampleOutcome {
        let claimed = {
            let mut state = self.lock();
            state.cache = Some(position);
            if !self.options.background_capable {
                trace!(lat = position.latitude, lon = position.longitude, "Fix cached");
                return SampleOutcome::Cached;
            }
            self.claim(&mut state)
        };

        match claimed {
            Some(now) => self.persist(&position, now, SampleSource::Watcher).await,
            None => SampleOutcome::Throttled,
        }
    }

    /// Handle an interval timer tick.
    ///
    /// Persists the cached fix when the gate is open; does nothing before
    /// the first fix.
    pub async fn on_tick(&self) -> SampleOutcome {
        let claimed = {
            let mut state = self.lock();
            let Some(position) = state.cache else {
                debug!("Waiting for first location");
                return SampleOutcome::AwaitingFix;
            };
            self.claim(&mut state).map(|now| (position, now))
        };

        match claimed {
            Some((position, now)) => self.persist(&position, now, SampleSource::Timer).await,
            None => {
                trace!("Skipping tick, saved recently");
                SampleOutcome::Throttled
            }
        }
    }

    /// All saved points, oldest first. Read failures yield an empty list.
    pub async fn saved_locations(&self) -> Vec<LocationPoint> {
        self.store.load_or_empty().await
    }

    /// Number of saved points. Read failures count as zero.
    pub async fn location_count(&self) -> usize {
        self.saved_locations().await.len()
    }

    /// Delete the saved history. The gate keeps its last claim.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the history cannot be removed.
    pub async fn clear_history(&self) -> crate::Result<()> {
        self.store.clear().await?;
        info!("Saved locations cleared");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self, state: &mut GateState) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        state.gate.try_claim(now).then_some(now)
    }

    async fn persist(
        &self,
        position: &RawPosition,
        claimed_at: DateTime<Utc>,
        source: SampleSource,
    ) -> SampleOutcome {
        let point = LocationPoint::from_fix(position, claimed_at);

        match self.store.append(&point).await {
            Ok(saved_count) => {
                info!(
                    %source,
                    id = %point.id,
                    at = %point.date_string,
                    saved_count,
                    "Location saved"
                );
                let update = LocationUpdate {
                    point,
                    saved_count,
                    source,
                };
                // No subscribers is fine.
                let _ = self.updates.send(update.clone());
                SampleOutcome::Saved(update)
            }
            Err(e) => {
                warn!(%source, error = %e, "Error saving location");
                SampleOutcome::SaveFailed
            }
        }
    }
}
