//! Device position tracking.
//!
//! `PositionTracker` keeps the most recent fix from a `LocationProvider`.
//! Fixes are immutable and replaced wholesale; a failed query keeps the
//! previous fix. `schedule` drives refreshes on a fixed cadence from a
//! tokio task owned by the returned `RefreshSchedule`.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{GuidanceError, LocationError};
use crate::geo::Coordinate;
use crate::in_flight::InFlightGuard;

/// A captured device position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub captured_at: DateTime<Utc>,
}

impl Position {
    /// Position captured now.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self::at(lat, lon, Utc::now())
    }

    pub fn at(lat: f64, lon: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            lat,
            lon,
            captured_at,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

/// Source of device positions, e.g. the platform location service.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Position, LocationError>;
}

/// Result of a refresh attempt that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Refresh {
    /// A new fix replaced the previous one.
    Updated(Position),
    /// Another query was still outstanding; nothing was queried.
    Skipped,
}

pub struct PositionTracker {
    provider: Arc<dyn LocationProvider>,
    latest: Mutex<Option<Position>>,
    query_outstanding: AtomicBool,
}

impl PositionTracker {
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        Self {
            provider,
            latest: Mutex::new(None),
            query_outstanding: AtomicBool::new(false),
        }
    }

    /// Most recent fix, if any was ever obtained.
    pub fn latest(&self) -> Option<Position> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True once the first fix has been obtained.
    pub fn is_ready(&self) -> bool {
        self.latest().is_some()
    }

    /// Query the provider and replace the stored fix.
    ///
    /// Returns `Refresh::Skipped` without querying if a previous query
    /// has not completed yet. On failure the previous fix is kept.
    pub async fn refresh(&self) -> Result<Refresh, GuidanceError> {
        let Some(_guard) = InFlightGuard::acquire(&self.query_outstanding) else {
            return Ok(Refresh::Skipped);
        };

        let position = self.provider.current_position().await?;
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(position.clone());
        Ok(Refresh::Updated(position))
    }

    /// Refresh every `every`, starting immediately, until the returned
    /// schedule is stopped or dropped.
    ///
    /// Until the first fix is obtained every tick retries it. Each new
    /// fix or failure is handed to `on_refresh`; failures never stop the
    /// schedule. Must be called from within a tokio runtime.
    pub fn schedule<F>(self: &Arc<Self>, every: Duration, mut on_refresh: F) -> RefreshSchedule
    where
        F: FnMut(Result<Position, GuidanceError>) + Send + 'static,
    {
        let tracker = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match tracker.refresh().await {
                    Ok(Refresh::Updated(position)) => on_refresh(Ok(position)),
                    Ok(Refresh::Skipped) => {
                        debug!("Position query still outstanding, skipping tick")
                    }
                    Err(e) => {
                        warn!("Position refresh failed: {e}");
                        on_refresh(Err(e));
                    }
                }
            }
        });

        RefreshSchedule { handle }
    }
}

/// Handle to a running refresh schedule. Dropping it cancels the schedule.
pub struct RefreshSchedule {
    handle: JoinHandle<()>,
}

impl RefreshSchedule {
    pub fn stop(self) {
        // Drop aborts
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for RefreshSchedule {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{mpsc, Notify};

    /// Replays scripted results, then repeats the last fix.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<Position, LocationError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<Position, LocationError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LocationProvider for ScriptedProvider {
        async fn current_position(&self) -> Result<Position, LocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    /// Blocks every query until released.
    struct GatedProvider {
        gate: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LocationProvider for GatedProvider {
        async fn current_position(&self) -> Result<Position, LocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(Position::new(1.0, 2.0))
        }
    }

    #[tokio::test]
    async fn not_ready_before_first_fix() {
        let provider = ScriptedProvider::new(vec![Ok(Position::new(1.0, 1.0))]);
        let tracker = PositionTracker::new(provider);
        assert!(!tracker.is_ready());
        assert!(tracker.latest().is_none());

        tracker.refresh().await.unwrap();
        assert!(tracker.is_ready());
    }

    #[tokio::test]
    async fn refresh_replaces_position() {
        let tracker = PositionTracker::new(ScriptedProvider::new(vec![
            Ok(Position::new(1.0, 1.0)),
            Ok(Position::new(2.0, 2.0)),
        ]));

        tracker.refresh().await.unwrap();
        let result = tracker.refresh().await.unwrap();

        assert!(matches!(result, Refresh::Updated(ref p) if p.lat == 2.0));
        assert_eq!(tracker.latest().unwrap().lat, 2.0);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_position() {
        let tracker = PositionTracker::new(ScriptedProvider::new(vec![
            Ok(Position::new(1.0, 1.0)),
            Err(LocationError::Unavailable("no signal".into())),
        ]));

        tracker.refresh().await.unwrap();
        let err = tracker.refresh().await.unwrap_err();

        assert!(matches!(err, GuidanceError::PositionUnavailable(_)));
        assert_eq!(tracker.latest().unwrap().lat, 1.0);
    }

    #[tokio::test]
    async fn overlapping_refresh_is_skipped() {
        let provider = Arc::new(GatedProvider {
            gate: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let tracker = PositionTracker::new(provider.clone());

        let (first, second) = tokio::join!(tracker.refresh(), async {
            let second = tracker.refresh().await;
            provider.gate.notify_one();
            second
        });

        assert!(matches!(first.unwrap(), Refresh::Updated(_)));
        assert_eq!(second.unwrap(), Refresh::Skipped);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_retries_until_first_fix_then_keeps_refreshing() {
        let provider = ScriptedProvider::new(vec![
            Err(LocationError::PermissionDenied),
            Ok(Position::new(1.0, 1.0)),
            Ok(Position::new(2.0, 2.0)),
        ]);
        let tracker = Arc::new(PositionTracker::new(provider.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let schedule = tracker.schedule(Duration::from_secs(5), move |result| {
            let _ = tx.send(result.map(|p| p.lat));
        });

        assert!(rx.recv().await.unwrap().is_err());
        assert_eq!(rx.recv().await.unwrap().unwrap(), 1.0);
        assert_eq!(rx.recv().await.unwrap().unwrap(), 2.0);
        assert!(schedule.is_running());
        assert_eq!(tracker.latest().unwrap().lat, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_schedule_does_no_more_work() {
        let provider = ScriptedProvider::new(vec![Ok(Position::new(1.0, 1.0))]);
        let tracker = Arc::new(PositionTracker::new(provider.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let schedule = tracker.schedule(Duration::from_secs(5), move |result| {
            let _ = tx.send(result.is_ok());
        });
        assert!(rx.recv().await.unwrap());

        schedule.stop();
        let calls = provider.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), calls);
        // Sender dropped with the aborted task
        assert!(rx.recv().await.is_none());
    }
}
