//! Guidance toward one fixed destination.
//!
//! A `GuidanceSession` owns the current position, the destination and
//! the last successfully fetched route. Positions arrive from a
//! `PositionTracker` schedule owned by the session; directions are only
//! fetched when `request_directions` is called and never recomputed
//! automatically. The rendering layer reads snapshots through the
//! `current_*` accessors.
//!
//! State only ever moves between good values: a failed position query
//! keeps the last fix and a failed or malformed directions response
//! keeps the last route.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::directions::{DirectionsClient, NavigationStep};
use crate::error::GuidanceError;
use crate::geo::{self, Coordinate, LocalFrame};
use crate::in_flight::InFlightGuard;
use crate::polyline;
use crate::position::{Position, PositionTracker, RefreshSchedule};

/// Span of the initial map region around the current position, in degrees.
pub const MAP_REGION_DELTA: f64 = 0.01;

/// The exhibit or gallery being walked to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub id: u64,
    pub lat: f64,
    pub lon: f64,
    /// External augmented-reality experience for this destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ar_link: Option<String>,
}

impl Destination {
    pub fn new(id: u64, lat: f64, lon: f64) -> Self {
        Self {
            id,
            lat,
            lon,
            ar_link: None,
        }
    }

    pub fn with_ar_link(mut self, link: impl Into<String>) -> Self {
        self.ar_link = Some(link.into());
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

/// Steps of a route together with their decoded path.
///
/// The path is always the in-order concatenation of every step's
/// decoded polyline. Boundary points shared by consecutive steps are
/// kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    steps: Vec<NavigationStep>,
    path: Vec<Coordinate>,
    /// Exclusive end index in `path` of each step's points.
    step_ends: Vec<usize>,
}

impl Route {
    /// Decode every step. Any malformed step fails the whole route.
    pub fn from_steps(steps: Vec<NavigationStep>) -> Result<Self, GuidanceError> {
        let mut path = Vec::new();
        let mut step_ends = Vec::with_capacity(steps.len());
        for (step, s) in steps.iter().enumerate() {
            let points = polyline::decode(&s.encoded_path)
                .map_err(|source| GuidanceError::Decode { step, source })?;
            path.extend(points);
            step_ends.push(path.len());
        }
        Ok(Self {
            steps,
            path,
            step_ends,
        })
    }

    /// Where `at` sits along the route.
    ///
    /// Walks every step's segments in order, measuring each in a frame
    /// centred on `at`, and keeps the closest. A segment belongs to the
    /// step owning its end point, so the joint between two steps counts
    /// toward the later one. `None` when the path has no segment.
    pub fn locate(&self, at: &Coordinate) -> Option<RouteProgress> {
        let frame = LocalFrame::around(*at);
        let mut nearest: Option<RouteProgress> = None;
        let mut walked = 0.0;
        let mut previous: Option<&Coordinate> = None;

        for (step_index, points) in self.step_points().enumerate() {
            for point in points {
                let Some(start) = previous.replace(point) else {
                    continue;
                };
                let fix = frame.closest_on_segment(start, point);
                let length = geo::haversine(start, point);

                if nearest.as_ref().map_or(true, |n| fix.offset_m < n.off_route_m) {
                    nearest = Some(RouteProgress {
                        off_route_m: fix.offset_m,
                        travelled_m: walked + fix.fraction * length,
                        remaining_m: 0.0,
                        step_index,
                    });
                }
                walked += length;
            }
        }

        nearest.map(|mut progress| {
            progress.remaining_m = (walked - progress.travelled_m).max(0.0);
            progress
        })
    }

    /// Decoded points of each step, in step order.
    fn step_points(&self) -> impl Iterator<Item = &[Coordinate]> + '_ {
        let mut start = 0;
        self.step_ends.iter().map(move |&end| {
            let points = &self.path[start..end];
            start = end;
            points
        })
    }

    pub fn steps(&self) -> &[NavigationStep] {
        &self.steps
    }

    pub fn path(&self) -> &[Coordinate] {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Map viewport for the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapRegion {
    pub center: Coordinate,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

/// Where the current position sits relative to the fetched route.
#[derive(Debug, Clone, Serialize)]
pub struct RouteProgress {
    /// Distance from the position to the nearest point of the path.
    pub off_route_m: f64,
    /// Path distance from the route start to that nearest point.
    pub travelled_m: f64,
    /// Path distance from that nearest point to the route end.
    pub remaining_m: f64,
    /// Index of the step containing the nearest point.
    pub step_index: usize,
}

/// Reported by a running position schedule.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PositionUpdated(Position),
    PositionUnavailable(String),
}

/// Result of `request_directions` when nothing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionsOutcome {
    /// The route was replaced.
    Updated { steps: usize, points: usize },
    /// A request was already outstanding; no new one was issued.
    AlreadyInFlight,
}

/// Opens URLs outside the app, e.g. the platform URL handler.
pub trait ExternalLinkOpener: Send + Sync {
    fn open_url(&self, url: &str) -> Result<(), String>;
}

#[derive(Default)]
struct SessionState {
    current_position: Option<Position>,
    route: Route,
}

pub struct GuidanceSession {
    destination: Destination,
    directions: DirectionsClient,
    state: Arc<Mutex<SessionState>>,
    fetch_in_flight: AtomicBool,
    schedule: Mutex<Option<RefreshSchedule>>,
}

impl GuidanceSession {
    pub fn new(destination: Destination, directions: DirectionsClient) -> Self {
        Self {
            destination,
            directions,
            state: Arc::new(Mutex::new(SessionState::default())),
            fetch_in_flight: AtomicBool::new(false),
            schedule: Mutex::new(None),
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Start refreshing the position from `tracker` every `every`.
    ///
    /// Replaces (and cancels) any schedule started earlier. The returned
    /// channel reports every refresh result and closes once tracking
    /// stops. Must be called from within a tokio runtime.
    pub fn start_tracking(
        &self,
        tracker: &Arc<PositionTracker>,
        every: Duration,
    ) -> mpsc::UnboundedReceiver<SessionEvent> {
        if let Some(position) = tracker.latest() {
            replace_position(&self.state, position);
        }

        let state = Arc::clone(&self.state);
        let (tx, rx) = mpsc::unbounded_channel();

        let schedule = tracker.schedule(every, move |result| {
            let event = match result {
                Ok(position) => {
                    replace_position(&state, position.clone());
                    SessionEvent::PositionUpdated(position)
                }
                Err(e) => SessionEvent::PositionUnavailable(e.to_string()),
            };
            // Nobody listening is fine
            let _ = tx.send(event);
        });

        info!("Tracking position every {every:?} for destination {}", self.destination.id);
        *self.schedule.lock().unwrap_or_else(PoisonError::into_inner) = Some(schedule);
        rx
    }

    /// Cancel the position schedule. Safe to call when not tracking.
    pub fn stop_tracking(&self) {
        let schedule = self
            .schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(schedule) = schedule {
            schedule.stop();
            info!("Stopped position tracking for destination {}", self.destination.id);
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(RefreshSchedule::is_running)
    }

    /// Replace the current position. The route is left as is.
    pub fn on_position_refreshed(&self, position: Position) {
        replace_position(&self.state, position);
    }

    /// Fetch walking directions from the current position.
    ///
    /// Fails with `PositionUnavailable` before the first fix without
    /// touching the network. While a fetch is outstanding further calls
    /// return `AlreadyInFlight`. The route is only replaced once the
    /// response has been fetched and every step decoded; any error
    /// leaves the previous route in place.
    pub async fn request_directions(&self) -> Result<DirectionsOutcome, GuidanceError> {
        let Some(origin) = self.current_position() else {
            return Err(GuidanceError::PositionUnavailable(
                "no position fix yet".to_string(),
            ));
        };

        let Some(_guard) = InFlightGuard::acquire(&self.fetch_in_flight) else {
            debug!("Directions request already in flight, ignoring");
            return Ok(DirectionsOutcome::AlreadyInFlight);
        };

        let route = match self.fetch_route(&origin).await {
            Ok(route) => route,
            Err(e) => {
                warn!("Directions request failed: {e}");
                return Err(e);
            }
        };

        let outcome = DirectionsOutcome::Updated {
            steps: route.steps().len(),
            points: route.path().len(),
        };

        self.lock_state().route = route;
        Ok(outcome)
    }

    async fn fetch_route(&self, origin: &Position) -> Result<Route, GuidanceError> {
        let steps = self
            .directions
            .fetch_walking_route(origin, &self.destination)
            .await?;
        Route::from_steps(steps)
    }

    pub fn current_position(&self) -> Option<Position> {
        self.lock_state().current_position.clone()
    }

    pub fn current_steps(&self) -> Vec<NavigationStep> {
        self.lock_state().route.steps().to_vec()
    }

    pub fn current_route_path(&self) -> Vec<Coordinate> {
        self.lock_state().route.path().to_vec()
    }

    pub fn has_route(&self) -> bool {
        !self.lock_state().route.is_empty()
    }

    /// Viewport centred on the current position, `None` before the first fix.
    pub fn map_region(&self) -> Option<MapRegion> {
        self.current_position().map(|p| MapRegion {
            center: p.coordinate(),
            latitude_delta: MAP_REGION_DELTA,
            longitude_delta: MAP_REGION_DELTA,
        })
    }

    /// Straight-line distance from the current position to the destination.
    pub fn distance_to_destination_m(&self) -> Option<f64> {
        self.current_position()
            .map(|p| geo::haversine(&p.coordinate(), &self.destination.coordinate()))
    }

    /// Progress along the fetched route.
    ///
    /// `None` without a position or without a route of at least two points.
    pub fn progress(&self) -> Option<RouteProgress> {
        let state = self.lock_state();
        let position = state.current_position.as_ref()?;
        state.route.locate(&position.coordinate())
    }

    /// Hand the destination's AR link to the platform opener.
    pub fn open_ar_link(&self, opener: &dyn ExternalLinkOpener) -> Result<(), GuidanceError> {
        let link = self
            .destination
            .ar_link
            .as_deref()
            .ok_or(GuidanceError::ArLinkUnavailable(self.destination.id))?;
        opener.open_url(link).map_err(GuidanceError::LinkOpenFailed)
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn replace_position(state: &Mutex<SessionState>, position: Position) {
    state
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .current_position = Some(position);
}
