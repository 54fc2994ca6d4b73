use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use walkguide::error::TransportError;
use walkguide::{
    Destination, DirectionsClient, DirectionsOutcome, GuidanceConfig, GuidanceError,
    GuidanceSession, HttpTransport, LocationError, LocationProvider, Position, PositionTracker,
    SessionEvent,
};

const DIRECTIONS: &str = r#"{
  "status": "OK",
  "routes": [{
    "legs": [
      { "steps": [
        { "distance": { "text": "1.1 km" }, "duration": { "text": "14 mins" },
          "html_instructions": "Head <b>east</b>", "polyline": { "points": "???o}@" } }
      ] },
      { "steps": [
        { "distance": { "text": "1.1 km" }, "duration": { "text": "14 mins" },
          "html_instructions": "Turn <b>left</b> toward <b>Gallery 3</b>",
          "polyline": { "points": "?o}@o}@?" } }
      ] }
    ]
  }]
}"#;

struct WalkingProvider {
    fixes: Mutex<VecDeque<Result<Position, LocationError>>>,
    calls: AtomicUsize,
}

#[async_trait]
impl LocationProvider for WalkingProvider {
    async fn current_position(&self) -> Result<Position, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut fixes = self.fixes.lock().unwrap();
        if fixes.len() > 1 {
            fixes.pop_front().unwrap()
        } else {
            fixes.front().cloned().unwrap()
        }
    }
}

struct CannedTransport {
    bodies: Mutex<VecDeque<Result<String, u16>>>,
    calls: AtomicUsize,
}

#[async_trait]
impl HttpTransport for CannedTransport {
    async fn get(
        &self,
        _url: &str,
        _query: &[(&'static str, String)],
    ) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut bodies = self.bodies.lock().unwrap();
        let next = if bodies.len() > 1 {
            bodies.pop_front().unwrap()
        } else {
            bodies.front().cloned().unwrap()
        };
        next.map_err(TransportError::Status)
    }
}

fn destination() -> Destination {
    Destination::new(3, 0.01, 0.01).with_ar_link("https://ar.example.org/gallery/3")
}

#[tokio::test(start_paused = true)]
async fn walk_to_gallery() {
    let provider = Arc::new(WalkingProvider {
        fixes: Mutex::new(VecDeque::from(vec![
            Err(LocationError::PermissionDenied),
            Ok(Position::new(0.0, 0.0)),
            Ok(Position::new(0.0, 0.005)),
        ])),
        calls: AtomicUsize::new(0),
    });
    let transport = Arc::new(CannedTransport {
        bodies: Mutex::new(VecDeque::from(vec![Ok(DIRECTIONS.to_string()), Err(503)])),
        calls: AtomicUsize::new(0),
    });

    let config = GuidanceConfig::new("integration-key");
    let directions = DirectionsClient::new(&config, transport.clone());
    let session = GuidanceSession::new(destination(), directions);
    let tracker = Arc::new(PositionTracker::new(provider.clone()));

    // Nothing to route from yet
    assert!(matches!(
        session.request_directions().await,
        Err(GuidanceError::PositionUnavailable(_))
    ));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

    let mut events = session.start_tracking(&tracker, config.refresh_interval());
    assert!(session.is_tracking());

    assert!(matches!(events.recv().await, Some(SessionEvent::PositionUnavailable(_))));
    assert!(session.map_region().is_none());

    assert!(matches!(events.recv().await, Some(SessionEvent::PositionUpdated(_))));
    assert!(tracker.is_ready());
    assert_eq!(session.map_region().unwrap().center.lat, 0.0);

    let outcome = session.request_directions().await.unwrap();
    assert_eq!(outcome, DirectionsOutcome::Updated { steps: 2, points: 4 });
    let steps = session.current_steps();
    assert_eq!(steps[1].instruction_text, "Turn left toward Gallery 3");
    assert_eq!(session.current_route_path().len(), 4);

    // Moving does not refetch
    assert!(matches!(events.recv().await, Some(SessionEvent::PositionUpdated(_))));
    assert_eq!(session.current_position().unwrap().lon, 0.005);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

    let progress = session.progress().unwrap();
    assert_eq!(progress.step_index, 0);
    assert!(progress.off_route_m < 1.0);

    // Service outage keeps the last route
    let path_before = session.current_route_path();
    assert!(matches!(
        session.request_directions().await,
        Err(GuidanceError::RouteUnavailable(_))
    ));
    assert_eq!(session.current_route_path(), path_before);
    assert_eq!(session.current_steps(), steps);

    session.stop_tracking();
    assert!(!session.is_tracking());
    let calls = provider.calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(provider.calls.load(Ordering::SeqCst), calls);
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn dropping_session_cancels_tracking() {
    let provider = Arc::new(WalkingProvider {
        fixes: Mutex::new(VecDeque::from(vec![Ok(Position::new(0.0, 0.0))])),
        calls: AtomicUsize::new(0),
    });
    let transport = Arc::new(CannedTransport {
        bodies: Mutex::new(VecDeque::from(vec![Err(500)])),
        calls: AtomicUsize::new(0),
    });
    let config = GuidanceConfig::new("k");
    let session = GuidanceSession::new(destination(), DirectionsClient::new(&config, transport));
    let tracker = Arc::new(PositionTracker::new(provider));

    let mut events = session.start_tracking(&tracker, Duration::from_millis(10));
    assert!(events.recv().await.is_some());

    drop(session);
    // Drain anything sent before the abort landed; the channel must close
    while events.recv().await.is_some() {}
}
