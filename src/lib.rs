pub mod android_jni;
pub mod config;
pub mod directions;
pub mod error;
pub mod geo;
mod in_flight;
pub mod logging;
pub mod polyline;
pub mod position;
pub mod session;

pub use config::GuidanceConfig;
pub use directions::{DirectionsClient, HttpTransport, NavigationStep, UreqTransport};
pub use error::{DecodeError, GuidanceError, LocationError};
pub use geo::Coordinate;
pub use position::{LocationProvider, Position, PositionTracker, Refresh, RefreshSchedule};
pub use session::{
    Destination, DirectionsOutcome, ExternalLinkOpener, GuidanceSession, MapRegion, Route,
    RouteProgress, SessionEvent,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
