//! Coordinate math for route progress.
//!
//! Coordinates are WGS84 latitude/longitude in degrees. Lengths along a
//! route are great-circle (haversine) meters. Nearest-point searches run
//! in a `LocalFrame`: flat east/north meters around the walker, which is
//! accurate enough over the few kilometres a walking route spans.

use serde::{Deserialize, Serialize};

/// A geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

/// Earth radius in meters (WGS84 mean).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Haversine distance between two coordinates in meters.
pub fn haversine(a: &Coordinate, b: &Coordinate) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Flat east/north meters centred on one coordinate.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    origin: Coordinate,
    m_per_deg_lat: f64,
    m_per_deg_lon: f64,
}

/// Closest approach of a segment to a frame's origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentFix {
    /// Position of the closest point between the segment ends, 0.0..=1.0.
    pub fraction: f64,
    /// Distance from the origin to the closest point, in meters.
    pub offset_m: f64,
}

impl LocalFrame {
    pub fn around(origin: Coordinate) -> Self {
        let m_per_deg_lat = EARTH_RADIUS_M.to_radians();
        Self {
            origin,
            m_per_deg_lat,
            m_per_deg_lon: m_per_deg_lat * origin.lat.to_radians().cos(),
        }
    }

    /// `(east, north)` offset of `c` from the origin, in meters.
    pub fn offset_of(&self, c: &Coordinate) -> (f64, f64) {
        (
            (c.lon - self.origin.lon) * self.m_per_deg_lon,
            (c.lat - self.origin.lat) * self.m_per_deg_lat,
        )
    }

    /// Closest point of segment `a`..`b` to the origin.
    pub fn closest_on_segment(&self, a: &Coordinate, b: &Coordinate) -> SegmentFix {
        let (ax, ay) = self.offset_of(a);
        let (bx, by) = self.offset_of(b);
        let (dx, dy) = (bx - ax, by - ay);
        let len_sq = dx * dx + dy * dy;

        // Steps repeat their boundary point, giving zero-length segments
        let fraction = if len_sq < 1e-9 {
            0.0
        } else {
            (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0)
        };

        SegmentFix {
            fraction,
            offset_m: (ax + fraction * dx).hypot(ay + fraction * dy),
        }
    }
}
