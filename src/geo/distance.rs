//! Great-circle distance between two coordinates.

use serde::{Deserialize, Serialize};

/// Earth's mean radius in statute miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.7613;

/// A point on the globe in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Distance to `other` in statute miles.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        distance_miles(*self, *other)
    }
}

/// Haversine distance in statute miles.
///
/// Inputs are not range checked. NaN inputs propagate to a NaN result.
pub fn distance_miles(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points; NaN falls through
    let h = if h > 1.0 { 1.0 } else { h };
    let c = 2.0 * h.sqrt().asin();

    EARTH_RADIUS_MILES * c
}
