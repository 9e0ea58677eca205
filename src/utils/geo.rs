use serde::{Deserialize, Serialize};

/// Mean Earth radius in miles
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

/// Straight-line distance is stretched by this factor to approximate roads
pub const ROAD_CURVATURE_FACTOR: f64 = 1.2;

/// Fixed traffic allowance added to every estimated duration
pub const TRAFFIC_BUFFER_MINUTES: f64 = 10.0;

const LONG_HAUL_THRESHOLD_MILES: f64 = 20.0;
const LONG_HAUL_SPEED_MPH: f64 = 45.0;
const LOCAL_SPEED_MPH: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            address: None,
            postcode: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Whether a route came from the road network or from the straight-line estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    Routed,
    Estimated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEstimate {
    pub distance_miles: f64,
    pub duration_minutes: f64,
    /// Encoded polyline, only present for routed results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,
    pub source: RouteSource,
}

/// Calculate distance between two coordinates using Haversine formula
/// Returns distance in miles
pub fn haversine_miles(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_MILES * c
}

/// Road-distance estimate used when the routing provider can't be reached.
///
/// Distance is the great-circle distance stretched by [`ROAD_CURVATURE_FACTOR`].
/// Duration assumes 45 mph beyond 20 miles and 20 mph below, plus
/// [`TRAFFIC_BUFFER_MINUTES`].
pub fn estimate_route(origin: &Location, destination: &Location) -> RouteEstimate {
    let distance =
        haversine_miles(origin.lat, origin.lng, destination.lat, destination.lng)
            * ROAD_CURVATURE_FACTOR;

    let speed = if distance > LONG_HAUL_THRESHOLD_MILES {
        LONG_HAUL_SPEED_MPH
    } else {
        LOCAL_SPEED_MPH
    };

    RouteEstimate {
        distance_miles: distance,
        duration_minutes: distance / speed * 60.0 + TRAFFIC_BUFFER_MINUTES,
        geometry: None,
        source: RouteSource::Estimated,
    }
}

/// Initial compass bearing from one point to another, in degrees [0, 360)
pub fn bearing_degrees(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let y = delta_lng.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * delta_lng.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}
