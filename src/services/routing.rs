//! Road routing and driver allocation.
//!
//! [`RoutingService`] sits in front of a [`RouteProvider`]:
//!
//! - single-leg routes fall back to the Haversine estimate when the provider fails,
//!   and say so through [`RouteSource`];
//! - multi-leg journeys and driver allocation have no fallback and return the error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::services::map_token::ConfigProvider;
use crate::utils::geo::{estimate_route, Location, RouteEstimate, RouteSource};

const METRES_PER_MILE: f64 = 1609.344;

/// Mapbox Matrix accepts 25 coordinates per request; one is the destination
pub const MAX_MATRIX_SOURCES: usize = 24;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("No usable map token configured")]
    MissingToken,
    #[error("Routing request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Routing provider returned {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("No route found ({0})")]
    NoRoute(String),
    #[error("Malformed routing response: {0}")]
    Malformed(String),
    #[error("At least 2 waypoints are required, got {0}")]
    TooFewWaypoints(usize),
    #[error("No available drivers to allocate")]
    NoDrivers,
    #[error("Invalid coordinates")]
    InvalidLocation,
}

/// Road path through two or more points as reported by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedPath {
    pub distance_metres: f64,
    pub duration_secs: f64,
    pub geometry: Option<String>,
    pub legs: Vec<(f64, f64)>,
}

/// Travel cost from one matrix source to the destination; `None` when unroutable
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixCell {
    pub duration_secs: Option<f64>,
    pub distance_metres: Option<f64>,
}

#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Route through `waypoints` in order
    async fn route(&self, waypoints: &[Location]) -> Result<RoutedPath, RoutingError>;

    /// Travel cost from each of `sources` to `destination`, in the order given
    async fn matrix_to(
        &self,
        sources: &[Location],
        destination: &Location,
    ) -> Result<Vec<MatrixCell>, RoutingError>;
}

// ---------------------------------------------------------------------------
// Mapbox provider
// ---------------------------------------------------------------------------

pub struct MapboxClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn ConfigProvider>,
}

#[derive(Deserialize)]
struct DirectionsResponse {
    code: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Deserialize)]
struct DirectionsRoute {
    distance: f64, // metres
    duration: f64, // seconds
    geometry: Option<String>,
    #[serde(default)]
    legs: Vec<DirectionsLeg>,
}

#[derive(Deserialize)]
struct DirectionsLeg {
    distance: f64,
    duration: f64,
}

#[derive(Deserialize)]
struct MatrixResponse {
    code: String,
    durations: Option<Vec<Vec<Option<f64>>>>,
    distances: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

fn coordinate_list<'a>(points: impl IntoIterator<Item = &'a Location>) -> String {
    points
        .into_iter()
        .map(|p| format!("{},{}", p.lng, p.lat))
        .collect::<Vec<_>>()
        .join(";")
}

impl MapboxClient {
    pub fn new(client: Client, base_url: &str, tokens: Arc<dyn ConfigProvider>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, RoutingError> {
        let token = self.tokens.map_token().await.ok_or(RoutingError::MissingToken)?;

        let response = self
            .client
            .get(url)
            .query(query)
            .query(&[("access_token", token)])
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| "no message".to_string());
            return Err(RoutingError::Status { status, message });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RoutingError::Malformed(e.to_string()))
    }

    /// One Matrix request for at most [`MAX_MATRIX_SOURCES`] sources
    async fn matrix_chunk(
        &self,
        sources: &[Location],
        destination: &Location,
    ) -> Result<Vec<MatrixCell>, RoutingError> {
        // Destination first so source indices are 1..=n
        let url = format!(
            "{}/directions-matrix/v1/mapbox/driving/{}",
            self.base_url,
            coordinate_list(std::iter::once(destination).chain(sources))
        );
        let source_indices = (1..=sources.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");
        let query = [
            ("sources", source_indices),
            ("destinations", "0".to_string()),
            ("annotations", "duration,distance".to_string()),
        ];

        let body: MatrixResponse = self.get_json(&url, &query).await?;
        if body.code != "Ok" {
            return Err(RoutingError::NoRoute(body.code));
        }

        let durations = body
            .durations
            .ok_or_else(|| RoutingError::Malformed("missing durations".to_string()))?;
        if durations.len() != sources.len() {
            return Err(RoutingError::Malformed(format!(
                "expected {} rows, got {}",
                sources.len(),
                durations.len()
            )));
        }
        let distances = body.distances.unwrap_or_default();

        Ok(durations
            .iter()
            .enumerate()
            .map(|(i, row)| MatrixCell {
                duration_secs: row.first().copied().flatten(),
                distance_metres: distances.get(i).and_then(|r| r.first().copied().flatten()),
            })
            .collect())
    }
}

#[async_trait]
impl RouteProvider for MapboxClient {
    async fn route(&self, waypoints: &[Location]) -> Result<RoutedPath, RoutingError> {
        let url = format!(
            "{}/directions/v5/mapbox/driving/{}",
            self.base_url,
            coordinate_list(waypoints)
        );
        let query = [
            ("geometries", "polyline".to_string()),
            ("overview", "full".to_string()),
        ];

        let body: DirectionsResponse = self.get_json(&url, &query).await?;
        if body.code != "Ok" {
            return Err(RoutingError::NoRoute(body.code));
        }

        let route = body
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| RoutingError::NoRoute("empty route list".to_string()))?;

        Ok(RoutedPath {
            distance_metres: route.distance,
            duration_secs: route.duration,
            geometry: route.geometry,
            legs: route.legs.iter().map(|l| (l.distance, l.duration)).collect(),
        })
    }

    async fn matrix_to(
        &self,
        sources: &[Location],
        destination: &Location,
    ) -> Result<Vec<MatrixCell>, RoutingError> {
        let mut cells = Vec::with_capacity(sources.len());
        for chunk in sources.chunks(MAX_MATRIX_SOURCES) {
            cells.extend(self.matrix_chunk(chunk, destination).await?);
        }
        Ok(cells)
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteLeg {
    pub distance_miles: f64,
    pub duration_minutes: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JourneyEstimate {
    pub distance_miles: f64,
    pub duration_minutes: f64,
    pub legs: Vec<RouteLeg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverCandidate {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DriverAllocation {
    pub driver: DriverCandidate,
    pub eta_minutes: f64,
    pub distance_miles: f64,
}

#[derive(Clone)]
pub struct RoutingService {
    provider: Arc<dyn RouteProvider>,
}

impl RoutingService {
    pub fn new(provider: Arc<dyn RouteProvider>) -> Self {
        Self { provider }
    }

    /// Road route between two points, or the straight-line estimate if the provider fails
    pub async fn calculate_route(&self, origin: &Location, destination: &Location) -> RouteEstimate {
        match self
            .provider
            .route(&[origin.clone(), destination.clone()])
            .await
        {
            Ok(path) => RouteEstimate {
                distance_miles: path.distance_metres / METRES_PER_MILE,
                duration_minutes: path.duration_secs / 60.0,
                geometry: path.geometry,
                source: RouteSource::Routed,
            },
            Err(e) => {
                tracing::warn!("Routing provider failed, using Haversine estimate: {}", e);
                estimate_route(origin, destination)
            }
        }
    }

    pub async fn calculate_journey_estimate(
        &self,
        waypoints: &[Location],
    ) -> Result<JourneyEstimate, RoutingError> {
        if waypoints.len() < 2 {
            return Err(RoutingError::TooFewWaypoints(waypoints.len()));
        }
        if waypoints.iter().any(|w| !w.is_valid()) {
            return Err(RoutingError::InvalidLocation);
        }

        let path = self.provider.route(waypoints).await.inspect_err(|e| {
            tracing::error!(waypoints = waypoints.len(), "Journey estimate failed: {}", e);
        })?;

        Ok(JourneyEstimate {
            distance_miles: path.distance_metres / METRES_PER_MILE,
            duration_minutes: path.duration_secs / 60.0,
            legs: path
                .legs
                .iter()
                .map(|(metres, secs)| RouteLeg {
                    distance_miles: metres / METRES_PER_MILE,
                    duration_minutes: secs / 60.0,
                })
                .collect(),
            geometry: path.geometry,
        })
    }

    /// Pick the driver with the shortest road travel time to the job
    pub async fn allocate_nearest_driver(
        &self,
        job_location: &Location,
        drivers: &[DriverCandidate],
    ) -> Result<DriverAllocation, RoutingError> {
        if drivers.is_empty() {
            return Err(RoutingError::NoDrivers);
        }
        if !job_location.is_valid() || drivers.iter().any(|d| !d.location.is_valid()) {
            return Err(RoutingError::InvalidLocation);
        }

        let sources: Vec<Location> = drivers.iter().map(|d| d.location.clone()).collect();
        let cells = self
            .provider
            .matrix_to(&sources, job_location)
            .await
            .inspect_err(|e| tracing::error!("Driver allocation failed: {}", e))?;

        let (index, cell, duration) = cells
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| cell.duration_secs.map(|d| (i, cell, d)))
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .ok_or_else(|| RoutingError::NoRoute("no driver can reach the job".to_string()))?;

        let driver = drivers
            .get(index)
            .cloned()
            .ok_or_else(|| RoutingError::Malformed("matrix row out of range".to_string()))?;

        tracing::info!(driver_id = %driver.id, eta_secs = duration, "Allocated nearest driver");

        Ok(DriverAllocation {
            driver,
            eta_minutes: duration / 60.0,
            distance_miles: cell.distance_metres.unwrap_or(0.0) / METRES_PER_MILE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::geo::haversine_miles;

    struct Unreachable;

    #[async_trait]
    impl RouteProvider for Unreachable {
        async fn route(&self, _waypoints: &[Location]) -> Result<RoutedPath, RoutingError> {
            Err(RoutingError::MissingToken)
        }

        async fn matrix_to(
            &self,
            _sources: &[Location],
            _destination: &Location,
        ) -> Result<Vec<MatrixCell>, RoutingError> {
            Err(RoutingError::MissingToken)
        }
    }

    struct FixedMatrix(Vec<MatrixCell>);

    #[async_trait]
    impl RouteProvider for FixedMatrix {
        async fn route(&self, _waypoints: &[Location]) -> Result<RoutedPath, RoutingError> {
            Ok(RoutedPath {
                distance_metres: 16_093.44,
                duration_secs: 1_200.0,
                geometry: Some("abc".to_string()),
                legs: vec![(16_093.44, 1_200.0)],
            })
        }

        async fn matrix_to(
            &self,
            _sources: &[Location],
            _destination: &Location,
        ) -> Result<Vec<MatrixCell>, RoutingError> {
            Ok(self.0.clone())
        }
    }

    fn driver(lat: f64) -> DriverCandidate {
        DriverCandidate {
            id: Uuid::new_v4(),
            name: None,
            location: Location::new(lat, -0.1),
        }
    }

    #[tokio::test]
    async fn test_fallback_scenario_ten_miles() {
        // 10 straight-line miles due north
        let pickup = Location::new(51.0, -0.1);
        let delta = 10.0 / haversine_miles(0.0, 0.0, 1.0, 0.0);
        let delivery = Location::new(51.0 + delta, -0.1);

        let service = RoutingService::new(Arc::new(Unreachable));
        let route = service.calculate_route(&pickup, &delivery).await;

        assert_eq!(route.source, RouteSource::Estimated);
        assert!((route.distance_miles - 12.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_routed_result_is_tagged() {
        let service = RoutingService::new(Arc::new(FixedMatrix(vec![])));
        let route = service
            .calculate_route(&Location::new(51.0, 0.0), &Location::new(51.1, 0.0))
            .await;
        assert_eq!(route.source, RouteSource::Routed);
        assert!((route.distance_miles - 10.0).abs() < 1e-9);
        assert_eq!(route.duration_minutes, 20.0);
    }

    #[tokio::test]
    async fn test_journey_has_no_fallback() {
        let service = RoutingService::new(Arc::new(Unreachable));
        let result = service
            .calculate_journey_estimate(&[Location::new(51.0, 0.0), Location::new(51.1, 0.0)])
            .await;
        assert!(matches!(result, Err(RoutingError::MissingToken)));
    }

    #[tokio::test]
    async fn test_journey_needs_two_waypoints() {
        let service = RoutingService::new(Arc::new(FixedMatrix(vec![])));
        let result = service
            .calculate_journey_estimate(&[Location::new(51.0, 0.0)])
            .await;
        assert!(matches!(result, Err(RoutingError::TooFewWaypoints(1))));
    }

    #[tokio::test]
    async fn test_allocation_picks_fastest_reachable_driver() {
        let drivers = vec![driver(51.0), driver(51.2), driver(51.4)];
        let service = RoutingService::new(Arc::new(FixedMatrix(vec![
            MatrixCell { duration_secs: Some(900.0), distance_metres: Some(8_000.0) },
            MatrixCell { duration_secs: None, distance_metres: None },
            MatrixCell { duration_secs: Some(300.0), distance_metres: Some(3_218.688) },
        ])));

        let allocation = service
            .allocate_nearest_driver(&Location::new(51.3, -0.1), &drivers)
            .await
            .expect("allocation");

        assert_eq!(allocation.driver.id, drivers[2].id);
        assert_eq!(allocation.eta_minutes, 5.0);
        assert!((allocation.distance_miles - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_allocation_errors_propagate() {
        let service = RoutingService::new(Arc::new(Unreachable));
        let result = service
            .allocate_nearest_driver(&Location::new(51.3, -0.1), &[driver(51.0)])
            .await;
        assert!(matches!(result, Err(RoutingError::MissingToken)));

        let result = service
            .allocate_nearest_driver(&Location::new(51.3, -0.1), &[])
            .await;
        assert!(matches!(result, Err(RoutingError::NoDrivers)));
    }
}
