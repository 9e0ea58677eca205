//! Routing and allocation against a stand-in Mapbox server

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use removals_backend::services::map_token::{ConfigProvider, StaticTokenSource, TokenChain};
use removals_backend::services::routing::{
    DriverCandidate, MapboxClient, RoutingError, RoutingService, MAX_MATRIX_SOURCES,
};
use removals_backend::utils::geo::{estimate_route, Location, RouteSource};

const LONDON: (f64, f64) = (51.5074, -0.1278);
const BRIGHTON: (f64, f64) = (50.8225, -0.1372);

fn tokens(token: &'static str) -> Arc<dyn ConfigProvider> {
    Arc::new(TokenChain::new(vec![Box::new(StaticTokenSource(token))]))
}

fn service(server: &MockServer, token: &'static str) -> RoutingService {
    let client = MapboxClient::new(reqwest::Client::new(), &server.uri(), tokens(token));
    RoutingService::new(Arc::new(client))
}

fn london() -> Location {
    Location::new(LONDON.0, LONDON.1)
}

fn brighton() -> Location {
    Location::new(BRIGHTON.0, BRIGHTON.1)
}

#[tokio::test]
async fn test_route_from_provider_is_tagged_routed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/directions/v5/mapbox/driving/"))
        .and(query_param("access_token", "pk.test"))
        .and(query_param("geometries", "polyline"))
        .and(query_param("overview", "full"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "Ok",
            "routes": [{
                "distance": 16093.44,
                "duration": 1800.0,
                "geometry": "_p~iF~ps|U_ulLnnqC",
                "legs": [{ "distance": 16093.44, "duration": 1800.0 }]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let route = service(&server, "pk.test")
        .calculate_route(&london(), &brighton())
        .await;

    assert_eq!(route.source, RouteSource::Routed);
    assert!((route.distance_miles - 10.0).abs() < 1e-6);
    assert!((route.duration_minutes - 30.0).abs() < 1e-6);
    assert_eq!(route.geometry.as_deref(), Some("_p~iF~ps|U_ulLnnqC"));
}

#[tokio::test]
async fn test_provider_failure_falls_back_to_estimate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let route = service(&server, "pk.test")
        .calculate_route(&london(), &brighton())
        .await;

    assert_eq!(route.source, RouteSource::Estimated);
    assert_eq!(route, estimate_route(&london(), &brighton()));
}

#[tokio::test]
async fn test_no_route_code_falls_back_to_estimate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "NoRoute",
            "routes": []
        })))
        .mount(&server)
        .await;

    let route = service(&server, "pk.test")
        .calculate_route(&london(), &brighton())
        .await;

    assert_eq!(route.source, RouteSource::Estimated);
}

#[tokio::test]
async fn test_missing_token_skips_provider() {
    let server = MockServer::start().await;

    let route = service(&server, "")
        .calculate_route(&london(), &brighton())
        .await;

    assert_eq!(route.source, RouteSource::Estimated);
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty(), "No request should be sent without a token");
}

#[tokio::test]
async fn test_journey_estimate_sums_legs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/directions/v5/mapbox/driving/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "Ok",
            "routes": [{
                "distance": 32186.88,
                "duration": 3600.0,
                "geometry": "abc",
                "legs": [
                    { "distance": 16093.44, "duration": 1200.0 },
                    { "distance": 16093.44, "duration": 2400.0 }
                ]
            }]
        })))
        .mount(&server)
        .await;

    let waypoints = [london(), Location::new(51.2, -0.13), brighton()];
    let journey = service(&server, "pk.test")
        .calculate_journey_estimate(&waypoints)
        .await
        .unwrap();

    assert!((journey.distance_miles - 20.0).abs() < 1e-6);
    assert!((journey.duration_minutes - 60.0).abs() < 1e-6);
    assert_eq!(journey.legs.len(), 2);
    assert!((journey.legs[1].duration_minutes - 40.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_journey_error_is_propagated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "Coordinate is invalid"
        })))
        .mount(&server)
        .await;

    let result = service(&server, "pk.test")
        .calculate_journey_estimate(&[london(), brighton()])
        .await;

    match result {
        Err(RoutingError::Status { status, message }) => {
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(message, "Coordinate is invalid");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_journey_with_missing_token_errors() {
    let server = MockServer::start().await;

    let result = service(&server, "")
        .calculate_journey_estimate(&[london(), brighton()])
        .await;

    assert!(matches!(result, Err(RoutingError::MissingToken)));
}

#[tokio::test]
async fn test_allocation_picks_shortest_travel_time() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/directions-matrix/v1/mapbox/driving/"))
        .and(query_param("sources", "1;2;3"))
        .and(query_param("destinations", "0"))
        .and(query_param("annotations", "duration,distance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "Ok",
            "durations": [[900.0], [300.0], [null]],
            "distances": [[12000.0], [3218.688], [null]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let drivers: Vec<DriverCandidate> = [(51.60, -0.20), (51.51, -0.12), (50.90, -0.14)]
        .iter()
        .map(|&(lat, lng)| DriverCandidate {
            id: Uuid::new_v4(),
            name: None,
            location: Location::new(lat, lng),
        })
        .collect();

    let allocation = service(&server, "pk.test")
        .allocate_nearest_driver(&london(), &drivers)
        .await
        .unwrap();

    assert_eq!(allocation.driver.id, drivers[1].id);
    assert!((allocation.eta_minutes - 5.0).abs() < 1e-6);
    assert!((allocation.distance_miles - 2.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_allocation_without_drivers_is_rejected() {
    let server = MockServer::start().await;

    let result = service(&server, "pk.test")
        .allocate_nearest_driver(&london(), &[])
        .await;

    assert!(matches!(result, Err(RoutingError::NoDrivers)));
}

#[tokio::test]
async fn test_allocation_error_is_propagated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "Not Authorized - Invalid Token"
        })))
        .mount(&server)
        .await;

    let driver = DriverCandidate {
        id: Uuid::new_v4(),
        name: Some("Sam".to_string()),
        location: brighton(),
    };
    let result = service(&server, "pk.test")
        .allocate_nearest_driver(&london(), &[driver])
        .await;

    assert!(matches!(
        result,
        Err(RoutingError::Status { status, .. }) if status == StatusCode::UNAUTHORIZED
    ));
}

fn source_indices(n: usize) -> String {
    (1..=n).map(|i| i.to_string()).collect::<Vec<_>>().join(";")
}

#[tokio::test]
async fn test_allocation_splits_large_fleets_across_requests() {
    let server = MockServer::start().await;
    let first: Vec<Vec<f64>> = vec![vec![900.0]; MAX_MATRIX_SOURCES];
    Mock::given(method("GET"))
        .and(path_regex("^/directions-matrix/v1/mapbox/driving/"))
        .and(query_param("sources", source_indices(MAX_MATRIX_SOURCES).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "Ok",
            "durations": first,
            "distances": vec![vec![15000.0]; MAX_MATRIX_SOURCES]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/directions-matrix/v1/mapbox/driving/"))
        .and(query_param("sources", source_indices(6).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "Ok",
            "durations": [[600.0], [600.0], [120.0], [600.0], [600.0], [600.0]],
            "distances": [[9000.0], [9000.0], [1609.344], [9000.0], [9000.0], [9000.0]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let drivers: Vec<DriverCandidate> = (0..MAX_MATRIX_SOURCES + 6)
        .map(|i| DriverCandidate {
            id: Uuid::new_v4(),
            name: None,
            location: Location::new(51.4 + i as f64 * 0.005, -0.2),
        })
        .collect();

    let allocation = service(&server, "pk.test")
        .allocate_nearest_driver(&london(), &drivers)
        .await
        .unwrap();

    assert_eq!(allocation.driver.id, drivers[MAX_MATRIX_SOURCES + 2].id);
    assert!((allocation.eta_minutes - 2.0).abs() < 1e-6);
    assert!((allocation.distance_miles - 1.0).abs() < 1e-6);

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 2);
    for request in requests {
        let coordinates = request.url.path().rsplit('/').next().unwrap_or_default();
        assert!(coordinates.split(';').count() <= MAX_MATRIX_SOURCES + 1);
    }
}
