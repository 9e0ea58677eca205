use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_governor::{governor::GovernorConfigBuilder, GovernorError, GovernorLayer};

/// Type alias for IP-based governor layers
pub type IpGovernorLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    Body,
>;

/// Per-IP limit over the whole API, applied before authentication.
/// One token every 60ms, bursts up to 1000.
pub fn create_global_governor() -> IpGovernorLayer {
    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(60)
            .burst_size(1000)
            .finish()
            .expect("valid global rate limit config"),
    );

    GovernorLayer::new(config).error_handler(rate_limit_error_handler)
}

/// Create a GovernorLayer for unauthenticated routes (login, config, geocoding)
/// - 100 requests per minute per IP
pub fn create_public_governor() -> IpGovernorLayer {
    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(600)
            .burst_size(100)
            .finish()
            .expect("valid public rate limit config"),
    );

    GovernorLayer::new(config).error_handler(rate_limit_error_handler)
}

/// JSON body for rejected requests, matching the shape of `AppError` responses
pub fn rate_limit_error_handler(error: GovernorError) -> Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "success": false,
                "error": "Too many requests",
                "retry_after_secs": wait_time,
            })),
        )
            .into_response(),
        GovernorError::UnableToExtractKey => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "error": "Unable to identify client" })),
        )
            .into_response(),
        GovernorError::Other { code, msg, .. } => (
            code,
            Json(json!({
                "success": false,
                "error": msg.unwrap_or_else(|| "Rate limiter error".to_string()),
            })),
        )
            .into_response(),
    }
}

/// Logs each request with its latency; rejections and failures are raised to warn/error
pub async fn log_request(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let client_ip = addr.ip();

    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!(%client_ip, %method, %path, "Rate limited");
    } else if status.is_server_error() {
        tracing::error!(%client_ip, %method, %path, %status, elapsed_ms, "Request errored");
    } else if status.is_client_error() {
        tracing::warn!(%client_ip, %method, %path, %status, elapsed_ms, "Request rejected");
    } else {
        tracing::debug!(%client_ip, %method, %path, %status, elapsed_ms, "Request completed");
    }

    response
}
