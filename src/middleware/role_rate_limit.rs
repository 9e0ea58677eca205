use axum::http::Request;
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder,
    key_extractor::KeyExtractor,
    GovernorError, GovernorLayer,
};
use uuid::Uuid;

use crate::middleware::rate_limit::rate_limit_error_handler;
use crate::utils::jwt::Claims;

/// Keys the limiter on the user id from the JWT claims set by `auth_middleware`
#[derive(Debug, Clone, Copy)]
pub struct UserIdExtractor;

impl KeyExtractor for UserIdExtractor {
    type Key = Uuid;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let claims = req
            .extensions()
            .get::<Claims>()
            .ok_or(GovernorError::UnableToExtractKey)?;

        Ok(claims.sub)
    }
}

pub type RoleGovernorLayer = GovernorLayer<
    UserIdExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Roles subject to per-user limits. Admins are only covered by the global IP limiter.
pub enum RateLimitedRole {
    Driver,
    Staff,
    Customer,
}

/// - Driver: position reports every few seconds, 500 requests per minute
/// - Staff: routing, quotes and lookups, 200 requests per minute
/// - Customer: booking lookups, 60 requests per minute
pub fn create_role_governor(role: RateLimitedRole) -> RoleGovernorLayer {
    let (per_ms, burst) = match role {
        RateLimitedRole::Driver => (120, 500),
        RateLimitedRole::Staff => (300, 200),
        RateLimitedRole::Customer => (1000, 60),
    };

    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(burst)
            .key_extractor(UserIdExtractor)
            .finish()
            .expect("valid role rate limit config"),
    );

    GovernorLayer::new(config).error_handler(rate_limit_error_handler)
}
