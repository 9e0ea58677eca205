use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::geocoding::GeocodingError;
use crate::services::routing::RoutingError;
use crate::wizard::WizardError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak database details to clients
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

impl From<RoutingError> for AppError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::MissingToken => AppError::ServiceUnavailable(err.to_string()),
            RoutingError::TooFewWaypoints(_)
            | RoutingError::NoDrivers
            | RoutingError::InvalidLocation => {
                AppError::BadRequest(err.to_string())
            }
            _ => AppError::Upstream(err.to_string()),
        }
    }
}

impl From<GeocodingError> for AppError {
    fn from(err: GeocodingError) -> Self {
        match err {
            GeocodingError::MissingToken => AppError::ServiceUnavailable(err.to_string()),
            _ => AppError::Upstream(err.to_string()),
        }
    }
}

impl From<WizardError> for AppError {
    fn from(err: WizardError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
