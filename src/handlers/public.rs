use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::driver_location::{self, TrackingStatus};
use crate::entities::job::{self, JobStatus};
use crate::error::{AppError, AppResult};
use crate::services::map_token::ConfigProvider;
use crate::utils::geo::Location;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ClientConfig {
    #[serde(rename = "mapboxToken")]
    pub mapbox_token: Option<String>,
}

/// Client configuration, served the way the remote config endpoint expects
pub async fn get_config(State(state): State<AppState>) -> Json<ClientConfig> {
    Json(ClientConfig {
        mapbox_token: state.config.mapbox_token.clone(),
    })
}

#[derive(Debug, Serialize)]
pub struct MapTokenResponse {
    pub success: bool,
    pub token: String,
}

/// The token resolved through the full fallback chain
pub async fn map_token(State(state): State<AppState>) -> AppResult<Json<MapTokenResponse>> {
    let token = state.map_tokens.map_token().await.ok_or_else(|| {
        AppError::ServiceUnavailable("Map services are not configured".to_string())
    })?;

    Ok(Json(MapTokenResponse {
        success: true,
        token,
    }))
}

#[derive(Debug, Deserialize)]
pub struct GeocodeQuery {
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct GeocodeResponse {
    pub success: bool,
    pub results: Vec<Location>,
}

/// Address suggestions for a partial query
pub async fn geocode(
    State(state): State<AppState>,
    Query(query): Query<GeocodeQuery>,
) -> AppResult<Json<GeocodeResponse>> {
    let results = state.geocoder.search(&query.q).await?;
    Ok(Json(GeocodeResponse {
        success: true,
        results,
    }))
}

#[derive(Debug, Serialize)]
pub struct DriverPosition {
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
    pub speed_mph: f64,
    pub status: TrackingStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TrackingResponse {
    pub job_id: Uuid,
    pub job_status: JobStatus,
    pub pickup: Location,
    pub delivery: Location,
    pub simulated: bool,
    pub driver: Option<DriverPosition>,
}

/// Live position of the driver carrying a job
pub async fn tracking(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<TrackingResponse>> {
    let job = job::Entity::find_by_id(job_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;

    if let Some(simulated) = state.simulator.snapshot(job.id) {
        return Ok(Json(TrackingResponse {
            job_id: job.id,
            job_status: job.status,
            pickup: job.pickup(),
            delivery: job.delivery(),
            simulated: true,
            driver: Some(DriverPosition {
                lat: simulated.state.lat,
                lng: simulated.state.lng,
                heading: simulated.state.heading,
                speed_mph: simulated.state.speed_mph,
                status: simulated.state.status,
                updated_at: simulated.updated_at,
            }),
        }));
    }

    let latest = driver_location::Entity::find()
        .filter(driver_location::Column::JobId.eq(job_id))
        .order_by_desc(driver_location::Column::UpdatedAt)
        .one(&state.db)
        .await?;

    Ok(Json(TrackingResponse {
        job_id: job.id,
        job_status: job.status,
        pickup: job.pickup(),
        delivery: job.delivery(),
        simulated: false,
        driver: latest.map(|l| DriverPosition {
            lat: l.lat,
            lng: l.lng,
            heading: l.heading,
            speed_mph: l.speed_mph,
            status: l.status,
            updated_at: l.updated_at.with_timezone(&Utc),
        }),
    }))
}
