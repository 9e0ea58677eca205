use axum::{extract::State, Extension, Json};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::driver_location::{self, TrackingStatus};
use crate::entities::job;
use crate::error::{AppError, AppResult};
use crate::services::positions::{record_position, PositionReport};
use crate::utils::geo::Location;
use crate::utils::jwt::Claims;
use crate::AppState;

/// Jobs assigned to the logged-in driver, soonest first
pub async fn my_jobs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<job::Model>>> {
    let jobs = job::Entity::find()
        .filter(job::Column::DriverId.eq(claims.sub))
        .order_by_asc(job::Column::ScheduledDate)
        .all(&state.db)
        .await?;

    Ok(Json(jobs))
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default)]
    pub speed_mph: f64,
    pub status: TrackingStatus,
    pub job_id: Option<Uuid>,
}

/// Report the driver's current position
pub async fn update_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateLocationRequest>,
) -> AppResult<Json<driver_location::Model>> {
    if !Location::new(payload.lat, payload.lng).is_valid() {
        return Err(AppError::BadRequest("Invalid coordinates".to_string()));
    }
    if payload.speed_mph < 0.0 {
        return Err(AppError::BadRequest("Speed cannot be negative".to_string()));
    }

    if let Some(job_id) = payload.job_id {
        let job = job::Entity::find_by_id(job_id)
            .one(&state.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;
        if job.driver_id != Some(claims.sub) {
            return Err(AppError::Forbidden("Job is not assigned to you".to_string()));
        }
    }

    let saved = record_position(
        &state.db,
        PositionReport {
            driver_id: claims.sub,
            job_id: payload.job_id,
            lat: payload.lat,
            lng: payload.lng,
            heading: payload.heading.rem_euclid(360.0),
            speed_mph: payload.speed_mph,
            status: payload.status,
        },
    )
    .await?;

    Ok(Json(saved))
}
