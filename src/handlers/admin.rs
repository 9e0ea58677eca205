use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::driver_location;
use crate::entities::job::{self, JobStatus, VehicleType};
use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::handlers::routing::available_drivers;
use crate::pricing::JobItem;
use crate::services::map_token::is_usable_token;
use crate::services::routing::RoutingService;
use crate::tracking::TrackingState;
use crate::utils::geo::{Location, RouteSource};
use crate::wizard::{CustomerDetails, FinishAction, JobWizard, NewJob};
use crate::AppState;

// ============ Job Management ============

#[derive(Debug, Deserialize)]
pub struct PriceOverrideRequest {
    pub amount: f64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    pub customer: CustomerDetails,
    pub scheduled_date: Option<NaiveDate>,
    pub time_slot: Option<String>,
    pub pickup: Option<Location>,
    pub delivery: Option<Location>,
    #[serde(default)]
    pub items: Vec<JobItem>,
    pub vehicle_type: VehicleType,
    pub price_override: Option<PriceOverrideRequest>,
    pub notes: Option<String>,
    pub action: FinishAction,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    #[serde(flatten)]
    pub job: job::Model,
    pub route_source: Option<RouteSource>,
}

fn new_job_model(new_job: NewJob) -> job::ActiveModel {
    job::ActiveModel {
        id: Set(new_job.id),
        status: Set(new_job.status),
        customer_name: Set(new_job.customer.name),
        customer_email: Set(new_job.customer.email),
        customer_phone: Set(new_job.customer.phone),
        scheduled_date: Set(new_job.scheduled_date),
        time_slot: Set(new_job.time_slot),
        pickup_lat: Set(new_job.pickup.lat),
        pickup_lng: Set(new_job.pickup.lng),
        pickup_address: Set(new_job.pickup.address),
        pickup_postcode: Set(new_job.pickup.postcode),
        delivery_lat: Set(new_job.delivery.lat),
        delivery_lng: Set(new_job.delivery.lng),
        delivery_address: Set(new_job.delivery.address),
        delivery_postcode: Set(new_job.delivery.postcode),
        distance_miles: Set(new_job.distance_miles),
        duration_minutes: Set(new_job.duration_minutes),
        total_volume: Set(new_job.total_volume),
        customer_price: Set(new_job.customer_price),
        driver_price: Set(new_job.driver_price),
        price_override_reason: Set(new_job.price_override_reason),
        items: Set(serde_json::json!(new_job.items)),
        vehicle_type: Set(new_job.vehicle_type),
        notes: Set(new_job.notes),
        driver_id: Set(None),
        ..Default::default()
    }
}

/// Walk the creation wizard with a submitted form, routing the leg once both ends are known
async fn plan_job(
    routing: &RoutingService,
    payload: CreateJobRequest,
) -> AppResult<(NewJob, Option<RouteSource>)> {
    let mut wizard = JobWizard::new();

    // Step 1: customer and schedule
    wizard.set_customer(payload.customer);
    if let Some(date) = payload.scheduled_date {
        wizard.set_schedule(date, payload.time_slot);
    }
    wizard.set_notes(payload.notes);
    wizard.next()?;

    // Step 2: locations
    let mut route_request = None;
    if let Some(pickup) = payload.pickup {
        route_request = wizard.set_pickup(pickup)?;
    }
    if let Some(delivery) = payload.delivery {
        route_request = wizard.set_delivery(delivery)?;
    }
    if let Some(request) = route_request {
        let route = routing
            .calculate_route(&request.origin, &request.destination)
            .await;
        wizard.apply_route(request.seq, route);
    }
    wizard.next()?;

    // Step 3: items and vehicle
    wizard.set_vehicle(payload.vehicle_type);
    for item in payload.items {
        wizard.add_item(item)?;
    }
    wizard.next()?;

    // Step 4: price review
    if let Some(o) = payload.price_override {
        wizard.set_price_override(o.amount, o.reason);
    }
    let route_source = wizard.route().map(|r| r.source);
    let new_job = wizard.finish(payload.action)?;

    Ok((new_job, route_source))
}

/// Create a job from the wizard form (admin)
pub async fn create_job(
    State(state): State<AppState>,
    Json(payload): Json<CreateJobRequest>,
) -> AppResult<Json<CreateJobResponse>> {
    let (new_job, route_source) = plan_job(&state.routing, payload).await?;

    let job = new_job_model(new_job).insert(&state.db).await?;
    tracing::info!(job_id = %job.id, status = ?job.status, price = job.customer_price, "Job created");

    Ok(Json(CreateJobResponse { job, route_source }))
}

#[derive(Debug, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
}

/// List jobs, newest first, optionally by status (admin)
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> AppResult<Json<Vec<job::Model>>> {
    let mut query = job::Entity::find().order_by_desc(job::Column::CreatedAt);
    if let Some(status) = filter.status {
        query = query.filter(job::Column::Status.eq(status));
    }

    Ok(Json(query.all(&state.db).await?))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<job::Model>> {
    let job = job::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;

    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct UpdateJobRequest {
    pub status: Option<JobStatus>,
    pub scheduled_date: Option<NaiveDate>,
    pub time_slot: Option<String>,
    pub customer_price: Option<f64>,
    pub notes: Option<String>,
}

/// Update a job (admin). The driver price is fixed at creation and is not re-derived.
pub async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateJobRequest>,
) -> AppResult<Json<job::Model>> {
    let job = job::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;

    let mut active: job::ActiveModel = job.into();

    if let Some(status) = payload.status {
        active.status = Set(status);
    }
    if let Some(date) = payload.scheduled_date {
        active.scheduled_date = Set(date);
    }
    if let Some(slot) = payload.time_slot {
        active.time_slot = Set(Some(slot));
    }
    if let Some(price) = payload.customer_price {
        if !price.is_finite() || price < 0.0 {
            return Err(AppError::BadRequest("Price must be a non-negative amount".to_string()));
        }
        active.customer_price = Set(price);
    }
    if let Some(notes) = payload.notes {
        active.notes = Set(Some(notes));
    }

    Ok(Json(active.update(&state.db).await?))
}

/// Delete a job (admin)
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    state.simulator.stop(id);
    let result = job::Entity::delete_by_id(id).exec(&state.db).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Job not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "message": "Job deleted" })))
}

async fn assign(state: &AppState, job: job::Model, driver_id: Uuid) -> AppResult<job::Model> {
    if matches!(job.status, JobStatus::Completed | JobStatus::Cancelled) {
        return Err(AppError::BadRequest(
            "Cannot assign a driver to a closed job".to_string(),
        ));
    }

    let mut active: job::ActiveModel = job.into();
    active.driver_id = Set(Some(driver_id));
    active.status = Set(JobStatus::Assigned);

    let updated = active.update(&state.db).await?;
    tracing::info!(job_id = %updated.id, %driver_id, "Driver assigned");
    Ok(updated)
}

#[derive(Debug, Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: Uuid,
}

/// Assign a specific driver to a job (admin)
pub async fn assign_driver(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(payload): Json<AssignDriverRequest>,
) -> AppResult<Json<job::Model>> {
    let driver = user::Entity::find_by_id(payload.driver_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Driver not found".to_string()))?;

    if driver.role != UserRole::Driver {
        return Err(AppError::BadRequest("User is not a driver".to_string()));
    }

    let job = job::Entity::find_by_id(job_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;

    Ok(Json(assign(&state, job, driver.id).await?))
}

#[derive(Debug, Serialize)]
pub struct AutoAllocateResponse {
    pub job: job::Model,
    pub eta_minutes: f64,
    pub distance_miles: f64,
}

/// Assign the nearest available driver to the job's pickup (admin)
pub async fn auto_allocate(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<AutoAllocateResponse>> {
    let job = job::Entity::find_by_id(job_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;

    let drivers = available_drivers(&state.db).await?;
    let allocation = state
        .routing
        .allocate_nearest_driver(&job.pickup(), &drivers)
        .await?;

    let job = assign(&state, job, allocation.driver.id).await?;

    Ok(Json(AutoAllocateResponse {
        job,
        eta_minutes: allocation.eta_minutes,
        distance_miles: allocation.distance_miles,
    }))
}

// ============ Tracking Simulation ============

/// Start the simulated live-tracking feed for a job (admin)
pub async fn start_simulation(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<TrackingState>> {
    let job = job::Entity::find_by_id(job_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Job not found".to_string()))?;

    let driver_id = job
        .driver_id
        .ok_or_else(|| AppError::BadRequest("Job has no assigned driver".to_string()))?;

    Ok(Json(state.simulator.start(&job, driver_id)))
}

/// Stop the simulated feed for a job (admin)
pub async fn stop_simulation(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    if !state.simulator.cancel(job_id).await? {
        return Err(AppError::NotFound("No simulation running for this job".to_string()));
    }

    Ok(Json(serde_json::json!({ "message": "Simulation stopped" })))
}

// ============ Driver Management ============

#[derive(Debug, Deserialize)]
pub struct CreateDriverRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DriverResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub location: Option<driver_location::Model>,
}

/// Create a driver account (admin)
pub async fn create_driver(
    State(state): State<AppState>,
    Json(payload): Json<CreateDriverRequest>,
) -> AppResult<Json<DriverResponse>> {
    if payload.name.trim().is_empty() || payload.email.trim().is_empty() {
        return Err(AppError::BadRequest("Name and email are required".to_string()));
    }

    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(&payload.email))
        .one(&state.db)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(payload.password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?
        .to_string();

    let driver = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(payload.email),
        password_hash: Set(password_hash),
        name: Set(payload.name),
        phone: Set(payload.phone),
        role: Set(UserRole::Driver),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    Ok(Json(DriverResponse {
        id: driver.id,
        email: driver.email,
        name: driver.name,
        phone: driver.phone,
        created_at: driver.created_at.with_timezone(&Utc),
        location: None,
    }))
}

/// List all drivers with their latest position (admin)
pub async fn list_drivers(State(state): State<AppState>) -> AppResult<Json<Vec<DriverResponse>>> {
    let drivers = user::Entity::find()
        .filter(user::Column::Role.eq(UserRole::Driver))
        .all(&state.db)
        .await?;
    let locations = driver_location::Entity::find().all(&state.db).await?;

    let responses = drivers
        .into_iter()
        .map(|d| DriverResponse {
            location: locations.iter().find(|l| l.driver_id == d.id).cloned(),
            id: d.id,
            email: d.email,
            name: d.name,
            phone: d.phone,
            created_at: d.created_at.with_timezone(&Utc),
        })
        .collect();

    Ok(Json(responses))
}

/// Delete a driver account, releasing their open jobs (admin)
pub async fn delete_driver(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let driver = user::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Driver not found".to_string()))?;

    if driver.role != UserRole::Driver {
        return Err(AppError::BadRequest("User is not a driver".to_string()));
    }

    let jobs = job::Entity::find()
        .filter(job::Column::DriverId.eq(id))
        .all(&state.db)
        .await?;
    for j in jobs {
        state.simulator.stop(j.id);
        let reopen = matches!(j.status, JobStatus::Assigned | JobStatus::InProgress);
        let mut active: job::ActiveModel = j.into();
        active.driver_id = Set(None);
        if reopen {
            active.status = Set(JobStatus::Available);
        }
        active.update(&state.db).await?;
    }

    driver_location::Entity::delete_many()
        .filter(driver_location::Column::DriverId.eq(id))
        .exec(&state.db)
        .await?;

    user::Entity::delete_by_id(id).exec(&state.db).await?;

    Ok(Json(serde_json::json!({ "message": "Driver deleted" })))
}

// ============ Map Token ============

#[derive(Debug, Deserialize)]
pub struct MapTokenRequest {
    pub token: String,
}

/// Manually enter a map token when no other source provides one (admin)
pub async fn set_map_token(
    State(state): State<AppState>,
    Json(payload): Json<MapTokenRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if !is_usable_token(&payload.token) {
        return Err(AppError::BadRequest(
            "Map token must be a public token starting with pk.".to_string(),
        ));
    }

    state.token_cache.set(payload.token.trim().to_string());
    tracing::info!("Map token set manually");

    Ok(Json(serde_json::json!({ "message": "Map token saved" })))
}

/// Forget a manually entered map token (admin)
pub async fn clear_map_token(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    state.token_cache.clear();
    Ok(Json(serde_json::json!({ "message": "Map token cleared" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::services::routing::{MatrixCell, RouteProvider, RoutedPath, RoutingError};

    /// Answers every route with a fixed 12 mile leg
    struct TwelveMiles;

    #[async_trait]
    impl RouteProvider for TwelveMiles {
        async fn route(&self, _waypoints: &[Location]) -> Result<RoutedPath, RoutingError> {
            Ok(RoutedPath {
                distance_metres: 12.0 * 1609.344,
                duration_secs: 1_800.0,
                geometry: Some("_p~iF~ps|U".to_string()),
                legs: vec![(12.0 * 1609.344, 1_800.0)],
            })
        }

        async fn matrix_to(
            &self,
            _sources: &[Location],
            _destination: &Location,
        ) -> Result<Vec<MatrixCell>, RoutingError> {
            Err(RoutingError::MissingToken)
        }
    }

    fn form(body: serde_json::Value) -> CreateJobRequest {
        serde_json::from_value(body).expect("valid form")
    }

    fn complete_form() -> serde_json::Value {
        serde_json::json!({
            "customer": {
                "name": "Ada Lovelace",
                "email": "ada@example.com",
                "phone": "07700 900123"
            },
            "scheduled_date": "2026-11-02",
            "time_slot": "AM",
            "pickup": { "lat": 51.5074, "lng": -0.1278, "postcode": "WC2N 5DU" },
            "delivery": { "lat": 51.6, "lng": -0.1278 },
            "items": [{ "name": "Wardrobe", "quantity": 1, "size": "large" }],
            "vehicle_type": "large_van",
            "action": "publish"
        })
    }

    #[tokio::test]
    async fn test_plan_job_prices_routed_leg() {
        let routing = RoutingService::new(Arc::new(TwelveMiles));

        let (job, source) = plan_job(&routing, form(complete_form())).await.unwrap();

        assert_eq!(source, Some(RouteSource::Routed));
        assert_eq!(job.status, JobStatus::Available);
        assert!((job.distance_miles - 12.0).abs() < 1e-9);
        assert_eq!(job.duration_minutes, 30.0);
        assert_eq!(job.customer_price, 78.0);
        assert_eq!(job.driver_price, (78.0f64 * 0.7).round());
        assert_eq!(job.pickup.postcode.as_deref(), Some("WC2N 5DU"));
        assert_eq!(job.items, vec!["1x Wardrobe (Lg)".to_string()]);
    }

    #[tokio::test]
    async fn test_plan_job_keeps_override_and_draft() {
        let routing = RoutingService::new(Arc::new(TwelveMiles));
        let mut body = complete_form();
        body["action"] = serde_json::json!("save_draft");
        body["price_override"] = serde_json::json!({ "amount": 120.0, "reason": "Stairs" });

        let (job, _) = plan_job(&routing, form(body)).await.unwrap();

        assert_eq!(job.status, JobStatus::Draft);
        assert_eq!(job.customer_price, 120.0);
        assert_eq!(job.driver_price, 84.0);
        assert_eq!(job.price_override_reason.as_deref(), Some("Stairs"));
    }

    #[tokio::test]
    async fn test_plan_job_rejects_missing_customer() {
        let routing = RoutingService::new(Arc::new(TwelveMiles));
        let mut body = complete_form();
        body.as_object_mut().unwrap().remove("customer");

        let err = plan_job(&routing, form(body)).await.unwrap_err();

        assert!(matches!(err, AppError::BadRequest(ref msg) if msg.contains("customer name")));
    }

    #[tokio::test]
    async fn test_plan_job_rejects_missing_delivery() {
        let routing = RoutingService::new(Arc::new(TwelveMiles));
        let mut body = complete_form();
        body.as_object_mut().unwrap().remove("delivery");

        let err = plan_job(&routing, form(body)).await.unwrap_err();

        assert!(matches!(err, AppError::BadRequest(ref msg) if msg.contains("delivery")));
    }
}
