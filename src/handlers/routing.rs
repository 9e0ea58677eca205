use axum::{extract::State, Json};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};

use crate::entities::driver_location::{self, TrackingStatus};
use crate::entities::job::VehicleType;
use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::pricing::{JobItem, PriceQuote};
use crate::services::routing::{DriverAllocation, DriverCandidate, JourneyEstimate};
use crate::utils::geo::{Location, RouteEstimate};
use crate::AppState;

fn validate(location: &Location, field: &str) -> AppResult<()> {
    if !location.is_valid() {
        return Err(AppError::BadRequest(format!("Invalid {} coordinates", field)));
    }
    Ok(())
}

/// Drivers whose latest report says they're free, at their reported position
pub async fn available_drivers(db: &DatabaseConnection) -> AppResult<Vec<DriverCandidate>> {
    let locations = driver_location::Entity::find()
        .filter(driver_location::Column::Status.eq(TrackingStatus::Available))
        .all(db)
        .await?;

    let drivers = user::Entity::find()
        .filter(user::Column::Role.eq(UserRole::Driver))
        .all(db)
        .await?;

    Ok(locations
        .into_iter()
        .filter_map(|loc| {
            let driver = drivers.iter().find(|d| d.id == loc.driver_id)?;
            Some(DriverCandidate {
                id: driver.id,
                name: Some(driver.name.clone()),
                location: Location::new(loc.lat, loc.lng),
            })
        })
        .collect())
}

// ============ Single-leg route ============

#[derive(Debug, Deserialize)]
pub struct CalculateDistanceRequest {
    pub origin: Location,
    pub destination: Location,
}

#[derive(Debug, Serialize)]
pub struct CalculateDistanceResponse {
    pub success: bool,
    pub route: RouteEstimate,
}

/// Road distance between two points; degrades to a straight-line estimate
pub async fn calculate_distance(
    State(state): State<AppState>,
    Json(payload): Json<CalculateDistanceRequest>,
) -> AppResult<Json<CalculateDistanceResponse>> {
    validate(&payload.origin, "origin")?;
    validate(&payload.destination, "destination")?;

    let route = state
        .routing
        .calculate_route(&payload.origin, &payload.destination)
        .await;

    Ok(Json(CalculateDistanceResponse {
        success: true,
        route,
    }))
}

// ============ Multi-leg journey ============

#[derive(Debug, Deserialize)]
pub struct JourneyEstimateRequest {
    pub waypoints: Vec<Location>,
}

#[derive(Debug, Serialize)]
pub struct JourneyEstimateResponse {
    pub success: bool,
    pub journey: JourneyEstimate,
}

pub async fn journey_estimate(
    State(state): State<AppState>,
    Json(payload): Json<JourneyEstimateRequest>,
) -> AppResult<Json<JourneyEstimateResponse>> {
    let journey = state
        .routing
        .calculate_journey_estimate(&payload.waypoints)
        .await?;

    Ok(Json(JourneyEstimateResponse {
        success: true,
        journey,
    }))
}

// ============ Driver allocation ============

#[derive(Debug, Deserialize)]
pub struct AllocateDriverRequest {
    pub job_location: Location,
    /// Candidates to choose from; defaults to every driver currently available
    #[serde(default)]
    pub available_drivers: Option<Vec<DriverCandidate>>,
}

#[derive(Debug, Serialize)]
pub struct AllocateDriverResponse {
    pub success: bool,
    #[serde(flatten)]
    pub allocation: DriverAllocation,
}

pub async fn allocate_driver(
    State(state): State<AppState>,
    Json(payload): Json<AllocateDriverRequest>,
) -> AppResult<Json<AllocateDriverResponse>> {
    let drivers = match payload.available_drivers {
        Some(drivers) => drivers,
        None => available_drivers(&state.db).await?,
    };

    let allocation = state
        .routing
        .allocate_nearest_driver(&payload.job_location, &drivers)
        .await?;

    Ok(Json(AllocateDriverResponse {
        success: true,
        allocation,
    }))
}

// ============ Quote ============

#[derive(Debug, Deserialize)]
pub struct QuoteOverride {
    pub amount: f64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub pickup: Location,
    pub delivery: Location,
    pub vehicle_type: VehicleType,
    #[serde(default)]
    pub items: Vec<JobItem>,
    #[serde(default)]
    pub price_override: Option<QuoteOverride>,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub success: bool,
    pub route: RouteEstimate,
    pub total_volume: f64,
    pub quote: PriceQuote,
    pub customer_price: f64,
    pub driver_price: f64,
}

/// Price a move between two addresses
pub async fn quote(
    State(state): State<AppState>,
    Json(payload): Json<QuoteRequest>,
) -> AppResult<Json<QuoteResponse>> {
    validate(&payload.pickup, "pickup")?;
    validate(&payload.delivery, "delivery")?;
    if payload.items.iter().any(|i| i.quantity < 1) {
        return Err(AppError::BadRequest(
            "Item quantity must be at least 1".to_string(),
        ));
    }

    let route = state
        .routing
        .calculate_route(&payload.pickup, &payload.delivery)
        .await;

    let mut quote = PriceQuote::new(payload.vehicle_type, route.distance_miles, &payload.items);
    if let Some(o) = payload.price_override {
        quote = quote.with_override(o.amount, o.reason);
    }

    Ok(Json(QuoteResponse {
        success: true,
        total_volume: crate::pricing::total_volume(&payload.items),
        customer_price: quote.customer_price(),
        driver_price: quote.driver_price(),
        route,
        quote,
    }))
}
