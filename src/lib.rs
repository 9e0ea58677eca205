pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod pricing;
pub mod routes;
pub mod services;
pub mod tracking;
pub mod utils;
pub mod wizard;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

pub use config::Config;
pub use error::{AppError, AppResult};

use services::geocoding::Geocoder;
use services::map_token::{ConfigProvider, TokenCache};
use services::routing::RoutingService;
use services::simulator::TrackingSimulator;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub map_tokens: Arc<dyn ConfigProvider>,
    pub token_cache: TokenCache,
    pub routing: RoutingService,
    pub geocoder: Geocoder,
    pub simulator: TrackingSimulator,
}
