use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use axum::middleware;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use removals_backend::{
    config::Config,
    db,
    entities::user::{self, UserRole},
    middleware::rate_limit::{create_global_governor, log_request},
    routes,
    services::{
        geocoding::Geocoder,
        map_token::{ConfigProvider, TokenCache, TokenChain},
        routing::{MapboxClient, RoutingService},
        simulator::TrackingSimulator,
    },
    AppState,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "removals_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!("Starting server at {}", config.server_addr());

    let db = db::connect(&config)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Connected to database");

    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Migrations complete");

    seed_admin(&db, &config).await;

    // Map provider wiring: one token chain shared by routing and geocoding
    let client = reqwest::Client::new();
    let token_cache = TokenCache::new();
    let map_tokens: Arc<dyn ConfigProvider> = Arc::new(TokenChain::standard(
        config.mapbox_token.clone(),
        token_cache.clone(),
        client.clone(),
        config.config_service_url.as_deref(),
    ));
    if map_tokens.map_token().await.is_none() {
        tracing::warn!("No map token configured; routes will use straight-line estimates");
    }

    let mapbox = MapboxClient::new(client.clone(), &config.mapbox_api_url, map_tokens.clone());
    let routing = RoutingService::new(Arc::new(mapbox));
    let geocoder = Geocoder::new(client, &config.mapbox_api_url, map_tokens.clone());
    let simulator = TrackingSimulator::new(db.clone(), Duration::from_secs(config.tracking_tick_secs));

    let state = AppState {
        db,
        config: config.clone(),
        map_tokens,
        token_cache,
        routing,
        geocoder,
        simulator: simulator.clone(),
    };

    let app = routes::create_router(state)
        .layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(create_global_governor());

    let addr: SocketAddr = config.server_addr().parse().expect("Invalid address");
    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    simulator.stop_all();
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

/// Seed the admin account if it doesn't exist
async fn seed_admin(db: &sea_orm::DatabaseConnection, config: &Config) {
    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(&config.admin_email))
        .one(db)
        .await
        .expect("Failed to check for admin");

    if existing.is_none() {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(config.admin_password.as_bytes(), &salt)
            .expect("Failed to hash admin password")
            .to_string();

        let admin = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(config.admin_email.clone()),
            password_hash: Set(password_hash),
            name: Set("Admin".to_string()),
            phone: Set(None),
            role: Set(UserRole::Admin),
            ..Default::default()
        };

        admin.insert(db).await.expect("Failed to create admin");
        tracing::info!("Admin account created: {}", config.admin_email);
    }
}
