use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::handlers::{admin, auth, customer, driver, public, routing};
use crate::middleware::auth::{
    auth_middleware, require_admin, require_customer, require_driver, require_staff,
};
use crate::middleware::rate_limit::create_public_governor;
use crate::middleware::role_rate_limit::{create_role_governor, RateLimitedRole};
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    let driver_governor = create_role_governor(RateLimitedRole::Driver);
    let staff_governor = create_role_governor(RateLimitedRole::Staff);
    let customer_governor = create_role_governor(RateLimitedRole::Customer);
    let public_governor = create_public_governor();

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(public_governor.clone());

    // Unauthenticated lookups (client config, address search, live tracking)
    let public_routes = Router::new()
        .route("/config", get(public::get_config))
        .route("/geocode", get(public::geocode))
        .route("/tracking/{job_id}", get(public::tracking))
        .layer(public_governor);

    // Routing and pricing for the operations console (admin or driver)
    let staff_routes = Router::new()
        .route("/calculate-distance", post(routing::calculate_distance))
        .route("/journey/estimate", post(routing::journey_estimate))
        .route("/allocate-driver", post(routing::allocate_driver))
        .route("/quote", post(routing::quote))
        .route("/map-token", get(public::map_token))
        .layer(staff_governor)
        .layer(middleware::from_fn(require_staff))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Admin routes, only covered by the global limiter
    let admin_routes = Router::new()
        // Jobs
        .route("/jobs", get(admin::list_jobs).post(admin::create_job))
        .route(
            "/jobs/{id}",
            get(admin::get_job)
                .put(admin::update_job)
                .delete(admin::delete_job),
        )
        .route("/jobs/{id}/assign-driver", post(admin::assign_driver))
        .route("/jobs/{id}/auto-allocate", post(admin::auto_allocate))
        .route(
            "/jobs/{id}/simulation",
            post(admin::start_simulation).delete(admin::stop_simulation),
        )
        // Drivers
        .route("/drivers", get(admin::list_drivers).post(admin::create_driver))
        .route("/drivers/{id}", delete(admin::delete_driver))
        // Map token manual entry
        .route(
            "/config/map-token",
            put(admin::set_map_token).delete(admin::clear_map_token),
        )
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let driver_routes = Router::new()
        .route("/jobs", get(driver::my_jobs))
        .route("/location", put(driver::update_location))
        .layer(driver_governor)
        .layer(middleware::from_fn(require_driver))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Self-registered customers see their own bookings
    let customer_routes = Router::new()
        .route("/jobs", get(customer::my_jobs))
        .layer(customer_governor)
        .layer(middleware::from_fn(require_customer))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api/driver", driver_routes)
        .nest("/api/customer", customer_routes)
        .nest("/api", public_routes.merge(staff_routes))
        .with_state(state)
}
