use std::env;

/// Simulation tick in seconds; zero is rejected
fn parse_tick_secs(raw: &str) -> Option<u64> {
    raw.trim().parse().ok().filter(|secs| *secs > 0)
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub server_host: String,
    pub server_port: u16,
    pub mapbox_token: Option<String>,
    pub mapbox_api_url: String,
    pub config_service_url: Option<String>,
    pub tracking_tick_secs: u64,
    pub admin_email: String,
    pub admin_password: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            jwt_expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a number"),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("SERVER_PORT must be a number"),
            mapbox_token: env::var("MAPBOX_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            mapbox_api_url: env::var("MAPBOX_API_URL")
                .unwrap_or_else(|_| "https://api.mapbox.com".to_string()),
            config_service_url: env::var("CONFIG_SERVICE_URL").ok(),
            tracking_tick_secs: parse_tick_secs(
                &env::var("TRACKING_TICK_SECS").unwrap_or_else(|_| "3".to_string()),
            )
            .expect("TRACKING_TICK_SECS must be a whole number of seconds, at least 1"),
            admin_email: env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@removals.local".to_string()),
            admin_password: env::var("ADMIN_PASSWORD")
                .unwrap_or_else(|_| "admin123".to_string()),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
