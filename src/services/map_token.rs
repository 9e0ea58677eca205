//! Map token resolution.
//!
//! Every map-dependent component asks a single [`ConfigProvider`] for its
//! token. [`TokenChain`] tries each source in order and returns the first
//! usable token:
//!
//! 1. the `MAPBOX_TOKEN` environment value
//! 2. the `mapbox_token` cache, filled by manual entry from an operator
//! 3. a remote `GET {base}/config` endpoint, whose token is then cached
//! 4. the compiled-in [`FALLBACK_MAP_TOKEN`]

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Key under which a manually entered token is cached
pub const TOKEN_CACHE_KEY: &str = "mapbox_token";

/// Last-resort public token shipped with the build. Empty means none.
pub const FALLBACK_MAP_TOKEN: &str = "";

/// Mapbox public tokens are prefixed `pk.`; anything else can't be used
/// from the routing and geocoding endpoints.
pub fn is_usable_token(token: &str) -> bool {
    let token = token.trim();
    token.len() > 3 && token.starts_with("pk.")
}

#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Resolve a usable map token, or `None` when every source came up empty
    async fn map_token(&self) -> Option<String>;
}

#[async_trait]
pub trait TokenSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn token(&self) -> Option<String>;
}

pub struct EnvTokenSource {
    value: Option<String>,
}

impl EnvTokenSource {
    pub fn new(value: Option<String>) -> Self {
        Self { value }
    }
}

#[async_trait]
impl TokenSource for EnvTokenSource {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn token(&self) -> Option<String> {
        self.value.clone()
    }
}

/// Operator-entered token, shared with the handler that accepts manual entry
#[derive(Clone, Default)]
pub struct TokenCache {
    inner: Arc<RwLock<Option<String>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: String) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = Some(token);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = None;
        }
    }

    pub fn get(&self) -> Option<String> {
        self.inner.read().ok().and_then(|slot| slot.clone())
    }
}

#[async_trait]
impl TokenSource for TokenCache {
    fn name(&self) -> &'static str {
        TOKEN_CACHE_KEY
    }

    async fn token(&self) -> Option<String> {
        self.get()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteConfig {
    mapbox_token: Option<String>,
}

/// After a failed or unusable fetch the remote source is skipped for this long
pub const REMOTE_RETRY_COOLDOWN: Duration = Duration::from_secs(60);

/// Fetches `{base_url}/config` and reads its `mapboxToken` field.
/// A usable token is written to the shared cache, so later lookups stop there.
pub struct RemoteTokenSource {
    client: Client,
    url: String,
    cache: TokenCache,
    cooldown: Duration,
    retry_at: Mutex<Option<Instant>>,
}

impl RemoteTokenSource {
    pub fn new(client: Client, base_url: &str, cache: TokenCache) -> Self {
        Self {
            client,
            url: format!("{}/config", base_url.trim_end_matches('/')),
            cache,
            cooldown: REMOTE_RETRY_COOLDOWN,
            retry_at: Mutex::new(None),
        }
    }

    fn cooling_down(&self) -> bool {
        self.retry_at
            .lock()
            .ok()
            .and_then(|at| *at)
            .is_some_and(|at| Instant::now() < at)
    }

    fn back_off(&self) {
        if let Ok(mut at) = self.retry_at.lock() {
            *at = Some(Instant::now() + self.cooldown);
        }
    }

    async fn fetch(&self) -> Option<String> {
        let response = self
            .client
            .get(&self.url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match response {
            Ok(r) => match r.json::<RemoteConfig>().await {
                Ok(config) => config.mapbox_token,
                Err(e) => {
                    tracing::warn!(url = %self.url, "Malformed config response: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!(url = %self.url, "Failed to fetch remote config: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl TokenSource for RemoteTokenSource {
    fn name(&self) -> &'static str {
        "remote config"
    }

    async fn token(&self) -> Option<String> {
        if self.cooling_down() {
            return None;
        }

        match self.fetch().await {
            Some(token) if is_usable_token(&token) => {
                let token = token.trim().to_string();
                self.cache.set(token.clone());
                Some(token)
            }
            fetched => {
                self.back_off();
                fetched
            }
        }
    }
}

pub struct StaticTokenSource(pub &'static str);

#[async_trait]
impl TokenSource for StaticTokenSource {
    fn name(&self) -> &'static str {
        "built-in fallback"
    }

    async fn token(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

pub struct TokenChain {
    sources: Vec<Box<dyn TokenSource>>,
}

impl TokenChain {
    pub fn new(sources: Vec<Box<dyn TokenSource>>) -> Self {
        Self { sources }
    }

    /// The standard resolution order
    pub fn standard(
        env_token: Option<String>,
        cache: TokenCache,
        client: Client,
        config_service_url: Option<&str>,
    ) -> Self {
        let mut sources: Vec<Box<dyn TokenSource>> = vec![
            Box::new(EnvTokenSource::new(env_token)),
            Box::new(cache.clone()),
        ];
        if let Some(url) = config_service_url {
            sources.push(Box::new(RemoteTokenSource::new(client, url, cache)));
        }
        sources.push(Box::new(StaticTokenSource(FALLBACK_MAP_TOKEN)));
        Self::new(sources)
    }
}

#[async_trait]
impl ConfigProvider for TokenChain {
    async fn map_token(&self) -> Option<String> {
        for source in &self.sources {
            match source.token().await {
                Some(token) if is_usable_token(&token) => {
                    tracing::debug!(source = source.name(), "Resolved map token");
                    return Some(token.trim().to_string());
                }
                Some(_) => {
                    tracing::debug!(source = source.name(), "Ignoring unusable map token");
                }
                None => {}
            }
        }

        tracing::warn!("No usable map token from any source");
        None
    }
}
