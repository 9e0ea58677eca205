use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;

use crate::services::map_token::ConfigProvider;
use crate::utils::geo::Location;

/// Quiet period after the last keystroke before a search is issued
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// Shorter queries clear the suggestion list instead of searching
pub const MIN_QUERY_CHARS: usize = 3;

const MAX_SUGGESTIONS: u8 = 5;

#[derive(Debug, Error)]
pub enum GeocodingError {
    #[error("No usable map token configured")]
    MissingToken,
    #[error("Geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid geocoding base URL")]
    InvalidBaseUrl,
}

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    id: String,
    text: Option<String>,
    place_name: String,
    center: [f64; 2], // [lng, lat]
    #[serde(default)]
    context: Vec<ContextEntry>,
}

#[derive(Deserialize)]
struct ContextEntry {
    id: String,
    text: String,
}

impl Feature {
    fn postcode(&self) -> Option<String> {
        if self.id.starts_with("postcode.") {
            return self.text.clone();
        }
        self.context
            .iter()
            .find(|c| c.id.starts_with("postcode."))
            .map(|c| c.text.clone())
    }

    fn into_location(self) -> Location {
        let postcode = self.postcode();
        Location {
            lat: self.center[1],
            lng: self.center[0],
            address: Some(self.place_name),
            postcode,
        }
    }
}

/// Forward geocoding against the Mapbox places endpoint, biased to GB addresses
#[derive(Clone)]
pub struct Geocoder {
    client: Client,
    base_url: String,
    tokens: Arc<dyn ConfigProvider>,
}

impl Geocoder {
    pub fn new(client: Client, base_url: &str, tokens: Arc<dyn ConfigProvider>) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            tokens,
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Location>, GeocodingError> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            return Ok(Vec::new());
        }

        let token = self.tokens.map_token().await.ok_or(GeocodingError::MissingToken)?;

        let file = format!("{}.json", query);
        let mut url = Url::parse(&self.base_url).map_err(|_| GeocodingError::InvalidBaseUrl)?;
        url.path_segments_mut()
            .map_err(|_| GeocodingError::InvalidBaseUrl)?
            .pop_if_empty()
            .extend(["geocoding", "v5", "mapbox.places", file.as_str()]);

        let limit = MAX_SUGGESTIONS.to_string();

        let collection: FeatureCollection = self
            .client
            .get(url)
            .query(&[
                ("access_token", token.as_str()),
                ("country", "gb"),
                ("autocomplete", "true"),
                ("types", "address,postcode,poi"),
                ("limit", limit.as_str()),
            ])
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(collection
            .features
            .into_iter()
            .map(Feature::into_location)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Autocomplete session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub seq: u64,
    pub query: String,
}

/// Input-side state of an address autocomplete box.
///
/// Keystrokes go to [`input`](Self::input); the caller polls with the current
/// time and runs whatever [`SearchRequest`] comes out. Results are only
/// accepted for the most recently issued request.
#[derive(Debug)]
pub struct AutocompleteSession {
    delay: Duration,
    pending: Option<(String, Instant)>,
    issued: u64,
    suggestions: Vec<Location>,
    open: bool,
    selected: Option<Location>,
}

impl Default for AutocompleteSession {
    fn default() -> Self {
        Self::new(DEBOUNCE_DELAY)
    }
}

impl AutocompleteSession {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            issued: 0,
            suggestions: Vec::new(),
            open: false,
            selected: None,
        }
    }

    pub fn input(&mut self, query: &str, now: Instant) {
        self.selected = None;

        if query.trim().chars().count() < MIN_QUERY_CHARS {
            self.pending = None;
            self.suggestions.clear();
            self.open = false;
            // Anything still in flight is now stale
            self.issued += 1;
            return;
        }

        self.pending = Some((query.trim().to_string(), now));
    }

    /// When the pending query becomes due, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at + self.delay)
    }

    pub fn poll(&mut self, now: Instant) -> Option<SearchRequest> {
        let due = self.deadline().is_some_and(|deadline| now >= deadline);
        if !due {
            return None;
        }

        let (query, _) = self.pending.take()?;
        self.issued += 1;
        Some(SearchRequest {
            seq: self.issued,
            query,
        })
    }

    /// Store results for `seq`. Returns `false` if a newer request superseded it.
    pub fn accept(&mut self, seq: u64, results: Vec<Location>) -> bool {
        if seq != self.issued {
            tracing::debug!(seq, latest = self.issued, "Discarding stale geocoding results");
            return false;
        }
        self.open = !results.is_empty();
        self.suggestions = results;
        true
    }

    pub fn select(&mut self, index: usize) -> Option<Location> {
        let chosen = self.suggestions.get(index).cloned()?;
        self.selected = Some(chosen.clone());
        self.open = false;
        Some(chosen)
    }

    /// Click outside the list
    pub fn dismiss(&mut self) {
        self.open = false;
    }

    pub fn suggestions(&self) -> &[Location] {
        &self.suggestions
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn selected(&self) -> Option<&Location> {
        self.selected.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(name: &str) -> Location {
        Location {
            lat: 51.5,
            lng: -0.1,
            address: Some(name.to_string()),
            postcode: None,
        }
    }

    #[test]
    fn test_burst_of_keystrokes_issues_one_search() {
        let start = Instant::now();
        let mut session = AutocompleteSession::default();

        session.input("10 D", start);
        session.input("10 Dow", start + Duration::from_millis(150));
        session.input("10 Downing", start + Duration::from_millis(300));

        assert_eq!(session.poll(start + Duration::from_millis(700)), None);

        let request = session
            .poll(start + Duration::from_millis(800))
            .expect("search due");
        assert_eq!(request.query, "10 Downing");
        assert_eq!(session.poll(start + Duration::from_secs(5)), None);
    }

    #[test]
    fn test_short_query_clears_without_searching() {
        let start = Instant::now();
        let mut session = AutocompleteSession::default();
        session.input("SW1A", start);
        let request = session.poll(start + DEBOUNCE_DELAY).expect("search due");
        assert!(session.accept(request.seq, vec![place("SW1A 1AA")]));
        assert!(session.is_open());

        session.input("SW", start + Duration::from_secs(1));
        assert!(!session.is_open());
        assert!(session.suggestions().is_empty());
        assert_eq!(session.poll(start + Duration::from_secs(3)), None);
    }

    #[test]
    fn test_stale_results_are_dropped() {
        let start = Instant::now();
        let mut session = AutocompleteSession::default();

        session.input("Baker", start);
        let first = session.poll(start + DEBOUNCE_DELAY).expect("first search");

        session.input("Baker Street", start + Duration::from_secs(1));
        let second = session
            .poll(start + Duration::from_secs(1) + DEBOUNCE_DELAY)
            .expect("second search");

        assert!(session.accept(second.seq, vec![place("221B Baker Street")]));
        assert!(!session.accept(first.seq, vec![place("Baker Road")]));
        assert_eq!(
            session.suggestions()[0].address.as_deref(),
            Some("221B Baker Street")
        );
    }

    #[test]
    fn test_select_and_dismiss_close_the_list() {
        let start = Instant::now();
        let mut session = AutocompleteSession::default();
        session.input("Oxford", start);
        let request = session.poll(start + DEBOUNCE_DELAY).expect("search due");
        session.accept(request.seq, vec![place("Oxford Street"), place("Oxford Circus")]);

        session.dismiss();
        assert!(!session.is_open());

        let chosen = session.select(1).expect("second suggestion");
        assert_eq!(chosen.address.as_deref(), Some("Oxford Circus"));
        assert_eq!(session.selected(), Some(&chosen));
        assert!(session.select(9).is_none());
    }

    #[test]
    fn test_postcode_from_context() {
        let feature: Feature = serde_json::from_value(serde_json::json!({
            "id": "address.123",
            "text": "Downing Street",
            "place_name": "10 Downing Street, London SW1A 2AA, United Kingdom",
            "center": [-0.1276, 51.5034],
            "context": [
                { "id": "postcode.456", "text": "SW1A 2AA" },
                { "id": "place.789", "text": "London" }
            ]
        }))
        .expect("feature");

        let location = feature.into_location();
        assert_eq!(location.postcode.as_deref(), Some("SW1A 2AA"));
        assert_eq!(location.lat, 51.5034);
        assert_eq!(location.lng, -0.1276);
    }
}
