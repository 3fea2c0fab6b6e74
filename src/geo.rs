//! City name to coordinates through the Places text search API.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Config;

const FIELD_MASK: &str = "places.displayName,places.name,places.location";
const PLACE_NAME_PREFIX: &str = "places/";

#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("no place found for {0:?}")]
    NotFound(String),

    #[error("GOOGLE_PLACES_API_KEY is not set")]
    MissingApiKey,

    #[error("geocoding request failed with status {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("reqwest error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected geocoding response: {0}")]
    Schema(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Top-ranked geocoding candidate for a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub display_name: String,
    /// External place id, without the `places/` resource prefix
    pub place_id: String,
    pub coordinates: Coordinates,
}

pub trait Geocoder {
    fn resolve(&self, city: &str, country_code: &str) -> Result<Place, GeoError>;
}

#[derive(Debug, Deserialize)]
struct SearchTextResponse {
    #[serde(default)]
    places: Option<Vec<PlaceCandidate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceCandidate {
    display_name: LocalizedText,
    name: String,
    location: Coordinates,
}

#[derive(Debug, Deserialize)]
struct LocalizedText {
    text: String,
}

pub struct GeoResolver {
    client: reqwest::blocking::Client,
    endpoint: String,
    /// Checked per request so key-less commands can still build a resolver
    api_key: Option<String>,
}

impl GeoResolver {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, GeoError> {
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }

    /// Build from config, reading the API key from the environment.
    pub fn from_config(config: &Config) -> Result<Self, GeoError> {
        Self::new(&config.places_url, Config::places_api_key())
    }

    fn parse_response(query: &str, body: &str) -> Result<Place, GeoError> {
        let resp: SearchTextResponse = serde_json::from_str(body)?;

        // ranked list; the first candidate wins
        let first = resp
            .places
            .and_then(|places| places.into_iter().next())
            .ok_or_else(|| GeoError::NotFound(query.to_string()))?;

        let place_id = first
            .name
            .strip_prefix(PLACE_NAME_PREFIX)
            .unwrap_or(&first.name)
            .to_string();

        Ok(Place {
            display_name: first.display_name.text,
            place_id,
            coordinates: first.location,
        })
    }
}

impl Geocoder for GeoResolver {
    fn resolve(&self, city: &str, country_code: &str) -> Result<Place, GeoError> {
        let api_key = self.api_key.as_deref().ok_or(GeoError::MissingApiKey)?;
        let query = format!("{city}, {country_code}");
        log::debug!("geocoding {query:?}");

        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-Goog-Api-Key", api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&json!({ "textQuery": query }))
            .send()?;

        let status = resp.status();
        let body = resp.text()?;

        if !status.is_success() {
            return Err(GeoError::Http { status, body });
        }

        let place = Self::parse_response(&query, &body)?;
        log::info!(
            "{query}: {} ({}) at {},{}",
            place.display_name,
            place.place_id,
            place.coordinates.latitude,
            place.coordinates.longitude
        );

        Ok(place)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::http::serve_once;

    const EDMONTON: &str = r#"{
        "places": [
            {
                "name": "places/ChIJI__egEUioFMRXRX2SgygH0E",
                "displayName": { "text": "Edmonton", "languageCode": "en" },
                "location": { "latitude": 53.5461245, "longitude": -113.4938229 }
            },
            {
                "name": "places/other",
                "displayName": { "text": "Edmonton County" },
                "location": { "latitude": 1.0, "longitude": 2.0 }
            }
        ]
    }"#;

    #[test]
    fn takes_first_candidate_and_strips_prefix() {
        let place = GeoResolver::parse_response("edmonton, CA", EDMONTON).unwrap();
        assert_eq!(place.display_name, "Edmonton");
        assert_eq!(place.place_id, "ChIJI__egEUioFMRXRX2SgygH0E");
        assert_eq!(place.coordinates.latitude, 53.5461245);
        assert_eq!(place.coordinates.longitude, -113.4938229);
    }

    #[test]
    fn empty_or_missing_candidates_is_not_found() {
        for body in [r#"{}"#, r#"{"places": []}"#] {
            let result = GeoResolver::parse_response("nowhere, CA", body);
            assert!(matches!(result, Err(GeoError::NotFound(q)) if q == "nowhere, CA"));
        }
    }

    #[test]
    fn candidate_without_location_is_a_schema_error() {
        let body = r#"{"places": [{"name": "places/x", "displayName": {"text": "X"}}]}"#;
        let result = GeoResolver::parse_response("x, CA", body);
        assert!(matches!(result, Err(GeoError::Schema(_))));
    }

    #[test]
    fn resolve_sends_query_and_headers() {
        let (url, server) = serve_once("200 OK", EDMONTON);
        let resolver = GeoResolver::new(&url, Some("test-key".into())).unwrap();

        let place = resolver.resolve("edmonton", "CA").unwrap();
        assert_eq!(place.display_name, "Edmonton");

        let request = server.join().unwrap().to_ascii_lowercase();
        assert!(request.starts_with("post /v1/places:searchtext"));
        assert!(request.contains("x-goog-api-key: test-key"));
        assert!(request.contains("x-goog-fieldmask: places.displayname,places.name,places.location"));
        assert!(request.contains(r#"{"textquery":"edmonton, ca"}"#));
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let resolver = GeoResolver::new("http://127.0.0.1:9/v1/places:searchText", None).unwrap();
        assert!(matches!(
            resolver.resolve("edmonton", "CA"),
            Err(GeoError::MissingApiKey)
        ));
    }

    #[test]
    fn resolve_surfaces_http_errors() {
        let (url, server) = serve_once("403 Forbidden", r#"{"error": {"code": 403}}"#);
        let resolver = GeoResolver::new(&url, Some("bad-key".into())).unwrap();

        let result = resolver.resolve("edmonton", "CA");
        assert!(matches!(result, Err(GeoError::Http { status, .. }) if status.as_u16() == 403));
        server.join().unwrap();
    }
}
