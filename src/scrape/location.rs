use serde::{Deserialize, Serialize};

use super::{de_opt_id, execute, QueryTransport, ScrapeError};

const OPERATION: &str = "GetLocationFromPlace";

const QUERY: &str = r#"
query GetLocationFromPlace($placeId: String!, $sessionToken: String) {
  locationFromPlace(placeId: $placeId, sessionToken: $sessionToken) {
    location {
      id
      coordinates { latitude longitude }
      name { en_CA fr_CA }
      __typename
    }
  }
}
"#;

/// Sent in place of a real autocomplete session token.
///
/// The endpoint currently accepts it. A deployment that starts getting
/// rejected here needs a per-call token instead.
pub const SESSION_TOKEN_PLACEHOLDER: &str = "SOME_SESSION_TOKEN";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Variables<'a> {
    place_id: &'a str,
    session_token: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationData {
    #[serde(default)]
    location_from_place: Option<LocationFromPlace>,
}

#[derive(Debug, Default, Deserialize)]
struct LocationFromPlace {
    #[serde(default)]
    location: Option<MarketLocation>,
}

#[derive(Debug, Default, Deserialize)]
struct MarketLocation {
    #[serde(default, deserialize_with = "de_opt_id")]
    id: Option<i64>,
}

/// External place id to marketplace location id.
#[derive(Debug, Default, Clone)]
pub struct LocationResolver;

impl LocationResolver {
    pub fn new() -> Self {
        Self
    }

    /// One query, no retry. `Ok(None)` when the response carries no location id.
    pub fn resolve(
        &self,
        transport: &dyn QueryTransport,
        place_id: &str,
    ) -> Result<Option<i64>, ScrapeError> {
        let data: Option<LocationData> = execute(
            transport,
            OPERATION,
            QUERY,
            Variables {
                place_id,
                session_token: SESSION_TOKEN_PLACEHOLDER,
            },
        )?;

        let location_id = data
            .and_then(|d| d.location_from_place)
            .and_then(|l| l.location)
            .and_then(|l| l.id);

        match location_id {
            Some(id) => log::info!("place {place_id} -> location {id}"),
            None => log::warn!("place {place_id}: no location id in response"),
        }

        Ok(location_id)
    }
}
