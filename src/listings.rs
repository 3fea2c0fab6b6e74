use serde::{Deserialize, Serialize};

/// One marketplace classified ad, normalized from a search result page.
///
/// `id` is assigned by the marketplace and is stable across re-fetches.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub price: Option<f64>,
    pub location: Option<String>,
}

impl Listing {
    /// Whether the description is present, i.e. the listing may get an embedding.
    pub fn is_embeddable(&self) -> bool {
        self.description.is_some()
    }
}

/// Search criteria for one paginated marketplace query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub keywords: String,
    pub category_id: i64,
    /// Marketplace location id; `None` is sent as `null`.
    pub location_id: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    /// Kilometers around the coordinates
    pub radius: f64,
    pub address: String,
}
