use serde::{Deserialize, Serialize};

use super::{de_id, execute, QueryTransport, ScrapeError};
use crate::listings::{Listing, SearchCriteria};

/// Listings requested per page.
pub const PAGE_SIZE: u32 = 40;

const OPERATION: &str = "SearchResultsPage";

const QUERY: &str = r#"
query SearchResultsPage($by: SearchResultsPageInputBy!, $pagination: PaginationInputV2!) {
  searchResultsPage(by: $by, pagination: $pagination) {
    results {
      mainListings(pagination: $pagination) {
        id
        title
        url
        description
        imageUrls
        price {
          __typename
          ... on StandardAmountPrice { amount }
          ... on AutosDealerAmountPrice { amount }
          ... on AmountPrice { amount }
        }
        location { name }
      }
    }
  }
}
"#;

#[derive(Debug, Serialize)]
struct Variables<'a> {
    by: By<'a>,
    pagination: Pagination,
}

#[derive(Debug, Serialize)]
struct By<'a> {
    query: Query<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Query<'a> {
    one_listing_per_user: bool,
    category_id: i64,
    location: Location<'a>,
    keywords: &'a str,
}

/// Location filter, shared with the SEO-url lookup.
#[derive(Debug, Serialize)]
pub(crate) struct Location<'a> {
    pub id: Option<i64>,
    pub area: Area<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Area<'a> {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    pub address: &'a str,
}

impl<'a> Location<'a> {
    pub(crate) fn from_criteria(criteria: &'a SearchCriteria) -> Self {
        Self {
            id: criteria.location_id,
            area: Area {
                latitude: criteria.latitude,
                longitude: criteria.longitude,
                radius: criteria.radius,
                address: &criteria.address,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub(crate) struct Pagination {
    pub offset: u32,
    pub limit: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchData {
    search_results_page: SearchResultsPage,
}

#[derive(Debug, Deserialize)]
struct SearchResultsPage {
    results: SearchResults,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResults {
    /// Required key; `null` reads the same as an empty page.
    #[serde(deserialize_with = "Option::deserialize")]
    main_listings: Option<Vec<RawListing>>,
}

/// Price shapes the search query asks for, keyed by `__typename`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "__typename")]
pub enum Price {
    StandardAmountPrice { amount: Option<f64> },
    AutosDealerAmountPrice { amount: Option<f64> },
    AmountPrice { amount: Option<f64> },
    /// Any price type without an amount (contact seller, swap, ...)
    #[serde(other)]
    Unpriced,
}

impl Price {
    pub fn amount(&self) -> Option<f64> {
        match self {
            Price::StandardAmountPrice { amount }
            | Price::AutosDealerAmountPrice { amount }
            | Price::AmountPrice { amount } => *amount,
            Price::Unpriced => None,
        }
    }
}

/// A listing exactly as the search page returns it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawListing {
    #[serde(deserialize_with = "de_id")]
    pub id: i64,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_urls: Option<Vec<String>>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub location: Option<RawLocation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLocation {
    #[serde(default)]
    pub name: Option<String>,
}

impl RawListing {
    pub fn normalize(self) -> Listing {
        Listing {
            id: self.id,
            title: self.title,
            url: self.url,
            description: self.description,
            image_urls: self.image_urls.unwrap_or_default(),
            price: self.price.as_ref().and_then(Price::amount),
            location: self.location.and_then(|l| l.name),
        }
    }
}

/// Offset-paginated search. Stops at the first empty page.
#[derive(Debug, Clone)]
pub struct ListingScraper {
    page_size: u32,
}

impl Default for ListingScraper {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingScraper {
    pub fn new() -> Self {
        Self {
            page_size: PAGE_SIZE,
        }
    }

    /// Fetch every page for `criteria`, in increasing offset order, over one transport.
    ///
    /// Any failure aborts the whole call; pages already fetched are discarded.
    pub fn fetch(
        &self,
        transport: &dyn QueryTransport,
        criteria: &SearchCriteria,
    ) -> Result<Vec<Listing>, ScrapeError> {
        let mut listings = Vec::new();
        let mut offset = 0u32;

        loop {
            let page = self.fetch_page(transport, criteria, offset)?;
            log::debug!(
                "{:?}: offset {offset} returned {} listings",
                criteria.keywords,
                page.len()
            );

            if page.is_empty() {
                break;
            }

            listings.extend(page.into_iter().map(RawListing::normalize));
            offset += self.page_size;
        }

        log::info!(
            "{:?} near {:?}: {} listings",
            criteria.keywords,
            criteria.address,
            listings.len()
        );

        Ok(listings)
    }

    fn fetch_page(
        &self,
        transport: &dyn QueryTransport,
        criteria: &SearchCriteria,
        offset: u32,
    ) -> Result<Vec<RawListing>, ScrapeError> {
        let variables = Variables {
            by: By {
                query: Query {
                    one_listing_per_user: true,
                    category_id: criteria.category_id,
                    location: Location::from_criteria(criteria),
                    keywords: &criteria.keywords,
                },
            },
            pagination: Pagination {
                offset,
                limit: self.page_size,
            },
        };

        let data: SearchData = execute(transport, OPERATION, QUERY, variables)?
            .ok_or(ScrapeError::MissingData {
                operation: OPERATION,
            })?;

        Ok(data
            .search_results_page
            .results
            .main_listings
            .unwrap_or_default())
    }
}
