use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::search::{Location, Pagination, PAGE_SIZE};
use super::{decode_response, graphql_payload, ScrapeError};
use crate::listings::SearchCriteria;

const OPERATION: &str = "GetSeoUrl";

const QUERY: &str = r#"
query GetSeoUrl($input: SearchUrlInput!) {
    searchUrl(input: $input)
}
"#;

/// The one marketplace call with an explicit deadline.
pub const SEO_URL_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36";

#[derive(Debug, Serialize)]
struct Variables<'a> {
    input: Input<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Input<'a> {
    search_query: SearchQuery<'a>,
    pagination: Pagination,
}

#[derive(Debug, Serialize)]
struct SearchQuery<'a> {
    keywords: &'a str,
    location: Location<'a>,
    view: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeoData {
    #[serde(default)]
    search_url: Option<String>,
}

/// Resolves the human-facing search page url for a set of criteria.
///
/// Goes over plain HTTP rather than the browser.
pub struct SeoUrlResolver {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl SeoUrlResolver {
    pub fn new(endpoint: &str) -> Result<Self, ScrapeError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(SEO_URL_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn lookup(&self, criteria: &SearchCriteria) -> Result<String, ScrapeError> {
        let payload = graphql_payload(
            OPERATION,
            QUERY,
            Variables {
                input: Input {
                    search_query: SearchQuery {
                        keywords: &criteria.keywords,
                        location: Location::from_criteria(criteria),
                        view: "LIST",
                    },
                    pagination: Pagination {
                        offset: 0,
                        limit: PAGE_SIZE,
                    },
                },
            },
        )?;

        let value: serde_json::Value = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&payload)
            .send()?
            .json()?;

        decode_response::<SeoData>(OPERATION, value)?
            .and_then(|d| d.search_url)
            .ok_or_else(|| {
                ScrapeError::NotFound(format!(
                    "no SEO url for keywords={:?}, location_id={:?}",
                    criteria.keywords, criteria.location_id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::http::serve_once;

    fn criteria() -> SearchCriteria {
        SearchCriteria {
            keywords: "skis".into(),
            category_id: 10,
            location_id: Some(1700203),
            latitude: 53.5,
            longitude: -113.5,
            radius: 50.0,
            address: "Edmonton".into(),
        }
    }

    #[test]
    fn returns_search_url() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"data": {"searchUrl": "https://www.kijiji.ca/b-edmonton/skis/k0l1700203"}}"#,
        );

        let seo = SeoUrlResolver::new(&url).unwrap().lookup(&criteria()).unwrap();
        assert_eq!(seo, "https://www.kijiji.ca/b-edmonton/skis/k0l1700203");

        let request = server.join().unwrap();
        assert!(request.contains(r#""operationName":"GetSeoUrl""#));
        assert!(request.contains(r#""view":"LIST""#));
        assert!(request.contains(r#""pagination":{"limit":40,"offset":0}"#)
            || request.contains(r#""pagination":{"offset":0,"limit":40}"#));
    }

    #[test]
    fn missing_url_is_not_found() {
        let (url, server) = serve_once("200 OK", r#"{"data": {"searchUrl": null}}"#);

        let result = SeoUrlResolver::new(&url).unwrap().lookup(&criteria());
        assert!(matches!(result, Err(ScrapeError::NotFound(_))));
        server.join().unwrap();
    }
}
