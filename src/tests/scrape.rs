use serde_json::json;

use super::fakes::{FakeMarketplace, ScriptedTransport};
use crate::listings::SearchCriteria;
use crate::scrape::{search::ListingScraper, ScrapeError};

fn criteria(location_id: Option<i64>) -> SearchCriteria {
    SearchCriteria {
        keywords: "skis".into(),
        category_id: 10,
        location_id,
        latitude: 53.5461245,
        longitude: -113.4938229,
        radius: 50.0,
        address: "Edmonton".into(),
    }
}

fn page(ids: &[i64]) -> serde_json::Value {
    let listings: Vec<_> = ids
        .iter()
        .map(|id| json!({ "id": id, "title": "t", "url": "/v", "description": "d" }))
        .collect();
    json!({ "data": { "searchResultsPage": { "results": { "mainListings": listings } } } })
}

#[test]
fn stops_at_first_empty_page() {
    let market = FakeMarketplace::new(vec![40, 40, 15, 0, 40]);

    let listings = ListingScraper::new()
        .fetch(&market, &criteria(Some(1)))
        .unwrap();

    assert_eq!(listings.len(), 95);
    assert_eq!(market.search_offsets(), vec![0, 40, 80, 120]);

    // offset order is preserved
    let ids: Vec<i64> = listings.iter().map(|l| l.id).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn empty_first_page_is_one_request() {
    let market = FakeMarketplace::new(vec![]);
    let listings = ListingScraper::new()
        .fetch(&market, &criteria(Some(1)))
        .unwrap();

    assert!(listings.is_empty());
    assert_eq!(market.search_offsets(), vec![0]);
}

#[test]
fn null_main_listings_ends_pagination() {
    let transport = ScriptedTransport::new(vec![
        page(&[1, 2]),
        json!({ "data": { "searchResultsPage": { "results": { "mainListings": null } } } }),
    ]);

    let listings = ListingScraper::new()
        .fetch(&transport, &criteria(Some(1)))
        .unwrap();
    assert_eq!(listings.len(), 2);
    assert_eq!(transport.requests().len(), 2);
}

#[test]
fn missing_main_listings_key_is_fatal() {
    let transport = ScriptedTransport::new(vec![
        page(&[1, 2]),
        json!({ "data": { "searchResultsPage": { "results": {} } } }),
    ]);

    let result = ListingScraper::new().fetch(&transport, &criteria(Some(1)));
    assert!(matches!(
        result,
        Err(ScrapeError::Schema {
            operation: "SearchResultsPage",
            ..
        })
    ));
}

#[test]
fn sends_criteria_and_pagination() {
    let transport = ScriptedTransport::new(vec![page(&[])]);
    ListingScraper::new()
        .fetch(&transport, &criteria(None))
        .unwrap();

    let sent = &transport.requests()[0];
    assert_eq!(sent["operationName"], "SearchResultsPage");

    let query = &sent["variables"]["by"]["query"];
    assert_eq!(query["oneListingPerUser"], true);
    assert_eq!(query["categoryId"], 10);
    assert_eq!(query["keywords"], "skis");
    assert!(query["location"]["id"].is_null());
    assert_eq!(query["location"]["area"]["radius"], 50.0);
    assert_eq!(query["location"]["area"]["address"], "Edmonton");

    assert_eq!(sent["variables"]["pagination"], json!({ "offset": 0, "limit": 40 }));
}

#[test]
fn missing_data_is_fatal() {
    let transport = ScriptedTransport::new(vec![page(&[1]), json!({})]);
    let result = ListingScraper::new().fetch(&transport, &criteria(Some(1)));
    assert!(matches!(
        result,
        Err(ScrapeError::MissingData {
            operation: "SearchResultsPage"
        })
    ));
}

#[test]
fn malformed_page_is_a_schema_error() {
    let transport = ScriptedTransport::new(vec![json!({
        "data": { "searchResultsPage": { "results": { "mainListings": [{ "title": "no id" }] } } }
    })]);
    let result = ListingScraper::new().fetch(&transport, &criteria(Some(1)));
    assert!(matches!(result, Err(ScrapeError::Schema { .. })));
}

#[test]
fn transport_failure_mid_pagination_is_fatal() {
    // second page has no scripted response
    let transport = ScriptedTransport::new(vec![page(&[1, 2, 3])]);
    let result = ListingScraper::new().fetch(&transport, &criteria(Some(1)));
    assert!(matches!(result, Err(ScrapeError::Browser(_))));
}
