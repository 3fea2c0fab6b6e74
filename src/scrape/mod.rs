//! Marketplace GraphQL queries.
//!
//! Location lookups and search pages go through a [`QueryTransport`], normally a
//! headless browser page (see `headless`). The SEO-url lookup is a plain HTTP call.

#[cfg(feature = "headless")]
pub mod headless;
pub mod location;
pub mod search;
pub mod seo;

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("browser error: {0}")]
    Browser(String),

    #[error("reqwest error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{operation}: graphql errors: {messages}")]
    Graphql {
        operation: &'static str,
        messages: String,
    },

    #[error("{operation}: response does not match schema: {source}")]
    Schema {
        operation: &'static str,
        source: serde_json::Error,
    },

    #[error("{operation}: response has no data")]
    MissingData { operation: &'static str },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Capability to POST a JSON document to the marketplace query endpoint and
/// get the JSON response back.
pub trait QueryTransport {
    fn post_json(&self, payload: &Value) -> Result<Value, ScrapeError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphqlRequest<'a, V> {
    operation_name: &'a str,
    variables: V,
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorEntry {
    #[serde(default)]
    message: String,
}

/// Build the request envelope for `operation`.
pub(crate) fn graphql_payload<V: Serialize>(
    operation: &str,
    query: &str,
    variables: V,
) -> Result<Value, ScrapeError> {
    Ok(serde_json::to_value(GraphqlRequest {
        operation_name: operation,
        variables,
        query,
    })?)
}

/// Decode the `data` member of a GraphQL response into `T`.
///
/// `Ok(None)` when there is neither data nor an error list.
pub(crate) fn decode_response<T: DeserializeOwned>(
    operation: &'static str,
    value: Value,
) -> Result<Option<T>, ScrapeError> {
    let resp: GraphqlResponse<T> =
        serde_json::from_value(value).map_err(|source| ScrapeError::Schema { operation, source })?;

    let messages = resp
        .errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    match resp.data {
        Some(data) => {
            if !messages.is_empty() {
                log::warn!("{operation}: partial response with errors: {messages}");
            }
            Ok(Some(data))
        }
        None if !messages.is_empty() => Err(ScrapeError::Graphql {
            operation,
            messages,
        }),
        None => Ok(None),
    }
}

/// Issue one GraphQL operation over `transport`.
pub(crate) fn execute<V: Serialize, T: DeserializeOwned>(
    transport: &dyn QueryTransport,
    operation: &'static str,
    query: &str,
    variables: V,
) -> Result<Option<T>, ScrapeError> {
    let payload = graphql_payload(operation, query, variables)?;
    let value = transport.post_json(&payload)?;
    decode_response(operation, value)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Num(i64),
    Str(String),
}

impl IdRepr {
    fn into_id<E: serde::de::Error>(self) -> Result<i64, E> {
        match self {
            IdRepr::Num(n) => Ok(n),
            IdRepr::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("id {s:?} is not an integer"))),
        }
    }
}

/// Marketplace ids arrive either as JSON numbers or as numeric strings.
pub(crate) fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    IdRepr::deserialize(d)?.into_id()
}

pub(crate) fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Option::<IdRepr>::deserialize(d)?
        .map(IdRepr::into_id)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Echo {
        #[serde(deserialize_with = "de_id")]
        id: i64,
    }

    #[test]
    fn payload_has_operation_variables_and_query() {
        let payload = graphql_payload("Op", "query Op { x }", json!({ "a": 1 })).unwrap();
        assert_eq!(
            payload,
            json!({ "operationName": "Op", "variables": { "a": 1 }, "query": "query Op { x }" })
        );
    }

    #[test]
    fn decode_accepts_numeric_and_string_ids() {
        let a: Echo = decode_response("Op", json!({ "data": { "id": 42 } }))
            .unwrap()
            .unwrap();
        let b: Echo = decode_response("Op", json!({ "data": { "id": "1712345678" } }))
            .unwrap()
            .unwrap();
        assert_eq!(a.id, 42);
        assert_eq!(b.id, 1712345678);
    }

    #[test]
    fn decode_rejects_non_numeric_id() {
        let result = decode_response::<Echo>("Op", json!({ "data": { "id": "abc" } }));
        assert!(matches!(result, Err(ScrapeError::Schema { operation: "Op", .. })));
    }

    #[test]
    fn errors_without_data_are_typed() {
        let result = decode_response::<Echo>(
            "Op",
            json!({ "data": null, "errors": [{ "message": "bad input" }, { "message": "again" }] }),
        );
        match result {
            Err(ScrapeError::Graphql { messages, .. }) => assert_eq!(messages, "bad input; again"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn no_data_and_no_errors_is_none() {
        let result = decode_response::<Echo>("Op", json!({})).unwrap();
        assert!(result.is_none());
    }
}
