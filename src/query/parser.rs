//! Query document interpreter
//!
//! Turns a raw JSON query document into a [`QueryResult`]:
//!
//! 1. decode the document (`{"route": "...", "data": {...}}`)
//! 2. look up the route's schema entry and validate `data` into typed arguments
//! 3. resolve the handler through the [`Router`]
//! 4. run the handler and wrap its rows (or its error) in the envelope
//!
//! Every failure here is a request error and ends up in the error envelope.

use std::time::Instant;

use serde_json::Value as JsonValue;

use super::handler::{HandlerError, Row};
use super::result::{QueryResult, ResultEnvelope};
use super::router::{Router, RouterError};
use super::schema::{json_type_name, Schema, SchemaError};

/// Decoded, not yet validated, query document
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDocument {
    pub route: String,
    pub data: serde_json::Map<String, JsonValue>,
}

impl QueryDocument {
    /// Decode a raw document. Keys other than `route` and `data` are ignored.
    pub fn from_json(raw: &str) -> Result<Self, RequestError> {
        let value: JsonValue =
            serde_json::from_str(raw).map_err(|e| RequestError::MalformedQuery(e.to_string()))?;

        let kind = json_type_name(&value);
        let JsonValue::Object(mut doc) = value else {
            return Err(RequestError::NotAnObject(kind));
        };

        let route = match doc.remove("route") {
            None | Some(JsonValue::Null) => return Err(RequestError::MissingRoute),
            Some(JsonValue::String(s)) if s.trim().is_empty() => {
                return Err(RequestError::MissingRoute)
            }
            Some(JsonValue::String(s)) => s,
            Some(other) => return Err(RequestError::InvalidRoute(json_type_name(&other))),
        };

        let data = match doc.remove("data") {
            None | Some(JsonValue::Null) => serde_json::Map::new(),
            Some(JsonValue::Object(data)) => data,
            Some(other) => return Err(RequestError::InvalidData(json_type_name(&other))),
        };

        Ok(Self { route, data })
    }
}

/// Interpret `raw` against `schema` and `router`.
///
/// Never fails: request errors come back as an error envelope.
pub fn parse(router: &Router, schema: &Schema, raw: &str) -> QueryResult {
    let start = Instant::now();
    let mut result = QueryResult::new();

    match run(router, schema, raw) {
        Ok(rows) => {
            tracing::debug!(
                rows = rows.len(),
                elapsed_us = start.elapsed().as_micros() as u64,
                "Query succeeded"
            );
            result.set_result_data(rows);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Query rejected");
            result.set_error(e.to_string());
        }
    }

    result
}

fn run(router: &Router, schema: &Schema, raw: &str) -> Result<Vec<Row>, RequestError> {
    let doc = QueryDocument::from_json(raw)?;
    tracing::debug!(route = %doc.route, "Dispatching query");

    let entry = schema.get(&doc.route).map_err(|e| match e {
        SchemaError::NotFound(name) => RequestError::UnknownRoute(name),
        other => RequestError::Schema(other),
    })?;
    let args = entry.validate(&doc.data)?;

    let handler = router.route(&doc.route)?;
    let rows = handler.execute(&args)?;

    Ok(rows)
}

/// A query that could not be answered. Always rendered, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Malformed query: expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("No route specified")]
    MissingRoute,

    #[error("Route must be a string, got {0}")]
    InvalidRoute(&'static str),

    #[error("Query data must be an object, got {0}")]
    InvalidData(&'static str),

    #[error("Route not found: {0}")]
    UnknownRoute(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}
