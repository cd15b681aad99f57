//! PeeQL: Embedded Declarative Query Engine
//!
//! Answers JSON query documents of the form
//! `{"route": "<name>", "data": {...}}` by validating `data` against the
//! route's registered schema, dispatching to the route's handler and wrapping
//! the outcome in a canonical envelope:
//!
//! - success: `{"data": [...]}`
//! - failure: `{"error": 1, "errorMessage": "..."}`
//!
//! # Features
//!
//! - **Schema Validation**: typed arguments (limit, offset, conditions,
//!   properties, ...) checked before any handler runs
//! - **Router**: named handlers, registered directly or through a factory
//! - **Conditions**: ordered filter predicates handed to handlers
//! - **Error Split**: setup mistakes are `Err`, bad queries are envelopes
//! - **Result Cache**: optional TTL cache of success envelopes
//! - **HTTP API**: axum server with in-memory document collections
//!
//! # Example
//!
//! ```no_run
//! use peeql::query::{HandlerError, PeeQL, QueryArguments, Router, Row, Schema, SchemaEntry};
//! use std::sync::Arc;
//!
//! let handler = |args: &QueryArguments| -> Result<Vec<Row>, HandlerError> {
//!     let mut row = Row::new();
//!     row.insert("limit".into(), args.limit().unwrap_or(0).into());
//!     Ok(vec![row])
//! };
//!
//! let engine = PeeQL::new()
//!     .with_router(Router::new().with_route("listFoo", Arc::new(handler)))
//!     .with_schema(Schema::new().with_entry("listFoo", SchemaEntry::paged()));
//!
//! let out = engine.execute(r#"{"route":"listFoo","data":{"limit":5}}"#).unwrap();
//! assert_eq!(out, r#"{"data":[{"limit":5}]}"#);
//! ```

pub mod api;
pub mod query;
pub mod source;

// Re-export commonly used types
pub use query::{ConfigError, PeeQL, QueryResult, ResultEnvelope, Router, Schema, SchemaEntry};
pub use source::{default_engine, MemoryStore};
