//! In-memory data sources used as route handlers
//!
//! Documents, folders, archives, process instances and transaction logs are
//! all kept as schemaless collections; each listing route reads one
//! collection.

pub mod collection;
pub mod filter;
pub mod store;

pub use collection::CollectionHandler;
pub use filter::CompiledCondition;
pub use store::{Collection, CollectionStats, MemoryStore, StoreError};

use std::sync::Arc;

use crate::query::{ConfigError, PeeQL, Router, Schema, SchemaEntry};

/// Default `(route, collection)` pairs
pub const DEFAULT_ROUTES: &[(&str, &str)] = &[
    ("listDocuments", "documents"),
    ("listFolders", "folders"),
    ("listArchives", "archives"),
    ("listProcesses", "processes"),
    ("listTransactionLogs", "transaction_logs"),
];

/// Register `route` as a paged listing over `collection`
pub fn register_collection_route(
    router: &mut Router,
    schema: &mut Schema,
    store: &Arc<MemoryStore>,
    route: &str,
    collection: &str,
    max_limit: Option<usize>,
) -> Result<(), ConfigError> {
    let store = Arc::clone(store);
    let collection = collection.to_string();
    router.add_route(route, move || {
        if collection.trim().is_empty() {
            return Err(format!("invalid collection name '{}'", collection));
        }
        let handler = CollectionHandler::new(store, collection);
        Ok(match max_limit {
            Some(max) => handler.with_max_limit(max),
            None => handler,
        })
    })?;
    schema.add_entry(route, SchemaEntry::paged());
    Ok(())
}

/// Router + schema for [`DEFAULT_ROUTES`], checked for consistency
pub fn default_engine(store: Arc<MemoryStore>, max_limit: Option<usize>) -> Result<PeeQL, ConfigError> {
    let mut router = Router::new();
    let mut schema = Schema::new();

    for (route, collection) in DEFAULT_ROUTES {
        register_collection_route(&mut router, &mut schema, &store, route, collection, max_limit)?;
    }

    let engine = PeeQL::new().with_router(router).with_schema(schema);
    engine.check_consistency()?;
    tracing::info!("Registered {} query routes", DEFAULT_ROUTES.len());
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded_engine() -> PeeQL {
        let store = Arc::new(MemoryStore::new());
        store
            .load_seed_str(
                &json!({
                    "documents": [
                        {"id": 1, "title": "Contract", "folder": 7, "created_at": "2024-01-05T09:00:00Z"},
                        {"id": 2, "title": "Invoice March", "folder": 7, "created_at": "2024-03-02T12:30:00Z"},
                        {"id": 3, "title": "Invoice April", "folder": 8, "created_at": "2024-04-01T08:00:00Z"}
                    ],
                    "folders": [{"id": 7, "name": "Finance"}]
                })
                .to_string(),
            )
            .unwrap();
        default_engine(store, Some(100)).unwrap()
    }

    #[test]
    fn test_default_routes_registered() {
        let engine = seeded_engine();
        let mut expected: Vec<String> = DEFAULT_ROUTES.iter().map(|(r, _)| r.to_string()).collect();
        expected.sort();
        assert_eq!(engine.route_names(), expected);
    }

    #[test]
    fn test_documents_query() {
        let engine = seeded_engine();
        let out = engine
            .execute(
                r#"{"route":"listDocuments","data":{
                    "conditions":[
                        {"column":"title","value":"Invoice%","type":"LIKE"},
                        {"column":"created_at","value":"2024-03-15T00:00:00Z","type":"<"}
                    ],
                    "properties":["id","title"]
                }}"#,
            )
            .unwrap();
        assert_eq!(out, r#"{"data":[{"id":2,"title":"Invoice March"}]}"#);
    }

    #[test]
    fn test_empty_collection_route() {
        let engine = seeded_engine();
        let out = engine.execute(r#"{"route":"listProcesses"}"#).unwrap();
        assert_eq!(out, r#"{"data":[]}"#);
    }

    #[test]
    fn test_schema_rejects_unknown_argument() {
        let engine = seeded_engine();
        let out = engine
            .execute(r#"{"route":"listFolders","data":{"sort":"name"}}"#)
            .unwrap();
        assert_eq!(
            out,
            r#"{"error":1,"errorMessage":"Invalid query data: 'sort': unknown field"}"#
        );
    }

    #[test]
    fn test_blank_collection_name_fails_registration() {
        let store = Arc::new(MemoryStore::new());
        let mut router = Router::new();
        let mut schema = Schema::new();
        let err = register_collection_route(&mut router, &mut schema, &store, "listBlank", " ", None).unwrap_err();
        assert!(matches!(err, ConfigError::Route(ref e) if e.is_configuration()));
        assert!(router.is_empty());
        assert!(schema.is_empty());
    }
}
