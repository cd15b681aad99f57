pub mod cache;
pub mod condition;
pub mod handler;
pub mod parser;
pub mod result;
pub mod router;
pub mod schema;

pub use cache::{CacheKey, CacheStats, QueryCache};
pub use condition::{ComparisonType, ConvertedCondition, QueryCondition, QueryConditionList};
pub use handler::{HandlerError, QueryHandler, Row};
pub use parser::{parse, QueryDocument, RequestError};
pub use result::{QueryResult, ResultEnvelope};
pub use router::{Router, RouterError};
pub use schema::{
    ArgValue, FieldKind, FieldSpec, FieldViolation, QueryArguments, Schema, SchemaEntry,
    SchemaError,
};

/// The query engine: a schema and a router, plus an optional result cache.
///
/// Configure once, then share (e.g. behind an `Arc`) and call
/// [`PeeQL::execute`] from any number of threads.
#[derive(Default)]
pub struct PeeQL {
    router: Option<Router>,
    schema: Option<Schema>,
    cache: Option<QueryCache>,
}

impl PeeQL {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn router(&self) -> Option<&Router> {
        self.router.as_ref()
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn cache(&self) -> Option<&QueryCache> {
        self.cache.as_ref()
    }

    fn configured(&self) -> Result<(&Router, &Schema), ConfigError> {
        let router = self.router.as_ref().ok_or(ConfigError::MissingRouter)?;
        let schema = self.schema.as_ref().ok_or(ConfigError::MissingSchema)?;
        Ok((router, schema))
    }

    /// Run a raw query document and return the serialized envelope.
    ///
    /// `Err` only for a misconfigured engine; bad queries produce an error
    /// envelope inside `Ok`.
    pub fn execute(&self, raw: &str) -> Result<String, ConfigError> {
        let (router, schema) = self.configured()?;

        let Some(cache) = &self.cache else {
            return Ok(parse(router, schema, raw).to_json_string());
        };

        let key = QueryDocument::from_json(raw).ok().map(|doc| CacheKey::new(&doc));
        if let Some(envelope) = key.as_ref().and_then(|k| cache.get(k)) {
            tracing::debug!("Serving query from cache");
            return Ok(envelope);
        }

        // Taken before the handler runs, so rows read ahead of an
        // invalidation are never stored after it
        let generation = cache.generation();
        let result = parse(router, schema, raw);
        let envelope = result.to_json_string();
        if let (Some(key), false) = (key, result.is_error()) {
            if !cache.put_if_current(key, envelope.clone(), generation) {
                tracing::debug!("Cache invalidated while query ran; result not cached");
            }
        }
        Ok(envelope)
    }

    /// Like [`PeeQL::execute`] but returns the structured result. Bypasses the cache.
    pub fn execute_result(&self, raw: &str) -> Result<QueryResult, ConfigError> {
        let (router, schema) = self.configured()?;
        Ok(parse(router, schema, raw))
    }

    /// Verify that schema and router name exactly the same routes.
    ///
    /// Not enforced by `execute`: a name present in only one registry fails
    /// per request with "Route not found".
    pub fn check_consistency(&self) -> Result<(), ConfigError> {
        let (router, schema) = self.configured()?;

        let missing_handlers: Vec<String> = schema
            .names()
            .into_iter()
            .filter(|name| !router.contains(name))
            .collect();
        let missing_schemas: Vec<String> = router
            .names()
            .into_iter()
            .filter(|name| !schema.contains(name))
            .collect();

        if missing_handlers.is_empty() && missing_schemas.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Inconsistent {
                missing_handlers,
                missing_schemas,
            })
        }
    }

    /// Routes that are fully configured (present in both registries)
    pub fn route_names(&self) -> Vec<String> {
        match self.configured() {
            Ok((router, schema)) => schema
                .names()
                .into_iter()
                .filter(|name| router.contains(name))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Drop cached envelopes for `route`, if caching is on
    pub fn invalidate_route(&self, route: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate_route(route);
        }
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }
}

/// Engine setup mistakes. Fatal; never rendered into an envelope.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No router configured")]
    MissingRouter,

    #[error("No schema configured")]
    MissingSchema,

    #[error(
        "Schema and router disagree: no handler for {missing_handlers:?}, no schema for {missing_schemas:?}"
    )]
    Inconsistent {
        missing_handlers: Vec<String>,
        missing_schemas: Vec<String>,
    },

    #[error(transparent)]
    Route(#[from] RouterError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_handler(calls: Arc<AtomicUsize>) -> Arc<dyn QueryHandler> {
        Arc::new(move |args: &QueryArguments| -> Result<Vec<Row>, HandlerError> {
            calls.fetch_add(1, Ordering::SeqCst);
            let mut row = Row::new();
            row.insert("limit".into(), args.limit().unwrap_or(0).into());
            Ok(vec![row])
        })
    }

    fn engine(calls: Arc<AtomicUsize>) -> PeeQL {
        PeeQL::new()
            .with_router(Router::new().with_route("listFoo", counting_handler(calls)))
            .with_schema(Schema::new().with_entry("listFoo", SchemaEntry::paged()))
    }

    #[test]
    fn test_missing_configuration() {
        assert!(matches!(
            PeeQL::new().execute("{}"),
            Err(ConfigError::MissingRouter)
        ));
        assert!(matches!(
            PeeQL::new().with_router(Router::new()).execute("{}"),
            Err(ConfigError::MissingSchema)
        ));
    }

    #[test]
    fn test_request_errors_stay_in_envelope() {
        let engine = engine(Arc::new(AtomicUsize::new(0)));
        let out = engine.execute("not valid json").unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["error"], 1);
        assert!(value.get("data").is_none());

        let out = engine.execute(r#"{"route":"doesNotExist","data":{}}"#).unwrap();
        assert!(out.contains("Route not found"));
    }

    #[test]
    fn test_execute_is_repeatable() {
        let engine = engine(Arc::new(AtomicUsize::new(0)));
        let raw = r#"{"route":"listFoo","data":{"limit":3}}"#;
        let first = engine.execute(raw).unwrap();
        assert_eq!(first, r#"{"data":[{"limit":3}]}"#);
        assert_eq!(first, engine.execute(raw).unwrap());
    }

    #[test]
    fn test_cache_skips_handler_on_hit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = engine(calls.clone()).with_cache(QueryCache::new());

        let a = engine.execute(r#"{"route":"listFoo","data":{"limit":3,"offset":0}}"#).unwrap();
        let b = engine.execute(r#"{"data":{"offset":0,"limit":3},"route":"listFoo"}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        engine.invalidate_route("listFoo");
        engine.execute(r#"{"route":"listFoo","data":{"limit":3,"offset":0}}"#).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_errors_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let failing = {
            let calls = calls.clone();
            move |_: &QueryArguments| -> Result<Vec<Row>, HandlerError> {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError::new("backend unavailable"))
            }
        };
        let engine = PeeQL::new()
            .with_router(Router::new().with_route("listFoo", Arc::new(failing)))
            .with_schema(Schema::new().with_entry("listFoo", SchemaEntry::paged()))
            .with_cache(QueryCache::new());

        let raw = r#"{"route":"listFoo","data":{"limit":2}}"#;
        let first = engine.execute(raw).unwrap();
        let second = engine.execute(raw).unwrap();

        assert!(first.contains("backend unavailable"));
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let key = CacheKey::new(&QueryDocument::from_json(raw).unwrap());
        assert!(engine.cache().unwrap().get(&key).is_none());
    }

    #[test]
    fn test_invalidation_during_query_discards_result() {
        use std::sync::atomic::{AtomicBool, AtomicU64};
        use std::sync::Barrier;

        let version = Arc::new(AtomicU64::new(1));
        let hold = Arc::new(AtomicBool::new(true));
        let read = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let handler = {
            let (version, hold) = (version.clone(), hold.clone());
            let (read, release) = (read.clone(), release.clone());
            move |_: &QueryArguments| -> Result<Vec<Row>, HandlerError> {
                let seen = version.load(Ordering::SeqCst);
                if hold.load(Ordering::SeqCst) {
                    read.wait();
                    release.wait();
                }
                let mut row = Row::new();
                row.insert("version".into(), seen.into());
                Ok(vec![row])
            }
        };
        let engine = Arc::new(
            PeeQL::new()
                .with_router(Router::new().with_route("listFoo", Arc::new(handler)))
                .with_schema(Schema::new().with_entry("listFoo", SchemaEntry::paged()))
                .with_cache(QueryCache::new()),
        );

        let raw = r#"{"route":"listFoo","data":{}}"#;
        let worker = {
            let engine = engine.clone();
            std::thread::spawn(move || engine.execute(raw).unwrap())
        };

        // The worker has read version 1; update the data and invalidate
        read.wait();
        version.store(2, Ordering::SeqCst);
        hold.store(false, Ordering::SeqCst);
        engine.clear_cache();
        release.wait();

        assert_eq!(worker.join().unwrap(), r#"{"data":[{"version":1}]}"#);
        assert_eq!(engine.execute(raw).unwrap(), r#"{"data":[{"version":2}]}"#);
    }

    #[test]
    fn test_consistency_check() {
        let calls = Arc::new(AtomicUsize::new(0));
        assert!(engine(calls.clone()).check_consistency().is_ok());

        let engine = PeeQL::new()
            .with_router(
                Router::new()
                    .with_route("listFoo", counting_handler(calls.clone()))
                    .with_route("routerOnly", counting_handler(calls)),
            )
            .with_schema(
                Schema::new()
                    .with_entry("listFoo", SchemaEntry::paged())
                    .with_entry("schemaOnly", SchemaEntry::paged()),
            );

        match engine.check_consistency() {
            Err(ConfigError::Inconsistent {
                missing_handlers,
                missing_schemas,
            }) => {
                assert_eq!(missing_handlers, vec!["schemaOnly"]);
                assert_eq!(missing_schemas, vec!["routerOnly"]);
            }
            other => panic!("Expected inconsistency, got {:?}", other),
        }
        assert_eq!(engine.route_names(), vec!["listFoo"]);
    }
}
