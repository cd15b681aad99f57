use axum::{
    routing::{get, post},
    Router,
};
use chrono::Utc;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{health_check, ingest, list_routes, query, stats, AppState};
use crate::query::QueryCache;
use crate::source::{default_engine, MemoryStore};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 0 disables the bound
    pub query_timeout_ms: u64,
    /// 0 disables the result cache
    pub cache_entries: u64,
    pub cache_ttl_secs: u64,
    /// Largest row count a single listing query may return
    pub max_limit: Option<usize>,
    pub seed_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            query_timeout_ms: 5000,
            cache_entries: 0,
            cache_ttl_secs: 30,
            max_limit: None,
            seed_file: None,
        }
    }
}

impl ServerConfig {
    /// Read configuration from environment variables
    /// PEEQL_HOST=0.0.0.0
    /// PEEQL_PORT=8080
    /// PEEQL_QUERY_TIMEOUT_MS=5000
    /// PEEQL_CACHE_ENTRIES=0
    /// PEEQL_CACHE_TTL_SECS=30
    /// PEEQL_MAX_LIMIT=1000
    /// PEEQL_SEED_FILE=/path/to/seed.json
    pub fn from_env() -> Self {
        let defaults = Self::default();

        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
        }

        Self {
            host: std::env::var("PEEQL_HOST").unwrap_or(defaults.host),
            port: parsed("PEEQL_PORT").unwrap_or(defaults.port),
            query_timeout_ms: parsed("PEEQL_QUERY_TIMEOUT_MS").unwrap_or(defaults.query_timeout_ms),
            cache_entries: parsed("PEEQL_CACHE_ENTRIES").unwrap_or(defaults.cache_entries),
            cache_ttl_secs: parsed("PEEQL_CACHE_TTL_SECS").unwrap_or(defaults.cache_ttl_secs),
            max_limit: parsed("PEEQL_MAX_LIMIT").or(defaults.max_limit),
            seed_file: std::env::var("PEEQL_SEED_FILE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_ms > 0).then(|| Duration::from_millis(self.query_timeout_ms))
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/peeql", post(query))
        .route("/ingest", post(ingest))
        .route("/routes", get(list_routes))
        .route("/stats", get(stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Store, engine and state for `config`. Any error here is a setup error.
pub fn build_state(config: &ServerConfig) -> Result<Arc<AppState>, Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    if let Some(path) = &config.seed_file {
        store.load_seed(path)?;
    }

    let mut engine = default_engine(Arc::clone(&store), config.max_limit)?;
    if config.cache_entries > 0 {
        tracing::info!(
            "Result cache enabled: {} entries, {}s TTL",
            config.cache_entries,
            config.cache_ttl_secs
        );
        engine = engine.with_cache(QueryCache::with_config(
            config.cache_entries,
            Duration::from_secs(config.cache_ttl_secs),
        ));
    }

    Ok(Arc::new(AppState {
        engine: Arc::new(engine),
        store,
        query_timeout: config.query_timeout(),
        started_at: Utc::now(),
    }))
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(&config)?;
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting PeeQL server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("PeeQL server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
