//! PeeQL Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - PEEQL_HOST: Bind address (default: 0.0.0.0)
//! - PEEQL_PORT: Port number (default: 8080)
//! - PEEQL_QUERY_TIMEOUT_MS: Per-query time bound, 0 = unbounded (default: 5000)
//! - PEEQL_CACHE_ENTRIES: Result cache capacity, 0 = disabled (default: 0)
//! - PEEQL_CACHE_TTL_SECS: Result cache TTL (default: 30)
//! - PEEQL_MAX_LIMIT: Largest row count per listing query (default: unlimited)
//! - PEEQL_SEED_FILE: JSON file of `{"collection": [rows...]}` loaded at startup
//! - RUST_LOG: Log level (default: info)

use peeql::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "peeql=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    tracing::info!("PeeQL configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    match config.query_timeout() {
        Some(timeout) => tracing::info!("  Query timeout: {} ms", timeout.as_millis()),
        None => tracing::info!("  Query timeout: DISABLED"),
    }
    if config.cache_entries > 0 {
        tracing::info!(
            "  Result cache: {} entries, {} s TTL",
            config.cache_entries,
            config.cache_ttl_secs
        );
    } else {
        tracing::info!("  Result cache: DISABLED");
    }
    if let Some(max) = config.max_limit {
        tracing::info!("  Max rows per query: {}", max);
    }
    if let Some(seed) = &config.seed_file {
        tracing::info!("  Seed file: {}", seed.display());
    }

    println!(
        r#"
  ____            ___  _
 |  _ \ ___  ___ / _ \| |
 | |_) / _ \/ _ \ | | | |
 |  __/  __/  __/ |_| | |___
 |_|   \___|\___|\__\_\_____|

 Declarative JSON Query Engine
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
