use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::query::{CacheStats, FieldSpec, PeeQL, QueryResult, ResultEnvelope, Row};
use crate::source::{CollectionStats, MemoryStore};

/// Application state shared across handlers
pub struct AppState {
    pub engine: Arc<PeeQL>,
    pub store: Arc<MemoryStore>,
    /// Upper bound on a single query; `None` waits indefinitely
    pub query_timeout: Option<Duration>,
    pub started_at: DateTime<Utc>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Query
// ============================================================================

fn envelope_response(envelope: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        envelope,
    )
        .into_response()
}

/// Run the raw request body as a query document.
///
/// Request errors come back as a 200 with the error envelope; only a
/// misconfigured engine or a crashed handler yields a 500.
pub async fn query(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Response, ApiError> {
    let raw = match String::from_utf8(body.to_vec()) {
        Ok(raw) => raw,
        Err(_) => {
            let result = QueryResult::error("Malformed query: body is not valid UTF-8");
            return Ok(envelope_response(result.to_json_string()));
        }
    };

    let engine = Arc::clone(&state.engine);
    let task = tokio::task::spawn_blocking(move || engine.execute(&raw));

    let joined = match state.query_timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            // The blocking task is detached, not cancelled
            Err(_) => {
                tracing::warn!(timeout_ms = limit.as_millis() as u64, "Query timed out");
                let result = QueryResult::error(format!(
                    "Query timed out after {} ms",
                    limit.as_millis()
                ));
                return Ok(envelope_response(result.to_json_string()));
            }
        },
        None => task.await,
    };

    let envelope = joined
        .map_err(|e| ApiError::Internal(format!("Query task failed: {}", e)))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(envelope_response(envelope))
}

// ============================================================================
// Ingest
// ============================================================================

#[derive(Deserialize)]
pub struct IngestRequest {
    pub collection: String,
    pub rows: Vec<Row>,
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub collection: String,
    pub inserted: usize,
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    if request.collection.trim().is_empty() {
        return Err(ApiError::BadRequest("Collection name must not be empty".into()));
    }

    let inserted = state.store.insert_rows(&request.collection, request.rows);
    state.engine.clear_cache();

    Ok(Json(IngestResponse {
        collection: request.collection,
        inserted,
    }))
}

// ============================================================================
// Routes
// ============================================================================

#[derive(Serialize)]
pub struct RoutesResponse {
    pub routes: Vec<RouteInfo>,
}

#[derive(Serialize)]
pub struct RouteInfo {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

pub async fn list_routes(State(state): State<Arc<AppState>>) -> Json<RoutesResponse> {
    let routes = match state.engine.schema() {
        Some(schema) => state
            .engine
            .route_names()
            .into_iter()
            .filter_map(|name| {
                let fields = schema.get(&name).ok()?.fields().to_vec();
                Some(RouteInfo { name, fields })
            })
            .collect(),
        None => Vec::new(),
    };

    Json(RoutesResponse { routes })
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Serialize)]
pub struct StatsResponse {
    pub routes: usize,
    pub total_rows: usize,
    pub collections: Vec<CollectionStats>,
    pub cache: Option<CacheStats>,
    pub uptime_secs: i64,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let collections = state.store.list_collections();
    let total_rows = collections.iter().map(|c| c.row_count).sum();

    Json(StatsResponse {
        routes: state.engine.route_names().len(),
        total_rows,
        collections,
        cache: state.engine.cache().map(|c| c.stats()),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
