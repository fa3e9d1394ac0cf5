//! Data-plane handlers: analyze, place, execute.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use shardgrid_analyzer::{analyze, AnalyzeError};
use shardgrid_placement::{PlacementError, PlacementRing};
use shardgrid_pool::{PoolError, RowMap, ShardPool};
use shardgrid_state::ShardRegistry;

/// Shared state for the query router.
#[derive(Clone)]
pub struct QueryState {
    /// Table → shard-key column.
    pub shard_keys: Arc<HashMap<String, String>>,
    pub ring: Arc<PlacementRing>,
    pub pool: Arc<ShardPool>,
    pub registry: Arc<ShardRegistry>,
}

/// Build the data-plane router.
pub fn query_router(state: QueryState) -> Router {
    Router::new()
        .route("/query", post(handle_query))
        .route("/health", get(handle_health))
        .with_state(state)
}

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    query: String,
}

#[derive(Serialize, Default)]
struct QueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Vec<RowMap>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shard: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shards: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(QueryResponse {
            error: Some(message.into()),
            ..QueryResponse::default()
        }),
    )
        .into_response()
}

/// POST /query — route a statement to one shard or scatter-gather it.
async fn handle_query(
    State(state): State<QueryState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "invalid JSON request");
    };
    if request.query.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "query cannot be empty");
    }

    info!(query = %request.query, "received query");

    let analysis = match analyze(&request.query, &state.shard_keys) {
        Ok(analysis) => analysis,
        Err(e @ (AnalyzeError::Parse(_) | AnalyzeError::UnsupportedStatement(_))) => {
            warn!(error = %e, "query analysis failed");
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    if let Some(shard_key) = analysis.shard_key {
        route_single(&state, &request.query, &shard_key).await
    } else {
        scatter_gather(&state, &request.query).await
    }
}

/// Point routing: the shard is whatever the ring says for this key, at
/// this moment.
async fn route_single(state: &QueryState, sql: &str, shard_key: &str) -> Response {
    let target = match state.ring.lookup(shard_key) {
        Ok(target) => target,
        Err(e @ PlacementError::NoShardsAvailable) => {
            warn!("routed query with no shards available");
            return error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
        }
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    info!(shard = %target, key = %shard_key, "routing query to single shard");

    match state.pool.exec(sql, &target).await {
        Ok(rows) => {
            info!(shard = %target, rows = rows.len(), "query executed");
            Json(QueryResponse {
                data: Some(rows),
                shard: Some(target),
                ..QueryResponse::default()
            })
            .into_response()
        }
        Err(e) => {
            warn!(shard = %target, error = %e, "query execution failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Scatter-gather: fan out to every pool and union the rows.
async fn scatter_gather(state: &QueryState, sql: &str) -> Response {
    info!("performing scatter-gather query across all shards");

    match state.pool.exec_all(sql).await {
        Ok(outcome) => {
            info!(
                shards = outcome.shards.len(),
                rows = outcome.rows.len(),
                "scatter-gather executed"
            );
            Json(QueryResponse {
                data: Some(outcome.rows),
                shards: Some(outcome.shards),
                ..QueryResponse::default()
            })
            .into_response()
        }
        Err(e) => {
            warn!(error = %e, "scatter-gather failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /health — router liveness and the active shard set.
async fn handle_health(State(state): State<QueryState>) -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "query-router",
        "shards": state.registry.active_ids(),
    }))
    .into_response()
}
