//! Control-plane handlers: snapshot listing and coordinator health.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use shardgrid_state::{ScalingMode, SnapshotMap};

/// Shared state for the coordinator surface.
#[derive(Clone)]
pub struct ControlState {
    pub snapshots: Arc<SnapshotMap>,
    pub mode: ScalingMode,
    pub monitoring_interval_secs: u64,
}

/// Build the control-plane router.
pub fn control_router(state: ControlState) -> Router {
    Router::new()
        .route("/shards", get(list_shards))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// GET /shards — latest metric snapshot per shard, sorted by id.
async fn list_shards(State(state): State<ControlState>) -> Response {
    Json(state.snapshots.sorted()).into_response()
}

/// GET /health — coordinator liveness, strategy, and cadence.
async fn handle_health(State(state): State<ControlState>) -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "coordinator",
        "strategy": state.mode,
        "monitoring_interval": state.monitoring_interval_secs,
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use shardgrid_state::{HealthState, MetricSnapshot};
    use std::collections::HashMap;

    fn test_state() -> ControlState {
        ControlState {
            snapshots: Arc::new(SnapshotMap::new()),
            mode: ScalingMode::Hot,
            monitoring_interval_secs: 10,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn shards_endpoint_returns_sorted_snapshots() {
        let state = test_state();
        let mut map = HashMap::new();
        for id in ["shard-2", "shard-1"] {
            let mut snap = MetricSnapshot::unhealthy(id, 5);
            snap.status = HealthState::Healthy;
            snap.total_entries = 7;
            map.insert(id.to_string(), snap);
        }
        state.snapshots.publish(map);

        let response = list_shards(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;

        let array = body.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["shard_id"], "shard-1");
        assert_eq!(array[1]["shard_id"], "shard-2");
        assert_eq!(array[0]["total_entries"], 7);
        assert_eq!(array[0]["status"], "healthy");
    }

    #[tokio::test]
    async fn shards_endpoint_is_empty_before_first_tick() {
        let response = list_shards(State(test_state())).await;
        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn health_reports_strategy_and_interval() {
        let response = handle_health(State(test_state())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "coordinator");
        assert_eq!(body["strategy"], "hot");
        assert_eq!(body["monitoring_interval"], 10);
    }
}
