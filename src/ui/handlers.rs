//! HTTP API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::dmx::UniverseTiming;
use crate::engine::{IngestState, IngestStatsSnapshot};
use crate::ui::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// System status
#[derive(serde::Serialize)]
pub struct SystemStatus {
    pub state: IngestState,
    pub universes: u16,
    pub stride: usize,
    pub channels: usize,
    pub generation: u64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub uptime_seconds: i64,
}

/// Raw channel buffer contents
#[derive(serde::Serialize)]
pub struct ChannelsView {
    pub generation: u64,
    pub values: Vec<u8>,
}

/// Get system status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let engine = &state.engine;
    let layout = engine.layout();
    let started_at = engine.started_at();

    let status = SystemStatus {
        state: engine.ingest_state(),
        universes: layout.universes,
        stride: layout.stride,
        channels: layout.capacity(),
        generation: engine.buffer().generation(),
        started_at,
        uptime_seconds: (chrono::Utc::now() - started_at).num_seconds(),
    };

    Json(ApiResponse::ok(status))
}

/// Per-universe timing
pub async fn get_universes(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<UniverseTiming>>> {
    Json(ApiResponse::ok(state.engine.timing().snapshot()))
}

/// Inter-arrival deltas of active universes in milliseconds
pub async fn get_deltas(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<(u16, f64)>>> {
    Json(ApiResponse::ok(state.engine.timing().snapshot_deltas_ms()))
}

/// Whole channel buffer
pub async fn get_channels(State(state): State<Arc<AppState>>) -> Json<ApiResponse<ChannelsView>> {
    let buffer = state.engine.buffer();
    let mut values = vec![0u8; buffer.capacity()];
    let generation = buffer.snapshot_into(&mut values);

    Json(ApiResponse::ok(ChannelsView { generation, values }))
}

/// Channels of a single universe
pub async fn get_universe_channels(
    State(state): State<Arc<AppState>>,
    Path(universe): Path<u16>,
) -> (StatusCode, Json<ApiResponse<Vec<u8>>>) {
    match state.engine.buffer().universe(universe) {
        Some(values) => (StatusCode::OK, Json(ApiResponse::ok(values))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Universe {} not configured", universe))),
        ),
    }
}

/// Ingestion counters
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<ApiResponse<IngestStatsSnapshot>> {
    Json(ApiResponse::ok(state.engine.stats().snapshot()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OverrunPolicy, UniverseLayout};
    use crate::engine::Engine;
    use crate::protocol::build_artdmx;

    fn state() -> Arc<AppState> {
        let engine = Arc::new(Engine::new(UniverseLayout::standard(), OverrunPolicy::Truncate));
        Arc::new(AppState { engine })
    }

    #[tokio::test]
    async fn test_status_reports_layout() {
        let state = state();
        let Json(response) = get_status(State(state)).await;
        let status = response.data.unwrap();

        assert_eq!(status.universes, 3);
        assert_eq!(status.stride, 520);
        assert_eq!(status.channels, 1560);
        assert_eq!(status.state, IngestState::Starting);
    }

    #[tokio::test]
    async fn test_deltas_after_first_packet() {
        let state = state();
        state.engine.process_datagram(&build_artdmx(1, 0, &[1; 512]));

        let Json(response) = get_deltas(State(state.clone())).await;
        assert_eq!(response.data.unwrap(), vec![(1, 0.0)]);

        let Json(response) = get_stats(State(state)).await;
        assert_eq!(response.data.unwrap().packets_applied, 1);
    }

    #[tokio::test]
    async fn test_universe_channels() {
        let state = state();
        state.engine.process_datagram(&build_artdmx(2, 0, &[3; 512]));

        let (status, Json(response)) = get_universe_channels(State(state.clone()), Path(2)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.data.unwrap(), vec![3; 512]);

        let (status, Json(response)) = get_universe_channels(State(state), Path(9)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!response.success);
    }

    #[tokio::test]
    async fn test_universes_json_shape() {
        let state = state();
        state.engine.process_datagram(&build_artdmx(0, 0, &[1; 8]));

        let Json(response) = get_universes(State(state)).await;
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["success"], true);
        assert!(value.get("error").is_none());
        assert_eq!(value["data"].as_array().unwrap().len(), 3);
        assert_eq!(value["data"][0]["active"], true);
        assert_eq!(value["data"][1]["since_last_ms"], serde_json::Value::Null);
    }
}
