//! Scheduled batch endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use fr_protocol::BatchRun;

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartBatchBody {
    #[serde(flatten)]
    pub run: BatchRun,
    /// Client that receives progress events.
    #[serde(default)]
    pub client_id: Option<String>,
}

pub async fn batch_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "running": state.orchestrator.batch_running() }))
}

pub async fn start_batch(
    State(state): State<AppState>,
    Json(body): Json<StartBatchBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.start_batch(body.run, body.client_id)?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "running": true }))))
}

pub async fn stop_batch(State(state): State<AppState>) -> impl IntoResponse {
    let stopped = state.orchestrator.stop_batch();
    Json(serde_json::json!({ "stopped": stopped }))
}
