//! Session lifecycle endpoints.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use fr_sessions::SessionKey;

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionBody {
    pub sender: String,
    pub target: String,
    pub env: String,
    /// Connected WebSocket client that should receive this session's
    /// inbound traffic.
    #[serde(default)]
    pub client_id: Option<String>,
}

impl SessionBody {
    fn key(&self) -> SessionKey {
        SessionKey::new(self.sender.as_str(), self.target.as_str(), self.env.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub sender: String,
    pub target: String,
    pub env: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.orchestrator.list_sessions();
    let count = sessions.len();
    Json(serde_json::json!({ "sessions": sessions, "count": count }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/start
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<SessionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let key = body.key();
    let started = state
        .orchestrator
        .start_session(key.clone(), body.client_id.as_deref())?;
    Ok(Json(serde_json::json!({
        "started": started,
        "status": state.orchestrator.status(&key),
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/sessions/stop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn stop_session(
    State(state): State<AppState>,
    Json(body): Json<SessionBody>,
) -> impl IntoResponse {
    let stopped = state.orchestrator.stop_session(&body.key());
    Json(serde_json::json!({ "stopped": stopped }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions/status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn session_status(
    State(state): State<AppState>,
    Query(q): Query<SessionQuery>,
) -> impl IntoResponse {
    let key = SessionKey::new(q.sender.as_str(), q.target.as_str(), q.env.as_str());
    Json(serde_json::json!({
        "sender": key.sender,
        "target": key.target,
        "env": key.env,
        "status": state.orchestrator.status(&key),
    }))
}
