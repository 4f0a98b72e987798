pub mod batch;
pub mod messages;
pub mod sessions;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use fr_domain::error::{Error, ErrorKind};

use crate::state::AppState;

/// Build the full API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health))
        // Sessions
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/sessions/start", post(sessions::start_session))
        .route("/v1/sessions/stop", post(sessions::stop_session))
        .route("/v1/sessions/status", get(sessions::session_status))
        // Batches
        .route("/v1/batch", get(batch::batch_state))
        .route("/v1/batch/start", post(batch::start_batch))
        .route("/v1/batch/stop", post(batch::stop_batch))
        // One-shot sends
        .route("/v1/messages/send", post(messages::send_message))
        // Interactive clients
        .route("/v1/clients", get(list_clients))
        .route("/v1/ws", get(crate::clients::ws::ws_handler))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "sessions": state.orchestrator.list_sessions().len(),
        "clients": state.clients.len(),
        "batch_running": state.orchestrator.batch_running(),
    }))
}

async fn list_clients(State(state): State<AppState>) -> impl IntoResponse {
    let clients = state.clients.list();
    let count = clients.len();
    Json(serde_json::json!({ "clients": clients, "count": count }))
}

/// Domain error rendered as `{ "error", "kind" }` with a status derived
/// from its kind.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ConfigInvalid | ErrorKind::LogonRequired | ErrorKind::InvalidMessage => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::AlreadyStarting | ErrorKind::BatchAlreadyRunning => StatusCode::CONFLICT,
        ErrorKind::SessionNotFound => StatusCode::NOT_FOUND,
        ErrorKind::SignatureUnavailable | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string(), "kind": kind })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_stable_statuses() {
        assert_eq!(status_for(ErrorKind::ConfigInvalid), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::LogonRequired), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::InvalidMessage), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::AlreadyStarting), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::BatchAlreadyRunning), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::SessionNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
