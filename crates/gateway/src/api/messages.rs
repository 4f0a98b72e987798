//! One-shot message send.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use fr_domain::error::Error;
use fr_protocol::{sanitize, BatchRun, FixMessage};

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    /// Pipe- or SOH-delimited FIX text.  SenderCompID (49) and
    /// TargetCompID (56) select the session.
    pub message: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

pub async fn send_message(
    State(state): State<AppState>,
    Json(body): Json<SendMessageBody>,
) -> Result<impl IntoResponse, ApiError> {
    let parsed = FixMessage::parse(&sanitize(&body.message))
        .map_err(|e| Error::InvalidMessage(e.to_string()))?;
    let sender = parsed
        .sender_comp_id()
        .ok_or_else(|| Error::InvalidMessage("missing SenderCompID (49)".into()))?
        .to_owned();

    let run = BatchRun {
        sender_comp_id: sender,
        repeat_count: 1,
        interval_ms: 0,
        messages: vec![body.message],
    };
    let sent = state
        .orchestrator
        .send_once(&run, body.client_id.as_deref())?;
    Ok(Json(serde_json::json!({ "sent": sent })))
}
