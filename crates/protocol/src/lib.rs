//! fixrelay protocol: FIX message model, operator-text sanitizer, and the
//! WebSocket envelope exchanged with interactive clients.
//!
//! Clients drive sessions and batches over the socket; the gateway streams
//! back inbound FIX traffic, batch progress, and status changes.

pub mod message;
pub mod sanitize;

pub use message::{FixMessage, MessageError, SOH};
pub use sanitize::sanitize;

use fr_domain::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// Engine-level status of one FIX session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connected,
    /// Logout arrived before any successful logon.  Sticky until the next
    /// logon.
    LogonRejected,
}

/// A set of message templates to send from one initiator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRun {
    pub sender_comp_id: String,
    #[serde(default = "d_repeat_count")]
    pub repeat_count: u32,
    #[serde(default)]
    pub interval_ms: u64,
    pub messages: Vec<String>,
}

fn d_repeat_count() -> u32 {
    1
}

impl BatchRun {
    /// Scheduled dispatch only makes sense for repeated, spaced sends.
    pub fn is_scheduled(&self) -> bool {
        self.repeat_count > 1 && self.interval_ms > 0
    }
}

/// Client → gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    #[serde(rename = "start_session")]
    StartSession {
        sender: String,
        target: String,
        env: String,
    },

    #[serde(rename = "stop_session")]
    StopSession {
        sender: String,
        target: String,
        env: String,
    },

    /// Sends once, or schedules a batch when the run repeats with spacing.
    #[serde(rename = "send_messages")]
    SendMessages {
        #[serde(flatten)]
        run: BatchRun,
    },

    #[serde(rename = "stop_batch")]
    StopBatch,

    #[serde(rename = "status")]
    Status {
        sender: String,
        target: String,
        env: String,
    },
}

/// Gateway → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// First frame on every connection.
    #[serde(rename = "welcome")]
    Welcome { client_id: String },

    /// Inbound application message, pipe-delimited.
    #[serde(rename = "fix_message")]
    FixMessage { text: String },

    #[serde(rename = "batch_progress")]
    BatchProgress { label: String },

    #[serde(rename = "session_status")]
    SessionStatus {
        sender: String,
        target: String,
        env: String,
        status: SessionStatus,
    },

    #[serde(rename = "error")]
    Error {
        kind: ErrorKind,
        title: String,
        detail: String,
    },
}

impl ClientEvent {
    /// Label carried by progress events, `iteration` being 1-based.
    pub fn batch_progress(iteration: u32) -> Self {
        Self::BatchProgress {
            label: format!("Sent batch {iteration}"),
        }
    }

    pub fn from_error(err: &fr_domain::error::Error) -> Self {
        let kind = err.kind();
        Self::Error {
            kind,
            title: kind.title().to_owned(),
            detail: err.to_string(),
        }
    }
}
