use serde::Serialize;

/// Structured lifecycle events emitted across all fixrelay crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionStarted {
        sender: String,
        target: String,
        environment: String,
        client_id: Option<String>,
    },
    SessionStopped {
        sender: String,
        target: String,
        environment: String,
        reason: String,
    },
    LogonRejected {
        session: String,
        reason: String,
    },
    SequenceReset {
        session: String,
        next_outbound: u64,
    },
    CredentialLoaded {
        sender: String,
        kind: String,
    },
    BatchStarted {
        sender: String,
        repeat_count: u32,
        interval_ms: u64,
        templates: usize,
    },
    BatchFinished {
        sender: String,
        sent: u64,
        failed: u64,
        cancelled: bool,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "fr_event");
    }
}
