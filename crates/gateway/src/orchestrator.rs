//! The operations transport adapters call: session start/stop/status,
//! message dispatch, and client disconnect handling.

use std::sync::Arc;

use fr_domain::error::{Error, Result};
use fr_protocol::{BatchRun, SessionStatus};
use fr_sessions::{SessionKey, SessionLifecycleManager, SessionSummary};

use crate::runtime::BatchDispatcher;

/// Result of [`Orchestrator::submit_messages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A repeating run was scheduled in the background.
    Scheduled,
    /// Messages were sent immediately.
    Sent(u32),
}

pub struct Orchestrator {
    sessions: Arc<SessionLifecycleManager>,
    batch: Arc<BatchDispatcher>,
}

impl Orchestrator {
    pub fn new(sessions: Arc<SessionLifecycleManager>, batch: Arc<BatchDispatcher>) -> Self {
        Self { sessions, batch }
    }

    pub fn sessions(&self) -> &Arc<SessionLifecycleManager> {
        &self.sessions
    }

    /// Returns `false` when the session was already running.
    pub fn start_session(&self, key: SessionKey, client_id: Option<&str>) -> Result<bool> {
        validate_key(&key)?;
        self.sessions.start(key, client_id)
    }

    pub fn stop_session(&self, key: &SessionKey) -> bool {
        self.sessions.stop(key)
    }

    pub fn status(&self, key: &SessionKey) -> SessionStatus {
        self.sessions.status(key)
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.sessions.list()
    }

    pub fn start_batch(&self, run: BatchRun, client_id: Option<String>) -> Result<()> {
        validate_run(&run)?;
        if self.batch.start_batch(run, client_id) {
            Ok(())
        } else {
            Err(Error::BatchAlreadyRunning)
        }
    }

    pub fn send_once(&self, run: &BatchRun, client_id: Option<&str>) -> Result<u32> {
        validate_run(run)?;
        self.batch.send_once(run, client_id)
    }

    /// Schedule `run` when it repeats with spacing, otherwise send it once.
    pub fn submit_messages(&self, run: BatchRun, client_id: Option<&str>) -> Result<Submission> {
        if run.is_scheduled() {
            self.start_batch(run, client_id.map(str::to_owned))?;
            Ok(Submission::Scheduled)
        } else {
            self.send_once(&run, client_id).map(Submission::Sent)
        }
    }

    pub fn stop_batch(&self) -> bool {
        self.batch.stop()
    }

    pub fn batch_running(&self) -> bool {
        self.batch.is_running()
    }

    /// Stop every session the client owns.  A batch it started keeps
    /// running.
    pub fn on_client_disconnect(&self, client_id: &str) -> usize {
        let stopped = self.sessions.stop_all_owned_by(client_id);
        if stopped > 0 {
            tracing::info!(client_id, stopped, "stopped sessions of disconnected client");
        }
        stopped
    }

    /// Stop the batch, pending recovery, and every session.
    pub fn shutdown(&self) -> usize {
        self.batch.stop();
        self.sessions.shutdown()
    }
}

fn validate_key(key: &SessionKey) -> Result<()> {
    for (field, value) in [("sender", &key.sender), ("target", &key.target), ("env", &key.env)] {
        if value.trim().is_empty() {
            return Err(Error::ConfigInvalid(format!("{field} must not be empty")));
        }
    }
    Ok(())
}

fn validate_run(run: &BatchRun) -> Result<()> {
    if run.sender_comp_id.trim().is_empty() {
        return Err(Error::InvalidMessage("sender_comp_id must not be empty".into()));
    }
    if run.messages.is_empty() {
        return Err(Error::InvalidMessage("no messages to send".into()));
    }
    Ok(())
}
