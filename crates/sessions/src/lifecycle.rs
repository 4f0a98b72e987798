//! Session lifecycle: start, stop, and ownership of engine sessions.
//!
//! The manager also runs the recovery worker, which executes deferred stops
//! requested by the event handler after a rejected logon.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use fr_domain::config::{Config, ConfigLookup, CredentialsConfig, EngineDefaults};
use fr_domain::error::{Error, Result};
use fr_domain::trace::TraceEvent;
use fr_protocol::SessionStatus;

use crate::credentials::CredentialCache;
use crate::engine::SessionEngine;
use crate::handler::{DeferredStop, ProtocolEventHandler};
use crate::session_key::{SessionKey, WireSessionId};
use crate::settings::build_engine_config;
use crate::sink::EventSink;
use crate::store::{ActiveSession, Reservation, SessionRegistry, SessionSummary};

/// Static settings the manager applies to every session.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub engine: EngineDefaults,
    pub credentials: CredentialsConfig,
    pub stop_delay: Duration,
}

impl LifecycleConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            engine: config.engine.clone(),
            credentials: config.credentials.clone(),
            stop_delay: Duration::from_millis(config.recovery.stop_delay_ms),
        }
    }
}

pub struct SessionLifecycleManager {
    engine: Arc<dyn SessionEngine>,
    lookup: Arc<dyn ConfigLookup>,
    registry: Arc<SessionRegistry>,
    handler: Arc<ProtocolEventHandler>,
    config: LifecycleConfig,
    cancel: CancellationToken,
}

impl SessionLifecycleManager {
    /// Build the manager and its event handler, and spawn the recovery
    /// worker.  Must be called inside a tokio runtime.
    pub fn new(
        engine: Arc<dyn SessionEngine>,
        lookup: Arc<dyn ConfigLookup>,
        credentials: Arc<CredentialCache>,
        sink: Arc<dyn EventSink>,
        config: LifecycleConfig,
    ) -> Result<Arc<Self>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SessionRegistry::new());
        let handler = Arc::new(ProtocolEventHandler::new(
            credentials,
            registry.clone(),
            engine.clone(),
            sink,
            tx,
            config.stop_delay,
        )?);

        let manager = Arc::new(Self {
            engine,
            lookup,
            registry,
            handler,
            config,
            cancel: CancellationToken::new(),
        });
        spawn_recovery_worker(Arc::downgrade(&manager), rx, manager.cancel.clone());
        Ok(manager)
    }

    pub fn wire_id(&self, sender: &str, target: &str) -> WireSessionId {
        WireSessionId::new(&self.config.engine.begin_string, sender, target)
    }

    pub fn handler(&self) -> &Arc<ProtocolEventHandler> {
        &self.handler
    }

    pub fn engine(&self) -> &Arc<dyn SessionEngine> {
        &self.engine
    }

    /// Start a session for `key`, owned by `client_id` when given.
    ///
    /// Returns `Ok(false)` when this exact key is already running.  A second
    /// environment for the same sender/target fails with `AlreadyStarting`.
    /// Failures leave no entry behind.
    pub fn start(&self, key: SessionKey, client_id: Option<&str>) -> Result<bool> {
        let wire_id = WireSessionId::from_key(&self.config.engine.begin_string, &key);

        match self.registry.reserve(&key, &wire_id) {
            Reservation::Reserved => {}
            Reservation::AlreadyActive => {
                tracing::debug!(session = %key, "session already active");
                return Ok(false);
            }
            Reservation::Conflict { environment } => {
                return Err(Error::AlreadyStarting {
                    session: wire_id.to_string(),
                    environment: environment.unwrap_or_else(|| "pending".into()),
                });
            }
        }

        let started = build_engine_config(
            self.lookup.as_ref(),
            &self.config.engine,
            &self.config.credentials,
            &key,
        )
        .and_then(|cfg| self.engine.start(&cfg, self.handler.clone()));

        let handle = match started {
            Ok(handle) => handle,
            Err(e) => {
                self.registry.release(&wire_id);
                tracing::warn!(session = %key, error = %e, "session start failed");
                return Err(e);
            }
        };

        self.registry.commit(ActiveSession {
            key: key.clone(),
            wire_id: wire_id.clone(),
            handle,
            owner: client_id.map(str::to_owned),
            started_at: Utc::now(),
        });
        self.handler.announce(&wire_id);

        tracing::info!(session = %key, client_id = ?client_id, "session started");
        TraceEvent::SessionStarted {
            sender: key.sender,
            target: key.target,
            environment: key.env,
            client_id: client_id.map(str::to_owned),
        }
        .emit();
        Ok(true)
    }

    /// Returns whether a session was running.  The pair cannot be started
    /// again until the engine session is torn down.
    pub fn stop(&self, key: &SessionKey) -> bool {
        match self.registry.remove(key) {
            Some(session) => {
                self.shutdown_session(session, "stopped");
                true
            }
            None => false,
        }
    }

    pub fn stop_all_owned_by(&self, client_id: &str) -> usize {
        let sessions = self.registry.take_owned_by(client_id);
        let count = sessions.len();
        for session in sessions {
            self.shutdown_session(session, "client disconnected");
        }
        count
    }

    pub fn stop_all_matching(&self, sender: &str, target: &str) -> usize {
        let sessions = self.registry.take_matching(sender, target);
        let count = sessions.len();
        for session in sessions {
            self.shutdown_session(session, "logon rejected");
        }
        count
    }

    pub fn status(&self, key: &SessionKey) -> SessionStatus {
        if !self.registry.contains(key) {
            return SessionStatus::Disconnected;
        }
        self.handler
            .status(&WireSessionId::from_key(&self.config.engine.begin_string, key))
    }

    pub fn owner_of(&self, wire_id: &WireSessionId) -> Option<String> {
        self.registry.owner_of(wire_id)
    }

    pub fn owned_keys(&self, client_id: &str) -> Vec<SessionKey> {
        self.registry.owned_keys(client_id)
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        self.registry.list()
    }

    /// Cancel pending recovery and stop every session.
    pub fn shutdown(&self) -> usize {
        self.cancel.cancel();
        let sessions = self.registry.drain();
        let count = sessions.len();
        for session in sessions {
            self.shutdown_session(session, "shutdown");
        }
        count
    }

    fn shutdown_session(&self, session: ActiveSession, reason: &str) {
        self.engine.stop(&session.handle, true);
        self.handler.forget(&session.wire_id);
        self.registry.finish_stop(&session.wire_id);
        tracing::info!(session = %session.key, reason, "session stopped");
        TraceEvent::SessionStopped {
            sender: session.key.sender,
            target: session.key.target,
            environment: session.key.env,
            reason: reason.to_owned(),
        }
        .emit();
    }
}

fn spawn_recovery_worker(
    manager: Weak<SessionLifecycleManager>,
    mut rx: mpsc::UnboundedReceiver<DeferredStop>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let request = tokio::select! {
                _ = cancel.cancelled() => break,
                req = rx.recv() => match req {
                    Some(req) => req,
                    None => break,
                },
            };

            let manager = manager.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(request.delay) => {
                        if let Some(manager) = manager.upgrade() {
                            let stopped = manager.stop_all_matching(&request.sender, &request.target);
                            tracing::info!(
                                sender = %request.sender,
                                target = %request.target,
                                stopped,
                                "stopped sessions after logon rejection"
                            );
                        }
                    }
                }
            });
        }
        tracing::debug!("recovery worker stopped");
    });
}
