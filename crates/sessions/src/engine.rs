//! Seam between session orchestration and the FIX engine.
//!
//! The engine owns framing, sequencing, and transport.  It calls back into
//! an [`EngineListener`] from its own threads; every callback is one
//! variant of the closed [`EngineEvent`] set.

use std::path::PathBuf;
use std::sync::Arc;

use fr_domain::error::Result;
use fr_protocol::FixMessage;

use crate::session_key::WireSessionId;

/// Everything the engine needs to run one initiator session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub session: WireSessionId,
    pub host: String,
    pub port: u16,
    pub heartbeat_secs: u32,
    pub reconnect_secs: u32,
    pub start_time: String,
    pub end_time: String,
    pub use_data_dictionary: bool,
    pub data_dictionary: String,
    pub validate_user_defined_fields: bool,
    pub file_store_path: PathBuf,
    pub file_log_path: PathBuf,
    pub tls: Option<TlsSettings>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub keystore_path: PathBuf,
    pub password: Option<String>,
}

impl std::fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSettings")
            .field("keystore_path", &self.keystore_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Opaque handle to a running engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineHandle {
    id: u64,
    session: WireSessionId,
}

impl EngineHandle {
    pub fn new(id: u64, session: WireSessionId) -> Self {
        Self { id, session }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn session(&self) -> &WireSessionId {
        &self.session
    }
}

/// Engine callbacks.  Outbound variants carry the message mutably so the
/// listener can stamp fields before it goes on the wire.
#[derive(Debug)]
pub enum EngineEvent<'a> {
    Create,
    Logon,
    Logout,
    BeforeAdminSend(&'a mut FixMessage),
    AdminReceived(&'a FixMessage),
    BeforeAppSend(&'a mut FixMessage),
    AppReceived(&'a FixMessage),
}

impl EngineEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Logon => "logon",
            Self::Logout => "logout",
            Self::BeforeAdminSend(_) => "before_admin_send",
            Self::AdminReceived(_) => "admin_received",
            Self::BeforeAppSend(_) => "before_app_send",
            Self::AppReceived(_) => "app_received",
        }
    }
}

pub trait EngineListener: Send + Sync {
    fn on_event(&self, session: &WireSessionId, event: EngineEvent<'_>);
}

/// Start/stop/send primitives of a FIX engine.
///
/// Calls may block briefly on engine I/O.
pub trait SessionEngine: Send + Sync {
    /// Start an initiator.  The engine delivers callbacks for the session to
    /// `listener` until it is stopped.  Bad settings fail with
    /// `ConfigInvalid`.
    fn start(&self, config: &EngineConfig, listener: Arc<dyn EngineListener>) -> Result<EngineHandle>;

    fn stop(&self, handle: &EngineHandle, forced: bool);

    fn exists(&self, session: &WireSessionId) -> bool;

    /// `Ok(false)` when the session exists but is not logged on.  Unknown
    /// sessions fail with `SessionNotFound`.
    fn send(&self, message: FixMessage, session: &WireSessionId) -> Result<bool>;

    fn set_next_outbound_seq(&self, session: &WireSessionId, seq: u64);
}
