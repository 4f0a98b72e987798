//! Engine callback handling: logon certificate injection, outbound signing,
//! inbound routing, and recovery from rejected or out-of-sequence logouts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use regex::Regex;
use tokio::sync::mpsc;

use fr_domain::error::{Error, Result};
use fr_domain::trace::TraceEvent;
use fr_protocol::message::{msg_type, tags};
use fr_protocol::{ClientEvent, FixMessage, SessionStatus};

use crate::credentials::CredentialCache;
use crate::engine::{EngineEvent, EngineListener, SessionEngine};
use crate::session_key::WireSessionId;
use crate::sink::EventSink;
use crate::store::SessionRegistry;

const DEFAULT_LOGOUT_REASON: &str = "No reason provided";
const EXPECTED_SEQ_PATTERN: &str = r"expected \[(\d+)\]";

/// Request to stop every session of a sender/target pair once `delay` has
/// passed.  Executed by the lifecycle manager's recovery worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredStop {
    pub sender: String,
    pub target: String,
    pub delay: Duration,
}

/// What the logout procedure decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// Peer asked for a higher sequence number; the engine was told to use it.
    SequenceReset(u64),
    /// Logout before logon; sessions for the pair will be stopped.
    Rejected,
    /// Ordinary disconnect of a logged-on session.
    Disconnected,
}

pub struct ProtocolEventHandler {
    statuses: RwLock<HashMap<WireSessionId, SessionStatus>>,
    credentials: Arc<CredentialCache>,
    registry: Arc<SessionRegistry>,
    engine: Arc<dyn SessionEngine>,
    sink: Arc<dyn EventSink>,
    recovery: mpsc::UnboundedSender<DeferredStop>,
    stop_delay: Duration,
    expected_seq: Regex,
}

impl ProtocolEventHandler {
    pub fn new(
        credentials: Arc<CredentialCache>,
        registry: Arc<SessionRegistry>,
        engine: Arc<dyn SessionEngine>,
        sink: Arc<dyn EventSink>,
        recovery: mpsc::UnboundedSender<DeferredStop>,
        stop_delay: Duration,
    ) -> Result<Self> {
        let expected_seq = Regex::new(EXPECTED_SEQ_PATTERN)
            .map_err(|e| Error::Other(format!("sequence pattern: {e}")))?;
        Ok(Self {
            statuses: RwLock::new(HashMap::new()),
            credentials,
            registry,
            engine,
            sink,
            recovery,
            stop_delay,
            expected_seq,
        })
    }

    /// Last known status; `Disconnected` for sessions never seen.
    pub fn status(&self, session: &WireSessionId) -> SessionStatus {
        self.statuses
            .read()
            .get(session)
            .copied()
            .unwrap_or_default()
    }

    /// Drop status for a removed session.
    pub fn forget(&self, session: &WireSessionId) {
        self.statuses.write().remove(session);
    }

    /// Push the current status to the session's owner, if any.
    pub fn announce(&self, session: &WireSessionId) {
        self.notify_owner(session, self.status(session));
    }

    fn set_status(&self, session: &WireSessionId, status: SessionStatus) {
        self.statuses.write().insert(session.clone(), status);
        self.notify_owner(session, status);
    }

    fn notify_owner(&self, session: &WireSessionId, status: SessionStatus) {
        let Some(owner) = self.registry.owner_of(session) else {
            return;
        };
        let Some(key) = self.registry.key_for(session) else {
            return;
        };
        self.sink.publish(
            &owner,
            ClientEvent::SessionStatus {
                sender: key.sender,
                target: key.target,
                env: key.env,
                status,
            },
        );
    }

    // ── Callbacks ───────────────────────────────────────────────────

    fn on_create(&self, session: &WireSessionId) {
        self.statuses
            .write()
            .insert(session.clone(), SessionStatus::Disconnected);
        tracing::debug!(session = %session, "engine session created");
    }

    fn on_logon(&self, session: &WireSessionId) {
        tracing::info!(session = %session, "logged on");
        self.set_status(session, SessionStatus::Connected);
    }

    fn on_logout(&self, session: &WireSessionId) {
        if self.status(session) == SessionStatus::LogonRejected {
            tracing::debug!(session = %session, "logout after rejection, keeping status");
            return;
        }
        tracing::info!(session = %session, "logged out");
        self.set_status(session, SessionStatus::Disconnected);
    }

    fn before_admin_send(&self, session: &WireSessionId, msg: &mut FixMessage) {
        if msg.msg_type() != Some(msg_type::LOGON) {
            return;
        }
        match self.credentials.certificate_base64(&session.sender) {
            Some(cert) => msg.set(tags::CERTIFICATE, cert),
            None => tracing::warn!(
                session = %session,
                "no certificate for logon, sending without one"
            ),
        }
    }

    fn on_admin_received(&self, session: &WireSessionId, msg: &FixMessage) {
        if msg.msg_type() != Some(msg_type::LOGOUT) {
            return;
        }
        let reason = msg
            .get(tags::TEXT)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_LOGOUT_REASON);
        self.handle_logout(session, reason);
    }

    fn before_app_send(&self, session: &WireSessionId, msg: &mut FixMessage) {
        let stamp = chrono::Utc::now().format("%Y%m%d-%H:%M:%S%.3f").to_string();
        msg.set(tags::SIGNING_TIMESTAMP, stamp);

        match self
            .credentials
            .sign(msg.to_wire().as_bytes(), &session.sender)
        {
            Ok(signature) => msg.set(tags::SIGNATURE, signature),
            Err(e) => tracing::warn!(
                session = %session,
                error = %e,
                "sending unsigned message"
            ),
        }
    }

    fn on_app_received(&self, session: &WireSessionId, msg: &FixMessage) {
        match self.registry.owner_of(session) {
            Some(owner) => self.sink.publish(
                &owner,
                ClientEvent::FixMessage {
                    text: msg.to_string(),
                },
            ),
            None => tracing::debug!(session = %session, "inbound message has no owner, dropping"),
        }
    }

    // ── Logout procedure ────────────────────────────────────────────

    /// Classify a logout from the peer and act on it.
    pub fn handle_logout(&self, session: &WireSessionId, reason: &str) -> LogoutOutcome {
        if let Some(next) = self.expected_sequence(reason) {
            tracing::warn!(
                session = %session,
                next_outbound = next,
                reason,
                "peer rejected sequence number, resetting"
            );
            self.engine.set_next_outbound_seq(session, next);
            TraceEvent::SequenceReset {
                session: session.to_string(),
                next_outbound: next,
            }
            .emit();
            return LogoutOutcome::SequenceReset(next);
        }

        if self.status(session) == SessionStatus::Connected {
            tracing::info!(session = %session, reason, "peer logged out");
            return LogoutOutcome::Disconnected;
        }

        tracing::warn!(session = %session, reason, "logon rejected");
        self.set_status(session, SessionStatus::LogonRejected);
        TraceEvent::LogonRejected {
            session: session.to_string(),
            reason: reason.to_owned(),
        }
        .emit();

        let request = DeferredStop {
            sender: session.sender.clone(),
            target: session.target.clone(),
            delay: self.stop_delay,
        };
        if self.recovery.send(request).is_err() {
            tracing::warn!(session = %session, "recovery worker gone, rejected session left running");
        }
        LogoutOutcome::Rejected
    }

    fn expected_sequence(&self, reason: &str) -> Option<u64> {
        let lower = reason.to_ascii_lowercase();
        if !(lower.contains("sequence number") && lower.contains("less than the one we expected")) {
            return None;
        }
        self.expected_seq
            .captures(reason)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

impl EngineListener for ProtocolEventHandler {
    fn on_event(&self, session: &WireSessionId, event: EngineEvent<'_>) {
        match event {
            EngineEvent::Create => self.on_create(session),
            EngineEvent::Logon => self.on_logon(session),
            EngineEvent::Logout => self.on_logout(session),
            EngineEvent::BeforeAdminSend(msg) => self.before_admin_send(session, msg),
            EngineEvent::AdminReceived(msg) => self.on_admin_received(session, msg),
            EngineEvent::BeforeAppSend(msg) => self.before_app_send(session, msg),
            EngineEvent::AppReceived(msg) => self.on_app_received(session, msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    use chrono::Utc;
    use fr_domain::config::{EnvironmentCatalog, EnvironmentConfig, InitiatorConfig};
    use parking_lot::Mutex;

    use crate::credentials::{CredentialSource, HmacSigner, PrivateKey};
    use crate::engine::{EngineConfig, EngineHandle};
    use crate::session_key::SessionKey;
    use crate::store::ActiveSession;

    #[derive(Default)]
    struct SeqEngine {
        next_seq: AtomicU64,
    }

    impl SessionEngine for SeqEngine {
        fn start(&self, config: &EngineConfig, _l: Arc<dyn EngineListener>) -> Result<EngineHandle> {
            Ok(EngineHandle::new(1, config.session.clone()))
        }
        fn stop(&self, _handle: &EngineHandle, _forced: bool) {}
        fn exists(&self, _session: &WireSessionId) -> bool {
            true
        }
        fn send(&self, _message: FixMessage, _session: &WireSessionId) -> Result<bool> {
            Ok(true)
        }
        fn set_next_outbound_seq(&self, _session: &WireSessionId, seq: u64) {
            self.next_seq.store(seq, Ordering::SeqCst);
        }
    }

    struct StaticSource(bool);

    impl CredentialSource for StaticSource {
        fn load_certificate(&self, _sender: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.0.then(|| vec![9, 9, 9]))
        }
        fn load_private_key(&self, _sender: &str, _pw: &str) -> Result<Option<PrivateKey>> {
            Ok(self.0.then(|| PrivateKey::new(b"k".to_vec())))
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<(String, ClientEvent)>>);

    impl EventSink for RecordingSink {
        fn publish(&self, client_id: &str, event: ClientEvent) {
            self.0.lock().push((client_id.to_owned(), event));
        }
    }

    struct Fixture {
        handler: ProtocolEventHandler,
        engine: Arc<SeqEngine>,
        sink: Arc<RecordingSink>,
        registry: Arc<SessionRegistry>,
        stops: mpsc::UnboundedReceiver<DeferredStop>,
    }

    fn fixture(with_credentials: bool) -> Fixture {
        let mut envs = BTreeMap::new();
        envs.insert(
            "UAT".to_owned(),
            EnvironmentConfig {
                connection: None,
                initiators: vec![InitiatorConfig {
                    sender_comp_id: "S".into(),
                    keystore_password: Some("pw".into()),
                    enabled: None,
                }],
            },
        );
        let credentials = Arc::new(CredentialCache::new(
            Arc::new(StaticSource(with_credentials)),
            Arc::new(EnvironmentCatalog::from_environments(envs)),
            Arc::new(HmacSigner),
        ));
        let engine = Arc::new(SeqEngine::default());
        let sink = Arc::new(RecordingSink::default());
        let registry = Arc::new(SessionRegistry::new());
        let (tx, stops) = mpsc::unbounded_channel();
        let handler = ProtocolEventHandler::new(
            credentials,
            registry.clone(),
            engine.clone(),
            sink.clone(),
            tx,
            Duration::from_millis(100),
        )
        .unwrap();
        Fixture {
            handler,
            engine,
            sink,
            registry,
            stops,
        }
    }

    fn wire() -> WireSessionId {
        WireSessionId::new("FIX.4.4", "S", "T")
    }

    fn logout(reason: Option<&str>) -> FixMessage {
        let mut msg = FixMessage::new(msg_type::LOGOUT);
        if let Some(r) = reason {
            msg.set(tags::TEXT, r);
        }
        msg
    }

    fn own(registry: &SessionRegistry, client: &str) {
        let key = SessionKey::new("S", "T", "UAT");
        registry.reserve(&key, &wire());
        registry.commit(ActiveSession {
            key,
            wire_id: wire(),
            handle: EngineHandle::new(1, wire()),
            owner: Some(client.to_owned()),
            started_at: Utc::now(),
        });
    }

    #[test]
    fn status_follows_create_logon_logout() {
        let f = fixture(true);
        let id = wire();
        assert_eq!(f.handler.status(&id), SessionStatus::Disconnected);
        f.handler.on_event(&id, EngineEvent::Create);
        f.handler.on_event(&id, EngineEvent::Logon);
        assert_eq!(f.handler.status(&id), SessionStatus::Connected);
        f.handler.on_event(&id, EngineEvent::Logout);
        assert_eq!(f.handler.status(&id), SessionStatus::Disconnected);
    }

    #[test]
    fn rejection_is_sticky_until_logon() {
        let mut f = fixture(true);
        let id = wire();
        f.handler.on_event(&id, EngineEvent::Create);
        f.handler
            .on_event(&id, EngineEvent::AdminReceived(&logout(Some("bad cert"))));
        assert_eq!(f.handler.status(&id), SessionStatus::LogonRejected);

        f.handler.on_event(&id, EngineEvent::Logout);
        f.handler.on_event(&id, EngineEvent::Logout);
        assert_eq!(f.handler.status(&id), SessionStatus::LogonRejected);

        let stop = f.stops.try_recv().unwrap();
        assert_eq!(
            stop,
            DeferredStop {
                sender: "S".into(),
                target: "T".into(),
                delay: Duration::from_millis(100),
            }
        );

        f.handler.on_event(&id, EngineEvent::Logon);
        assert_eq!(f.handler.status(&id), SessionStatus::Connected);
    }

    #[test]
    fn sequence_mismatch_resets_without_stopping() {
        let mut f = fixture(true);
        let id = wire();
        f.handler.on_event(&id, EngineEvent::Create);
        let reason = "MsgSeqNum too low: sequence number (3) is less than the one we expected [42]";
        assert_eq!(
            f.handler.handle_logout(&id, reason),
            LogoutOutcome::SequenceReset(42)
        );
        assert_eq!(f.engine.next_seq.load(Ordering::SeqCst), 42);
        assert!(f.stops.try_recv().is_err());
        assert_eq!(f.handler.status(&id), SessionStatus::Disconnected);
    }

    #[test]
    fn sequence_phrase_without_number_is_a_rejection() {
        let mut f = fixture(true);
        let id = wire();
        let reason = "sequence number is less than the one we expected";
        assert_eq!(f.handler.handle_logout(&id, reason), LogoutOutcome::Rejected);
        assert_eq!(f.engine.next_seq.load(Ordering::SeqCst), 0);
        assert!(f.stops.try_recv().is_ok());
    }

    #[test]
    fn graceful_logout_while_connected_takes_no_action() {
        let mut f = fixture(true);
        let id = wire();
        f.handler.on_event(&id, EngineEvent::Create);
        f.handler.on_event(&id, EngineEvent::Logon);
        f.handler
            .on_event(&id, EngineEvent::AdminReceived(&logout(Some("graceful"))));
        assert_eq!(f.handler.status(&id), SessionStatus::Connected);
        f.handler.on_event(&id, EngineEvent::Logout);
        assert_eq!(f.handler.status(&id), SessionStatus::Disconnected);
        assert!(f.stops.try_recv().is_err());
    }

    #[test]
    fn missing_reason_uses_default_text() {
        let mut f = fixture(true);
        let id = wire();
        f.handler
            .on_event(&id, EngineEvent::AdminReceived(&logout(None)));
        assert_eq!(f.handler.status(&id), SessionStatus::LogonRejected);
        assert!(f.stops.try_recv().is_ok());
    }

    #[test]
    fn logon_carries_certificate() {
        let f = fixture(true);
        let mut logon = FixMessage::new(msg_type::LOGON);
        f.handler
            .on_event(&wire(), EngineEvent::BeforeAdminSend(&mut logon));
        assert_eq!(logon.get(tags::CERTIFICATE), Some("CQkJ"));

        let mut heartbeat = FixMessage::new(msg_type::HEARTBEAT);
        f.handler
            .on_event(&wire(), EngineEvent::BeforeAdminSend(&mut heartbeat));
        assert!(!heartbeat.contains(tags::CERTIFICATE));
    }

    #[test]
    fn logon_without_certificate_still_goes_out() {
        let f = fixture(false);
        let mut logon = FixMessage::new(msg_type::LOGON);
        f.handler
            .on_event(&wire(), EngineEvent::BeforeAdminSend(&mut logon));
        assert!(!logon.contains(tags::CERTIFICATE));
    }

    #[test]
    fn app_messages_are_stamped_and_signed() {
        let f = fixture(true);
        let mut order = FixMessage::new("D");
        f.handler
            .on_event(&wire(), EngineEvent::BeforeAppSend(&mut order));
        assert!(order.contains(tags::SIGNING_TIMESTAMP));
        assert!(order.contains(tags::SIGNATURE));

        let f = fixture(false);
        let mut order = FixMessage::new("D");
        f.handler
            .on_event(&wire(), EngineEvent::BeforeAppSend(&mut order));
        assert!(order.contains(tags::SIGNING_TIMESTAMP));
        assert!(!order.contains(tags::SIGNATURE));
    }

    #[test]
    fn inbound_app_messages_route_to_owner() {
        let f = fixture(true);
        let exec = FixMessage::new("8");
        f.handler.on_event(&wire(), EngineEvent::AppReceived(&exec));
        assert!(f.sink.0.lock().is_empty());

        own(&f.registry, "c1");
        f.handler.on_event(&wire(), EngineEvent::AppReceived(&exec));
        f.handler.on_event(&wire(), EngineEvent::Logon);

        let events = f.sink.0.lock();
        assert_eq!(
            events[0],
            (
                "c1".to_owned(),
                ClientEvent::FixMessage {
                    text: "35=8|".into()
                }
            )
        );
        assert!(matches!(
            &events[1].1,
            ClientEvent::SessionStatus { status: SessionStatus::Connected, env, .. } if env == "UAT"
        ));
    }
}
