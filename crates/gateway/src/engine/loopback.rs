//! In-process engine for development and tests.
//!
//! Sessions log on as soon as they start.  Nothing leaves the process:
//! outbound messages are recorded, and inbound traffic is simulated with
//! [`LoopbackEngine::inject_admin`] / [`LoopbackEngine::inject_app`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use fr_domain::error::{Error, Result};
use fr_protocol::message::{msg_type, tags};
use fr_protocol::FixMessage;
use fr_sessions::{EngineConfig, EngineEvent, EngineHandle, EngineListener, SessionEngine, WireSessionId};

struct LoopbackSession {
    handle_id: u64,
    listener: Arc<dyn EngineListener>,
    logged_on: bool,
    next_outbound: u64,
    sent: Vec<FixMessage>,
}

/// Listener callbacks always run with the session table unlocked, since a
/// listener may call straight back into the engine.
#[derive(Default)]
pub struct LoopbackEngine {
    sessions: Mutex<HashMap<WireSessionId, LoopbackSession>>,
    next_handle: AtomicU64,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn listener(&self, session: &WireSessionId) -> Result<Arc<dyn EngineListener>> {
        self.sessions
            .lock()
            .get(session)
            .map(|s| s.listener.clone())
            .ok_or_else(|| Error::SessionNotFound(session.to_string()))
    }

    fn set_logged_on(&self, session: &WireSessionId, logged_on: bool) {
        if let Some(s) = self.sessions.lock().get_mut(session) {
            s.logged_on = logged_on;
        }
    }

    /// Deliver an admin message as if it came from the peer.  Logon and
    /// Logout also change the session state and fire the matching callback.
    pub fn inject_admin(&self, session: &WireSessionId, msg: &FixMessage) -> Result<()> {
        let listener = self.listener(session)?;
        listener.on_event(session, EngineEvent::AdminReceived(msg));
        match msg.msg_type() {
            Some(msg_type::LOGON) => {
                self.set_logged_on(session, true);
                listener.on_event(session, EngineEvent::Logon);
            }
            Some(msg_type::LOGOUT) => {
                self.set_logged_on(session, false);
                listener.on_event(session, EngineEvent::Logout);
            }
            _ => {}
        }
        Ok(())
    }

    pub fn inject_app(&self, session: &WireSessionId, msg: &FixMessage) -> Result<()> {
        let listener = self.listener(session)?;
        listener.on_event(session, EngineEvent::AppReceived(msg));
        Ok(())
    }

    pub fn sent(&self, session: &WireSessionId) -> Vec<FixMessage> {
        self.sessions
            .lock()
            .get(session)
            .map(|s| s.sent.clone())
            .unwrap_or_default()
    }

    pub fn next_outbound(&self, session: &WireSessionId) -> Option<u64> {
        self.sessions.lock().get(session).map(|s| s.next_outbound)
    }

    pub fn is_logged_on(&self, session: &WireSessionId) -> bool {
        self.sessions
            .lock()
            .get(session)
            .is_some_and(|s| s.logged_on)
    }
}

impl SessionEngine for LoopbackEngine {
    fn start(&self, config: &EngineConfig, listener: Arc<dyn EngineListener>) -> Result<EngineHandle> {
        if config.port == 0 {
            return Err(Error::ConfigInvalid(format!(
                "{}: port must be greater than 0",
                config.session
            )));
        }
        let id = config.session.clone();
        let handle_id = self.next_handle.fetch_add(1, Ordering::Relaxed) + 1;

        listener.on_event(&id, EngineEvent::Create);

        let mut logon = FixMessage::new(msg_type::LOGON);
        logon.set(tags::BEGIN_STRING, id.begin_string.as_str());
        logon.set(tags::SENDER_COMP_ID, id.sender.as_str());
        logon.set(tags::TARGET_COMP_ID, id.target.as_str());
        logon.set(tags::MSG_SEQ_NUM, "1");
        logon.set(108, config.heartbeat_secs.to_string());
        listener.on_event(&id, EngineEvent::BeforeAdminSend(&mut logon));

        self.sessions.lock().insert(
            id.clone(),
            LoopbackSession {
                handle_id,
                listener: listener.clone(),
                logged_on: true,
                next_outbound: 2,
                sent: vec![logon],
            },
        );
        tracing::debug!(session = %id, host = %config.host, port = config.port, "loopback session started");
        listener.on_event(&id, EngineEvent::Logon);

        Ok(EngineHandle::new(handle_id, id))
    }

    fn stop(&self, handle: &EngineHandle, forced: bool) {
        let removed = {
            let mut sessions = self.sessions.lock();
            match sessions.get(handle.session()) {
                Some(s) if s.handle_id == handle.id() => sessions.remove(handle.session()),
                _ => None,
            }
        };
        if let Some(session) = removed {
            tracing::debug!(session = %handle.session(), forced, "loopback session stopped");
            session.listener.on_event(handle.session(), EngineEvent::Logout);
        }
    }

    fn exists(&self, session: &WireSessionId) -> bool {
        self.sessions.lock().contains_key(session)
    }

    fn send(&self, mut message: FixMessage, session: &WireSessionId) -> Result<bool> {
        let (listener, seq) = {
            let mut sessions = self.sessions.lock();
            let s = sessions
                .get_mut(session)
                .ok_or_else(|| Error::SessionNotFound(session.to_string()))?;
            if !s.logged_on {
                return Ok(false);
            }
            let seq = s.next_outbound;
            s.next_outbound += 1;
            (s.listener.clone(), seq)
        };

        message.set(tags::BEGIN_STRING, session.begin_string.as_str());
        message.set(tags::SENDER_COMP_ID, session.sender.as_str());
        message.set(tags::TARGET_COMP_ID, session.target.as_str());
        message.set(tags::MSG_SEQ_NUM, seq.to_string());
        listener.on_event(session, EngineEvent::BeforeAppSend(&mut message));

        if let Some(s) = self.sessions.lock().get_mut(session) {
            s.sent.push(message);
        }
        Ok(true)
    }

    fn set_next_outbound_seq(&self, session: &WireSessionId, seq: u64) {
        if let Some(s) = self.sessions.lock().get_mut(session) {
            s.next_outbound = seq;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl EngineListener for Recorder {
        fn on_event(&self, _session: &WireSessionId, event: EngineEvent<'_>) {
            self.0.lock().push(event.name().to_owned());
        }
    }

    fn config(port: u16) -> EngineConfig {
        EngineConfig {
            session: WireSessionId::new("FIX.4.4", "S", "T"),
            host: "127.0.0.1".into(),
            port,
            heartbeat_secs: 30,
            reconnect_secs: 5,
            start_time: "00:00:00".into(),
            end_time: "00:00:00".into(),
            use_data_dictionary: false,
            data_dictionary: String::new(),
            validate_user_defined_fields: false,
            file_store_path: PathBuf::new(),
            file_log_path: PathBuf::new(),
            tls: None,
        }
    }

    #[test]
    fn start_fires_create_logon_sequence() {
        let engine = LoopbackEngine::new();
        let rec = Arc::new(Recorder::default());
        let handle = engine.start(&config(9000), rec.clone()).unwrap();
        assert_eq!(*rec.0.lock(), vec!["create", "before_admin_send", "logon"]);
        assert!(engine.exists(handle.session()));
        assert!(engine.is_logged_on(handle.session()));

        engine.stop(&handle, true);
        assert!(!engine.exists(handle.session()));
        assert_eq!(rec.0.lock().last().map(String::as_str), Some("logout"));
    }

    #[test]
    fn zero_port_is_rejected() {
        let engine = LoopbackEngine::new();
        let err = engine
            .start(&config(0), Arc::new(Recorder::default()))
            .unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }

    #[test]
    fn send_respects_session_state() {
        let engine = LoopbackEngine::new();
        let id = WireSessionId::new("FIX.4.4", "S", "T");
        assert!(matches!(
            engine.send(FixMessage::new("D"), &id),
            Err(Error::SessionNotFound(_))
        ));

        engine.start(&config(9000), Arc::new(Recorder::default())).unwrap();
        assert!(engine.send(FixMessage::new("D"), &id).unwrap());
        let sent = engine.sent(&id);
        assert_eq!(sent.last().unwrap().get(tags::MSG_SEQ_NUM), Some("2"));

        engine
            .inject_admin(&id, &FixMessage::new(msg_type::LOGOUT))
            .unwrap();
        assert!(!engine.send(FixMessage::new("D"), &id).unwrap());
    }

    #[test]
    fn sequence_override_applies_to_next_send() {
        let engine = LoopbackEngine::new();
        let id = WireSessionId::new("FIX.4.4", "S", "T");
        engine.start(&config(9000), Arc::new(Recorder::default())).unwrap();
        engine.set_next_outbound_seq(&id, 42);
        assert_eq!(engine.next_outbound(&id), Some(42));
        engine.send(FixMessage::new("D"), &id).unwrap();
        assert_eq!(engine.sent(&id).last().unwrap().get(tags::MSG_SEQ_NUM), Some("42"));
    }

    #[test]
    fn stale_handle_does_not_stop_newer_session() {
        let engine = LoopbackEngine::new();
        let old = engine.start(&config(9000), Arc::new(Recorder::default())).unwrap();
        engine.stop(&old, true);
        let new = engine.start(&config(9000), Arc::new(Recorder::default())).unwrap();
        engine.stop(&old, true);
        assert!(engine.exists(new.session()));
    }
}
