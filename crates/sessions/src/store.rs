//! In-memory registry of active sessions and the ownership index.
//!
//! The active table and both directions of the ownership index live under
//! one lock so every insert/remove keeps them consistent:
//! `key ∈ owned[client]` iff `owners[wire_id(key)] == client`.
//!
//! A removed session keeps its wire id claimed until the caller reports the
//! engine session torn down with [`SessionRegistry::finish_stop`].

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::engine::EngineHandle;
use crate::session_key::{SessionKey, WireSessionId};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A running engine session.  The handle is owned exclusively by the entry.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub key: SessionKey,
    pub wire_id: WireSessionId,
    pub handle: EngineHandle,
    pub owner: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Read-only view for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub sender: String,
    pub target: String,
    pub env: String,
    pub owner: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Outcome of [`SessionRegistry::reserve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// The caller now holds the wire id and must `commit` or `release` it.
    Reserved,
    /// This exact key is already running.
    AlreadyActive,
    /// The wire id is taken by another environment or an in-flight start.
    Conflict { environment: Option<String> },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct Inner {
    active: HashMap<SessionKey, ActiveSession>,
    starting: HashSet<WireSessionId>,
    /// Wire ids of removed sessions whose engine stop is still running,
    /// with the environment they ran in.
    stopping: HashMap<WireSessionId, String>,
    owned: HashMap<String, HashSet<SessionKey>>,
    owners: HashMap<WireSessionId, String>,
}

impl Inner {
    fn detach(&mut self, key: &SessionKey) -> Option<ActiveSession> {
        let session = self.active.remove(key)?;
        if let Some(owner) = &session.owner {
            if let Some(keys) = self.owned.get_mut(owner) {
                keys.remove(key);
                if keys.is_empty() {
                    self.owned.remove(owner);
                }
            }
            self.owners.remove(&session.wire_id);
        }
        self.stopping
            .insert(session.wire_id.clone(), session.key.env.clone());
        Some(session)
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `wire_id` for a start of `key`.
    pub fn reserve(&self, key: &SessionKey, wire_id: &WireSessionId) -> Reservation {
        let mut inner = self.inner.write();
        if inner.active.contains_key(key) {
            return Reservation::AlreadyActive;
        }
        if inner.starting.contains(wire_id) {
            return Reservation::Conflict { environment: None };
        }
        if let Some(env) = inner.stopping.get(wire_id) {
            return Reservation::Conflict {
                environment: Some(env.clone()),
            };
        }
        if let Some(other) = inner.active.values().find(|s| &s.wire_id == wire_id) {
            return Reservation::Conflict {
                environment: Some(other.key.env.clone()),
            };
        }
        inner.starting.insert(wire_id.clone());
        Reservation::Reserved
    }

    /// Drop a reservation whose start failed.
    pub fn release(&self, wire_id: &WireSessionId) {
        self.inner.write().starting.remove(wire_id);
    }

    /// Turn a reservation into an active entry and record its owner.
    pub fn commit(&self, session: ActiveSession) {
        let mut inner = self.inner.write();
        inner.starting.remove(&session.wire_id);
        if let Some(owner) = &session.owner {
            inner
                .owned
                .entry(owner.clone())
                .or_default()
                .insert(session.key.clone());
            inner.owners.insert(session.wire_id.clone(), owner.clone());
        }
        inner.active.insert(session.key.clone(), session);
    }

    /// Pop the session for `key`.  Its wire id stays claimed until
    /// [`finish_stop`](Self::finish_stop).
    pub fn remove(&self, key: &SessionKey) -> Option<ActiveSession> {
        self.inner.write().detach(key)
    }

    /// Release the wire id of a removed session once its engine session
    /// is gone.
    pub fn finish_stop(&self, wire_id: &WireSessionId) {
        self.inner.write().stopping.remove(wire_id);
    }

    /// Pop every session owned by `client_id`.
    pub fn take_owned_by(&self, client_id: &str) -> Vec<ActiveSession> {
        let mut inner = self.inner.write();
        let Some(keys) = inner.owned.remove(client_id) else {
            return Vec::new();
        };
        keys.iter().filter_map(|k| inner.detach(k)).collect()
    }

    /// Pop every session for this sender/target pair, in any environment.
    pub fn take_matching(&self, sender: &str, target: &str) -> Vec<ActiveSession> {
        let mut inner = self.inner.write();
        let keys: Vec<SessionKey> = inner
            .active
            .keys()
            .filter(|k| k.same_pair(sender, target))
            .cloned()
            .collect();
        keys.iter().filter_map(|k| inner.detach(k)).collect()
    }

    /// Pop everything.
    pub fn drain(&self) -> Vec<ActiveSession> {
        let mut inner = self.inner.write();
        let keys: Vec<SessionKey> = inner.active.keys().cloned().collect();
        keys.iter().filter_map(|k| inner.detach(k)).collect()
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.inner.read().active.contains_key(key)
    }

    pub fn owner_of(&self, wire_id: &WireSessionId) -> Option<String> {
        self.inner.read().owners.get(wire_id).cloned()
    }

    pub fn owned_keys(&self, client_id: &str) -> Vec<SessionKey> {
        let mut keys: Vec<_> = self
            .inner
            .read()
            .owned
            .get(client_id)
            .map(|k| k.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// The client-facing key currently bound to `wire_id`.
    pub fn key_for(&self, wire_id: &WireSessionId) -> Option<SessionKey> {
        self.inner
            .read()
            .active
            .values()
            .find(|s| &s.wire_id == wire_id)
            .map(|s| s.key.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        let mut out: Vec<SessionSummary> = self
            .inner
            .read()
            .active
            .values()
            .map(|s| SessionSummary {
                sender: s.key.sender.clone(),
                target: s.key.target.clone(),
                env: s.key.env.clone(),
                owner: s.owner.clone(),
                started_at: s.started_at,
            })
            .collect();
        out.sort_by(|a, b| (&a.sender, &a.target, &a.env).cmp(&(&b.sender, &b.target, &b.env)));
        out
    }
}
