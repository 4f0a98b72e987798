//! Session identity.
//!
//! A [`SessionKey`] names a session the way clients do: initiator, acceptor,
//! and environment.  The engine only knows the [`WireSessionId`], which
//! drops the environment, so two keys that differ only by environment
//! collide on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub sender: String,
    pub target: String,
    pub env: String,
}

impl SessionKey {
    pub fn new(sender: impl Into<String>, target: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            target: target.into(),
            env: env.into(),
        }
    }

    pub fn same_pair(&self, sender: &str, target: &str) -> bool {
        self.sender == sender && self.target == target
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}@{}", self.sender, self.target, self.env)
    }
}

/// Engine-level session identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WireSessionId {
    pub begin_string: String,
    pub sender: String,
    pub target: String,
}

impl WireSessionId {
    pub fn new(
        begin_string: impl Into<String>,
        sender: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            begin_string: begin_string.into(),
            sender: sender.into(),
            target: target.into(),
        }
    }

    pub fn from_key(begin_string: &str, key: &SessionKey) -> Self {
        Self::new(begin_string, key.sender.clone(), key.target.clone())
    }
}

impl fmt::Display for WireSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}->{}", self.begin_string, self.sender, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_is_dropped_on_the_wire() {
        let uat = SessionKey::new("S", "T", "UAT");
        let dev = SessionKey::new("S", "T", "DEV");
        assert_ne!(uat, dev);
        assert_eq!(
            WireSessionId::from_key("FIX.4.4", &uat),
            WireSessionId::from_key("FIX.4.4", &dev)
        );
    }

    #[test]
    fn display_forms() {
        let key = SessionKey::new("S", "T", "UAT");
        assert_eq!(key.to_string(), "S->T@UAT");
        assert_eq!(
            WireSessionId::from_key("FIX.4.4", &key).to_string(),
            "FIX.4.4:S->T"
        );
    }

    #[test]
    fn same_pair_ignores_environment() {
        let key = SessionKey::new("S", "T", "UAT");
        assert!(key.same_pair("S", "T"));
        assert!(!key.same_pair("S", "X"));
    }
}
