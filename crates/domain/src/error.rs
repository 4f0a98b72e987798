use serde::{Deserialize, Serialize};

/// Shared error type used across all fixrelay crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed or missing environment, endpoint, or credential settings.
    #[error("config: {0}")]
    ConfigInvalid(String),

    /// Another start for the same wire session is active or in flight.
    #[error("session {session} is already starting or active (environment {environment})")]
    AlreadyStarting {
        session: String,
        environment: String,
    },

    /// Target session is not active or not logged on.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The engine accepted the session but refused to send (no logon yet).
    #[error("logon required: {0}")]
    LogonRequired(String),

    #[error("batch sender is already running")]
    BatchAlreadyRunning,

    /// Operator-supplied FIX text that cannot be parsed or routed.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Signing material missing or unusable.  Never aborts a send.
    #[error("signature unavailable: {0}")]
    SignatureUnavailable(String),

    #[error("engine: {0}")]
    Engine(String),

    #[error("{0}")]
    Other(String),
}

/// Stable error category for transport adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigInvalid,
    AlreadyStarting,
    SessionNotFound,
    LogonRequired,
    BatchAlreadyRunning,
    InvalidMessage,
    SignatureUnavailable,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            Self::AlreadyStarting { .. } => ErrorKind::AlreadyStarting,
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::LogonRequired(_) => ErrorKind::LogonRequired,
            Self::BatchAlreadyRunning => ErrorKind::BatchAlreadyRunning,
            Self::InvalidMessage(_) => ErrorKind::InvalidMessage,
            Self::SignatureUnavailable(_) => ErrorKind::SignatureUnavailable,
            Self::Io(_) | Self::Json(_) | Self::Engine(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }
}

impl ErrorKind {
    /// Human-readable title shown to clients.
    pub fn title(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "Configuration Error",
            Self::AlreadyStarting => "Session Already Starting",
            Self::SessionNotFound => "Session Not Found",
            Self::LogonRequired => "Logon Required",
            Self::BatchAlreadyRunning => "Batch Already Running",
            Self::InvalidMessage => "Invalid Message",
            Self::SignatureUnavailable => "Signature Unavailable",
            Self::Internal => "Request Failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_discriminated() {
        assert_eq!(
            Error::ConfigInvalid("x".into()).kind(),
            ErrorKind::ConfigInvalid
        );
        assert_eq!(Error::BatchAlreadyRunning.kind(), ErrorKind::BatchAlreadyRunning);
        assert_eq!(Error::Engine("boom".into()).kind(), ErrorKind::Internal);
        assert_eq!(
            Error::SessionNotFound("FIX.4.4:A->B".into()).kind(),
            ErrorKind::SessionNotFound
        );
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::LogonRequired).unwrap();
        assert_eq!(json, "\"logon_required\"");
    }
}
