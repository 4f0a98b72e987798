//! FIX session orchestration for fixrelay.
//!
//! Sessions are addressed by [`SessionKey`] (sender, target, environment)
//! and run by a pluggable [`SessionEngine`].  Engine callbacks flow through
//! the [`ProtocolEventHandler`], which signs outbound traffic, routes
//! inbound messages to the owning client, and recovers from rejected or
//! out-of-sequence logouts.

pub mod credentials;
pub mod engine;
pub mod handler;
pub mod lifecycle;
pub mod session_key;
pub mod settings;
pub mod sink;
pub mod store;

pub use credentials::{CredentialCache, CredentialSource, FileCredentialSource, HmacSigner, MessageSigner};
pub use engine::{EngineConfig, EngineEvent, EngineHandle, EngineListener, SessionEngine};
pub use handler::ProtocolEventHandler;
pub use lifecycle::{LifecycleConfig, SessionLifecycleManager};
pub use session_key::{SessionKey, WireSessionId};
pub use sink::EventSink;
pub use store::{SessionRegistry, SessionSummary};
