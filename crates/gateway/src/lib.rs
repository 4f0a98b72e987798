//! fixrelay gateway: HTTP/WebSocket front end over the session layer, the
//! batch dispatcher, and the development loopback engine.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod clients;
pub mod engine;
pub mod orchestrator;
pub mod runtime;
pub mod state;
