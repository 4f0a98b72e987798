//! Interactive clients: the connection hub and the WebSocket endpoint.

pub mod hub;
pub mod ws;

pub use hub::{ClientHub, ClientInfo};
