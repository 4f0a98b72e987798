//! In-memory registry of connected WebSocket clients and their event
//! channels.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use fr_protocol::ClientEvent;
use fr_sessions::EventSink;

/// Channel feeding a client's WS writer task.
pub type ClientSink = mpsc::Sender<ClientEvent>;

pub struct ConnectedClient {
    pub client_id: String,
    pub connected_at: DateTime<Utc>,
    pub sink: ClientSink,
}

/// Summary info returned by list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub client_id: String,
    pub connected_at: DateTime<Utc>,
}

/// Thread-safe registry of all connected clients.
pub struct ClientHub {
    clients: RwLock<HashMap<String, ConnectedClient>>,
    buffer: usize,
}

impl ClientHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a client and hand back the receiving end of its channel.
    /// Replaces any existing client with the same id.
    pub fn register(&self, client_id: &str) -> mpsc::Receiver<ClientEvent> {
        let (sink, rx) = mpsc::channel(self.buffer);
        self.clients.write().insert(
            client_id.to_owned(),
            ConnectedClient {
                client_id: client_id.to_owned(),
                connected_at: Utc::now(),
                sink,
            },
        );
        tracing::info!(client_id, "client registered");
        rx
    }

    pub fn remove(&self, client_id: &str) {
        if self.clients.write().remove(client_id).is_some() {
            tracing::info!(client_id, "client removed");
        }
    }

    pub fn get_sink(&self, client_id: &str) -> Option<ClientSink> {
        self.clients.read().get(client_id).map(|c| c.sink.clone())
    }

    pub fn list(&self) -> Vec<ClientInfo> {
        let mut out: Vec<ClientInfo> = self
            .clients
            .read()
            .values()
            .map(|c| ClientInfo {
                client_id: c.client_id.clone(),
                connected_at: c.connected_at,
            })
            .collect();
        out.sort_by_key(|c| c.connected_at);
        out
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}

impl EventSink for ClientHub {
    fn publish(&self, client_id: &str, event: ClientEvent) {
        let Some(sink) = self.get_sink(client_id) else {
            tracing::debug!(client_id, "event for unknown client dropped");
            return;
        };
        match sink.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(client_id, "client channel full, event dropped");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(client_id, "client channel closed, event dropped");
            }
        }
    }
}
