use std::sync::Arc;
use std::time::Instant;

use fr_domain::config::Config;

use crate::clients::ClientHub;
use crate::orchestrator::Orchestrator;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    /// Connected WebSocket clients; also the event sink for sessions and
    /// batches.
    pub clients: Arc<ClientHub>,
    pub started_at: Instant,
}
