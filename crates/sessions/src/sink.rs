use fr_protocol::ClientEvent;

/// Per-client notification channel.  Called from engine threads, so
/// implementations must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, client_id: &str, event: ClientEvent);
}

