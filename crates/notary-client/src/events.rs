use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotaryEvent {
    /// A notary configuration was replaced by a freshly fetched bundle.
    Updated { previous_name: String, name: String },
}

/// Receives notifications about configuration changes.
pub trait EventSink: Send + Sync {
    fn notify(&self, event: NotaryEvent);
}

impl EventSink for broadcast::Sender<NotaryEvent> {
    fn notify(&self, event: NotaryEvent) {
        // No active receiver is fine.
        let _ = self.send(event);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn notify(&self, event: NotaryEvent) {
        trace!(?event, "Event discarded");
    }
}
