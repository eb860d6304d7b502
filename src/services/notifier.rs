//! Best-effort fan-out of ledger events to live-update subscribers.

use tokio::sync::broadcast;

use crate::domain::OwnerEvent;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<OwnerEvent>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publishes events in order. Having no subscribers is not an error.
    pub fn dispatch(&self, events: Vec<OwnerEvent>) {
        for event in events {
            let name = event.event.name();
            let owner_id = event.owner_id;
            if self.tx.send(event).is_err() {
                tracing::trace!(event = name, %owner_id, "No live subscribers for event");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OwnerEvent> {
        self.tx.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
