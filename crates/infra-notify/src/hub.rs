// Realtime push bus
//
// Fire-and-forget fan-in point for realtime delivery. Subscribers (socket
// handlers, event forwarders) attach with `subscribe`; a send with no
// active subscriber is reported as undelivered so the advisory delivery
// flags stay honest.

use tokio::sync::broadcast;

use vendormatch_core::domain::{OfferPayload, VendorId};

/// One realtime offer event addressed to a vendor
#[derive(Debug, Clone)]
pub struct PushEvent {
    pub vendor_id: VendorId,
    pub offer: OfferPayload,
}

#[derive(Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<PushEvent>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; Err means nobody is listening right now
    pub(crate) fn publish(&self, event: PushEvent) -> Result<usize, PushEvent> {
        self.tx.send(event).map_err(|e| e.0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(256)
    }
}
