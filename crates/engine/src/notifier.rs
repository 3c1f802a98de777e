use common::events::TradingEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Fire-and-forget outlet for trading events. Implementations must not
/// block the engine.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: TradingEvent);
}

/// Publishes events on a broadcast channel for any number of workers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<TradingEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TradingEvent> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastNotifier {
    fn notify(&self, event: TradingEvent) {
        if self.tx.send(event).is_err() {
            debug!("No notification subscribers, event dropped");
        }
    }
}
