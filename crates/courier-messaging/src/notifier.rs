use tokio::sync::broadcast;

use courier_types::events::MessageEvent;

/// Capacity of the event fan-out channel. Slow subscribers past this lag
/// are skipped forward, not blocked on.
const EVENT_CAPACITY: usize = 1024;

/// Fans messaging events out to live subscribers. Cheap to clone; all
/// clones share one channel.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<MessageEvent>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MessageEvent> {
        self.tx.subscribe()
    }

    /// Best-effort delivery: with no live subscribers the event is dropped.
    pub fn publish(&self, event: MessageEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
