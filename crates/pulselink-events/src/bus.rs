#![forbid(unsafe_code)]

use tokio::sync::broadcast;

use crate::Event;

/// Unified event bus for the streaming controller.
///
/// Every component receives a cloned `EventBus` and publishes directly.
/// A subscriber sees the merged stream from every publisher.
///
/// `publish()` is a sync call and works from both async tasks and blocking
/// threads. If there are no subscribers, events are silently dropped.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to every current subscriber.
    ///
    /// Accepts any type converting `Into<Event>`, so sub-enum values can be
    /// passed directly: `bus.publish(SessionEvent::Stopped { session })`.
    pub fn publish<E: Into<Event>>(&self, event: E) {
        let _ = self.tx.send(event.into());
    }

    /// New independent receiver for all future events. A subscriber that
    /// falls behind sees `RecvError::Lagged(n)`; producers never block.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
