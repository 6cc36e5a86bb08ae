//! Broadcast channel for survey lifecycle events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Engine components
//! publish a [`SurveyEvent`] after each committed transition; subscribers
//! (the log writer in the binary, tests) receive every later event.

use tokio::sync::broadcast;

use super::SurveyEvent;

/// Broadcast bus for [`SurveyEvent`]s.
///
/// When the ring buffer is full the oldest events are dropped for lagging
/// receivers. Publishing never blocks the engine.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SurveyEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: SurveyEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SurveyEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
