//! Directory users and their outstanding-survey slot.

use serde::Serialize;

use super::policy::SlotPolicy;
use super::{EventId, UserId};

/// Durable directory record for someone who can be surveyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Row id.
    pub id: UserId,
    /// Messaging identity (e.g. a Slack member id). Unique.
    pub messaging_id: String,
    /// Lower-cased email address. Unique.
    pub email: String,
    /// Set when the user asked not to receive surveys.
    pub has_opted_out: bool,
    /// Calendar refresh token; present once the user granted calendar access.
    #[serde(skip_serializing)]
    pub credential: Option<String>,
    /// Events this user currently owes a rating for.
    pub awaiting: AwaitingSlot,
}

impl User {
    /// Returns `true` once the user connected their calendar.
    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.credential.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// The events a user owes a response to, oldest assignment first.
///
/// Under [`SlotPolicy::Replace`] this never holds more than one entry.
/// Queue policies keep up to a configured capacity and differ only in which
/// end is resolved by the next rating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AwaitingSlot {
    pending: Vec<EventId>,
}

impl AwaitingSlot {
    /// Builds a slot from persisted entries, oldest first.
    #[must_use]
    pub fn from_pending(pending: Vec<EventId>) -> Self {
        Self { pending }
    }

    /// Outstanding events, oldest first.
    #[must_use]
    pub fn pending(&self) -> &[EventId] {
        &self.pending
    }

    /// Returns `true` when the user owes nothing.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns `true` when `event` is outstanding.
    #[must_use]
    pub fn contains(&self, event: EventId) -> bool {
        self.pending.contains(&event)
    }

    /// The event the next rating resolves to.
    #[must_use]
    pub fn current(&self, policy: SlotPolicy) -> Option<EventId> {
        match policy {
            SlotPolicy::Replace | SlotPolicy::Fifo => self.pending.first().copied(),
            SlotPolicy::MostRecent => self.pending.last().copied(),
        }
    }

    /// Records that `event` now awaits a response.
    ///
    /// Returns the events that were dropped to make room: the overwritten
    /// entry under [`SlotPolicy::Replace`], or the oldest entries once a queue
    /// exceeds `capacity`.
    pub fn assign(&mut self, event: EventId, policy: SlotPolicy, capacity: usize) -> Vec<EventId> {
        if policy == SlotPolicy::Replace {
            let displaced = std::mem::take(&mut self.pending)
                .into_iter()
                .filter(|e| *e != event)
                .collect();
            self.pending.push(event);
            return displaced;
        }

        if self.contains(event) {
            return Vec::new();
        }
        self.pending.push(event);
        let overflow = self.pending.len().saturating_sub(capacity.max(1));
        self.pending.drain(..overflow).collect()
    }

    /// Clears `event` from the slot. Returns `true` if it was outstanding.
    pub fn release(&mut self, event: EventId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|e| *e != event);
        self.pending.len() != before
    }
}
