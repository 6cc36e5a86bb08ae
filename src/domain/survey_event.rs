//! Lifecycle events emitted by the survey engine.
//!
//! Every state transition publishes a [`SurveyEvent`] through the
//! [`super::EventBus`]. The binary logs each one and, with PostgreSQL
//! enabled, appends it to the `survey_log` table.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{EventId, Rating, TallyEntry, UserId};

/// Why an event's reporting stage closed without a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonReason {
    /// No directory user matches the organizer.
    UnresolvedOrganizer,
}

/// Domain event emitted after every survey state transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SurveyEvent {
    /// Survey questions went out and `questions_sent` was set.
    QuestionsDispatched {
        /// Surveyed event.
        event_id: EventId,
        /// Users that received the prompt.
        sent: Vec<UserId>,
        /// Eligible users skipped because they opted out.
        opted_out: Vec<UserId>,
        /// Users whose send failed.
        failed: Vec<UserId>,
        /// Transition time.
        timestamp: DateTime<Utc>,
    },

    /// The event had too few eligible attendees and will not be surveyed.
    EventMarkedIneligible {
        /// Affected event.
        event_id: EventId,
        /// Eligible attendee count at evaluation time.
        eligible: usize,
        /// Threshold that was not met.
        min_surveyable: usize,
        /// Transition time.
        timestamp: DateTime<Utc>,
    },

    /// A rating was stored.
    ResponseRecorded {
        /// Rated event.
        event_id: EventId,
        /// Responding user.
        user_id: UserId,
        /// Stored rating.
        rating: Rating,
        /// `true` when an earlier rating was overwritten.
        updated: bool,
        /// Transition time.
        timestamp: DateTime<Utc>,
    },

    /// Results were sent to the organizer and `results_sent` was set.
    ResultsReported {
        /// Reported event.
        event_id: EventId,
        /// Organizer that received the summary.
        organizer_id: UserId,
        /// Reported counts.
        tally: Vec<TallyEntry>,
        /// Transition time.
        timestamp: DateTime<Utc>,
    },

    /// The reporting stage closed with nothing sent.
    ResultsAbandoned {
        /// Affected event.
        event_id: EventId,
        /// Why nothing was sent.
        reason: AbandonReason,
        /// Transition time.
        timestamp: DateTime<Utc>,
    },
}

impl SurveyEvent {
    /// Returns the event this transition belongs to.
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        match self {
            Self::QuestionsDispatched { event_id, .. }
            | Self::EventMarkedIneligible { event_id, .. }
            | Self::ResponseRecorded { event_id, .. }
            | Self::ResultsReported { event_id, .. }
            | Self::ResultsAbandoned { event_id, .. } => *event_id,
        }
    }

    /// Returns the `event_type` discriminator string.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::QuestionsDispatched { .. } => "questions_dispatched",
            Self::EventMarkedIneligible { .. } => "event_marked_ineligible",
            Self::ResponseRecorded { .. } => "response_recorded",
            Self::ResultsReported { .. } => "results_reported",
            Self::ResultsAbandoned { .. } => "results_abandoned",
        }
    }
}
