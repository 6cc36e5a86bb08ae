//! Calendar events under survey consideration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{EventId, UserId};

/// A meeting tracked by the survey lifecycle.
///
/// The three flags move independently: `should_send_survey` is the
/// eligibility verdict, `questions_sent` closes the dispatch stage and
/// `results_sent` closes the reporting stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Row id.
    pub id: EventId,
    /// Identifier of the event in the calendar source. Unique.
    pub calendar_event_id: String,
    /// Meeting title used in acknowledgments and summaries.
    pub name: String,
    /// Organizer, when their email resolves to a directory user.
    pub organizer_id: Option<UserId>,
    /// Organizer email, always present; fallback identity for reporting.
    pub organizer_email: String,
    /// Meeting start.
    pub start_at: DateTime<Utc>,
    /// Meeting end.
    pub end_at: DateTime<Utc>,
    /// Number of invited attendees at ingestion time.
    pub num_attendees: i32,
    /// Free-text description, if any.
    pub description: Option<String>,
    /// Eligibility verdict; `false` once the event is found unsurveyable.
    pub should_send_survey: bool,
    /// Dispatch stage closed.
    pub questions_sent: bool,
    /// Reporting stage closed.
    pub results_sent: bool,
}

/// Lifecycle stage an event claim guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Sending survey questions (`questions_sent`).
    Questions,
    /// Reporting results (`results_sent`).
    Results,
}

impl Stage {
    /// Returns `true` if `event` still needs this stage run.
    #[must_use]
    pub fn is_open(self, event: &Event) -> bool {
        match self {
            Self::Questions => event.should_send_survey && !event.questions_sent,
            Self::Results => event.questions_sent && !event.results_sent,
        }
    }
}

/// RSVP state of an attendee as reported by the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum RsvpStatus {
    /// Invite accepted.
    Accepted,
    /// Invite declined; never surveyed.
    Declined,
    /// Tentatively accepted.
    Tentative,
    /// No answer yet.
    NeedsAction,
}

impl RsvpStatus {
    /// Wire/storage string, matching the calendar's `responseStatus`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Tentative => "tentative",
            Self::NeedsAction => "needsAction",
        }
    }

    /// Parses a stored status; anything unknown is treated as unanswered.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "accepted" => Self::Accepted,
            "declined" => Self::Declined,
            "tentative" => Self::Tentative,
            _ => Self::NeedsAction,
        }
    }
}

/// One invitee of a meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Attendee {
    /// Attendee email as listed on the invite.
    pub email: String,
    /// RSVP state.
    #[serde(rename = "responseStatus")]
    pub response_status: RsvpStatus,
}

/// Extended details fetched from the calendar source on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    /// Meeting title (the calendar `summary`).
    pub title: String,
    /// Description text.
    pub description: Option<String>,
    /// Current invitee list.
    pub attendees: Vec<Attendee>,
}

/// A calendar event pushed by ingestion.
#[derive(Debug, Clone)]
pub struct NewEvent {
    /// Identifier in the calendar source.
    pub calendar_event_id: String,
    /// Meeting title.
    pub name: String,
    /// Organizer email.
    pub organizer_email: String,
    /// Resolved organizer, if known.
    pub organizer_id: Option<UserId>,
    /// Meeting start.
    pub start_at: DateTime<Utc>,
    /// Meeting end.
    pub end_at: DateTime<Utc>,
    /// Description text.
    pub description: Option<String>,
    /// Invitees at ingestion time.
    pub attendees: Vec<Attendee>,
}

impl NewEvent {
    /// Snapshot of the details the calendar source serves for this event.
    #[must_use]
    pub fn details(&self) -> EventDetails {
        EventDetails {
            title: self.name.clone(),
            description: self.description.clone(),
            attendees: self.attendees.clone(),
        }
    }
}
