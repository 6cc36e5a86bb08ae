//! Calendar ingestion DTOs.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::domain::{Attendee, NewEvent, UserId};

/// Request body for `POST /events`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterEventRequest {
    /// Calendar-provider event id. Re-posting the same id refreshes it.
    pub calendar_event_id: String,
    /// Event title.
    pub name: String,
    /// Organizer email as reported by the calendar.
    pub organizer_email: String,
    /// Organizer user, when ingestion already resolved it.
    #[serde(default)]
    pub organizer_id: Option<UserId>,
    /// Scheduled start.
    pub start_at: DateTime<Utc>,
    /// Scheduled end.
    pub end_at: DateTime<Utc>,
    /// Event description.
    #[serde(default)]
    pub description: Option<String>,
    /// Invitees and their RSVP.
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

impl From<RegisterEventRequest> for NewEvent {
    fn from(req: RegisterEventRequest) -> Self {
        Self {
            calendar_event_id: req.calendar_event_id,
            name: req.name,
            organizer_email: req.organizer_email.trim().to_lowercase(),
            organizer_id: req.organizer_id,
            start_at: req.start_at,
            end_at: req.end_at,
            description: req.description,
            attendees: req.attendees,
        }
    }
}
