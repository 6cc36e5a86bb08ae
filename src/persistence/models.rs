//! Database row models and their conversion into domain records.

use chrono::{DateTime, Utc};

use crate::domain::{AwaitingSlot, Event, EventId, Rating, SurveyResponse, User, UserId};
use crate::error::SurveyError;

/// A row of `users` joined with its ordered `awaiting_responses`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    /// Row id.
    pub id: i64,
    /// Messaging identity.
    pub messaging_id: String,
    /// Lower-cased email.
    pub email_address: String,
    /// Opt-out flag.
    pub has_opted_out: bool,
    /// Calendar refresh token.
    pub refresh_token: Option<String>,
    /// Outstanding event ids, oldest first.
    pub awaiting: Vec<i64>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::new(row.id),
            messaging_id: row.messaging_id,
            email: row.email_address,
            has_opted_out: row.has_opted_out,
            credential: row.refresh_token,
            awaiting: AwaitingSlot::from_pending(
                row.awaiting.into_iter().map(EventId::new).collect(),
            ),
        }
    }
}

/// A row of the `events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    /// Row id.
    pub id: i64,
    /// Calendar identifier.
    pub calendar_event_id: String,
    /// Meeting title.
    pub name: String,
    /// Resolved organizer.
    pub organizer_id: Option<i64>,
    /// Organizer email.
    pub organizer_email: String,
    /// Meeting start.
    pub start_at: DateTime<Utc>,
    /// Meeting end.
    pub end_at: DateTime<Utc>,
    /// Invitee count.
    pub num_attendees: i32,
    /// Description text.
    pub description: Option<String>,
    /// Eligibility verdict.
    pub should_send_survey: bool,
    /// Dispatch stage closed.
    pub questions_sent: bool,
    /// Reporting stage closed.
    pub results_sent: bool,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            id: EventId::new(row.id),
            calendar_event_id: row.calendar_event_id,
            name: row.name,
            organizer_id: row.organizer_id.map(UserId::new),
            organizer_email: row.organizer_email,
            start_at: row.start_at,
            end_at: row.end_at,
            num_attendees: row.num_attendees,
            description: row.description,
            should_send_survey: row.should_send_survey,
            questions_sent: row.questions_sent,
            results_sent: row.results_sent,
        }
    }
}

/// A row of the `survey_responses` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResponseRow {
    /// Rated event.
    pub event_id: i64,
    /// Responding user.
    pub user_id: i64,
    /// Stored rating token.
    pub response: String,
    /// First submission time.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ResponseRow> for SurveyResponse {
    type Error = SurveyError;

    fn try_from(row: ResponseRow) -> Result<Self, Self::Error> {
        let rating = Rating::from_token(&row.response).ok_or_else(|| {
            SurveyError::Persistence(format!("unknown stored rating {:?}", row.response))
        })?;
        Ok(Self {
            event_id: EventId::new(row.event_id),
            user_id: UserId::new(row.user_id),
            rating,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_row_keeps_awaiting_order() {
        let user = User::from(UserRow {
            id: 4,
            messaging_id: "U4".to_string(),
            email_address: "d@x.io".to_string(),
            has_opted_out: false,
            refresh_token: None,
            awaiting: vec![7, 3],
        });
        assert_eq!(user.awaiting.pending(), &[EventId::new(7), EventId::new(3)]);
        assert!(!user.has_credential());
    }

    #[test]
    fn unknown_stored_rating_is_a_persistence_error() {
        let row = ResponseRow {
            event_id: 1,
            user_id: 1,
            response: "meh".to_string(),
            created_at: Utc::now(),
        };
        assert!(matches!(
            SurveyResponse::try_from(row),
            Err(SurveyError::Persistence(_))
        ));
    }
}
