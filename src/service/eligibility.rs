//! Which attendees of an event may be surveyed.

use crate::domain::{Attendee, EligibilityMode, Event, EventDetails, RsvpStatus, User};
use crate::error::SurveyError;

use super::SurveyContext;

/// Eligible directory users and the threshold verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    /// Matched directory users in attendee order, opted-out users included.
    pub eligible: Vec<User>,
    /// `true` when `eligible` reaches the minimum surveyable count.
    pub verdict: bool,
}

impl Eligibility {
    /// Number of eligible users that can actually be asked.
    #[must_use]
    pub fn quorum(&self) -> usize {
        self.eligible.iter().filter(|u| !u.has_opted_out).count()
    }
}

/// Emails of the attendees that pass the RSVP and role filters,
/// lower-cased, in attendee order.
#[must_use]
pub fn candidate_emails(event: &Event, attendees: &[Attendee], mode: EligibilityMode) -> Vec<String> {
    attendees
        .iter()
        .filter(|a| a.response_status != RsvpStatus::Declined)
        .filter(|a| {
            let is_organizer = a.email.eq_ignore_ascii_case(&event.organizer_email);
            match mode {
                EligibilityMode::OrganizerOnly => is_organizer,
                EligibilityMode::NonOrganizer => !is_organizer,
            }
        })
        .map(|a| a.email.to_lowercase())
        .collect()
}

/// Matches the candidate attendees of `event` against `directory`.
///
/// Pure: the caller fetches the directory users and persists a negative
/// verdict.
#[must_use]
pub fn evaluate(
    event: &Event,
    attendees: &[Attendee],
    directory: &[User],
    mode: EligibilityMode,
    min_surveyable: usize,
) -> Eligibility {
    let mut eligible: Vec<User> = Vec::new();
    for email in candidate_emails(event, attendees, mode) {
        let Some(user) = directory.iter().find(|u| u.email.eq_ignore_ascii_case(&email)) else {
            continue;
        };
        if !eligible.iter().any(|e| e.id == user.id) {
            eligible.push(user.clone());
        }
    }
    let verdict = eligible.len() >= min_surveyable;
    Eligibility { eligible, verdict }
}

/// Looks up the candidate attendees in the directory and evaluates them
/// with the configured mode and threshold.
///
/// # Errors
///
/// Returns a store error.
pub async fn assess(
    ctx: &SurveyContext,
    event: &Event,
    details: &EventDetails,
) -> Result<Eligibility, SurveyError> {
    let mode = ctx.config().eligibility_mode;
    let emails = candidate_emails(event, &details.attendees, mode);
    let directory = if emails.is_empty() {
        Vec::new()
    } else {
        ctx.store().users_by_emails(&emails).await?
    };
    Ok(evaluate(
        event,
        &details.attendees,
        &directory,
        mode,
        ctx.config().min_surveyable,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AwaitingSlot, EventId, UserId};
    use chrono::Utc;

    fn event() -> Event {
        Event {
            id: EventId::new(1),
            calendar_event_id: "cal-1".to_string(),
            name: "Planning".to_string(),
            organizer_id: None,
            organizer_email: "Lead@Example.com".to_string(),
            start_at: Utc::now(),
            end_at: Utc::now(),
            num_attendees: 0,
            description: None,
            should_send_survey: true,
            questions_sent: false,
            results_sent: false,
        }
    }

    fn attendee(email: &str, status: RsvpStatus) -> Attendee {
        Attendee {
            email: email.to_string(),
            response_status: status,
        }
    }

    fn user(id: i64, email: &str, opted_out: bool) -> User {
        User {
            id: UserId::new(id),
            messaging_id: format!("U{id}"),
            email: email.to_string(),
            has_opted_out: opted_out,
            credential: None,
            awaiting: AwaitingSlot::default(),
        }
    }

    fn attendees() -> Vec<Attendee> {
        vec![
            attendee("lead@example.com", RsvpStatus::Accepted),
            attendee("Ann@Example.com", RsvpStatus::Accepted),
            attendee("bob@example.com", RsvpStatus::Declined),
            attendee("cat@example.com", RsvpStatus::Tentative),
            attendee("dan@example.com", RsvpStatus::NeedsAction),
            attendee("stranger@elsewhere.io", RsvpStatus::Accepted),
        ]
    }

    fn directory() -> Vec<User> {
        vec![
            user(1, "lead@example.com", false),
            user(2, "ann@example.com", false),
            user(3, "bob@example.com", false),
            user(4, "cat@example.com", true),
            user(5, "dan@example.com", false),
        ]
    }

    #[test]
    fn non_organizer_mode_drops_organizer_and_declined() {
        let emails = candidate_emails(&event(), &attendees(), EligibilityMode::NonOrganizer);
        assert_eq!(
            emails,
            vec![
                "ann@example.com",
                "cat@example.com",
                "dan@example.com",
                "stranger@elsewhere.io"
            ]
        );
    }

    #[test]
    fn organizer_only_mode_keeps_just_the_organizer() {
        let emails = candidate_emails(&event(), &attendees(), EligibilityMode::OrganizerOnly);
        assert_eq!(emails, vec!["lead@example.com"]);
    }

    #[test]
    fn eligibility_counts_opted_out_users_but_quorum_does_not() {
        let result = evaluate(
            &event(),
            &attendees(),
            &directory(),
            EligibilityMode::NonOrganizer,
            3,
        );
        let ids: Vec<i64> = result.eligible.iter().map(|u| u.id.get()).collect();
        assert_eq!(ids, vec![2, 4, 5]);
        assert!(result.verdict);
        assert_eq!(result.quorum(), 2);
    }

    #[test]
    fn below_threshold_is_a_negative_verdict() {
        let result = evaluate(
            &event(),
            &attendees(),
            &directory(),
            EligibilityMode::NonOrganizer,
            4,
        );
        assert!(!result.verdict);
    }

    #[test]
    fn duplicate_attendee_rows_count_once() {
        let mut list = attendees();
        list.push(attendee("ANN@example.com", RsvpStatus::Accepted));
        let result = evaluate(&event(), &list, &directory(), EligibilityMode::NonOrganizer, 1);
        assert_eq!(result.eligible.len(), 3);
    }
}
