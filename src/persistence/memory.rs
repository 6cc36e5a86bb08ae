//! In-memory store behind a single [`tokio::sync::RwLock`].
//!
//! Used when persistence is disabled and throughout the tests. Every trait
//! method takes the lock once, so each call is atomic with respect to every
//! other call, which is all the claim protocol needs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{DirectoryStore, Registered, SurveyStore};
use crate::channels::CalendarSource;
use crate::domain::{
    AwaitingSlot, Event, EventDetails, EventId, NewEvent, Rating, SlotPolicy, Stage,
    SurveyResponse, UpsertKind, User, UserId,
};
use crate::error::SurveyError;

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<UserId, User>,
    events: BTreeMap<EventId, Event>,
    claims: HashMap<EventId, DateTime<Utc>>,
    details: HashMap<EventId, EventDetails>,
    responses: Vec<SurveyResponse>,
    last_user_id: i64,
    last_event_id: i64,
}

impl MemoryState {
    fn event_mut(&mut self, id: EventId) -> Result<&mut Event, SurveyError> {
        self.events
            .get_mut(&id)
            .ok_or(SurveyError::EventNotFound(id))
    }

    fn user_mut(&mut self, id: UserId) -> Result<&mut User, SurveyError> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| SurveyError::UserNotFound(id.to_string()))
    }
}

/// Volatile [`SurveyStore`] that also serves stored attendee snapshots as
/// its [`CalendarSource`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn user_by_identity(&self, messaging_id: &str) -> Result<Option<User>, SurveyError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.messaging_id == messaging_id)
            .cloned())
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, SurveyError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, SurveyError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn users_by_emails(&self, emails: &[String]) -> Result<Vec<User>, SurveyError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .filter(|u| emails.iter().any(|e| u.email.eq_ignore_ascii_case(e)))
            .cloned()
            .collect())
    }

    async fn insert_user(&self, messaging_id: &str, email: &str) -> Result<bool, SurveyError> {
        let mut state = self.state.write().await;
        let email = email.to_lowercase();
        if state
            .users
            .values()
            .any(|u| u.messaging_id == messaging_id || u.email == email)
        {
            return Ok(false);
        }
        state.last_user_id = state.last_user_id.saturating_add(1);
        let id = UserId::new(state.last_user_id);
        state.users.insert(
            id,
            User {
                id,
                messaging_id: messaging_id.to_string(),
                email,
                has_opted_out: false,
                credential: None,
                awaiting: AwaitingSlot::default(),
            },
        );
        Ok(true)
    }

    async fn set_opted_out(&self, id: UserId, opted_out: bool) -> Result<(), SurveyError> {
        let mut state = self.state.write().await;
        state.user_mut(id)?.has_opted_out = opted_out;
        Ok(())
    }

    async fn set_credential(&self, email: &str, token: &str) -> Result<bool, SurveyError> {
        let mut state = self.state.write().await;
        let Some(user) = state
            .users
            .values_mut()
            .find(|u| u.email.eq_ignore_ascii_case(email))
        else {
            return Ok(false);
        };
        user.credential = Some(token.to_string());
        Ok(true)
    }

    async fn assign_awaiting(
        &self,
        id: UserId,
        event: EventId,
        policy: SlotPolicy,
        capacity: usize,
    ) -> Result<Vec<EventId>, SurveyError> {
        let mut state = self.state.write().await;
        Ok(state.user_mut(id)?.awaiting.assign(event, policy, capacity))
    }

    async fn release_awaiting(&self, id: UserId, event: EventId) -> Result<bool, SurveyError> {
        let mut state = self.state.write().await;
        Ok(state.user_mut(id)?.awaiting.release(event))
    }
}

#[async_trait]
impl SurveyStore for MemoryStore {
    async fn event(&self, id: EventId) -> Result<Option<Event>, SurveyError> {
        Ok(self.state.read().await.events.get(&id).cloned())
    }

    async fn upsert_event(&self, new: &NewEvent) -> Result<Registered, SurveyError> {
        let mut state = self.state.write().await;
        let num_attendees = i32::try_from(new.attendees.len()).unwrap_or(i32::MAX);

        if let Some(event) = state
            .events
            .values_mut()
            .find(|e| e.calendar_event_id == new.calendar_event_id)
        {
            event.name.clone_from(&new.name);
            event.organizer_id = new.organizer_id;
            event.organizer_email.clone_from(&new.organizer_email);
            event.start_at = new.start_at;
            event.end_at = new.end_at;
            event.num_attendees = num_attendees;
            event.description.clone_from(&new.description);
            return Ok(Registered {
                event_id: event.id,
                created: false,
            });
        }

        state.last_event_id = state.last_event_id.saturating_add(1);
        let id = EventId::new(state.last_event_id);
        state.events.insert(
            id,
            Event {
                id,
                calendar_event_id: new.calendar_event_id.clone(),
                name: new.name.clone(),
                organizer_id: new.organizer_id,
                organizer_email: new.organizer_email.clone(),
                start_at: new.start_at,
                end_at: new.end_at,
                num_attendees,
                description: new.description.clone(),
                should_send_survey: true,
                questions_sent: false,
                results_sent: false,
            },
        );
        Ok(Registered {
            event_id: id,
            created: true,
        })
    }

    async fn save_event_details(
        &self,
        id: EventId,
        details: &EventDetails,
    ) -> Result<(), SurveyError> {
        let mut state = self.state.write().await;
        if !state.events.contains_key(&id) {
            return Err(SurveyError::EventNotFound(id));
        }
        state.details.insert(id, details.clone());
        Ok(())
    }

    async fn pending_question_events(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventId>, SurveyError> {
        let state = self.state.read().await;
        Ok(state
            .events
            .values()
            .filter(|e| Stage::Questions.is_open(e) && e.end_at <= now)
            .map(|e| e.id)
            .collect())
    }

    async fn pending_result_events(&self) -> Result<Vec<EventId>, SurveyError> {
        let state = self.state.read().await;
        Ok(state
            .events
            .values()
            .filter(|e| Stage::Results.is_open(e))
            .map(|e| e.id)
            .collect())
    }

    async fn claim_event(
        &self,
        id: EventId,
        stage: Stage,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<Event>, SurveyError> {
        let mut state = self.state.write().await;
        let event = state
            .events
            .get(&id)
            .cloned()
            .ok_or(SurveyError::EventNotFound(id))?;
        if !stage.is_open(&event) {
            return Ok(None);
        }
        if state.claims.get(&id).is_some_and(|until| *until > now) {
            return Ok(None);
        }
        state.claims.insert(id, lease_until);
        Ok(Some(event))
    }

    async fn renew_claim(
        &self,
        id: EventId,
        held_until: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, SurveyError> {
        let mut state = self.state.write().await;
        match state.claims.get_mut(&id) {
            Some(until) if *until == held_until => {
                *until = lease_until;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_claim(
        &self,
        id: EventId,
        held_until: DateTime<Utc>,
    ) -> Result<(), SurveyError> {
        let mut state = self.state.write().await;
        if state.claims.get(&id) == Some(&held_until) {
            state.claims.remove(&id);
        }
        Ok(())
    }

    async fn finish_stage(&self, id: EventId, stage: Stage) -> Result<(), SurveyError> {
        let mut state = self.state.write().await;
        let event = state.event_mut(id)?;
        match stage {
            Stage::Questions => event.questions_sent = true,
            Stage::Results => event.results_sent = true,
        }
        state.claims.remove(&id);
        Ok(())
    }

    async fn mark_not_surveyable(&self, id: EventId) -> Result<(), SurveyError> {
        let mut state = self.state.write().await;
        state.event_mut(id)?.should_send_survey = false;
        state.claims.remove(&id);
        Ok(())
    }

    async fn upsert_response(
        &self,
        event: EventId,
        user: UserId,
        rating: Rating,
    ) -> Result<UpsertKind, SurveyError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .responses
            .iter_mut()
            .find(|r| r.event_id == event && r.user_id == user)
        {
            existing.rating = rating;
            return Ok(UpsertKind::Updated);
        }
        state.responses.push(SurveyResponse {
            event_id: event,
            user_id: user,
            rating,
            created_at: Utc::now(),
        });
        Ok(UpsertKind::Inserted)
    }

    async fn responses_for(&self, event: EventId) -> Result<Vec<SurveyResponse>, SurveyError> {
        let state = self.state.read().await;
        Ok(state
            .responses
            .iter()
            .filter(|r| r.event_id == event)
            .cloned()
            .collect())
    }

    async fn response_count(&self, event: EventId) -> Result<usize, SurveyError> {
        let state = self.state.read().await;
        Ok(state.responses.iter().filter(|r| r.event_id == event).count())
    }
}

#[async_trait]
impl CalendarSource for MemoryStore {
    async fn event_details(&self, event: &Event) -> Result<EventDetails, SurveyError> {
        let state = self.state.read().await;
        state.details.get(&event.id).cloned().ok_or_else(|| {
            SurveyError::Calendar(format!(
                "no attendee snapshot for event {}",
                event.calendar_event_id
            ))
        })
    }
}
