//! Persistence layer: directory and survey storage.
//!
//! [`DirectoryStore`] covers users (identity, opt-out, credential, awaiting
//! slot). [`SurveyStore`] adds events, claims and responses. Two backends
//! implement both: [`postgres::PostgresStore`] for deployments and
//! [`memory::MemoryStore`] for tests and persistence-disabled runs.
//!
//! Flag transitions go through [`SurveyStore::claim_event`], an atomic
//! check-and-set that hands a stage of one event to exactly one caller
//! until the claim is finished, released or its lease runs out.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Event, EventDetails, EventId, NewEvent, Rating, SlotPolicy, Stage, SurveyResponse,
    UpsertKind, User, UserId,
};
use crate::error::SurveyError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// A workspace member reported by the messaging directory.
#[derive(Debug, Clone, serde::Deserialize, utoipa::ToSchema)]
pub struct DirectoryMember {
    /// Messaging identity.
    pub id: String,
    /// Profile email, if the member has one.
    #[serde(default)]
    pub email: Option<String>,
    /// Bot accounts are never surveyed.
    #[serde(default)]
    pub is_bot: bool,
    /// Deactivated accounts are never surveyed.
    #[serde(default)]
    pub deleted: bool,
}

impl DirectoryMember {
    /// Lower-cased email when the member can be surveyed at all.
    #[must_use]
    pub fn surveyable_email(&self) -> Option<String> {
        if self.is_bot || self.deleted {
            return None;
        }
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase)
    }
}

/// Result of registering a calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registered {
    /// Row id of the event.
    pub event_id: EventId,
    /// `true` when the event was not known before.
    pub created: bool,
}

/// Storage for directory users.
#[async_trait]
pub trait DirectoryStore: Send + Sync + std::fmt::Debug {
    /// Looks up a user by messaging identity.
    async fn user_by_identity(&self, messaging_id: &str) -> Result<Option<User>, SurveyError>;

    /// Looks up a user by row id.
    async fn user(&self, id: UserId) -> Result<Option<User>, SurveyError>;

    /// Looks up a user by email, case-insensitively.
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, SurveyError>;

    /// Returns the users whose email matches any of `emails`, case-insensitively.
    async fn users_by_emails(&self, emails: &[String]) -> Result<Vec<User>, SurveyError>;

    /// Creates a user unless the identity or email is already known.
    /// Returns `true` if a row was created.
    async fn insert_user(&self, messaging_id: &str, email: &str) -> Result<bool, SurveyError>;

    /// Sets the opt-out flag.
    async fn set_opted_out(&self, id: UserId, opted_out: bool) -> Result<(), SurveyError>;

    /// Stores a calendar credential for the user with `email`.
    /// Returns `false` if no such user exists.
    async fn set_credential(&self, email: &str, token: &str) -> Result<bool, SurveyError>;

    /// Assigns `event` to the user's awaiting slot under `policy`, as one
    /// atomic read-modify-write. Returns the displaced events.
    async fn assign_awaiting(
        &self,
        id: UserId,
        event: EventId,
        policy: SlotPolicy,
        capacity: usize,
    ) -> Result<Vec<EventId>, SurveyError>;

    /// Removes `event` from the user's awaiting slot. Returns `false` if it
    /// was not there.
    async fn release_awaiting(&self, id: UserId, event: EventId) -> Result<bool, SurveyError>;
}

/// Storage for events, claims and responses.
#[async_trait]
pub trait SurveyStore: DirectoryStore {
    /// Loads an event.
    async fn event(&self, id: EventId) -> Result<Option<Event>, SurveyError>;

    /// Inserts an event, or refreshes its calendar fields when the
    /// calendar id is already known. Lifecycle flags are never touched.
    async fn upsert_event(&self, event: &NewEvent) -> Result<Registered, SurveyError>;

    /// Replaces the attendee snapshot served as calendar details.
    async fn save_event_details(
        &self,
        id: EventId,
        details: &EventDetails,
    ) -> Result<(), SurveyError>;

    /// Events with the questions stage open that ended at or before `now`.
    async fn pending_question_events(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventId>, SurveyError>;

    /// Events with questions sent and the results stage open.
    async fn pending_result_events(&self) -> Result<Vec<EventId>, SurveyError>;

    /// Atomically claims `stage` of an event.
    ///
    /// Succeeds only if the stage is still open and no unexpired claim is
    /// held; the claim then lasts until `lease_until`. Returns the event on
    /// success and `None` otherwise.
    async fn claim_event(
        &self,
        id: EventId,
        stage: Stage,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<Event>, SurveyError>;

    /// Extends a claim still held until `held_until` so that it lasts until
    /// `lease_until`. Returns `false` when the claim expired and was taken
    /// over, or was released.
    async fn renew_claim(
        &self,
        id: EventId,
        held_until: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, SurveyError>;

    /// Drops the claim held until `held_until` without closing the stage.
    /// A claim taken over by another worker is left alone.
    async fn release_claim(&self, id: EventId, held_until: DateTime<Utc>)
    -> Result<(), SurveyError>;

    /// Closes `stage` (sets its flag) and drops the claim.
    async fn finish_stage(&self, id: EventId, stage: Stage) -> Result<(), SurveyError>;

    /// Records a negative eligibility verdict and drops the claim.
    async fn mark_not_surveyable(&self, id: EventId) -> Result<(), SurveyError>;

    /// Inserts or overwrites the (event, user) response.
    async fn upsert_response(
        &self,
        event: EventId,
        user: UserId,
        rating: Rating,
    ) -> Result<UpsertKind, SurveyError>;

    /// Responses for an event in arrival order.
    async fn responses_for(&self, event: EventId) -> Result<Vec<SurveyResponse>, SurveyError>;

    /// Number of responses for an event.
    async fn response_count(&self, event: EventId) -> Result<usize, SurveyError>;
}
