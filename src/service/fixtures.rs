//! Shared wiring for service tests.

#![allow(clippy::panic)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::channels::{CalendarSource, Notifier, OutboxNotifier};
use crate::config::SurveyConfig;
use crate::domain::{Attendee, Event, EventBus, EventId, NewEvent, RsvpStatus, User};
use crate::error::SurveyError;
use crate::persistence::{DirectoryStore, MemoryStore, SurveyStore};

use super::{Collaborators, SurveyContext, SurveyEngine};

/// Outbox that can be told to reject some recipients.
#[derive(Debug, Default)]
pub(crate) struct TestNotifier {
    outbox: OutboxNotifier,
    unreachable: RwLock<HashSet<String>>,
    delay: RwLock<std::time::Duration>,
}

impl TestNotifier {
    pub(crate) async fn reject(&self, identity: &str) {
        self.unreachable.write().await.insert(identity.to_string());
    }

    /// Every later send sleeps `delay` before it is accepted.
    pub(crate) async fn slow_down(&self, delay: std::time::Duration) {
        *self.delay.write().await = delay;
    }

    pub(crate) async fn accept(&self, identity: &str) {
        self.unreachable.write().await.remove(identity);
    }

    pub(crate) async fn messages_for(&self, identity: &str) -> Vec<String> {
        self.outbox.messages_for(identity).await
    }

    pub(crate) async fn total(&self) -> usize {
        self.outbox.messages().await.len()
    }
}

#[async_trait]
impl Notifier for TestNotifier {
    async fn send(&self, identity: &str, text: &str) -> Result<(), SurveyError> {
        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.read().await.contains(identity) {
            return Err(SurveyError::Notification(format!("{identity} unreachable")));
        }
        self.outbox.send(identity, text).await
    }
}

/// A memory store, a test notifier, and an engine over both.
#[derive(Debug)]
pub(crate) struct Harness {
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) notifier: Arc<TestNotifier>,
    pub(crate) ctx: SurveyContext,
    pub(crate) engine: SurveyEngine,
}

impl Harness {
    pub(crate) fn new(config: SurveyConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_calendar(config, Arc::<MemoryStore>::clone(&store), store)
    }

    pub(crate) fn with_calendar(
        config: SurveyConfig,
        store: Arc<MemoryStore>,
        calendar: Arc<dyn CalendarSource>,
    ) -> Self {
        let notifier = Arc::new(TestNotifier::default());
        let store_dyn: Arc<dyn SurveyStore> = Arc::<MemoryStore>::clone(&store);
        let notifier_dyn: Arc<dyn Notifier> = Arc::<TestNotifier>::clone(&notifier);
        let collab = Collaborators {
            store: store_dyn,
            calendar,
            notifier: notifier_dyn,
        };
        let bus = EventBus::new(64);
        let ctx = SurveyContext::new(collab.clone(), config.clone(), bus.clone());
        let Ok(engine) = SurveyEngine::new(collab, config, bus) else {
            panic!("test config should validate");
        };
        Self {
            store,
            notifier,
            ctx,
            engine,
        }
    }

    pub(crate) async fn add_user(&self, identity: &str, email: &str) -> User {
        let Ok(true) = self.store.insert_user(identity, email).await else {
            panic!("user {identity} not inserted");
        };
        self.user(identity).await
    }

    pub(crate) async fn add_user_with_credential(&self, identity: &str, email: &str) -> User {
        self.add_user(identity, email).await;
        let Ok(true) = self.store.set_credential(email, "refresh-token").await else {
            panic!("credential not stored");
        };
        self.user(identity).await
    }

    pub(crate) async fn opt_out(&self, user: &User) {
        let Ok(()) = self.store.set_opted_out(user.id, true).await else {
            panic!("opt-out not stored");
        };
    }

    pub(crate) async fn user(&self, identity: &str) -> User {
        let Ok(Some(user)) = self.store.user_by_identity(identity).await else {
            panic!("user {identity} missing");
        };
        user
    }

    /// Stores an event that ended an hour ago, bypassing ingestion.
    pub(crate) async fn add_event(
        &self,
        calendar_id: &str,
        organizer_email: &str,
        attendees: &[(&str, RsvpStatus)],
    ) -> EventId {
        let new = ended_event(calendar_id, organizer_email, attendees);
        let Ok(registered) = self.store.upsert_event(&new).await else {
            panic!("event not stored");
        };
        let Ok(()) = self
            .store
            .save_event_details(registered.event_id, &new.details())
            .await
        else {
            panic!("details not stored");
        };
        registered.event_id
    }

    pub(crate) async fn event(&self, id: EventId) -> Event {
        let Ok(Some(event)) = self.store.event(id).await else {
            panic!("event {id} missing");
        };
        event
    }
}

pub(crate) fn ended_event(
    calendar_id: &str,
    organizer_email: &str,
    attendees: &[(&str, RsvpStatus)],
) -> NewEvent {
    let start = Utc::now() - Duration::hours(2);
    NewEvent {
        calendar_event_id: calendar_id.to_string(),
        name: format!("Meeting {calendar_id}"),
        organizer_email: organizer_email.to_string(),
        organizer_id: None,
        start_at: start,
        end_at: start + Duration::hours(1),
        description: None,
        attendees: attendees
            .iter()
            .map(|(email, status)| Attendee {
                email: (*email).to_string(),
                response_status: *status,
            })
            .collect(),
    }
}

/// Non-organizer mode with a threshold of one, reporting immediately.
pub(crate) fn permissive() -> SurveyConfig {
    SurveyConfig {
        min_surveyable: 1,
        ..SurveyConfig::default()
    }
}
