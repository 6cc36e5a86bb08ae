//! Service layer: the survey lifecycle.
//!
//! [`SurveyEngine`] is the entry point. It owns one instance of each
//! component, all sharing a [`SurveyContext`]: the injected
//! [`Collaborators`], the [`SurveyConfig`] and the [`EventBus`].
//!
//! Stage transitions follow one discipline everywhere: claim the stage on
//! the store, do the external work, then finish the stage (closing it) or
//! release the claim (leaving it open for a later attempt).

pub mod aggregator;
pub mod collector;
pub mod completion;
pub mod directory;
pub mod dispatcher;
pub mod eligibility;
pub mod engine;

#[cfg(test)]
pub(crate) mod fixtures;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};

use crate::channels::{CalendarSource, Notifier};
use crate::config::SurveyConfig;
use crate::domain::{Event, EventBus, EventDetails, EventId, Stage, User};
use crate::error::SurveyError;
use crate::persistence::SurveyStore;

pub use aggregator::{AggregateOutcome, ResultsAggregator};
pub use collector::{IngestOutcome, ResponseCollector};
pub use completion::CompletionPolicy;
pub use directory::DirectoryService;
pub use dispatcher::{DispatchOutcome, DispatchReport, QuestionDispatcher};
pub use eligibility::Eligibility;
pub use engine::{MessageOutcome, Registration, SurveyEngine, SweepReport};

/// External collaborators injected into the engine.
#[derive(Debug, Clone)]
pub struct Collaborators {
    /// Durable storage for users, events and responses.
    pub store: Arc<dyn SurveyStore>,
    /// Source of extended event details.
    pub calendar: Arc<dyn CalendarSource>,
    /// Outbound chat channel.
    pub notifier: Arc<dyn Notifier>,
}

/// A stage claim held by the current worker. It expires at `until` unless
/// renewed through [`SurveyContext::renew`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    event_id: EventId,
    until: DateTime<Utc>,
}

/// State shared by every engine component.
#[derive(Debug, Clone)]
pub struct SurveyContext {
    collab: Collaborators,
    config: Arc<SurveyConfig>,
    bus: EventBus,
}

impl SurveyContext {
    /// Bundles collaborators, settings and the event bus.
    #[must_use]
    pub fn new(collab: Collaborators, config: SurveyConfig, bus: EventBus) -> Self {
        Self {
            collab,
            config: Arc::new(config),
            bus,
        }
    }

    /// The survey store.
    #[must_use]
    pub fn store(&self) -> &dyn SurveyStore {
        self.collab.store.as_ref()
    }

    /// Survey settings.
    #[must_use]
    pub fn config(&self) -> &SurveyConfig {
        &self.config
    }

    /// Lifecycle event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Fetches calendar details within the external-call bound.
    ///
    /// # Errors
    ///
    /// Returns the calendar's error, or [`SurveyError::Timeout`].
    pub async fn event_details(&self, event: &Event) -> Result<EventDetails, SurveyError> {
        bounded(
            "calendar fetch",
            self.config.external_timeout(),
            self.collab.calendar.event_details(event),
        )
        .await
    }

    /// Sends a chat message within the external-call bound.
    ///
    /// # Errors
    ///
    /// Returns the channel's error, or [`SurveyError::Timeout`].
    pub async fn send(&self, identity: &str, text: &str) -> Result<(), SurveyError> {
        bounded(
            "message send",
            self.config.external_timeout(),
            self.collab.notifier.send(identity, text),
        )
        .await
    }

    /// Claims `stage` of an event for one claim lease.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::EventNotFound`] or a store error.
    pub async fn claim(
        &self,
        id: EventId,
        stage: Stage,
    ) -> Result<Option<(Event, Lease)>, SurveyError> {
        let now = Utc::now();
        let until = self.lease_end(now);
        let event = self.store().claim_event(id, stage, now, until).await?;
        Ok(event.map(|event| (event, Lease { event_id: id, until })))
    }

    /// Extends `lease` by a full claim lease from now.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::ClaimLost`] when the lease expired and another
    /// worker took the event over, or a store error.
    pub async fn renew(&self, lease: &mut Lease) -> Result<(), SurveyError> {
        let until = self.lease_end(Utc::now());
        if !self
            .store()
            .renew_claim(lease.event_id, lease.until, until)
            .await?
        {
            return Err(SurveyError::ClaimLost(lease.event_id));
        }
        lease.until = until;
        Ok(())
    }

    /// Drops a claim after a failed or empty attempt. A failure to release
    /// is only logged: the lease expires on its own.
    pub async fn release(&self, lease: Lease) {
        if let Err(e) = self
            .store()
            .release_claim(lease.event_id, lease.until)
            .await
        {
            tracing::warn!(event_id = %lease.event_id, error = %e, "failed to release claim");
        }
    }

    /// Microsecond precision so the value round-trips through PostgreSQL.
    fn lease_end(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.config.claim_lease())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .trunc_subsecs(6)
    }

    /// Resolves an event's organizer by id, falling back to the organizer
    /// email.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn organizer(&self, event: &Event) -> Result<Option<User>, SurveyError> {
        if let Some(id) = event.organizer_id
            && let Some(user) = self.store().user(id).await?
        {
            return Ok(Some(user));
        }
        self.store().user_by_email(&event.organizer_email).await
    }

    /// Looks up a user by messaging identity.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::UserNotFound`] for an unknown identity.
    pub async fn user_by_identity(&self, identity: &str) -> Result<User, SurveyError> {
        self.store()
            .user_by_identity(identity)
            .await?
            .ok_or_else(|| SurveyError::UserNotFound(identity.to_string()))
    }
}

/// Runs `fut` with a deadline.
async fn bounded<T, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T, SurveyError>
where
    F: Future<Output = Result<T, SurveyError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| SurveyError::Timeout {
            operation,
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_times_out_slow_calls() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, SurveyError>(())
        };
        let result = bounded("test call", Duration::from_millis(10), slow).await;
        assert!(matches!(
            result,
            Err(SurveyError::Timeout {
                operation: "test call",
                after_ms: 10
            })
        ));
    }

    #[tokio::test]
    async fn bounded_passes_inner_errors_through() {
        let failing = async { Err::<(), _>(SurveyError::Calendar("down".to_string())) };
        let result = bounded("test call", Duration::from_secs(1), failing).await;
        assert!(matches!(result, Err(SurveyError::Calendar(_))));
    }
}
