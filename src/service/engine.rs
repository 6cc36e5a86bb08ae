//! The survey lifecycle engine.
//!
//! [`SurveyEngine`] drives every transition: the periodic [`sweep`],
//! inbound chat messages ([`handle_message`]) and calendar ingestion
//! ([`register_event`]). Each external trigger is idempotent; the stage
//! claims in the store keep concurrent triggers from duplicating sends.
//!
//! [`sweep`]: SurveyEngine::sweep
//! [`handle_message`]: SurveyEngine::handle_message
//! [`register_event`]: SurveyEngine::register_event

use std::future::Future;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::SurveyConfig;
use crate::domain::intent::classify;
use crate::domain::{Command, Event, EventBus, EventId, Intent, NewEvent, messages};
use crate::error::SurveyError;
use crate::persistence::DirectoryMember;

use super::{
    AggregateOutcome, Collaborators, CompletionPolicy, DirectoryService, DispatchOutcome,
    IngestOutcome, QuestionDispatcher, ResponseCollector, ResultsAggregator, SurveyContext,
};

/// Summary of one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepReport {
    /// Correlates the sweep's log lines.
    pub run_id: Uuid,
    /// Events whose questions went out.
    pub dispatched: Vec<EventId>,
    /// Events marked not surveyable.
    pub ineligible: Vec<EventId>,
    /// Events whose results were reported.
    pub reported: Vec<EventId>,
    /// Events whose results were abandoned (unresolved organizer).
    pub abandoned: Vec<EventId>,
    /// Events still waiting for responses.
    pub awaiting: Vec<EventId>,
    /// Events whose processing failed; retried on a later sweep.
    pub failed: Vec<EventId>,
}

impl SweepReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            dispatched: Vec::new(),
            ineligible: Vec::new(),
            reported: Vec::new(),
            abandoned: Vec::new(),
            awaiting: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// What an inbound message did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    /// The user opted out.
    OptedOut,
    /// The user opted back in.
    OptedIn,
    /// A greeting was sent.
    Greeted,
    /// A rating was ingested.
    Rating {
        /// Collector result.
        result: IngestOutcome,
    },
    /// The text matched nothing; an explanation was sent.
    Unknown,
}

/// Result of calendar ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Registration {
    /// The event starts beyond the lookahead window.
    Ignored,
    /// The event was stored.
    Registered {
        /// Row id of the event.
        event_id: EventId,
        /// `false` when an existing event was refreshed.
        created: bool,
        /// Whether the organizer was briefed.
        briefed: bool,
    },
}

/// Entry point to the survey lifecycle.
#[derive(Debug, Clone)]
pub struct SurveyEngine {
    ctx: SurveyContext,
    dispatcher: QuestionDispatcher,
    collector: ResponseCollector,
    completion: CompletionPolicy,
    aggregator: ResultsAggregator,
    directory: DirectoryService,
}

impl SurveyEngine {
    /// Builds the engine and its components.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Config`] if `config` fails validation.
    pub fn new(
        collab: Collaborators,
        config: SurveyConfig,
        bus: EventBus,
    ) -> Result<Self, SurveyError> {
        config.validate()?;
        let ctx = SurveyContext::new(collab, config, bus);
        Ok(Self {
            dispatcher: QuestionDispatcher::new(ctx.clone()),
            collector: ResponseCollector::new(ctx.clone()),
            completion: CompletionPolicy::new(ctx.clone()),
            aggregator: ResultsAggregator::new(ctx.clone()),
            directory: DirectoryService::new(ctx.clone()),
            ctx,
        })
    }

    /// Lifecycle event bus.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        self.ctx.bus()
    }

    /// Survey settings.
    #[must_use]
    pub fn config(&self) -> &SurveyConfig {
        self.ctx.config()
    }

    /// Dispatches questions for every ended, still-open event, then
    /// re-checks events waiting for results.
    ///
    /// A failing event is logged and listed in [`SweepReport::failed`]; it
    /// never aborts the sweep.
    ///
    /// # Errors
    ///
    /// Returns a store error only when the pending lists cannot be loaded.
    pub async fn sweep(&self) -> Result<SweepReport, SurveyError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("sweep", %run_id);
        self.detached(move |engine| async move { engine.run_sweep(run_id).await }.instrument(span))
            .await
    }

    /// Runs one unit of work on its own task. Dropping the caller (a
    /// timed-out request, a disconnected client) leaves the unit running
    /// to completion, so a stage is never left half-sent.
    async fn detached<T, F, Fut>(&self, unit: F) -> Result<T, SurveyError>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T, SurveyError>> + Send + 'static,
        T: Send + 'static,
    {
        tokio::spawn(unit(self.clone()))
            .await
            .map_err(|e| SurveyError::Internal(format!("survey task failed: {e}")))?
    }

    async fn run_sweep(&self, run_id: Uuid) -> Result<SweepReport, SurveyError> {
        let mut report = SweepReport::new(run_id);
        let store = self.ctx.store();

        for event_id in store.pending_question_events(Utc::now()).await? {
            match self.dispatcher.dispatch(event_id).await {
                Ok(DispatchOutcome::Dispatched(_)) => report.dispatched.push(event_id),
                Ok(DispatchOutcome::Ineligible { .. }) => report.ineligible.push(event_id),
                Ok(DispatchOutcome::Skipped) => {}
                Err(e) => {
                    tracing::warn!(%event_id, error = %e, "dispatch failed");
                    report.failed.push(event_id);
                }
            }
        }

        for event_id in store.pending_result_events().await? {
            match self.check_results(event_id).await {
                Ok(Some(AggregateOutcome::Reported { .. })) => report.reported.push(event_id),
                Ok(Some(AggregateOutcome::UnresolvedOrganizer)) => report.abandoned.push(event_id),
                Ok(Some(AggregateOutcome::NoResponses) | None) => report.awaiting.push(event_id),
                Ok(Some(AggregateOutcome::Skipped)) => {}
                Err(e) => {
                    tracing::warn!(%event_id, error = %e, "results check failed");
                    report.failed.push(event_id);
                }
            }
        }

        tracing::info!(
            dispatched = report.dispatched.len(),
            ineligible = report.ineligible.len(),
            reported = report.reported.len(),
            abandoned = report.abandoned.len(),
            failed = report.failed.len(),
            "sweep finished"
        );
        Ok(report)
    }

    /// Aggregates an event when its completion policy holds or its results
    /// deadline has passed. `None` when neither applies yet.
    async fn check_results(&self, event_id: EventId) -> Result<Option<AggregateOutcome>, SurveyError> {
        let event = self
            .ctx
            .store()
            .event(event_id)
            .await?
            .ok_or(SurveyError::EventNotFound(event_id))?;
        if !self.past_deadline(&event) && !self.completion.is_complete(&event).await? {
            return Ok(None);
        }
        self.aggregator.aggregate(event_id).await.map(Some)
    }

    fn past_deadline(&self, event: &Event) -> bool {
        self.config().results_deadline_hours.is_some_and(|hours| {
            let hours = i64::try_from(hours).unwrap_or(i64::MAX);
            Duration::try_hours(hours)
                .and_then(|d| event.end_at.checked_add_signed(d))
                .is_some_and(|deadline| deadline <= Utc::now())
        })
    }

    /// Handles one inbound chat message from `identity`.
    ///
    /// Commands take precedence over ratings. Anything else gets an
    /// explanation, but only when the sender is in the directory.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::UserNotFound`] for commands or ratings from an
    /// unknown identity, or a store, channel or timeout error.
    pub async fn handle_message(
        &self,
        identity: &str,
        text: &str,
    ) -> Result<MessageOutcome, SurveyError> {
        let correlation_id = Uuid::new_v4();
        let span = tracing::info_span!("message", %correlation_id, identity);
        let (identity, text) = (identity.to_string(), text.to_string());
        self.detached(move |engine| {
            async move { engine.route_message(&identity, &text).await }.instrument(span)
        })
        .await
    }

    async fn route_message(&self, identity: &str, text: &str) -> Result<MessageOutcome, SurveyError> {
        match classify(text) {
            Intent::Command(Command::OptOut) => {
                self.directory.opt_out(identity).await?;
                Ok(MessageOutcome::OptedOut)
            }
            Intent::Command(Command::OptIn) => {
                self.directory.opt_in(identity).await?;
                Ok(MessageOutcome::OptedIn)
            }
            Intent::Command(Command::Greet) => {
                self.directory.greet(identity).await?;
                Ok(MessageOutcome::Greeted)
            }
            Intent::Rating(_) => {
                let result = self.ingest_attached(identity, text).await?;
                Ok(MessageOutcome::Rating { result })
            }
            Intent::Unknown(token) => {
                if self.ctx.store().user_by_identity(identity).await?.is_none() {
                    tracing::debug!("unknown text from an identity outside the directory");
                    return Ok(MessageOutcome::Unknown);
                }
                self.ctx.send(identity, &messages::unknown_text(&token)).await?;
                Ok(MessageOutcome::Unknown)
            }
        }
    }

    /// Passes a reply to the collector and tells the user when it could
    /// not be used.
    ///
    /// # Errors
    ///
    /// Same as [`ResponseCollector::ingest`], plus the reply's send error.
    pub async fn ingest(&self, identity: &str, text: &str) -> Result<IngestOutcome, SurveyError> {
        let (identity, text) = (identity.to_string(), text.to_string());
        self.detached(move |engine| async move { engine.ingest_attached(&identity, &text).await })
            .await
    }

    async fn ingest_attached(
        &self,
        identity: &str,
        text: &str,
    ) -> Result<IngestOutcome, SurveyError> {
        let outcome = self.collector.ingest(identity, text).await?;
        let reply = match outcome {
            IngestOutcome::NoPendingSurvey => Some(messages::NO_PENDING_SURVEY),
            IngestOutcome::UnrecognizedResponse => Some(messages::UNRECOGNIZED_RESPONSE),
            IngestOutcome::Recorded { .. } => None,
        };
        if let Some(reply) = reply {
            self.ctx.send(identity, reply).await?;
        }
        Ok(outcome)
    }

    /// Stores a calendar event pushed by ingestion.
    ///
    /// Events starting beyond the lookahead window are ignored. The
    /// organizer is resolved by email when no id is given, lifecycle flags
    /// of a known event are preserved, and the organizer is briefed the
    /// first time the event is seen.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::InvalidRequest`] when the event ends before it
    /// starts, or a store error.
    pub async fn register_event(&self, mut event: NewEvent) -> Result<Registration, SurveyError> {
        if event.end_at < event.start_at {
            return Err(SurveyError::InvalidRequest(format!(
                "event {} ends before it starts",
                event.calendar_event_id
            )));
        }
        let horizon = Utc::now().checked_add_signed(Duration::days(i64::from(
            self.config().lookahead_days,
        )));
        if horizon.is_some_and(|horizon| event.start_at > horizon) {
            tracing::debug!(calendar_event_id = %event.calendar_event_id, "beyond lookahead window");
            return Ok(Registration::Ignored);
        }

        let store = self.ctx.store();
        if event.organizer_id.is_none() {
            event.organizer_id = store
                .user_by_email(&event.organizer_email)
                .await?
                .map(|u| u.id);
        }
        let registered = store.upsert_event(&event).await?;
        store
            .save_event_details(registered.event_id, &event.details())
            .await?;
        tracing::info!(
            event_id = %registered.event_id,
            created = registered.created,
            attendees = event.attendees.len(),
            "calendar event registered"
        );

        let mut briefed = false;
        if registered.created
            && let Some(stored) = store.event(registered.event_id).await?
        {
            briefed = self
                .directory
                .brief_organizer(&stored)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(event_id = %stored.id, error = %e, "organizer briefing failed");
                    false
                });
        }

        Ok(Registration::Registered {
            event_id: registered.event_id,
            created: registered.created,
            briefed,
        })
    }

    /// Creates users for new directory members.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn sync_directory(&self, members: &[DirectoryMember]) -> Result<usize, SurveyError> {
        self.directory.sync_directory(members).await
    }

    /// Stores a calendar credential for the user with `email`.
    ///
    /// # Errors
    ///
    /// See [`DirectoryService::record_credential`].
    pub async fn record_credential(&self, email: &str, token: &str) -> Result<(), SurveyError> {
        self.directory.record_credential(email, token).await
    }

    /// Dispatches questions for one event, ignoring whether it has ended.
    ///
    /// # Errors
    ///
    /// See [`QuestionDispatcher::dispatch`].
    pub async fn dispatch(&self, event_id: EventId) -> Result<DispatchOutcome, SurveyError> {
        self.detached(move |engine| async move { engine.dispatcher.dispatch(event_id).await })
            .await
    }
}
