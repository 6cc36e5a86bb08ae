//! Maps free-text replies to the user's outstanding survey.

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::intent::normalize;
use crate::domain::{Event, EventId, Rating, Stage, SurveyEvent, UpsertKind, User, messages};
use crate::error::SurveyError;

use super::{AggregateOutcome, CompletionPolicy, ResultsAggregator, SurveyContext};

/// Result of ingesting one reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// The rating was stored and acknowledged.
    Recorded {
        /// Event the rating was assigned to.
        event_id: EventId,
        /// Stored rating.
        rating: Rating,
        /// Whether an earlier rating was overwritten.
        updated: bool,
        /// Aggregation triggered by this response, if any.
        results: Option<AggregateOutcome>,
    },
    /// The user has no outstanding survey. Nothing was stored.
    NoPendingSurvey,
    /// The text is not a rating. Nothing was stored; the slot is kept.
    UnrecognizedResponse,
}

/// Records ratings and triggers aggregation when complete.
#[derive(Debug, Clone)]
pub struct ResponseCollector {
    ctx: SurveyContext,
    completion: CompletionPolicy,
    aggregator: ResultsAggregator,
}

impl ResponseCollector {
    /// Creates the collector.
    #[must_use]
    pub fn new(ctx: SurveyContext) -> Self {
        Self {
            completion: CompletionPolicy::new(ctx.clone()),
            aggregator: ResultsAggregator::new(ctx.clone()),
            ctx,
        }
    }

    /// Ingests `raw_text` from `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::UserNotFound`] for an unknown identity,
    /// [`SurveyError::EventNotFound`] when the slot points at a missing
    /// event, or a store error.
    pub async fn ingest(&self, identity: &str, raw_text: &str) -> Result<IngestOutcome, SurveyError> {
        let user = self.ctx.user_by_identity(identity).await?;
        let Some(event_id) = user.awaiting.current(self.ctx.config().slot_policy) else {
            return Ok(IngestOutcome::NoPendingSurvey);
        };
        let Some(rating) = Rating::from_token(&normalize(raw_text)) else {
            return Ok(IngestOutcome::UnrecognizedResponse);
        };
        let event = self
            .ctx
            .store()
            .event(event_id)
            .await?
            .ok_or(SurveyError::EventNotFound(event_id))?;

        let kind = self
            .ctx
            .store()
            .upsert_response(event.id, user.id, rating)
            .await?;
        let updated = kind == UpsertKind::Updated;
        self.acknowledge(&user, &event, updated).await;

        let _ = self.ctx.bus().publish(SurveyEvent::ResponseRecorded {
            event_id: event.id,
            user_id: user.id,
            rating,
            updated,
            timestamp: Utc::now(),
        });
        tracing::info!(event_id = %event.id, user_id = %user.id, %rating, updated, "response recorded");

        if self.ctx.config().clear_on_resolve {
            self.ctx.store().release_awaiting(user.id, event.id).await?;
        }

        let results = self.complete_if_ready(&event).await;
        Ok(IngestOutcome::Recorded {
            event_id: event.id,
            rating,
            updated,
            results,
        })
    }

    async fn acknowledge(&self, user: &User, event: &Event, updated: bool) {
        let text = if updated {
            messages::ack_updated(&event.name)
        } else {
            messages::ack_new(&event.name)
        };
        if let Err(e) = self.ctx.send(&user.messaging_id, &text).await {
            tracing::warn!(user_id = %user.id, error = %e, "acknowledgment not delivered");
        }
    }

    /// Aggregates right away when the completion policy is satisfied.
    /// Failures are logged; the sweep re-checks pending results.
    async fn complete_if_ready(&self, event: &Event) -> Option<AggregateOutcome> {
        if !Stage::Results.is_open(event) {
            return None;
        }
        match self.completion.is_complete(event).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                tracing::warn!(event_id = %event.id, error = %e, "completion check failed");
                return None;
            }
        }
        match self.aggregator.aggregate(event.id).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(event_id = %event.id, error = %e, "aggregation failed");
                None
            }
        }
    }
}
