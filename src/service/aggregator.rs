//! Tallies responses and reports them to the organizer, exactly once.

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::response::tally;
use crate::domain::{
    AbandonReason, Event, EventId, Stage, SurveyEvent, TallyEntry, UserId, messages,
};
use crate::error::SurveyError;

use super::{Lease, SurveyContext};

/// Result of one aggregation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AggregateOutcome {
    /// The summary was sent and the results stage closed.
    Reported {
        /// Recipient of the summary.
        organizer_id: UserId,
        /// Counts by descending frequency.
        tally: Vec<TallyEntry>,
    },
    /// No responses yet; the stage stays open.
    NoResponses,
    /// The organizer is not in the directory; the stage was closed without
    /// a report.
    UnresolvedOrganizer,
    /// The stage is closed or another worker holds it.
    Skipped,
}

/// Reports survey results to organizers.
#[derive(Debug, Clone)]
pub struct ResultsAggregator {
    ctx: SurveyContext,
}

impl ResultsAggregator {
    /// Creates the aggregator.
    #[must_use]
    pub fn new(ctx: SurveyContext) -> Self {
        Self { ctx }
    }

    /// Claims the results stage of `event_id` and reports it.
    ///
    /// A failed send releases the claim so a later sweep retries.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::EventNotFound`], [`SurveyError::ClaimLost`],
    /// or a store, channel or timeout error.
    pub async fn aggregate(&self, event_id: EventId) -> Result<AggregateOutcome, SurveyError> {
        let Some((event, mut lease)) = self.ctx.claim(event_id, Stage::Results).await? else {
            return Ok(AggregateOutcome::Skipped);
        };
        let result = self.report(&event, &mut lease).await;
        if result.is_err() {
            self.ctx.release(lease).await;
        }
        result
    }

    async fn report(
        &self,
        event: &Event,
        lease: &mut Lease,
    ) -> Result<AggregateOutcome, SurveyError> {
        let store = self.ctx.store();

        let Some(organizer) = self.ctx.organizer(event).await? else {
            store.finish_stage(event.id, Stage::Results).await?;
            tracing::warn!(
                event_id = %event.id,
                organizer = %event.organizer_email,
                "organizer not in directory, results abandoned"
            );
            let _ = self.ctx.bus().publish(SurveyEvent::ResultsAbandoned {
                event_id: event.id,
                reason: AbandonReason::UnresolvedOrganizer,
                timestamp: Utc::now(),
            });
            return Ok(AggregateOutcome::UnresolvedOrganizer);
        };

        let responses = store.responses_for(event.id).await?;
        if responses.is_empty() {
            self.ctx.release(*lease).await;
            return Ok(AggregateOutcome::NoResponses);
        }

        let tally = tally(responses.iter().map(|r| r.rating));
        let summary = messages::results_summary(&event.name, &tally);
        self.ctx.renew(lease).await?;
        self.ctx.send(&organizer.messaging_id, &summary).await?;
        store.finish_stage(event.id, Stage::Results).await?;

        let _ = self.ctx.bus().publish(SurveyEvent::ResultsReported {
            event_id: event.id,
            organizer_id: organizer.id,
            tally: tally.clone(),
            timestamp: Utc::now(),
        });
        tracing::info!(event_id = %event.id, responses = responses.len(), "results reported");

        Ok(AggregateOutcome::Reported {
            organizer_id: organizer.id,
            tally,
        })
    }
}
