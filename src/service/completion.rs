//! Decides when an event has enough responses to report.

use crate::domain::{CompletionMode, Event};
use crate::error::SurveyError;

use super::{SurveyContext, eligibility};

/// Evaluates the configured [`CompletionMode`] for an event.
#[derive(Debug, Clone)]
pub struct CompletionPolicy {
    ctx: SurveyContext,
}

impl CompletionPolicy {
    /// Creates the policy.
    #[must_use]
    pub fn new(ctx: SurveyContext) -> Self {
        Self { ctx }
    }

    /// Returns `true` once `event` may be reported.
    ///
    /// `immediate` needs one response. `full_quorum` needs as many responses
    /// as there are eligible, non-opted-out attendees, recomputed from fresh
    /// calendar details; an empty quorum never completes.
    ///
    /// # Errors
    ///
    /// Returns a store, calendar or timeout error.
    pub async fn is_complete(&self, event: &Event) -> Result<bool, SurveyError> {
        let responses = self.ctx.store().response_count(event.id).await?;
        match self.ctx.config().completion_mode {
            CompletionMode::Immediate => Ok(responses >= 1),
            CompletionMode::FullQuorum => {
                let details = self.ctx.event_details(event).await?;
                let quorum = eligibility::assess(&self.ctx, event, &details)
                    .await?
                    .quorum();
                tracing::debug!(event_id = %event.id, responses, quorum, "quorum check");
                Ok(quorum > 0 && responses >= quorum)
            }
        }
    }
}
