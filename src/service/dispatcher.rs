//! Sends survey questions for an ended event, exactly once.

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{Event, EventId, Stage, SurveyEvent, User, UserId, messages};
use crate::error::SurveyError;

use super::{Lease, SurveyContext, eligibility};

/// Recipients of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DispatchReport {
    /// Dispatched event.
    pub event_id: EventId,
    /// Users that received the question and now await it.
    pub sent: Vec<UserId>,
    /// Eligible users skipped because they opted out.
    pub opted_out: Vec<UserId>,
    /// Users whose send failed. They were not locked.
    pub failed: Vec<UserId>,
}

/// Result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Questions went out and the questions stage closed.
    Dispatched(DispatchReport),
    /// Too few eligible attendees; the event will never be surveyed.
    Ineligible {
        /// Eligible attendee count.
        eligible: usize,
        /// Configured threshold.
        min_surveyable: usize,
    },
    /// The stage is closed or another worker holds it.
    Skipped,
}

/// Sends survey questions to eligible attendees.
#[derive(Debug, Clone)]
pub struct QuestionDispatcher {
    ctx: SurveyContext,
}

impl QuestionDispatcher {
    /// Creates the dispatcher.
    #[must_use]
    pub fn new(ctx: SurveyContext) -> Self {
        Self { ctx }
    }

    /// Claims the questions stage of `event_id` and dispatches it.
    ///
    /// Errors release the claim. Per-recipient send failures are reported in
    /// [`DispatchReport::failed`] and do not stop the batch. The claim is
    /// renewed before every recipient, so a long batch keeps the event.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::EventNotFound`], [`SurveyError::ClaimLost`]
    /// when a renewal finds the event taken over, or a store, calendar or
    /// timeout error.
    pub async fn dispatch(&self, event_id: EventId) -> Result<DispatchOutcome, SurveyError> {
        let Some((event, mut lease)) = self.ctx.claim(event_id, Stage::Questions).await? else {
            return Ok(DispatchOutcome::Skipped);
        };
        let result = self.dispatch_claimed(&event, &mut lease).await;
        if result.is_err() {
            self.ctx.release(lease).await;
        }
        result
    }

    async fn dispatch_claimed(
        &self,
        event: &Event,
        lease: &mut Lease,
    ) -> Result<DispatchOutcome, SurveyError> {
        let store = self.ctx.store();
        let details = self.ctx.event_details(event).await?;
        let eligibility = eligibility::assess(&self.ctx, event, &details).await?;

        if !eligibility.verdict {
            let min_surveyable = self.ctx.config().min_surveyable;
            store.mark_not_surveyable(event.id).await?;
            let _ = self.ctx.bus().publish(SurveyEvent::EventMarkedIneligible {
                event_id: event.id,
                eligible: eligibility.eligible.len(),
                min_surveyable,
                timestamp: Utc::now(),
            });
            tracing::info!(
                event_id = %event.id,
                eligible = eligibility.eligible.len(),
                min_surveyable,
                "event not surveyable"
            );
            return Ok(DispatchOutcome::Ineligible {
                eligible: eligibility.eligible.len(),
                min_surveyable,
            });
        }

        let prompt = messages::survey_prompt(&details.title);
        let mut report = DispatchReport {
            event_id: event.id,
            sent: Vec::new(),
            opted_out: Vec::new(),
            failed: Vec::new(),
        };
        for user in &eligibility.eligible {
            if user.has_opted_out {
                report.opted_out.push(user.id);
                continue;
            }
            self.ctx.renew(lease).await?;
            match self.ask(user, event.id, &prompt).await {
                Ok(()) => report.sent.push(user.id),
                Err(e) => {
                    tracing::warn!(
                        event_id = %event.id,
                        user_id = %user.id,
                        error = %e,
                        "survey question not delivered"
                    );
                    report.failed.push(user.id);
                }
            }
        }

        store.finish_stage(event.id, Stage::Questions).await?;
        let _ = self.ctx.bus().publish(SurveyEvent::QuestionsDispatched {
            event_id: event.id,
            sent: report.sent.clone(),
            opted_out: report.opted_out.clone(),
            failed: report.failed.clone(),
            timestamp: Utc::now(),
        });
        tracing::info!(
            event_id = %event.id,
            sent = report.sent.len(),
            opted_out = report.opted_out.len(),
            failed = report.failed.len(),
            "survey questions dispatched"
        );
        Ok(DispatchOutcome::Dispatched(report))
    }

    /// Sends the prompt and, once delivered, locks the user on the event.
    async fn ask(&self, user: &User, event_id: EventId, prompt: &str) -> Result<(), SurveyError> {
        let config = self.ctx.config();
        let text = if user.has_credential() {
            prompt.to_string()
        } else {
            format!(
                "{prompt}{}",
                messages::onboarding_suffix(&config.onboarding_base_url)
            )
        };
        self.ctx.send(&user.messaging_id, &text).await?;

        let displaced = self
            .ctx
            .store()
            .assign_awaiting(user.id, event_id, config.slot_policy, config.pending_capacity)
            .await?;
        for abandoned in displaced {
            tracing::info!(
                user_id = %user.id,
                event_id = %abandoned,
                replaced_by = %event_id,
                "outstanding survey displaced"
            );
        }
        Ok(())
    }
}
