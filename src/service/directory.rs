//! Directory membership, opt-out state, credentials and greetings.

use crate::domain::{Event, User, messages};
use crate::error::SurveyError;
use crate::persistence::DirectoryMember;

use super::SurveyContext;

/// User-facing directory operations.
#[derive(Debug, Clone)]
pub struct DirectoryService {
    ctx: SurveyContext,
}

impl DirectoryService {
    /// Creates the service.
    #[must_use]
    pub fn new(ctx: SurveyContext) -> Self {
        Self { ctx }
    }

    /// Creates users for new surveyable members. Returns how many were
    /// created.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn sync_directory(&self, members: &[DirectoryMember]) -> Result<usize, SurveyError> {
        let mut created = 0_usize;
        for member in members {
            let Some(email) = member.surveyable_email() else {
                continue;
            };
            if self.ctx.store().insert_user(&member.id, &email).await? {
                created = created.saturating_add(1);
            }
        }
        tracing::info!(members = members.len(), created, "directory synced");
        Ok(created)
    }

    /// Stops surveys for `identity` and confirms.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::UserNotFound`], a store error, or the
    /// confirmation's send error.
    pub async fn opt_out(&self, identity: &str) -> Result<(), SurveyError> {
        self.set_opted_out(identity, true, messages::OPT_OUT_CONFIRMATION)
            .await
    }

    /// Resumes surveys for `identity` and confirms.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::UserNotFound`], a store error, or the
    /// confirmation's send error.
    pub async fn opt_in(&self, identity: &str) -> Result<(), SurveyError> {
        self.set_opted_out(identity, false, messages::OPT_IN_CONFIRMATION)
            .await
    }

    async fn set_opted_out(
        &self,
        identity: &str,
        opted_out: bool,
        confirmation: &str,
    ) -> Result<(), SurveyError> {
        let user = self.ctx.user_by_identity(identity).await?;
        self.ctx.store().set_opted_out(user.id, opted_out).await?;
        tracing::info!(user_id = %user.id, opted_out, "survey preference changed");
        self.ctx.send(identity, confirmation).await
    }

    /// Replies to a greeting. Users without a calendar credential (and
    /// identities the directory does not know yet) also get the sign-up
    /// link.
    ///
    /// # Errors
    ///
    /// Returns a store or send error.
    pub async fn greet(&self, identity: &str) -> Result<(), SurveyError> {
        let has_credential = self
            .ctx
            .store()
            .user_by_identity(identity)
            .await?
            .is_some_and(|u| u.has_credential());
        let base = self.ctx.config().onboarding_base_url.as_str();
        let text = messages::greeting((!has_credential).then_some(base));
        self.ctx.send(identity, &text).await
    }

    /// Stores the calendar credential obtained by the external OAuth flow.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::InvalidRequest`] for an empty token and
    /// [`SurveyError::UserNotFound`] for an unknown email.
    pub async fn record_credential(&self, email: &str, token: &str) -> Result<(), SurveyError> {
        if token.trim().is_empty() {
            return Err(SurveyError::InvalidRequest(
                "credential token must not be empty".to_string(),
            ));
        }
        if !self.ctx.store().set_credential(email, token).await? {
            return Err(SurveyError::UserNotFound(email.to_string()));
        }
        tracing::info!(email, "calendar credential recorded");
        Ok(())
    }

    /// Sends the pre-meeting description hints to the organizer of `event`.
    /// Returns `true` if a briefing was sent.
    ///
    /// Only organizers that granted calendar access and did not opt out are
    /// briefed, and only when there is something to suggest.
    ///
    /// # Errors
    ///
    /// Returns a store or send error.
    pub async fn brief_organizer(&self, event: &Event) -> Result<bool, SurveyError> {
        let Some(organizer) = self.ctx.organizer(event).await? else {
            return Ok(false);
        };
        if !wants_briefing(&organizer) {
            return Ok(false);
        }
        let Some(text) = messages::organizer_briefing(&event.name, event.description.as_deref())
        else {
            return Ok(false);
        };
        self.ctx.send(&organizer.messaging_id, &text).await?;
        tracing::info!(event_id = %event.id, user_id = %organizer.id, "organizer briefed");
        Ok(true)
    }
}

fn wants_briefing(user: &User) -> bool {
    user.has_credential() && !user.has_opted_out
}
