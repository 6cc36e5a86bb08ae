//! Inbound chat messages from the Slack Events API.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{MessageAck, SlackEnvelope};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, SurveyError};

/// `POST /messages`: Slack event subscription endpoint.
///
/// # Errors
///
/// Returns [`SurveyError`] when the engine fails to handle the message,
/// e.g. a rating from an identity the directory does not know.
#[utoipa::path(
    post,
    path = "/api/v1/messages",
    tag = "Messages",
    summary = "Receive a chat message",
    description = "Answers `url_verification` challenges and routes direct messages to the engine: opt-out and opt-in commands, greetings, and survey ratings. Bot echoes and edited messages are acknowledged and ignored.",
    request_body = SlackEnvelope,
    responses(
        (status = 200, description = "Envelope handled", body = MessageAck),
        (status = 404, description = "Unknown sender", body = ErrorResponse),
        (status = 502, description = "Reply could not be delivered", body = ErrorResponse),
    )
)]
pub async fn receive_message(
    State(state): State<AppState>,
    Json(envelope): Json<SlackEnvelope>,
) -> Result<Json<MessageAck>, SurveyError> {
    match envelope {
        SlackEnvelope::UrlVerification { challenge } => Ok(Json(MessageAck::challenge(challenge))),
        SlackEnvelope::EventCallback { event } => {
            let Some((identity, text)) = event.human_message() else {
                return Ok(Json(MessageAck::ignored()));
            };
            let outcome = state.engine.handle_message(identity, text).await?;
            Ok(Json(MessageAck::handled(outcome)))
        }
    }
}

/// Message routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/messages", post(receive_message))
}
