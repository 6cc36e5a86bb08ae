//! Slack Events API envelopes.
//!
//! Only the fields the engine reads are modelled; everything else in the
//! payload is ignored.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::service::MessageOutcome;

/// Request body for `POST /messages`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEnvelope {
    /// Endpoint ownership check sent when the subscription is configured.
    UrlVerification {
        /// Value to echo back.
        challenge: String,
    },
    /// A subscribed workspace event.
    EventCallback {
        /// The inner event.
        event: SlackMessageEvent,
    },
}

/// Inner event of an `event_callback` envelope.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SlackMessageEvent {
    /// Event kind, `"message"` for direct messages.
    #[serde(rename = "type")]
    pub kind: String,
    /// Sender identity. Absent for some system messages.
    #[serde(default)]
    pub user: Option<String>,
    /// Message text.
    #[serde(default)]
    pub text: Option<String>,
    /// Set when the message was posted by a bot, including this one.
    #[serde(default)]
    pub bot_id: Option<String>,
    /// Set for edits, joins and other non-plain messages.
    #[serde(default)]
    pub subtype: Option<String>,
}

impl SlackMessageEvent {
    /// Sender and text of a plain message typed by a person.
    #[must_use]
    pub fn human_message(&self) -> Option<(&str, &str)> {
        if self.kind != "message" || self.bot_id.is_some() || self.subtype.is_some() {
            return None;
        }
        Some((self.user.as_deref()?, self.text.as_deref().unwrap_or_default()))
    }
}

/// Response body for `POST /messages`.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageAck {
    /// Echoed verification challenge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    /// What the engine did with the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MessageOutcome>,
    /// `true` when the event was not a message from a person.
    pub ignored: bool,
}

impl MessageAck {
    /// Reply to a `url_verification` envelope.
    #[must_use]
    pub fn challenge(challenge: String) -> Self {
        Self {
            challenge: Some(challenge),
            result: None,
            ignored: false,
        }
    }

    /// Reply for a handled message.
    #[must_use]
    pub fn handled(outcome: MessageOutcome) -> Self {
        Self {
            challenge: None,
            result: Some(outcome),
            ignored: false,
        }
    }

    /// Reply for an event the engine does not act on.
    #[must_use]
    pub fn ignored() -> Self {
        Self {
            challenge: None,
            result: None,
            ignored: true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn callback(json: &str) -> SlackMessageEvent {
        let Ok(SlackEnvelope::EventCallback { event }) = serde_json::from_str(json) else {
            panic!("expected an event callback");
        };
        event
    }

    #[test]
    fn plain_message_yields_sender_and_text() {
        let event = callback(
            r#"{"type":"event_callback","team_id":"T1","event":{"type":"message","user":"U1","text":"yes","channel":"D1"}}"#,
        );
        assert_eq!(event.human_message(), Some(("U1", "yes")));
    }

    #[test]
    fn bot_echo_and_edits_are_skipped() {
        let bot = callback(
            r#"{"type":"event_callback","event":{"type":"message","user":"U1","text":"hi","bot_id":"B1"}}"#,
        );
        assert_eq!(bot.human_message(), None);
        let edit = callback(
            r#"{"type":"event_callback","event":{"type":"message","subtype":"message_changed"}}"#,
        );
        assert_eq!(edit.human_message(), None);
    }

    #[test]
    fn url_verification_parses() {
        let Ok(SlackEnvelope::UrlVerification { challenge }) =
            serde_json::from_str::<SlackEnvelope>(r#"{"type":"url_verification","token":"t","challenge":"abc"}"#)
        else {
            panic!("expected url_verification");
        };
        assert_eq!(challenge, "abc");
    }
}
