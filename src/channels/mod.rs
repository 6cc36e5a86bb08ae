//! Outbound collaborators: calendar details and chat delivery.
//!
//! Both are trait objects so the engine can be wired against Slack and the
//! store-backed calendar in production and against in-memory doubles in
//! tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::domain::{Event, EventDetails};
use crate::error::SurveyError;

/// Supplies extended event details on demand.
#[async_trait]
pub trait CalendarSource: Send + Sync + std::fmt::Debug {
    /// Title, description and attendee list (with RSVP status) of `event`.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Calendar`] when the details are unavailable.
    async fn event_details(&self, event: &Event) -> Result<EventDetails, SurveyError>;
}

/// Delivers a text message to a messaging identity. No delivery receipt.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Sends `text` to `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Notification`] when the channel rejects the
    /// message.
    async fn send(&self, identity: &str, text: &str) -> Result<(), SurveyError>;
}

#[derive(Debug, Deserialize)]
struct SlackReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// [`Notifier`] posting through the Slack Web API `chat.postMessage`.
pub struct SlackNotifier {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl std::fmt::Debug for SlackNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackNotifier")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl SlackNotifier {
    /// Creates a notifier for `api_url` (e.g. `https://slack.com/api`)
    /// authenticating with the bot `token`.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::Config`] if the HTTP client cannot be built.
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self, SurveyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SurveyError::Config(format!("slack client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, identity: &str, text: &str) -> Result<(), SurveyError> {
        let reply: SlackReply = self
            .client
            .post(format!("{}/chat.postMessage", self.api_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "channel": identity, "text": text }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| SurveyError::Notification(e.to_string()))?
            .json()
            .await
            .map_err(|e| SurveyError::Notification(e.to_string()))?;

        if !reply.ok {
            return Err(SurveyError::Notification(
                reply.error.unwrap_or_else(|| "slack returned ok=false".to_string()),
            ));
        }
        Ok(())
    }
}

/// A message accepted by the [`OutboxNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Recipient identity.
    pub identity: String,
    /// Message body.
    pub text: String,
    /// When the message was accepted.
    pub sent_at: DateTime<Utc>,
}

/// [`Notifier`] that keeps every message in memory and logs it.
///
/// Used when no Slack token is configured and by the tests.
#[derive(Debug, Default)]
pub struct OutboxNotifier {
    sent: RwLock<Vec<SentMessage>>,
}

impl OutboxNotifier {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages in send order.
    pub async fn messages(&self) -> Vec<SentMessage> {
        self.sent.read().await.clone()
    }

    /// Message bodies sent to `identity`, in send order.
    pub async fn messages_for(&self, identity: &str) -> Vec<String> {
        self.sent
            .read()
            .await
            .iter()
            .filter(|m| m.identity == identity)
            .map(|m| m.text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send(&self, identity: &str, text: &str) -> Result<(), SurveyError> {
        tracing::info!(identity, text, "outbox message");
        self.sent.write().await.push(SentMessage {
            identity: identity.to_string(),
            text: text.to_string(),
            sent_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outbox_keeps_messages_per_recipient() {
        let outbox = OutboxNotifier::new();
        assert!(outbox.send("U1", "first").await.is_ok());
        assert!(outbox.send("U2", "other").await.is_ok());
        assert!(outbox.send("U1", "second").await.is_ok());

        assert_eq!(outbox.messages().await.len(), 3);
        assert_eq!(outbox.messages_for("U1").await, vec!["first", "second"]);
        assert!(outbox.messages_for("U3").await.is_empty());
    }

    #[test]
    fn slack_debug_hides_token() {
        let Ok(notifier) =
            SlackNotifier::new("https://slack.example/api/", "xoxb-secret", Duration::from_secs(1))
        else {
            panic!("client should build");
        };
        let debug = format!("{notifier:?}");
        assert!(!debug.contains("xoxb-secret"));
        assert!(debug.contains("https://slack.example/api"));
        assert!(!debug.contains("api/\""));
    }

    #[test]
    fn slack_reply_parses_error_field() {
        let Ok(reply) =
            serde_json::from_str::<SlackReply>(r#"{"ok":false,"error":"channel_not_found"}"#)
        else {
            panic!("reply should parse");
        };
        assert!(!reply.ok);
        assert_eq!(reply.error.as_deref(), Some("channel_not_found"));
    }
}
