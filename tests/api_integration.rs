//! End-to-end tests against a served router: real TCP, real JSON, an
//! in-memory store and an outbox in place of Slack.

#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{Value, json};

use meeting_surveyor::api;
use meeting_surveyor::app_state::AppState;
use meeting_surveyor::channels::{Notifier, OutboxNotifier};
use meeting_surveyor::config::SurveyConfig;
use meeting_surveyor::domain::{CompletionMode, EventBus};
use meeting_surveyor::persistence::{MemoryStore, SurveyStore};
use meeting_surveyor::service::{Collaborators, SurveyEngine};

struct Server {
    base: String,
    client: reqwest::Client,
    outbox: Arc<OutboxNotifier>,
}

impl Server {
    async fn start(config: SurveyConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let outbox = Arc::new(OutboxNotifier::new());
        let store_dyn: Arc<dyn SurveyStore> = Arc::<MemoryStore>::clone(&store);
        let notifier: Arc<dyn Notifier> = Arc::<OutboxNotifier>::clone(&outbox);
        let collab = Collaborators {
            store: store_dyn,
            calendar: store,
            notifier,
        };
        let Ok(engine) = SurveyEngine::new(collab, config, EventBus::new(64)) else {
            panic!("config should validate");
        };
        let app = api::build_router().with_state(AppState::new(engine));

        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self::connect(addr, outbox)
    }

    fn connect(addr: SocketAddr, outbox: Arc<OutboxNotifier>) -> Self {
        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            outbox,
        }
    }

    async fn post(&self, path: &str, body: &Value) -> (u16, Value) {
        let Ok(response) = self
            .client
            .post(format!("{}{path}", self.base))
            .json(body)
            .send()
            .await
        else {
            panic!("POST {path} failed");
        };
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn say(&self, user: &str, text: &str) -> Value {
        let envelope = json!({
            "type": "event_callback",
            "team_id": "T1",
            "event": { "type": "message", "user": user, "text": text, "channel": "D1" }
        });
        let (status, body) = self.post("/api/v1/messages", &envelope).await;
        assert_eq!(status, 200, "message from {user}: {body}");
        body
    }
}

fn members() -> Value {
    json!({ "members": [
        { "id": "U0", "email": "lead@example.com" },
        { "id": "U1", "email": "ana@example.com" },
        { "id": "U2", "email": "ben@example.com" },
        { "id": "U3", "email": "cho@example.com" },
        { "id": "U4", "deleted": true, "email": "gone@example.com" },
    ]})
}

fn meeting(calendar_id: &str, attendees: &[&str]) -> Value {
    let start = Utc::now() - Duration::hours(3);
    let attendees: Vec<Value> = attendees
        .iter()
        .map(|email| json!({ "email": email, "responseStatus": "accepted" }))
        .collect();
    json!({
        "calendar_event_id": calendar_id,
        "name": "Quarterly review",
        "organizer_email": "lead@example.com",
        "start_at": start,
        "end_at": start + Duration::hours(1),
        "description": "Agenda: numbers",
        "attendees": attendees,
    })
}

#[tokio::test]
async fn health_is_served() {
    let server = Server::start(SurveyConfig::default()).await;
    let Ok(response) = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
    else {
        panic!("GET /health failed");
    };
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn full_quorum_survey_reports_once_everyone_answered() {
    let config = SurveyConfig {
        completion_mode: CompletionMode::FullQuorum,
        ..SurveyConfig::default()
    };
    let server = Server::start(config).await;

    let (status, synced) = server.post("/api/v1/directory", &members()).await;
    assert_eq!(status, 200);
    assert_eq!(synced["created"], 4);

    let attendees = [
        "lead@example.com",
        "ana@example.com",
        "ben@example.com",
        "cho@example.com",
    ];
    let (status, registered) = server
        .post("/api/v1/events", &meeting("q-review", &attendees))
        .await;
    assert_eq!(status, 201);
    let event_id = registered["event_id"].clone();

    let (_, report) = server.post("/api/v1/sweep", &json!({})).await;
    assert_eq!(report["dispatched"], json!([event_id]));

    let first = server.say("U1", "yes").await;
    assert_eq!(first["result"]["result"]["outcome"], "recorded");
    assert_eq!(first["result"]["result"]["results"], Value::Null);
    server.say("U2", "No").await;

    // A second answer from the same user overwrites the first.
    let changed = server.say("U1", "no").await;
    assert_eq!(changed["result"]["result"]["updated"], true);
    assert!(server.outbox.messages_for("U0").await.is_empty());

    let last = server.say("U3", "maybe").await;
    assert_eq!(last["result"]["result"]["results"]["outcome"], "reported");
    let report_messages = server.outbox.messages_for("U0").await;
    assert_eq!(report_messages.len(), 1);

    let (_, second_sweep) = server.post("/api/v1/sweep", &json!({})).await;
    assert_eq!(second_sweep["dispatched"], json!([]));
    assert_eq!(second_sweep["reported"], json!([]));
    assert_eq!(server.outbox.messages_for("U0").await.len(), 1);
}

#[tokio::test]
async fn small_meeting_is_never_surveyed() {
    let server = Server::start(SurveyConfig::default()).await;
    server.post("/api/v1/directory", &members()).await;
    let (_, registered) = server
        .post(
            "/api/v1/events",
            &meeting("one-on-one", &["lead@example.com", "ana@example.com"]),
        )
        .await;
    let event_id = registered["event_id"].clone();

    let (_, report) = server.post("/api/v1/sweep", &json!({})).await;
    assert_eq!(report["ineligible"], json!([event_id]));
    assert_eq!(server.outbox.messages().await.len(), 0);

    let reply = server.say("U1", "yes").await;
    assert_eq!(reply["result"]["result"]["outcome"], "no_pending_survey");
}

#[tokio::test]
async fn greeting_from_new_user_includes_sign_up_link() {
    let server = Server::start(SurveyConfig::default()).await;
    let reply = server.say("U9", "hello").await;
    assert_eq!(reply["result"]["outcome"], "greeted");
    let Some(text) = server.outbox.messages_for("U9").await.pop() else {
        panic!("no greeting sent");
    };
    assert!(text.contains(&SurveyConfig::default().onboarding_base_url));
}

#[tokio::test]
async fn malformed_envelope_is_rejected() {
    let server = Server::start(SurveyConfig::default()).await;
    let (status, _) = server
        .post("/api/v1/messages", &json!({ "type": "app_rate_limited" }))
        .await;
    assert!((400..500).contains(&status), "status {status}");
}
