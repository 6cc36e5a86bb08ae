//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` sits at the
//! root. With the `swagger-ui` feature the generated [`ApiDoc`] is served
//! at `/swagger-ui`.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of every endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "meeting-surveyor",
        description = "Asks meeting attendees whether a meeting was effective and reports the results to its organizer."
    ),
    paths(
        handlers::messages::receive_message,
        handlers::events::register_event,
        handlers::events::dispatch_event,
        handlers::sweep::run_sweep,
        handlers::directory::sync_directory,
        handlers::directory::record_credential,
        handlers::system::health_handler,
    ),
    tags(
        (name = "Messages", description = "Inbound chat messages"),
        (name = "Events", description = "Calendar ingestion"),
        (name = "Lifecycle", description = "Survey sweeps"),
        (name = "Directory", description = "Members and calendar credentials"),
        (name = "System", description = "Service health"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());
    with_docs(router)
}

#[cfg(feature = "swagger-ui")]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
}

#[cfg(not(feature = "swagger-ui"))]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    router
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use serde_json::{Value, json};
    use tower::util::ServiceExt;
    use tower_http::timeout::TimeoutLayer;

    use super::*;
    use crate::channels::{Notifier, OutboxNotifier};
    use crate::config::SurveyConfig;
    use crate::domain::{EventBus, RsvpStatus};
    use crate::error::SurveyError;
    use crate::persistence::{DirectoryStore, MemoryStore, SurveyStore};
    use crate::service::fixtures::ended_event;
    use crate::service::{Collaborators, Registration, SurveyEngine};

    struct TestApp {
        router: Router,
        outbox: Arc<OutboxNotifier>,
    }

    fn app() -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let outbox = Arc::new(OutboxNotifier::new());
        let store_dyn: Arc<dyn SurveyStore> = Arc::<MemoryStore>::clone(&store);
        let notifier: Arc<dyn Notifier> = Arc::<OutboxNotifier>::clone(&outbox);
        let collab = Collaborators {
            store: store_dyn,
            calendar: store,
            notifier,
        };
        let Ok(engine) = SurveyEngine::new(collab, SurveyConfig::default(), EventBus::new(16))
        else {
            panic!("default config should validate");
        };
        TestApp {
            router: build_router().with_state(AppState::new(engine)),
            outbox,
        }
    }

    async fn post(app: &TestApp, uri: &str, body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()));
        let Ok(request) = request else {
            panic!("request should build");
        };
        send(app, request).await
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
        let Ok(response) = app.router.clone().oneshot(request).await else {
            panic!("router should respond");
        };
        let status = response.status();
        let Ok(bytes) = to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body should be readable");
        };
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn message(user: &str, text: &str) -> Value {
        json!({
            "type": "event_callback",
            "event": { "type": "message", "user": user, "text": text, "channel": "D1" }
        })
    }

    async fn seed_directory(app: &TestApp) {
        let members = json!({ "members": [
            { "id": "U0", "email": "lead@example.com" },
            { "id": "U1", "email": "a@example.com" },
            { "id": "U2", "email": "b@example.com" },
            { "id": "U3", "email": "c@example.com" },
            { "id": "B1", "email": "bot@example.com", "is_bot": true },
        ]});
        let (status, body) = post(app, "/api/v1/directory", &members).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["received"], 5);
        assert_eq!(body["created"], 4);
    }

    fn ended_meeting(calendar_id: &str) -> Value {
        let start = Utc::now() - Duration::hours(2);
        json!({
            "calendar_event_id": calendar_id,
            "name": "Planning",
            "organizer_email": "Lead@Example.com",
            "start_at": start,
            "end_at": start + Duration::hours(1),
            "attendees": [
                { "email": "lead@example.com", "responseStatus": "accepted" },
                { "email": "a@example.com", "responseStatus": "accepted" },
                { "email": "b@example.com", "responseStatus": "accepted" },
                { "email": "c@example.com", "responseStatus": "tentative" },
            ]
        })
    }

    #[tokio::test]
    async fn health_reports_version() {
        let app = app();
        let Ok(request) = Request::builder().uri("/health").body(Body::empty()) else {
            panic!("request should build");
        };
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn url_verification_echoes_challenge() {
        let app = app();
        let envelope = json!({ "type": "url_verification", "token": "x", "challenge": "c-123" });
        let (status, body) = post(&app, "/api/v1/messages", &envelope).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["challenge"], "c-123");
    }

    #[tokio::test]
    async fn survey_round_trip_over_http() {
        let app = app();
        seed_directory(&app).await;

        let (status, body) = post(&app, "/api/v1/events", &ended_meeting("cal-1")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["outcome"], "registered");
        let event_id = body["event_id"].clone();

        let (status, again) = post(&app, "/api/v1/events", &ended_meeting("cal-1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["created"], false);

        let (status, report) = post(&app, "/api/v1/sweep", &json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["dispatched"], json!([event_id]));
        assert_eq!(app.outbox.messages_for("U1").await.len(), 1);
        assert!(app.outbox.messages_for("U0").await.is_empty());

        let (status, ack) = post(&app, "/api/v1/messages", &message("U1", "Yes!")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["ignored"], false);
        assert_eq!(ack["result"]["outcome"], "rating");
        assert_eq!(ack["result"]["result"]["outcome"], "recorded");
        assert_eq!(ack["result"]["result"]["rating"], "yes");
        assert_eq!(ack["result"]["result"]["results"]["outcome"], "reported");
        assert_eq!(app.outbox.messages_for("U0").await.len(), 1);
    }

    #[tokio::test]
    async fn bot_messages_are_ignored() {
        let app = app();
        let mut envelope = message("U1", "yes");
        envelope["event"]["bot_id"] = json!("B1");
        let (status, body) = post(&app, "/api/v1/messages", &envelope).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ignored"], true);
        assert!(app.outbox.messages().await.is_empty());
    }

    #[tokio::test]
    async fn opt_out_command_confirms() {
        let app = app();
        seed_directory(&app).await;
        let (status, body) = post(&app, "/api/v1/messages", &message("U2", "opt out")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["outcome"], "opted_out");
        assert_eq!(app.outbox.messages_for("U2").await.len(), 1);
    }

    #[tokio::test]
    async fn rating_from_unknown_identity_is_not_found() {
        let app = app();
        let (status, body) = post(&app, "/api/v1/messages", &message("U404", "no")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], 2002);
    }

    #[tokio::test]
    async fn invalid_events_are_rejected() {
        let app = app();
        let mut backwards = ended_meeting("cal-2");
        backwards["end_at"] = json!(Utc::now() - Duration::hours(5));
        let (status, body) = post(&app, "/api/v1/events", &backwards).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], 1001);

        let blank = ended_meeting(" ");
        let (status, _) = post(&app, "/api/v1/events", &blank).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn far_future_events_are_ignored() {
        let app = app();
        let start = Utc::now() + Duration::days(30);
        let mut event = ended_meeting("cal-3");
        event["start_at"] = json!(start);
        event["end_at"] = json!(start + Duration::hours(1));
        let (status, body) = post(&app, "/api/v1/events", &event).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "ignored");
    }

    #[tokio::test]
    async fn dispatch_unknown_event_is_not_found() {
        let app = app();
        let (status, body) = post(&app, "/api/v1/events/99/dispatch", &json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], 2001);
    }

    #[tokio::test]
    async fn credentials_are_validated() {
        let app = app();
        seed_directory(&app).await;
        let empty = json!({ "email": "a@example.com", "refresh_token": "  " });
        let (status, _) = post(&app, "/api/v1/credentials", &empty).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unknown = json!({ "email": "nobody@example.com", "refresh_token": "t" });
        let (status, _) = post(&app, "/api/v1/credentials", &unknown).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let valid = json!({ "email": "a@example.com", "refresh_token": "t" });
        let (status, _) = post(&app, "/api/v1/credentials", &valid).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[derive(Debug)]
    struct SlowNotifier {
        outbox: OutboxNotifier,
        delay: std::time::Duration,
    }

    #[async_trait]
    impl Notifier for SlowNotifier {
        async fn send(&self, identity: &str, text: &str) -> Result<(), SurveyError> {
            tokio::time::sleep(self.delay).await;
            self.outbox.send(identity, text).await
        }
    }

    #[tokio::test]
    async fn timed_out_request_still_finishes_the_dispatch() {
        let store = Arc::new(MemoryStore::new());
        let slow = Arc::new(SlowNotifier {
            outbox: OutboxNotifier::new(),
            delay: std::time::Duration::from_millis(150),
        });
        let store_dyn: Arc<dyn SurveyStore> = Arc::<MemoryStore>::clone(&store);
        let notifier: Arc<dyn Notifier> = Arc::<SlowNotifier>::clone(&slow);
        let collab = Collaborators {
            store: store_dyn,
            calendar: Arc::<MemoryStore>::clone(&store),
            notifier,
        };
        let Ok(engine) = SurveyEngine::new(collab, SurveyConfig::default(), EventBus::new(16))
        else {
            panic!("default config should validate");
        };
        let state = AppState::new(engine);
        let engine = Arc::clone(&state.engine);
        let router = build_router()
            .layer(TimeoutLayer::new(std::time::Duration::from_millis(250)))
            .with_state(state);

        for (identity, email) in [
            ("U0", "lead@example.com"),
            ("U1", "a@example.com"),
            ("U2", "b@example.com"),
            ("U3", "c@example.com"),
        ] {
            let Ok(true) = store.insert_user(identity, email).await else {
                panic!("user {identity} not inserted");
            };
        }
        let meeting = ended_event(
            "slow-1",
            "lead@example.com",
            &[
                ("a@example.com", RsvpStatus::Accepted),
                ("b@example.com", RsvpStatus::Accepted),
                ("c@example.com", RsvpStatus::Accepted),
            ],
        );
        let Ok(Registration::Registered { event_id, .. }) = engine.register_event(meeting).await
        else {
            panic!("event not registered");
        };

        let Ok(request) = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/events/{event_id}/dispatch"))
            .body(Body::empty())
        else {
            panic!("request should build");
        };
        let Ok(response) = router.oneshot(request).await else {
            panic!("router should respond");
        };
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        tokio::time::sleep(std::time::Duration::from_millis(600)).await;
        let Ok(Some(event)) = store.event(event_id).await else {
            panic!("event missing");
        };
        assert!(event.questions_sent);
        for identity in ["U1", "U2", "U3"] {
            assert_eq!(slow.outbox.messages_for(identity).await.len(), 1);
        }
        let sent = slow.outbox.messages().await.len();

        let Ok(report) = engine.sweep().await else {
            panic!("sweep failed");
        };
        assert!(report.dispatched.is_empty());
        assert_eq!(slow.outbox.messages().await.len(), sent);
    }

    #[test]
    fn openapi_lists_every_endpoint() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/messages",
            "/api/v1/events",
            "/api/v1/events/{id}/dispatch",
            "/api/v1/sweep",
            "/api/v1/directory",
            "/api/v1/credentials",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
