//! meeting-surveyor server entry point.
//!
//! Wires the store, calendar and chat collaborators into the survey engine,
//! starts the periodic sweep and serves the REST API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::MissedTickBehavior;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use meeting_surveyor::api;
use meeting_surveyor::app_state::AppState;
use meeting_surveyor::channels::{CalendarSource, Notifier, OutboxNotifier, SlackNotifier};
use meeting_surveyor::config::AppConfig;
use meeting_surveyor::domain::{EventBus, SurveyEvent};
use meeting_surveyor::persistence::{MemoryStore, PostgresStore, SurveyStore};
use meeting_surveyor::service::{Collaborators, SurveyEngine};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    tracing::info!(addr = %config.listen_addr, "starting meeting-surveyor");

    // Build collaborators and the engine
    let event_bus = EventBus::new(config.event_bus_capacity);
    let (collab, survey_log) = build_collaborators(&config).await?;
    let engine = SurveyEngine::new(collab, config.survey.clone(), event_bus.clone())
        .context("invalid survey configuration")?;
    let app_state = AppState::new(engine);

    spawn_event_logger(event_bus.subscribe(), survey_log);
    if config.sweep_interval_secs > 0 {
        spawn_sweeper(
            Arc::clone(&app_state.engine),
            Duration::from_secs(config.sweep_interval_secs),
        );
    } else {
        tracing::warn!("periodic sweep disabled; use POST /api/v1/sweep");
    }

    // Build router
    let app = api::build_router()
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// `LOG_FORMAT=json` switches to JSON lines; the filter comes from
/// `RUST_LOG` and defaults to `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Picks the store and the chat channel. With PostgreSQL enabled the store
/// is also returned for the survey log.
async fn build_collaborators(
    config: &AppConfig,
) -> anyhow::Result<(Collaborators, Option<Arc<PostgresStore>>)> {
    let notifier: Arc<dyn Notifier> = match &config.slack_bot_token {
        Some(token) => Arc::new(SlackNotifier::new(
            &config.slack_api_url,
            token,
            config.survey.external_timeout(),
        )?),
        None => {
            tracing::warn!("SLACK_BOT_TOKEN not set; outbound messages are only logged");
            Arc::new(OutboxNotifier::new())
        }
    };

    if config.persistence_enabled {
        let postgres = Arc::new(
            PostgresStore::connect(config)
                .await
                .context("connecting to PostgreSQL")?,
        );
        postgres.migrate().await.context("running migrations")?;
        tracing::info!("PostgreSQL store ready");
        let store: Arc<dyn SurveyStore> = Arc::<PostgresStore>::clone(&postgres);
        let calendar: Arc<dyn CalendarSource> = Arc::<PostgresStore>::clone(&postgres);
        let collab = Collaborators {
            store,
            calendar,
            notifier,
        };
        return Ok((collab, Some(postgres)));
    }

    tracing::warn!("persistence disabled; survey state lives in memory");
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn SurveyStore> = Arc::<MemoryStore>::clone(&memory);
    let collab = Collaborators {
        store,
        calendar: memory,
        notifier,
    };
    Ok((collab, None))
}

/// Logs every lifecycle event and appends it to the survey log when one
/// is available.
fn spawn_event_logger(
    mut events: broadcast::Receiver<SurveyEvent>,
    survey_log: Option<Arc<PostgresStore>>,
) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    tracing::info!(
                        event_type = event.event_type_str(),
                        event_id = %event.event_id(),
                        "lifecycle event"
                    );
                    if let Some(log) = &survey_log
                        && let Err(e) = log.append_log(&event).await
                    {
                        tracing::warn!(error = %e, "survey log append failed");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "lifecycle logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_sweeper(engine: Arc<SurveyEngine>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = engine.sweep().await {
                tracing::warn!(error = %e, "sweep failed");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
