//! Calendar ingestion and per-event dispatch.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::RegisterEventRequest;
use crate::app_state::AppState;
use crate::domain::EventId;
use crate::error::{ErrorResponse, SurveyError};
use crate::service::{DispatchOutcome, Registration};

/// `POST /events`: Register or refresh a calendar event.
///
/// # Errors
///
/// Returns [`SurveyError::InvalidRequest`] for a blank calendar id or an
/// event that ends before it starts.
#[utoipa::path(
    post,
    path = "/api/v1/events",
    tag = "Events",
    summary = "Register a calendar event",
    description = "Stores the event and its attendee list. Re-posting a known calendar id refreshes it without resetting survey progress. Events starting beyond the lookahead window are ignored.",
    request_body = RegisterEventRequest,
    responses(
        (status = 201, description = "Event created", body = Registration),
        (status = 200, description = "Event refreshed or ignored", body = Registration),
        (status = 400, description = "Invalid event", body = ErrorResponse),
    )
)]
pub async fn register_event(
    State(state): State<AppState>,
    Json(req): Json<RegisterEventRequest>,
) -> Result<impl IntoResponse, SurveyError> {
    if req.calendar_event_id.trim().is_empty() {
        return Err(SurveyError::InvalidRequest(
            "calendar_event_id must not be empty".to_string(),
        ));
    }
    let registration = state.engine.register_event(req.into()).await?;
    let status = match registration {
        Registration::Registered { created: true, .. } => StatusCode::CREATED,
        Registration::Registered { .. } | Registration::Ignored => StatusCode::OK,
    };
    Ok((status, Json(registration)))
}

/// `POST /events/{id}/dispatch`: Dispatch one event's questions now.
///
/// # Errors
///
/// Returns [`SurveyError::EventNotFound`] for an unknown id, or a store,
/// calendar or timeout error.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/dispatch",
    tag = "Events",
    summary = "Dispatch survey questions",
    description = "Sends the survey for one event without waiting for it to end. A closed or claimed questions stage is reported as skipped.",
    params(("id" = i64, Path, description = "Event row id")),
    responses(
        (status = 200, description = "Dispatch result", body = DispatchOutcome),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn dispatch_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DispatchOutcome>, SurveyError> {
    Ok(Json(state.engine.dispatch(EventId::new(id)).await?))
}

/// Event routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", post(register_event))
        .route("/events/{id}/dispatch", post(dispatch_event))
}
