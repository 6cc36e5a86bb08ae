//! Directory sync and calendar credentials.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{CredentialRequest, SyncDirectoryRequest, SyncDirectoryResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, SurveyError};

/// `POST /directory`: Sync workspace members.
///
/// # Errors
///
/// Returns [`SurveyError`] on store failure.
#[utoipa::path(
    post,
    path = "/api/v1/directory",
    tag = "Directory",
    summary = "Sync the member directory",
    description = "Creates a user for every member with an email that is neither a bot nor deactivated. Known members are left unchanged.",
    request_body = SyncDirectoryRequest,
    responses(
        (status = 200, description = "Sync summary", body = SyncDirectoryResponse),
    )
)]
pub async fn sync_directory(
    State(state): State<AppState>,
    Json(req): Json<SyncDirectoryRequest>,
) -> Result<Json<SyncDirectoryResponse>, SurveyError> {
    let created = state.engine.sync_directory(&req.members).await?;
    Ok(Json(SyncDirectoryResponse {
        received: req.members.len(),
        created,
    }))
}

/// `POST /credentials`: Store a calendar credential.
///
/// # Errors
///
/// Returns [`SurveyError::InvalidRequest`] for an empty token and
/// [`SurveyError::UserNotFound`] for an unknown email.
#[utoipa::path(
    post,
    path = "/api/v1/credentials",
    tag = "Directory",
    summary = "Record a calendar credential",
    description = "Called by the OAuth flow once a user grants calendar access.",
    request_body = CredentialRequest,
    responses(
        (status = 204, description = "Credential stored"),
        (status = 400, description = "Empty token", body = ErrorResponse),
        (status = 404, description = "Unknown email", body = ErrorResponse),
    )
)]
pub async fn record_credential(
    State(state): State<AppState>,
    Json(req): Json<CredentialRequest>,
) -> Result<StatusCode, SurveyError> {
    state
        .engine
        .record_credential(&req.email, &req.refresh_token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Directory routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/directory", post(sync_directory))
        .route("/credentials", post(record_credential))
}
