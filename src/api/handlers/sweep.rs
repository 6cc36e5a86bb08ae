//! Manual sweep trigger.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::error::{ErrorResponse, SurveyError};
use crate::service::SweepReport;

/// `POST /sweep`: Run one sweep now.
///
/// # Errors
///
/// Returns [`SurveyError`] when the pending event lists cannot be loaded.
#[utoipa::path(
    post,
    path = "/api/v1/sweep",
    tag = "Lifecycle",
    summary = "Run a sweep",
    description = "Dispatches questions for every ended event still open and re-checks events waiting for results. Safe to call concurrently with the scheduled sweep.",
    responses(
        (status = 200, description = "Sweep summary", body = SweepReport),
        (status = 500, description = "Store unavailable", body = ErrorResponse),
    )
)]
pub async fn run_sweep(State(state): State<AppState>) -> Result<Json<SweepReport>, SurveyError> {
    Ok(Json(state.engine.sweep().await?))
}

/// Sweep routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sweep", post(run_sweep))
}
