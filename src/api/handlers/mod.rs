//! REST endpoint handlers organized by resource.

pub mod directory;
pub mod events;
pub mod messages;
pub mod sweep;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(messages::routes())
        .merge(events::routes())
        .merge(sweep::routes())
        .merge(directory::routes())
}
