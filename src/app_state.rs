//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::SurveyEngine;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Survey lifecycle engine behind every endpoint.
    pub engine: Arc<SurveyEngine>,
}

impl AppState {
    /// Wraps `engine` for the router.
    #[must_use]
    pub fn new(engine: SurveyEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}
