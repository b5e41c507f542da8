//! Health check endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    /// False when no scoring endpoint is configured
    pub scorer_configured: bool,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let scorer = &state.config().scorer;
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: "reading-copilot-server",
        scorer_configured: scorer.endpoint.is_some() && scorer.api_key.is_some(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}
