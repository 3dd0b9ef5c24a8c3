//! Backend availability endpoint

use axum::{extract::State, Json};

use crate::models::StatusResponse;
use crate::state::AppState;

/// `GET /lsps/status`
pub async fn lsp_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        available: state.orchestrator.available_languages().await,
    })
}
