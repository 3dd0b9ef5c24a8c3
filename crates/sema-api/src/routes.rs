//! Route table

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{health, references, status, symbols};
use crate::state::AppState;

/// Build the full router over the given state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/lsps/status", get(status::lsp_status))
        .route("/symbols/search", post(symbols::search_symbols))
        .route("/references", post(references::find_references))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
