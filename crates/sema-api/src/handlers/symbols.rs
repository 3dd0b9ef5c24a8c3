//! Symbol search endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use tracing::debug;

use sema_lsp::SearchResponse;

use crate::error::{ApiError, ApiResult};
use crate::models::SearchRequest;
use crate::state::AppState;

/// `POST /symbols/search`
///
/// Fans the query out across the requested (or all enabled) backends and
/// returns the merged, annotated result. Malformed bodies get the
/// structured error envelope rather than the extractor's default reply.
pub async fn search_symbols(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<SearchResponse>> {
    let Json(request) =
        body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    debug!(query = %request.query, "Symbol search request");

    let response = state
        .orchestrator
        .find_symbol(&request.query, request.languages, request.max_results)
        .await?;

    Ok(Json(response))
}
