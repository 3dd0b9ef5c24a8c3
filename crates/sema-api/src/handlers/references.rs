//! References endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::models::{ReferencesRequest, ReferencesResponse};
use crate::state::AppState;

/// `POST /references`
///
/// Routed to exactly one backend by file extension. A position outside
/// any known symbol yields an empty list with HTTP 200.
pub async fn find_references(
    State(state): State<AppState>,
    body: Result<Json<ReferencesRequest>, JsonRejection>,
) -> ApiResult<Json<ReferencesResponse>> {
    let Json(request) =
        body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    debug!(
        path = %request.file_path,
        line = request.position.line,
        "References request"
    );

    let references = state
        .orchestrator
        .find_references(
            &request.file_path,
            request.position.line,
            request.position.character,
            request.include_declaration,
        )
        .await?;

    Ok(Json(ReferencesResponse { references }))
}
