//! Health endpoint

use axum::{extract::State, Json};
use sysinfo::System;

use sema_lsp::ClientState;

use crate::models::{HealthResponse, MemoryInfo};
use crate::state::AppState;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// `GET /health`
///
/// "degraded" whenever any tracked backend client is not ready; a single
/// bad backend never takes the endpoint (or the process) down.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let active_languages = state.orchestrator.available_languages().await;

    let mut degraded = false;
    for (_, client) in state.orchestrator.clients().list().await {
        if client.state().await != ClientState::Ready {
            degraded = true;
            break;
        }
    }

    let mut system = System::new();
    system.refresh_memory();

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_languages,
        memory: MemoryInfo {
            used_mb: system.used_memory() / BYTES_PER_MB,
            total_mb: system.total_memory() / BYTES_PER_MB,
        },
    })
}
