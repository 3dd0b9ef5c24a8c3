//! HTTP facade for the sema orchestrator
//!
//! Exposes the orchestration subsystem over a small JSON API — health,
//! backend status, symbol search, references — and owns process lifecycle:
//! startup wiring (orchestrator, health monitor, change notifier) and
//! graceful shutdown that drains in-flight requests before the backend
//! clients go down.

pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use server::ApiServer;
pub use state::AppState;
