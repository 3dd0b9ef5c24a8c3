//! Shared application state

use std::sync::Arc;
use std::time::Instant;

use sema_lsp::Orchestrator;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// The orchestration facade
    pub orchestrator: Arc<Orchestrator>,
    /// Server start time for uptime reporting
    pub start_time: Instant,
}

impl AppState {
    /// Wrap an orchestrator for serving
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            start_time: Instant::now(),
        }
    }

    /// Seconds since the server started
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
