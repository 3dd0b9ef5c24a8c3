//! Periodic health sweep and bounded reconnection

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, SemaLspError};
use crate::orchestrator::LiveClientRegistry;
use crate::types::{ClientState, HealthStatus};

/// Keeps the pool of live clients accurate
///
/// A periodic sweep probes every tracked client; failed probes run the
/// client's reconnection path, and clients that exhausted their attempt
/// ceiling are removed from the registry so the next request starts a
/// fresh launch instead of reusing a dead entry.
pub struct HealthMonitor {
    registry: Arc<LiveClientRegistry>,
    interval: Duration,
}

impl HealthMonitor {
    /// Create a monitor over the given registry
    pub fn new(registry: Arc<LiveClientRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Run the sweep loop until the task is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so freshly-launched
            // clients are not probed mid-handshake.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }

    /// Probe every tracked client once
    pub async fn sweep(&self) {
        for (language, client) in self.registry.list().await {
            if client.state().await == ClientState::Closed {
                info!(language = %language, "Removing closed client from registry");
                self.registry.remove(&language).await;
                continue;
            }

            match client.probe().await {
                HealthStatus::Healthy { latency } => {
                    debug!(
                        language = %language,
                        latency_ms = latency.as_millis() as u64,
                        "Health probe passed"
                    );
                }
                HealthStatus::Unhealthy { reason } => {
                    warn!(
                        language = %language,
                        reason = %reason,
                        "Health probe failed; reconnecting"
                    );
                    match client.reconnect().await {
                        Ok(()) => {
                            info!(language = %language, "Backend recovered");
                        }
                        Err(SemaLspError::ReconnectExhausted { .. }) => {
                            self.registry.remove(&language).await;
                        }
                        Err(error) => {
                            warn!(
                                language = %language,
                                error = %error,
                                "Reconnection attempt failed"
                            );
                        }
                    }
                }
            }
        }
    }

    /// Caller-triggered recovery for one language
    pub async fn reconnect(&self, language: &str) -> Result<()> {
        let client = self.registry.get(language).await.ok_or_else(|| {
            SemaLspError::NoActiveBackend {
                language: language.to_string(),
            }
        })?;

        match client.reconnect().await {
            Ok(()) => Ok(()),
            Err(error) => {
                if matches!(error, SemaLspError::ReconnectExhausted { .. }) {
                    self.registry.remove(language).await;
                }
                Err(error)
            }
        }
    }
}
