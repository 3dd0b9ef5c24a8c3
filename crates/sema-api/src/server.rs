//! Process lifecycle: startup wiring and graceful shutdown

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use sema_lsp::{BackendRegistry, HealthMonitor, Orchestrator};
use sema_watch::{ChangeNotifier, WatchConfig};

use crate::routes;
use crate::state::AppState;

/// A running sema server and the background tasks behind it
pub struct ApiServer {
    addr: SocketAddr,
    state: AppState,
    shutdown: Arc<Notify>,
    serve_task: JoinHandle<std::io::Result<()>>,
    health_task: JoinHandle<()>,
    invalidation_task: JoinHandle<()>,
    // Held so the underlying filesystem watcher stays alive.
    _notifier: Arc<ChangeNotifier>,
}

impl ApiServer {
    /// Bind the facade and start every background task
    ///
    /// Wires the orchestrator, the periodic health monitor, and the
    /// change notifier (whose events invalidate cached results and nudge
    /// the owning backend). Port 0 binds an ephemeral port.
    pub async fn start(
        registry: BackendRegistry,
        workspace_root: impl Into<PathBuf>,
        port: u16,
    ) -> anyhow::Result<Self> {
        let workspace_root = workspace_root.into();
        let orchestrator = Arc::new(Orchestrator::new(registry, &workspace_root));
        let state = AppState::new(Arc::clone(&orchestrator));

        let health_interval = Duration::from_millis(
            orchestrator.config().global.health_check_interval_ms,
        );
        let health_task =
            HealthMonitor::new(orchestrator.clients(), health_interval).spawn();

        let notifier = Arc::new(
            ChangeNotifier::new(WatchConfig::new(&workspace_root))
                .context("failed to build change notifier")?,
        );
        Arc::clone(&notifier)
            .start()
            .context("failed to start filesystem watcher")?;

        let mut change_events = notifier.subscribe();
        let invalidator = Arc::clone(&orchestrator);
        let invalidation_task = tokio::spawn(async move {
            while let Ok(event) = change_events.recv().await {
                invalidator.invalidate_path(&event.path).await;
            }
        });

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind port {port}"))?;
        let addr = listener.local_addr()?;
        info!(%addr, root = %workspace_root.display(), "sema server listening");

        let shutdown = Arc::new(Notify::new());
        let drain = Arc::clone(&shutdown);
        let router = routes::router(state.clone());
        let serve_task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { drain.notified().await })
                .await
        });

        Ok(Self {
            addr,
            state,
            shutdown,
            serve_task,
            health_task,
            invalidation_task,
            _notifier: notifier,
        })
    }

    /// The bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register termination-signal handling
    ///
    /// SIGINT/SIGTERM trigger the same drain as [`ApiServer::stop`]:
    /// in-flight requests finish, then backends shut down.
    pub fn setup_graceful_shutdown(&self) {
        let shutdown = Arc::clone(&self.shutdown);
        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(error) = tokio::signal::ctrl_c().await {
                    warn!(error = %error, "Failed to listen for ctrl-c");
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut signal) => {
                        signal.recv().await;
                    }
                    Err(error) => warn!(error = %error, "Failed to listen for SIGTERM"),
                }
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {},
                _ = terminate => {},
            }

            info!("Termination signal received; draining");
            shutdown.notify_one();
        });
    }

    /// Block until the server drains, then release every backend
    pub async fn wait(self) -> anyhow::Result<()> {
        let served = self.serve_task.await;

        self.health_task.abort();
        self.invalidation_task.abort();
        self.state.orchestrator.shutdown().await;
        info!("sema server stopped");

        served.context("server task panicked")??;
        Ok(())
    }

    /// Drain in-flight requests and shut everything down
    pub async fn stop(self) -> anyhow::Result<()> {
        self.shutdown.notify_one();
        self.wait().await
    }
}
