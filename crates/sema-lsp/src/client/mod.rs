//! Backend process client: one subprocess, framed protocol, correlation
//!
//! # Module Organization
//!
//! - `protocol`: JSON-RPC 2.0 message types and id allocation
//! - `framing`: Content-Length framed transport
//! - `connection`: pending-request correlation table
//! - `process`: subprocess spawn/terminate
//! - this module: [`BackendClient`], the state machine tying them together

mod connection;
pub mod framing;
mod process;
pub mod protocol;

pub use connection::Connection;
pub use process::BackendProcess;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, SemaLspError};
use crate::types::{BackendDescriptor, ClientState, GlobalSettings, HealthStatus};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Bounded reconnection behavior applied uniformly to every client
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Attempt ceiling before the client closes permanently
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl ReconnectPolicy {
    /// Policy taken from the global settings block
    pub fn from_settings(settings: &GlobalSettings) -> Self {
        Self {
            max_attempts: settings.reconnect_max_attempts,
            delay: Duration::from_millis(settings.reconnect_delay_ms),
        }
    }
}

/// Owns one backend subprocess and hides framing and correlation
///
/// States move `Idle → Launching → Handshaking → Ready`, degrade on I/O
/// errors, process exit, or repeated timeouts, reconnect up to the policy
/// ceiling, and end in `Closed`. Request timeouts alone are per-call
/// errors and do not change state until the consecutive-timeout limit is
/// hit.
pub struct BackendClient {
    descriptor: BackendDescriptor,
    workspace_root: PathBuf,
    policy: ReconnectPolicy,
    consecutive_timeout_limit: u32,
    state: Arc<RwLock<ClientState>>,
    connection: Arc<Connection>,
    writer: Arc<Mutex<Option<BoxedWriter>>>,
    process: Mutex<Option<BackendProcess>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    /// Serializes launch/reconnect/shutdown so only one transition runs
    lifecycle: Mutex<()>,
    attempts: AtomicU32,
    consecutive_timeouts: AtomicU32,
    consecutive_errors: AtomicU32,
    last_activity: std::sync::Mutex<Instant>,
}

impl BackendClient {
    /// Create an idle client; nothing is spawned until first use
    pub fn new(
        descriptor: BackendDescriptor,
        workspace_root: impl Into<PathBuf>,
        policy: ReconnectPolicy,
        consecutive_timeout_limit: u32,
    ) -> Self {
        Self {
            descriptor,
            workspace_root: workspace_root.into(),
            policy,
            consecutive_timeout_limit: consecutive_timeout_limit.max(1),
            state: Arc::new(RwLock::new(ClientState::Idle)),
            connection: Arc::new(Connection::new()),
            writer: Arc::new(Mutex::new(None)),
            process: Mutex::new(None),
            reader_task: Mutex::new(None),
            lifecycle: Mutex::new(()),
            attempts: AtomicU32::new(0),
            consecutive_timeouts: AtomicU32::new(0),
            consecutive_errors: AtomicU32::new(0),
            last_activity: std::sync::Mutex::new(Instant::now()),
        }
    }

    /// The language this client serves
    pub fn language(&self) -> &str {
        &self.descriptor.language
    }

    /// The descriptor this client was built from
    pub fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    /// Current connection state
    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    /// Requests still awaiting a response
    pub async fn pending_count(&self) -> usize {
        self.connection.pending_count().await
    }

    /// Consecutive health-probe failures
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::Relaxed)
    }

    /// Reconnection attempts since the last successful handshake
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// When the client last completed a call
    pub fn last_activity(&self) -> Instant {
        match self.last_activity.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    async fn set_state(&self, new: ClientState) {
        let mut state = self.state.write().await;
        if *state != new {
            trace!(
                language = %self.descriptor.language,
                from = ?*state,
                to = ?new,
                "Client state transition"
            );
            *state = new;
        }
    }

    fn touch(&self) {
        match self.last_activity.lock() {
            Ok(mut guard) => *guard = Instant::now(),
            Err(poisoned) => *poisoned.into_inner() = Instant::now(),
        }
    }

    /// Drive the state machine until the client is `Ready`
    ///
    /// Launches from `Idle`, reconnects from `Degraded`, waits out a
    /// transition another task is performing, and refuses `Closed`.
    pub async fn ensure_ready(&self) -> Result<()> {
        let wait_deadline = Instant::now() + self.descriptor.startup_timeout() * 2;

        loop {
            match self.state().await {
                ClientState::Ready => return Ok(()),
                ClientState::Closed => {
                    return Err(SemaLspError::ReconnectExhausted {
                        language: self.descriptor.language.clone(),
                        attempts: self.policy.max_attempts,
                    })
                }
                ClientState::Idle => self.launch().await?,
                ClientState::Degraded => self.reconnect().await?,
                ClientState::Launching
                | ClientState::Handshaking
                | ClientState::Reconnecting => {
                    if Instant::now() > wait_deadline {
                        return Err(SemaLspError::HandshakeTimeout {
                            language: self.descriptor.language.clone(),
                            timeout_ms: self.descriptor.startup_timeout_ms,
                        });
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }

    /// Spawn the subprocess and negotiate capabilities
    async fn launch(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if self.state().await == ClientState::Ready {
            return Ok(());
        }

        self.set_state(ClientState::Launching).await;

        let (process, stdin, stdout) =
            match BackendProcess::spawn(&self.descriptor, &self.workspace_root) {
                Ok(spawned) => spawned,
                Err(error) => {
                    self.set_state(ClientState::Degraded).await;
                    return Err(error);
                }
            };

        *self.process.lock().await = Some(process);
        self.start_io(Box::new(stdin), Box::new(stdout)).await;
        self.handshake().await
    }

    /// Wire an already-connected transport instead of spawning a process
    ///
    /// Used when a backend is reached over something other than stdio
    /// (an in-process stub, a socket pair) and throughout the test suite.
    pub async fn attach_transport<W, R>(&self, writer: W, reader: R) -> Result<()>
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let _guard = self.lifecycle.lock().await;
        self.set_state(ClientState::Launching).await;
        self.start_io(Box::new(writer), Box::new(reader)).await;
        self.handshake().await
    }

    /// Install the writer and spawn the reader loop
    async fn start_io(&self, writer: BoxedWriter, reader: BoxedReader) {
        *self.writer.lock().await = Some(writer);

        if let Some(previous) = self.reader_task.lock().await.take() {
            previous.abort();
        }

        let connection = Arc::clone(&self.connection);
        let state = Arc::clone(&self.state);
        let language = self.descriptor.language.clone();

        let handle = tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            loop {
                match framing::read_message(&mut reader).await {
                    Ok(Some(protocol::JsonRpcMessage::Response(response))) => {
                        connection.resolve(response).await;
                    }
                    Ok(Some(protocol::JsonRpcMessage::Notification(notification))) => {
                        trace!(
                            language = %language,
                            method = %notification.method,
                            "Backend notification"
                        );
                    }
                    Ok(Some(protocol::JsonRpcMessage::Request(request))) => {
                        debug!(
                            language = %language,
                            method = %request.method,
                            "Ignoring server-initiated request"
                        );
                    }
                    Ok(None) => break,
                    Err(error) => {
                        warn!(language = %language, error = %error, "Backend read error");
                        break;
                    }
                }
            }

            // The channel is gone. Unless this was a deliberate shutdown,
            // the client degrades and every pending request fails.
            {
                let mut state = state.write().await;
                if *state != ClientState::Closed {
                    warn!(language = %language, "Backend channel closed; client degraded");
                    *state = ClientState::Degraded;
                }
            }
            let exited_language = language.clone();
            connection
                .fail_all(move |_| SemaLspError::ProcessExited {
                    language: exited_language.clone(),
                })
                .await;
        });

        *self.reader_task.lock().await = Some(handle);
    }

    /// Send `initialize`, await the response, confirm with `initialized`
    async fn handshake(&self) -> Result<()> {
        self.set_state(ClientState::Handshaking).await;

        let params = json!({
            "processId": std::process::id(),
            "rootUri": format!("file://{}", self.workspace_root.display()),
            "capabilities": {},
        });

        let timeout = self.descriptor.startup_timeout();
        match self.request("initialize", Some(params), timeout).await {
            Ok(_capabilities) => {
                self.send_notification("initialized", Some(json!({}))).await?;
                self.attempts.store(0, Ordering::SeqCst);
                self.consecutive_timeouts.store(0, Ordering::SeqCst);
                self.consecutive_errors.store(0, Ordering::SeqCst);
                self.set_state(ClientState::Ready).await;
                info!(language = %self.descriptor.language, "Backend ready");
                Ok(())
            }
            Err(SemaLspError::RequestTimeout { .. }) => {
                self.set_state(ClientState::Degraded).await;
                Err(SemaLspError::HandshakeTimeout {
                    language: self.descriptor.language.clone(),
                    timeout_ms: self.descriptor.startup_timeout_ms,
                })
            }
            Err(error) => {
                self.set_state(ClientState::Degraded).await;
                Err(error)
            }
        }
    }

    /// Issue a correlated call on a `Ready` client
    ///
    /// A timeout resolves this call with [`SemaLspError::RequestTimeout`]
    /// and leaves the client `Ready`; only hitting the consecutive-timeout
    /// limit degrades it. The backend's computation is not cancelled.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        if self.state().await != ClientState::Ready {
            return Err(SemaLspError::NoActiveBackend {
                language: self.descriptor.language.clone(),
            });
        }

        let result = self.request(method, params, timeout).await;

        match &result {
            Ok(_) => {
                self.consecutive_timeouts.store(0, Ordering::SeqCst);
                self.touch();
            }
            Err(SemaLspError::RequestTimeout { .. }) => {
                let timeouts = self.consecutive_timeouts.fetch_add(1, Ordering::SeqCst) + 1;
                if timeouts >= self.consecutive_timeout_limit {
                    warn!(
                        language = %self.descriptor.language,
                        timeouts,
                        "Consecutive timeout limit reached; client degraded"
                    );
                    self.set_state(ClientState::Degraded).await;
                }
            }
            Err(_) => {}
        }

        result
    }

    /// Fire-and-forget notification on a `Ready` client
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.state().await != ClientState::Ready {
            return Err(SemaLspError::NoActiveBackend {
                language: self.descriptor.language.clone(),
            });
        }
        self.send_notification(method, params).await
    }

    /// Raw correlated request without state checks (handshake uses this)
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let (id, rx) = self.connection.register(method, timeout).await;
        let message = protocol::request(id, method, params);

        if let Err(error) = self.write(&message).await {
            self.connection.abandon(id).await;
            return Err(error);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            // The sender vanished without resolving us: shutdown raced the call.
            Ok(Err(_)) => Err(SemaLspError::Cancelled),
            Err(_) => {
                self.connection.abandon(id).await;
                Err(SemaLspError::RequestTimeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        let message = protocol::notification(method, params);
        self.write(&message).await
    }

    async fn write<M: Serialize>(&self, message: &M) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| SemaLspError::NoActiveBackend {
            language: self.descriptor.language.clone(),
        })?;

        match framing::write_message(writer, message).await {
            Ok(()) => Ok(()),
            Err(error) => {
                drop(guard);
                if matches!(error, SemaLspError::Io(_)) {
                    warn!(
                        language = %self.descriptor.language,
                        error = %error,
                        "Write failed; client degraded"
                    );
                    self.set_state(ClientState::Degraded).await;
                }
                Err(error)
            }
        }
    }

    /// One bounded reconnection attempt
    ///
    /// Increments the attempt counter; past the policy ceiling the client
    /// closes permanently and surfaces [`SemaLspError::ReconnectExhausted`].
    pub async fn reconnect(&self) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > self.policy.max_attempts {
            warn!(
                language = %self.descriptor.language,
                ceiling = self.policy.max_attempts,
                "Reconnection ceiling reached; closing client"
            );
            self.close_internal().await;
            return Err(SemaLspError::ReconnectExhausted {
                language: self.descriptor.language.clone(),
                attempts: self.policy.max_attempts,
            });
        }

        info!(
            language = %self.descriptor.language,
            attempt,
            ceiling = self.policy.max_attempts,
            "Reconnecting backend"
        );

        {
            let _guard = self.lifecycle.lock().await;
            self.set_state(ClientState::Reconnecting).await;

            if let Some(previous) = self.reader_task.lock().await.take() {
                previous.abort();
            }
            *self.writer.lock().await = None;
            if let Some(mut process) = self.process.lock().await.take() {
                process.shutdown().await;
            }
            let language = self.descriptor.language.clone();
            self.connection
                .fail_all(move |_| SemaLspError::ProcessExited {
                    language: language.clone(),
                })
                .await;
        }

        tokio::time::sleep(self.policy.delay).await;
        self.launch().await
    }

    /// Liveness probe used by the health monitor
    ///
    /// Checks the process (or transport, for attached clients) and sweeps
    /// pending requests past their deadline. Success resets the
    /// consecutive-error counter.
    pub async fn probe(&self) -> HealthStatus {
        let started = Instant::now();

        match self.state().await {
            ClientState::Closed => {
                return HealthStatus::Unhealthy {
                    reason: "client closed".to_string(),
                }
            }
            ClientState::Degraded => {
                self.consecutive_errors.fetch_add(1, Ordering::SeqCst);
                return HealthStatus::Unhealthy {
                    reason: "client degraded".to_string(),
                };
            }
            _ => {}
        }

        let process_alive = {
            let mut process = self.process.lock().await;
            process.as_mut().map(|process| process.is_running())
        };
        let alive = match process_alive {
            Some(running) => running,
            // Transport-attached client: alive while a writer exists.
            None => self.writer.lock().await.is_some(),
        };

        if !alive {
            self.consecutive_errors.fetch_add(1, Ordering::SeqCst);
            self.set_state(ClientState::Degraded).await;
            return HealthStatus::Unhealthy {
                reason: "backend process not running".to_string(),
            };
        }

        let timed_out = self.connection.sweep_expired().await;
        if !timed_out.is_empty() {
            debug!(
                language = %self.descriptor.language,
                count = timed_out.len(),
                "Swept expired requests during probe"
            );
        }

        self.consecutive_errors.store(0, Ordering::SeqCst);
        HealthStatus::Healthy {
            latency: started.elapsed(),
        }
    }

    /// Explicit shutdown: cancel pending work and release the subprocess
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;
        self.close_internal().await;
    }

    async fn close_internal(&self) {
        self.set_state(ClientState::Closed).await;

        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        self.connection.fail_all(|_| SemaLspError::Cancelled).await;
        *self.writer.lock().await = None;
        if let Some(mut process) = self.process.lock().await.take() {
            process.shutdown().await;
        }

        info!(language = %self.descriptor.language, "Backend client closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn descriptor(language: &str) -> BackendDescriptor {
        BackendDescriptor {
            language: language.to_string(),
            display_name: language.to_string(),
            command: format!("{language}-backend"),
            args: vec![],
            extensions: vec![".t".to_string()],
            health_check: None,
            dependencies: vec![],
            enabled: true,
            auto_install: false,
            startup_timeout_ms: 1_000,
            request_timeout_ms: 500,
            env: HashMap::new(),
        }
    }

    fn quick_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(10),
        }
    }

    /// Scripted backend: answers initialize, echoes "echo", ignores "slow"
    fn spawn_mock_backend(
        transport: tokio::io::DuplexStream,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let (read, mut writer) = tokio::io::split(transport);
            let mut reader = BufReader::new(read);

            while let Ok(Some(message)) = framing::read_message(&mut reader).await {
                if let protocol::JsonRpcMessage::Request(request) = message {
                    let response = match request.method.as_str() {
                        "initialize" => Some(json!({"capabilities": {}})),
                        "echo" => Some(request.params.clone().unwrap_or(Value::Null)),
                        "workspace/symbol" => Some(json!([
                            {"name": "Foo", "kind": 5, "location": {
                                "uri": "file:///src/foo.t",
                                "range": {"start": {"line": 3, "character": 4},
                                          "end": {"line": 3, "character": 7}}}}
                        ])),
                        // "slow" never gets a response.
                        _ => None,
                    };

                    if let Some(result) = response {
                        let reply = protocol::JsonRpcResponse {
                            jsonrpc: "2.0".to_string(),
                            result: Some(result),
                            error: None,
                            id: request.id,
                        };
                        if framing::write_message(&mut writer, &reply).await.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }

    async fn ready_client() -> (Arc<BackendClient>, JoinHandle<()>) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let backend = spawn_mock_backend(theirs);

        let client = Arc::new(BackendClient::new(
            descriptor("testlang"),
            "/tmp",
            quick_policy(),
            2,
        ));
        let (read, write) = tokio::io::split(ours);
        client.attach_transport(write, read).await.unwrap();
        (client, backend)
    }

    #[tokio::test]
    async fn test_handshake_reaches_ready() {
        let (client, _backend) = ready_client().await;
        assert_eq!(client.state().await, ClientState::Ready);
        assert_eq!(client.reconnect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_call_roundtrip() {
        let (client, _backend) = ready_client().await;

        let result = client
            .call("echo", Some(json!({"value": 42})), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result, json!({"value": 42}));
    }

    #[tokio::test]
    async fn test_timeout_is_per_call_not_fatal() {
        let (client, _backend) = ready_client().await;

        let result = client
            .call("slow", None, Duration::from_millis(50))
            .await;
        assert!(matches!(
            result,
            Err(SemaLspError::RequestTimeout { .. })
        ));
        // One timeout must not change state.
        assert_eq!(client.state().await, ClientState::Ready);

        // The client still works for the next call.
        let result = client
            .call("echo", Some(json!(1)), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result, json!(1));
    }

    #[tokio::test]
    async fn test_consecutive_timeouts_degrade_client() {
        let (client, _backend) = ready_client().await;

        for _ in 0..2 {
            let _ = client.call("slow", None, Duration::from_millis(30)).await;
        }
        assert_eq!(client.state().await, ClientState::Degraded);
    }

    #[tokio::test]
    async fn test_launch_failure_degrades_then_exhausts_to_closed() {
        let client = BackendClient::new(
            descriptor("ghost"),
            "/tmp",
            quick_policy(),
            2,
        );

        // Idle → Launching fails: the executable does not exist.
        assert!(matches!(
            client.ensure_ready().await,
            Err(SemaLspError::LaunchFailure { .. })
        ));
        assert_eq!(client.state().await, ClientState::Degraded);

        // Each retry fails the same way until the ceiling closes the client.
        for _ in 0..2 {
            let _ = client.reconnect().await;
        }
        let result = client.reconnect().await;
        assert!(matches!(
            result,
            Err(SemaLspError::ReconnectExhausted { .. })
        ));
        assert_eq!(client.state().await, ClientState::Closed);
    }

    #[tokio::test]
    async fn test_closed_client_refuses_calls() {
        let (client, _backend) = ready_client().await;
        client.shutdown().await;

        assert_eq!(client.state().await, ClientState::Closed);
        let result = client.call("echo", None, Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(SemaLspError::NoActiveBackend { .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_requests() {
        let (client, _backend) = ready_client().await;

        let caller = Arc::clone(&client);
        let inflight =
            tokio::spawn(async move { caller.call("slow", None, Duration::from_secs(30)).await });

        // Give the call time to register before shutting down.
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.shutdown().await;

        let result = inflight.await.unwrap();
        assert!(matches!(result, Err(SemaLspError::Cancelled)));
    }

    #[tokio::test]
    async fn test_backend_eof_degrades_and_fails_pending() {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let backend = spawn_mock_backend(theirs);

        let client = Arc::new(BackendClient::new(
            descriptor("testlang"),
            "/tmp",
            quick_policy(),
            2,
        ));
        let (read, write) = tokio::io::split(ours);
        client.attach_transport(write, read).await.unwrap();

        // Kill the mock backend; its half of the duplex drops, we see EOF.
        backend.abort();
        let _ = backend.await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.state().await, ClientState::Degraded);
    }

    #[tokio::test]
    async fn test_probe_healthy_resets_error_counter() {
        let (client, _backend) = ready_client().await;

        match client.probe().await {
            HealthStatus::Healthy { .. } => {}
            HealthStatus::Unhealthy { reason } => panic!("unexpected: {reason}"),
        }
        assert_eq!(client.consecutive_errors(), 0);
    }

    #[tokio::test]
    async fn test_notify_requires_ready() {
        let client = BackendClient::new(descriptor("idle"), "/tmp", quick_policy(), 2);
        let result = client.notify("noop", None).await;
        assert!(matches!(
            result,
            Err(SemaLspError::NoActiveBackend { .. })
        ));
    }
}
