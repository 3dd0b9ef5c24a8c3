//! Request/response correlation

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{oneshot, RwLock};
use tracing::{trace, warn};

use crate::client::protocol::{IdAllocator, JsonRpcResponse, RequestId};
use crate::error::{Result, SemaLspError};

/// One request awaiting its response
struct PendingRequest {
    method: String,
    deadline: Instant,
    timeout: Duration,
    response_tx: oneshot::Sender<Result<Value>>,
}

/// Correlates responses to outstanding requests by id
///
/// Every outstanding request has a unique id and an explicit deadline.
/// Expiry removes the entry and resolves it with [`SemaLspError::RequestTimeout`];
/// it does not cancel whatever the backend is still computing.
pub struct Connection {
    ids: IdAllocator,
    pending: Arc<RwLock<HashMap<RequestId, PendingRequest>>>,
}

impl Connection {
    /// Create an empty correlation table
    pub fn new() -> Self {
        Self {
            ids: IdAllocator::new(),
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Allocate an id and register a pending entry for it
    ///
    /// Returns the id and the receiver the response will arrive on.
    pub async fn register(
        &self,
        method: impl Into<String>,
        timeout: Duration,
    ) -> (RequestId, oneshot::Receiver<Result<Value>>) {
        let id = self.ids.next_id();
        let (tx, rx) = oneshot::channel();

        self.pending.write().await.insert(
            id,
            PendingRequest {
                method: method.into(),
                deadline: Instant::now() + timeout,
                timeout,
                response_tx: tx,
            },
        );

        (id, rx)
    }

    /// Resolve the pending entry matching a response
    pub async fn resolve(&self, response: JsonRpcResponse) {
        let pending = self.pending.write().await.remove(&response.id);

        match pending {
            Some(entry) => {
                let result = match response.error {
                    Some(error) => Err(SemaLspError::Protocol(format!(
                        "{} ({})",
                        error.message, error.code
                    ))),
                    None => Ok(response.result.unwrap_or(Value::Null)),
                };
                // The caller may have given up already; that is fine.
                let _ = entry.response_tx.send(result);
            }
            None => {
                warn!(id = response.id, "Response for unknown request id");
            }
        }
    }

    /// Drop a pending entry without resolving it (caller-side timeout)
    pub async fn abandon(&self, id: RequestId) {
        self.pending.write().await.remove(&id);
    }

    /// Resolve every entry past its deadline with a timeout error
    ///
    /// Returns the methods that timed out.
    pub async fn sweep_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let mut pending = self.pending.write().await;

        let expired: Vec<RequestId> = pending
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        let mut methods = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(entry) = pending.remove(&id) {
                trace!(id, method = %entry.method, "Request deadline elapsed");
                methods.push(entry.method.clone());
                let _ = entry.response_tx.send(Err(SemaLspError::RequestTimeout {
                    method: entry.method,
                    timeout_ms: entry.timeout.as_millis() as u64,
                }));
            }
        }
        methods
    }

    /// Fail every pending request with an error built per entry
    pub async fn fail_all<F>(&self, error: F)
    where
        F: Fn(&str) -> SemaLspError,
    {
        let mut pending = self.pending.write().await;
        for (_, entry) in pending.drain() {
            let _ = entry.response_tx.send(Err(error(&entry.method)));
        }
    }

    /// Number of requests still awaiting a response
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}
