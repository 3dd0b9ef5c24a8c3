//! JSON-RPC 2.0 message types and id allocation

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id for requests expecting a response
pub type RequestId = u64;

/// A request expecting a correlated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Parameters, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Correlation id
    pub id: RequestId,
}

/// A response correlated to a request by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Result payload; mutually exclusive with `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload; mutually exclusive with `result`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Matches the request id
    pub id: RequestId,
}

/// Error object carried in a failed response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
    /// Optional structured detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A fire-and-forget message; no id, no response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Parameters, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Any inbound message
///
/// Untagged: requests carry both `method` and `id`, responses only `id`,
/// notifications only `method`. Variant order matters for serde's untagged
/// resolution — `Request` must come first since its required fields are a
/// superset of the other two.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Server-initiated request (rare; answered with an error or ignored)
    Request(JsonRpcRequest),
    /// Response to one of our requests
    Response(JsonRpcResponse),
    /// Server notification
    Notification(JsonRpcNotification),
}

/// Allocates unique correlation ids for one client
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Start allocating from 1
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// The next unused id
    pub fn next_id(&self) -> RequestId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Build a request with the given id
pub fn request(id: RequestId, method: impl Into<String>, params: Option<Value>) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.into(),
        params,
        id,
    }
}

/// Build a notification
pub fn notification(method: impl Into<String>, params: Option<Value>) -> JsonRpcNotification {
    JsonRpcNotification {
        jsonrpc: "2.0".to_string(),
        method: method.into(),
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_allocation_is_unique_and_increasing() {
        let ids = IdAllocator::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.next_id(), 3);
    }

    #[test]
    fn test_request_serialization_omits_empty_params() {
        let json = serde_json::to_string(&request(7, "shutdown", None)).unwrap();
        assert!(json.contains("\"id\":7"));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_message_parse_response() {
        let raw = r#"{"jsonrpc":"2.0","result":{"ok":true},"id":3}"#;
        match serde_json::from_str::<JsonRpcMessage>(raw).unwrap() {
            JsonRpcMessage::Response(response) => {
                assert_eq!(response.id, 3);
                assert_eq!(response.result.unwrap(), json!({"ok": true}));
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_message_parse_error_response() {
        let raw = r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"not found"},"id":9}"#;
        match serde_json::from_str::<JsonRpcMessage>(raw).unwrap() {
            JsonRpcMessage::Response(response) => {
                assert_eq!(response.error.unwrap().code, -32601);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_message_parse_notification() {
        let raw = r#"{"jsonrpc":"2.0","method":"window/logMessage","params":{"type":3}}"#;
        match serde_json::from_str::<JsonRpcMessage>(raw).unwrap() {
            JsonRpcMessage::Notification(notification) => {
                assert_eq!(notification.method, "window/logMessage");
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }
}
