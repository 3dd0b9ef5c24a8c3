//! Error types for backend orchestration

use thiserror::Error;

/// Errors surfaced by the orchestration subsystem
#[derive(Debug, Error)]
pub enum SemaLspError {
    /// A required dependency is absent and could not be installed
    #[error("required dependency '{name}' missing for language '{language}'")]
    DependencyMissing {
        /// Language whose backend needs the dependency
        language: String,
        /// Dependency name
        name: String,
    },

    /// The backend subprocess could not be started
    #[error("failed to launch backend for '{language}': {source}")]
    LaunchFailure {
        /// Language whose backend failed to start
        language: String,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// Capability negotiation did not complete within the startup timeout
    #[error("backend for '{language}' did not complete its handshake within {timeout_ms}ms")]
    HandshakeTimeout {
        /// Language being handshaken
        language: String,
        /// Configured startup timeout
        timeout_ms: u64,
    },

    /// A single call exceeded its deadline; the client stays usable
    #[error("request '{method}' timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Method that timed out
        method: String,
        /// Deadline that elapsed
        timeout_ms: u64,
    },

    /// The backend process exited; fatal to the current client instance
    #[error("backend process for '{language}' exited unexpectedly")]
    ProcessExited {
        /// Language whose process died
        language: String,
    },

    /// The reconnection attempt ceiling was reached
    #[error("backend for '{language}' exhausted {attempts} reconnection attempts")]
    ReconnectExhausted {
        /// Language whose client is now closed
        language: String,
        /// Attempts made before giving up
        attempts: u32,
    },

    /// No backend currently serves the requested language
    #[error("no active backend serves language '{language}'")]
    NoActiveBackend {
        /// Requested language
        language: String,
    },

    /// Caller input failed validation; never retried
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request was abandoned because its client is shutting down
    #[error("request cancelled: backend client shutting down")]
    Cancelled,

    /// The backend violated the wire protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Configuration could not be loaded or validated
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem or pipe error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for orchestration operations
pub type Result<T> = std::result::Result<T, SemaLspError>;
