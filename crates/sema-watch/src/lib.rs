//! Workspace change notification for the sema orchestrator
//!
//! Watches a workspace root, coalesces bursts of raw filesystem events with a
//! per-path debouncer, and suppresses events whose content fingerprint is
//! unchanged. Subscribers receive a normalized stream of add/change/unlink
//! events they can use to invalidate cached results or refresh backend state.
//!
//! # Module Organization
//!
//! - `debounce`: per-path cancelable-timer utility, independent of the
//!   filesystem-watching library
//! - `fingerprint`: content hashing (full hash for small files, composite
//!   hash for large ones)
//! - `watcher`: the notify-backed change notifier itself

pub mod debounce;
pub mod fingerprint;
pub mod watcher;

pub use debounce::Debouncer;
pub use fingerprint::{fingerprint, FULL_HASH_LIMIT_BYTES};
pub use watcher::{ChangeEvent, ChangeKind, ChangeNotifier, WatchConfig, WatchedFileRecord};

use thiserror::Error;

/// Errors from the change notifier
#[derive(Debug, Error)]
pub enum WatchError {
    /// Underlying filesystem watcher failed
    #[error("filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// Ignore pattern could not be compiled
    #[error("invalid ignore pattern: {0}")]
    Glob(#[from] globset::Error),

    /// Filesystem access failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for watch operations
pub type Result<T> = std::result::Result<T, WatchError>;
