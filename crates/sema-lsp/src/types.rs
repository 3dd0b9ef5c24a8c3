//! Core data structures for backend orchestration

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a dependency gets installed when absent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallerKind {
    /// System package manager (apt/brew)
    System,
    /// npm global install
    Npm,
    /// pip install
    Pip,
    /// cargo install
    Cargo,
    /// Raw binary fetched into the staging directory
    Binary,
}

/// One external package a backend needs before it can launch
///
/// Each dependency names exactly one installer; there is no fallback
/// across installer kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    /// Package or executable name
    pub name: String,
    /// The single installer responsible for this dependency
    pub installer: InstallerKind,
    /// Whether the backend cannot run without it
    #[serde(default = "default_true")]
    pub required: bool,
    /// Optional pinned version
    #[serde(default)]
    pub version: Option<String>,
    /// Explicit presence-check command; defaults to a PATH lookup of `name`
    #[serde(default)]
    pub check_command: Option<String>,
    /// Download URL, only meaningful for `InstallerKind::Binary`
    #[serde(default)]
    pub source: Option<String>,
}

/// Static definition of one per-language backend
///
/// Loaded from configuration at startup and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendDescriptor {
    /// Unique language id, e.g. "rust"
    pub language: String,
    /// Human-readable name for diagnostics
    #[serde(default)]
    pub display_name: String,
    /// Executable to launch
    pub command: String,
    /// Arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,
    /// File extensions this backend claims, e.g. [".rs"]
    pub extensions: Vec<String>,
    /// Optional liveness-check command
    #[serde(default)]
    pub health_check: Option<String>,
    /// Dependencies checked/installed before launch, in order
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
    /// Whether this backend participates at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether missing required dependencies may be installed automatically
    #[serde(default)]
    pub auto_install: bool,
    /// Handshake deadline in milliseconds
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    /// Per-call deadline in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Extra environment for the subprocess
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl BackendDescriptor {
    /// Handshake deadline as a [`Duration`]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Per-call deadline as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Settings that apply across all backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Maximum concurrent backend processes
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Health sweep interval in milliseconds
    #[serde(default = "default_health_interval_ms")]
    pub health_check_interval_ms: u64,
    /// Reconnection attempt ceiling before a client closes for good
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_max_attempts: u32,
    /// Fixed delay between reconnection attempts in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Consecutive request timeouts tolerated before the client degrades
    #[serde(default = "default_timeout_limit")]
    pub consecutive_timeout_limit: u32,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            max_clients: default_max_clients(),
            health_check_interval_ms: default_health_interval_ms(),
            reconnect_max_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            consecutive_timeout_limit: default_timeout_limit(),
        }
    }
}

/// The full backend configuration: descriptors in enablement order
///
/// Order matters: fan-out results are merged in the order backends appear
/// here, independent of completion timing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendRegistry {
    /// Backend definitions, in enablement order
    #[serde(default)]
    pub backends: Vec<BackendDescriptor>,
    /// Cross-backend settings
    #[serde(default)]
    pub global: GlobalSettings,
}

impl BackendRegistry {
    /// Look up a descriptor by language id
    pub fn get(&self, language: &str) -> Option<&BackendDescriptor> {
        self.backends.iter().find(|b| b.language == language)
    }

    /// Languages with an enabled backend, in enablement order
    pub fn enabled_languages(&self) -> Vec<String> {
        self.backends
            .iter()
            .filter(|b| b.enabled)
            .map(|b| b.language.clone())
            .collect()
    }

    /// The enabled backend claiming the given file extension
    ///
    /// Extensions are matched with their leading dot, e.g. ".rs".
    pub fn language_for_extension(&self, extension: &str) -> Option<&BackendDescriptor> {
        self.backends
            .iter()
            .filter(|b| b.enabled)
            .find(|b| b.extensions.iter().any(|e| e == extension))
    }
}

/// Connection state of one backend process client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientState {
    /// No process yet
    Idle,
    /// Subprocess being spawned
    Launching,
    /// Capability negotiation in flight
    Handshaking,
    /// Serving requests
    Ready,
    /// Unusable; reconnection pending or exhausted
    Degraded,
    /// Between reconnection attempts
    Reconnecting,
    /// Permanently shut down; pending requests were cancelled
    Closed,
}

/// Outcome of one health probe
#[derive(Debug, Clone)]
pub enum HealthStatus {
    /// The backend responded in time
    Healthy {
        /// Probe round-trip latency
        latency: Duration,
    },
    /// The backend failed the probe
    Unhealthy {
        /// What went wrong
        reason: String,
    },
}

fn default_true() -> bool {
    true
}

fn default_startup_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_max_clients() -> usize {
    8
}

fn default_health_interval_ms() -> u64 {
    30_000
}

fn default_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_delay_ms() -> u64 {
    2_000
}

fn default_timeout_limit() -> u32 {
    3
}
