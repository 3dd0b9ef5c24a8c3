//! Language-backend orchestration for sema
//!
//! This crate manages a fleet of per-language code-intelligence servers.
//! Each backend is an external process speaking JSON-RPC over stdio; sema
//! owns its lifecycle, correlates requests to responses, keeps it healthy
//! with bounded reconnection, and fans logical queries out across every
//! relevant backend behind a single facade.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     Orchestrator (facade)                  │
//! │   fan-out · merge · cache · per-language annotations       │
//! ├──────────────┬──────────────────────┬──────────────────────┤
//! │  Backend     │  Dependency          │  Health &            │
//! │  Registry    │  Resolver            │  Reconnection        │
//! │  (YAML)      │  (installers)        │  Monitor             │
//! ├──────────────┴──────────────────────┴──────────────────────┤
//! │                  Backend Process Clients                   │
//! │   one subprocess per language · framed JSON-RPC · state    │
//! │   machine Idle→Launching→Handshaking→Ready→…→Closed        │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - `registry`: backend descriptor registry and YAML configuration
//! - `install`: dependency resolution and installation
//! - `client`: backend process client, protocol, framing, correlation
//! - `health`: periodic health sweep and bounded reconnection
//! - `orchestrator`: the single call surface with caching and merging

pub mod client;
pub mod error;
pub mod health;
pub mod install;
pub mod orchestrator;
pub mod registry;
pub mod types;

pub use client::{BackendClient, Connection, ReconnectPolicy};
pub use error::{Result, SemaLspError};
pub use health::HealthMonitor;
pub use install::{DependencyInstallResult, DependencyResolver, InstallationReport};
pub use orchestrator::{
    LanguageOutcome, LiveClientRegistry, Orchestrator, OutcomeStatus, ReferenceResult,
    SearchResponse, SymbolResult,
};
pub use registry::{default_registry, ConfigLoader, ServerDiscovery};
pub use types::{
    BackendDescriptor, BackendRegistry, ClientState, DependencySpec, GlobalSettings,
    HealthStatus, InstallerKind,
};
