//! Backend descriptor registry: configuration loading, built-in defaults,
//! and executable discovery

mod config;
mod defaults;
mod discovery;

pub use config::ConfigLoader;
pub use defaults::default_registry;
pub use discovery::ServerDiscovery;
