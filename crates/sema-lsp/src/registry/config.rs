//! Configuration loading from YAML files

use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, SemaLspError};
use crate::types::BackendRegistry;

/// Loads and validates backend registries from YAML
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a registry from a YAML file
    pub fn load_from_file(path: &Path) -> Result<BackendRegistry> {
        debug!(path = %path.display(), "Loading backend configuration");

        let content = std::fs::read_to_string(path).map_err(|e| {
            SemaLspError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::load_from_str(&content)
    }

    /// Load a registry from a YAML string
    pub fn load_from_str(content: &str) -> Result<BackendRegistry> {
        let registry: BackendRegistry = serde_yaml::from_str(content)
            .map_err(|e| SemaLspError::Config(format!("failed to parse YAML: {e}")))?;

        Self::validate(&registry)?;

        info!(
            backends = registry.backends.len(),
            "Loaded backend configuration"
        );
        Ok(registry)
    }

    /// Reject registries that cannot work at runtime
    fn validate(registry: &BackendRegistry) -> Result<()> {
        let mut seen = std::collections::HashSet::new();

        for descriptor in &registry.backends {
            if descriptor.language.is_empty() {
                return Err(SemaLspError::Config(
                    "backend with empty language id".to_string(),
                ));
            }
            if !seen.insert(descriptor.language.as_str()) {
                return Err(SemaLspError::Config(format!(
                    "duplicate backend definition for language '{}'",
                    descriptor.language
                )));
            }
            if descriptor.command.is_empty() {
                return Err(SemaLspError::Config(format!(
                    "backend '{}' has an empty launch command",
                    descriptor.language
                )));
            }
            if descriptor.extensions.is_empty() {
                return Err(SemaLspError::Config(format!(
                    "backend '{}' claims no file extensions",
                    descriptor.language
                )));
            }
            if descriptor.startup_timeout_ms == 0 || descriptor.request_timeout_ms == 0 {
                return Err(SemaLspError::Config(format!(
                    "backend '{}' has a zero timeout",
                    descriptor.language
                )));
            }
            for dependency in &descriptor.dependencies {
                if dependency.name.is_empty() {
                    return Err(SemaLspError::Config(format!(
                        "backend '{}' has a dependency with an empty name",
                        descriptor.language
                    )));
                }
            }
        }

        Ok(())
    }

    /// Overlay configuration layers: later layers win per language
    ///
    /// Hierarchy is built-in defaults, then user, then project, then
    /// runtime overrides. A layer replaces a backend wholesale when it
    /// redefines the same language id; new languages are appended, so
    /// enablement order stays built-ins first, overrides after.
    pub fn merge(
        base: BackendRegistry,
        overlays: Vec<BackendRegistry>,
    ) -> Result<BackendRegistry> {
        let mut result = base;

        for overlay in overlays {
            for descriptor in overlay.backends {
                match result
                    .backends
                    .iter_mut()
                    .find(|b| b.language == descriptor.language)
                {
                    Some(existing) => *existing = descriptor,
                    None => result.backends.push(descriptor),
                }
            }
            result.global = overlay.global;
        }

        Self::validate(&result)?;
        Ok(result)
    }
}
