//! Backend executable discovery and installation hints

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::{Result, SemaLspError};

/// Locates backend executables and explains how to install missing ones
pub struct ServerDiscovery;

impl ServerDiscovery {
    /// Resolve an executable via PATH, absolute path, or common install dirs
    pub fn verify_executable(executable: &str) -> Result<PathBuf> {
        if let Ok(path) = which::which(executable) {
            debug!(executable, path = %path.display(), "Found executable on PATH");
            return Ok(path);
        }

        let direct = PathBuf::from(executable);
        if direct.is_absolute() && direct.exists() {
            return Ok(direct);
        }

        for candidate in Self::common_installation_paths(executable) {
            if candidate.exists() {
                debug!(executable, path = %candidate.display(), "Found executable at common path");
                return Ok(candidate);
            }
        }

        warn!(executable, "Backend executable not found");
        Err(SemaLspError::Config(format!(
            "backend executable '{executable}' not found"
        )))
    }

    /// Directories worth checking when PATH lookup fails
    fn common_installation_paths(executable: &str) -> Vec<PathBuf> {
        let home = std::env::var("HOME").unwrap_or_default();
        let mut paths = vec![
            PathBuf::from(format!("/usr/local/bin/{executable}")),
            PathBuf::from(format!("/usr/bin/{executable}")),
            PathBuf::from(format!("{home}/.cargo/bin/{executable}")),
            PathBuf::from(format!("{home}/.local/bin/{executable}")),
            PathBuf::from(format!("{home}/go/bin/{executable}")),
        ];

        #[cfg(target_os = "macos")]
        paths.push(PathBuf::from(format!("/opt/homebrew/bin/{executable}")));

        paths
    }

    /// Human-readable install hint for a missing backend
    pub fn installation_hint(language: &str, executable: &str) -> String {
        match language {
            "rust" => "Install rust-analyzer:\n\
                 - Via rustup: rustup component add rust-analyzer\n\
                 - Via cargo: cargo install rust-analyzer"
                .to_string(),
            "typescript" => "Install typescript-language-server:\n\
                 - Via npm: npm install -g typescript-language-server typescript"
                .to_string(),
            "python" => "Install python-lsp-server:\n\
                 - Via pip: pip install python-lsp-server"
                .to_string(),
            "go" => "Install gopls:\n\
                 - Via go: go install golang.org/x/tools/gopls@latest"
                .to_string(),
            _ => format!(
                "Backend executable '{executable}' for '{language}' not found.\n\
                 Install it and make sure it is on your PATH."
            ),
        }
    }
}
