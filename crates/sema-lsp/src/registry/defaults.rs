//! Built-in backend descriptors

use std::collections::HashMap;

use crate::types::{
    BackendDescriptor, BackendRegistry, DependencySpec, GlobalSettings, InstallerKind,
};

/// Registry with the stock backend set pre-configured
///
/// These match the servers most workspaces have on hand; workspace
/// configuration can disable, replace, or extend them.
pub fn default_registry() -> BackendRegistry {
    BackendRegistry {
        backends: vec![
            rust_analyzer(),
            typescript_language_server(),
            pylsp(),
            gopls(),
        ],
        global: GlobalSettings::default(),
    }
}

fn rust_analyzer() -> BackendDescriptor {
    BackendDescriptor {
        language: "rust".to_string(),
        display_name: "rust-analyzer".to_string(),
        command: "rust-analyzer".to_string(),
        args: vec![],
        extensions: vec![".rs".to_string()],
        health_check: Some("rust-analyzer --version".to_string()),
        dependencies: vec![DependencySpec {
            name: "rust-analyzer".to_string(),
            installer: InstallerKind::Cargo,
            required: true,
            version: None,
            check_command: None,
            source: None,
        }],
        enabled: true,
        auto_install: false,
        startup_timeout_ms: 10_000,
        request_timeout_ms: 5_000,
        env: HashMap::new(),
    }
}

fn typescript_language_server() -> BackendDescriptor {
    BackendDescriptor {
        language: "typescript".to_string(),
        display_name: "TypeScript Language Server".to_string(),
        command: "typescript-language-server".to_string(),
        args: vec!["--stdio".to_string()],
        extensions: vec![
            ".ts".to_string(),
            ".tsx".to_string(),
            ".js".to_string(),
            ".jsx".to_string(),
        ],
        health_check: Some("typescript-language-server --version".to_string()),
        dependencies: vec![
            DependencySpec {
                name: "typescript-language-server".to_string(),
                installer: InstallerKind::Npm,
                required: true,
                version: None,
                check_command: None,
                source: None,
            },
            DependencySpec {
                name: "typescript".to_string(),
                installer: InstallerKind::Npm,
                required: false,
                version: None,
                check_command: Some("tsc --version".to_string()),
                source: None,
            },
        ],
        enabled: true,
        auto_install: false,
        startup_timeout_ms: 10_000,
        request_timeout_ms: 5_000,
        env: HashMap::new(),
    }
}

fn pylsp() -> BackendDescriptor {
    BackendDescriptor {
        language: "python".to_string(),
        display_name: "python-lsp-server".to_string(),
        command: "pylsp".to_string(),
        args: vec![],
        extensions: vec![".py".to_string(), ".pyi".to_string()],
        health_check: Some("pylsp --help".to_string()),
        dependencies: vec![DependencySpec {
            name: "python-lsp-server".to_string(),
            installer: InstallerKind::Pip,
            required: true,
            version: None,
            check_command: Some("pylsp --help".to_string()),
            source: None,
        }],
        enabled: true,
        auto_install: false,
        startup_timeout_ms: 10_000,
        request_timeout_ms: 5_000,
        env: HashMap::new(),
    }
}

fn gopls() -> BackendDescriptor {
    BackendDescriptor {
        language: "go".to_string(),
        display_name: "gopls".to_string(),
        command: "gopls".to_string(),
        args: vec![],
        extensions: vec![".go".to_string()],
        health_check: Some("gopls version".to_string()),
        dependencies: vec![DependencySpec {
            name: "gopls".to_string(),
            installer: InstallerKind::System,
            required: true,
            version: None,
            check_command: None,
            source: None,
        }],
        enabled: true,
        auto_install: false,
        startup_timeout_ms: 15_000,
        request_timeout_ms: 5_000,
        env: HashMap::new(),
    }
}
