//! Dependency resolution and installation
//!
//! Makes a backend launchable: every dependency in its descriptor is
//! checked, and — when allowed — installed through the single installer
//! the dependency names. Failures are recorded in an [`InstallationReport`]
//! for diagnostics; nothing is retried automatically.

use std::path::PathBuf;
use std::process::Stdio;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::{BackendDescriptor, DependencySpec, InstallerKind};

/// How much captured installer output is kept for diagnostics
const OUTPUT_TAIL_BYTES: usize = 2048;

/// Outcome of handling one dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyInstallResult {
    /// The dependency as requested
    pub spec: DependencySpec,
    /// Whether the dependency is present after this pass
    pub success: bool,
    /// Installed version, when it could be determined
    pub installed_version: Option<String>,
    /// Failure detail, including an installer output tail
    pub error: Option<String>,
}

/// Aggregated outcome of one resolution pass for a language
///
/// Retained until the next pass for the same language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationReport {
    /// Language the pass ran for
    pub language: String,
    /// Dependencies present (already or after install)
    pub succeeded: usize,
    /// Required dependencies still absent
    pub failed: usize,
    /// Optional dependencies recorded absent; non-fatal
    pub unmet: Vec<String>,
    /// Per-dependency detail
    pub results: Vec<DependencyInstallResult>,
    /// When the pass finished
    pub completed_at: DateTime<Utc>,
}

impl InstallationReport {
    /// Whether the backend can launch: every required dependency present
    pub fn is_launchable(&self) -> bool {
        self.failed == 0
    }
}

/// Verifies and installs backend dependencies
pub struct DependencyResolver {
    /// Scratch directory for raw-binary installs
    staging_dir: PathBuf,
}

impl DependencyResolver {
    /// Create a resolver staging binary downloads under the given directory
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }

    /// Run one resolution pass for a backend
    ///
    /// Absent optional dependencies are recorded as unmet and skipped.
    /// Absent required dependencies are installed only when the descriptor
    /// opts into `auto_install`; each dependency uses exactly its own
    /// installer, with no fallback across installer kinds and no automatic
    /// retry.
    pub async fn resolve(&self, descriptor: &BackendDescriptor) -> InstallationReport {
        let mut results = Vec::with_capacity(descriptor.dependencies.len());
        let mut unmet = Vec::new();

        for spec in &descriptor.dependencies {
            if self.check(spec).await {
                results.push(DependencyInstallResult {
                    spec: spec.clone(),
                    success: true,
                    installed_version: self.probe_version(&spec.name).await,
                    error: None,
                });
                continue;
            }

            if !spec.required {
                debug!(
                    language = %descriptor.language,
                    dependency = %spec.name,
                    "Optional dependency absent; skipping"
                );
                unmet.push(spec.name.clone());
                results.push(DependencyInstallResult {
                    spec: spec.clone(),
                    success: false,
                    installed_version: None,
                    error: None,
                });
                continue;
            }

            if !descriptor.auto_install {
                warn!(
                    language = %descriptor.language,
                    dependency = %spec.name,
                    "Required dependency absent and auto-install disabled"
                );
                results.push(DependencyInstallResult {
                    spec: spec.clone(),
                    success: false,
                    installed_version: None,
                    error: Some("absent and auto-install is disabled".to_string()),
                });
                continue;
            }

            results.push(self.install(spec).await);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results
            .iter()
            .filter(|r| !r.success && r.spec.required)
            .count();

        info!(
            language = %descriptor.language,
            succeeded,
            failed,
            unmet = unmet.len(),
            "Dependency resolution pass complete"
        );

        InstallationReport {
            language: descriptor.language.clone(),
            succeeded,
            failed,
            unmet,
            results,
            completed_at: Utc::now(),
        }
    }

    /// Whether a dependency is already present
    ///
    /// Uses the explicit check command when given, a PATH lookup otherwise.
    pub async fn check(&self, spec: &DependencySpec) -> bool {
        match &spec.check_command {
            Some(command) => match Self::run_captured(command, &[]).await {
                Ok((status, _, _)) => status,
                Err(_) => false,
            },
            None => which::which(&spec.name).is_ok(),
        }
    }

    /// Install one dependency through its configured installer
    async fn install(&self, spec: &DependencySpec) -> DependencyInstallResult {
        info!(
            dependency = %spec.name,
            installer = ?spec.installer,
            "Installing dependency"
        );

        let outcome = match spec.installer {
            InstallerKind::System => self.install_system(spec).await,
            InstallerKind::Npm => self.install_npm(spec).await,
            InstallerKind::Pip => self.install_pip(spec).await,
            InstallerKind::Cargo => self.install_cargo(spec).await,
            InstallerKind::Binary => self.install_binary(spec).await,
        };

        match outcome {
            Ok(()) => DependencyInstallResult {
                spec: spec.clone(),
                success: true,
                installed_version: self.probe_version(&spec.name).await,
                error: None,
            },
            Err(detail) => {
                warn!(dependency = %spec.name, detail = %detail, "Install failed");
                DependencyInstallResult {
                    spec: spec.clone(),
                    success: false,
                    installed_version: None,
                    error: Some(detail),
                }
            }
        }
    }

    async fn install_system(&self, spec: &DependencySpec) -> std::result::Result<(), String> {
        #[cfg(target_os = "linux")]
        let (program, args) = (
            "apt-get",
            vec!["install".to_string(), "-y".to_string(), spec.name.clone()],
        );
        #[cfg(target_os = "macos")]
        let (program, args) = ("brew", vec!["install".to_string(), spec.name.clone()]);
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        return Err("no system package manager configured for this platform".to_string());

        #[cfg(any(target_os = "linux", target_os = "macos"))]
        Self::run_installer(program, &args).await
    }

    async fn install_npm(&self, spec: &DependencySpec) -> std::result::Result<(), String> {
        let package = match &spec.version {
            Some(version) => format!("{}@{version}", spec.name),
            None => spec.name.clone(),
        };
        Self::run_installer("npm", &["install".to_string(), "-g".to_string(), package]).await
    }

    async fn install_pip(&self, spec: &DependencySpec) -> std::result::Result<(), String> {
        let package = match &spec.version {
            Some(version) => format!("{}=={version}", spec.name),
            None => spec.name.clone(),
        };
        Self::run_installer("pip", &["install".to_string(), package]).await
    }

    async fn install_cargo(&self, spec: &DependencySpec) -> std::result::Result<(), String> {
        let mut args = vec!["install".to_string(), spec.name.clone()];
        if let Some(version) = &spec.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        Self::run_installer("cargo", &args).await
    }

    async fn install_binary(&self, spec: &DependencySpec) -> std::result::Result<(), String> {
        let source = spec
            .source
            .as_ref()
            .ok_or_else(|| "binary dependency without a source URL".to_string())?;

        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| format!("failed to create staging dir: {e}"))?;
        let target = self.staging_dir.join(&spec.name);

        Self::run_installer(
            "curl",
            &[
                "-fsSL".to_string(),
                "-o".to_string(),
                target.display().to_string(),
                source.clone(),
            ],
        )
        .await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(|e| format!("failed to mark binary executable: {e}"))?;
        }

        Ok(())
    }

    /// Remove artifacts left by a failed pass before the next attempt
    pub async fn cleanup(&self) -> Result<()> {
        if tokio::fs::metadata(&self.staging_dir).await.is_ok() {
            tokio::fs::remove_dir_all(&self.staging_dir).await?;
            debug!(dir = %self.staging_dir.display(), "Removed install staging directory");
        }
        Ok(())
    }

    /// Best-effort `--version` probe; never fails the pass
    async fn probe_version(&self, name: &str) -> Option<String> {
        let (status, stdout, _) = Self::run_captured(name, &["--version".to_string()])
            .await
            .ok()?;
        if !status {
            return None;
        }
        stdout.lines().next().map(|line| line.trim().to_string())
    }

    /// Run an installer command, capturing output without echoing it
    async fn run_installer(program: &str, args: &[String]) -> std::result::Result<(), String> {
        match Self::run_captured(program, args).await {
            Ok((true, _, _)) => Ok(()),
            Ok((false, _, stderr)) => Err(format!("{program} failed: {}", tail(&stderr))),
            Err(error) => Err(format!("{program} could not be run: {error}")),
        }
    }

    /// Run a command string or program+args, returning (ok, stdout, stderr)
    async fn run_captured(
        command: &str,
        extra_args: &[String],
    ) -> std::io::Result<(bool, String, String)> {
        let mut parts = command.split_whitespace();
        let program = parts.next().unwrap_or(command);
        let mut args: Vec<String> = parts.map(|s| s.to_string()).collect();
        args.extend_from_slice(extra_args);

        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok((
            output.status.success(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }
}

/// Last `OUTPUT_TAIL_BYTES` of captured output, for error detail
fn tail(output: &str) -> &str {
    let start = output.len().saturating_sub(OUTPUT_TAIL_BYTES);
    // Don't split a UTF-8 sequence.
    let mut start = start;
    while start < output.len() && !output.is_char_boundary(start) {
        start += 1;
    }
    output[start..].trim()
}
