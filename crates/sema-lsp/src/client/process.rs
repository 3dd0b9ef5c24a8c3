//! Backend subprocess lifecycle

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{Result, SemaLspError};
use crate::types::BackendDescriptor;

/// Grace period between the terminate request and giving up on the wait
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A spawned backend process with its pipes taken
pub struct BackendProcess {
    child: Child,
    language: String,
    pid: Option<u32>,
}

impl BackendProcess {
    /// Spawn the backend described by `descriptor` in `workspace_root`
    ///
    /// Returns the process plus its stdin/stdout handles; stderr is
    /// captured so backend noise never corrupts the framed channel.
    pub fn spawn(
        descriptor: &BackendDescriptor,
        workspace_root: &Path,
    ) -> Result<(Self, ChildStdin, ChildStdout)> {
        debug!(
            language = %descriptor.language,
            command = %descriptor.command,
            "Spawning backend process"
        );

        let mut command = Command::new(&descriptor.command);
        command
            .args(&descriptor.args)
            .current_dir(workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &descriptor.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| {
            warn!(
                language = %descriptor.language,
                command = %descriptor.command,
                error = %source,
                "Failed to spawn backend process"
            );
            SemaLspError::LaunchFailure {
                language: descriptor.language.clone(),
                source,
            }
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            SemaLspError::Protocol("spawned backend without a stdin pipe".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            SemaLspError::Protocol("spawned backend without a stdout pipe".to_string())
        })?;

        let pid = child.id();
        info!(
            language = %descriptor.language,
            pid = ?pid,
            "Backend process spawned"
        );

        Ok((
            Self {
                child,
                language: descriptor.language.clone(),
                pid,
            },
            stdin,
            stdout,
        ))
    }

    /// OS process id, when still known
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has not exited yet
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Cooperative terminate-then-kill with a bounded grace period
    pub async fn shutdown(&mut self) {
        if !self.is_running() {
            return;
        }

        debug!(language = %self.language, pid = ?self.pid, "Shutting down backend process");

        if let Err(error) = self.child.kill().await {
            warn!(
                language = %self.language,
                error = %error,
                "Failed to terminate backend process"
            );
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(
                    language = %self.language,
                    status = %status,
                    "Backend process exited"
                );
            }
            Ok(Err(error)) => {
                warn!(
                    language = %self.language,
                    error = %error,
                    "Error waiting for backend process exit"
                );
            }
            Err(_) => {
                warn!(
                    language = %self.language,
                    "Backend process did not exit within the grace period"
                );
            }
        }
    }
}
