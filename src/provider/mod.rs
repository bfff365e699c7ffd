//! Sandbox provider contract and command types.
//!
//! The whole runtime reaches the remote execution environment through this
//! narrow trait; concrete backends (container services, local runners) live
//! outside the crate. The provider is expected to serialize command
//! execution against one sandbox - callers never issue overlapping shell
//! invocations themselves.

mod fake;

pub use fake::FakeSandbox;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Result of one shell command executed inside the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
    pub duration: Duration,
}

impl CommandResult {
    /// Creates a successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            success: true,
            duration: Duration::ZERO,
        }
    }

    /// Creates a failed result with the given stderr and exit code.
    pub fn fail(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
            success: false,
            duration: Duration::ZERO,
        }
    }

    /// Combined stdout and stderr for line-oriented error scanning.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Identity and endpoint of an active sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxInfo {
    pub sandbox_id: String,
    pub url: String,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

/// Capability interface for a remote, ephemeral execution sandbox.
///
/// Implementations must be safe to share behind an `Arc`; the runtime keeps
/// exactly one provider reference per orchestrator instance.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Runs a shell command and returns its captured output.
    async fn run_command(&self, command: &str) -> Result<CommandResult>;

    /// Reads a file from the sandbox filesystem.
    async fn read_file(&self, path: &str) -> Result<String>;

    /// Writes a file, creating parent directories as needed.
    async fn write_file(&self, path: &str, contents: &str) -> Result<()>;

    /// Lists file paths, optionally scoped to a directory.
    async fn list_files(&self, dir: Option<&str>) -> Result<Vec<String>>;

    /// Installs packages; an empty slice means a full reinstall.
    async fn install_packages(&self, packages: &[String]) -> Result<CommandResult>;

    /// Best-effort liveness flag. Must not block on a dead sandbox.
    async fn is_alive(&self) -> bool;

    /// Returns sandbox identity and preview endpoint.
    async fn sandbox_info(&self) -> SandboxInfo;

    /// Restarts the dev server process inside the sandbox.
    async fn restart_dev_server(&self) -> Result<()>;

    /// Tears down the sandbox. Idempotent.
    async fn terminate(&self) -> Result<()>;
}
