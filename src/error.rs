//! Error types for the sandpiper supervision runtime.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for supervision operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The sandbox provider rejected or failed an operation.
    #[error("sandbox provider error: {0}")]
    Provider(String),

    /// The sandbox is not in a usable state.
    #[error("sandbox not ready: {0}")]
    NotReady(String),

    /// Environment validation failed on a critical check.
    #[error("environment validation failed: {0}")]
    Validation(String),

    /// All recovery strategies were exhausted.
    #[error("recovery failed after {attempts} attempts: {reason}")]
    RecoveryFailed { attempts: u32, reason: String },

    /// No session exists under the given id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A session state transition violated an invariant.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// An exclusive activity is already in progress for the session.
    #[error("operation already in progress: {0}")]
    Busy(String),

    /// The session hit its hard phase cap.
    #[error("phase limit of {0} reached")]
    PhaseLimitReached(u32),

    /// The agent model failed to produce a turn.
    #[error("agent model error: {0}")]
    Agent(String),

    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error during state persistence or log handling.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization of session state or wire messages failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for supervision operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of failures observed from sandbox command output or
/// propagated operation errors.
///
/// Classification is a best-effort keyword match; anything unmatched is
/// `Fatal` and skips deterministic recovery entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildErrorType {
    /// Package/dependency installation failure.
    Install,
    /// Compile or bundling failure.
    Build,
    /// Application execution error.
    Runtime,
    /// Sandbox unreachable or gateway error.
    Connection,
    /// Operation exceeded its deadline.
    Timeout,
    /// Unclassified, treated as unrecoverable.
    Fatal,
}

impl BuildErrorType {
    /// Whether the deterministic recovery chain should be attempted at all.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, BuildErrorType::Fatal)
    }

    /// Classifies an error message by keyword match.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("timed out") || lower.contains("etimedout") || lower.contains("timeout") {
            BuildErrorType::Timeout
        } else if lower.contains("econnrefused")
            || lower.contains("econnreset")
            || lower.contains("bad gateway")
            || lower.contains("unreachable")
            || lower.contains("socket hang up")
            || lower.contains("connection")
        {
            BuildErrorType::Connection
        } else if lower.contains("npm err")
            || lower.contains("cannot find module")
            || lower.contains("cannot find package")
            || lower.contains("eresolve")
            || lower.contains("install failed")
        {
            BuildErrorType::Install
        } else if lower.contains("build failed")
            || lower.contains("compilation failed")
            || lower.contains("syntax error")
            || lower.contains("unexpected token")
            || lower.contains("module parse failed")
        {
            BuildErrorType::Build
        } else if lower.contains("referenceerror")
            || lower.contains("typeerror")
            || lower.contains("is not defined")
            || lower.contains("is not a function")
            || lower.contains("unhandled promise rejection")
            || lower.contains("panicked at")
        {
            BuildErrorType::Runtime
        } else {
            BuildErrorType::Fatal
        }
    }
}

impl std::fmt::Display for BuildErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BuildErrorType::Install => "install",
            BuildErrorType::Build => "build",
            BuildErrorType::Runtime => "runtime",
            BuildErrorType::Connection => "connection",
            BuildErrorType::Timeout => "timeout",
            BuildErrorType::Fatal => "fatal",
        };
        f.write_str(s)
    }
}
