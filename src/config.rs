//! Configuration for the supervision runtime.
//!
//! Every timer, cap, and window used by the components lives here so tests
//! can inject short intervals. Configuration loads from a TOML file with
//! serde defaults, then applies environment overrides.
//!
//! Environment variables:
//! - `SANDPIPER_CONFIG` - path to a TOML config file
//! - `SANDPIPER_MAX_PHASES` - override the hard phase cap
//! - `SANDPIPER_DEBUG_MAX_ITERATIONS` - override the debug loop iteration cap

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Health monitor tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Interval between periodic health checks, in milliseconds.
    #[serde(default = "default_health_interval_ms")]
    pub check_interval_ms: u64,

    /// Echo-probe latency above which a passing check reports `degraded`.
    #[serde(default = "default_degraded_latency_ms")]
    pub degraded_latency_ms: u64,
}

/// Keep-alive heartbeat tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepAliveConfig {
    /// Interval between heartbeats, in milliseconds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

/// Build-error recovery tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Maximum strategy attempts per recovery run.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wall-clock budget for a whole recovery run, in milliseconds.
    #[serde(default = "default_recovery_timeout_ms")]
    pub timeout_ms: u64,

    /// Delay before the initial retry strategy re-verifies, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Self-healing supervisor tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Debounce window collapsing bursts of install/build commands into one
    /// full check, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Session store tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Hard cap on phases per session.
    #[serde(default = "default_max_phases")]
    pub max_phases: u32,

    /// Rolling window of command log events retained per session.
    #[serde(default = "default_command_log_window")]
    pub command_log_window: usize,

    /// Directory for JSON session snapshots. `None` disables persistence.
    #[serde(default)]
    pub state_dir: Option<std::path::PathBuf>,
}

/// Debug loop tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugLoopConfig {
    /// Hard iteration cap for one debug invocation.
    #[serde(default = "default_debug_max_iterations")]
    pub max_iterations: u32,

    /// Sliding window for repetition detection, in seconds.
    #[serde(default = "default_repetition_window_secs")]
    pub repetition_window_secs: u64,

    /// Identical calls tolerated within the window before skipping.
    #[serde(default = "default_repetition_threshold")]
    pub repetition_threshold: u32,
}

/// Telemetry bus tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Ring buffer capacity for retained command log events.
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
}

/// Orchestrator-level tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Poll interval for `ensure_ready`, in milliseconds.
    #[serde(default = "default_ready_poll_ms")]
    pub ready_poll_ms: u64,
}

/// Aggregated configuration for one orchestrator instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub keepalive: KeepAliveConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub debug_loop: DebugLoopConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

fn default_health_interval_ms() -> u64 {
    30_000
}
fn default_degraded_latency_ms() -> u64 {
    2_000
}
fn default_heartbeat_interval_ms() -> u64 {
    45_000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_recovery_timeout_ms() -> u64 {
    120_000
}
fn default_retry_delay_ms() -> u64 {
    1_000
}
fn default_debounce_ms() -> u64 {
    1_500
}
fn default_max_phases() -> u32 {
    25
}
fn default_command_log_window() -> usize {
    100
}
fn default_debug_max_iterations() -> u32 {
    15
}
fn default_repetition_window_secs() -> u64 {
    600
}
fn default_repetition_threshold() -> u32 {
    2
}
fn default_ring_capacity() -> usize {
    500
}
fn default_ready_poll_ms() -> u64 {
    500
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_health_interval_ms(),
            degraded_latency_ms: default_degraded_latency_ms(),
        }
    }
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_ms: default_recovery_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_phases: default_max_phases(),
            command_log_window: default_command_log_window(),
            state_dir: None,
        }
    }
}

impl Default for DebugLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_debug_max_iterations(),
            repetition_window_secs: default_repetition_window_secs(),
            repetition_threshold: default_repetition_threshold(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            ring_capacity: default_ring_capacity(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ready_poll_ms: default_ready_poll_ms(),
        }
    }
}

impl HealthConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn degraded_latency(&self) -> Duration {
        Duration::from_millis(self.degraded_latency_ms)
    }
}

impl KeepAliveConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl RecoveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl SweepConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl DebugLoopConfig {
    pub fn repetition_window(&self) -> Duration {
        Duration::from_secs(self.repetition_window_secs)
    }
}

impl OrchestratorConfig {
    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }
}

impl SupervisorConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| Error::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `SANDPIPER_CONFIG` if set, otherwise
    /// defaults, then applies env overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("SANDPIPER_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Applies environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("SANDPIPER_MAX_PHASES") {
            if let Ok(n) = v.parse() {
                self.session.max_phases = n;
            }
        }
        if let Ok(v) = std::env::var("SANDPIPER_DEBUG_MAX_ITERATIONS") {
            if let Ok(n) = v.parse() {
                self.debug_loop.max_iterations = n;
            }
        }
    }

    /// Rejects configurations that would disable the bounding guarantees.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.recovery.max_attempts == 0 {
            errors.push("recovery.max_attempts must be at least 1");
        }
        if self.session.max_phases == 0 {
            errors.push("session.max_phases must be at least 1");
        }
        if self.debug_loop.max_iterations == 0 {
            errors.push("debug_loop.max_iterations must be at least 1");
        }
        if self.debug_loop.repetition_threshold == 0 {
            errors.push("debug_loop.repetition_threshold must be at least 1");
        }
        if self.telemetry.ring_capacity == 0 {
            errors.push("telemetry.ring_capacity must be at least 1");
        }
        if self.session.command_log_window == 0 {
            errors.push("session.command_log_window must be at least 1");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(errors.join("; ")))
        }
    }

    /// Short intervals suitable for tests that exercise timers.
    #[cfg(test)]
    pub fn test_config() -> Self {
        let mut config = Self::default();
        config.health.check_interval_ms = 20;
        config.keepalive.heartbeat_interval_ms = 20;
        config.sweep.debounce_ms = 30;
        config.recovery.retry_delay_ms = 5;
        config.orchestrator.ready_poll_ms = 10;
        config
    }
}
