//! Sandbox health monitoring.
//!
//! Probes the provider on a fixed interval, maintains the authoritative
//! `SandboxState`, and emits a transition event whenever the computed
//! health status changes. Probe failures never propagate past the monitor
//! boundary; they become `failed` results.
//!
//! Policy note: a single failed liveness or echo probe transitions the
//! status straight to `failed` with no consecutive-failure debounce. The
//! consecutive-failure count is still tracked and exposed so callers can
//! apply their own hysteresis.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::HealthConfig;
use crate::provider::SandboxProvider;
use crate::telemetry::{CommandLogEvent, TelemetryBus};

/// Expected stdout of the echo probe.
const ECHO_PROBE: &str = "sandpiper-health";

/// Pattern used to look for a dev server process. Best effort only.
const DEV_SERVER_PROBE: &str = "pgrep -f 'vite|next dev|webpack|react-scripts'";

/// Authoritative lifecycle state of the supervised sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Initializing,
    Ready,
    Active,
    Idle,
    Recovering,
    Unhealthy,
    Terminated,
}

/// Computed health status for one check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failed,
}

/// Per-probe outcomes for one check cycle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HealthCheckDetails {
    pub sandbox_alive: bool,
    pub command_responsive: bool,
    pub dev_server_running: bool,
}

/// Immutable snapshot produced by each check cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub last_check: DateTime<Utc>,
    pub error: Option<String>,
    pub details: HealthCheckDetails,
}

/// Emitted when the computed status differs from the previous cycle.
#[derive(Debug, Clone)]
pub struct HealthTransition {
    pub from: Option<HealthStatus>,
    pub to: HealthStatus,
    pub at: DateTime<Utc>,
    pub result: HealthCheckResult,
}

struct MonitorState {
    sandbox_state: SandboxState,
    last_result: Option<HealthCheckResult>,
    consecutive_failures: u32,
}

/// Periodic liveness and responsiveness prober.
pub struct HealthMonitor {
    provider: Arc<dyn SandboxProvider>,
    bus: Arc<TelemetryBus>,
    config: HealthConfig,
    state: Mutex<MonitorState>,
    events: broadcast::Sender<HealthTransition>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(
        provider: Arc<dyn SandboxProvider>,
        bus: Arc<TelemetryBus>,
        config: HealthConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            provider,
            bus,
            config,
            state: Mutex::new(MonitorState {
                sandbox_state: SandboxState::Initializing,
                last_result: None,
                consecutive_failures: 0,
            }),
            events,
            task: Mutex::new(None),
        }
    }

    /// Starts the periodic check loop. Restarts the loop if already running.
    pub fn start(self: &Arc<Self>) {
        let monitor = Arc::clone(self);
        let interval = self.config.check_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                monitor.force_check().await;
            }
        });

        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = task.replace(handle) {
            old.abort();
        }
    }

    /// Stops the periodic check loop.
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }

    /// Runs one check cycle immediately and returns the snapshot.
    ///
    /// Probes run in order and short-circuit: liveness, echo command,
    /// best-effort dev server. A dev-server miss alone never fails the
    /// check.
    pub async fn force_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        let mut details = HealthCheckDetails::default();

        // probe 1: provider liveness flag
        if !self.provider.is_alive().await {
            let result = self.failed_result(started, details, "sandbox is not alive");
            self.apply_result(result.clone());
            return result;
        }
        details.sandbox_alive = true;

        // probe 2: trivial command with expected output
        let probe = format!("echo {}", ECHO_PROBE);
        match self.provider.run_command(&probe).await {
            Ok(output) if output.success && output.stdout.trim() == ECHO_PROBE => {
                details.command_responsive = true;
            }
            Ok(output) => {
                let result = self.failed_result(
                    started,
                    details,
                    &format!("echo probe returned unexpected output: {:?}", output.stdout),
                );
                self.apply_result(result.clone());
                return result;
            }
            Err(e) => {
                let result = self.failed_result(started, details, &e.to_string());
                self.apply_result(result.clone());
                return result;
            }
        }

        // probe 3: dev server process, best effort
        details.dev_server_running = match self.provider.run_command(DEV_SERVER_PROBE).await {
            Ok(output) => output.success && !output.stdout.trim().is_empty(),
            Err(_) => false,
        };

        let elapsed = started.elapsed();
        let had_failures = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.consecutive_failures > 0
        };
        let status = if elapsed >= self.config.degraded_latency() || had_failures {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let result = HealthCheckResult {
            healthy: true,
            status,
            response_time_ms: elapsed.as_millis() as u64,
            last_check: Utc::now(),
            error: None,
            details,
        };
        self.apply_result(result.clone());
        result
    }

    /// Latest check snapshot, if any check has run.
    pub fn last_result(&self) -> Option<HealthCheckResult> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_result.clone()
    }

    /// Failures observed since the last passing check.
    pub fn consecutive_failures(&self) -> u32 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.consecutive_failures
    }

    /// Current authoritative sandbox state.
    pub fn sandbox_state(&self) -> SandboxState {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.sandbox_state
    }

    /// Drives the sandbox state externally (session start/stop, recovery
    /// outcomes).
    pub fn set_state(&self, new_state: SandboxState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.sandbox_state != new_state {
            tracing::debug!(from = ?state.sandbox_state, to = ?new_state, "sandbox state changed");
            state.sandbox_state = new_state;
        }
    }

    /// Subscribes to status transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<HealthTransition> {
        self.events.subscribe()
    }

    fn failed_result(
        &self,
        started: Instant,
        details: HealthCheckDetails,
        error: &str,
    ) -> HealthCheckResult {
        HealthCheckResult {
            healthy: false,
            status: HealthStatus::Failed,
            response_time_ms: started.elapsed().as_millis() as u64,
            last_check: Utc::now(),
            error: Some(error.to_string()),
            details,
        }
    }

    fn apply_result(&self, result: HealthCheckResult) {
        let transition = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

            if result.healthy {
                state.consecutive_failures = 0;
            } else {
                state.consecutive_failures += 1;
                state.sandbox_state = SandboxState::Unhealthy;
            }

            let previous = state.last_result.as_ref().map(|r| r.status);
            state.last_result = Some(result.clone());

            // transitions fire only on an actual status change
            if previous != Some(result.status) {
                Some(HealthTransition {
                    from: previous,
                    to: result.status,
                    at: result.last_check,
                    result: result.clone(),
                })
            } else {
                None
            }
        };

        if let Some(transition) = transition {
            tracing::info!(from = ?transition.from, to = ?transition.to, "health status transition");
            let _ = self.events.send(transition);
        }

        if !result.healthy {
            self.bus.record(
                CommandLogEvent::from_failure(
                    "health-check",
                    result.error.clone().unwrap_or_default(),
                )
                .with_tag("health"),
            );
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CommandResult, FakeSandbox};

    fn monitor_with(provider: Arc<FakeSandbox>) -> Arc<HealthMonitor> {
        let bus = Arc::new(TelemetryBus::new(32));
        Arc::new(HealthMonitor::new(provider, bus, HealthConfig::default()))
    }

    #[tokio::test]
    async fn dead_sandbox_fails_without_further_probes() {
        let provider = Arc::new(FakeSandbox::new());
        provider.set_alive(false);
        let monitor = monitor_with(Arc::clone(&provider));

        let result = monitor.force_check().await;

        assert!(!result.healthy);
        assert_eq!(result.status, HealthStatus::Failed);
        assert!(!result.details.sandbox_alive);
        // no command was attempted after the liveness probe failed
        assert!(provider.commands_run().is_empty());
    }

    #[tokio::test]
    async fn responsive_sandbox_reports_healthy() {
        let provider = Arc::new(FakeSandbox::new());
        let monitor = monitor_with(Arc::clone(&provider));

        let result = monitor.force_check().await;

        assert!(result.healthy);
        assert_eq!(result.status, HealthStatus::Healthy);
        assert!(result.details.sandbox_alive);
        assert!(result.details.command_responsive);
    }

    #[tokio::test]
    async fn dev_server_miss_does_not_fail_the_check() {
        let provider = Arc::new(FakeSandbox::new());
        // pgrep probe returns empty stdout -> dev server not found
        provider.script_command("pgrep", CommandResult::fail("", 1));
        let monitor = monitor_with(Arc::clone(&provider));

        let result = monitor.force_check().await;

        assert!(result.healthy);
        assert!(!result.details.dev_server_running);
    }

    #[tokio::test]
    async fn unexpected_echo_output_fails_the_check() {
        let provider = Arc::new(FakeSandbox::new());
        provider.script_command("echo", CommandResult::ok("garbage"));
        let monitor = monitor_with(Arc::clone(&provider));

        let result = monitor.force_check().await;

        assert!(!result.healthy);
        assert!(result.details.sandbox_alive);
        assert!(!result.details.command_responsive);
    }

    #[tokio::test]
    async fn transition_fires_only_on_status_change() {
        let provider = Arc::new(FakeSandbox::new());
        let monitor = monitor_with(Arc::clone(&provider));
        let mut rx = monitor.subscribe();

        // healthy, healthy: one transition (None -> Healthy)
        monitor.force_check().await;
        monitor.force_check().await;

        // kill the sandbox: Failed transition
        provider.set_alive(false);
        monitor.force_check().await;
        monitor.force_check().await;

        let first = rx.try_recv().unwrap();
        assert_eq!(first.from, None);
        assert_eq!(first.to, HealthStatus::Healthy);

        let second = rx.try_recv().unwrap();
        assert_eq!(second.from, Some(HealthStatus::Healthy));
        assert_eq!(second.to, HealthStatus::Failed);

        // repeated identical statuses emitted nothing further
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn recovery_after_failures_reports_degraded() {
        let provider = Arc::new(FakeSandbox::new());
        let monitor = monitor_with(Arc::clone(&provider));

        provider.set_alive(false);
        monitor.force_check().await;
        assert_eq!(monitor.consecutive_failures(), 1);

        provider.set_alive(true);
        let result = monitor.force_check().await;

        // first success after failures is degraded, not healthy
        assert!(result.healthy);
        assert_eq!(result.status, HealthStatus::Degraded);
        assert_eq!(monitor.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn failed_check_marks_sandbox_unhealthy() {
        let provider = Arc::new(FakeSandbox::new());
        let monitor = monitor_with(Arc::clone(&provider));

        monitor.set_state(SandboxState::Ready);
        provider.set_alive(false);
        monitor.force_check().await;

        assert_eq!(monitor.sandbox_state(), SandboxState::Unhealthy);
    }

    #[tokio::test]
    async fn periodic_loop_runs_checks() {
        let provider = Arc::new(FakeSandbox::new());
        let bus = Arc::new(TelemetryBus::new(32));
        let mut config = HealthConfig::default();
        config.check_interval_ms = 10;
        let monitor = Arc::new(HealthMonitor::new(Arc::clone(&provider) as _, bus, config));

        monitor.start();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        monitor.stop();

        assert!(monitor.last_result().is_some());
    }
}
