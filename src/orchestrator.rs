//! Sandbox orchestrator facade.
//!
//! Composes the telemetry bus, health monitor, keep-alive service,
//! validator, recovery handler, and supervisor around one sandbox
//! provider, and owns the sandbox lifecycle from creation through
//! termination. Every dependency is injected through
//! [`OrchestratorContext`]; there is no global state, so tests and
//! multi-sandbox deployments run as many orchestrators as they like.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::SupervisorConfig;
use crate::error::{BuildErrorType, Error, Result};
use crate::health::{HealthMonitor, HealthStatus, SandboxState};
use crate::keepalive::{KeepAliveService, SessionKind};
use crate::provider::{CommandResult, SandboxProvider};
use crate::recovery::{BuildError, BuildErrorHandler, RecoveryOptions, RecoveryResult};
use crate::supervisor::SelfHealingSupervisor;
use crate::telemetry::{CommandLogEvent, TelemetryBus};
use crate::validator::{EnvironmentValidator, ValidationReport};

/// Everything an orchestrator needs to run.
pub struct OrchestratorContext {
    pub provider: Arc<dyn SandboxProvider>,
    pub config: SupervisorConfig,
}

/// Result of running one operation through `execute_with_recovery`.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub result: Option<CommandResult>,
    pub error: Option<String>,
    pub recovered: bool,
}

/// Point-in-time status snapshot for dashboards and the doctor command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub sandbox_id: String,
    pub state: SandboxState,
    pub health: Option<HealthStatus>,
    pub session_active: bool,
    pub last_validation_valid: Option<bool>,
    pub recent_errors: usize,
    pub recovering: bool,
    pub recommendations: Vec<String>,
}

/// Lifecycle facade over one sandbox and its supervision components.
pub struct SandboxOrchestrator {
    provider: Arc<dyn SandboxProvider>,
    config: SupervisorConfig,
    bus: Arc<TelemetryBus>,
    monitor: Arc<HealthMonitor>,
    keepalive: Arc<KeepAliveService>,
    validator: Arc<EnvironmentValidator>,
    handler: Arc<BuildErrorHandler>,
    supervisor: Arc<SelfHealingSupervisor>,
    last_validation: std::sync::Mutex<Option<ValidationReport>>,
}

impl SandboxOrchestrator {
    pub fn new(context: OrchestratorContext) -> Self {
        let OrchestratorContext { provider, config } = context;
        let bus = Arc::new(TelemetryBus::new(config.telemetry.ring_capacity));
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&provider),
            Arc::clone(&bus),
            config.health.clone(),
        ));
        let keepalive = Arc::new(KeepAliveService::new(
            Arc::clone(&provider),
            Arc::clone(&monitor),
            Arc::clone(&bus),
            config.keepalive.clone(),
        ));
        let validator = Arc::new(EnvironmentValidator::new(Arc::clone(&provider)));
        let handler = Arc::new(BuildErrorHandler::new(
            Arc::clone(&provider),
            Arc::clone(&bus),
            config.recovery.clone(),
        ));
        let supervisor = Arc::new(SelfHealingSupervisor::new(
            Arc::clone(&provider),
            Arc::clone(&bus),
            Arc::clone(&handler),
            Arc::clone(&validator),
            config.recovery.clone(),
            config.sweep.clone(),
        ));
        Self {
            provider,
            config,
            bus,
            monitor,
            keepalive,
            validator,
            handler,
            supervisor,
            last_validation: std::sync::Mutex::new(None),
        }
    }

    pub fn bus(&self) -> Arc<TelemetryBus> {
        Arc::clone(&self.bus)
    }

    pub fn monitor(&self) -> Arc<HealthMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn keepalive(&self) -> Arc<KeepAliveService> {
        Arc::clone(&self.keepalive)
    }

    pub fn handler(&self) -> Arc<BuildErrorHandler> {
        Arc::clone(&self.handler)
    }

    pub fn supervisor(&self) -> Arc<SelfHealingSupervisor> {
        Arc::clone(&self.supervisor)
    }

    /// Brings the sandbox under supervision and validates the environment.
    ///
    /// Starts the health monitor and the self-healing supervisor, runs a
    /// first health check, and performs full validation. The sandbox is
    /// marked ready only when both pass.
    pub async fn create_and_validate(&self) -> Result<ValidationReport> {
        self.monitor.start();
        self.supervisor.start();

        let check = self.monitor.force_check().await;
        if !check.healthy {
            return Err(Error::NotReady(format!(
                "initial health check failed: {}",
                check.error.unwrap_or_else(|| "unknown".to_string())
            )));
        }

        let report = self.validator.validate().await;
        {
            let mut last = self.last_validation.lock().unwrap_or_else(|e| e.into_inner());
            *last = Some(report.clone());
        }
        if !report.valid {
            let detail = report
                .first_failure()
                .map(|c| c.message.clone())
                .unwrap_or_else(|| "validation failed".to_string());
            return Err(Error::Validation(detail));
        }

        self.monitor.set_state(SandboxState::Ready);
        let info = self.provider.sandbox_info().await;
        tracing::info!(sandbox_id = %info.sandbox_id, url = %info.url, "sandbox ready");
        Ok(report)
    }

    /// Polls until the sandbox is ready or the timeout elapses.
    ///
    /// Readiness means the health monitor reports a passing check and a
    /// quick validation succeeds.
    pub async fn ensure_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let healthy = self
                .monitor
                .last_result()
                .map(|r| r.healthy)
                .unwrap_or(false);
            if healthy && self.validator.quick_validate().await.valid {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::NotReady("sandbox did not become ready".to_string()));
            }
            self.monitor.force_check().await;
            tokio::time::sleep(self.config.orchestrator.ready_poll()).await;
        }
    }

    /// Starts a generation session.
    ///
    /// Refused while a session is already active or the sandbox is not in a
    /// workable state. Starts keep-alive heartbeats and marks the sandbox
    /// active.
    pub fn start_generation(&self) -> Result<String> {
        if self.keepalive.is_active() {
            return Err(Error::Busy("a generation session is already active".to_string()));
        }
        let state = self.monitor.sandbox_state();
        if !matches!(state, SandboxState::Ready | SandboxState::Active | SandboxState::Idle) {
            return Err(Error::NotReady(format!(
                "cannot start generation while sandbox is {:?}",
                state
            )));
        }
        let keepalive = Arc::clone(&self.keepalive);
        let session_id = keepalive.start_session(SessionKind::Generation);
        self.monitor.set_state(SandboxState::Active);
        tracing::info!(%session_id, "generation session started");
        Ok(session_id)
    }

    /// Ends the active generation session, returns the sandbox to idle, and
    /// runs a closing validation so callers learn the environment they left
    /// behind.
    pub async fn end_generation(&self) -> ValidationReport {
        self.keepalive.end_session();
        if self.monitor.sandbox_state() == SandboxState::Active {
            self.monitor.set_state(SandboxState::Idle);
        }
        let report = self.validator.validate().await;
        {
            let mut last = self.last_validation.lock().unwrap_or_else(|e| e.into_inner());
            *last = Some(report.clone());
        }
        tracing::info!(valid = report.valid, "generation session ended");
        report
    }

    /// Runs a command with classify-recover-retry semantics.
    ///
    /// On failure the output is classified; recoverable errors get one
    /// recovery pass and, if it succeeds, one retry of the original
    /// command. An operation error (sandbox unreachable, timeout) is
    /// classified from its message and routed through the same path. The
    /// closure must be re-invokable.
    pub async fn execute_with_recovery<F>(&self, command: F) -> ExecutionOutcome
    where
        F: Fn() -> String,
    {
        let (result, errors) = match self.run_logged(&command()).await {
            Ok(result) if result.success => {
                return ExecutionOutcome {
                    success: true,
                    result: Some(result),
                    error: None,
                    recovered: false,
                }
            }
            Ok(result) => {
                let errors = self.handler.detect_errors(&result.combined_output());
                if errors.is_empty() || errors.iter().any(|e| !e.error_type.is_recoverable()) {
                    return ExecutionOutcome {
                        success: false,
                        result: Some(result),
                        error: Some("unrecoverable command failure".to_string()),
                        recovered: false,
                    };
                }
                (Some(result), errors)
            }
            Err(e) => {
                let message = e.to_string();
                let error_type = BuildErrorType::classify(&message);
                if !error_type.is_recoverable() {
                    return ExecutionOutcome {
                        success: false,
                        result: None,
                        error: Some(message),
                        recovered: false,
                    };
                }
                let errors = vec![BuildError {
                    error_type,
                    message,
                    file: None,
                    line: None,
                    column: None,
                    suggestion: None,
                }];
                (None, errors)
            }
        };

        let recovery = self
            .handler
            .recover(&errors, RecoveryOptions::from_config(&self.config.recovery))
            .await;
        if !recovery.success {
            return ExecutionOutcome {
                success: false,
                result,
                error: recovery.final_error,
                recovered: false,
            };
        }

        match self.run_logged(&command()).await {
            Ok(retry) => ExecutionOutcome {
                success: retry.success,
                error: if retry.success {
                    None
                } else {
                    Some(retry.stderr.clone())
                },
                result: Some(retry),
                recovered: true,
            },
            Err(e) => ExecutionOutcome {
                success: false,
                result: None,
                error: Some(e.to_string()),
                recovered: true,
            },
        }
    }

    /// Detects errors in raw output and runs recovery over them.
    pub async fn recover_from_errors(&self, raw: &str) -> Result<RecoveryResult> {
        let errors = self.handler.detect_errors(raw);
        if errors.is_empty() {
            return Err(Error::Validation("no recognizable errors in output".to_string()));
        }
        Ok(self
            .handler
            .recover(&errors, RecoveryOptions::from_config(&self.config.recovery))
            .await)
    }

    /// Current status snapshot with remediation recommendations.
    pub async fn status(&self) -> OrchestratorStatus {
        let info = self.provider.sandbox_info().await;
        let state = self.monitor.sandbox_state();
        let last_check = self.monitor.last_result();
        let last_validation = {
            let last = self.last_validation.lock().unwrap_or_else(|e| e.into_inner());
            last.clone()
        };
        let recent_errors = self
            .bus
            .recent(50)
            .iter()
            .filter(|e| !e.success)
            .count();

        let mut recommendations = Vec::new();
        match state {
            SandboxState::Unhealthy => {
                recommendations.push("sandbox is unhealthy; consider restarting it".to_string());
            }
            SandboxState::Terminated => {
                recommendations.push("sandbox is terminated; create a new one".to_string());
            }
            _ => {}
        }
        if last_check.as_ref().map(|r| r.status) == Some(HealthStatus::Degraded) {
            recommendations.push("sandbox is responding slowly".to_string());
        }
        if let Some(report) = &last_validation {
            if !report.valid {
                if let Some(failure) = report.first_failure() {
                    recommendations.push(format!("fix validation: {}", failure.message));
                }
            }
        }
        if recent_errors > 10 {
            recommendations.push("high command failure rate; check the dev server logs".to_string());
        }

        OrchestratorStatus {
            sandbox_id: info.sandbox_id,
            state,
            health: last_check.map(|r| r.status),
            session_active: self.keepalive.is_active(),
            last_validation_valid: last_validation.map(|r| r.valid),
            recent_errors,
            recovering: self.handler.is_recovery_in_progress(),
            recommendations,
        }
    }

    /// Stops supervision and terminates the sandbox.
    pub async fn shutdown(&self) -> Result<()> {
        self.keepalive.end_session();
        self.supervisor.stop();
        self.monitor.stop();
        self.provider.terminate().await?;
        self.monitor.set_state(SandboxState::Terminated);
        tracing::info!("orchestrator shut down");
        Ok(())
    }

    // Facade-executed commands are recorded untagged so the supervisor
    // treats them like any other activity; the "recovery" tag belongs to
    // recovery-initiated commands only.
    async fn run_logged(&self, command: &str) -> Result<CommandResult> {
        let info = self.provider.sandbox_info().await;
        match self.provider.run_command(command).await {
            Ok(result) => {
                self.bus.record(
                    CommandLogEvent::from_result(command, &result)
                        .with_sandbox(info.provider, info.sandbox_id),
                );
                Ok(result)
            }
            Err(e) => {
                self.bus.record(
                    CommandLogEvent::from_failure(command, e.to_string())
                        .with_sandbox(info.provider, info.sandbox_id),
                );
                Err(e)
            }
        }
    }
}
