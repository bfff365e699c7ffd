//! Self-healing supervisor.
//!
//! Watches the telemetry bus and reacts to command outcomes: failed
//! commands trigger immediate error detection and recovery; successful
//! install or build commands schedule a debounced full check so bursts of
//! activity produce one sweep instead of many. When deterministic recovery
//! cannot fix a build, the supervisor broadcasts an escalation request for
//! the AI debug loop to pick up.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{RecoveryConfig, SweepConfig};
use crate::debounce::Debouncer;
use crate::recovery::{BuildError, BuildErrorHandler, RecoveryOptions, RecoveryResult};
use crate::telemetry::{CommandLogEvent, TelemetryBus};
use crate::validator::{EnvironmentValidator, ValidationReport};

/// Hand-off request for errors deterministic recovery could not fix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub errors: Vec<BuildError>,
    pub reason: String,
}

/// Outcome of one full check sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub reason: String,
    pub lint_passed: bool,
    pub build_passed: bool,
    pub validation: ValidationReport,
    pub errors: Vec<BuildError>,
    pub recovery: Option<RecoveryResult>,
    pub escalated: bool,
}

/// Reactive supervisor wiring telemetry to recovery and validation.
pub struct SelfHealingSupervisor {
    provider: Arc<dyn crate::provider::SandboxProvider>,
    bus: Arc<TelemetryBus>,
    handler: Arc<BuildErrorHandler>,
    validator: Arc<EnvironmentValidator>,
    recovery_config: RecoveryConfig,
    debouncer: Arc<Debouncer>,
    escalations: broadcast::Sender<EscalationRequest>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SelfHealingSupervisor {
    pub fn new(
        provider: Arc<dyn crate::provider::SandboxProvider>,
        bus: Arc<TelemetryBus>,
        handler: Arc<BuildErrorHandler>,
        validator: Arc<EnvironmentValidator>,
        recovery_config: RecoveryConfig,
        sweep_config: SweepConfig,
    ) -> Self {
        let (escalations, _) = broadcast::channel(16);
        Self {
            provider,
            bus,
            handler,
            validator,
            recovery_config,
            debouncer: Arc::new(Debouncer::new(sweep_config.debounce())),
            escalations,
            task: std::sync::Mutex::new(None),
        }
    }

    /// Subscribes to escalation requests produced when recovery gives up.
    pub fn subscribe_escalations(&self) -> broadcast::Receiver<EscalationRequest> {
        self.escalations.subscribe()
    }

    /// Starts watching the telemetry bus. Idempotent; restarting replaces
    /// the previous watcher.
    pub fn start(self: &Arc<Self>) {
        let mut rx = self.bus.subscribe();
        let supervisor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => supervisor.on_event(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "telemetry watcher lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
    }

    /// Stops the telemetry watcher and cancels any pending sweep.
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
        }
        self.debouncer.cancel();
    }

    fn on_event(self: &Arc<Self>, event: CommandLogEvent) {
        // heartbeats and recovery's own commands must not re-trigger sweeps
        if event.tags.iter().any(|t| t == "heartbeat" || t == "recovery") {
            return;
        }

        if !event.success {
            let supervisor = Arc::clone(self);
            tokio::spawn(async move {
                supervisor.handle_failure(event).await;
            });
            return;
        }

        if event.kind().triggers_full_check() {
            let supervisor = Arc::clone(self);
            let command = event.command.clone();
            self.debouncer.schedule(move || async move {
                let reason = format!("after: {}", command);
                let _ = supervisor.run_full_check(&reason).await;
            });
        }
    }

    async fn handle_failure(&self, event: CommandLogEvent) {
        let errors = self.handler.detect_errors(&event.combined_output());
        if errors.is_empty() {
            tracing::debug!(command = %event.command, "command failed but no known error pattern matched");
            return;
        }

        tracing::info!(
            command = %event.command,
            errors = errors.len(),
            "command failure detected, attempting recovery"
        );
        let result = self
            .handler
            .recover(&errors, RecoveryOptions::from_config(&self.recovery_config))
            .await;
        if !result.success {
            self.escalate(errors, format!("recovery failed for: {}", event.command));
        }
    }

    fn escalate(&self, errors: Vec<BuildError>, reason: String) {
        tracing::warn!(%reason, errors = errors.len(), "escalating to the debug loop");
        // no receiver means no debug loop is attached; drop silently
        let _ = self.escalations.send(EscalationRequest { errors, reason });
    }

    /// Runs lint, build, and environment validation as one sweep.
    ///
    /// A failing build feeds recovery; if recovery cannot fix it, the
    /// errors are escalated. Lint failures are reported but never escalate.
    pub async fn run_full_check(&self, reason: &str) -> SweepReport {
        tracing::info!(%reason, "running full check");

        let lint = self.run_step("npm run lint --if-present").await;
        let build = self.run_step("npm run build --if-present").await;
        let validation = self.validator.validate().await;

        let mut errors = Vec::new();
        let mut recovery = None;
        let mut escalated = false;

        if !build.0 {
            errors = self.handler.detect_errors(&build.1);
            if !errors.is_empty() {
                let result = self
                    .handler
                    .recover(&errors, RecoveryOptions::from_config(&self.recovery_config))
                    .await;
                let recovered = result.success;
                recovery = Some(result);
                if !recovered {
                    self.escalate(errors.clone(), format!("full check build failure ({})", reason));
                    escalated = true;
                }
            }
        }

        SweepReport {
            reason: reason.to_string(),
            lint_passed: lint.0,
            build_passed: build.0,
            validation,
            errors,
            recovery,
            escalated,
        }
    }

    async fn run_step(&self, command: &str) -> (bool, String) {
        match self.provider.run_command(command).await {
            Ok(result) => {
                self.bus
                    .record(CommandLogEvent::from_result(command, &result).with_tag("recovery"));
                (result.success, result.combined_output())
            }
            Err(e) => (false, e.to_string()),
        }
    }
}

impl Drop for SelfHealingSupervisor {
    fn drop(&mut self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CommandResult, FakeSandbox};
    use std::time::Duration;

    fn rig(provider: Arc<FakeSandbox>) -> (Arc<SelfHealingSupervisor>, Arc<TelemetryBus>) {
        let bus = Arc::new(TelemetryBus::new(64));
        let mut recovery_config = RecoveryConfig::default();
        recovery_config.retry_delay_ms = 1;
        let handler = Arc::new(BuildErrorHandler::new(
            Arc::clone(&provider) as _,
            Arc::clone(&bus),
            recovery_config.clone(),
        ));
        let validator = Arc::new(EnvironmentValidator::new(Arc::clone(&provider) as _));
        let mut sweep_config = SweepConfig::default();
        sweep_config.debounce_ms = 10;
        let supervisor = Arc::new(SelfHealingSupervisor::new(
            provider,
            Arc::clone(&bus),
            handler,
            validator,
            recovery_config,
            sweep_config,
        ));
        (supervisor, bus)
    }

    fn healthy(provider: &FakeSandbox) {
        provider.script_command("pgrep", CommandResult::ok("1234"));
        provider.script_command("tail", CommandResult::ok(""));
        provider.seed_file("package.json", r#"{"scripts":{"dev":"vite"}}"#);
        provider.seed_file("src/main.tsx", "");
    }

    #[tokio::test]
    async fn clean_sweep_passes() {
        let provider = Arc::new(FakeSandbox::new());
        healthy(&provider);
        let (supervisor, _bus) = rig(provider);

        let report = supervisor.run_full_check("manual").await;

        assert!(report.lint_passed);
        assert!(report.build_passed);
        assert!(report.validation.valid);
        assert!(report.errors.is_empty());
        assert!(!report.escalated);
    }

    #[tokio::test]
    async fn failing_build_escalates_after_recovery_fails() {
        let provider = Arc::new(FakeSandbox::new());
        healthy(&provider);
        provider.script_command(
            "npm run build",
            CommandResult::fail("SyntaxError: Unexpected token", 1),
        );
        let (supervisor, _bus) = rig(provider);
        let mut escalations = supervisor.subscribe_escalations();

        let report = supervisor.run_full_check("manual").await;

        assert!(!report.build_passed);
        assert!(report.escalated);
        assert!(!report.recovery.as_ref().unwrap().success);

        let request = escalations.recv().await.unwrap();
        assert_eq!(request.errors.len(), 1);
        assert!(request.reason.contains("full check"));
    }

    #[tokio::test]
    async fn lint_failure_reports_without_escalating() {
        let provider = Arc::new(FakeSandbox::new());
        healthy(&provider);
        provider.script_command("npm run lint", CommandResult::fail("2 problems", 1));
        let (supervisor, _bus) = rig(provider);

        let report = supervisor.run_full_check("manual").await;

        assert!(!report.lint_passed);
        assert!(report.build_passed);
        assert!(!report.escalated);
    }

    #[tokio::test]
    async fn successful_install_triggers_debounced_sweep() {
        let provider = Arc::new(FakeSandbox::new());
        healthy(&provider);
        let (supervisor, bus) = rig(Arc::clone(&provider));
        supervisor.start();
        tokio::time::sleep(Duration::from_millis(5)).await;

        bus.record(CommandLogEvent::from_result(
            "npm install axios",
            &CommandResult::ok("added 1 package"),
        ));

        tokio::time::sleep(Duration::from_millis(80)).await;
        let commands = provider.commands_run();
        assert!(commands.iter().any(|c| c.contains("run lint")));
        assert!(commands.iter().any(|c| c.contains("run build")));
        supervisor.stop();
    }

    #[tokio::test]
    async fn heartbeat_events_are_ignored() {
        let provider = Arc::new(FakeSandbox::new());
        healthy(&provider);
        let (supervisor, bus) = rig(Arc::clone(&provider));
        supervisor.start();
        tokio::time::sleep(Duration::from_millis(5)).await;

        bus.record(
            CommandLogEvent::from_result("npm install left-pad", &CommandResult::ok("ok"))
                .with_tag("heartbeat"),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(provider.commands_run().is_empty());
        supervisor.stop();
    }

    #[tokio::test]
    async fn failed_command_recovers_immediately() {
        let provider = Arc::new(FakeSandbox::new());
        healthy(&provider);
        let (supervisor, bus) = rig(Arc::clone(&provider));
        supervisor.start();
        tokio::time::sleep(Duration::from_millis(5)).await;

        // a timeout error recovers via plain retry
        bus.record(CommandLogEvent::from_result(
            "curl localhost:3000",
            &CommandResult::fail("Error: connect ETIMEDOUT", 28),
        ));

        tokio::time::sleep(Duration::from_millis(80)).await;
        let commands = provider.commands_run();
        assert!(commands.iter().any(|c| c.contains("recovery-probe")));
        supervisor.stop();
    }
}
