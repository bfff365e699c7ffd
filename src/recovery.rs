//! Build error detection and strategy-ordered recovery.
//!
//! Detection is line-oriented keyword matching over combined command
//! output; one output blob can yield several distinct errors. Recovery
//! derives a deterministic strategy plan from the set of error types
//! present and executes it strictly in order under a global per-handler
//! lock. Concurrent callers join the in-flight run and receive its result
//! instead of starting a second one.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::RecoveryConfig;
use crate::error::BuildErrorType;
use crate::provider::SandboxProvider;
use crate::telemetry::{CommandLogEvent, TelemetryBus};

/// A classified error extracted from raw command output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildError {
    pub error_type: BuildErrorType,
    pub message: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

/// One deterministic remediation action, attempted in fixed priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryStrategy {
    Retry,
    ClearCache,
    RestartDevServer,
    Reinstall,
    EscalateToAi,
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecoveryStrategy::Retry => "retry",
            RecoveryStrategy::ClearCache => "clear-cache",
            RecoveryStrategy::RestartDevServer => "restart-dev-server",
            RecoveryStrategy::Reinstall => "reinstall",
            RecoveryStrategy::EscalateToAi => "escalate-to-ai",
        };
        f.write_str(s)
    }
}

/// Read-only audit record of one recovery invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub success: bool,
    pub attempts_made: u32,
    pub recovered_via: Option<RecoveryStrategy>,
    pub final_error: Option<String>,
    pub duration_ms: u64,
}

/// Per-invocation recovery limits. Defaults come from [`RecoveryConfig`].
#[derive(Debug, Clone, Copy)]
pub struct RecoveryOptions {
    pub max_attempts: u32,
    pub timeout: std::time::Duration,
}

impl RecoveryOptions {
    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            timeout: config.timeout(),
        }
    }
}

/// Line-oriented classifier for build/install/runtime failures.
///
/// Each line is classified independently and yields at most one error;
/// categories are checked in precedence order so a line matching several
/// keyword families lands in the most actionable one.
pub struct ErrorDetector;

impl ErrorDetector {
    pub fn new() -> Self {
        Self
    }

    /// Scans raw combined output and returns every classified error.
    pub fn detect(&self, raw: &str) -> Vec<BuildError> {
        raw.lines().filter_map(|line| self.analyze_line(line)).collect()
    }

    fn analyze_line(&self, line: &str) -> Option<BuildError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lower = trimmed.to_lowercase();

        if let Some(error) = self.match_install(trimmed, &lower) {
            return Some(error);
        }
        if let Some(error) = self.match_build(trimmed, &lower) {
            return Some(error);
        }
        if let Some(error) = self.match_timeout(trimmed, &lower) {
            return Some(error);
        }
        if let Some(error) = self.match_connection(trimmed, &lower) {
            return Some(error);
        }
        self.match_runtime(trimmed, &lower)
    }

    fn match_install(&self, line: &str, lower: &str) -> Option<BuildError> {
        if lower.contains("cannot find module") || lower.contains("cannot find package") {
            let package = extract_quoted(line).unwrap_or_else(|| "unknown".to_string());
            return Some(BuildError {
                error_type: BuildErrorType::Install,
                message: format!("Missing package: {}", package),
                file: None,
                line: None,
                column: None,
                suggestion: Some(format!("npm install {}", package)),
            });
        }
        if lower.contains("npm err")
            || lower.contains("eresolve")
            || lower.contains("unable to resolve dependency")
        {
            return Some(BuildError {
                error_type: BuildErrorType::Install,
                message: line.to_string(),
                file: None,
                line: None,
                column: None,
                suggestion: Some("reinstall dependencies".to_string()),
            });
        }
        None
    }

    fn match_build(&self, line: &str, lower: &str) -> Option<BuildError> {
        let is_build = lower.contains("syntax error")
            || lower.contains("syntaxerror")
            || lower.contains("unexpected token")
            || lower.contains("build failed")
            || lower.contains("compilation failed")
            || lower.contains("module parse failed")
            || lower.contains("error ts");
        if !is_build {
            return None;
        }
        let location = extract_location(line);
        Some(BuildError {
            error_type: BuildErrorType::Build,
            message: line.to_string(),
            file: location.as_ref().map(|l| l.0.clone()),
            line: location.as_ref().map(|l| l.1),
            column: location.as_ref().and_then(|l| l.2),
            suggestion: None,
        })
    }

    fn match_timeout(&self, line: &str, lower: &str) -> Option<BuildError> {
        if lower.contains("timed out") || lower.contains("etimedout") {
            return Some(BuildError {
                error_type: BuildErrorType::Timeout,
                message: line.to_string(),
                file: None,
                line: None,
                column: None,
                suggestion: Some("retry the operation".to_string()),
            });
        }
        None
    }

    fn match_connection(&self, line: &str, lower: &str) -> Option<BuildError> {
        let is_connection = lower.contains("econnrefused")
            || lower.contains("econnreset")
            || lower.contains("bad gateway")
            || lower.contains("socket hang up")
            || lower.contains("network unreachable")
            || lower.contains("fetch failed");
        if !is_connection {
            return None;
        }
        Some(BuildError {
            error_type: BuildErrorType::Connection,
            message: line.to_string(),
            file: None,
            line: None,
            column: None,
            suggestion: Some("restart the dev server".to_string()),
        })
    }

    fn match_runtime(&self, line: &str, lower: &str) -> Option<BuildError> {
        let is_runtime = lower.contains("referenceerror")
            || lower.contains("typeerror")
            || lower.contains("is not defined")
            || lower.contains("is not a function")
            || lower.contains("unhandled promise rejection")
            || lower.contains("uncaught exception");
        if !is_runtime {
            return None;
        }
        Some(BuildError {
            error_type: BuildErrorType::Runtime,
            message: line.to_string(),
            file: None,
            line: None,
            column: None,
            suggestion: None,
        })
    }
}

impl Default for ErrorDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts the first single- or double-quoted token from a line.
fn extract_quoted(line: &str) -> Option<String> {
    for quote in ['\'', '"'] {
        if let Some(start) = line.find(quote) {
            if let Some(end) = line[start + 1..].find(quote) {
                let inner = &line[start + 1..start + 1 + end];
                if !inner.is_empty() {
                    return Some(inner.to_string());
                }
            }
        }
    }
    None
}

/// Extracts a `path:line[:column]` location token, e.g. `src/App.tsx:10:5`.
fn extract_location(line: &str) -> Option<(String, u32, Option<u32>)> {
    for token in line.split_whitespace() {
        let token = token.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '/' && c != '.' && c != ':' && c != '_' && c != '-');
        let parts: Vec<&str> = token.split(':').collect();
        if parts.len() < 2 || !parts[0].contains('.') {
            continue;
        }
        if let Ok(line_no) = parts[1].parse::<u32>() {
            let column = parts.get(2).and_then(|c| c.parse::<u32>().ok());
            return Some((parts[0].to_string(), line_no, column));
        }
    }
    None
}

/// Derives the ordered strategy plan from the distinct error types present.
///
/// `retry` is always first; `escalate-to-ai` exists only to signal hand-off
/// to the debug loop and never succeeds itself.
pub fn plan_strategies(errors: &[BuildError]) -> Vec<RecoveryStrategy> {
    let kinds: HashSet<BuildErrorType> = errors.iter().map(|e| e.error_type).collect();
    let mut plan = vec![RecoveryStrategy::Retry];

    if kinds.contains(&BuildErrorType::Connection) || kinds.contains(&BuildErrorType::Timeout) {
        plan.push(RecoveryStrategy::RestartDevServer);
    }
    if kinds.contains(&BuildErrorType::Install) {
        plan.push(RecoveryStrategy::ClearCache);
        plan.push(RecoveryStrategy::Reinstall);
    }
    if kinds.contains(&BuildErrorType::Build) {
        plan.push(RecoveryStrategy::RestartDevServer);
        plan.push(RecoveryStrategy::EscalateToAi);
    }
    if kinds.contains(&BuildErrorType::Runtime) {
        plan.push(RecoveryStrategy::EscalateToAi);
    }

    // dedupe preserving first occurrence
    let mut seen = HashSet::new();
    plan.retain(|s| seen.insert(*s));
    plan
}

enum RecoveryRole {
    Leader(watch::Sender<Option<RecoveryResult>>),
    Follower(watch::Receiver<Option<RecoveryResult>>),
}

/// Pattern-based classifier plus strategy-ordered recovery engine.
pub struct BuildErrorHandler {
    provider: Arc<dyn SandboxProvider>,
    bus: Arc<TelemetryBus>,
    detector: ErrorDetector,
    config: RecoveryConfig,
    inflight: std::sync::Mutex<Option<watch::Receiver<Option<RecoveryResult>>>>,
}

impl BuildErrorHandler {
    pub fn new(
        provider: Arc<dyn SandboxProvider>,
        bus: Arc<TelemetryBus>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            provider,
            bus,
            detector: ErrorDetector::new(),
            config,
            inflight: std::sync::Mutex::new(None),
        }
    }

    /// Classifies raw command output into build errors.
    pub fn detect_errors(&self, raw: &str) -> Vec<BuildError> {
        self.detector.detect(raw)
    }

    /// Whether a recovery run is currently executing.
    pub fn is_recovery_in_progress(&self) -> bool {
        let inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        inflight.is_some()
    }

    /// Renders errors as a prompt-ready summary for the debug loop.
    pub fn format_errors_for_ai(&self, errors: &[BuildError]) -> String {
        let mut out = String::from("The following errors were detected in the sandbox:\n");
        for (i, error) in errors.iter().enumerate() {
            out.push_str(&format!("{}. [{}] {}", i + 1, error.error_type, error.message));
            if let Some(file) = &error.file {
                out.push_str(&format!(" ({}", file));
                if let Some(line) = error.line {
                    out.push_str(&format!(":{}", line));
                }
                out.push(')');
            }
            if let Some(suggestion) = &error.suggestion {
                out.push_str(&format!(" - suggested fix: {}", suggestion));
            }
            out.push('\n');
        }
        out
    }

    /// Runs the strategy chain for the given errors.
    ///
    /// If a recovery is already in flight, joins it and returns its result
    /// rather than executing a duplicate chain.
    pub async fn recover(&self, errors: &[BuildError], options: RecoveryOptions) -> RecoveryResult {
        let role = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            match inflight.as_ref() {
                Some(rx) => RecoveryRole::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *inflight = Some(rx);
                    RecoveryRole::Leader(tx)
                }
            }
        };

        match role {
            RecoveryRole::Follower(mut rx) => {
                tracing::debug!("recovery already in flight, joining");
                loop {
                    if let Some(result) = rx.borrow().clone() {
                        return result;
                    }
                    if rx.changed().await.is_err() {
                        // leader dropped without publishing; report failure
                        return RecoveryResult {
                            success: false,
                            attempts_made: 0,
                            recovered_via: None,
                            final_error: Some("in-flight recovery aborted".to_string()),
                            duration_ms: 0,
                        };
                    }
                }
            }
            RecoveryRole::Leader(tx) => {
                let result = self.run_strategies(errors, options).await;
                {
                    let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
                    *inflight = None;
                }
                let _ = tx.send(Some(result.clone()));
                result
            }
        }
    }

    async fn run_strategies(&self, errors: &[BuildError], options: RecoveryOptions) -> RecoveryResult {
        let started = Instant::now();
        let deadline = started + options.timeout;
        let plan = plan_strategies(errors);
        let kinds: HashSet<BuildErrorType> = errors.iter().map(|e| e.error_type).collect();

        tracing::info!(?plan, errors = errors.len(), "starting recovery");

        let mut attempts = 0;
        let mut last_error: Option<String> = errors.first().map(|e| e.message.clone());

        for strategy in plan {
            if attempts >= options.max_attempts {
                tracing::warn!(attempts, "recovery attempt limit reached");
                break;
            }
            if Instant::now() >= deadline {
                tracing::warn!("recovery timeout reached");
                last_error = Some("recovery timed out".to_string());
                break;
            }
            attempts += 1;

            match self.execute_strategy(strategy, &kinds).await {
                Ok(()) => {
                    tracing::info!(%strategy, attempts, "recovery succeeded");
                    return RecoveryResult {
                        success: true,
                        attempts_made: attempts,
                        recovered_via: Some(strategy),
                        final_error: None,
                        duration_ms: started.elapsed().as_millis() as u64,
                    };
                }
                Err(reason) => {
                    tracing::debug!(%strategy, %reason, "strategy did not resolve the errors");
                    last_error = Some(reason);
                }
            }
        }

        RecoveryResult {
            success: false,
            attempts_made: attempts,
            recovered_via: None,
            final_error: last_error,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn execute_strategy(
        &self,
        strategy: RecoveryStrategy,
        kinds: &HashSet<BuildErrorType>,
    ) -> std::result::Result<(), String> {
        match strategy {
            RecoveryStrategy::Retry => {
                tokio::time::sleep(self.config.retry_delay()).await;
                self.verify(kinds).await
            }
            RecoveryStrategy::ClearCache => {
                let result = self
                    .provider
                    .run_command("rm -rf node_modules/.cache .next/cache dist .turbo")
                    .await
                    .map_err(|e| e.to_string())?;
                self.bus
                    .record(CommandLogEvent::from_result("clear-cache", &result).with_tag("recovery"));
                self.verify(kinds).await
            }
            RecoveryStrategy::RestartDevServer => {
                self.provider
                    .restart_dev_server()
                    .await
                    .map_err(|e| e.to_string())?;
                self.verify(kinds).await
            }
            RecoveryStrategy::Reinstall => {
                let result = self
                    .provider
                    .install_packages(&[])
                    .await
                    .map_err(|e| e.to_string())?;
                self.bus
                    .record(CommandLogEvent::from_result("reinstall", &result).with_tag("recovery"));
                if !result.success {
                    return Err(format!("reinstall failed: {}", result.stderr));
                }
                self.verify(kinds).await
            }
            RecoveryStrategy::EscalateToAi => {
                // hand-off signal only; by definition never succeeds here
                tracing::info!("escalating to the debug loop");
                Err("escalated to AI debug loop".to_string())
            }
        }
    }

    /// Verifies that the original error class is gone.
    ///
    /// Build/install errors re-run the build; transient classes only need
    /// the sandbox to answer a probe.
    async fn verify(&self, kinds: &HashSet<BuildErrorType>) -> std::result::Result<(), String> {
        let needs_build = kinds.contains(&BuildErrorType::Build)
            || kinds.contains(&BuildErrorType::Install)
            || kinds.contains(&BuildErrorType::Runtime);
        let command = if needs_build {
            "npm run build --if-present"
        } else {
            "echo recovery-probe"
        };

        let result = self
            .provider
            .run_command(command)
            .await
            .map_err(|e| e.to_string())?;
        if !result.success {
            return Err(format!("verification command failed: {}", result.stderr));
        }
        let remaining = self.detector.detect(&result.combined_output());
        if remaining.is_empty() {
            Ok(())
        } else {
            Err(format!("{} errors still present", remaining.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CommandResult, FakeSandbox};

    fn build_error(kind: BuildErrorType) -> BuildError {
        BuildError {
            error_type: kind,
            message: format!("{} error", kind),
            file: None,
            line: None,
            column: None,
            suggestion: None,
        }
    }

    fn handler_with(provider: Arc<FakeSandbox>) -> BuildErrorHandler {
        let bus = Arc::new(TelemetryBus::new(64));
        let mut config = RecoveryConfig::default();
        config.retry_delay_ms = 1;
        BuildErrorHandler::new(provider, bus, config)
    }

    #[test]
    fn detect_missing_package() {
        let detector = ErrorDetector::new();
        let errors = detector.detect("npm ERR! Cannot find module 'axios'\n");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, BuildErrorType::Install);
        assert_eq!(errors[0].message, "Missing package: axios");
        assert_eq!(errors[0].suggestion.as_deref(), Some("npm install axios"));
    }

    #[test]
    fn detect_multiple_errors_in_one_blob() {
        let detector = ErrorDetector::new();
        let raw = "\
npm ERR! peer dep missing\n\
SyntaxError: Unexpected token at src/App.tsx:10:5\n\
ReferenceError: foo is not defined\n\
Compiling...\n";
        let errors = detector.detect(raw);

        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].error_type, BuildErrorType::Install);
        assert_eq!(errors[1].error_type, BuildErrorType::Build);
        assert_eq!(errors[2].error_type, BuildErrorType::Runtime);
    }

    #[test]
    fn detect_extracts_build_location() {
        let detector = ErrorDetector::new();
        let errors = detector.detect("SyntaxError: Unexpected token at src/App.tsx:10:5");

        assert_eq!(errors[0].file.as_deref(), Some("src/App.tsx"));
        assert_eq!(errors[0].line, Some(10));
        assert_eq!(errors[0].column, Some(5));
    }

    #[test]
    fn detect_ignores_normal_output() {
        let detector = ErrorDetector::new();
        assert!(detector.detect("Compiled successfully in 2.3s\n").is_empty());
        assert!(detector.detect("").is_empty());
    }

    #[test]
    fn plan_for_build_errors() {
        let plan = plan_strategies(&[build_error(BuildErrorType::Build)]);
        assert_eq!(
            plan,
            vec![
                RecoveryStrategy::Retry,
                RecoveryStrategy::RestartDevServer,
                RecoveryStrategy::EscalateToAi
            ]
        );
    }

    #[test]
    fn plan_for_install_errors() {
        let plan = plan_strategies(&[build_error(BuildErrorType::Install)]);
        assert_eq!(
            plan,
            vec![
                RecoveryStrategy::Retry,
                RecoveryStrategy::ClearCache,
                RecoveryStrategy::Reinstall
            ]
        );
    }

    #[test]
    fn plan_dedupes_across_types() {
        let plan = plan_strategies(&[
            build_error(BuildErrorType::Connection),
            build_error(BuildErrorType::Build),
            build_error(BuildErrorType::Runtime),
        ]);
        // restart-dev-server and escalate-to-ai appear once each
        assert_eq!(
            plan,
            vec![
                RecoveryStrategy::Retry,
                RecoveryStrategy::RestartDevServer,
                RecoveryStrategy::EscalateToAi
            ]
        );
    }

    #[test]
    fn strategy_serializes_kebab_case() {
        let json = serde_json::to_string(&RecoveryStrategy::RestartDevServer).unwrap();
        assert_eq!(json, "\"restart-dev-server\"");
        assert_eq!(
            serde_json::to_string(&RecoveryStrategy::EscalateToAi).unwrap(),
            "\"escalate-to-ai\""
        );
    }

    #[tokio::test]
    async fn transient_error_recovers_via_retry() {
        let provider = Arc::new(FakeSandbox::new());
        let handler = handler_with(provider);

        let result = handler
            .recover(
                &[build_error(BuildErrorType::Timeout)],
                RecoveryOptions::from_config(&RecoveryConfig::default()),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.recovered_via, Some(RecoveryStrategy::Retry));
        assert_eq!(result.attempts_made, 1);
    }

    #[tokio::test]
    async fn persistent_build_failure_exhausts_chain() {
        let provider = Arc::new(FakeSandbox::new());
        // every verification build keeps failing
        provider.script_command(
            "npm run build",
            CommandResult::fail("build failed: SyntaxError: Unexpected token", 1),
        );
        let handler = handler_with(Arc::clone(&provider));

        let result = handler
            .recover(
                &[build_error(BuildErrorType::Build)],
                RecoveryOptions::from_config(&RecoveryConfig::default()),
            )
            .await;

        // retry, restart-dev-server, escalate-to-ai all attempted; none succeed
        assert!(!result.success);
        assert!(result.recovered_via.is_none());
        assert_eq!(result.attempts_made, 3);
        assert_eq!(provider.restart_count(), 1);
    }

    #[tokio::test]
    async fn install_failure_walks_cache_and_reinstall_chain() {
        let provider = Arc::new(FakeSandbox::new());
        provider.script_command(
            "npm run build",
            CommandResult::fail("npm ERR! Cannot find module 'axios'", 1),
        );
        let handler = handler_with(Arc::clone(&provider));

        let result = handler
            .recover(
                &[build_error(BuildErrorType::Install)],
                RecoveryOptions::from_config(&RecoveryConfig::default()),
            )
            .await;

        // retry, clear-cache, reinstall all attempted against a build that
        // keeps failing
        assert!(!result.success);
        assert_eq!(result.attempts_made, 3);
        assert_eq!(provider.install_count(), 1);
        let commands = provider.commands_run();
        assert!(commands.iter().any(|c| c.contains("node_modules/.cache")));
    }

    #[tokio::test]
    async fn max_attempts_caps_the_chain() {
        let provider = Arc::new(FakeSandbox::new());
        provider.script_command("npm run build", CommandResult::fail("build failed", 1));
        let handler = handler_with(provider);

        let options = RecoveryOptions {
            max_attempts: 1,
            timeout: std::time::Duration::from_secs(60),
        };
        let result = handler
            .recover(&[build_error(BuildErrorType::Build)], options)
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts_made, 1);
    }

    #[tokio::test]
    async fn concurrent_recover_calls_share_one_run() {
        let provider = Arc::new(FakeSandbox::new());
        provider.script_command("npm run build", CommandResult::fail("build failed", 1));
        let bus = Arc::new(TelemetryBus::new(64));
        let mut config = RecoveryConfig::default();
        // long retry delay keeps the first run in flight while the second
        // caller arrives
        config.retry_delay_ms = 100;
        let handler = Arc::new(BuildErrorHandler::new(Arc::clone(&provider) as _, bus, config));

        let errors = vec![build_error(BuildErrorType::Build)];
        let options = RecoveryOptions::from_config(&RecoveryConfig::default());

        let h1 = {
            let handler = Arc::clone(&handler);
            let errors = errors.clone();
            tokio::spawn(async move { handler.recover(&errors, options).await })
        };
        let h2 = {
            let handler = Arc::clone(&handler);
            let errors = errors.clone();
            tokio::spawn(async move { handler.recover(&errors, options).await })
        };

        let (r1, r2) = (h1.await.unwrap(), h2.await.unwrap());

        assert_eq!(r1.success, r2.success);
        assert_eq!(r1.attempts_made, r2.attempts_made);
        assert_eq!(r1.duration_ms, r2.duration_ms);
        // the dev server restarted once, not twice
        assert_eq!(provider.restart_count(), 1);
    }

    #[test]
    fn format_errors_for_ai_is_prompt_ready() {
        let provider = Arc::new(FakeSandbox::new());
        let handler = handler_with(provider);

        let mut error = build_error(BuildErrorType::Build);
        error.file = Some("src/App.tsx".to_string());
        error.line = Some(10);
        error.suggestion = Some("check the JSX".to_string());

        let formatted = handler.format_errors_for_ai(&[error]);
        assert!(formatted.contains("1. [build]"));
        assert!(formatted.contains("src/App.tsx:10"));
        assert!(formatted.contains("suggested fix: check the JSX"));
    }
}
