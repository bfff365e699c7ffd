//! Sandbox environment validation.
//!
//! Runs an ordered series of checks against the sandbox and aggregates the
//! outcomes into a single report. An unreachable sandbox short-circuits the
//! rest; every other failure is recorded and the run continues. The log
//! scan reuses the build error detector so validation and self-healing agree
//! on what counts as an error.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::provider::SandboxProvider;
use crate::recovery::{BuildError, ErrorDetector};

const DEV_SERVER_CHECK: &str = "pgrep -f 'vite|next dev|webpack|react-scripts'";
const LOG_TAIL_CHECK: &str = "tail -n 50 /tmp/dev-server.log 2>/dev/null || true";
const ENTRY_FILES: &[&str] = &["src/main.tsx", "src/main.jsx", "src/index.tsx", "src/index.jsx"];

/// Outcome of one named validation check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub critical: bool,
}

/// Aggregated result of a validation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub checks: Vec<CheckOutcome>,
    pub errors: Vec<BuildError>,
    pub duration_ms: u64,
}

impl ValidationReport {
    /// First failed check, if any.
    pub fn first_failure(&self) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| !c.passed)
    }
}

/// Per-run switches for checks a caller already knows the answer to, such
/// as validating right before the dev server has been started.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    pub skip_dev_server: bool,
    pub skip_log_scan: bool,
}

/// Ordered environment checker for a sandbox running a JS dev stack.
pub struct EnvironmentValidator {
    provider: Arc<dyn SandboxProvider>,
    detector: ErrorDetector,
}

impl EnvironmentValidator {
    pub fn new(provider: Arc<dyn SandboxProvider>) -> Self {
        Self {
            provider,
            detector: ErrorDetector::new(),
        }
    }

    /// Runs the full check series with default options.
    pub async fn validate(&self) -> ValidationReport {
        self.validate_with(ValidateOptions::default()).await
    }

    /// Runs the full check series.
    ///
    /// An unreachable sandbox stops the run; every other failure is
    /// recorded and the remaining checks still execute.
    pub async fn validate_with(&self, options: ValidateOptions) -> ValidationReport {
        let started = Instant::now();
        let mut checks = Vec::new();
        let mut errors = Vec::new();

        let alive = self.check_sandbox_alive().await;
        let alive_ok = alive.passed;
        checks.push(alive);
        if !alive_ok {
            return self.finish(checks, errors, started);
        }

        if !options.skip_dev_server {
            checks.push(self.check_dev_server().await);
        }

        if !options.skip_log_scan {
            let (log_scan, mut log_errors) = self.check_logs().await;
            checks.push(log_scan);
            errors.append(&mut log_errors);
        }

        checks.push(self.check_manifest().await);
        checks.push(self.check_entry_files().await);

        self.finish(checks, errors, started)
    }

    /// Fast readiness probe: liveness and dev server only.
    pub async fn quick_validate(&self) -> ValidationReport {
        let started = Instant::now();
        let mut checks = Vec::new();

        let alive = self.check_sandbox_alive().await;
        let alive_ok = alive.passed;
        checks.push(alive);
        if alive_ok {
            checks.push(self.check_dev_server().await);
        }

        self.finish(checks, Vec::new(), started)
    }

    fn finish(
        &self,
        checks: Vec<CheckOutcome>,
        errors: Vec<BuildError>,
        started: Instant,
    ) -> ValidationReport {
        // only critical failures flip validity; log-scan errors are
        // surfaced for recovery but do not block the environment
        let valid = checks.iter().all(|c| c.passed || !c.critical);
        let report = ValidationReport {
            valid,
            checks,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        if report.valid {
            tracing::debug!(checks = report.checks.len(), "environment validation passed");
        } else {
            tracing::warn!(
                failed = ?report.first_failure().map(|c| c.name.as_str()),
                errors = report.errors.len(),
                "environment validation failed"
            );
        }
        report
    }

    async fn check_sandbox_alive(&self) -> CheckOutcome {
        let passed = self.provider.is_alive().await;
        CheckOutcome {
            name: "sandbox-alive".to_string(),
            passed,
            message: if passed {
                "sandbox is reachable".to_string()
            } else {
                "sandbox is not reachable".to_string()
            },
            critical: true,
        }
    }

    async fn check_dev_server(&self) -> CheckOutcome {
        match self.provider.run_command(DEV_SERVER_CHECK).await {
            Ok(result) if result.success && !result.stdout.trim().is_empty() => CheckOutcome {
                name: "dev-server".to_string(),
                passed: true,
                message: "dev server process found".to_string(),
                critical: true,
            },
            Ok(_) => CheckOutcome {
                name: "dev-server".to_string(),
                passed: false,
                message: "no dev server process found".to_string(),
                critical: true,
            },
            Err(e) => CheckOutcome {
                name: "dev-server".to_string(),
                passed: false,
                message: format!("dev server check failed: {}", e),
                critical: true,
            },
        }
    }

    async fn check_logs(&self) -> (CheckOutcome, Vec<BuildError>) {
        match self.provider.run_command(LOG_TAIL_CHECK).await {
            Ok(result) => {
                let errors = self.detector.detect(&result.combined_output());
                let outcome = CheckOutcome {
                    name: "log-scan".to_string(),
                    passed: errors.is_empty(),
                    message: if errors.is_empty() {
                        "no errors in recent logs".to_string()
                    } else {
                        format!("{} errors found in recent logs", errors.len())
                    },
                    critical: false,
                };
                (outcome, errors)
            }
            Err(e) => (
                CheckOutcome {
                    name: "log-scan".to_string(),
                    passed: false,
                    message: format!("log scan failed: {}", e),
                    critical: false,
                },
                Vec::new(),
            ),
        }
    }

    async fn check_manifest(&self) -> CheckOutcome {
        match self.provider.read_file("package.json").await {
            Ok(contents) => match serde_json::from_str::<serde_json::Value>(&contents) {
                Ok(manifest) => {
                    let has_dev_script = manifest
                        .get("scripts")
                        .and_then(|s| s.get("dev").or_else(|| s.get("start")))
                        .is_some();
                    CheckOutcome {
                        name: "manifest".to_string(),
                        passed: has_dev_script,
                        message: if has_dev_script {
                            "package.json has a dev script".to_string()
                        } else {
                            "package.json has no dev or start script".to_string()
                        },
                        critical: false,
                    }
                }
                Err(e) => CheckOutcome {
                    name: "manifest".to_string(),
                    passed: false,
                    message: format!("package.json is not valid JSON: {}", e),
                    critical: false,
                },
            },
            Err(_) => CheckOutcome {
                name: "manifest".to_string(),
                passed: false,
                message: "package.json not found".to_string(),
                critical: false,
            },
        }
    }

    async fn check_entry_files(&self) -> CheckOutcome {
        match self.provider.list_files(Some("src/")).await {
            Ok(files) => {
                let found = ENTRY_FILES.iter().find(|entry| files.iter().any(|f| f == *entry));
                match found {
                    Some(entry) => CheckOutcome {
                        name: "entry-files".to_string(),
                        passed: true,
                        message: format!("entry file present: {}", entry),
                        critical: false,
                    },
                    None => CheckOutcome {
                        name: "entry-files".to_string(),
                        passed: false,
                        message: "no recognized entry file under src/".to_string(),
                        critical: false,
                    },
                }
            }
            Err(e) => CheckOutcome {
                name: "entry-files".to_string(),
                passed: false,
                message: format!("could not list src/: {}", e),
                critical: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CommandResult, FakeSandbox};

    fn healthy_sandbox() -> Arc<FakeSandbox> {
        let sandbox = Arc::new(FakeSandbox::new());
        sandbox.script_command("pgrep", CommandResult::ok("1234"));
        sandbox.script_command("tail", CommandResult::ok(""));
        sandbox.seed_file(
            "package.json",
            r#"{"name":"app","scripts":{"dev":"vite"}}"#,
        );
        sandbox.seed_file("src/main.tsx", "import App from './App'");
        sandbox
    }

    #[tokio::test]
    async fn healthy_environment_passes_all_checks() {
        let validator = EnvironmentValidator::new(healthy_sandbox());
        let report = validator.validate().await;

        assert!(report.valid);
        assert_eq!(report.checks.len(), 5);
        assert!(report.errors.is_empty());
        assert!(report.first_failure().is_none());
    }

    #[tokio::test]
    async fn dead_sandbox_short_circuits() {
        let sandbox = healthy_sandbox();
        sandbox.set_alive(false);
        let validator = EnvironmentValidator::new(sandbox);

        let report = validator.validate().await;

        assert!(!report.valid);
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].name, "sandbox-alive");
    }

    #[tokio::test]
    async fn missing_dev_server_fails_without_blocking_later_checks() {
        let sandbox = healthy_sandbox();
        sandbox.script_command("pgrep", CommandResult::fail("", 1));
        let validator = EnvironmentValidator::new(sandbox);

        let report = validator.validate().await;

        // only an unreachable sandbox short-circuits; the remaining
        // checks still run and the report stays invalid
        assert!(!report.valid);
        assert_eq!(report.checks.len(), 5);
        assert_eq!(report.first_failure().map(|c| c.name.as_str()), Some("dev-server"));
        assert!(report.checks.iter().any(|c| c.name == "manifest"));
    }

    #[tokio::test]
    async fn skipped_dev_server_check_is_not_run() {
        let sandbox = healthy_sandbox();
        sandbox.script_command("pgrep", CommandResult::fail("", 1));
        let validator = EnvironmentValidator::new(sandbox);

        let report = validator
            .validate_with(ValidateOptions {
                skip_dev_server: true,
                ..Default::default()
            })
            .await;

        assert!(report.valid);
        assert!(report.checks.iter().all(|c| c.name != "dev-server"));
    }

    #[tokio::test]
    async fn skipped_log_scan_reports_no_errors() {
        let sandbox = healthy_sandbox();
        sandbox.script_command(
            "tail",
            CommandResult::ok("ReferenceError: foo is not defined"),
        );
        let validator = EnvironmentValidator::new(sandbox);

        let report = validator
            .validate_with(ValidateOptions {
                skip_log_scan: true,
                ..Default::default()
            })
            .await;

        assert!(report.valid);
        assert!(report.errors.is_empty());
        assert!(report.checks.iter().all(|c| c.name != "log-scan"));
    }

    #[tokio::test]
    async fn log_errors_surface_without_flipping_validity() {
        let sandbox = healthy_sandbox();
        sandbox.script_command(
            "tail",
            CommandResult::ok("ReferenceError: foo is not defined"),
        );
        let validator = EnvironmentValidator::new(sandbox);

        let report = validator.validate().await;

        // all five checks still ran; the log scan is non-critical so the
        // environment stays valid, but the errors are reported
        assert_eq!(report.checks.len(), 5);
        assert!(report.valid);
        assert_eq!(report.errors.len(), 1);
        let scan = report.checks.iter().find(|c| c.name == "log-scan").unwrap();
        assert!(!scan.passed);
    }

    #[tokio::test]
    async fn broken_manifest_is_noncritical() {
        let sandbox = healthy_sandbox();
        sandbox.seed_file("package.json", "{not json");
        let validator = EnvironmentValidator::new(sandbox);

        let report = validator.validate().await;

        // non-critical failure does not invalidate the report by itself
        assert!(report.valid);
        let manifest = report.checks.iter().find(|c| c.name == "manifest").unwrap();
        assert!(!manifest.passed);
        assert!(!manifest.critical);
    }

    #[tokio::test]
    async fn quick_validate_runs_two_checks() {
        let validator = EnvironmentValidator::new(healthy_sandbox());
        let report = validator.quick_validate().await;

        assert!(report.valid);
        assert_eq!(report.checks.len(), 2);
    }

    #[tokio::test]
    async fn missing_entry_files_reported() {
        let sandbox = Arc::new(FakeSandbox::new());
        sandbox.script_command("pgrep", CommandResult::ok("1234"));
        sandbox.script_command("tail", CommandResult::ok(""));
        sandbox.seed_file("package.json", r#"{"scripts":{"dev":"vite"}}"#);
        sandbox.seed_file("src/other.ts", "");
        let validator = EnvironmentValidator::new(sandbox);

        let report = validator.validate().await;
        let entry = report.checks.iter().find(|c| c.name == "entry-files").unwrap();
        assert!(!entry.passed);
        assert!(!entry.critical);
    }
}
