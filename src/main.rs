//! sandpiper CLI
//!
//! Self-check harness for the supervision runtime. Runs the full
//! component stack against an in-memory sandbox and prints a status
//! report, which doubles as a smoke test of the wiring.

use std::sync::Arc;
use std::time::Duration;

use sandpiper::orchestrator::{OrchestratorContext, SandboxOrchestrator};
use sandpiper::{FakeSandbox, SupervisorConfig};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("doctor");

    if command != "doctor" {
        eprintln!("Usage: {} doctor", args[0]);
        eprintln!("\nRuns the supervision stack against an in-memory sandbox.");
        eprintln!("\nEnvironment variables:");
        eprintln!("  SANDPIPER_CONFIG=path        TOML configuration file");
        eprintln!("  SANDPIPER_MAX_PHASES=n       Override the phase cap");
        std::process::exit(1);
    }

    let config = match SupervisorConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // A scripted sandbox that looks like a healthy dev environment
    let provider = Arc::new(FakeSandbox::new());
    provider.script_command("pgrep", sandpiper::CommandResult::ok("4242"));
    provider.script_command("tail", sandpiper::CommandResult::ok(""));
    provider.seed_file("package.json", r#"{"name":"demo","scripts":{"dev":"vite"}}"#);
    provider.seed_file("src/main.tsx", "import App from './App'");

    let orchestrator = SandboxOrchestrator::new(OrchestratorContext {
        provider,
        config,
    });

    tracing::info!("starting self-check");

    match orchestrator.create_and_validate().await {
        Ok(report) => {
            orchestrator
                .ensure_ready(Duration::from_secs(5))
                .await
                .unwrap_or_else(|e| {
                    eprintln!("Sandbox never became ready: {}", e);
                    std::process::exit(1);
                });

            let status = orchestrator.status().await;

            println!("\n{}", "=".repeat(60));
            println!("Self-Check Complete: {}", status.sandbox_id);
            println!("{}", "=".repeat(60));
            println!();
            println!("State: {:?}", status.state);
            println!("Health: {:?}", status.health);
            println!("Validation: {} checks passed", report.checks.len());
            for check in &report.checks {
                println!("  [{}] {}", if check.passed { "ok" } else { "!!" }, check.name);
            }
            if !status.recommendations.is_empty() {
                println!();
                println!("Recommendations:");
                for recommendation in &status.recommendations {
                    println!("  - {}", recommendation);
                }
            }

            if let Err(e) = orchestrator.shutdown().await {
                eprintln!("Shutdown failed: {}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Self-check failed: {}", e);
            std::process::exit(1);
        }
    }
}
