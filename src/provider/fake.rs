//! Scripted in-memory sandbox provider.
//!
//! Backs unit and integration tests, and the `sandpiper doctor` self-check.
//! Commands resolve against a script table by longest matching prefix;
//! unscripted `echo` commands behave like a real shell so the health
//! monitor's echo probe works out of the box.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Error, Result};
use crate::provider::{CommandResult, SandboxInfo, SandboxProvider};

#[derive(Default)]
struct FakeState {
    files: BTreeMap<String, String>,
    scripts: HashMap<String, CommandResult>,
    commands_run: Vec<String>,
    restarts: u32,
    installs: u32,
}

/// In-memory provider with scriptable command results and fault injection.
pub struct FakeSandbox {
    sandbox_id: String,
    alive: AtomicBool,
    fail_restart: AtomicBool,
    state: Mutex<FakeState>,
    created_at: chrono::DateTime<Utc>,
}

impl FakeSandbox {
    pub fn new() -> Self {
        Self {
            sandbox_id: format!("fake-{}", uuid::Uuid::new_v4()),
            alive: AtomicBool::new(true),
            fail_restart: AtomicBool::new(false),
            state: Mutex::new(FakeState::default()),
            created_at: Utc::now(),
        }
    }

    /// Toggles the liveness flag.
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Makes `restart_dev_server` fail until reset.
    pub fn set_fail_restart(&self, fail: bool) {
        self.fail_restart.store(fail, Ordering::SeqCst);
    }

    /// Scripts the result for any command starting with `prefix`.
    pub fn script_command(&self, prefix: impl Into<String>, result: CommandResult) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.scripts.insert(prefix.into(), result);
    }

    /// Removes a previously scripted command.
    pub fn unscript_command(&self, prefix: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.scripts.remove(prefix);
    }

    /// Seeds a file into the in-memory filesystem.
    pub fn seed_file(&self, path: impl Into<String>, contents: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.files.insert(path.into(), contents.into());
    }

    /// All commands executed so far, in order.
    pub fn commands_run(&self) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.commands_run.clone()
    }

    /// Number of dev-server restarts requested.
    pub fn restart_count(&self) -> u32 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.restarts
    }

    /// Number of install invocations.
    pub fn install_count(&self) -> u32 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.installs
    }

    fn resolve(&self, command: &str) -> CommandResult {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.commands_run.push(command.to_string());

        // longest matching prefix wins, so "npm run build" can be scripted
        // separately from "npm"
        let scripted = state
            .scripts
            .iter()
            .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, result)| result.clone());

        if let Some(result) = scripted {
            return result;
        }

        if let Some(rest) = command.strip_prefix("echo ") {
            return CommandResult::ok(rest.trim());
        }

        CommandResult::ok("")
    }
}

impl Default for FakeSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxProvider for FakeSandbox {
    async fn run_command(&self, command: &str) -> Result<CommandResult> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(Error::Provider("sandbox connection refused".to_string()));
        }
        Ok(self.resolve(command))
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Provider(format!("no such file: {}", path)))
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.files.insert(path.to_string(), contents.to_string());
        Ok(())
    }

    async fn list_files(&self, dir: Option<&str>) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let paths = state
            .files
            .keys()
            .filter(|path| match dir {
                Some(prefix) => path.starts_with(prefix),
                None => true,
            })
            .cloned()
            .collect();
        Ok(paths)
    }

    async fn install_packages(&self, packages: &[String]) -> Result<CommandResult> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.installs += 1;
        }
        let command = if packages.is_empty() {
            "npm install".to_string()
        } else {
            format!("npm install {}", packages.join(" "))
        };
        self.run_command(&command).await
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn sandbox_info(&self) -> SandboxInfo {
        SandboxInfo {
            sandbox_id: self.sandbox_id.clone(),
            url: format!("https://{}.preview.local", self.sandbox_id),
            provider: "fake".to_string(),
            created_at: self.created_at,
        }
    }

    async fn restart_dev_server(&self) -> Result<()> {
        if self.fail_restart.load(Ordering::SeqCst) {
            return Err(Error::Provider("dev server failed to restart".to_string()));
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.restarts += 1;
        Ok(())
    }

    async fn terminate(&self) -> Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}
