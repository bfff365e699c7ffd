//! Command telemetry bus.
//!
//! Records every executed sandbox command into a bounded ring buffer and
//! fans it out to subscribers over a broadcast channel. Events are
//! append-only snapshots; nothing mutates them after recording. Lagging
//! subscribers observe drops rather than blocking the bus.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::provider::CommandResult;

/// One executed command, captured for observability and self-healing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLogEvent {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub sandbox_id: Option<String>,
}

impl CommandLogEvent {
    /// Builds an event from a command and its result.
    pub fn from_result(command: impl Into<String>, result: &CommandResult) -> Self {
        Self {
            command: command.into(),
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            exit_code: result.exit_code,
            success: result.success,
            duration_ms: result.duration.as_millis() as u64,
            timestamp: Utc::now(),
            tags: Vec::new(),
            provider: None,
            sandbox_id: None,
        }
    }

    /// Builds a failure event for a command that never produced a result.
    pub fn from_failure(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            stdout: String::new(),
            stderr: error.into(),
            exit_code: -1,
            success: false,
            duration_ms: 0,
            timestamp: Utc::now(),
            tags: Vec::new(),
            provider: None,
            sandbox_id: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_sandbox(mut self, provider: impl Into<String>, sandbox_id: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self.sandbox_id = Some(sandbox_id.into());
        self
    }

    /// Combined stdout and stderr for error scanning.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Coarse classification of what kind of work the command did.
    pub fn kind(&self) -> CommandKind {
        CommandKind::classify(&self.command)
    }
}

/// Coarse command classification used by the self-healing supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Install,
    Build,
    Lint,
    DevServer,
    Other,
}

impl CommandKind {
    /// Classifies a command line by its leading tokens.
    pub fn classify(command: &str) -> Self {
        let lower = command.trim().to_lowercase();

        if lower.starts_with("npm install")
            || lower.starts_with("npm ci")
            || lower.starts_with("yarn add")
            || lower.starts_with("yarn install")
            || lower.starts_with("pnpm install")
            || lower.starts_with("pnpm add")
            || lower.starts_with("bun install")
        {
            CommandKind::Install
        } else if lower.contains("run build")
            || lower.starts_with("npx tsc")
            || lower.starts_with("tsc")
            || lower.starts_with("vite build")
            || lower.starts_with("next build")
        {
            CommandKind::Build
        } else if lower.contains("run lint") || lower.starts_with("eslint") {
            CommandKind::Lint
        } else if lower.contains("run dev") || lower.contains("run start") {
            CommandKind::DevServer
        } else {
            CommandKind::Other
        }
    }

    /// Whether a successful command of this kind should trigger a debounced
    /// full check.
    pub fn triggers_full_check(&self) -> bool {
        matches!(self, CommandKind::Install | CommandKind::Build)
    }
}

/// Bounded ring buffer of command events with broadcast fan-out.
pub struct TelemetryBus {
    capacity: usize,
    ring: Mutex<VecDeque<CommandLogEvent>>,
    sender: broadcast::Sender<CommandLogEvent>,
}

impl TelemetryBus {
    /// Creates a bus retaining at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(16));
        Self {
            capacity,
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            sender,
        }
    }

    /// Records an event: appends to the ring (evicting the oldest entry at
    /// capacity) and fans it out to subscribers.
    pub fn record(&self, event: CommandLogEvent) {
        {
            let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
            if ring.len() == self.capacity {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }
        // send fails only when there are no subscribers, which is fine
        let _ = self.sender.send(event);
    }

    /// Subscribes to live events. The handle unsubscribes on drop.
    pub fn subscribe(&self) -> broadcast::Receiver<CommandLogEvent> {
        self.sender.subscribe()
    }

    /// Returns up to `n` most recent events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<CommandLogEvent> {
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.iter().rev().take(n).rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
