//! Bounded autonomous debug loop.
//!
//! Feeds the model a transcript, executes its tool calls against the
//! sandbox, and appends the results. Three independent bounds stop a
//! runaway loop: a hard iteration cap, repetition detection over a sliding
//! time window, and stall detection when the model stops calling tools
//! without declaring completion. The session's cancel flag is polled
//! between iterations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::agent::{AgentMessage, AgentModel, ToolCall};
use crate::config::DebugLoopConfig;
use crate::error::Result;
use crate::provider::SandboxProvider;
use crate::session::{DevState, SessionStore};
use crate::telemetry::{CommandLogEvent, TelemetryBus};

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopTermination {
    Completed,
    IterationCap,
    Stalled,
    Cancelled,
}

/// Final report of one debug run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugReport {
    pub success: bool,
    pub termination: LoopTermination,
    pub iterations: u32,
    pub issues_fixed: Vec<String>,
    pub issues_remaining: Vec<String>,
    pub transcript: Vec<AgentMessage>,
}

/// Sliding-window detector for repeated identical tool calls.
///
/// A call is skipped once it has already been seen `threshold` times
/// within the window, so with the default threshold of 2 the third
/// identical call is refused.
struct RepetitionTracker {
    window: Duration,
    threshold: u32,
    seen: HashMap<String, Vec<Instant>>,
}

impl RepetitionTracker {
    fn new(window: Duration, threshold: u32) -> Self {
        Self { window, threshold, seen: HashMap::new() }
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        for timestamps in self.seen.values_mut() {
            timestamps.retain(|t| now.duration_since(*t) < window);
        }
        self.seen.retain(|_, timestamps| !timestamps.is_empty());
    }

    /// Whether executing this call now would be a repeat beyond the
    /// threshold. Records the call either way.
    fn check_and_record(&mut self, call: &ToolCall) -> bool {
        let now = Instant::now();
        self.prune(now);
        let fingerprint = call.fingerprint();
        let timestamps = self.seen.entry(fingerprint).or_default();
        let repeated = timestamps.len() as u32 >= self.threshold;
        timestamps.push(now);
        repeated
    }
}

pub struct DebugLoop {
    model: Arc<dyn AgentModel>,
    provider: Arc<dyn SandboxProvider>,
    bus: Arc<TelemetryBus>,
    store: Arc<SessionStore>,
    config: DebugLoopConfig,
}

impl DebugLoop {
    pub fn new(
        model: Arc<dyn AgentModel>,
        provider: Arc<dyn SandboxProvider>,
        bus: Arc<TelemetryBus>,
        store: Arc<SessionStore>,
        config: DebugLoopConfig,
    ) -> Self {
        Self { model, provider, bus, store, config }
    }

    /// Runs the loop against a session until the model declares completion
    /// or a bound fires.
    ///
    /// Marks the session as debugging for the duration and returns it to
    /// idle on every exit path.
    pub async fn run(
        &self,
        session_id: &str,
        issue: &str,
        focus_paths: &[String],
    ) -> Result<DebugReport> {
        self.store.clear_cancel(session_id)?;
        self.store.set_dev_state(session_id, DevState::Debugging)?;
        let outcome = self.run_inner(session_id, issue, focus_paths).await;
        // idle is always reachable, so this cannot mask the real error
        self.store.set_dev_state(session_id, DevState::Idle)?;
        outcome
    }

    async fn run_inner(
        &self,
        session_id: &str,
        issue: &str,
        focus_paths: &[String],
    ) -> Result<DebugReport> {
        let mut transcript = vec![
            AgentMessage::system(self.system_prompt(focus_paths)),
            AgentMessage::user(format!("Fix the following issue:\n{}", issue)),
        ];
        let mut tracker =
            RepetitionTracker::new(self.config.repetition_window(), self.config.repetition_threshold);
        let mut iterations = 0;

        tracing::info!(session_id, model = self.model.name(), "debug loop started");

        loop {
            if self.store.is_cancel_requested(session_id)? {
                tracing::info!(session_id, iterations, "debug loop cancelled");
                return Ok(self.report(LoopTermination::Cancelled, iterations, None, transcript));
            }
            if iterations >= self.config.max_iterations {
                tracing::warn!(session_id, iterations, "debug loop hit the iteration cap");
                return Ok(self.report(LoopTermination::IterationCap, iterations, None, transcript));
            }
            iterations += 1;

            let turn = self.model.next_turn(&transcript).await?;
            transcript.push(AgentMessage::assistant(turn.text.clone()));

            if let Some(signal) = turn.completion() {
                tracing::info!(session_id, iterations, "debug loop completed");
                return Ok(self.report(
                    LoopTermination::Completed,
                    iterations,
                    Some(signal),
                    transcript,
                ));
            }

            if turn.tool_calls.is_empty() {
                tracing::warn!(session_id, iterations, "model produced no tool calls and no completion");
                return Ok(self.report(LoopTermination::Stalled, iterations, None, transcript));
            }

            for call in &turn.tool_calls {
                let observation = if tracker.check_and_record(call) {
                    tracing::warn!(
                        session_id,
                        tool = call.name(),
                        "repeated tool call skipped"
                    );
                    format!(
                        "[{} skipped: this exact call was already made {} times recently; try a different approach]",
                        call.name(),
                        self.config.repetition_threshold
                    )
                } else {
                    self.execute(session_id, call).await
                };
                transcript.push(AgentMessage::tool(observation));
            }

            tracing::debug!(session_id, iterations, tools = turn.tool_calls.len(), "debug turn executed");
        }
    }

    fn report(
        &self,
        termination: LoopTermination,
        iterations: u32,
        signal: Option<crate::agent::CompletionSignal>,
        transcript: Vec<AgentMessage>,
    ) -> DebugReport {
        let signal = signal.unwrap_or_default();
        DebugReport {
            success: termination == LoopTermination::Completed,
            termination,
            iterations,
            issues_fixed: signal.issues_fixed,
            issues_remaining: signal.issues_remaining,
            transcript,
        }
    }

    fn system_prompt(&self, focus_paths: &[String]) -> String {
        let mut prompt = String::from(
            "You are debugging a web application running in a remote sandbox. \
             Use the available tools to inspect and fix the problem. \
             When the issue is resolved, reply with DEBUG_COMPLETE followed by a JSON \
             object listing issues_fixed and issues_remaining.",
        );
        if !focus_paths.is_empty() {
            prompt.push_str("\nFocus on these files first: ");
            prompt.push_str(&focus_paths.join(", "));
        }
        prompt
    }

    /// Executes one tool call, folding provider failures into the
    /// observation text so the model can react to them.
    async fn execute(&self, session_id: &str, call: &ToolCall) -> String {
        match call {
            ToolCall::RunCommand { command } => match self.provider.run_command(command).await {
                Ok(result) => {
                    let event = CommandLogEvent::from_result(command, &result).with_tag("debug");
                    self.bus.record(event.clone());
                    let _ = self.store.record_command(session_id, event);
                    format!(
                        "[exit {}]\n{}",
                        result.exit_code,
                        truncate(&result.combined_output(), 4000)
                    )
                }
                Err(e) => format!("[run_command failed: {}]", e),
            },
            ToolCall::ReadFile { path } => match self.provider.read_file(path).await {
                Ok(contents) => truncate(&contents, 8000),
                Err(e) => format!("[read_file failed: {}]", e),
            },
            ToolCall::WriteFile { path, contents } => {
                match self.provider.write_file(path, contents).await {
                    Ok(()) => {
                        let _ = self.store.upsert_file(session_id, path, contents);
                        format!("[wrote {} bytes to {}]", contents.len(), path)
                    }
                    Err(e) => format!("[write_file failed: {}]", e),
                }
            }
            ToolCall::ListFiles { dir } => {
                match self.provider.list_files(dir.as_deref()).await {
                    Ok(files) => files.join("\n"),
                    Err(e) => format!("[list_files failed: {}]", e),
                }
            }
            ToolCall::RestartDevServer => match self.provider.restart_dev_server().await {
                Ok(()) => "[dev server restarted]".to_string(),
                Err(e) => format!("[restart_dev_server failed: {}]", e),
            },
        }
    }

}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\n[output truncated]", &text[..cut])
}
