//! Generation session data model.
//!
//! Everything here is plain serializable state; behavior lives in the
//! store. Sessions snapshot to JSON, so every type derives serde and
//! unknown fields from older snapshots fall back to defaults.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::CommandLogEvent;

/// What the generation pipeline is currently doing for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevState {
    Idle,
    PhaseGenerating,
    PhaseImplementing,
    Reviewing,
    Finalizing,
    Debugging,
}

impl DevState {
    /// Whether the state represents work in progress.
    pub fn is_busy(&self) -> bool {
        !matches!(self, DevState::Idle)
    }

    /// Busy states belonging to the phase generation pipeline, which may
    /// transition between each other without passing through idle.
    pub fn is_generation_pipeline(&self) -> bool {
        matches!(
            self,
            DevState::PhaseGenerating
                | DevState::PhaseImplementing
                | DevState::Reviewing
                | DevState::Finalizing
        )
    }
}

impl std::fmt::Display for DevState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DevState::Idle => "idle",
            DevState::PhaseGenerating => "phase_generating",
            DevState::PhaseImplementing => "phase_implementing",
            DevState::Reviewing => "reviewing",
            DevState::Finalizing => "finalizing",
            DevState::Debugging => "debugging",
        };
        f.write_str(s)
    }
}

/// A file the plan intends to create or modify in a phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedFile {
    pub path: String,
    pub purpose: String,
    #[serde(default)]
    pub changes: Option<String>,
}

/// One unit of planned work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseConcept {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub files: Vec<PlannedFile>,
}

/// The overall project plan driving phase generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    pub project_name: String,
    pub description: String,
    #[serde(default)]
    pub initial_phase: Option<PhaseConcept>,
    #[serde(default)]
    pub roadmap: Vec<PhaseConcept>,
}

/// A generated file tracked by the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileState {
    pub path: String,
    pub contents: String,
    #[serde(default)]
    pub purpose: Option<String>,
    /// Diff of the most recent regeneration, cleared once consumed.
    #[serde(default)]
    pub last_diff: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One completed or in-progress phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseState {
    pub index: u32,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub files: Vec<PlannedFile>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Paths actually produced while the phase ran.
    #[serde(default)]
    pub files_generated: Vec<String>,
    /// Problems encountered during the phase, kept for the record.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// A runtime error reported from the sandbox preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeErrorRecord {
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub reported_at: DateTime<Utc>,
}

/// Complete state for one generation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSession {
    pub session_id: String,
    #[serde(default)]
    pub sandbox_id: Option<String>,
    pub current_dev_state: DevState,
    #[serde(default)]
    pub blueprint: Option<Blueprint>,
    #[serde(default)]
    pub current_phase: Option<PhaseState>,
    #[serde(default)]
    pub completed_phases: Vec<PhaseState>,
    pub phases_counter: u32,
    #[serde(default)]
    pub files: BTreeMap<String, FileState>,
    #[serde(default)]
    pub runtime_errors: Vec<RuntimeErrorRecord>,
    #[serde(default)]
    pub command_logs: VecDeque<CommandLogEvent>,
    #[serde(default)]
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last time the session saw sandbox or client activity, as opposed to
    /// `updated_at` which any bookkeeping mutation bumps.
    #[serde(default = "Utc::now")]
    pub last_activity_at: DateTime<Utc>,
}

impl AgentSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            sandbox_id: None,
            current_dev_state: DevState::Idle,
            blueprint: None,
            current_phase: None,
            completed_phases: Vec::new(),
            phases_counter: 0,
            files: BTreeMap::new(),
            runtime_errors: Vec::new(),
            command_logs: VecDeque::new(),
            cancel_requested: false,
            created_at: now,
            updated_at: now,
            last_activity_at: now,
        }
    }

    /// Inserts or updates a generated file, preserving the original
    /// generation timestamp, purpose, and pending diff on update.
    pub fn upsert_file(&mut self, path: impl Into<String>, contents: impl Into<String>) {
        let path = path.into();
        let now = Utc::now();
        self.last_activity_at = now;
        match self.files.get_mut(&path) {
            Some(existing) => {
                existing.contents = contents.into();
                existing.updated_at = now;
            }
            None => {
                self.files.insert(
                    path.clone(),
                    FileState {
                        path,
                        contents: contents.into(),
                        purpose: None,
                        last_diff: None,
                        generated_at: now,
                        updated_at: now,
                    },
                );
            }
        }
    }

    /// Records the diff of the latest regeneration of a tracked file.
    pub fn set_file_diff(&mut self, path: &str, diff: impl Into<String>) -> bool {
        match self.files.get_mut(path) {
            Some(file) => {
                file.last_diff = Some(diff.into());
                true
            }
            None => false,
        }
    }

    /// Clears a consumed diff.
    pub fn clear_file_diff(&mut self, path: &str) -> bool {
        match self.files.get_mut(path) {
            Some(file) => {
                file.last_diff = None;
                true
            }
            None => false,
        }
    }

    /// Appends a command log entry, evicting the oldest beyond `window`.
    pub fn record_command(&mut self, event: CommandLogEvent, window: usize) {
        self.last_activity_at = Utc::now();
        if self.command_logs.len() == window {
            self.command_logs.pop_front();
        }
        self.command_logs.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::CommandResult;

    #[test]
    fn upsert_preserves_generated_at() {
        let mut session = AgentSession::new("s-1");
        session.upsert_file("src/App.tsx", "v1");
        let generated_at = session.files["src/App.tsx"].generated_at;

        std::thread::sleep(std::time::Duration::from_millis(5));
        session.upsert_file("src/App.tsx", "v2");

        let file = &session.files["src/App.tsx"];
        assert_eq!(file.contents, "v2");
        assert_eq!(file.generated_at, generated_at);
        assert!(file.updated_at > generated_at);
    }

    #[test]
    fn file_diff_set_and_cleared_on_demand() {
        let mut session = AgentSession::new("s-1");
        assert!(!session.set_file_diff("src/App.tsx", "+line"));

        session.upsert_file("src/App.tsx", "v1");
        assert!(session.set_file_diff("src/App.tsx", "+line"));
        assert_eq!(
            session.files["src/App.tsx"].last_diff.as_deref(),
            Some("+line")
        );

        // a rewrite keeps the unconsumed diff; only clear removes it
        session.upsert_file("src/App.tsx", "v2");
        assert!(session.files["src/App.tsx"].last_diff.is_some());
        assert!(session.clear_file_diff("src/App.tsx"));
        assert!(session.files["src/App.tsx"].last_diff.is_none());
    }

    #[test]
    fn activity_timestamp_tracks_file_writes() {
        let mut session = AgentSession::new("s-1");
        let initial = session.last_activity_at;

        std::thread::sleep(std::time::Duration::from_millis(5));
        session.upsert_file("src/App.tsx", "v1");

        assert!(session.last_activity_at > initial);
    }

    #[test]
    fn command_log_window_is_bounded() {
        let mut session = AgentSession::new("s-1");
        for i in 0..5 {
            let event =
                CommandLogEvent::from_result(format!("cmd-{}", i), &CommandResult::ok(""));
            session.record_command(event, 3);
        }

        assert_eq!(session.command_logs.len(), 3);
        assert_eq!(session.command_logs[0].command, "cmd-2");
    }

    #[test]
    fn dev_state_serializes_snake_case() {
        let json = serde_json::to_string(&DevState::PhaseImplementing).unwrap();
        assert_eq!(json, "\"phase_implementing\"");
        let back: DevState = serde_json::from_str("\"debugging\"").unwrap();
        assert_eq!(back, DevState::Debugging);
    }

    #[test]
    fn busy_and_pipeline_classification() {
        assert!(!DevState::Idle.is_busy());
        assert!(DevState::Debugging.is_busy());
        assert!(DevState::Reviewing.is_generation_pipeline());
        assert!(!DevState::Debugging.is_generation_pipeline());
    }

    #[test]
    fn session_snapshot_round_trips() {
        let mut session = AgentSession::new("s-1");
        session.blueprint = Some(Blueprint {
            project_name: "todo-app".to_string(),
            description: "a todo app".to_string(),
            initial_phase: None,
            roadmap: vec![PhaseConcept {
                name: "Setup".to_string(),
                description: "scaffold the app".to_string(),
                files: vec![],
            }],
        });
        session.upsert_file("src/App.tsx", "export default App");

        let json = serde_json::to_string(&session).unwrap();
        let back: AgentSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id, "s-1");
        assert_eq!(back.blueprint.unwrap().roadmap.len(), 1);
        assert!(back.files.contains_key("src/App.tsx"));
    }
}
