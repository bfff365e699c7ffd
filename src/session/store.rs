//! Session store with transition rules and JSON persistence.
//!
//! The store owns every live session behind one `RwLock`. Mutations go
//! through [`SessionStore::with_session_mut`], which bumps `updated_at` and
//! writes a JSON snapshot if a state directory is configured, so a restart
//! can resume from the last completed step.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::Utc;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::session::state::{AgentSession, DevState, RuntimeErrorRecord};
use crate::telemetry::CommandLogEvent;

pub struct SessionStore {
    sessions: RwLock<HashMap<String, AgentSession>>,
    state_dir: Option<PathBuf>,
    command_log_window: usize,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            state_dir: config.state_dir.clone(),
            command_log_window: config.command_log_window,
        }
    }

    /// Creates a session, failing if the id is already taken.
    pub fn create_session(&self, session_id: &str) -> Result<AgentSession> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if sessions.contains_key(session_id) {
            return Err(Error::InvalidStateTransition(format!(
                "session {} already exists",
                session_id
            )));
        }
        let session = AgentSession::new(session_id);
        sessions.insert(session_id.to_string(), session.clone());
        drop(sessions);

        self.persist(&session)?;
        tracing::info!(session_id, "session created");
        Ok(session)
    }

    /// Returns a snapshot of the session.
    pub fn get(&self, session_id: &str) -> Result<AgentSession> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    pub fn session_ids(&self) -> Vec<String> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.keys().cloned().collect()
    }

    /// Mutates a session under the write lock, bumps `updated_at`, and
    /// persists the result.
    pub fn with_session_mut<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut AgentSession) -> Result<T>,
    ) -> Result<T> {
        let (value, snapshot) = {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
            let value = f(session)?;
            session.updated_at = Utc::now();
            (value, session.clone())
        };

        self.persist(&snapshot)?;
        Ok(value)
    }

    /// Transitions the session's dev state, enforcing the lifecycle rules:
    /// busy states are entered from idle only, except that states inside
    /// the generation pipeline may follow each other, and any busy state
    /// may return to idle.
    pub fn set_dev_state(&self, session_id: &str, next: DevState) -> Result<()> {
        self.with_session_mut(session_id, |session| {
            let current = session.current_dev_state;
            let allowed = match (current, next) {
                (a, b) if a == b => true,
                (_, DevState::Idle) => true,
                (DevState::Idle, _) => true,
                (a, b) if a.is_generation_pipeline() && b.is_generation_pipeline() => true,
                _ => false,
            };
            if !allowed {
                return Err(Error::InvalidStateTransition(format!(
                    "cannot move from {} to {}",
                    current, next
                )));
            }
            tracing::debug!(session_id = %session.session_id, %current, %next, "dev state transition");
            session.current_dev_state = next;
            Ok(())
        })
    }

    /// Sets the cancel flag; long-running operations poll it between steps.
    pub fn request_cancel(&self, session_id: &str) -> Result<()> {
        self.with_session_mut(session_id, |session| {
            session.cancel_requested = true;
            Ok(())
        })
    }

    pub fn is_cancel_requested(&self, session_id: &str) -> Result<bool> {
        Ok(self.get(session_id)?.cancel_requested)
    }

    /// Clears the cancel flag, typically when a new operation starts.
    pub fn clear_cancel(&self, session_id: &str) -> Result<()> {
        self.with_session_mut(session_id, |session| {
            session.cancel_requested = false;
            Ok(())
        })
    }

    pub fn upsert_file(&self, session_id: &str, path: &str, contents: &str) -> Result<()> {
        self.with_session_mut(session_id, |session| {
            session.upsert_file(path, contents);
            Ok(())
        })
    }

    /// Attaches a regeneration diff to a tracked file. Returns false when
    /// the path is not tracked by the session.
    pub fn set_file_diff(&self, session_id: &str, path: &str, diff: &str) -> Result<bool> {
        self.with_session_mut(session_id, |session| Ok(session.set_file_diff(path, diff)))
    }

    /// Clears a consumed file diff.
    pub fn clear_file_diff(&self, session_id: &str, path: &str) -> Result<bool> {
        self.with_session_mut(session_id, |session| Ok(session.clear_file_diff(path)))
    }

    pub fn record_runtime_error(&self, session_id: &str, error: RuntimeErrorRecord) -> Result<()> {
        self.with_session_mut(session_id, |session| {
            session.runtime_errors.push(error);
            Ok(())
        })
    }

    pub fn clear_runtime_errors(&self, session_id: &str) -> Result<()> {
        self.with_session_mut(session_id, |session| {
            session.runtime_errors.clear();
            Ok(())
        })
    }

    pub fn record_command(&self, session_id: &str, event: CommandLogEvent) -> Result<()> {
        let window = self.command_log_window;
        self.with_session_mut(session_id, |session| {
            session.record_command(event, window);
            Ok(())
        })
    }

    /// Removes a session from memory and deletes its snapshot.
    pub fn remove(&self, session_id: &str) -> Result<()> {
        let removed = {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            sessions.remove(session_id)
        };
        if removed.is_none() {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }
        if let Some(path) = self.snapshot_path(session_id) {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        tracing::info!(session_id, "session removed");
        Ok(())
    }

    /// Loads every snapshot from the state directory into memory.
    ///
    /// Sessions that were busy when the process died come back as idle so
    /// the next operation can start cleanly; their phase history is intact.
    pub fn load_from_disk(&self) -> Result<usize> {
        let Some(dir) = &self.state_dir else {
            return Ok(0);
        };
        if !dir.exists() {
            return Ok(0);
        }

        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<AgentSession>(&contents) {
                Ok(mut session) => {
                    session.current_dev_state = DevState::Idle;
                    session.cancel_requested = false;
                    let mut sessions =
                        self.sessions.write().unwrap_or_else(|e| e.into_inner());
                    sessions.insert(session.session_id.clone(), session);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), %e, "skipping unreadable session snapshot");
                }
            }
        }
        tracing::info!(loaded, "sessions restored from disk");
        Ok(loaded)
    }

    fn snapshot_path(&self, session_id: &str) -> Option<PathBuf> {
        self.state_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", session_id)))
    }

    fn persist(&self, session: &AgentSession) -> Result<()> {
        let Some(path) = self.snapshot_path(&session.session_id) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::CommandResult;

    fn store() -> SessionStore {
        SessionStore::new(&SessionConfig::default())
    }

    fn store_with_dir(dir: &std::path::Path) -> SessionStore {
        let mut config = SessionConfig::default();
        config.state_dir = Some(dir.to_path_buf());
        SessionStore::new(&config)
    }

    #[test]
    fn create_and_get_round_trip() {
        let store = store();
        store.create_session("s-1").unwrap();

        let session = store.get("s-1").unwrap();
        assert_eq!(session.session_id, "s-1");
        assert_eq!(session.current_dev_state, DevState::Idle);

        assert!(matches!(
            store.get("missing"),
            Err(Error::SessionNotFound(_))
        ));
        assert!(store.create_session("s-1").is_err());
    }

    #[test]
    fn busy_states_require_idle() {
        let store = store();
        store.create_session("s-1").unwrap();

        store.set_dev_state("s-1", DevState::PhaseGenerating).unwrap();
        // pipeline states chain without returning to idle
        store.set_dev_state("s-1", DevState::PhaseImplementing).unwrap();
        store.set_dev_state("s-1", DevState::Reviewing).unwrap();

        // debugging is not part of the pipeline
        let err = store.set_dev_state("s-1", DevState::Debugging).unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition(_)));

        store.set_dev_state("s-1", DevState::Idle).unwrap();
        store.set_dev_state("s-1", DevState::Debugging).unwrap();
    }

    #[test]
    fn cancel_flag_round_trip() {
        let store = store();
        store.create_session("s-1").unwrap();

        assert!(!store.is_cancel_requested("s-1").unwrap());
        store.request_cancel("s-1").unwrap();
        assert!(store.is_cancel_requested("s-1").unwrap());
        store.clear_cancel("s-1").unwrap();
        assert!(!store.is_cancel_requested("s-1").unwrap());
    }

    #[test]
    fn mutation_bumps_updated_at() {
        let store = store();
        let created = store.create_session("s-1").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        store.upsert_file("s-1", "src/App.tsx", "v1").unwrap();

        let session = store.get("s-1").unwrap();
        assert!(session.updated_at > created.updated_at);
        assert!(session.files.contains_key("src/App.tsx"));
    }

    #[test]
    fn file_diffs_round_trip_through_the_store() {
        let store = store();
        store.create_session("s-1").unwrap();
        store.upsert_file("s-1", "src/App.tsx", "v1").unwrap();

        assert!(store.set_file_diff("s-1", "src/App.tsx", "+added").unwrap());
        assert!(!store.set_file_diff("s-1", "src/Other.tsx", "+x").unwrap());

        let session = store.get("s-1").unwrap();
        assert_eq!(
            session.files["src/App.tsx"].last_diff.as_deref(),
            Some("+added")
        );

        assert!(store.clear_file_diff("s-1", "src/App.tsx").unwrap());
        assert!(store.get("s-1").unwrap().files["src/App.tsx"]
            .last_diff
            .is_none());
    }

    #[test]
    fn runtime_errors_accumulate_and_clear() {
        let store = store();
        store.create_session("s-1").unwrap();

        store
            .record_runtime_error(
                "s-1",
                RuntimeErrorRecord {
                    message: "boom".to_string(),
                    stack: None,
                    source: None,
                    reported_at: Utc::now(),
                },
            )
            .unwrap();
        assert_eq!(store.get("s-1").unwrap().runtime_errors.len(), 1);

        store.clear_runtime_errors("s-1").unwrap();
        assert!(store.get("s-1").unwrap().runtime_errors.is_empty());
    }

    #[test]
    fn snapshots_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store_with_dir(dir.path());
            store.create_session("s-1").unwrap();
            store.upsert_file("s-1", "src/App.tsx", "v1").unwrap();
            store.set_dev_state("s-1", DevState::PhaseGenerating).unwrap();
        }

        let store = store_with_dir(dir.path());
        let loaded = store.load_from_disk().unwrap();
        assert_eq!(loaded, 1);

        let session = store.get("s-1").unwrap();
        assert!(session.files.contains_key("src/App.tsx"));
        // busy state resets to idle on restore
        assert_eq!(session.current_dev_state, DevState::Idle);
    }

    #[test]
    fn remove_deletes_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_dir(dir.path());
        store.create_session("s-1").unwrap();
        let snapshot = dir.path().join("s-1.json");
        assert!(snapshot.exists());

        store.remove("s-1").unwrap();
        assert!(!snapshot.exists());
        assert!(store.get("s-1").is_err());
    }

    #[test]
    fn command_log_respects_window() {
        let mut config = SessionConfig::default();
        config.command_log_window = 2;
        let store = SessionStore::new(&config);
        store.create_session("s-1").unwrap();

        for i in 0..4 {
            store
                .record_command(
                    "s-1",
                    CommandLogEvent::from_result(format!("cmd-{}", i), &CommandResult::ok("")),
                )
                .unwrap();
        }

        let session = store.get("s-1").unwrap();
        assert_eq!(session.command_logs.len(), 2);
        assert_eq!(session.command_logs[0].command, "cmd-2");
    }
}
