//! Phase progression over a session blueprint.
//!
//! Phases execute one at a time. The next phase is derived from the
//! blueprint and the completed history, never from a cursor, so a restart
//! resumes exactly where the last run stopped. Completed phases are
//! immutable history; only `reset_phases` discards them.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::session::state::{DevState, PhaseConcept, PhaseState};
use crate::session::SessionStore;

pub struct PhaseManager {
    store: Arc<SessionStore>,
    max_phases: u32,
}

impl PhaseManager {
    pub fn new(store: Arc<SessionStore>, max_phases: u32) -> Self {
        Self { store, max_phases }
    }

    /// Determines the next phase to work on.
    ///
    /// An incomplete current phase is resumed as-is. Otherwise the phase at
    /// index `completed_phases.len()` is taken from the blueprint; index 0
    /// prefers the dedicated initial phase when the blueprint carries one.
    /// Returns `None` when the roadmap is exhausted or the cap is reached.
    pub fn next_phase(&self, session_id: &str) -> Result<Option<PhaseConcept>> {
        let session = self.store.get(session_id)?;

        if let Some(current) = &session.current_phase {
            if current.completed_at.is_none() {
                tracing::debug!(session_id, phase = %current.name, "resuming incomplete phase");
                return Ok(Some(PhaseConcept {
                    name: current.name.clone(),
                    description: current.description.clone(),
                    files: current.files.clone(),
                }));
            }
        }

        if session.phases_counter >= self.max_phases {
            return Ok(None);
        }

        let Some(blueprint) = &session.blueprint else {
            return Ok(None);
        };

        let index = session.completed_phases.len();
        let concept = if index == 0 {
            blueprint
                .initial_phase
                .clone()
                .or_else(|| blueprint.roadmap.first().cloned())
        } else {
            // when a dedicated initial phase exists, completed index 1 maps
            // to roadmap index 0
            let offset = if blueprint.initial_phase.is_some() { 1 } else { 0 };
            blueprint.roadmap.get(index - offset).cloned()
        };
        Ok(concept)
    }

    /// Marks a phase as started and counts it against the cap.
    ///
    /// Refused while a debug loop owns the session; phases and debugging
    /// are mutually exclusive.
    pub fn start_phase(&self, session_id: &str, concept: &PhaseConcept) -> Result<PhaseState> {
        let max_phases = self.max_phases;
        self.store.with_session_mut(session_id, |session| {
            if session.current_dev_state == DevState::Debugging {
                return Err(Error::InvalidStateTransition(
                    "cannot start a phase while debugging".to_string(),
                ));
            }
            if session.phases_counter >= max_phases {
                return Err(Error::PhaseLimitReached(max_phases));
            }
            let phase = PhaseState {
                index: session.completed_phases.len() as u32,
                name: concept.name.clone(),
                description: concept.description.clone(),
                files: concept.files.clone(),
                started_at: Utc::now(),
                completed_at: None,
                files_generated: Vec::new(),
                errors: Vec::new(),
            };
            session.phases_counter += 1;
            session.current_phase = Some(phase.clone());
            tracing::info!(
                session_id = %session.session_id,
                phase = %phase.name,
                counter = session.phases_counter,
                "phase started"
            );
            Ok(phase)
        })
    }

    /// Moves the current phase into the immutable completed history,
    /// recording what it produced and any problems hit along the way.
    pub fn complete_phase(
        &self,
        session_id: &str,
        files_generated: Vec<String>,
        errors: Vec<String>,
    ) -> Result<PhaseState> {
        self.store.with_session_mut(session_id, |session| {
            let mut phase = session.current_phase.take().ok_or_else(|| {
                Error::InvalidStateTransition("no phase in progress".to_string())
            })?;
            phase.completed_at = Some(Utc::now());
            phase.files_generated = files_generated;
            phase.errors = errors;
            session.completed_phases.push(phase.clone());
            tracing::info!(
                session_id = %session.session_id,
                phase = %phase.name,
                completed = session.completed_phases.len(),
                "phase completed"
            );
            Ok(phase)
        })
    }

    /// Discards phase history and resets the counter.
    ///
    /// Refused while a debug loop owns the session; the loop's view of the
    /// project must not change underneath it.
    pub fn reset_phases(&self, session_id: &str) -> Result<()> {
        self.store.with_session_mut(session_id, |session| {
            if session.current_dev_state == DevState::Debugging {
                return Err(Error::InvalidStateTransition(
                    "cannot reset phases while debugging".to_string(),
                ));
            }
            session.current_phase = None;
            session.completed_phases.clear();
            session.phases_counter = 0;
            tracing::info!(session_id = %session.session_id, "phase history reset");
            Ok(())
        })
    }
}
