//! Session/connection coordination.
//!
//! Maps client connections to sessions and fans server events out to
//! every connection bound to a session. The transport itself lives
//! elsewhere; this layer only deals in typed events and commands, so a
//! WebSocket handler reduces to serialize/deserialize plus two calls here.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::agent::AgentMessage;
use crate::error::{Error, Result};
use crate::session::state::{AgentSession, DevState};
use crate::session::SessionStore;

/// Lifecycle of one phase as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEventStatus {
    Started,
    Completed,
    Failed,
}

/// What happened to a file in the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Created,
    Updated,
    Deleted,
}

/// Server-to-client event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        session_id: String,
        server_time: DateTime<Utc>,
    },
    StateUpdate {
        dev_state: DevState,
        phases_completed: u32,
        phases_total: u32,
        current_phase: Option<String>,
        is_generating: bool,
        is_debugging: bool,
        preview_url: Option<String>,
    },
    PhaseUpdate {
        phase_name: String,
        status: PhaseEventStatus,
        /// Fraction of the roadmap done, 0.0 to 1.0.
        progress: f32,
        error: Option<String>,
    },
    FileUpdate {
        file_path: String,
        action: FileAction,
    },
    AgentMessage {
        agent: String,
        message: String,
    },
    Error {
        code: String,
        message: String,
        recoverable: bool,
    },
    GenerationComplete {
        success: bool,
        files_generated: Vec<String>,
        preview_url: Option<String>,
        summary: String,
    },
    DebugComplete {
        success: bool,
        issues_fixed: Vec<String>,
        issues_remaining: Vec<String>,
        transcript: Vec<AgentMessage>,
    },
}

/// Client-to-server command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Init {
        session_id: String,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        project_id: Option<String>,
    },
    UserMessage {
        content: String,
    },
    StartGeneration {
        query: String,
        #[serde(default)]
        template_name: Option<String>,
        #[serde(default)]
        agent_mode: Option<String>,
    },
    StopGeneration,
    StartDebug {
        issue: String,
        #[serde(default)]
        focus_paths: Vec<String>,
    },
    CancelOperation,
}

/// Opaque handle identifying one client connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

struct Connection {
    session_id: Option<String>,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

/// Routes events between sessions and their connected clients.
pub struct SessionCoordinator {
    store: std::sync::Arc<SessionStore>,
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    commands: mpsc::UnboundedSender<(String, ClientCommand)>,
}

impl SessionCoordinator {
    /// Creates a coordinator; forwarded commands arrive on the returned
    /// receiver, tagged with their session id.
    pub fn new(
        store: std::sync::Arc<SessionStore>,
    ) -> (Self, mpsc::UnboundedReceiver<(String, ClientCommand)>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (
            Self {
                store,
                connections: Mutex::new(HashMap::new()),
                commands,
            },
            rx,
        )
    }

    /// Registers a new connection and returns its event stream.
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = ConnectionId::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.insert(id.clone(), Connection { session_id: None, sender });
        tracing::debug!(connection_id = id.as_str(), "connection registered");
        (id, receiver)
    }

    /// Binds a connection to a session and acknowledges with `Connected`.
    pub fn bind(&self, connection_id: &ConnectionId, session_id: &str) -> Result<()> {
        // session must exist before a client can bind to it
        self.store.get(session_id)?;
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        let connection = connections
            .get_mut(connection_id)
            .ok_or_else(|| Error::SessionNotFound(connection_id.as_str().to_string()))?;
        connection.session_id = Some(session_id.to_string());
        let _ = connection.sender.send(ServerEvent::Connected {
            session_id: session_id.to_string(),
            server_time: Utc::now(),
        });
        tracing::info!(connection_id = connection_id.as_str(), session_id, "connection bound");
        Ok(())
    }

    /// Drops a connection.
    pub fn unregister(&self, connection_id: &ConnectionId) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.remove(connection_id);
    }

    /// Sends an event to every connection bound to the session. Dead
    /// connections are pruned as a side effect.
    pub fn broadcast_to_session(&self, session_id: &str, event: ServerEvent) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.retain(|_, connection| {
            if connection.session_id.as_deref() != Some(session_id) {
                return true;
            }
            connection.sender.send(event.clone()).is_ok()
        });
    }

    /// Handles one decoded client command.
    ///
    /// Cancellation is handled here so it works even while a long
    /// operation holds the command pipeline; everything else is forwarded.
    pub fn handle_command(&self, connection_id: &ConnectionId, command: ClientCommand) -> Result<()> {
        if let ClientCommand::Init { session_id, .. } = &command {
            return self.bind(connection_id, session_id);
        }

        let session_id = {
            let connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
            connections
                .get(connection_id)
                .and_then(|c| c.session_id.clone())
                .ok_or_else(|| {
                    Error::InvalidStateTransition("connection is not bound to a session".to_string())
                })?
        };

        match command {
            ClientCommand::CancelOperation | ClientCommand::StopGeneration => {
                self.store.request_cancel(&session_id)?;
                tracing::info!(session_id, "cancellation requested by client");
                Ok(())
            }
            other => {
                self.commands
                    .send((session_id, other))
                    .map_err(|_| Error::InvalidStateTransition("command pipeline closed".to_string()))
            }
        }
    }

    /// Builds the standard state snapshot event for a session.
    pub fn state_update_for(session: &AgentSession, preview_url: Option<String>) -> ServerEvent {
        let phases_total = session
            .blueprint
            .as_ref()
            .map(|b| b.roadmap.len() as u32 + u32::from(b.initial_phase.is_some()))
            .unwrap_or(0);
        ServerEvent::StateUpdate {
            dev_state: session.current_dev_state,
            phases_completed: session.completed_phases.len() as u32,
            phases_total,
            current_phase: session.current_phase.as_ref().map(|p| p.name.clone()),
            is_generating: session.current_dev_state.is_generation_pipeline(),
            is_debugging: session.current_dev_state == DevState::Debugging,
            preview_url,
        }
    }

    pub fn connection_count(&self) -> usize {
        let connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.len()
    }
}
