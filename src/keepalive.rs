//! Session-scoped keep-alive heartbeats.
//!
//! Remote sandboxes evict on idle timeout. While a generation or debug
//! session is active this service sends a lightweight no-op command on a
//! fixed interval, starting with one immediate heartbeat. A failed
//! heartbeat demotes the health monitor's sandbox state to `unhealthy` but
//! never stops the timer; only `end_session` does.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::KeepAliveConfig;
use crate::health::{HealthMonitor, SandboxState};
use crate::provider::SandboxProvider;
use crate::telemetry::{CommandLogEvent, TelemetryBus};

/// No-op command used as the heartbeat.
const HEARTBEAT_COMMAND: &str = "echo keepalive";

/// What kind of work the active session is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Generation,
    Debug,
    Manual,
}

/// Metadata for the active keep-alive session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub kind: SessionKind,
    pub heartbeat_count: u64,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Keep-alive lifecycle events.
#[derive(Debug, Clone)]
pub enum KeepAliveEvent {
    SessionStarted { session_id: String, kind: SessionKind },
    Heartbeat { session_id: String, count: u64 },
    HeartbeatFailed { session_id: String, error: String },
    SessionEnded { session_id: String, heartbeats: u64 },
}

/// Heartbeat sender scoped to at most one active session.
pub struct KeepAliveService {
    provider: Arc<dyn SandboxProvider>,
    monitor: Arc<HealthMonitor>,
    bus: Arc<TelemetryBus>,
    config: KeepAliveConfig,
    session: Mutex<Option<SessionInfo>>,
    task: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<KeepAliveEvent>,
}

impl KeepAliveService {
    pub fn new(
        provider: Arc<dyn SandboxProvider>,
        monitor: Arc<HealthMonitor>,
        bus: Arc<TelemetryBus>,
        config: KeepAliveConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            provider,
            monitor,
            bus,
            config,
            session: Mutex::new(None),
            task: Mutex::new(None),
            events,
        }
    }

    /// Starts a session and its heartbeat loop, returning the session id.
    ///
    /// If a session is already active this is a hard restart: the old
    /// heartbeat loop is torn down and a fresh one starts under the new id.
    pub fn start_session(self: &Arc<Self>, kind: SessionKind) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        {
            let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(old) = session.as_ref() {
                tracing::warn!(
                    old = %old.session_id,
                    new = %session_id,
                    "restarting keep-alive under new session"
                );
            }
            *session = Some(SessionInfo {
                session_id: session_id.clone(),
                kind,
                heartbeat_count: 0,
                started_at: now,
                last_activity: now,
            });
        }

        let service = Arc::clone(self);
        let id = session_id.clone();
        let interval = self.config.heartbeat_interval();
        let handle = tokio::spawn(async move {
            // immediate first beat, then the fixed interval
            loop {
                if !service.still_owns(&id) {
                    return;
                }
                service.beat(&id).await;
                tokio::time::sleep(interval).await;
            }
        });

        {
            let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(old) = task.replace(handle) {
                old.abort();
            }
        }

        let _ = self.events.send(KeepAliveEvent::SessionStarted {
            session_id: session_id.clone(),
            kind,
        });
        session_id
    }

    /// Changes the active session's kind (e.g. generation -> debug).
    pub fn update_session_kind(&self, kind: SessionKind) -> crate::error::Result<()> {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        match session.as_mut() {
            Some(info) => {
                info.kind = kind;
                Ok(())
            }
            None => Err(crate::error::Error::NotReady(
                "no active keep-alive session".to_string(),
            )),
        }
    }

    /// Records caller activity without sending a heartbeat.
    pub fn record_activity(&self) {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(info) = session.as_mut() {
            info.last_activity = Utc::now();
        }
    }

    /// Stops the heartbeat loop and clears the session.
    pub fn end_session(&self) {
        let ended = {
            let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
            session.take()
        };
        {
            let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
        if let Some(info) = ended {
            tracing::info!(session = %info.session_id, beats = info.heartbeat_count, "keep-alive session ended");
            let _ = self.events.send(KeepAliveEvent::SessionEnded {
                session_id: info.session_id,
                heartbeats: info.heartbeat_count,
            });
        }
    }

    pub fn is_active(&self) -> bool {
        let session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        session.is_some()
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        let session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        session.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KeepAliveEvent> {
        self.events.subscribe()
    }

    fn still_owns(&self, session_id: &str) -> bool {
        let session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        session
            .as_ref()
            .map(|info| info.session_id == session_id)
            .unwrap_or(false)
    }

    async fn beat(&self, session_id: &str) {
        match self.provider.run_command(HEARTBEAT_COMMAND).await {
            Ok(result) if result.success => {
                let count = {
                    let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
                    match session.as_mut() {
                        Some(info) if info.session_id == session_id => {
                            info.heartbeat_count += 1;
                            info.last_activity = Utc::now();
                            info.heartbeat_count
                        }
                        _ => return,
                    }
                };
                self.bus.record(
                    CommandLogEvent::from_result(HEARTBEAT_COMMAND, &result).with_tag("heartbeat"),
                );
                let _ = self.events.send(KeepAliveEvent::Heartbeat {
                    session_id: session_id.to_string(),
                    count,
                });
            }
            Ok(result) => {
                self.on_heartbeat_failure(session_id, result.stderr).await;
            }
            Err(e) => {
                self.on_heartbeat_failure(session_id, e.to_string()).await;
            }
        }
    }

    async fn on_heartbeat_failure(&self, session_id: &str, error: String) {
        tracing::warn!(session = %session_id, error = %error, "heartbeat failed");
        // the timer keeps running; only end_session stops it
        self.monitor.set_state(SandboxState::Unhealthy);
        self.bus
            .record(CommandLogEvent::from_failure(HEARTBEAT_COMMAND, error.clone()).with_tag("heartbeat"));
        let _ = self.events.send(KeepAliveEvent::HeartbeatFailed {
            session_id: session_id.to_string(),
            error,
        });
    }
}

impl Drop for KeepAliveService {
    fn drop(&mut self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }
}
