//! sandpiper: supervision runtime for AI-assisted code generation in
//! remote sandboxes.
//!
//! The crate wraps an ephemeral sandbox (a cloud VM running a JS dev
//! server) with the machinery needed to keep long generation sessions
//! productive: health monitoring, keep-alive heartbeats, environment
//! validation, deterministic build-error recovery, a self-healing
//! supervisor reacting to command telemetry, a resumable phase state
//! machine, and a bounded AI debug loop for errors the deterministic tier
//! cannot fix.
//!
//! [`SandboxOrchestrator`] is the main entry point; it composes the
//! components around one [`SandboxProvider`] implementation.

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod health;
pub mod keepalive;
pub mod orchestrator;
pub mod phases;
pub mod provider;
pub mod recovery;
pub mod session;
pub mod supervisor;
pub mod telemetry;
pub mod validator;

pub use agent::{AgentModel, AgentTurn, DebugLoop, DebugReport, LoopTermination, ToolCall};
pub use config::SupervisorConfig;
pub use coordinator::{ClientCommand, ServerEvent, SessionCoordinator};
pub use error::{BuildErrorType, Error, Result};
pub use health::{HealthMonitor, HealthStatus, SandboxState};
pub use keepalive::{KeepAliveService, SessionKind};
pub use orchestrator::{OrchestratorContext, OrchestratorStatus, SandboxOrchestrator};
pub use phases::PhaseManager;
pub use provider::{CommandResult, FakeSandbox, SandboxInfo, SandboxProvider};
pub use recovery::{BuildError, BuildErrorHandler, RecoveryResult, RecoveryStrategy};
pub use session::{AgentSession, Blueprint, DevState, SessionStore};
pub use supervisor::SelfHealingSupervisor;
pub use telemetry::{CommandLogEvent, TelemetryBus};
pub use validator::{EnvironmentValidator, ValidateOptions, ValidationReport};
