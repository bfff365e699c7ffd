//! Generation session state and persistence.

pub mod state;
pub mod store;

pub use state::{
    AgentSession, Blueprint, DevState, FileState, PhaseConcept, PhaseState, PlannedFile,
    RuntimeErrorRecord,
};
pub use store::SessionStore;
