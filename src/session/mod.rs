//! Session management for the orchestrator.
//!
//! This module provides the process-wide session registry, the per-session
//! working directory layout, and the types reported by status queries.

mod store;
mod types;
mod workspace;

pub use store::{OperationGuard, SessionStore, MAX_SESSION_ID_LEN};
pub use types::{
    ActiveOperation, Operation, OperationRecord, Session, SessionSnapshot, SessionStatus,
    SessionSummary, MAX_HISTORY, MAX_LOG_LINES,
};
pub use workspace::{Workspace, PLAN_FILE, PLUGIN_DIR, STATE_FILE};
