//! Session types.
//!
//! A session is an isolated unit of provisioning work bound to one working
//! directory. These types are what the store keeps in memory and what the
//! status query returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;

/// Maximum number of log lines kept per session for replay.
pub const MAX_LOG_LINES: usize = 10_000;

/// Maximum number of operation records kept per session.
pub const MAX_HISTORY: usize = 50;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Nothing has run yet.
    #[default]
    Idle,
    /// `init` is running.
    Initializing,
    /// `init` succeeded.
    Initialized,
    /// `plan` is running.
    Planning,
    /// `plan` succeeded and a plan artifact exists.
    Planned,
    /// `apply` is running.
    Applying,
    /// `apply` succeeded.
    Applied,
    /// `destroy` is running.
    Destroying,
    /// `destroy` succeeded.
    Destroyed,
    /// The last operation failed.
    Error,
}

/// A lifecycle operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Write the configuration and initialize the working directory.
    Init,
    /// Compute and save a plan artifact.
    Plan,
    /// Apply the saved plan artifact.
    Apply,
    /// Tear down everything the session applied.
    Destroy,
}

/// Record of one finished operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationRecord {
    /// Which operation ran.
    pub operation: Operation,
    /// When it started.
    pub started_at: DateTime<Utc>,
    /// When it finished.
    pub finished_at: DateTime<Utc>,
    /// Whether it succeeded.
    pub success: bool,
    /// Exit code of the tool, if it ran to completion.
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Error message on failure.
    #[serde(default)]
    pub error: Option<String>,
}

/// An operation currently holding the session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveOperation {
    /// The running operation.
    pub operation: Operation,
    /// When it started.
    pub started_at: DateTime<Utc>,
}

/// A session as kept by the store.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque identifier.
    pub id: String,
    /// Working directory owned by this session.
    pub working_dir: PathBuf,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Captured output lines, oldest first.
    pub logs: VecDeque<String>,
    /// Number of lines evicted from `logs`.
    pub dropped_logs: u64,
    /// Message of the last failure.
    pub last_error: Option<String>,
    /// Recent operation records, oldest first.
    pub history: VecDeque<OperationRecord>,
    /// Operation in flight, if any.
    pub active: Option<ActiveOperation>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session last changed.
    pub updated_at: DateTime<Utc>,
}

/// Serializable view returned by the status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub session_id: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Captured output lines.
    pub logs: Vec<String>,
    /// Lines evicted from the replay buffer.
    pub dropped_logs: u64,
    /// Message of the last failure.
    pub last_error: Option<String>,
    /// Recent operation records.
    pub history: Vec<OperationRecord>,
    /// Operation in flight, if any.
    pub active: Option<ActiveOperation>,
    /// Working directory path.
    pub working_dir: PathBuf,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session last changed.
    pub updated_at: DateTime<Utc>,
}

/// Short listing entry for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Operation in flight, if any.
    pub active: Option<Operation>,
    /// When the session last changed.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new session.
    #[must_use]
    pub fn new(id: &str, working_dir: PathBuf, status: SessionStatus) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            working_dir,
            status,
            logs: VecDeque::new(),
            dropped_logs: 0,
            last_error: None,
            history: VecDeque::new(),
            active: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Updates the status.
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Appends a log line, evicting the oldest line when full.
    pub fn push_log(&mut self, line: String) {
        if self.logs.len() >= MAX_LOG_LINES {
            self.logs.pop_front();
            self.dropped_logs += 1;
        }
        self.logs.push_back(line);
    }

    /// Adds a history record, keeping only the most recent entries.
    pub fn add_history(&mut self, record: OperationRecord) {
        if self.history.len() >= MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(record);
        self.updated_at = Utc::now();
    }

    /// Returns true while an operation holds the session.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Builds the serializable status view.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            status: self.status,
            logs: self.logs.iter().cloned().collect(),
            dropped_logs: self.dropped_logs,
            last_error: self.last_error.clone(),
            history: self.history.iter().cloned().collect(),
            active: self.active,
            working_dir: self.working_dir.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Builds the listing entry.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            status: self.status,
            active: self.active.map(|a| a.operation),
            updated_at: self.updated_at,
        }
    }
}

impl SessionStatus {
    /// Returns true for the `-ing` states an operation holds while running.
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::Planning | Self::Applying | Self::Destroying
        )
    }

    /// Returns the lowercase name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Planning => "planning",
            Self::Planned => "planned",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Destroying => "destroying",
            Self::Destroyed => "destroyed",
            Self::Error => "error",
        }
    }
}

impl Operation {
    /// All operations in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Init, Self::Plan, Self::Apply, Self::Destroy];

    /// Returns the lowercase name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
