//! Error types for the Halldyll infra orchestrator.
//!
//! This module provides the error hierarchy for every stage of a provisioning
//! session: descriptor parsing and validation, session bookkeeping, lifecycle
//! preconditions, and supervision of the external provisioning tool.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the orchestrator.
#[derive(Debug, Error)]
pub enum InfraError {
    /// Descriptor and configuration errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Session registry errors.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Lifecycle ordering errors.
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// External tool errors.
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Descriptor and configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A descriptor or settings file was not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A descriptor could not be parsed.
    #[error("Failed to parse descriptor: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Descriptor validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },
}

/// Session registry errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session identifier was never created.
    #[error("Session not found: {session_id}")]
    NotFound {
        /// The unknown identifier.
        session_id: String,
    },

    /// Another operation is already running for the session.
    #[error("Session {session_id} is busy running {operation}")]
    Conflict {
        /// The busy session.
        session_id: String,
        /// The operation currently in flight.
        operation: String,
    },

    /// The session identifier cannot be used as a directory name.
    #[error("Invalid session identifier '{session_id}': {reason}")]
    InvalidId {
        /// The rejected identifier.
        session_id: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Lifecycle ordering errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The operation is not allowed from the session's current state.
    #[error("Cannot {operation} session {session_id}: {reason}")]
    Precondition {
        /// Session the operation targeted.
        session_id: String,
        /// The rejected operation.
        operation: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// External tool errors.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The tool could not be started.
    #[error("Failed to start '{program}': {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Description of the failure.
        message: String,
    },

    /// The tool ran and exited unsuccessfully.
    #[error("'{program}' exited with {}{}", describe_code(.code), describe_stderr(.stderr))]
    Execution {
        /// Program that failed.
        program: String,
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
}

/// Flat classification of errors, used by the HTTP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or incomplete descriptor or request.
    Validation,
    /// Operation attempted out of order.
    Precondition,
    /// Unknown session.
    NotFound,
    /// Concurrent operation on the same session.
    Conflict,
    /// External tool could not be started.
    Spawn,
    /// External tool exited non-zero.
    Execution,
    /// Anything else.
    Internal,
}

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, InfraError>;

fn describe_code(code: &Option<i32>) -> String {
    code.map_or_else(|| String::from("a signal"), |c| format!("code {c}"))
}

fn describe_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

impl InfraError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the flat classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(ConfigError::FileNotFound { .. }) => ErrorKind::NotFound,
            Self::Config(_) | Self::Session(SessionError::InvalidId { .. }) => ErrorKind::Validation,
            Self::Session(SessionError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Session(SessionError::Conflict { .. }) => ErrorKind::Conflict,
            Self::Lifecycle(LifecycleError::Precondition { .. }) => ErrorKind::Precondition,
            Self::Process(ProcessError::Spawn { .. }) => ErrorKind::Spawn,
            Self::Process(ProcessError::Execution { .. }) => ErrorKind::Execution,
            Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the offending field for validation errors.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Config(ConfigError::ValidationError { field, .. }) => field.as_deref(),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl SessionError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::NotFound {
            session_id: session_id.into(),
        }
    }
}

impl LifecycleError {
    /// Creates a precondition error.
    #[must_use]
    pub fn precondition(
        session_id: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Precondition {
            session_id: session_id.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

impl ErrorKind {
    /// Returns the lowercase name used in error bodies.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Precondition => "precondition",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Spawn => "spawn",
            Self::Execution => "execution",
            Self::Internal => "internal",
        }
    }
}
