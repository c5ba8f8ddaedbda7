//! Process-wide session registry.
//!
//! The store maps session identifiers to their working directory, status and
//! captured output. It is created once at service start and lives as long as
//! the process; entries are added on demand and only removed through
//! [`SessionStore::remove`]. Nothing is persisted, so a restart forgets
//! in-flight sessions (their directories are rediscovered from disk).
//!
//! Entries live in a sharded concurrent map, so operations on different
//! sessions do not contend on a single lock.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{InfraError, Result, SessionError};

use super::types::{
    ActiveOperation, Operation, OperationRecord, Session, SessionSnapshot, SessionStatus,
    SessionSummary,
};
use super::workspace::Workspace;

/// Maximum length of a session identifier.
pub const MAX_SESSION_ID_LEN: usize = 64;

/// Concurrent session registry.
#[derive(Debug)]
pub struct SessionStore {
    /// Directory holding one subdirectory per session.
    root: PathBuf,
    /// Sessions by identifier.
    sessions: DashMap<String, Session>,
}

/// Exclusive claim on a session for the duration of one operation.
///
/// Dropping the guard releases the session. A guard dropped after
/// [`OperationGuard::start`] but before [`OperationGuard::finish`] marks the
/// session as failed.
#[derive(Debug)]
pub struct OperationGuard {
    store: Arc<SessionStore>,
    session_id: String,
    operation: Operation,
    started_at: chrono::DateTime<Utc>,
    started: bool,
    finished: bool,
}

impl SessionStore {
    /// Creates an empty store rooted at the given workspace directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sessions: DashMap::new(),
        }
    }

    /// Returns the workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checks that an identifier can be used as a directory name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` if the identifier is empty, too long, or contains
    /// characters other than ASCII letters, digits, `-` and `_`.
    pub fn validate_id(session_id: &str) -> Result<()> {
        let reason = if session_id.is_empty() {
            Some(String::from("identifier is empty"))
        } else if session_id.len() > MAX_SESSION_ID_LEN {
            Some(format!("identifier is longer than {MAX_SESSION_ID_LEN} characters"))
        } else if !session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            Some(String::from("only ASCII letters, digits, '-' and '_' are allowed"))
        } else {
            None
        };

        match reason {
            Some(reason) => Err(SessionError::InvalidId {
                session_id: session_id.to_string(),
                reason,
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Returns the working directory a session identifier maps to.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for identifiers that cannot be directory names.
    pub fn working_dir(&self, session_id: &str) -> Result<PathBuf> {
        Self::validate_id(session_id)?;
        Ok(self.root.join(session_id))
    }

    /// Returns the session, creating it if the identifier is unseen.
    ///
    /// A new session whose directory already exists starts in the status
    /// implied by the artifacts found there.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for unusable identifiers.
    pub async fn get_or_create(&self, session_id: &str) -> Result<Session> {
        if let Some(session) = self.sessions.get(session_id) {
            return Ok(session.clone());
        }

        let working_dir = self.working_dir(session_id)?;
        let status = Workspace::new(&working_dir).infer_status().await;

        let session = match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                info!(
                    "Created session {session_id} at {} (status: {status})",
                    working_dir.display()
                );
                entry.insert(Session::new(session_id, working_dir, status)).clone()
            }
        };
        Ok(session)
    }

    /// Returns a copy of the session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session was never created.
    pub fn get(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .get(session_id)
            .map(|s| s.clone())
            .ok_or_else(|| SessionError::not_found(session_id).into())
    }

    /// Returns the status view of a session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session was never created.
    pub fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot> {
        self.sessions
            .get(session_id)
            .map(|s| s.snapshot())
            .ok_or_else(|| SessionError::not_found(session_id).into())
    }

    /// Returns the current status of a session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session was never created.
    pub fn status(&self, session_id: &str) -> Result<SessionStatus> {
        self.sessions
            .get(session_id)
            .map(|s| s.status)
            .ok_or_else(|| SessionError::not_found(session_id).into())
    }

    /// Updates the status of a session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session was never created.
    pub fn set_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        self.with_session(session_id, |session| {
            debug!("Session {session_id}: {} -> {status}", session.status);
            session.set_status(status);
        })
    }

    /// Appends an output line to a session's log.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session was never created.
    pub fn append_log(&self, session_id: &str, line: impl Into<String>) -> Result<()> {
        let line = line.into();
        self.with_session(session_id, move |session| session.push_log(line))
    }

    /// Claims a session for one operation.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session was never created and `Conflict` if
    /// another operation already holds it.
    pub fn begin_operation(
        self: &Arc<Self>,
        session_id: &str,
        operation: Operation,
    ) -> Result<OperationGuard> {
        let started_at = Utc::now();
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| InfraError::from(SessionError::not_found(session_id)))?;

        if let Some(active) = session.active {
            warn!(
                "Rejecting {operation} for session {session_id}: {} in progress",
                active.operation
            );
            return Err(SessionError::Conflict {
                session_id: session_id.to_string(),
                operation: active.operation.to_string(),
            }
            .into());
        }

        session.active = Some(ActiveOperation {
            operation,
            started_at,
        });
        drop(session);

        Ok(OperationGuard {
            store: Arc::clone(self),
            session_id: session_id.to_string(),
            operation,
            started_at,
            started: false,
            finished: false,
        })
    }

    /// Records the outcome of an operation and releases the session.
    ///
    /// Sets the final status, replaces the last error with the record's
    /// error (clearing it on success) and appends the record to history.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session was evicted.
    pub fn finish_operation(
        &self,
        session_id: &str,
        status: SessionStatus,
        record: OperationRecord,
    ) -> Result<()> {
        self.with_session(session_id, |session| {
            debug!(
                "Session {session_id}: {} finished ({}) -> {status}",
                record.operation,
                if record.success { "ok" } else { "failed" }
            );
            session.set_status(status);
            session.last_error.clone_from(&record.error);
            session.add_history(record);
            session.active = None;
        })
    }

    /// Lists all sessions ordered by identifier.
    #[must_use]
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> =
            self.sessions.iter().map(|entry| entry.summary()).collect();
        summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        summaries
    }

    /// Returns the number of known sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no session is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Evicts a session, optionally deleting its working directory.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown sessions, `Conflict` while an operation
    /// holds the session, or an IO error if the directory cannot be removed.
    pub async fn remove(&self, session_id: &str, purge: bool) -> Result<Session> {
        let removed = self
            .sessions
            .remove_if(session_id, |_, session| !session.is_busy());

        let Some((_, session)) = removed else {
            return Err(match self.sessions.get(session_id) {
                Some(session) => SessionError::Conflict {
                    session_id: session_id.to_string(),
                    operation: session
                        .active
                        .map_or_else(String::new, |a| a.operation.to_string()),
                }
                .into(),
                None => SessionError::not_found(session_id).into(),
            });
        };

        info!("Evicted session {session_id}");

        if purge {
            match tokio::fs::remove_dir_all(&session.working_dir).await {
                Ok(()) => info!("Removed working directory {}", session.working_dir.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(session)
    }

    fn with_session<T>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> T) -> Result<T> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| InfraError::from(SessionError::not_found(session_id)))?;
        Ok(f(&mut session))
    }
}

impl OperationGuard {
    /// Returns the claimed session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the claimed operation.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Marks the operation as running and moves the session to `status`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session was evicted.
    pub fn start(&mut self, status: SessionStatus) -> Result<()> {
        self.store.set_status(&self.session_id, status)?;
        self.started = true;
        Ok(())
    }

    /// Records the outcome and releases the session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session was evicted.
    pub fn finish(
        mut self,
        status: SessionStatus,
        exit_code: Option<i32>,
        error: Option<String>,
    ) -> Result<OperationRecord> {
        let record = OperationRecord {
            operation: self.operation,
            started_at: self.started_at,
            finished_at: Utc::now(),
            success: error.is_none(),
            exit_code,
            error,
        };

        let result = self
            .store
            .finish_operation(&self.session_id, status, record.clone());
        self.finished = true;
        result.map(|()| record)
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let interrupted = self.started;
        let operation = self.operation;
        let started_at = self.started_at;
        let released = self.store.with_session(&self.session_id, |session| {
            session.active = None;
            if interrupted {
                let message = format!("{operation} was interrupted before completion");
                session.set_status(SessionStatus::Error);
                session.last_error = Some(message.clone());
                session.add_history(OperationRecord {
                    operation,
                    started_at,
                    finished_at: Utc::now(),
                    success: false,
                    exit_code: None,
                    error: Some(message),
                });
            }
        });
        if let Err(e) = released {
            debug!("Could not release {operation} on session {}: {e}", self.session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn store() -> (Arc<SessionStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (Arc::new(SessionStore::new(dir.path())), dir)
    }

    #[test]
    fn test_validate_id() {
        assert!(SessionStore::validate_id("s1").is_ok());
        assert!(SessionStore::validate_id("Team_A-42").is_ok());
        assert!(SessionStore::validate_id("").is_err());
        assert!(SessionStore::validate_id("../etc").is_err());
        assert!(SessionStore::validate_id("a/b").is_err());
        assert!(SessionStore::validate_id(&"x".repeat(65)).is_err());
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let (store, dir) = store();
        let first = store.get_or_create("s1").await.unwrap();
        let second = store.get_or_create("s1").await.unwrap();

        assert_eq!(first.working_dir, dir.path().join("s1"));
        assert_eq!(first.working_dir, second.working_dir);
        assert_eq!(first.status, SessionStatus::Idle);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_session_not_found() {
        let (store, _dir) = store();
        let err = store.status("ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(store.append_log("ghost", "x").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_logs_and_status() {
        let (store, _dir) = store();
        store.get_or_create("s1").await.unwrap();
        store.append_log("s1", "hello").unwrap();
        store.set_status("s1", SessionStatus::Initialized).unwrap();

        let snapshot = store.snapshot("s1").unwrap();
        assert_eq!(snapshot.logs, vec!["hello"]);
        assert_eq!(snapshot.status, SessionStatus::Initialized);
    }

    #[tokio::test]
    async fn test_second_operation_conflicts() {
        let (store, _dir) = store();
        store.get_or_create("s1").await.unwrap();

        let guard = store.begin_operation("s1", Operation::Init).unwrap();
        let err = store.begin_operation("s1", Operation::Plan).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        drop(guard);
        assert!(store.begin_operation("s1", Operation::Plan).is_ok());
    }

    #[tokio::test]
    async fn test_other_sessions_unaffected_by_busy_session() {
        let (store, _dir) = store();
        store.get_or_create("s1").await.unwrap();
        store.get_or_create("s2").await.unwrap();

        let _guard = store.begin_operation("s1", Operation::Init).unwrap();
        assert!(store.begin_operation("s2", Operation::Init).is_ok());
    }

    #[tokio::test]
    async fn test_finish_records_history() {
        let (store, _dir) = store();
        store.get_or_create("s1").await.unwrap();

        let mut guard = store.begin_operation("s1", Operation::Plan).unwrap();
        guard.start(SessionStatus::Planning).unwrap();
        assert_eq!(store.status("s1").unwrap(), SessionStatus::Planning);

        let record = guard
            .finish(SessionStatus::Error, Some(1), Some(String::from("boom")))
            .unwrap();
        assert!(!record.success);

        let snapshot = store.snapshot("s1").unwrap();
        assert_eq!(snapshot.status, SessionStatus::Error);
        assert_eq!(snapshot.last_error.as_deref(), Some("boom"));
        assert_eq!(snapshot.history.len(), 1);
        assert!(snapshot.active.is_none());
    }

    #[tokio::test]
    async fn test_dropped_started_guard_marks_error() {
        let (store, _dir) = store();
        store.get_or_create("s1").await.unwrap();

        let mut guard = store.begin_operation("s1", Operation::Apply).unwrap();
        guard.start(SessionStatus::Applying).unwrap();
        drop(guard);

        let snapshot = store.snapshot("s1").unwrap();
        assert_eq!(snapshot.status, SessionStatus::Error);
        assert!(snapshot.last_error.is_some());
        assert!(snapshot.active.is_none());
    }

    #[tokio::test]
    async fn test_remove_refuses_busy_session() {
        let (store, _dir) = store();
        let session = store.get_or_create("s1").await.unwrap();
        std::fs::create_dir_all(&session.working_dir).unwrap();

        let guard = store.begin_operation("s1", Operation::Init).unwrap();
        assert_eq!(
            store.remove("s1", true).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );
        drop(guard);

        store.remove("s1", true).await.unwrap();
        assert!(!session.working_dir.exists());
        assert_eq!(store.get("s1").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(store.remove("s1", false).await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_guard_outliving_its_session_drops_quietly() {
        let (store, _dir) = store();
        store.get_or_create("s1").await.unwrap();

        let mut guard = store.begin_operation("s1", Operation::Plan).unwrap();
        guard.start(SessionStatus::Planning).unwrap();
        store.sessions.remove("s1");
        drop(guard);

        assert!(store.is_empty());
        assert_eq!(store.get("s1").unwrap_err().kind(), ErrorKind::NotFound);
    }
}
