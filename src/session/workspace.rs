//! On-disk layout of a session's working directory.
//!
//! The orchestrator treats tool artifacts as opaque; it only checks whether
//! they exist. These checks are authoritative over in-memory status because
//! the two can diverge after a restart.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::config::CONFIG_FILE_NAME;
use crate::error::Result;

use super::types::SessionStatus;

/// Plan artifact written by `plan` and consumed by `apply`.
pub const PLAN_FILE: &str = "tfplan";

/// State file written by the tool once resources exist.
pub const STATE_FILE: &str = "terraform.tfstate";

/// Directory the tool creates during `init`.
pub const PLUGIN_DIR: &str = ".terraform";

/// A session's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Wraps a working directory path.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of the rendered configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Path of the plan artifact.
    #[must_use]
    pub fn plan_path(&self) -> PathBuf {
        self.root.join(PLAN_FILE)
    }

    /// Path of the tool's state file.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Returns true if the directory exists.
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.root).await.is_ok_and(|m| m.is_dir())
    }

    /// Returns true if the rendered configuration is on disk.
    pub async fn has_config(&self) -> bool {
        is_file(&self.config_path()).await
    }

    /// Returns true if a plan artifact is on disk.
    pub async fn has_plan(&self) -> bool {
        is_file(&self.plan_path()).await
    }

    /// Returns true if a non-empty state file is on disk.
    pub async fn has_state(&self) -> bool {
        fs::metadata(self.state_path())
            .await
            .is_ok_and(|m| m.is_file() && m.len() > 0)
    }

    /// Returns true if the tool's plugin directory exists.
    pub async fn is_initialized(&self) -> bool {
        fs::metadata(self.root.join(PLUGIN_DIR))
            .await
            .is_ok_and(|m| m.is_dir())
    }

    /// Creates the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn ensure(&self) -> Result<()> {
        if !self.exists().await {
            debug!("Creating working directory: {}", self.root.display());
            fs::create_dir_all(&self.root).await?;
        }
        Ok(())
    }

    /// Reads the rendered configuration, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn read_config(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.config_path()).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the rendered configuration, replacing any previous file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write_config(&self, text: &str) -> Result<()> {
        self.ensure().await?;
        let tmp = self.root.join(format!(".{CONFIG_FILE_NAME}.tmp"));
        fs::write(&tmp, text).await?;
        fs::rename(&tmp, self.config_path()).await?;
        Ok(())
    }

    /// Removes the plan artifact if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn remove_plan(&self) -> Result<()> {
        match fs::remove_file(self.plan_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Infers a status from artifacts left on disk.
    ///
    /// Used when a session is first seen for a directory that already exists.
    pub async fn infer_status(&self) -> SessionStatus {
        if !self.exists().await {
            SessionStatus::Idle
        } else if self.has_plan().await {
            SessionStatus::Planned
        } else if self.has_state().await {
            SessionStatus::Applied
        } else if self.is_initialized().await {
            SessionStatus::Initialized
        } else {
            SessionStatus::Idle
        }
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_file())
}
