//! Service settings loaded from the environment.
//!
//! Environment variables (optionally from a `.env` file) provide defaults;
//! command-line flags override them in `main`.

use crate::error::{ConfigError, InfraError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::validator::DescriptorValidator;

/// Default external tool.
pub const DEFAULT_TOOL: &str = "terraform";

/// Default listen address for the HTTP service.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

/// Default capacity of a subscriber feed, in events.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory holding one working directory per session.
    pub workspace_root: PathBuf,
    /// Program invoked for lifecycle operations.
    pub tool: String,
    /// Address the HTTP service binds to.
    pub listen: String,
    /// Bounded capacity of each subscriber feed.
    pub feed_capacity: usize,
    /// Regions accepted in addition to the built-in list.
    pub extra_regions: Vec<String>,
}

impl Settings {
    /// Creates settings rooted at the given workspace with defaults elsewhere.
    #[must_use]
    pub fn with_workspace(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            tool: String::from(DEFAULT_TOOL),
            listen: String::from(DEFAULT_LISTEN),
            feed_capacity: DEFAULT_FEED_CAPACITY,
            extra_regions: Vec::new(),
        }
    }

    /// Sets the external tool.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Sets the feed capacity (at least 1).
    #[must_use]
    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity.max(1);
        self
    }

    /// Loads settings from the process environment.
    ///
    /// Recognized variables: `HALLDYLL_WORKSPACE`, `HALLDYLL_TOOL`,
    /// `HALLDYLL_LISTEN`, `HALLDYLL_FEED_CAPACITY`, `HALLDYLL_EXTRA_REGIONS`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an unparsable value.
    pub fn from_env() -> Result<Self> {
        let workspace_root = std::env::var("HALLDYLL_WORKSPACE")
            .map_or_else(|_| default_workspace_root(), PathBuf::from);
        let mut settings = Self::with_workspace(workspace_root);

        if let Ok(tool) = std::env::var("HALLDYLL_TOOL") {
            debug!("Overriding tool from environment");
            settings.tool = tool;
        }

        if let Ok(listen) = std::env::var("HALLDYLL_LISTEN") {
            debug!("Overriding listen address from environment");
            settings.listen = listen;
        }

        if let Ok(capacity) = std::env::var("HALLDYLL_FEED_CAPACITY") {
            let capacity = capacity.trim().parse::<usize>().map_err(|_| {
                InfraError::Config(ConfigError::validation(
                    format!("Invalid feed capacity: {capacity}"),
                    "HALLDYLL_FEED_CAPACITY",
                ))
            })?;
            settings = settings.with_feed_capacity(capacity);
        }

        if let Ok(regions) = std::env::var("HALLDYLL_EXTRA_REGIONS") {
            settings.extra_regions = parse_region_list(&regions);
        }

        Ok(settings)
    }

    /// Builds a descriptor validator including the extra regions.
    #[must_use]
    pub fn validator(&self) -> DescriptorValidator {
        let mut validator = DescriptorValidator::new();
        for region in &self.extra_regions {
            validator.add_region(region.clone());
        }
        validator
    }
}

/// Loads a `.env` file from the given directory if present.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be loaded.
pub fn load_dotenv(base_path: Option<&Path>) -> Result<()> {
    let env_path = base_path.map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

    if env_path.exists() {
        info!("Loading environment from: {}", env_path.display());
        dotenvy::from_path(&env_path).map_err(|e| {
            InfraError::Config(ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })
        })?;
    } else {
        debug!(".env file not found at: {}", env_path.display());
    }

    Ok(())
}

fn default_workspace_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("halldyll-infra")
        .join("sessions")
}

fn parse_region_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::with_workspace("/tmp/ws");
        assert_eq!(settings.tool, DEFAULT_TOOL);
        assert_eq!(settings.feed_capacity, DEFAULT_FEED_CAPACITY);
        assert_eq!(settings.workspace_root, PathBuf::from("/tmp/ws"));
    }

    #[test]
    fn test_feed_capacity_floor() {
        let settings = Settings::with_workspace("/tmp/ws").with_feed_capacity(0);
        assert_eq!(settings.feed_capacity, 1);
    }

    #[test]
    fn test_extra_regions_extend_validator() {
        let mut settings = Settings::with_workspace("/tmp/ws");
        settings.extra_regions = parse_region_list(" eu-sovereign-1 , ,local-1");
        assert_eq!(settings.extra_regions, vec!["eu-sovereign-1", "local-1"]);

        let validator = settings.validator();
        assert!(validator.is_known_region("local-1"));
        assert!(validator.is_known_region("eu-west-1"));
    }

    #[test]
    fn test_load_dotenv_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_dotenv(Some(dir.path())).is_ok());
    }
}
