//! Descriptor parsing from JSON and YAML sources.
//!
//! Descriptors are persisted by an external collaborator; this parser only
//! reads them, choosing the format from the file extension.

use crate::error::{ConfigError, InfraError, Result};
use std::path::Path;
use tracing::{debug, info};

use super::descriptor::Descriptor;

/// Parser for descriptor documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct DescriptorParser;

impl DescriptorParser {
    /// Creates a new descriptor parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Loads a descriptor from a `.json`, `.yaml` or `.yml` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or cannot be parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Descriptor> {
        let path = path.as_ref();
        info!("Loading descriptor from: {}", path.display());

        if !path.exists() {
            return Err(InfraError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            InfraError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            self.parse_json(&content, Some(path))
        } else {
            self.parse_yaml(&content, Some(path))
        }
    }

    /// Parses a descriptor from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid.
    pub fn parse_json(&self, content: &str, source: Option<&Path>) -> Result<Descriptor> {
        debug!("Parsing JSON descriptor");
        serde_json::from_str(content).map_err(|e| {
            InfraError::Config(ConfigError::ParseError {
                message: format!("JSON parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })
    }

    /// Parses a descriptor from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<Descriptor> {
        debug!("Parsing YAML descriptor");
        serde_yaml::from_str(content).map_err(|e| {
            InfraError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })
    }
}
