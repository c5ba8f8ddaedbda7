//! Descriptor validation.
//!
//! Validation runs before any rendering or I/O. All problems are collected,
//! and the first error is reported as a `ValidationError` carrying its field.

use crate::error::{ConfigError, InfraError, Result};
use std::collections::BTreeSet;
use tracing::debug;

use super::descriptor::Descriptor;

/// Maximum length of an application name.
pub const MAX_NAME_LEN: usize = 40;

/// Region identifiers accepted out of the box.
pub const KNOWN_REGIONS: &[&str] = &[
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ca-central-1",
    "eu-central-1",
    "eu-central-2",
    "eu-north-1",
    "eu-south-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "me-south-1",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
];

/// Validator for descriptors.
#[derive(Debug, Clone)]
pub struct DescriptorValidator {
    /// Recognized region identifiers.
    known_regions: BTreeSet<String>,
}

/// Validation result containing all problems found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationIssue>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationIssue {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl Default for DescriptorValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorValidator {
    /// Creates a validator with the default region list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            known_regions: KNOWN_REGIONS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Adds a region to the allow-list.
    pub fn add_region(&mut self, region: impl Into<String>) {
        self.known_regions.insert(region.into());
    }

    /// Returns whether a region identifier is recognized.
    #[must_use]
    pub fn is_known_region(&self, region: &str) -> bool {
        self.known_regions.contains(region)
    }

    /// Validates a descriptor.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` for the first problem found.
    pub fn validate(&self, descriptor: &Descriptor) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_name(&descriptor.name, &mut result);
        self.validate_region(descriptor, &mut result);
        Self::validate_stage(&descriptor.environment.stage, &mut result);

        if descriptor.services.enabled().is_empty() {
            result
                .warnings
                .push(String::from("No services requested; only the base configuration will be rendered"));
        }

        if result.errors.is_empty() {
            debug!("Descriptor '{}' passed validation", descriptor.name);
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(InfraError::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            )))
        }
    }

    /// Validates a bare region identifier.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the region is blank or unknown.
    pub fn validate_region_id(&self, region: &str) -> Result<()> {
        let region = region.trim();
        if region.is_empty() {
            return Err(ConfigError::validation("Region is required", "region").into());
        }
        if !self.is_known_region(region) {
            return Err(ConfigError::validation(
                format!("Unknown region '{region}'"),
                "region",
            )
            .into());
        }
        Ok(())
    }

    fn validate_name(name: &str, result: &mut ValidationResult) {
        if name.trim().is_empty() {
            result.errors.push(ValidationIssue {
                field: String::from("name"),
                message: String::from("Application name cannot be empty"),
            });
        } else if name.len() > MAX_NAME_LEN {
            result.errors.push(ValidationIssue {
                field: String::from("name"),
                message: format!("Application name is longer than {MAX_NAME_LEN} characters"),
            });
        } else if !is_valid_name(name) {
            result.errors.push(ValidationIssue {
                field: String::from("name"),
                message: format!(
                    "Application name '{name}' is invalid. Must be lowercase alphanumeric with hyphens."
                ),
            });
        }
    }

    fn validate_region(&self, descriptor: &Descriptor, result: &mut ValidationResult) {
        match descriptor.region() {
            None => result.errors.push(ValidationIssue {
                field: String::from("environment.region"),
                message: String::from("Region is required"),
            }),
            Some(region) if !self.is_known_region(region) => result.errors.push(ValidationIssue {
                field: String::from("environment.region"),
                message: format!("Unknown region '{region}'"),
            }),
            Some(_) => {}
        }
    }

    fn validate_stage(stage: &str, result: &mut ValidationResult) {
        if !stage.is_empty() && !is_valid_name(stage) {
            result.errors.push(ValidationIssue {
                field: String::from("environment.stage"),
                message: format!("Stage '{stage}' must be lowercase alphanumeric with hyphens"),
            });
        }
    }
}

/// Validates that a name is safe as a resource-name fragment.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    // First character must be a letter
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

/// Derives a valid application name from an arbitrary identifier.
///
/// Used when a session is initialized without a descriptor.
#[must_use]
pub fn derive_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            name.push(c);
        } else if !name.is_empty() && !name.ends_with('-') {
            name.push('-');
        }
    }

    let name = name.trim_start_matches(|c: char| c.is_ascii_digit() || c == '-');
    let mut name: String = name.chars().take(MAX_NAME_LEN - 4).collect();
    while name.ends_with('-') {
        name.pop();
    }

    if name.is_empty() {
        String::from("app")
    } else {
        format!("app-{name}")
    }
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("orders"));
        assert!(is_valid_name("my-app-123"));
        assert!(is_valid_name("a"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Orders")); // uppercase
        assert!(!is_valid_name("1-orders")); // starts with number
        assert!(!is_valid_name("orders_api")); // underscore
        assert!(!is_valid_name("orders-")); // ends with hyphen
        assert!(!is_valid_name("orders--api")); // consecutive hyphens
        assert!(!is_valid_name("orders\"}")); // template breakout
    }

    #[test]
    fn test_missing_name_rejected() {
        let validator = DescriptorValidator::new();
        let descriptor = Descriptor::new("", "eu-west-1");
        let err = validator.validate(&descriptor).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.field(), Some("name"));
    }

    #[test]
    fn test_missing_region_rejected() {
        let validator = DescriptorValidator::new();
        let mut descriptor = Descriptor::new("orders", "");
        descriptor.environment.region = None;
        let err = validator.validate(&descriptor).unwrap_err();
        assert_eq!(err.field(), Some("environment.region"));
    }

    #[test]
    fn test_unknown_region_rejected() {
        let validator = DescriptorValidator::new();
        let descriptor = Descriptor::new("orders", "mars-north-1");
        let err = validator.validate(&descriptor).unwrap_err();
        assert!(err.to_string().contains("mars-north-1"));
    }

    #[test]
    fn test_custom_region_accepted() {
        let mut validator = DescriptorValidator::new();
        validator.add_region("mars-north-1");
        let descriptor = Descriptor::new("orders", "mars-north-1");
        assert!(validator.validate(&descriptor).is_ok());
    }

    #[test]
    fn test_no_services_warns() {
        let validator = DescriptorValidator::new();
        let result = validator.validate(&Descriptor::new("orders", "eu-west-1")).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_derive_name() {
        assert_eq!(derive_name("Session_42"), "app-session-42");
        assert_eq!(derive_name("42"), "app");
        assert_eq!(derive_name("--"), "app");
        assert!(is_valid_name(&derive_name("550e8400-e29b-41d4-a716-446655440000")));
        assert!(derive_name(&"x".repeat(200)).len() <= MAX_NAME_LEN);
    }
}
