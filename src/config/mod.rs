//! Configuration module for the Halldyll infra orchestrator.
//!
//! This module handles everything that happens before a process is spawned:
//! - Parsing descriptors from JSON or YAML
//! - Validation against the region and naming rules
//! - Deterministic rendering into Terraform configuration text
//! - Fingerprinting rendered output
//! - Loading service settings from the environment

mod descriptor;
mod hash;
mod parser;
mod renderer;
mod settings;
mod validator;

pub use descriptor::{Descriptor, EnvironmentConfig, ExecutionTarget, ServiceKind, ServicesConfig};
pub use hash::ConfigHasher;
pub use parser::DescriptorParser;
pub use renderer::{
    hcl_string, rendered_region, service_fragment, ConfigRenderer, RenderedConfig, CONFIG_FILE_NAME,
};
pub use settings::{load_dotenv, Settings, DEFAULT_FEED_CAPACITY, DEFAULT_LISTEN, DEFAULT_TOOL};
pub use validator::{
    derive_name, is_valid_name, DescriptorValidator, ValidationIssue, ValidationResult,
    KNOWN_REGIONS, MAX_NAME_LEN,
};
