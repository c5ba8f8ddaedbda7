//! Descriptor types describing an application's infrastructure needs.
//!
//! A descriptor is produced by an external form or editor and arrives as JSON
//! or YAML. Mandatory fields are modelled leniently here (`name` defaults to an
//! empty string, `region` is optional) so that a missing value surfaces as a
//! validation error with a field path instead of a parse error.

use serde::{Deserialize, Serialize};

/// The root descriptor structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Descriptor {
    /// Application name, used as a resource-name prefix.
    #[serde(default)]
    pub name: String,
    /// Shorthand for `environment.region`, used when the latter is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Target environment attributes.
    #[serde(default)]
    pub environment: EnvironmentConfig,
    /// Requested services.
    #[serde(default)]
    pub services: ServicesConfig,
}

/// Target environment attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Where the application runs.
    #[serde(default)]
    pub target: ExecutionTarget,
    /// Cloud region identifier (e.g. `eu-west-1`).
    #[serde(default)]
    pub region: Option<String>,
    /// Deployment stage carried into resource tags.
    #[serde(default = "default_stage")]
    pub stage: String,
}

/// Execution target options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionTarget {
    /// Managed container service.
    #[default]
    Container,
    /// Kubernetes cluster.
    Kubernetes,
    /// Functions-as-a-service.
    Serverless,
    /// Plain virtual machines.
    #[serde(alias = "virtual_machine")]
    Vm,
}

/// Requested services, keyed by a fixed vocabulary.
///
/// Keys outside the vocabulary are ignored on deserialization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ServicesConfig {
    /// Relational data store.
    #[serde(default, alias = "data_store")]
    pub database: bool,
    /// In-memory cache.
    #[serde(default)]
    pub cache: bool,
    /// Message queue.
    #[serde(default, alias = "message_queue")]
    pub queue: bool,
    /// Object storage bucket.
    #[serde(default, alias = "object_storage")]
    pub storage: bool,
    /// AI/ML workspace.
    #[serde(default, alias = "ai_ml")]
    pub ai: bool,
}

/// Service kinds in rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// Relational data store.
    Database,
    /// In-memory cache.
    Cache,
    /// Message queue.
    Queue,
    /// Object storage bucket.
    Storage,
    /// AI/ML workspace.
    Ai,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn default_stage() -> String {
    String::from("dev")
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            target: ExecutionTarget::default(),
            region: None,
            stage: default_stage(),
        }
    }
}

impl Descriptor {
    /// Creates a descriptor with no services.
    #[must_use]
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: None,
            environment: EnvironmentConfig {
                region: Some(region.into()),
                ..EnvironmentConfig::default()
            },
            services: ServicesConfig::default(),
        }
    }

    /// Enables a service.
    #[must_use]
    pub fn with_service(mut self, kind: ServiceKind) -> Self {
        self.services.enable(kind);
        self
    }

    /// Returns the region, if set and non-blank.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        non_blank(self.environment.region.as_deref())
            .or_else(|| non_blank(self.region.as_deref()))
    }
}

impl ServicesConfig {
    /// Returns whether a service is requested.
    #[must_use]
    pub const fn is_enabled(&self, kind: ServiceKind) -> bool {
        match kind {
            ServiceKind::Database => self.database,
            ServiceKind::Cache => self.cache,
            ServiceKind::Queue => self.queue,
            ServiceKind::Storage => self.storage,
            ServiceKind::Ai => self.ai,
        }
    }

    /// Marks a service as requested.
    pub fn enable(&mut self, kind: ServiceKind) {
        match kind {
            ServiceKind::Database => self.database = true,
            ServiceKind::Cache => self.cache = true,
            ServiceKind::Queue => self.queue = true,
            ServiceKind::Storage => self.storage = true,
            ServiceKind::Ai => self.ai = true,
        }
    }

    /// Returns requested services in rendering order.
    #[must_use]
    pub fn enabled(&self) -> Vec<ServiceKind> {
        ServiceKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }
}

impl ServiceKind {
    /// All service kinds in rendering order.
    pub const ALL: [Self; 5] = [
        Self::Database,
        Self::Cache,
        Self::Queue,
        Self::Storage,
        Self::Ai,
    ];

    /// Returns the descriptor key for this service.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Cache => "cache",
            Self::Queue => "queue",
            Self::Storage => "storage",
            Self::Ai => "ai",
        }
    }
}

impl std::fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match self {
            Self::Container => "container",
            Self::Kubernetes => "kubernetes",
            Self::Serverless => "serverless",
            Self::Vm => "vm",
        };
        write!(f, "{target}")
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}
