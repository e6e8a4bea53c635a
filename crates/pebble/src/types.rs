//! Layer and plan data model.
//!
//! These mirror the YAML documents Pebble accepts and reports. Service maps
//! are `BTreeMap`s so the same layer always serializes to the same bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a layer's service definition combines with earlier layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Override {
    /// Replace the whole service definition.
    #[default]
    Replace,
    /// Merge fields into the existing definition.
    Merge,
}

/// Whether a service is started automatically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Startup {
    #[default]
    Enabled,
    Disabled,
}

/// A single long-running process in a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(rename = "override")]
    pub policy: Override,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    pub command: String,
    #[serde(default)]
    pub startup: Startup,
}

impl ServiceSpec {
    /// Create a replacing, auto-started service.
    pub fn new(summary: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            policy: Override::Replace,
            summary: summary.into(),
            command: command.into(),
            startup: Startup::Enabled,
        }
    }
}

/// Declarative description of named processes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceSpec>,
}

impl Layer {
    /// Create an empty layer with a summary and description.
    pub fn new(summary: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            description: description.into(),
            services: BTreeMap::new(),
        }
    }

    /// Add a service, replacing any previous definition with the same name.
    #[must_use]
    pub fn with_service(mut self, name: impl Into<String>, spec: ServiceSpec) -> Self {
        self.services.insert(name.into(), spec);
        self
    }

    /// Look up a service by name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.get(name)
    }

    /// Render the layer as Pebble YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse a layer from YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is not a valid layer.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }
}

/// The supervisor's merged view of every applied layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub services: BTreeMap<String, ServiceSpec>,
}

impl Plan {
    /// Parse the plan reported by `GET /v1/plan?format=yaml`.
    ///
    /// An empty document is an empty plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "{}" {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Whether the plan already runs exactly the services a layer declares.
    #[must_use]
    pub fn services_match(&self, layer: &Layer) -> bool {
        self.services == layer.services
    }

    /// Merge a layer into the plan the way `combine = true` does for
    /// `override: replace` services.
    pub fn combine(&mut self, layer: &Layer) {
        for (name, spec) in &layer.services {
            match spec.policy {
                Override::Replace => {
                    self.services.insert(name.clone(), spec.clone());
                }
                Override::Merge => {
                    let entry = self
                        .services
                        .entry(name.clone())
                        .or_insert_with(|| spec.clone());
                    if !spec.summary.is_empty() {
                        entry.summary.clone_from(&spec.summary);
                    }
                    if !spec.command.is_empty() {
                        entry.command.clone_from(&spec.command);
                    }
                    entry.startup = spec.startup;
                }
            }
        }
    }
}

/// Runtime state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Inactive,
    Backoff,
    Error,
    #[serde(other)]
    Unknown,
}

/// A service as reported by `GET /v1/services`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    #[serde(default)]
    pub startup: Startup,
    pub current: ServiceStatus,
}

impl ServiceInfo {
    /// Whether the service is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.current == ServiceStatus::Active
    }
}

/// Captured output of a one-shot command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}
