//! Core types for the reconciler.

use std::fmt;
use std::path::PathBuf;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Reported while the workload's Pebble API is not answering.
pub const WAITING_FOR_PEBBLE: &str = "waiting for Pebble in workload container";
/// Reported while the database is polled for readiness.
pub const WAITING_FOR_DB: &str = "waiting for db initialization";
/// Reported while demo data is downloaded.
pub const FETCHING_DATA: &str = "Fetching data";

/// Status of the unit as shown to operators.
///
/// Each handler pass ends in exactly one of these; the latest value wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "lowercase")]
pub enum UnitStatus {
    /// Work in progress that needs no operator action.
    Maintenance(String),
    /// Waiting on something outside the unit.
    Waiting(String),
    /// Everything is running.
    Active,
    /// Retries ran out; an operator has to look.
    Blocked(String),
}

impl UnitStatus {
    /// Create a maintenance status.
    pub fn maintenance(message: impl Into<String>) -> Self {
        Self::Maintenance(message.into())
    }

    /// Create a waiting status.
    pub fn waiting(message: impl Into<String>) -> Self {
        Self::Waiting(message.into())
    }

    /// Create a blocked status.
    pub fn blocked(message: impl Into<String>) -> Self {
        Self::Blocked(message.into())
    }

    /// Waiting for the workload supervisor.
    #[must_use]
    pub fn waiting_for_pebble() -> Self {
        Self::waiting(WAITING_FOR_PEBBLE)
    }

    /// Waiting for the database to answer its readiness endpoint.
    #[must_use]
    pub fn waiting_for_db() -> Self {
        Self::waiting(WAITING_FOR_DB)
    }

    /// Downloading demo data.
    #[must_use]
    pub fn fetching_data() -> Self {
        Self::maintenance(FETCHING_DATA)
    }

    /// Status name as understood by `status-set`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Maintenance(_) => "maintenance",
            Self::Waiting(_) => "waiting",
            Self::Active => "active",
            Self::Blocked(_) => "blocked",
        }
    }

    /// Human-readable message; empty for `Active`.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Maintenance(message) | Self::Waiting(message) | Self::Blocked(message) => {
                message
            }
            Self::Active => "",
        }
    }

    /// Whether the status is `Active`.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            other => write!(f, "{}: {}", other.name(), other.message()),
        }
    }
}

/// Actions the reconciler can take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileAction {
    /// Add the layer to the supervisor plan.
    ApplyLayer { label: String },
    /// Restart (or first start) a service.
    Restart { service: String },
    /// Download a document into the import directory.
    FetchFile { url: String, path: PathBuf },
    /// Run the one-shot data import.
    Import { command: Vec<String> },
}

impl ReconcileAction {
    /// Get a description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::ApplyLayer { label } => format!("apply layer {label}"),
            Self::Restart { service } => format!("restart {service}"),
            Self::FetchFile { url, path } => format!("fetch {url} to {}", path.display()),
            Self::Import { command } => format!("import with '{}'", command.iter().join(" ")),
        }
    }
}

/// Changes the reconciler makes to the supervisor plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanChange {
    /// Add the layer to the supervisor plan.
    ApplyLayer { label: String },
    /// Restart (or first start) a service.
    Restart { service: String },
}

impl From<PlanChange> for ReconcileAction {
    fn from(change: PlanChange) -> Self {
        match change {
            PlanChange::ApplyLayer { label } => Self::ApplyLayer { label },
            PlanChange::Restart { service } => Self::Restart { service },
        }
    }
}

/// Result of one handler pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// Status the unit should report.
    pub status: UnitStatus,
    /// Actions that were taken, in order.
    pub actions_taken: Vec<ReconcileAction>,
    /// Whether nothing had to change.
    pub converged: bool,
}

impl ReconcileOutcome {
    /// Create a new outcome.
    #[must_use]
    pub fn new(status: UnitStatus, actions_taken: Vec<ReconcileAction>) -> Self {
        let converged = actions_taken.is_empty();
        Self {
            status,
            actions_taken,
            converged,
        }
    }

    /// Outcome for a pass that could not reach the supervisor.
    #[must_use]
    pub fn waiting_for_pebble() -> Self {
        Self::new(UnitStatus::waiting_for_pebble(), Vec::new())
    }

    /// Prepend actions from an earlier step of the same pass.
    #[must_use]
    pub fn after(mut self, mut earlier: Vec<ReconcileAction>) -> Self {
        earlier.append(&mut self.actions_taken);
        Self::new(self.status, earlier)
    }

    /// Count restarts of a given service.
    #[must_use]
    pub fn restarts_of(&self, service: &str) -> usize {
        self.actions_taken
            .iter()
            .filter(|a| matches!(a, ReconcileAction::Restart { service: s } if s == service))
            .count()
    }
}
