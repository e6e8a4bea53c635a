//! Reconciliation for the Dgraph workload.
//!
//! Every event handler follows the same pattern:
//!
//! - **Desired state**: the layer built from the charm configuration
//! - **Actual state**: the plan reported by the workload supervisor
//! - **Diff**: compare the two service maps
//! - **Actions**: add the layer and restart services until they match
//!
//! # Key Concepts
//!
//! ## Outcomes
//!
//! Handlers never set the unit status themselves. They return a
//! [`ReconcileOutcome`] carrying the final [`UnitStatus`] and the actions
//! taken; intermediate statuses go through a [`StatusReporter`].
//!
//! ## Bounded retries
//!
//! Readiness polling, downloads and the data import share one
//! [`RetryPolicy`]. When it runs out the outcome is `Blocked`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dgraph_core::CharmConfig;
//! use dgraph_pebble::InMemorySupervisor;
//! use dgraph_reconciler::ReconcilerBuilder;
//!
//! let reconciler = ReconcilerBuilder::new()
//!     .with_supervisor(Arc::new(InMemorySupervisor::new()))
//!     .build()?;
//! let outcome = reconciler
//!     .reconcile(&CharmConfig::with_whitelist("10.0.0.0/8"))
//!     .await?;
//! assert!(outcome.status.is_active());
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod bootstrap;
pub mod error;
pub mod export;
pub mod layer;
pub mod readiness;
pub mod reconciler;
pub mod status;
pub mod types;

// Re-export main types
pub use bootstrap::{Bootstrap, BootstrapConfig, BootstrapState};
pub use error::{Error, Result};
pub use export::Exporter;
pub use layer::{CommandLine, build_layer};
pub use readiness::{
    HttpReadinessProbe, ProbeResult, Readiness, ReadinessProbe, Retried, RetryPolicy, RetryState,
    RetryStep, retry, wait_until_ready,
};
pub use reconciler::{Reconciler, ReconcilerBuilder, ReconcilerConfig};
pub use status::{RecordingStatusReporter, StatusReporter};
pub use types::{PlanChange, ReconcileAction, ReconcileOutcome, UnitStatus};
