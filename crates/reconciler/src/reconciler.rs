//! Reconciler implementation.

use std::sync::Arc;

use dgraph_core::CharmConfig;
use dgraph_pebble::{Layer, Plan, Supervisor};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::layer::{LAYER_LABEL, RESTART_ORDER, build_layer};
use crate::types::{PlanChange, ReconcileAction, ReconcileOutcome, UnitStatus};

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Label the layer is added under.
    pub layer_label: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            layer_label: LAYER_LABEL.to_string(),
        }
    }
}

/// Brings the workload's plan in line with the charm configuration.
pub struct Reconciler {
    /// Workload supervisor.
    supervisor: Arc<dyn Supervisor>,
    /// Configuration.
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(supervisor: Arc<dyn Supervisor>, config: ReconcilerConfig) -> Self {
        Self { supervisor, config }
    }

    /// Core reconciliation: compare the plan with the desired layer and
    /// apply the difference.
    ///
    /// An unreachable supervisor is not an error; the outcome reports
    /// waiting and nothing else is attempted.
    ///
    /// # Errors
    ///
    /// Returns an error if a supervisor call fails after the supervisor
    /// answered the reachability check.
    pub async fn reconcile(&self, charm: &CharmConfig) -> Result<ReconcileOutcome> {
        if !self.supervisor.can_connect().await {
            info!("Supervisor not reachable yet");
            return Ok(ReconcileOutcome::waiting_for_pebble());
        }

        let layer = self.desired_layer(charm);
        let plan = self.supervisor.get_plan().await?;

        let changes = self.diff(&plan, &layer);
        debug!(changes = changes.len(), "Generated plan changes");

        let taken = self.apply_changes(changes, &layer).await?;
        let outcome = ReconcileOutcome::new(UnitStatus::Active, taken);

        if outcome.converged {
            info!("Plan already up to date");
        } else {
            info!(
                actions_taken = outcome.actions_taken.len(),
                "Reconciliation complete"
            );
        }

        Ok(outcome)
    }

    /// Layer the workload should run for this configuration.
    #[must_use]
    pub fn desired_layer(&self, charm: &CharmConfig) -> Layer {
        build_layer(&charm.whitelist)
    }

    /// Compute the changes that turn `plan` into `layer`.
    ///
    /// Any difference restarts both services.
    #[must_use]
    pub fn diff(&self, plan: &Plan, layer: &Layer) -> Vec<PlanChange> {
        if plan.services_match(layer) {
            return Vec::new();
        }

        std::iter::once(PlanChange::ApplyLayer {
            label: self.config.layer_label.clone(),
        })
        .chain(RESTART_ORDER.iter().map(|service| PlanChange::Restart {
            service: (*service).to_string(),
        }))
        .collect()
    }

    /// Apply changes in order, stopping at the first failure.
    async fn apply_changes(
        &self,
        changes: Vec<PlanChange>,
        layer: &Layer,
    ) -> Result<Vec<ReconcileAction>> {
        let mut taken = Vec::with_capacity(changes.len());

        for change in changes {
            debug!(change = ?change, "Applying plan change");

            match &change {
                PlanChange::ApplyLayer { label } => {
                    self.supervisor.add_layer(label, layer, true).await?;
                    info!(label = %label, "Layer added");
                }
                PlanChange::Restart { service } => {
                    info!(service = %service, "Restarting service");
                    self.supervisor.restart(service).await?;
                }
            }

            taken.push(ReconcileAction::from(change));
        }

        if !taken.is_empty() {
            self.log_services().await;
        }

        Ok(taken)
    }

    /// Log whether the restarted services came up.
    async fn log_services(&self) {
        match self.supervisor.services(&RESTART_ORDER).await {
            Ok(services) => {
                for service in services {
                    if service.is_running() {
                        debug!(service = %service.name, "Service running");
                    } else {
                        warn!(service = %service.name, current = ?service.current, "Service not running after restart");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Could not query service state"),
        }
    }

    /// Get the supervisor.
    pub fn supervisor(&self) -> &Arc<dyn Supervisor> {
        &self.supervisor
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    supervisor: Option<Arc<dyn Supervisor>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            supervisor: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the workload supervisor.
    pub fn with_supervisor(mut self, supervisor: Arc<dyn Supervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Set the layer label.
    pub fn layer_label(mut self, label: impl Into<String>) -> Self {
        self.config.layer_label = label.into();
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns an error if no supervisor was set or the label is empty.
    pub fn build(self) -> Result<Reconciler> {
        let supervisor = self
            .supervisor
            .ok_or_else(|| Error::invalid_config("supervisor is required"))?;

        if self.config.layer_label.trim().is_empty() {
            return Err(Error::invalid_config("layer label must not be empty"));
        }

        Ok(Reconciler::new(supervisor, self.config))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
