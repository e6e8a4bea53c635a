//! Event handling for the Dgraph charm.
//!
//! `DgraphCharm` turns one lifecycle event into calls on the reconciler,
//! the bootstrap and the exporter, then publishes the resulting status.
//! Handler failures never reach Juju: they become a unit status.

use std::sync::Arc;

use dgraph_core::OperatorConfig;
use dgraph_pebble::PebbleClient;
use dgraph_reconciler::{
    Bootstrap, BootstrapConfig, Exporter, HttpReadinessProbe, ReconcileOutcome, Reconciler,
    ReconcilerBuilder, UnitStatus,
};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::event::LifecycleEvent;
use crate::hook_tools::{HookStatusReporter, HookTools};

/// Name of the export action.
pub const EXPORT_ACTION: &str = "export";

/// Dispatches lifecycle events.
pub struct DgraphCharm {
    tools: Arc<dyn HookTools>,
    reconciler: Arc<Reconciler>,
    bootstrap: Bootstrap,
    exporter: Exporter,
    container: String,
}

impl DgraphCharm {
    /// Assemble a charm from its parts.
    pub fn new(
        tools: Arc<dyn HookTools>,
        reconciler: Arc<Reconciler>,
        bootstrap: Bootstrap,
        exporter: Exporter,
        container: impl Into<String>,
    ) -> Self {
        Self {
            tools,
            reconciler,
            bootstrap,
            exporter,
            container: container.into(),
        }
    }

    /// Wire the real Pebble client and HTTP endpoints from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: &OperatorConfig, tools: Arc<dyn HookTools>) -> Result<Self> {
        let supervisor = Arc::new(PebbleClient::new(&config.pebble_socket, &config.pebble_binary));
        let reconciler = Arc::new(ReconcilerBuilder::new().with_supervisor(supervisor).build()?);

        let probe = HttpReadinessProbe::new(&config.readiness_url, config.request_timeout())?;

        // Downloads can take far longer than a single API call.
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(|e| dgraph_reconciler::Error::invalid_config(format!("http client: {e}")))?;
        let api = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| dgraph_reconciler::Error::invalid_config(format!("http client: {e}")))?;

        let bootstrap = Bootstrap::new(
            reconciler.clone(),
            Arc::new(probe),
            Arc::new(HookStatusReporter::new(tools.clone())),
            http,
            BootstrapConfig::from_config(config),
        );
        let exporter = Exporter::new(api, &config.admin_url);

        Ok(Self::new(tools, reconciler, bootstrap, exporter, &config.container))
    }

    /// Handle one event and publish the final status.
    ///
    /// Returns the status that was set, or `None` when the event leaves the
    /// status alone.
    pub async fn handle(&self, event: &LifecycleEvent) -> Option<UnitStatus> {
        info!(event = %event, "Handling event");

        let result = match event {
            LifecycleEvent::Install => self.on_install().await,
            LifecycleEvent::ConfigChanged => self.on_config_changed().await,
            LifecycleEvent::PebbleReady { container } if *container == self.container => {
                self.on_config_changed().await
            }
            LifecycleEvent::Action { name } => {
                self.on_action(name).await;
                return None;
            }
            LifecycleEvent::PebbleReady { .. } | LifecycleEvent::Other(_) => {
                debug!(event = %event, "Ignoring event");
                return None;
            }
        };

        let status = match result {
            Ok(outcome) => {
                debug!(actions = outcome.actions_taken.len(), converged = outcome.converged, "Handler finished");
                outcome.status
            }
            Err(e) if e.is_unavailable() => {
                warn!(error = %e, "Workload supervisor unavailable");
                UnitStatus::waiting_for_pebble()
            }
            Err(e) => {
                error!(error = %e, "Handler failed");
                UnitStatus::blocked(e.to_string())
            }
        };

        if let Err(e) = self.tools.status_set(&status).await {
            error!(error = %e, status = %status, "Failed to publish status");
        }
        Some(status)
    }

    async fn on_install(&self) -> Result<ReconcileOutcome> {
        let charm = self.tools.config_get().await?;
        Ok(self.bootstrap.run(&charm).await?)
    }

    async fn on_config_changed(&self) -> Result<ReconcileOutcome> {
        let charm = self.tools.config_get().await?;
        let outcome = self.reconciler.reconcile(&charm).await?;
        if !outcome.status.is_active() {
            return Ok(outcome);
        }

        match self.bootstrap.resume().await? {
            Some(imported) => Ok(imported.after(outcome.actions_taken)),
            None => Ok(outcome),
        }
    }

    async fn on_action(&self, name: &str) {
        let reported = if name == EXPORT_ACTION {
            match self.exporter.export().await {
                Ok(result) => self.tools.action_set("result", result).await,
                Err(e) => {
                    warn!(error = %e, "Export failed");
                    self.tools.action_fail(&e.to_string()).await
                }
            }
        } else {
            warn!(action = name, "Unknown action");
            self.tools.action_fail(&format!("unknown action '{name}'")).await
        };

        if let Err(e) = reported {
            error!(action = name, error = %e, "Failed to report action result");
        }
    }
}
