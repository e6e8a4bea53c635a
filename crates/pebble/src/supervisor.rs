//! Container supervisor trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ExecOutput, Layer, Plan, ServiceInfo};

/// Operations the operator needs from the workload's process supervisor.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Whether the supervisor API answers at all.
    async fn can_connect(&self) -> bool;

    /// Fetch the current merged plan.
    async fn get_plan(&self) -> Result<Plan>;

    /// Add a layer under `label`; with `combine` an existing layer of the same
    /// label is merged instead of rejected.
    async fn add_layer(&self, label: &str, layer: &Layer, combine: bool) -> Result<()>;

    /// Restart a service, starting it if it is not running.
    async fn restart(&self, service: &str) -> Result<()>;

    /// Report the runtime state of the named services.
    async fn services(&self, names: &[&str]) -> Result<Vec<ServiceInfo>>;

    /// Run a one-shot command in the workload and wait for it to finish.
    async fn exec(&self, command: &[String], timeout: Duration) -> Result<ExecOutput>;
}
