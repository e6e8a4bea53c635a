//! In-memory supervisor for tests and dry runs.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use itertools::Itertools;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::supervisor::Supervisor;
use crate::types::{ExecOutput, Layer, Plan, ServiceInfo, ServiceStatus};

/// A call made against the supervisor, recorded in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorCall {
    GetPlan,
    AddLayer { label: String, combine: bool },
    Restart { service: String },
    Services,
    Exec { command: Vec<String> },
}

impl SupervisorCall {
    /// Whether the call changes supervisor state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::AddLayer { .. } | Self::Restart { .. } | Self::Exec { .. }
        )
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    reachable: bool,
    layers: BTreeMap<String, Layer>,
    plan: Plan,
    running: BTreeSet<String>,
    calls: Vec<SupervisorCall>,
    exec_failures: VecDeque<String>,
}

/// Supervisor that keeps its plan in memory and records every call.
#[derive(Debug, Clone)]
pub struct InMemorySupervisor {
    state: Arc<RwLock<MemoryState>>,
}

impl Default for InMemorySupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySupervisor {
    /// Create a reachable supervisor with an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState {
                reachable: true,
                ..MemoryState::default()
            })),
        }
    }

    /// Create a supervisor that refuses every connection.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
        }
    }

    /// Toggle reachability.
    pub async fn set_reachable(&self, reachable: bool) {
        self.state.write().await.reachable = reachable;
    }

    /// Make the next `count` exec calls fail with `reason`.
    pub async fn fail_next_execs(&self, count: usize, reason: &str) {
        let mut state = self.state.write().await;
        state
            .exec_failures
            .extend(std::iter::repeat_n(reason.to_string(), count));
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<SupervisorCall> {
        self.state.read().await.calls.clone()
    }

    /// Forget recorded calls.
    pub async fn clear_calls(&self) {
        self.state.write().await.calls.clear();
    }

    /// Services restarted so far, in order.
    pub async fn restarts(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                SupervisorCall::Restart { service } => Some(service.clone()),
                _ => None,
            })
            .collect_vec()
    }

    /// Calls that changed supervisor state.
    pub async fn mutations(&self) -> Vec<SupervisorCall> {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .cloned()
            .collect_vec()
    }

    /// Current merged plan.
    pub async fn plan(&self) -> Plan {
        self.state.read().await.plan.clone()
    }

    /// Whether a service is running.
    pub async fn is_running(&self, service: &str) -> bool {
        self.state.read().await.running.contains(service)
    }

    async fn record(&self, call: SupervisorCall) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.reachable {
            return Err(Error::connection_failed("supervisor unreachable"));
        }
        state.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl Supervisor for InMemorySupervisor {
    async fn can_connect(&self) -> bool {
        self.state.read().await.reachable
    }

    async fn get_plan(&self) -> Result<Plan> {
        self.record(SupervisorCall::GetPlan).await?;
        Ok(self.plan().await)
    }

    async fn add_layer(&self, label: &str, layer: &Layer, combine: bool) -> Result<()> {
        self.record(SupervisorCall::AddLayer {
            label: label.to_string(),
            combine,
        })
        .await?;

        let mut state = self.state.write().await;
        if state.layers.contains_key(label) && !combine {
            return Err(Error::api(400, format!("layer \"{label}\" already exists")));
        }
        state.layers.insert(label.to_string(), layer.clone());
        state.plan.combine(layer);
        Ok(())
    }

    async fn restart(&self, service: &str) -> Result<()> {
        self.record(SupervisorCall::Restart {
            service: service.to_string(),
        })
        .await?;

        let mut state = self.state.write().await;
        if !state.plan.services.contains_key(service) {
            return Err(Error::ServiceNotFound {
                name: service.to_string(),
            });
        }
        state.running.insert(service.to_string());
        Ok(())
    }

    async fn services(&self, names: &[&str]) -> Result<Vec<ServiceInfo>> {
        self.record(SupervisorCall::Services).await?;

        let state = self.state.read().await;
        Ok(state
            .plan
            .services
            .iter()
            .filter(|(name, _)| names.is_empty() || names.contains(&name.as_str()))
            .map(|(name, spec)| ServiceInfo {
                name: name.clone(),
                startup: spec.startup,
                current: if state.running.contains(name) {
                    ServiceStatus::Active
                } else {
                    ServiceStatus::Inactive
                },
            })
            .collect_vec())
    }

    async fn exec(&self, command: &[String], _timeout: Duration) -> Result<ExecOutput> {
        self.record(SupervisorCall::Exec {
            command: command.to_vec(),
        })
        .await?;

        let mut state = self.state.write().await;
        match state.exec_failures.pop_front() {
            Some(reason) => Err(Error::exec_failed(command.iter().join(" "), reason)),
            None => Ok(ExecOutput::default()),
        }
    }
}
