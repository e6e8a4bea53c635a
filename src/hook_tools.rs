//! Juju hook tools.
//!
//! The operator reads its configuration and reports status by running the
//! executables Juju puts on `PATH` during a hook.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use dgraph_core::CharmConfig;
use dgraph_reconciler::{StatusReporter, UnitStatus};
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// The hook tools the operator uses.
#[async_trait]
pub trait HookTools: Send + Sync {
    /// `config-get --format=json`
    async fn config_get(&self) -> Result<CharmConfig>;

    /// `status-set <status> [message]`
    async fn status_set(&self, status: &UnitStatus) -> Result<()>;

    /// `action-set <key>=<value>`
    async fn action_set(&self, key: &str, value: &str) -> Result<()>;

    /// `action-fail <message>`
    async fn action_fail(&self, message: &str) -> Result<()>;
}

/// Hook tools run as child processes.
#[derive(Debug, Clone, Default)]
pub struct JujuHookTools {
    tools_dir: Option<PathBuf>,
}

impl JujuHookTools {
    /// Resolve tools through `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve tools inside `dir` instead of `PATH`.
    pub fn with_tools_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: Some(dir.into()),
        }
    }

    fn program(&self, tool: &str) -> PathBuf {
        self.tools_dir
            .as_deref()
            .map_or_else(|| PathBuf::from(tool), |dir| dir.join(tool))
    }

    async fn run(&self, tool: &str, args: &[&str]) -> Result<String> {
        debug!(tool, args = ?args, "Running hook tool");

        let output = Command::new(self.program(tool))
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::hook_tool_failed(tool, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::hook_tool_failed(
                tool,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl HookTools for JujuHookTools {
    async fn config_get(&self) -> Result<CharmConfig> {
        let raw = self.run("config-get", &["--format=json"]).await?;
        Ok(CharmConfig::from_json(&raw)?)
    }

    async fn status_set(&self, status: &UnitStatus) -> Result<()> {
        let message = status.message();
        if message.is_empty() {
            self.run("status-set", &[status.name()]).await?;
        } else {
            self.run("status-set", &[status.name(), message]).await?;
        }
        Ok(())
    }

    async fn action_set(&self, key: &str, value: &str) -> Result<()> {
        let assignment = format!("{key}={value}");
        self.run("action-set", &[assignment.as_str()]).await?;
        Ok(())
    }

    async fn action_fail(&self, message: &str) -> Result<()> {
        self.run("action-fail", &[message]).await?;
        Ok(())
    }
}

/// Publishes intermediate statuses through `status-set`.
#[derive(Clone)]
pub struct HookStatusReporter {
    tools: Arc<dyn HookTools>,
}

impl HookStatusReporter {
    /// Wrap a set of hook tools.
    pub fn new(tools: Arc<dyn HookTools>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl StatusReporter for HookStatusReporter {
    async fn report(&self, status: &UnitStatus) -> dgraph_reconciler::Result<()> {
        self.tools
            .status_set(status)
            .await
            .map_err(|e| dgraph_reconciler::Error::status_failed(e.to_string()))
    }
}
