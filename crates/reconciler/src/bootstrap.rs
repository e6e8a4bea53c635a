//! Demo data bootstrap run at install.
//!
//! Install downloads a schema and an RDF data set into the import directory,
//! applies the layer, waits for the database and runs `dgraph live` inside
//! the workload. Progress is persisted in [`BootstrapState`] so that a
//! bootstrap which could not finish at install (documents unreachable,
//! supervisor not up yet) is picked up by a later event.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dgraph_core::{CharmConfig, OperatorConfig};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::readiness::{ReadinessProbe, Readiness, Retried, RetryPolicy, retry, wait_until_ready};
use crate::reconciler::Reconciler;
use crate::status::StatusReporter;
use crate::types::{ReconcileAction, ReconcileOutcome, UnitStatus};

/// Schema document name inside the import directory.
pub const SCHEMA_FILE: &str = "1million.schema";
/// Data document name inside the import directory.
pub const DATA_FILE: &str = "1million.rdf.gz";
/// Progress file name inside the import directory.
pub const STATE_FILE: &str = "bootstrap-state.json";

/// Persisted bootstrap progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapState {
    /// Install began the bootstrap.
    #[serde(default)]
    pub started: bool,
    /// Both documents are in the import directory.
    pub fetched: bool,
    /// The live import finished.
    pub imported: bool,
    /// When the import finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_at: Option<DateTime<Utc>>,
}

impl BootstrapState {
    /// Load the state from `dir`; a missing file is a fresh state.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(STATE_FILE);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(dgraph_core::Error::file_read_failed(&path, e.to_string()).into()),
        };
        serde_json::from_slice(&raw)
            .map_err(|e| dgraph_core::Error::json_parse_failed(format!("{}: {e}", path.display())).into())
    }

    /// Write the state into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(STATE_FILE);
        let raw = serde_json::to_vec_pretty(self)
            .map_err(|e| dgraph_core::Error::json_parse_failed(e.to_string()))?;
        tokio::fs::write(&path, raw)
            .await
            .map_err(|e| dgraph_core::Error::file_write_failed(&path, e.to_string()))?;
        Ok(())
    }

    /// Install began the bootstrap but the import has not finished.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        (self.started || self.fetched) && !self.imported
    }
}

/// Where demo data comes from and how hard to try.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub schema_url: String,
    pub data_url: String,
    pub import_dir: PathBuf,
    pub retry: RetryPolicy,
    pub exec_timeout: Duration,
}

impl BootstrapConfig {
    /// Settings taken from the operator configuration.
    #[must_use]
    pub fn from_config(config: &OperatorConfig) -> Self {
        Self {
            schema_url: config.schema_url.clone(),
            data_url: config.data_url.clone(),
            import_dir: config.import_dir.clone(),
            retry: RetryPolicy::from_config(config),
            exec_timeout: config.exec_timeout(),
        }
    }

    /// Local path of the schema document.
    #[must_use]
    pub fn schema_path(&self) -> PathBuf {
        self.import_dir.join(SCHEMA_FILE)
    }

    /// Local path of the data document.
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.import_dir.join(DATA_FILE)
    }

    /// The live import run inside the workload.
    #[must_use]
    pub fn import_command(&self) -> Vec<String> {
        vec![
            "dgraph".to_string(),
            "live".to_string(),
            "--files".to_string(),
            self.data_path().display().to_string(),
            "--schema".to_string(),
            self.schema_path().display().to_string(),
            "--alpha".to_string(),
            "localhost:9080".to_string(),
            "--zero".to_string(),
            "localhost:5080".to_string(),
        ]
    }
}

/// Runs the install-time data bootstrap.
pub struct Bootstrap {
    reconciler: Arc<Reconciler>,
    probe: Arc<dyn ReadinessProbe>,
    reporter: Arc<dyn StatusReporter>,
    http: reqwest::Client,
    config: BootstrapConfig,
}

impl Bootstrap {
    /// Create a bootstrap runner.
    pub fn new(
        reconciler: Arc<Reconciler>,
        probe: Arc<dyn ReadinessProbe>,
        reporter: Arc<dyn StatusReporter>,
        http: reqwest::Client,
        config: BootstrapConfig,
    ) -> Self {
        Self {
            reconciler,
            probe,
            reporter,
            http,
            config,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Full install sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the import directory or progress file cannot be
    /// written, or a supervisor call fails. Exhausted retries are reported
    /// as a blocked outcome rather than an error.
    pub async fn run(&self, charm: &CharmConfig) -> Result<ReconcileOutcome> {
        let dir = &self.config.import_dir;
        let mut state = BootstrapState::load_or_create(dir).await?;

        if !state.started {
            state.started = true;
            state.save(dir).await?;
        }

        let Some(fetched) = self.ensure_fetched(&mut state).await? else {
            return Ok(Self::fetch_blocked());
        };

        let outcome = self.reconciler.reconcile(charm).await?.after(fetched);
        if !outcome.status.is_active() {
            info!(status = %outcome.status, "Import deferred until the workload is reachable");
            return Ok(outcome);
        }
        if state.imported {
            debug!("Demo data already imported");
            return Ok(outcome);
        }

        let imported = self.import(state).await?;
        Ok(imported.after(outcome.actions_taken))
    }

    /// Finish a bootstrap left pending by an earlier install, fetching the
    /// documents first if that is what failed.
    ///
    /// Returns `None` when nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the progress file cannot be read or written.
    pub async fn resume(&self) -> Result<Option<ReconcileOutcome>> {
        let mut state = BootstrapState::load(&self.config.import_dir).await?;
        if !state.is_pending() {
            return Ok(None);
        }
        info!(fetched = state.fetched, "Resuming pending bootstrap");

        let Some(fetched) = self.ensure_fetched(&mut state).await? else {
            return Ok(Some(Self::fetch_blocked()));
        };

        let imported = self.import(state).await?;
        Ok(Some(imported.after(fetched)))
    }

    /// Download the documents unless an earlier pass already did.
    ///
    /// Returns `None` when the downloads ran out of retries.
    async fn ensure_fetched(
        &self,
        state: &mut BootstrapState,
    ) -> Result<Option<Vec<ReconcileAction>>> {
        if state.fetched {
            return Ok(Some(Vec::new()));
        }

        self.announce(&UnitStatus::fetching_data()).await;

        let actions = match self.fetch_all().await {
            Ok(actions) => actions,
            Err(e) => {
                warn!(error = %e, "Demo data unavailable");
                return Ok(None);
            }
        };

        state.fetched = true;
        state.save(&self.config.import_dir).await?;
        self.announce(&UnitStatus::Active).await;
        Ok(Some(actions))
    }

    fn fetch_blocked() -> ReconcileOutcome {
        ReconcileOutcome::new(UnitStatus::blocked("failed to fetch demo data"), Vec::new())
    }

    /// Publish an intermediate status; failing to do so does not stop the
    /// bootstrap.
    async fn announce(&self, status: &UnitStatus) {
        if let Err(e) = self.reporter.report(status).await {
            warn!(error = %e, status = %status, "Failed to publish intermediate status");
        }
    }

    /// Wait for the database, then run the import.
    async fn import(&self, mut state: BootstrapState) -> Result<ReconcileOutcome> {
        self.announce(&UnitStatus::waiting_for_db()).await;

        if let Readiness::Exhausted { attempts } =
            wait_until_ready(self.probe.as_ref(), self.config.retry).await
        {
            return Ok(ReconcileOutcome::new(
                UnitStatus::blocked(format!(
                    "database did not become ready after {attempts} checks"
                )),
                Vec::new(),
            ));
        }

        let command = self.config.import_command();
        let supervisor = self.reconciler.supervisor();
        let timeout = self.config.exec_timeout;

        let retried = retry("data import", self.config.retry, || {
            let command = &command;
            async move {
                info!(command = ?command, "Running data import");
                supervisor.exec(command, timeout).await.map_err(Error::from)
            }
        })
        .await;

        match retried {
            Retried::Succeeded { value, attempts } => {
                debug!(attempts, stdout = %value.stdout, "Data import finished");
            }
            Retried::Exhausted { attempts, last_error } => {
                warn!(attempts, error = %last_error, "Data import failed");
                return Ok(ReconcileOutcome::new(
                    UnitStatus::blocked(format!("data import failed after {attempts} attempts")),
                    Vec::new(),
                ));
            }
        }

        state.imported = true;
        state.imported_at = Some(Utc::now());
        state.save(&self.config.import_dir).await?;

        Ok(ReconcileOutcome::new(
            UnitStatus::Active,
            vec![ReconcileAction::Import { command }],
        ))
    }

    /// Download both documents, retrying each.
    async fn fetch_all(&self) -> Result<Vec<ReconcileAction>> {
        let mut actions = Vec::with_capacity(2);

        for (url, path) in [
            (&self.config.schema_url, self.config.schema_path()),
            (&self.config.data_url, self.config.data_path()),
        ] {
            let retried = retry("fetch", self.config.retry, || {
                let path = &path;
                async move { self.download(url, path).await }
            })
            .await;

            match retried {
                Retried::Succeeded { value: bytes, .. } => {
                    info!(url = %url, bytes, "Fetched document");
                    actions.push(ReconcileAction::FetchFile {
                        url: url.clone(),
                        path,
                    });
                }
                Retried::Exhausted { attempts, last_error } => {
                    debug!(url = %url, attempts, "Fetch retries exhausted");
                    return Err(last_error);
                }
            }
        }

        Ok(actions)
    }

    /// Stream one document to disk, replacing it only when complete.
    async fn download(&self, url: &str, path: &Path) -> Result<u64> {
        let fail = |reason: String| Error::fetch_failed(url, reason);

        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| fail(e.to_string()))?;

        let partial = path.with_extension("part");
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| fail(format!("{}: {e}", partial.display())))?;

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(|e| fail(e.to_string()))? {
            file.write_all(&chunk)
                .await
                .map_err(|e| fail(e.to_string()))?;
            written = written.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
        }
        file.flush().await.map_err(|e| fail(e.to_string()))?;

        tokio::fs::rename(&partial, path)
            .await
            .map_err(|e| fail(format!("{}: {e}", path.display())))?;
        Ok(written)
    }
}

impl BootstrapState {
    /// Create the directory if needed, then load the state from it.
    async fn load_or_create(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| dgraph_core::Error::directory_creation_failed(dir, e.to_string()))?;
        Self::load(dir).await
    }
}
