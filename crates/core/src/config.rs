//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Operator configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. TOML file: `--config <path>`, else `$JUJU_CHARM_DIR/operator.toml`
//! 3. Environment variables: `DGRAPH_OPERATOR_*`
//!
//! The charm configuration (`whitelist`) is separate: Juju owns it and it is
//! re-read through `config-get` on every hook.
//!
//! # Example Config
//!
//! ```toml
//! container = "dgraph"
//! readiness_url = "http://localhost:8080/state"
//! retry_interval_secs = 5
//! max_attempts = 120
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "DGRAPH_OPERATOR_";

/// File name looked up in the charm directory when no path is given.
pub const CONFIG_FILE_NAME: &str = "operator.toml";

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION STRUCTURES
// ═══════════════════════════════════════════════════════════════════════════

/// Settings that describe the deployment the operator drives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OperatorConfig {
    /// Workload container name, as declared in the charm metadata.
    pub container: String,
    /// Pebble API socket for the workload container.
    pub pebble_socket: PathBuf,
    /// Pebble CLI used for one-shot commands inside the workload.
    pub pebble_binary: PathBuf,
    /// Endpoint polled until the database answers 200.
    pub readiness_url: String,
    /// GraphQL admin endpoint used by the export action.
    pub admin_url: String,
    /// Demo schema document fetched at install.
    pub schema_url: String,
    /// Demo data document fetched at install.
    pub data_url: String,
    /// Directory shared with the workload where demo data is stored.
    pub import_dir: PathBuf,
    /// Fixed delay between readiness checks and import attempts.
    pub retry_interval_secs: u64,
    /// Attempts before giving up; 0 retries forever.
    pub max_attempts: u32,
    /// Timeout for a single HTTP request.
    pub request_timeout_secs: u64,
    /// Timeout for the import command.
    pub exec_timeout_secs: u64,
}

/// Charm configuration as reported by `config-get`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CharmConfig {
    /// CIDR or IP range allowed to reach the alpha admin endpoints.
    #[serde(default)]
    pub whitelist: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// DEFAULT IMPLEMENTATIONS
// ═══════════════════════════════════════════════════════════════════════════

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            container: "dgraph".to_string(),
            pebble_socket: PathBuf::from("/charm/containers/dgraph/pebble.socket"),
            pebble_binary: PathBuf::from("/charm/bin/pebble"),
            readiness_url: "http://localhost:8080/state".to_string(),
            admin_url: "http://localhost:8080/admin".to_string(),
            schema_url: "https://github.com/dgraph-io/benchmarks/raw/master/data/1million.schema".to_string(),
            data_url: "https://github.com/dgraph-io/benchmarks/raw/master/data/1million.rdf.gz".to_string(),
            import_dir: PathBuf::from("/data/import"),
            retry_interval_secs: 5,
            max_attempts: 120,
            request_timeout_secs: 10,
            exec_timeout_secs: 3600,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

impl OperatorConfig {
    /// Load configuration from all sources with hierarchy.
    ///
    /// `explicit` wins over `charm_dir`; a missing file in the charm directory
    /// is not an error, a missing explicit file is.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The explicit config file cannot be read
    /// - A config file is malformed TOML
    /// - A numeric environment override cannot be parsed
    /// - Config values fail validation
    pub fn load(explicit: Option<&Path>, charm_dir: Option<&Path>) -> Result<Self> {
        let mut config = match (explicit, charm_dir) {
            (Some(path), _) => load_toml_file(path)?,
            (None, Some(dir)) => {
                let candidate = dir.join(CONFIG_FILE_NAME);
                if candidate.exists() {
                    load_toml_file(&candidate)?
                } else {
                    Self::default()
                }
            }
            (None, None) => Self::default(),
        };

        config.apply_env_vars(std::env::vars())?;
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a TOML string, filling gaps with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::toml_parse_failed(e.to_string()))
    }

    /// Apply `DGRAPH_OPERATOR_*` overrides from the given variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a recognised variable holds an unparsable value.
    pub fn apply_env_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "CONTAINER" => self.container = value,
                "PEBBLE_SOCKET" => self.pebble_socket = PathBuf::from(value),
                "PEBBLE_BINARY" => self.pebble_binary = PathBuf::from(value),
                "READINESS_URL" => self.readiness_url = value,
                "ADMIN_URL" => self.admin_url = value,
                "SCHEMA_URL" => self.schema_url = value,
                "DATA_URL" => self.data_url = value,
                "IMPORT_DIR" => self.import_dir = PathBuf::from(value),
                "RETRY_INTERVAL_SECS" => self.retry_interval_secs = parse_number(&key, &value)?,
                "MAX_ATTEMPTS" => self.max_attempts = parse_number(&key, &value)?,
                "REQUEST_TIMEOUT_SECS" => {
                    self.request_timeout_secs = parse_number(&key, &value)?;
                }
                "EXEC_TIMEOUT_SECS" => self.exec_timeout_secs = parse_number(&key, &value)?,
                _ => tracing::debug!(variable = %key, "Ignoring unknown override"),
            }
        }
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.container.trim().is_empty() {
            return Err(Error::invalid_config("container must not be empty"));
        }
        if self.retry_interval_secs == 0 {
            return Err(Error::invalid_config(
                "retry_interval_secs must be greater than zero",
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::invalid_config(
                "request_timeout_secs must be greater than zero",
            ));
        }
        for (name, raw) in [
            ("readiness_url", &self.readiness_url),
            ("admin_url", &self.admin_url),
            ("schema_url", &self.schema_url),
            ("data_url", &self.data_url),
        ] {
            Url::parse(raw).map_err(|e| Error::invalid_config(format!("{name}: {e}")))?;
        }
        if !self.import_dir.is_absolute() {
            return Err(Error::invalid_config(format!(
                "import_dir must be absolute, got '{}'",
                self.import_dir.display()
            )));
        }
        Ok(())
    }

    /// Delay between retries.
    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// Retry budget, `None` when retries are unbounded.
    #[must_use]
    pub const fn max_attempts(&self) -> Option<u32> {
        if self.max_attempts == 0 {
            None
        } else {
            Some(self.max_attempts)
        }
    }

    /// Timeout for a single HTTP request.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Timeout for the import command.
    #[must_use]
    pub const fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }
}

impl CharmConfig {
    /// Create a config with the given whitelist.
    pub fn with_whitelist(whitelist: impl Into<String>) -> Self {
        Self {
            whitelist: whitelist.into(),
        }
    }

    /// Parse the output of `config-get --format=json`.
    ///
    /// Unknown keys are ignored; a missing `whitelist` means no restriction.
    ///
    /// # Errors
    ///
    /// Returns an error if the output is not a JSON object.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::json_parse_failed(e.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HELPER FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════

/// Load a TOML file into a Config.
///
/// # Errors
///
/// Returns error if:
/// - File cannot be read
/// - TOML is malformed
fn load_toml_file(path: &Path) -> Result<OperatorConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::file_read_failed(path, e.to_string()))?;

    OperatorConfig::from_toml(&content)
        .map_err(|e| Error::toml_parse_failed(format!("{}: {e}", path.display())))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::invalid_config(format!("{key}: {e}")))
}
