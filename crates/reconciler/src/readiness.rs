//! Bounded retries and database readiness polling.
//!
//! [`RetryState`] is a pure state machine: the caller reports each attempt's
//! result and gets back whether to stop, sleep and retry, or give up.
//! [`wait_until_ready`] and [`retry`] drive it with `tokio::time::sleep`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use dgraph_core::OperatorConfig;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// How often and how long to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay between attempts.
    pub interval: Duration,
    /// Attempts before giving up; `None` never gives up.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: Some(120),
        }
    }
}

impl RetryPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Policy described by the operator configuration.
    #[must_use]
    pub const fn from_config(config: &OperatorConfig) -> Self {
        Self::new(config.retry_interval(), config.max_attempts())
    }
}

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// The attempt succeeded.
    Done,
    /// Sleep, then try again.
    RetryAfter(Duration),
    /// The budget is spent.
    Exhausted { attempts: u32 },
}

/// Attempt counter for one retried operation.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryState {
    /// Start counting under `policy`.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Attempts recorded so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record one attempt and decide the next step.
    pub fn record(&mut self, success: bool) -> RetryStep {
        self.attempts = self.attempts.saturating_add(1);
        if success {
            return RetryStep::Done;
        }
        match self.policy.max_attempts {
            Some(max) if self.attempts >= max => RetryStep::Exhausted {
                attempts: self.attempts,
            },
            _ => RetryStep::RetryAfter(self.policy.interval),
        }
    }
}

/// Result of a single readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Ready,
    NotReady { reason: String },
}

impl ProbeResult {
    /// Whether the check passed.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Something that can tell whether the database accepts work.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Run one check.
    async fn check(&self) -> ProbeResult;
}

/// Probe that expects HTTP 200 from an endpoint.
#[derive(Debug, Clone)]
pub struct HttpReadinessProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpReadinessProbe {
    /// Create a probe for `url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::invalid_config(format!("http client: {e}")))?;
        Ok(Self::with_client(client, url))
    }

    /// Create a probe sharing an existing client.
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ReadinessProbe for HttpReadinessProbe {
    async fn check(&self) -> ProbeResult {
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status() == StatusCode::OK => ProbeResult::Ready,
            Ok(response) => ProbeResult::NotReady {
                reason: format!("status {}", response.status()),
            },
            Err(e) => ProbeResult::NotReady {
                reason: e.to_string(),
            },
        }
    }
}

/// How polling ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready { attempts: u32 },
    Exhausted { attempts: u32 },
}

/// Poll `probe` until it passes or `policy` runs out.
pub async fn wait_until_ready(probe: &dyn ReadinessProbe, policy: RetryPolicy) -> Readiness {
    let mut state = RetryState::new(policy);

    loop {
        let result = probe.check().await;
        if let ProbeResult::NotReady { reason } = &result {
            debug!(attempt = state.attempts().saturating_add(1), reason = %reason, "Database not ready");
        }

        match state.record(result.is_ready()) {
            RetryStep::Done => {
                info!(attempts = state.attempts(), "Database ready");
                return Readiness::Ready {
                    attempts: state.attempts(),
                };
            }
            RetryStep::RetryAfter(delay) => tokio::time::sleep(delay).await,
            RetryStep::Exhausted { attempts } => {
                warn!(attempts, "Database did not become ready");
                return Readiness::Exhausted { attempts };
            }
        }
    }
}

/// How a retried operation ended.
#[derive(Debug)]
pub enum Retried<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32, last_error: Error },
}

/// Run `operation` until it succeeds or `policy` runs out.
///
/// `name` labels the log lines.
pub async fn retry<T, F, Fut>(name: &str, policy: RetryPolicy, mut operation: F) -> Retried<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut state = RetryState::new(policy);

    loop {
        let error = match operation().await {
            Ok(value) => {
                state.record(true);
                return Retried::Succeeded {
                    value,
                    attempts: state.attempts(),
                };
            }
            Err(e) => e,
        };

        match state.record(false) {
            RetryStep::RetryAfter(delay) => {
                warn!(operation = name, attempt = state.attempts(), error = %error, "Attempt failed, retrying");
                tokio::time::sleep(delay).await;
            }
            RetryStep::Exhausted { attempts } => {
                warn!(operation = name, attempts, error = %error, "Giving up");
                return Retried::Exhausted {
                    attempts,
                    last_error: error,
                };
            }
            RetryStep::Done => {}
        }
    }
}
