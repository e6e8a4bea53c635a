//! Reporting unit status.
//!
//! Handlers return their final status in a [`ReconcileOutcome`](crate::ReconcileOutcome)
//! and push intermediate statuses through a [`StatusReporter`] as they happen.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::UnitStatus;

/// Sink for unit status changes.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Publish a status. The latest call wins.
    async fn report(&self, status: &UnitStatus) -> Result<()>;
}

/// Reporter that keeps every status in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingStatusReporter {
    history: Arc<RwLock<Vec<UnitStatus>>>,
}

impl RecordingStatusReporter {
    /// Create an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status reported so far, oldest first.
    pub async fn history(&self) -> Vec<UnitStatus> {
        self.history.read().await.clone()
    }

    /// The most recent status.
    pub async fn current(&self) -> Option<UnitStatus> {
        self.history.read().await.last().cloned()
    }
}

#[async_trait]
impl StatusReporter for RecordingStatusReporter {
    async fn report(&self, status: &UnitStatus) -> Result<()> {
        self.history.write().await.push(status.clone());
        Ok(())
    }
}
