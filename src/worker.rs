//! Quote jobs as independent tokio tasks.
//!
//! Each submitted job runs on its own task and waits for a permit, so at most
//! `max_concurrent` slicer runs are in flight. Cancelling one task leaves the
//! others alone.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::quote::orchestrator::UploadGuard;
use crate::quote::{QuoteId, QuoteJob, QuoteOrchestrator, QuoteOutcome};

#[derive(Debug, Clone)]
pub struct QuoteWorker {
    orchestrator: Arc<QuoteOrchestrator>,
    permits: Arc<Semaphore>,
}

impl QuoteWorker {
    /// `max_concurrent` is clamped to at least 1.
    pub fn new(orchestrator: Arc<QuoteOrchestrator>, max_concurrent: usize) -> Self {
        Self {
            orchestrator,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Spawn `job` and return a handle to its outcome. Must be called within a
    /// tokio runtime.
    pub fn submit(&self, job: QuoteJob) -> QuoteTask {
        let id = QuoteId::generate();
        let orchestrator = Arc::clone(&self.orchestrator);
        let permits = Arc::clone(&self.permits);
        let task_id = id.clone();

        let handle = tokio::spawn(async move {
            // Covers cancellation while still queued for a permit.
            let _upload = UploadGuard::new(&job.model_path);
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!("Quote worker is shut down");
                    return QuoteOutcome::internal(task_id, "Quote worker is shut down");
                }
            };
            debug!("Quote {} acquired a slot", task_id.short());
            orchestrator.process_with_id(task_id, job).await
        });

        QuoteTask { id, handle }
    }

    /// Free slots right now.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Handle to one submitted quote.
#[derive(Debug)]
pub struct QuoteTask {
    id: QuoteId,
    handle: JoinHandle<QuoteOutcome>,
}

impl QuoteTask {
    pub fn id(&self) -> &QuoteId {
        &self.id
    }

    /// Cancel this quote. Its upload is still removed.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the terminal outcome. A panicked or cancelled task yields an
    /// `internal` failure.
    pub async fn outcome(self) -> QuoteOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => {
                warn!("Quote {} was cancelled", self.id.short());
                QuoteOutcome::internal(self.id, "Quote task was cancelled")
            }
            Err(e) => {
                error!("Quote {} panicked: {}", self.id.short(), e);
                QuoteOutcome::internal(self.id, format!("Quote task panicked: {}", e))
            }
        }
    }
}
