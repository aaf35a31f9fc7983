//! # Receipt Worker
//!
//! Drains the `receipt_jobs` outbox after sales commit.
//!
//! ## Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Receipt Worker Flow                                  │
//! │                                                                         │
//! │  SaleService ── commit ──► ReceiptQueue::dispatch(sale_id)              │
//! │                                   │ try_send, never waits               │
//! │                                   ▼                                     │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    ReceiptWorker::run                           │   │
//! │  │                                                                 │   │
//! │  │  select! {                                                      │   │
//! │  │     sale id received  → process_sale(id)                       │   │
//! │  │     interval tick     → process_pending()                      │   │
//! │  │                          SELECT … WHERE completed_at IS NULL    │   │
//! │  │                          AND attempts < max_attempts            │   │
//! │  │     shutdown          → drain queued ids, stop                 │   │
//! │  │  }                                                              │   │
//! │  │                                                                 │   │
//! │  │  issued → mark_completed, ReceiptIssued event                  │   │
//! │  │  failed → mark_failed (attempts += 1, last_error)              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  A full queue only delays a receipt: the job row is already committed  │
//! │  and the next poll picks it up.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use kassa_core::ReceiptJob;
use kassa_db::ReceiptJobRepository;

use crate::config::ReceiptSettings;
use crate::receipt::{Notifier, ReceiptError, ReceiptIssuer, ReceiptResult, SaleEvent};

// =============================================================================
// Queue Handle
// =============================================================================

/// Handle for feeding and stopping a [`ReceiptWorker`].
#[derive(Debug, Clone)]
pub struct ReceiptQueue {
    sale_tx: mpsc::Sender<String>,
    shutdown_tx: mpsc::Sender<()>,
}

impl ReceiptQueue {
    /// Hands a committed sale to the worker without waiting.
    ///
    /// Returns false when the id could not be queued; the job is then picked
    /// up by the next poll.
    pub fn dispatch(&self, sale_id: &str) -> bool {
        match self.sale_tx.try_send(sale_id.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(sale_id = %sale_id, "Receipt queue full, leaving job to the poller");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(sale_id = %sale_id, "Receipt worker stopped, leaving job to the poller");
                false
            }
        }
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> ReceiptResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| ReceiptError::QueueClosed)
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Result of handling one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Issued,
    Failed,
    /// Already completed, exhausted or unknown.
    Skipped,
}

/// Counts of one processing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub issued: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ProcessSummary {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Issued => self.issued += 1,
            JobOutcome::Failed => self.failed += 1,
            JobOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.issued + self.failed + self.skipped
    }
}

/// Issues receipts for committed sales, outside any sale transaction.
pub struct ReceiptWorker {
    issuer: Arc<ReceiptIssuer>,
    jobs: ReceiptJobRepository,
    notifier: Arc<dyn Notifier>,
    settings: ReceiptSettings,
    sale_rx: mpsc::Receiver<String>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl ReceiptWorker {
    /// Creates a worker and the queue feeding it.
    pub fn new(
        issuer: Arc<ReceiptIssuer>,
        jobs: ReceiptJobRepository,
        notifier: Arc<dyn Notifier>,
        settings: ReceiptSettings,
    ) -> (Self, ReceiptQueue) {
        let (sale_tx, sale_rx) = mpsc::channel(settings.channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = ReceiptWorker {
            issuer,
            jobs,
            notifier,
            settings,
            sale_rx,
            shutdown_rx,
        };

        (worker, ReceiptQueue { sale_tx, shutdown_tx })
    }

    /// Runs the worker loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Receipt worker starting");

        let mut interval = tokio::time::interval(self.settings.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(sale_id) = self.sale_rx.recv() => {
                    self.process_sale(&sale_id).await;
                }

                _ = interval.tick() => {
                    let summary = self.process_pending().await;
                    if summary.total() > 0 {
                        info!(
                            issued = summary.issued,
                            failed = summary.failed,
                            "Receipt poll finished"
                        );
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Receipt worker shutting down");
                    break;
                }
            }
        }

        let drained = self.drain_queue().await;
        if drained.total() > 0 {
            debug!(count = drained.total(), "Processed queued receipts before stopping");
        }

        info!("Receipt worker stopped");
    }

    /// Handles every sale id already queued, without waiting for more.
    ///
    /// For one-shot callers that never spawn [`run`](Self::run). Older
    /// failures are left to [`process_pending`](Self::process_pending).
    pub async fn drain(&mut self) -> ProcessSummary {
        self.drain_queue().await
    }

    async fn drain_queue(&mut self) -> ProcessSummary {
        let mut summary = ProcessSummary::default();
        while let Ok(sale_id) = self.sale_rx.try_recv() {
            summary.record(self.process_sale(&sale_id).await);
        }
        summary
    }

    /// Handles the job of one sale.
    pub async fn process_sale(&self, sale_id: &str) -> JobOutcome {
        let job = match self.jobs.get_by_sale_id(sale_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(sale_id = %sale_id, "No receipt job for sale");
                return JobOutcome::Skipped;
            }
            Err(e) => {
                error!(?e, sale_id = %sale_id, "Failed to load receipt job");
                return JobOutcome::Failed;
            }
        };

        if job.is_completed() {
            debug!(sale_id = %sale_id, "Receipt job already completed");
            return JobOutcome::Skipped;
        }

        if job.attempts >= i64::from(self.settings.max_attempts) {
            warn!(
                id = %job.id,
                sale_id = %job.sale_id,
                attempts = job.attempts,
                "Skipping receipt job that exceeded max attempts"
            );
            return JobOutcome::Skipped;
        }

        self.attempt(&job).await
    }

    /// Retries every pending job, oldest first, one batch.
    pub async fn process_pending(&self) -> ProcessSummary {
        let mut summary = ProcessSummary::default();

        let jobs = match self
            .jobs
            .get_pending(self.settings.batch_size, self.settings.max_attempts)
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(?e, "Failed to load pending receipt jobs");
                return summary;
            }
        };

        if !jobs.is_empty() {
            debug!(count = jobs.len(), "Processing pending receipts");
        }

        for job in &jobs {
            summary.record(self.attempt(job).await);
        }

        match self.jobs.count_exhausted(self.settings.max_attempts).await {
            Ok(0) => {}
            Ok(exhausted) => warn!(
                exhausted,
                max_attempts = self.settings.max_attempts,
                "Receipt jobs exceeded max attempts and are no longer retried"
            ),
            Err(e) => error!(?e, "Failed to count exhausted receipt jobs"),
        }

        summary
    }

    async fn attempt(&self, job: &ReceiptJob) -> JobOutcome {
        match self.issuer.issue_receipt(&job.sale_id).await {
            Ok(location) => {
                if let Err(e) = self.jobs.mark_completed(&job.id).await {
                    error!(?e, id = %job.id, "Failed to mark receipt job completed");
                }

                if location.newly_issued {
                    self.notifier.notify(SaleEvent::ReceiptIssued {
                        sale_id: job.sale_id.clone(),
                        invoice_number: location.invoice_number,
                        url: location.url,
                    });
                }
                JobOutcome::Issued
            }
            Err(e) => {
                warn!(
                    error = %e,
                    id = %job.id,
                    sale_id = %job.sale_id,
                    attempt = job.attempts + 1,
                    "Receipt issuing failed"
                );

                if let Err(e) = self.jobs.mark_failed(&job.id, &e.to_string()).await {
                    error!(?e, id = %job.id, "Failed to mark receipt job failed");
                }
                JobOutcome::Failed
            }
        }
    }
}
