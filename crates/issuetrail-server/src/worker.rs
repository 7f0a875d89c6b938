//! Report workers.
//!
//! Each worker takes one job at a time off the [`ReportQueue`] and runs the
//! lifecycle manager on it. Retryable failures are re-queued with exponential
//! backoff; everything else is logged and dropped.

use crate::metrics;
use crate::queue::{ReportJob, ReportQueue};
use crate::state::ReportStats;
use dashmap::DashMap;
use issuetrail_core::lifecycle::{LifecycleManager, ReportOutcome};
use issuetrail_core::store::OccurrenceStore;
use issuetrail_core::tracker::TrackerClient;
use issuetrail_core::types::Fingerprint;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub type Reporter = LifecycleManager<Arc<dyn OccurrenceStore>, Arc<dyn TrackerClient>>;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt number `attempt + 1`, doubling from `initial_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Per-fingerprint async mutexes. Holding one serializes reports of the same
/// error across workers of this process.
#[derive(Default)]
pub struct FingerprintLocks {
    locks: DashMap<Fingerprint, Arc<Mutex<()>>>,
}

impl FingerprintLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, fingerprint: &Fingerprint) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Drop the entry for `fingerprint` if nobody holds or waits on it.
    pub fn release(&self, fingerprint: &Fingerprint) {
        self.locks
            .remove_if(fingerprint, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }
}

pub struct ReportWorker {
    id: usize,
    queue: Arc<ReportQueue>,
    reporter: Arc<Reporter>,
    locks: Option<Arc<FingerprintLocks>>,
    retry: RetryPolicy,
    stats: Arc<ReportStats>,
}

impl ReportWorker {
    pub fn new(
        id: usize,
        queue: Arc<ReportQueue>,
        reporter: Arc<Reporter>,
        locks: Option<Arc<FingerprintLocks>>,
        retry: RetryPolicy,
        stats: Arc<ReportStats>,
    ) -> Self {
        Self {
            id,
            queue,
            reporter,
            locks,
            retry,
            stats,
        }
    }

    /// Run until `cancel` fires. A job in progress is finished first.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(worker_id = self.id, "report worker started");

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    info!(worker_id = self.id, "report worker shutting down");
                    break;
                }

                job = self.queue.next() => {
                    self.process(job, &cancel).await;
                }
            }
        }

        info!(worker_id = self.id, "report worker stopped");
    }

    pub async fn process(&self, mut job: ReportJob, cancel: &CancellationToken) {
        job.attempt += 1;
        let started = Instant::now();

        let result = match &self.locks {
            Some(locks) => {
                let guard = locks.lock(&job.fingerprint).await;
                let result = self.reporter.report(&job.error).await;
                drop(guard);
                locks.release(&job.fingerprint);
                result
            }
            None => self.reporter.report(&job.error).await,
        };
        metrics::record_report_duration(started.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(outcome) => self.on_success(&outcome),
            Err(err) => {
                self.stats.record_failure();
                metrics::record_failure(err.kind());

                if !err.is_retryable() {
                    error!(
                        worker_id = self.id,
                        fingerprint = %job.fingerprint.short(),
                        attempt = job.attempt,
                        kind = err.kind(),
                        error = %err,
                        "report failed, dropping"
                    );
                    return;
                }
                if job.attempt >= self.retry.max_attempts {
                    error!(
                        worker_id = self.id,
                        fingerprint = %job.fingerprint.short(),
                        attempts = job.attempt,
                        kind = err.kind(),
                        error = %err,
                        "report failed, retries exhausted"
                    );
                    return;
                }

                let delay = self.retry.delay_for(job.attempt);
                warn!(
                    worker_id = self.id,
                    fingerprint = %job.fingerprint.short(),
                    attempt = job.attempt,
                    delay_ms = delay.as_millis() as u64,
                    kind = err.kind(),
                    "report failed, will retry"
                );
                self.stats.record_retry();
                metrics::record_retry();
                self.schedule_retry(job, delay, cancel.clone());
            }
        }
    }

    fn on_success(&self, outcome: &ReportOutcome) {
        match outcome {
            ReportOutcome::Created { .. } => {
                self.stats.record_created();
                metrics::record_issue_created();
            }
            ReportOutcome::Commented { .. } => {
                self.stats.record_commented();
                metrics::record_comment_added();
            }
        }
    }

    fn schedule_retry(&self, job: ReportJob, delay: Duration, cancel: CancellationToken) {
        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    warn!(fingerprint = %job.fingerprint.short(), "shutdown before retry, report dropped");
                }
                () = tokio::time::sleep(delay) => {
                    queue.requeue(job).await;
                }
            }
        });
    }
}

/// Worker pool wiring shared by every worker.
pub struct WorkerPool {
    pub queue: Arc<ReportQueue>,
    pub reporter: Arc<Reporter>,
    pub locks: Option<Arc<FingerprintLocks>>,
    pub retry: RetryPolicy,
    pub stats: Arc<ReportStats>,
}

impl WorkerPool {
    pub fn spawn(&self, workers: usize, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        (0..workers.max(1))
            .map(|id| {
                let worker = ReportWorker::new(
                    id,
                    self.queue.clone(),
                    self.reporter.clone(),
                    self.locks.clone(),
                    self.retry,
                    self.stats.clone(),
                );
                let cancel = cancel.clone();
                tokio::spawn(async move { worker.run(cancel).await })
            })
            .collect()
    }
}
