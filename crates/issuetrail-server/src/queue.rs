//! Pending reports waiting for a worker.
//!
//! The intake hook pushes captured errors here and returns immediately; report
//! workers pull them off in arrival order. Retries go back through the same
//! queue after their backoff delay.

use crate::metrics;
use issuetrail_core::fingerprint::fingerprint_error;
use issuetrail_core::types::{CapturedError, Fingerprint};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Report queue is full ({0} pending)")]
    QueueFull(usize),
}

/// One unit of work: a single occurrence of an error.
#[derive(Debug, Clone)]
pub struct ReportJob {
    pub error: CapturedError,
    pub fingerprint: Fingerprint,
    /// Attempts already made, 0 for a fresh job.
    pub attempt: u32,
}

impl ReportJob {
    pub fn new(error: CapturedError) -> Self {
        let fingerprint = fingerprint_error(&error);
        Self {
            error,
            fingerprint,
            attempt: 0,
        }
    }
}

pub struct ReportQueue {
    pending: Mutex<VecDeque<ReportJob>>,
    max_size: usize,
    notify: Notify,
}

impl ReportQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            max_size: max_size.max(1),
            notify: Notify::new(),
        }
    }

    /// Enqueue a fresh occurrence. Fails when `max_size` jobs are pending.
    pub async fn submit(&self, error: CapturedError) -> Result<Fingerprint, QueueError> {
        let job = ReportJob::new(error);
        let fingerprint = job.fingerprint.clone();
        {
            let mut pending = self.pending.lock().await;
            if pending.len() >= self.max_size {
                return Err(QueueError::QueueFull(pending.len()));
            }
            pending.push_back(job);
            metrics::update_queue_depth(pending.len());
        }
        self.notify.notify_one();
        debug!(fingerprint = %fingerprint.short(), "report queued");
        Ok(fingerprint)
    }

    /// Put a job back for another attempt. Not subject to the size limit, so
    /// an accepted report is never lost to a full queue.
    pub async fn requeue(&self, job: ReportJob) {
        {
            let mut pending = self.pending.lock().await;
            pending.push_back(job);
            metrics::update_queue_depth(pending.len());
        }
        self.notify.notify_one();
    }

    /// Wait for the next job.
    pub async fn next(&self) -> ReportJob {
        loop {
            let notified = self.notify.notified();
            if let Some(job) = self.try_next().await {
                return job;
            }
            notified.await;
        }
    }

    pub async fn try_next(&self) -> Option<ReportJob> {
        let mut pending = self.pending.lock().await;
        let job = pending.pop_front();
        if job.is_some() {
            metrics::update_queue_depth(pending.len());
            // Wake another worker if more work is waiting.
            if !pending.is_empty() {
                self.notify.notify_one();
            }
        }
        job
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}
