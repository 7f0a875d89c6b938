use crate::intake::IntakeFilter;
use crate::queue::ReportQueue;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Running totals shown on `/health`.
#[derive(Debug, Default)]
pub struct ReportStats {
    received: AtomicU64,
    filtered: AtomicU64,
    created: AtomicU64,
    commented: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub filtered: u64,
    pub created: u64,
    pub commented: u64,
    pub failed: u64,
    pub retried: u64,
}

impl ReportStats {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commented(&self) {
        self.commented.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            commented: self.commented.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<ReportQueue>,
    pub filter: Arc<IntakeFilter>,
    pub stats: Arc<ReportStats>,
    pub metrics: Option<PrometheusHandle>,
    pub workers: usize,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        queue: Arc<ReportQueue>,
        filter: IntakeFilter,
        stats: Arc<ReportStats>,
        workers: usize,
    ) -> Self {
        Self {
            queue,
            filter: Arc::new(filter),
            stats,
            metrics: None,
            workers,
            start_time: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
