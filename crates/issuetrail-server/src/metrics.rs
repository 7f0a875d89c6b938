use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder once and return its render handle.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS.get_or_init(|| handle).clone())
}

pub fn record_received(status: u16) {
    counter!("issuetrail_errors_received_total", "status" => status.to_string()).increment(1);
}

pub fn record_filtered() {
    counter!("issuetrail_errors_filtered_total").increment(1);
}

pub fn record_issue_created() {
    counter!("issuetrail_issues_created_total").increment(1);
}

pub fn record_comment_added() {
    counter!("issuetrail_comments_added_total").increment(1);
}

pub fn record_failure(kind: &'static str) {
    counter!("issuetrail_report_failures_total", "kind" => kind).increment(1);
}

pub fn record_retry() {
    counter!("issuetrail_retries_total").increment(1);
}

pub fn update_queue_depth(depth: usize) {
    gauge!("issuetrail_queue_depth").set(depth as f64);
}

pub fn record_report_duration(ms: f64) {
    histogram!("issuetrail_report_duration_ms").record(ms);
}
