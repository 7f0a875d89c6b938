use crate::intake::Skip;
use crate::metrics;
use crate::queue::QueueError;
use crate::state::{AppState, StatsSnapshot};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use issuetrail_core::types::CapturedError;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct AcceptedResponse {
    fingerprint: String,
    queue_depth: usize,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
    reporting_enabled: bool,
    monitored_statuses: Vec<u16>,
    workers: usize,
    queue_depth: usize,
    queue_capacity: usize,
    totals: StatsSnapshot,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/errors", post(capture_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Failure hook: accepts a captured error and queues it off the request path.
async fn capture_handler(
    State(state): State<AppState>,
    Json(error): Json<CapturedError>,
) -> Response {
    state.stats.record_received();
    metrics::record_received(error.status_code);

    if let Err(skip) = state.filter.check(&error) {
        state.stats.record_filtered();
        metrics::record_filtered();
        if skip == Skip::Unmonitored {
            debug!(status = error.status_code, "status not monitored, skipping");
        }
        return StatusCode::NO_CONTENT.into_response();
    }

    let status = error.status_code;
    match state.queue.submit(error).await {
        Ok(fingerprint) => {
            let queue_depth = state.queue.len().await;
            info!(
                fingerprint = %fingerprint.short(),
                status,
                queue_depth,
                "captured HTTP {}, dispatching report", status
            );
            (
                StatusCode::ACCEPTED,
                Json(AcceptedResponse {
                    fingerprint: fingerprint.to_string(),
                    queue_depth,
                }),
            )
                .into_response()
        }
        Err(err @ QueueError::QueueFull(_)) => {
            warn!(status, "{}", err);
            metrics::record_failure("queue_full");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.uptime_seconds(),
        reporting_enabled: state.filter.is_enabled(),
        monitored_statuses: state.filter.monitored().iter().copied().collect(),
        workers: state.workers,
        queue_depth: state.queue.len().await,
        queue_capacity: state.queue.capacity(),
        totals: state.stats.snapshot(),
    })
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed\n").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::IntakeFilter;
    use crate::queue::ReportQueue;
    use crate::state::ReportStats;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state(queue_size: usize, enabled: bool) -> AppState {
        AppState::new(
            Arc::new(ReportQueue::new(queue_size)),
            IntakeFilter::new(BTreeSet::from([500]), enabled),
            Arc::new(ReportStats::default()),
            2,
        )
    }

    fn capture(status: u16) -> Request<Body> {
        let body = serde_json::json!({
            "message": "Division by zero",
            "file": "calc.x",
            "line": 42,
            "trace": "#0 main",
            "status": status
        });
        Request::post("/errors")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_monitored_error_is_queued() {
        let state = state(10, true);
        let response = router(state.clone()).oneshot(capture(500)).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["fingerprint"].as_str().unwrap().len(), 64);
        assert_eq!(body["queue_depth"], 1);
        assert_eq!(state.queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_unmonitored_status_is_skipped() {
        let state = state(10, true);
        let response = router(state.clone()).oneshot(capture(404)).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.queue.len().await, 0);
        assert_eq!(state.stats.snapshot().filtered, 1);
    }

    #[tokio::test]
    async fn test_disabled_environment_is_skipped() {
        let state = state(10, false);
        let response = router(state.clone()).oneshot(capture(500)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.queue.len().await, 0);
    }

    #[tokio::test]
    async fn test_full_queue_returns_503() {
        let state = state(1, true);
        router(state.clone()).oneshot(capture(500)).await.unwrap();
        let response = router(state.clone()).oneshot(capture(500)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_malformed_payload_rejected() {
        let request = Request::post("/errors")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"message": "no location"}"#))
            .unwrap();
        let response = router(state(10, true)).oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_health_reports_queue_and_totals() {
        let state = state(10, true);
        router(state.clone()).oneshot(capture(500)).await.unwrap();

        let response = router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["queue_depth"], 1);
        assert_eq!(body["monitored_statuses"], serde_json::json!([500]));
        assert_eq!(body["totals"]["received"], 1);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let response = router(state(10, true))
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
