use crate::error::{GuardError, Result};
use axum::{
    body::Body,
    extract::State,
    http::{Response, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Create a new metrics service
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            GuardError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        // Register all metrics with descriptions
        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Register all metrics with descriptions
    fn register_metrics() {
        describe_counter!(
            "apiguard_admission_checks_total",
            "Total number of admission checks, by endpoint class and outcome"
        );
        describe_counter!(
            "apiguard_rate_limit_exceeded_total",
            "Total number of requests rejected due to rate limiting"
        );
        describe_counter!(
            "apiguard_store_fallbacks_total",
            "Total number of checks answered by the local store after a shared store failure"
        );
        describe_gauge!(
            "apiguard_local_active_keys",
            "Number of keys currently tracked by the local window store"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Get the Prometheus metrics handle
    pub fn handle(&self) -> Arc<PrometheusHandle> {
        self.handle.clone()
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    let metrics = service.render();
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(Body::from(metrics))
        .unwrap()
}

/// Record one admission check and its outcome
pub fn record_admission_check(class: &str, allowed: bool) {
    let outcome = if allowed { "allowed" } else { "denied" };
    let labels = [
        ("class", class.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("apiguard_admission_checks_total", &labels).increment(1);

    if !allowed {
        let denied_labels = [("class", class.to_string())];
        counter!("apiguard_rate_limit_exceeded_total", &denied_labels).increment(1);
    }
}

/// Record a check that fell back to the local store
pub fn record_store_fallback(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!("apiguard_store_fallbacks_total", &labels).increment(1);
}

/// Record how many keys the local store is tracking
pub fn record_local_active_keys(count: usize) {
    gauge!("apiguard_local_active_keys").set(count as f64);
}
