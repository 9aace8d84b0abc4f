//! # Prometheus Metrics
//!
//! Exposes operational metrics for the bridge node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers. Pipeline
//! counters are fed from the orchestrator's event stream by the node's
//! event pump; decision counters are incremented by the API handlers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use pearid_bridge::mint::MintEvent;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it can
/// be shared across request handlers and background tasks.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total number of approval decisions recorded.
    pub approvals_recorded_total: IntCounter,
    /// Total number of rejection decisions recorded.
    pub rejections_recorded_total: IntCounter,
    /// Total number of mint requests staged.
    pub requests_staged_total: IntCounter,
    /// Total number of mint calls broadcast to the chain.
    pub submissions_total: IntCounter,
    /// Total number of mint requests confirmed on-chain.
    pub confirmations_total: IntCounter,
    /// Total number of retries scheduled after transient failures.
    pub retries_total: IntCounter,
    /// Total number of mint requests that failed terminally.
    pub terminal_failures_total: IntCounter,
    /// Total number of mint requests cancelled by operators.
    pub cancellations_total: IntCounter,
    /// Number of mint requests currently in flight.
    pub active_requests: IntGauge,
    /// Histogram of broadcast attempts per confirmed mint.
    pub attempts_per_mint: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("pearid".into()), None)
            .expect("failed to create prometheus registry");

        let approvals_recorded_total = IntCounter::new(
            "approvals_recorded_total",
            "Total number of approval decisions recorded",
        )
        .expect("metric creation");
        registry
            .register(Box::new(approvals_recorded_total.clone()))
            .expect("metric registration");

        let rejections_recorded_total = IntCounter::new(
            "rejections_recorded_total",
            "Total number of rejection decisions recorded",
        )
        .expect("metric creation");
        registry
            .register(Box::new(rejections_recorded_total.clone()))
            .expect("metric registration");

        let requests_staged_total = IntCounter::new(
            "requests_staged_total",
            "Total number of mint requests staged for the pipeline",
        )
        .expect("metric creation");
        registry
            .register(Box::new(requests_staged_total.clone()))
            .expect("metric registration");

        let submissions_total = IntCounter::new(
            "submissions_total",
            "Total number of mint calls broadcast to the registry chain",
        )
        .expect("metric creation");
        registry
            .register(Box::new(submissions_total.clone()))
            .expect("metric registration");

        let confirmations_total = IntCounter::new(
            "confirmations_total",
            "Total number of mint requests confirmed on-chain",
        )
        .expect("metric creation");
        registry
            .register(Box::new(confirmations_total.clone()))
            .expect("metric registration");

        let retries_total = IntCounter::new(
            "retries_total",
            "Total number of retries scheduled after transient failures",
        )
        .expect("metric creation");
        registry
            .register(Box::new(retries_total.clone()))
            .expect("metric registration");

        let terminal_failures_total = IntCounter::new(
            "terminal_failures_total",
            "Total number of mint requests that failed terminally",
        )
        .expect("metric creation");
        registry
            .register(Box::new(terminal_failures_total.clone()))
            .expect("metric registration");

        let cancellations_total = IntCounter::new(
            "cancellations_total",
            "Total number of mint requests cancelled by operators",
        )
        .expect("metric creation");
        registry
            .register(Box::new(cancellations_total.clone()))
            .expect("metric registration");

        let active_requests =
            IntGauge::new("active_requests", "Number of mint requests currently in flight")
                .expect("metric creation");
        registry
            .register(Box::new(active_requests.clone()))
            .expect("metric registration");

        let attempts_per_mint = Histogram::with_opts(
            HistogramOpts::new(
                "attempts_per_mint",
                "Broadcast attempts needed per confirmed mint",
            )
            .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 8.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(attempts_per_mint.clone()))
            .expect("metric registration");

        Self {
            registry,
            approvals_recorded_total,
            rejections_recorded_total,
            requests_staged_total,
            submissions_total,
            confirmations_total,
            retries_total,
            terminal_failures_total,
            cancellations_total,
            active_requests,
            attempts_per_mint,
        }
    }

    /// Updates pipeline counters for one orchestrator event.
    pub fn observe_event(&self, event: &MintEvent) {
        match event {
            MintEvent::Staged { .. } => self.requests_staged_total.inc(),
            MintEvent::Submitted { .. } => self.submissions_total.inc(),
            MintEvent::RetryScheduled { .. } => self.retries_total.inc(),
            MintEvent::Confirmed { .. } => self.confirmations_total.inc(),
            MintEvent::Failed { .. } => self.terminal_failures_total.inc(),
            MintEvent::Cancelled { .. } => self.cancellations_total.inc(),
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers via extension.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
