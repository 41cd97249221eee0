//! Prometheus metrics for the control-plane API
//!
//! - Request volume, failures and latency (every endpoint)
//! - Health store query errors and latency

use prometheus::{self, Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// API metrics registry
///
/// Thread-safe container for all Prometheus metrics.
#[derive(Clone)]
pub struct ApiMetrics {
    registry: Registry,
    /// Every HTTP request handled
    pub requests_total: IntCounter,
    /// Requests answered with status >= 400
    pub failed_requests_total: IntCounter,
    /// Request latency in seconds
    pub request_latency_seconds: Histogram,
    /// Failed health store queries
    pub db_errors_total: IntCounter,
    /// Health store query latency in seconds
    pub db_response_latency_seconds: Histogram,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total =
            IntCounter::new("kaas_requests_total", "Total number of requests")?;
        registry.register(Box::new(requests_total.clone()))?;

        let failed_requests_total = IntCounter::new(
            "kaas_failed_requests_total",
            "Total number of failed requests",
        )?;
        registry.register(Box::new(failed_requests_total.clone()))?;

        let request_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "kaas_request_latency_seconds",
                "Latency of HTTP requests in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(request_latency_seconds.clone()))?;

        let db_errors_total =
            IntCounter::new("kaas_db_errors_total", "Total number of database errors")?;
        registry.register(Box::new(db_errors_total.clone()))?;

        let db_response_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "kaas_db_response_latency_seconds",
                "Latency of database responses in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(db_response_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            failed_requests_total,
            request_latency_seconds,
            db_errors_total,
            db_response_latency_seconds,
        })
    }

    /// Record a finished HTTP request
    pub fn record_request(&self, status: u16, duration_secs: f64) {
        self.requests_total.inc();
        if status >= 400 {
            self.failed_requests_total.inc();
        }
        self.request_latency_seconds.observe(duration_secs);
    }

    /// Record a health store query
    pub fn record_db_query(&self, succeeded: bool, duration_secs: f64) {
        if !succeeded {
            self.db_errors_total.inc();
        }
        self.db_response_latency_seconds.observe(duration_secs);
    }

    /// Encode all metrics to Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
        })
    }
}

/// Shared metrics handle
pub type SharedMetrics = Arc<ApiMetrics>;

pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(ApiMetrics::new()?))
}
