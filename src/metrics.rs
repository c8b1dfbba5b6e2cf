//! Prometheus metrics for collector fetches, pipeline retries/fallbacks,
//! and scheduler fires.
//!
//! Ambient instrumentation, not a functional requirement of any component
//! above — skippable entirely via `metrics_enabled = false`.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramOpts, HistogramVec,
    IntCounterVec, TextEncoder,
};
use tracing::{error, info};

// Collector fetch outcomes and latency
static COLLECTOR_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "orchestrator_collector_fetches_total",
        "Total collector fetch attempts by source and outcome",
        &["source", "outcome"]
    )
    .expect("failed to register orchestrator_collector_fetches_total")
});

static COLLECTOR_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0];
    register_histogram_vec!(
        HistogramOpts::new(
            "orchestrator_collector_latency_seconds",
            "Collector fetch latency in seconds"
        )
        .buckets(buckets),
        &["source"]
    )
    .expect("failed to register orchestrator_collector_latency_seconds")
});

// Pipeline retries and fallback usage
static PIPELINE_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "orchestrator_pipeline_retries_total",
        "Total pipeline retry-node transitions by original source",
        &["original_source"]
    )
    .expect("failed to register orchestrator_pipeline_retries_total")
});

static PIPELINE_COMPLETIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "orchestrator_pipeline_completions_total",
        "Total pipeline completions by final source and whether an error was surfaced",
        &["source", "had_error"]
    )
    .expect("failed to register orchestrator_pipeline_completions_total")
});

// Scheduler fires
static SCHEDULER_FIRES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "orchestrator_scheduler_fires_total",
        "Total daily scheduler fires by outcome",
        &["outcome"]
    )
    .expect("failed to register orchestrator_scheduler_fires_total")
});

/// Outcome label for a single collector fetch.
pub enum FetchOutcome {
    Success,
    Empty,
    Error,
}

impl FetchOutcome {
    fn as_label(&self) -> &'static str {
        match self {
            FetchOutcome::Success => "success",
            FetchOutcome::Empty => "empty",
            FetchOutcome::Error => "error",
        }
    }
}

pub fn record_collector_fetch(source: &str, outcome: FetchOutcome) {
    COLLECTOR_FETCHES
        .with_label_values(&[source, outcome.as_label()])
        .inc();
}

pub fn record_collector_latency(source: &str, latency_secs: f64) {
    COLLECTOR_LATENCY.with_label_values(&[source]).observe(latency_secs);
}

pub fn record_pipeline_retry(original_source: &str) {
    PIPELINE_RETRIES.with_label_values(&[original_source]).inc();
}

pub fn record_pipeline_completion(source: &str, had_error: bool) {
    PIPELINE_COMPLETIONS
        .with_label_values(&[source, if had_error { "true" } else { "false" }])
        .inc();
}

pub fn record_scheduler_fire(succeeded: bool) {
    SCHEDULER_FIRES
        .with_label_values(&[if succeeded { "success" } else { "error" }])
        .inc();
}

/// A drop-on-scope timer that records collector fetch latency.
pub struct CollectorTimer {
    source: String,
    start: std::time::Instant,
}

impl CollectorTimer {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for CollectorTimer {
    fn drop(&mut self) {
        record_collector_latency(&self.source, self.start.elapsed().as_secs_f64());
    }
}

/// Collects all metrics as Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

// ============================================
// METRICS SERVER
// ============================================

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;

async fn handle_metrics(_req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(Response::new(Full::new(Bytes::from(gather_metrics()))))
}

/// Starts the metrics HTTP server. Runs forever; callers spawn this as a
/// background task.
pub async fn start_metrics_server(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "metrics server listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_metrics))
                .await
            {
                error!(error = %e, "error serving metrics connection");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_gather_collector_metrics() {
        record_collector_fetch("news", FetchOutcome::Success);
        record_collector_fetch("news", FetchOutcome::Empty);
        record_collector_latency("news", 0.2);

        let metrics = gather_metrics();
        assert!(metrics.contains("orchestrator_collector_fetches_total"));
        assert!(metrics.contains("orchestrator_collector_latency_seconds"));
    }

    #[test]
    fn test_record_pipeline_and_scheduler_metrics() {
        record_pipeline_retry("crypto");
        record_pipeline_completion("news", false);
        record_scheduler_fire(true);

        let metrics = gather_metrics();
        assert!(metrics.contains("orchestrator_pipeline_retries_total"));
        assert!(metrics.contains("orchestrator_pipeline_completions_total"));
        assert!(metrics.contains("orchestrator_scheduler_fires_total"));
    }

    #[test]
    fn test_collector_timer_records_on_drop() {
        {
            let _timer = CollectorTimer::new("arxiv");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let metrics = gather_metrics();
        assert!(metrics.contains("orchestrator_collector_latency_seconds"));
    }
}
