//! Prometheus metrics for the Graph RAG pipeline.
//!
//! Exposes:
//! - `graphrag_cache_lookups_total` (counter by level and outcome)
//! - `graphrag_inference_calls_total` (counter by call kind and status)
//! - `graphrag_inference_duration_seconds` (histogram by call kind)
//! - `graphrag_parser_skipped_lines_total` (counter by reason)
//! - `graphrag_limiter_bypass_total` (counter)
//! - `graphrag_jobs_total` (counter by kind and final status)
//! - process metrics via `process` collector

use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Encoder, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use tracing::warn;

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "graphrag_cache_lookups_total",
        "Checkpoint lookups by cache level and outcome",
        &["level", "outcome"]
    )
    .expect("failed to register cache lookup counter")
});

static INFERENCE_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "graphrag_inference_calls_total",
        "Inference calls by kind and status",
        &["kind", "status"]
    )
    .expect("failed to register inference counter")
});

static INFERENCE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 50ms up to ~3 minutes.
    let buckets =
        prometheus::exponential_buckets(0.05, 2.0, 14).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "graphrag_inference_duration_seconds",
        "Inference call duration in seconds",
        &["kind"],
        buckets
    )
    .expect("failed to register inference duration histogram")
});

static PARSER_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "graphrag_parser_skipped_lines_total",
        "Summary lines ignored by the parser",
        &["reason"]
    )
    .expect("failed to register parser counter")
});

static LIMITER_BYPASS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "graphrag_limiter_bypass_total",
        "Inference calls issued without admission because the limiter was unreachable"
    )
    .expect("failed to register limiter bypass counter")
});

static JOBS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "graphrag_jobs_total",
        "Finished background jobs by kind and status",
        &["kind", "status"]
    )
    .expect("failed to register job counter")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&CACHE_LOOKUPS);
    Lazy::force(&INFERENCE_CALLS);
    Lazy::force(&INFERENCE_DURATION);
    Lazy::force(&PARSER_SKIPPED);
    Lazy::force(&LIMITER_BYPASS);
    Lazy::force(&JOBS);
}

pub fn record_cache_lookup(level: &str, hit: bool) {
    init_collectors();
    CACHE_LOOKUPS
        .with_label_values(&[level, if hit { "hit" } else { "miss" }])
        .inc();
}

pub fn record_inference(kind: &str, duration: Duration, success: bool) {
    init_collectors();
    INFERENCE_DURATION
        .with_label_values(&[kind])
        .observe(duration.as_secs_f64());
    INFERENCE_CALLS
        .with_label_values(&[kind, if success { "ok" } else { "error" }])
        .inc();
}

pub fn record_skipped_line(reason: &str) {
    init_collectors();
    PARSER_SKIPPED.with_label_values(&[reason]).inc();
}

pub fn record_limiter_bypass() {
    init_collectors();
    LIMITER_BYPASS.inc();
}

pub fn record_job(kind: &str, success: bool) {
    init_collectors();
    JOBS.with_label_values(&[kind, if success { "completed" } else { "failed" }])
        .inc();
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> std::result::Result<(String, Vec<u8>), prometheus::Error> {
    init_collectors();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}
