//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
}

/// Metric names as constants for consistency.
pub mod names {
    // Task metrics
    pub const TASKS_STARTED_TOTAL: &str = "sndx_tasks_started_total";
    pub const TASKS_COMPLETED_TOTAL: &str = "sndx_tasks_completed_total";
    pub const TASKS_FAILED_TOTAL: &str = "sndx_tasks_failed_total";
    pub const TASKS_IN_FLIGHT: &str = "sndx_tasks_in_flight";
    pub const TASK_DURATION_SECONDS: &str = "sndx_task_duration_seconds";

    // Pipeline metrics
    pub const STAGE_FAILURES_TOTAL: &str = "sndx_stage_failures_total";
    pub const FETCH_FAILURES_TOTAL: &str = "sndx_fetch_failures_total";
    pub const REPORTS_FAILED_TOTAL: &str = "sndx_reports_failed_total";
    pub const CHUNKS_PUBLISHED_TOTAL: &str = "sndx_chunks_published_total";
    pub const ORPHANED_CHUNKS_TOTAL: &str = "sndx_orphaned_chunks_total";

    // Queue metrics
    pub const TASKS_DLQ_TOTAL: &str = "sndx_tasks_dlq_total";
}

/// Record a task reaching a terminal status.
pub fn record_task_outcome(status: &str, duration_secs: f64) {
    let labels = [("status", status.to_string())];
    if status == "completed" {
        counter!(names::TASKS_COMPLETED_TOTAL).increment(1);
    } else {
        counter!(names::TASKS_FAILED_TOTAL).increment(1);
    }
    histogram!(names::TASK_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_task_started() {
    counter!(names::TASKS_STARTED_TOTAL).increment(1);
}

pub fn set_tasks_in_flight(count: usize) {
    gauge!(names::TASKS_IN_FLIGHT).set(count as f64);
}

/// Record a failed pipeline stage by kind.
pub fn record_stage_failure(kind: &'static str) {
    counter!(names::STAGE_FAILURES_TOTAL, "kind" => kind).increment(1);
}

pub fn record_fetch_failure() {
    counter!(names::FETCH_FAILURES_TOTAL).increment(1);
}

pub fn record_report_failure() {
    counter!(names::REPORTS_FAILED_TOTAL).increment(1);
}

pub fn record_chunks_published(count: usize) {
    counter!(names::CHUNKS_PUBLISHED_TOTAL).increment(count as u64);
}

pub fn record_orphaned_chunks(count: usize) {
    counter!(names::ORPHANED_CHUNKS_TOTAL).increment(count as u64);
}

pub fn record_dlq() {
    counter!(names::TASKS_DLQ_TOTAL).increment(1);
}
