//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `cron_trigger_reconciliations_total` - Total number of reconciliations
//! - `cron_trigger_reconciliation_errors_total` - Total number of reconciliation errors
//! - `cron_trigger_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `cron_trigger_cron_job_writes_total` - Total number of CronJob creates/updates issued
//! - `cron_trigger_requeues_total` - Total number of rate-limited requeues
//! - `cron_trigger_give_ups_total` - Total number of keys dropped after exhausting retries
//! - `cron_trigger_queue_depth` - Current number of keys waiting in the work queue

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntGauge, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cron_trigger_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cron_trigger_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "cron_trigger_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static CRON_JOB_WRITES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cron_trigger_cron_job_writes_total",
        "Total number of CronJob creates and updates issued",
    )
    .expect("Failed to create CRON_JOB_WRITES_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cron_trigger_requeues_total",
        "Total number of rate-limited requeues after retryable failures",
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static GIVE_UPS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cron_trigger_give_ups_total",
        "Total number of keys dropped after exhausting the retry budget",
    )
    .expect("Failed to create GIVE_UPS_TOTAL metric - this should never happen")
});

static QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "cron_trigger_queue_depth",
        "Current number of keys waiting in the work queue",
    )
    .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(CRON_JOB_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GIVE_UPS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_cron_job_writes() {
    CRON_JOB_WRITES_TOTAL.inc();
}

pub fn increment_requeues() {
    REQUEUES_TOTAL.inc();
}

pub fn increment_give_ups() {
    GIVE_UPS_TOTAL.inc();
}

pub fn set_queue_depth(depth: i64) {
    QUEUE_DEPTH.set(depth);
}
