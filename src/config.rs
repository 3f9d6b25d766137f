//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables, with CLI
//! overrides applied in `main`.
//!
//! Retry ceilings, requeue delays, and worker counts are construction-time
//! parameters rather than package-level globals so tests can run with
//! small ceilings and short delays.

use std::time::Duration;

use crate::constants::*;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via
/// environment variables. Environment variables are populated from a
/// ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Maximum reconciliation attempts per key. Past this ceiling the key
    /// is forgotten and the error reported, never a process exit.
    pub max_retries: u32,
    /// Number of worker loops draining the work queue
    pub workers: usize,
    /// Starting delay for rate-limited requeues; doubles per retry of the
    /// same key
    pub requeue_base_delay: Duration,
    /// Cap on the rate-limited requeue delay
    pub requeue_max_delay: Duration,
    /// Container image derived CronJobs run to invoke a function
    pub trigger_image: String,
    /// In-cluster HTTP port functions listen on
    pub function_port: u16,
    /// HTTP server port for metrics and probes
    pub metrics_port: u16,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            workers: DEFAULT_WORKERS,
            requeue_base_delay: Duration::from_millis(DEFAULT_REQUEUE_BASE_DELAY_MS),
            requeue_max_delay: Duration::from_millis(DEFAULT_REQUEUE_MAX_DELAY_MS),
            trigger_image: DEFAULT_TRIGGER_IMAGE.to_string(),
            function_port: DEFAULT_FUNCTION_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            log_format: "text".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            max_retries: env_var_or_default("MAX_RETRIES", DEFAULT_MAX_RETRIES),
            workers: env_var_or_default("WORKERS", DEFAULT_WORKERS),
            requeue_base_delay: Duration::from_millis(env_var_or_default(
                "REQUEUE_BASE_DELAY_MS",
                DEFAULT_REQUEUE_BASE_DELAY_MS,
            )),
            requeue_max_delay: Duration::from_millis(env_var_or_default(
                "REQUEUE_MAX_DELAY_MS",
                DEFAULT_REQUEUE_MAX_DELAY_MS,
            )),
            trigger_image: env_var_or_default_str("TRIGGER_IMAGE", DEFAULT_TRIGGER_IMAGE),
            function_port: env_var_or_default("FUNCTION_PORT", DEFAULT_FUNCTION_PORT),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
        }
    }
}

fn env_var_or_default<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_or_default_str(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
