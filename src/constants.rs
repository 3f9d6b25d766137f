//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group served by the controller's custom resources
pub const API_GROUP: &str = "serverless.microscaler.io";

/// API version served by the controller's custom resources
pub const API_VERSION: &str = "v1beta1";

/// Finalizer added to CronTrigger objects, and dependency marker added to
/// Function objects that have at least one scheduled trigger
pub const CRON_TRIGGER_FINALIZER: &str = "serverless.microscaler.io/crontrigger";

/// Plural resource name of the derived workload kind, looked up through
/// discovery because its group/version has moved across cluster versions
pub const CRON_JOB_PLURAL: &str = "cronjobs";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default number of worker loops draining the work queue
pub const DEFAULT_WORKERS: usize = 1;

/// Default maximum reconciliation attempts per key before giving up
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default rate-limited requeue starting delay (milliseconds)
pub const DEFAULT_REQUEUE_BASE_DELAY_MS: u64 = 5;

/// Default rate-limited requeue maximum delay (milliseconds)
pub const DEFAULT_REQUEUE_MAX_DELAY_MS: u64 = 60_000;

/// Default container image run by derived CronJobs to invoke a function
pub const DEFAULT_TRIGGER_IMAGE: &str = "curlimages/curl:8.10.1";

/// Default in-cluster HTTP port functions listen on
pub const DEFAULT_FUNCTION_PORT: u16 = 8080;
