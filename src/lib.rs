//! Cron Trigger Controller Library
//!
//! A Kubernetes controller that reconciles `CronTrigger` custom resources
//! into batch CronJobs which invoke serverless `Function` resources on a
//! schedule.
//!
//! ## Overview
//!
//! The controller watches two resource kinds:
//!
//! 1. **CronTriggers** - each trigger names a Function and a cron schedule;
//!    the controller derives a CronJob that POSTs to the function's
//!    in-cluster service on every firing
//! 2. **Functions** - when a function that still carries the trigger
//!    dependency marker is deleted, the controller cleans up the derived
//!    CronJob and releases the marker
//!
//! Trigger events flow through a deduplicating work queue drained by a
//! configurable number of workers; retryable failures are requeued with
//! exponential backoff up to a ceiling, then dropped and reported. CronJob
//! writes carry owner references so the cluster garbage collector cascades
//! deletion, and finalizers on both kinds guarantee cleanup runs before
//! the API server lets the objects go.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod discovery;
pub mod error;
pub mod observability;
pub mod queue;
pub mod server;
