//! # Custom Resource Definitions
//!
//! CRD types for the cron trigger controller.
//!
//! ## Module Structure
//!
//! - `function.rs` - Function resource (the invocation target)
//! - `trigger.rs` - CronTrigger resource (the schedule declaration)
//!
//! Finalizer handling is shared between the two kinds: the same marker
//! string gates trigger deletion and records a function's dependency on
//! this controller. Helpers here are idempotent, so re-applying them from
//! a replayed reconciliation never corrupts the finalizer list.

mod function;
mod trigger;

pub use function::{Function, FunctionSpec};
pub use trigger::{CronTrigger, CronTriggerSpec};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// True when the object carries the given finalizer marker.
pub fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|f| f == finalizer)
}

/// Add a finalizer marker. No-op when already present.
pub fn add_finalizer(meta: &mut ObjectMeta, finalizer: &str) {
    if has_finalizer(meta, finalizer) {
        return;
    }
    meta.finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
}

/// Remove a finalizer marker. No-op when absent; an emptied list becomes
/// `None` so the serialized object drops the field entirely.
pub fn remove_finalizer(meta: &mut ObjectMeta, finalizer: &str) {
    if let Some(finalizers) = meta.finalizers.as_mut() {
        finalizers.retain(|f| f != finalizer);
        if finalizers.is_empty() {
            meta.finalizers = None;
        }
    }
}
