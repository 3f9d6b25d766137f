//! # Errors
//!
//! Error types for the cron trigger controller.
//!
//! Every reconciliation step funnels its failures into [`Error`] so the
//! worker loop has a single decision point for retry handling. Transient
//! failures (API errors, missing dependencies, unresolved API versions)
//! are retried with a rate-limited requeue; static misconfiguration
//! (malformed keys, objects without required metadata) is reported but
//! cannot be fixed by retrying.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API call failed. Covers transient network errors and
    /// optimistic-concurrency conflicts; both are retryable.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// A trigger references a Function that does not exist in its
    /// namespace. Retryable, since the function may appear later, but a
    /// persistent stream of these is a user-visible misconfiguration.
    #[error("function {namespace}/{name} referenced by trigger not found")]
    FunctionNotFound { namespace: String, name: String },

    /// Discovery reported no served API group for a resource kind.
    #[error("resource {plural:?} not served by any API group")]
    VersionNotFound { plural: String },

    /// An object is missing metadata the controller cannot operate
    /// without (name, namespace, uid).
    #[error("object missing required metadata field {0:?}")]
    MissingObjectKey(&'static str),

    /// A queue key did not have the expected `namespace/name` form.
    #[error("malformed object key {0:?}")]
    MalformedKey(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// True when the underlying cause is a 404 from the API server.
    ///
    /// Used to tolerate already-deleted cleanup targets: deleting a
    /// CronJob that is gone is a success, not an error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }

    /// True when the failure can be fixed by replaying the reconciliation
    /// later, false for static misconfiguration.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::MalformedKey(_) | Error::MissingObjectKey(_) | Error::Serialization(_)
        )
    }
}
