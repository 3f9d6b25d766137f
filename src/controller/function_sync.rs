//! # Function Synchronizer
//!
//! Mirror-image cleanup to the trigger reconciler, operating from the
//! Function side. Wired directly to function watch events rather than the
//! work queue: it only needs to react to a deletion, not converge
//! iteratively, and the watch replays current state on restart if we miss
//! a delivery.
//!
//! When a Function with the dependency marker gets a deletion timestamp,
//! the synchronizer best-effort deletes the CronJob named after the
//! function, then removes the marker so the store can complete the
//! deletion. This keeps Functions deletable even when their triggers were
//! already removed out of band.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::constants::{CRON_JOB_PLURAL, CRON_TRIGGER_FINALIZER};
use crate::controller::client::ClusterWriter;
use crate::controller::cronjob::cron_job_name;
use crate::crd::{has_finalizer, remove_finalizer, Function};
use crate::discovery::ApiVersionResolver;
use crate::error::{Error, Result};

pub struct FunctionSynchronizer {
    writer: Arc<dyn ClusterWriter>,
    resolver: Arc<dyn ApiVersionResolver>,
}

impl FunctionSynchronizer {
    pub fn new(writer: Arc<dyn ClusterWriter>, resolver: Arc<dyn ApiVersionResolver>) -> Self {
        Self { writer, resolver }
    }

    /// React to an observed Function. Only a function that is both being
    /// deleted and still marked as a dependency needs work; everything
    /// else is a no-op.
    pub async fn handle(&self, function: &Function) -> Result<()> {
        if function.metadata.deletion_timestamp.is_none()
            || !has_finalizer(&function.metadata, CRON_TRIGGER_FINALIZER)
        {
            return Ok(());
        }

        let name = function
            .metadata
            .name
            .as_deref()
            .ok_or(Error::MissingObjectKey("metadata.name"))?;
        let namespace = function
            .metadata
            .namespace
            .as_deref()
            .ok_or(Error::MissingObjectKey("metadata.namespace"))?;

        // Best-effort removal of the scheduled CronJob; absence is fine,
        // and a failed delete must not block releasing the function.
        let derived = cron_job_name(name);
        match self.resolver.resolve(CRON_JOB_PLURAL).await {
            Ok(ar) => match self.writer.get_cron_job(&ar, namespace, &derived).await {
                Ok(Some(_)) => {
                    if let Err(err) = self.writer.delete_cron_job(&ar, namespace, &derived).await {
                        warn!(
                            cron_job = %derived,
                            namespace,
                            error = %err,
                            "failed to delete cron job for deleted function"
                        );
                    } else {
                        info!(cron_job = %derived, namespace, "deleted cron job for deleted function");
                    }
                }
                Ok(None) => debug!(cron_job = %derived, namespace, "no cron job to clean up"),
                Err(err) => {
                    warn!(cron_job = %derived, namespace, error = %err, "cron job lookup failed during cleanup")
                }
            },
            Err(err) => {
                warn!(error = %err, "could not resolve cron job api version during cleanup")
            }
        }

        let mut updated = function.clone();
        remove_finalizer(&mut updated.metadata, CRON_TRIGGER_FINALIZER);
        self.writer.replace_function(&updated).await?;
        info!(function = name, namespace, "removed trigger dependency marker");
        Ok(())
    }
}
