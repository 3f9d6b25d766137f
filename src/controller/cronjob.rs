//! # Derived CronJob
//!
//! Construction and idempotent ensure of the batch CronJob derived from a
//! CronTrigger. The CronJob is named deterministically from the trigger,
//! so re-running ensure never creates duplicates, and it carries an owner
//! reference back to the trigger so the cluster garbage collector cascades
//! its deletion when the trigger goes away.
//!
//! The CronJob is built as a [`DynamicObject`] against whatever
//! group/version discovery resolved for `cronjobs`; the controller never
//! hard-codes the batch API version.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use kube::Resource;
use serde_json::json;
use tracing::{debug, info};

use crate::config::ControllerConfig;
use crate::controller::client::ClusterWriter;
use crate::crd::{CronTrigger, Function};
use crate::error::{Error, Result};

/// Deterministic name of the CronJob derived from a trigger (or looked up
/// from a function during function-side cleanup).
pub fn cron_job_name(owner_name: &str) -> String {
    format!("trigger-{owner_name}")
}

/// Build the desired CronJob for a trigger/function pair.
///
/// The job template runs a small HTTP client container that POSTs to the
/// function's in-cluster service on each firing. Everything in the built
/// object is a pure function of the trigger, the function, and static
/// config, so repeated builds are identical and ensure stays convergent.
pub fn desired_cron_job(
    trigger: &CronTrigger,
    function: &Function,
    ar: &ApiResource,
    config: &ControllerConfig,
) -> Result<DynamicObject> {
    let trigger_name = trigger
        .metadata
        .name
        .as_deref()
        .ok_or(Error::MissingObjectKey("metadata.name"))?;
    let namespace = trigger
        .metadata
        .namespace
        .as_deref()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    let uid = trigger
        .metadata
        .uid
        .clone()
        .ok_or(Error::MissingObjectKey("metadata.uid"))?;
    let function_name = function
        .metadata
        .name
        .as_deref()
        .ok_or(Error::MissingObjectKey("metadata.name"))?;

    let url = format!(
        "http://{function_name}.{namespace}.svc.cluster.local:{}",
        config.function_port
    );
    let mut args = vec![
        "-s".to_string(),
        "-X".to_string(),
        "POST".to_string(),
        "-H".to_string(),
        "Content-Type: application/json".to_string(),
    ];
    if let Some(payload) = &trigger.spec.payload {
        args.push("-d".to_string());
        args.push(serde_json::to_string(payload)?);
    }
    args.push(url);

    let mut cron_job = DynamicObject::new(&cron_job_name(trigger_name), ar).within(namespace);
    cron_job.metadata.labels = Some(
        [
            ("created-by".to_string(), "cron-trigger-controller".to_string()),
            ("function".to_string(), function_name.to_string()),
        ]
        .into(),
    );
    cron_job.metadata.owner_references = Some(vec![OwnerReference {
        api_version: CronTrigger::api_version(&()).into_owned(),
        kind: CronTrigger::kind(&()).into_owned(),
        name: trigger_name.to_string(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]);
    cron_job.data = json!({
        "spec": {
            "schedule": trigger.spec.schedule,
            "concurrencyPolicy": "Forbid",
            "jobTemplate": {
                "spec": {
                    "template": {
                        "metadata": {
                            "labels": {
                                "created-by": "cron-trigger-controller",
                                "function": function_name,
                            }
                        },
                        "spec": {
                            "containers": [{
                                "name": "trigger",
                                "image": config.trigger_image,
                                "args": args,
                            }],
                            "restartPolicy": "Never",
                        }
                    }
                }
            }
        }
    });
    Ok(cron_job)
}

/// Create or update the derived CronJob so it matches the desired shape.
///
/// Returns `true` when a write was issued, `false` when the existing
/// object already converged; a second application with unchanged inputs
/// is a no-op.
pub async fn ensure_cron_job(
    writer: &dyn ClusterWriter,
    ar: &ApiResource,
    trigger: &CronTrigger,
    function: &Function,
    config: &ControllerConfig,
) -> Result<bool> {
    let desired = desired_cron_job(trigger, function, ar, config)?;
    let namespace = trigger
        .metadata
        .namespace
        .as_deref()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    let name = desired
        .metadata
        .name
        .clone()
        .ok_or(Error::MissingObjectKey("metadata.name"))?;

    match writer.get_cron_job(ar, namespace, &name).await? {
        None => {
            info!(cron_job = %name, namespace, "creating derived cron job");
            writer.create_cron_job(ar, namespace, &desired).await?;
            Ok(true)
        }
        Some(existing) => {
            if converged(&existing, &desired) {
                debug!(cron_job = %name, namespace, "derived cron job up to date");
                return Ok(false);
            }
            info!(cron_job = %name, namespace, "updating derived cron job");
            let mut updated = desired;
            // Carry the live resourceVersion so the replace is rejected on
            // concurrent modification instead of clobbering it
            updated.metadata.resource_version = existing.metadata.resource_version.clone();
            writer.replace_cron_job(ar, namespace, &updated).await?;
            Ok(true)
        }
    }
}

/// Compare only the fields this controller owns; the API server defaults
/// the rest, and echoing those back would make every reconcile a write.
fn converged(existing: &DynamicObject, desired: &DynamicObject) -> bool {
    const SCHEDULE: &str = "/spec/schedule";
    const IMAGE: &str = "/spec/jobTemplate/spec/template/spec/containers/0/image";
    const ARGS: &str = "/spec/jobTemplate/spec/template/spec/containers/0/args";

    for path in [SCHEDULE, IMAGE, ARGS] {
        if existing.data.pointer(path) != desired.data.pointer(path) {
            return false;
        }
    }

    let desired_uid = desired
        .metadata
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .first()
        .map(|or| or.uid.as_str());
    let owned = existing
        .metadata
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|or| Some(or.uid.as_str()) == desired_uid);
    owned
}
