//! CronTrigger custom resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CronTrigger Custom Resource Definition
///
/// Declares "run function F on schedule S". The controller converges each
/// CronTrigger into a batch CronJob named `trigger-<name>` that invokes
/// the referenced function over HTTP. The CronJob carries an owner
/// reference back to the trigger, so the cluster garbage collector removes
/// it when the trigger is deleted.
///
/// # Example
///
/// ```yaml
/// apiVersion: serverless.microscaler.io/v1beta1
/// kind: CronTrigger
/// metadata:
///   name: hello-every-minute
///   namespace: default
/// spec:
///   functionName: hello
///   schedule: "* * * * *"
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "serverless.microscaler.io",
    version = "v1beta1",
    kind = "CronTrigger",
    namespaced,
    printcolumn = r#"{"name":"Schedule", "type":"string", "jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"Function", "type":"string", "jsonPath":".spec.functionName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CronTriggerSpec {
    /// Name of the Function to invoke, in the trigger's own namespace
    pub function_name: String,
    /// Cron schedule expression, standard five-field syntax
    pub schedule: String,
    /// Optional JSON payload POSTed to the function on each invocation
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}
