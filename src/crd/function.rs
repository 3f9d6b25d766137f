//! Function custom resource.
//!
//! A Function is the declarative record of a serverless function deployed
//! in the cluster. The controller never interprets the spec beyond
//! identity: it only reads metadata (name, namespace, labels, finalizers,
//! deletion timestamp) and maintains its own dependency marker in the
//! finalizer list while scheduled triggers reference the function.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Function Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: serverless.microscaler.io/v1beta1
/// kind: Function
/// metadata:
///   name: hello
///   namespace: default
/// spec:
///   handler: hello.main
///   runtime: python3.11
///   function: |
///     def main(event, context):
///         return "hello"
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "serverless.microscaler.io",
    version = "v1beta1",
    kind = "Function",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    /// Entry point of the function, `<module>.<function>`
    pub handler: String,
    /// Language runtime the function executes under (e.g. `python3.11`)
    pub runtime: String,
    /// Inline function source. Opaque to this controller.
    #[serde(default)]
    pub function: Option<String>,
    /// Content type of the inline source (`text`, `base64`, `url`)
    #[serde(default)]
    pub function_content_type: Option<String>,
    /// Dependency manifest for the runtime's package manager
    #[serde(default)]
    pub deps: Option<String>,
    /// Checksum of the function source
    #[serde(default)]
    pub checksum: Option<String>,
    /// Request timeout in seconds, passed through to the runtime
    #[serde(default)]
    pub timeout: Option<String>,
}
