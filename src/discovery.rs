//! # API Version Resolver
//!
//! Resolves which API group/version the cluster currently serves for a
//! resource kind. The derived workload kind (`cronjobs`) has shipped under
//! different group/versions across cluster releases, so callers must not
//! hard-code one; requests are built against whatever discovery reports.

use async_trait::async_trait;
use kube::discovery::{ApiResource, Discovery};
use kube::Client;
use tracing::debug;

use crate::error::{Error, Result};

/// Resolves a plural resource name to a fully-qualified [`ApiResource`].
///
/// Fails with [`Error::VersionNotFound`] when no currently-served API
/// group exposes the resource. Implementations must not cache results
/// indefinitely: a cluster upgrade can move the kind while the controller
/// is running.
#[async_trait]
pub trait ApiVersionResolver: Send + Sync {
    async fn resolve(&self, plural: &str) -> Result<ApiResource>;
}

/// Live resolver backed by the API server's discovery document.
pub struct DiscoveryResolver {
    client: Client,
}

impl DiscoveryResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ApiVersionResolver for DiscoveryResolver {
    async fn resolve(&self, plural: &str) -> Result<ApiResource> {
        // Refreshed per call; called once per reconcile, which is rare
        // enough that a linear scan is fine.
        let discovery = Discovery::new(self.client.clone()).run().await?;
        for group in discovery.groups() {
            for (ar, _caps) in group.recommended_resources() {
                if ar.plural == plural {
                    debug!(plural, api_version = %ar.api_version, "resolved resource group/version");
                    return Ok(ar);
                }
            }
        }
        Err(Error::VersionNotFound {
            plural: plural.to_string(),
        })
    }
}
