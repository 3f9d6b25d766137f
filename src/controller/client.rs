//! # Cluster Write Client
//!
//! The typed write seam between the reconciler and the API server.
//!
//! All writes go through [`ClusterWriter`] so reconciliation logic can be
//! exercised against an in-memory fake in tests. Replacements carry the
//! object's `resourceVersion`, so the API server rejects them with a
//! conflict when the object changed underneath us; conflicts surface as
//! retryable errors and the next attempt re-reads fresh state.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, PostParams};
use kube::discovery::ApiResource;
use kube::Client;

use crate::crd::{CronTrigger, Function};
use crate::error::{Error, Result};

#[async_trait]
pub trait ClusterWriter: Send + Sync {
    /// Conditional replace of a CronTrigger (optimistic concurrency via
    /// the object's resourceVersion).
    async fn replace_trigger(&self, trigger: &CronTrigger) -> Result<()>;

    /// Conditional replace of a Function. The controller only ever
    /// changes the finalizer list.
    async fn replace_function(&self, function: &Function) -> Result<()>;

    /// Point read of a derived CronJob; `None` when it does not exist.
    async fn get_cron_job(
        &self,
        ar: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    async fn create_cron_job(
        &self,
        ar: &ApiResource,
        namespace: &str,
        cron_job: &DynamicObject,
    ) -> Result<()>;

    async fn replace_cron_job(
        &self,
        ar: &ApiResource,
        namespace: &str,
        cron_job: &DynamicObject,
    ) -> Result<()>;

    /// Delete a derived CronJob. Idempotent: an already-deleted target is
    /// success, not an error.
    async fn delete_cron_job(&self, ar: &ApiResource, namespace: &str, name: &str) -> Result<()>;
}

/// Production implementation backed by the kube client.
pub struct KubeClusterWriter {
    client: Client,
}

impl KubeClusterWriter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn cron_jobs(&self, ar: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, ar)
    }
}

fn name_and_namespace<'a>(
    meta: &'a k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
) -> Result<(&'a str, &'a str)> {
    let name = meta
        .name
        .as_deref()
        .ok_or(Error::MissingObjectKey("metadata.name"))?;
    let namespace = meta
        .namespace
        .as_deref()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    Ok((name, namespace))
}

#[async_trait]
impl ClusterWriter for KubeClusterWriter {
    async fn replace_trigger(&self, trigger: &CronTrigger) -> Result<()> {
        let (name, namespace) = name_and_namespace(&trigger.metadata)?;
        let api: Api<CronTrigger> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &PostParams::default(), trigger).await?;
        Ok(())
    }

    async fn replace_function(&self, function: &Function) -> Result<()> {
        let (name, namespace) = name_and_namespace(&function.metadata)?;
        let api: Api<Function> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &PostParams::default(), function).await?;
        Ok(())
    }

    async fn get_cron_job(
        &self,
        ar: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        match self.cron_jobs(ar, namespace).get(name).await {
            Ok(cron_job) => Ok(Some(cron_job)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn create_cron_job(
        &self,
        ar: &ApiResource,
        namespace: &str,
        cron_job: &DynamicObject,
    ) -> Result<()> {
        self.cron_jobs(ar, namespace)
            .create(&PostParams::default(), cron_job)
            .await?;
        Ok(())
    }

    async fn replace_cron_job(
        &self,
        ar: &ApiResource,
        namespace: &str,
        cron_job: &DynamicObject,
    ) -> Result<()> {
        let name = cron_job
            .metadata
            .name
            .as_deref()
            .ok_or(Error::MissingObjectKey("metadata.name"))?;
        self.cron_jobs(ar, namespace)
            .replace(name, &PostParams::default(), cron_job)
            .await?;
        Ok(())
    }

    async fn delete_cron_job(&self, ar: &ApiResource, namespace: &str, name: &str) -> Result<()> {
        match self
            .cron_jobs(ar, namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
