//! # Reconciler
//!
//! Core reconciliation logic for CronTrigger resources.
//!
//! Each invocation is a pure function of currently-observed state: the
//! trigger is re-read from the reflector cache (never from the event that
//! queued it), classified into an explicit [`TriggerState`], and dispatched
//! through a single match. Every transition either adds/removes an
//! idempotent finalizer marker or idempotently ensures a
//! deterministically-named CronJob, so replaying the loop from scratch
//! always converges.
//!
//! ## Reconciliation Flow
//!
//! 1. Look the trigger up in the indexed cache (missing = already deleted)
//! 2. Classify from (deletionTimestamp, finalizer present)
//! 3. Active without finalizer: add it (the update itself triggers a fresh
//!    notification, no requeue needed)
//! 4. Active with finalizer: resolve the referenced Function, resolve the
//!    served group/version for `cronjobs`, ensure the derived CronJob, and
//!    mark the Function as depended-upon
//! 5. Deleting with finalizer: remove it, releasing the object to the
//!    store; the garbage collector cascades the CronJob via its owner
//!    reference

use std::sync::Arc;

use kube::runtime::reflector::{ObjectRef, Store};
use tracing::{debug, info};

use crate::config::ControllerConfig;
use crate::constants::{CRON_JOB_PLURAL, CRON_TRIGGER_FINALIZER};
use crate::controller::client::ClusterWriter;
use crate::controller::cronjob::ensure_cron_job;
use crate::crd::{add_finalizer, has_finalizer, remove_finalizer, CronTrigger, Function};
use crate::discovery::ApiVersionResolver;
use crate::error::{Error, Result};
use crate::observability::metrics;

/// Explicit reconciliation state, computed once per invocation from the
/// observed object. The transition table lives in [`Reconciler::reconcile`]
/// as a single match so it stays auditable in isolation.
#[derive(Debug)]
pub enum TriggerState<'a> {
    /// Not in the cache: already deleted, nothing to do
    Missing,
    /// Exists, not deleting, no finalizer yet
    ActiveUnfinalized(&'a CronTrigger),
    /// Exists, not deleting, finalizer present: converge derived state
    ActiveFinalized(&'a CronTrigger),
    /// Deletion requested, finalizer still present: clean up and release
    DeletingFinalized(&'a CronTrigger),
    /// Deletion requested, finalizer gone: deletion is proceeding
    DeletingUnfinalized,
}

/// Classify an observed trigger. The finalizer is never (re-)added once a
/// deletion timestamp is set, so the marker is monotone over an object's
/// lifetime.
pub fn classify<'a>(observed: Option<&'a CronTrigger>, finalizer: &str) -> TriggerState<'a> {
    let Some(trigger) = observed else {
        return TriggerState::Missing;
    };
    let deleting = trigger.metadata.deletion_timestamp.is_some();
    let finalized = has_finalizer(&trigger.metadata, finalizer);
    match (deleting, finalized) {
        (false, false) => TriggerState::ActiveUnfinalized(trigger),
        (false, true) => TriggerState::ActiveFinalized(trigger),
        (true, true) => TriggerState::DeletingFinalized(trigger),
        (true, false) => TriggerState::DeletingUnfinalized,
    }
}

/// Split a queue key into `(namespace, name)`.
pub fn split_key(key: &str) -> Result<(&str, &str)> {
    key.split_once('/')
        .filter(|(ns, name)| !ns.is_empty() && !name.is_empty())
        .ok_or_else(|| Error::MalformedKey(key.to_string()))
}

pub struct Reconciler {
    triggers: Store<CronTrigger>,
    functions: Store<Function>,
    writer: Arc<dyn ClusterWriter>,
    resolver: Arc<dyn ApiVersionResolver>,
    config: ControllerConfig,
}

impl Reconciler {
    pub fn new(
        triggers: Store<CronTrigger>,
        functions: Store<Function>,
        writer: Arc<dyn ClusterWriter>,
        resolver: Arc<dyn ApiVersionResolver>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            triggers,
            functions,
            writer,
            resolver,
            config,
        }
    }

    /// Reconcile one trigger key against current cluster state.
    pub async fn reconcile(&self, key: &str) -> Result<()> {
        let (namespace, name) = split_key(key)?;
        let observed = self
            .triggers
            .get(&ObjectRef::new(name).within(namespace));

        match classify(observed.as_deref(), CRON_TRIGGER_FINALIZER) {
            TriggerState::Missing => {
                debug!(key, "trigger not found in cache, assuming deleted");
                Ok(())
            }
            TriggerState::DeletingUnfinalized => {
                debug!(key, "trigger deletion already in progress");
                Ok(())
            }
            TriggerState::ActiveUnfinalized(trigger) => self.add_trigger_finalizer(trigger).await,
            TriggerState::DeletingFinalized(trigger) => {
                self.remove_trigger_finalizer(trigger).await
            }
            TriggerState::ActiveFinalized(trigger) => self.converge(namespace, trigger).await,
        }
    }

    /// Gate deletion behind this controller: once the finalizer is on, the
    /// store defers physical deletion until we remove it again.
    async fn add_trigger_finalizer(&self, trigger: &CronTrigger) -> Result<()> {
        let mut updated = trigger.clone();
        add_finalizer(&mut updated.metadata, CRON_TRIGGER_FINALIZER);
        self.writer.replace_trigger(&updated).await?;
        info!(
            trigger = updated.metadata.name.as_deref().unwrap_or_default(),
            "added finalizer to trigger"
        );
        Ok(())
    }

    /// Pre-delete cleanup is owned by the garbage collector (the CronJob
    /// carries an owner reference), so releasing the object is all that is
    /// left here.
    async fn remove_trigger_finalizer(&self, trigger: &CronTrigger) -> Result<()> {
        let mut updated = trigger.clone();
        remove_finalizer(&mut updated.metadata, CRON_TRIGGER_FINALIZER);
        self.writer.replace_trigger(&updated).await?;
        info!(
            trigger = updated.metadata.name.as_deref().unwrap_or_default(),
            "removed finalizer, trigger released for deletion"
        );
        Ok(())
    }

    /// Converge an active trigger: referenced function must exist, the
    /// derived CronJob must match desired shape, and the function must
    /// carry the dependency marker.
    async fn converge(&self, namespace: &str, trigger: &CronTrigger) -> Result<()> {
        let function_name = trigger.spec.function_name.as_str();
        let function = self
            .functions
            .get(&ObjectRef::new(function_name).within(namespace))
            .ok_or_else(|| Error::FunctionNotFound {
                namespace: namespace.to_string(),
                name: function_name.to_string(),
            })?;

        let ar = self.resolver.resolve(CRON_JOB_PLURAL).await?;

        let wrote =
            ensure_cron_job(self.writer.as_ref(), &ar, trigger, &function, &self.config).await?;
        if wrote {
            metrics::increment_cron_job_writes();
        }

        if !has_finalizer(&function.metadata, CRON_TRIGGER_FINALIZER) {
            let mut updated = (*function).clone();
            add_finalizer(&mut updated.metadata, CRON_TRIGGER_FINALIZER);
            self.writer.replace_function(&updated).await?;
            info!(function = function_name, namespace, "marked function as trigger dependency");
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::controller::cronjob::cron_job_name;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::DynamicObject;
    use kube::core::GroupVersionKind;
    use kube::discovery::ApiResource;
    use kube::runtime::reflector;
    use kube::runtime::watcher;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub(crate) fn batch_cron_jobs() -> ApiResource {
        ApiResource::from_gvk(&GroupVersionKind {
            group: "batch".to_string(),
            version: "v1".to_string(),
            kind: "CronJob".to_string(),
        })
    }

    /// In-memory stand-in for the API server's write surface.
    #[derive(Default)]
    pub(crate) struct FakeCluster {
        pub triggers: Mutex<HashMap<String, CronTrigger>>,
        pub functions: Mutex<HashMap<String, Function>>,
        pub cron_jobs: Mutex<HashMap<String, DynamicObject>>,
        pub cron_job_writes: Mutex<u32>,
        pub function_writes: Mutex<u32>,
    }

    fn object_key(namespace: &str, name: &str) -> String {
        format!("{namespace}/{name}")
    }

    #[async_trait::async_trait]
    impl ClusterWriter for FakeCluster {
        async fn replace_trigger(&self, trigger: &CronTrigger) -> Result<()> {
            let ns = trigger.metadata.namespace.clone().unwrap();
            let name = trigger.metadata.name.clone().unwrap();
            self.triggers
                .lock()
                .unwrap()
                .insert(object_key(&ns, &name), trigger.clone());
            Ok(())
        }

        async fn replace_function(&self, function: &Function) -> Result<()> {
            let ns = function.metadata.namespace.clone().unwrap();
            let name = function.metadata.name.clone().unwrap();
            *self.function_writes.lock().unwrap() += 1;
            self.functions
                .lock()
                .unwrap()
                .insert(object_key(&ns, &name), function.clone());
            Ok(())
        }

        async fn get_cron_job(
            &self,
            _ar: &ApiResource,
            namespace: &str,
            name: &str,
        ) -> Result<Option<DynamicObject>> {
            Ok(self
                .cron_jobs
                .lock()
                .unwrap()
                .get(&object_key(namespace, name))
                .cloned())
        }

        async fn create_cron_job(
            &self,
            _ar: &ApiResource,
            namespace: &str,
            cron_job: &DynamicObject,
        ) -> Result<()> {
            let name = cron_job.metadata.name.clone().unwrap();
            *self.cron_job_writes.lock().unwrap() += 1;
            self.cron_jobs
                .lock()
                .unwrap()
                .insert(object_key(namespace, &name), cron_job.clone());
            Ok(())
        }

        async fn replace_cron_job(
            &self,
            _ar: &ApiResource,
            namespace: &str,
            cron_job: &DynamicObject,
        ) -> Result<()> {
            let name = cron_job.metadata.name.clone().unwrap();
            *self.cron_job_writes.lock().unwrap() += 1;
            self.cron_jobs
                .lock()
                .unwrap()
                .insert(object_key(namespace, &name), cron_job.clone());
            Ok(())
        }

        async fn delete_cron_job(
            &self,
            _ar: &ApiResource,
            namespace: &str,
            name: &str,
        ) -> Result<()> {
            self.cron_jobs
                .lock()
                .unwrap()
                .remove(&object_key(namespace, name));
            Ok(())
        }
    }

    pub(crate) struct FakeResolver {
        pub ar: Option<ApiResource>,
    }

    #[async_trait::async_trait]
    impl ApiVersionResolver for FakeResolver {
        async fn resolve(&self, plural: &str) -> Result<ApiResource> {
            self.ar.clone().ok_or_else(|| Error::VersionNotFound {
                plural: plural.to_string(),
            })
        }
    }

    pub(crate) fn trigger(name: &str, function: &str, finalized: bool, deleting: bool) -> CronTrigger {
        let mut t = CronTrigger::new(
            name,
            crate::crd::CronTriggerSpec {
                function_name: function.to_string(),
                schedule: "*/5 * * * *".to_string(),
                payload: None,
            },
        );
        t.metadata.namespace = Some("default".to_string());
        t.metadata.uid = Some(format!("uid-{name}"));
        t.metadata.resource_version = Some("1".to_string());
        if finalized {
            add_finalizer(&mut t.metadata, CRON_TRIGGER_FINALIZER);
        }
        if deleting {
            t.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
        }
        t
    }

    pub(crate) fn function(name: &str, marked: bool) -> Function {
        let mut f = Function::new(
            name,
            crate::crd::FunctionSpec {
                handler: "hello.main".to_string(),
                runtime: "python3.11".to_string(),
                function: None,
                function_content_type: None,
                deps: None,
                checksum: None,
                timeout: None,
            },
        );
        f.metadata.namespace = Some("default".to_string());
        f.metadata.uid = Some(format!("uid-{name}"));
        f.metadata.resource_version = Some("1".to_string());
        if marked {
            add_finalizer(&mut f.metadata, CRON_TRIGGER_FINALIZER);
        }
        f
    }

    fn stores(
        triggers: Vec<CronTrigger>,
        functions: Vec<Function>,
    ) -> (Store<CronTrigger>, Store<Function>) {
        let (trigger_store, mut trigger_writer) = reflector::store();
        for t in triggers {
            trigger_writer.apply_watcher_event(&watcher::Event::Apply(t));
        }
        let (function_store, mut function_writer) = reflector::store();
        for f in functions {
            function_writer.apply_watcher_event(&watcher::Event::Apply(f));
        }
        (trigger_store, function_store)
    }

    fn reconciler(
        triggers: Vec<CronTrigger>,
        functions: Vec<Function>,
        cluster: Arc<FakeCluster>,
        resolver: FakeResolver,
    ) -> Reconciler {
        let (trigger_store, function_store) = stores(triggers, functions);
        Reconciler::new(
            trigger_store,
            function_store,
            cluster,
            Arc::new(resolver),
            ControllerConfig::default(),
        )
    }

    fn working_resolver() -> FakeResolver {
        FakeResolver {
            ar: Some(batch_cron_jobs()),
        }
    }

    #[test]
    fn classify_covers_all_states() {
        let active = trigger("t1", "f1", false, false);
        assert!(matches!(
            classify(Some(&active), CRON_TRIGGER_FINALIZER),
            TriggerState::ActiveUnfinalized(_)
        ));
        let finalized = trigger("t1", "f1", true, false);
        assert!(matches!(
            classify(Some(&finalized), CRON_TRIGGER_FINALIZER),
            TriggerState::ActiveFinalized(_)
        ));
        let deleting = trigger("t1", "f1", true, true);
        assert!(matches!(
            classify(Some(&deleting), CRON_TRIGGER_FINALIZER),
            TriggerState::DeletingFinalized(_)
        ));
        let released = trigger("t1", "f1", false, true);
        assert!(matches!(
            classify(Some(&released), CRON_TRIGGER_FINALIZER),
            TriggerState::DeletingUnfinalized
        ));
        assert!(matches!(
            classify(None, CRON_TRIGGER_FINALIZER),
            TriggerState::Missing
        ));
    }

    #[test]
    fn split_key_rejects_malformed_keys() {
        assert!(split_key("default/t1").is_ok());
        assert!(split_key("no-slash").is_err());
        assert!(split_key("/name-only").is_err());
        assert!(split_key("ns-only/").is_err());
    }

    #[tokio::test]
    async fn missing_trigger_is_not_an_error() {
        let cluster = Arc::new(FakeCluster::default());
        let r = reconciler(vec![], vec![], cluster.clone(), working_resolver());
        r.reconcile("default/ghost").await.unwrap();
        assert!(cluster.cron_jobs.lock().unwrap().is_empty());
        assert!(cluster.triggers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn active_trigger_gains_finalizer_first() {
        let cluster = Arc::new(FakeCluster::default());
        let r = reconciler(
            vec![trigger("t1", "f1", false, false)],
            vec![function("f1", false)],
            cluster.clone(),
            working_resolver(),
        );
        r.reconcile("default/t1").await.unwrap();

        let updated = cluster.triggers.lock().unwrap()["default/t1"].clone();
        assert!(has_finalizer(&updated.metadata, CRON_TRIGGER_FINALIZER));
        // Finalizer update ends the transition; ensure happens on the
        // notification the update itself produces
        assert!(cluster.cron_jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn finalized_trigger_creates_cron_job_and_marks_function() {
        let cluster = Arc::new(FakeCluster::default());
        let r = reconciler(
            vec![trigger("t1", "f1", true, false)],
            vec![function("f1", false)],
            cluster.clone(),
            working_resolver(),
        );
        r.reconcile("default/t1").await.unwrap();

        let cron_jobs = cluster.cron_jobs.lock().unwrap();
        let cron_job = &cron_jobs[&format!("default/{}", cron_job_name("t1"))];
        let owners = cron_job.metadata.owner_references.as_deref().unwrap();
        assert_eq!(owners[0].uid, "uid-t1");
        assert_eq!(owners[0].kind, "CronTrigger");
        assert_eq!(
            cron_job.data.pointer("/spec/schedule"),
            Some(&serde_json::json!("*/5 * * * *"))
        );
        drop(cron_jobs);

        let marked = cluster.functions.lock().unwrap()["default/f1"].clone();
        assert!(has_finalizer(&marked.metadata, CRON_TRIGGER_FINALIZER));
    }

    #[tokio::test]
    async fn second_reconcile_is_a_no_op() {
        let cluster = Arc::new(FakeCluster::default());
        // Function already marked so the only possible write is the ensure
        let r = reconciler(
            vec![trigger("t1", "f1", true, false)],
            vec![function("f1", true)],
            cluster.clone(),
            working_resolver(),
        );
        r.reconcile("default/t1").await.unwrap();
        assert_eq!(*cluster.cron_job_writes.lock().unwrap(), 1);

        r.reconcile("default/t1").await.unwrap();
        assert_eq!(*cluster.cron_job_writes.lock().unwrap(), 1);
        assert_eq!(*cluster.function_writes.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn changed_schedule_updates_existing_cron_job() {
        let cluster = Arc::new(FakeCluster::default());
        let r = reconciler(
            vec![trigger("t1", "f1", true, false)],
            vec![function("f1", true)],
            cluster.clone(),
            working_resolver(),
        );
        r.reconcile("default/t1").await.unwrap();

        // Same trigger with a different schedule observed in the cache
        let mut changed = trigger("t1", "f1", true, false);
        changed.spec.schedule = "0 * * * *".to_string();
        let r = reconciler(
            vec![changed],
            vec![function("f1", true)],
            cluster.clone(),
            working_resolver(),
        );
        r.reconcile("default/t1").await.unwrap();

        assert_eq!(*cluster.cron_job_writes.lock().unwrap(), 2);
        let cron_jobs = cluster.cron_jobs.lock().unwrap();
        let cron_job = &cron_jobs[&format!("default/{}", cron_job_name("t1"))];
        assert_eq!(
            cron_job.data.pointer("/spec/schedule"),
            Some(&serde_json::json!("0 * * * *"))
        );
    }

    #[tokio::test]
    async fn deleting_trigger_releases_finalizer() {
        let cluster = Arc::new(FakeCluster::default());
        let r = reconciler(
            vec![trigger("t1", "f1", true, true)],
            vec![function("f1", true)],
            cluster.clone(),
            working_resolver(),
        );
        r.reconcile("default/t1").await.unwrap();

        let updated = cluster.triggers.lock().unwrap()["default/t1"].clone();
        assert!(!has_finalizer(&updated.metadata, CRON_TRIGGER_FINALIZER));
        // No direct CronJob deletion: the garbage collector owns that
        assert_eq!(*cluster.cron_job_writes.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn finalizer_is_never_added_during_deletion() {
        let cluster = Arc::new(FakeCluster::default());
        let r = reconciler(
            vec![trigger("t1", "f1", false, true)],
            vec![function("f1", true)],
            cluster.clone(),
            working_resolver(),
        );
        r.reconcile("default/t1").await.unwrap();
        // No write at all: a trigger past DeletingUnfinalized is left alone
        assert!(cluster.triggers.lock().unwrap().is_empty());
        assert!(cluster.cron_jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dangling_function_reference_fails_without_side_effects() {
        let cluster = Arc::new(FakeCluster::default());
        let r = reconciler(
            vec![trigger("t2", "missing-fn", true, false)],
            vec![],
            cluster.clone(),
            working_resolver(),
        );
        let err = r.reconcile("default/t2").await.unwrap_err();
        assert!(matches!(err, Error::FunctionNotFound { .. }));
        assert!(err.is_retryable());
        assert!(cluster.cron_jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unresolved_api_version_is_a_retryable_error() {
        let cluster = Arc::new(FakeCluster::default());
        let r = reconciler(
            vec![trigger("t1", "f1", true, false)],
            vec![function("f1", false)],
            cluster.clone(),
            FakeResolver { ar: None },
        );
        let err = r.reconcile("default/t1").await.unwrap_err();
        assert!(matches!(err, Error::VersionNotFound { .. }));
        assert!(err.is_retryable());
        assert!(cluster.cron_jobs.lock().unwrap().is_empty());
    }
}
