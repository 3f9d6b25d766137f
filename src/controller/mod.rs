//! # Controller
//!
//! Wiring for the cron trigger control loop.
//!
//! Two watch streams feed the system: trigger events are reduced to keys
//! and pushed through the work queue, function events go straight to the
//! synchronizer. Worker loops drain the queue and run the reconciler,
//! enforcing the retry ceiling. Nothing here mutates shared state from a
//! watch callback; the queue is the only rendezvous point.
//!
//! Processing does not begin until both reflector caches have delivered
//! their initial listing, so the reconciler never acts on a
//! partially-populated view of the cluster.

pub mod client;
pub mod cronjob;
pub mod function_sync;
pub mod reconciler;

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::Api;
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::Client;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::ControllerConfig;
use crate::controller::client::{ClusterWriter, KubeClusterWriter};
use crate::controller::function_sync::FunctionSynchronizer;
use crate::controller::reconciler::Reconciler;
use crate::crd::{CronTrigger, Function};
use crate::discovery::{ApiVersionResolver, DiscoveryResolver};
use crate::observability::metrics;
use crate::queue::WorkQueue;
use crate::server::ServerState;

/// `namespace/name` queue key for a watched object.
fn object_key(meta: &ObjectMeta) -> Option<String> {
    Some(format!("{}/{}", meta.namespace.as_deref()?, meta.name.as_deref()?))
}

/// Pull one key off the queue and reconcile it, applying the retry policy.
/// Returns false once the queue has shut down.
pub(crate) async fn process_next(
    queue: &Arc<WorkQueue>,
    reconciler: &Reconciler,
    max_retries: u32,
) -> bool {
    let Some(key) = queue.next().await else {
        return false;
    };
    metrics::increment_reconciliations();
    let start = Instant::now();

    match reconciler.reconcile(&key).await {
        Ok(()) => {
            queue.forget(&key);
        }
        Err(err) => {
            metrics::increment_reconciliation_errors();
            let attempts = queue.num_requeues(&key) + 1;
            if err.is_retryable() && attempts < max_retries {
                warn!(key, error = %err, attempt = attempts, "reconciliation failed, will retry");
                metrics::increment_requeues();
                queue.requeue_rate_limited(&key);
            } else {
                // Surfaced to logs/metrics, never escalated to a crash;
                // unrelated keys keep flowing
                error!(key, error = %err, attempts, "reconciliation failed, giving up");
                metrics::increment_give_ups();
                queue.forget(&key);
            }
        }
    }

    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    queue.done(&key);
    metrics::set_queue_depth(queue.len() as i64);
    true
}

/// Run the controller until a shutdown signal arrives.
///
/// In-flight reconciliations are allowed to finish on shutdown rather
/// than being cancelled mid-write, so finalizer updates are never left
/// half-applied.
pub async fn run(
    client: Client,
    config: ControllerConfig,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let queue = WorkQueue::new(config.requeue_base_delay, config.requeue_max_delay);
    let (trigger_store, trigger_store_writer) = reflector::store();
    let (function_store, function_store_writer) = reflector::store();

    let writer: Arc<dyn ClusterWriter> = Arc::new(KubeClusterWriter::new(client.clone()));
    let resolver: Arc<dyn ApiVersionResolver> = Arc::new(DiscoveryResolver::new(client.clone()));
    let reconciler = Arc::new(Reconciler::new(
        trigger_store.clone(),
        function_store.clone(),
        Arc::clone(&writer),
        Arc::clone(&resolver),
        config.clone(),
    ));
    let synchronizer = Arc::new(FunctionSynchronizer::new(writer, resolver));

    info!("starting cron trigger controller");

    // Trigger notifications carry keys only; the reconciler re-reads
    // current state from the cache when the key is processed
    let trigger_api: Api<CronTrigger> = Api::all(client.clone());
    let trigger_queue = Arc::clone(&queue);
    let trigger_watch = tokio::spawn(async move {
        reflector(
            trigger_store_writer,
            watcher(trigger_api, watcher::Config::default().any_semantic()).default_backoff(),
        )
        .touched_objects()
        .for_each(|event| {
            match event {
                Ok(trigger) => {
                    if let Some(key) = object_key(&trigger.metadata) {
                        trigger_queue.add(&key);
                        metrics::set_queue_depth(trigger_queue.len() as i64);
                    }
                }
                Err(err) => warn!(error = %err, "trigger watch error"),
            }
            futures::future::ready(())
        })
        .await;
    });

    // Function events bypass the queue: the synchronizer only reacts, it
    // does not converge iteratively
    let function_api: Api<Function> = Api::all(client.clone());
    let event_synchronizer = Arc::clone(&synchronizer);
    let function_watch = tokio::spawn(async move {
        reflector(
            function_store_writer,
            watcher(function_api, watcher::Config::default().any_semantic()).default_backoff(),
        )
        .touched_objects()
        .for_each(|event| {
            let synchronizer = Arc::clone(&event_synchronizer);
            async move {
                match event {
                    Ok(function) => {
                        if let Err(err) = synchronizer.handle(&function).await {
                            warn!(error = %err, "function cleanup failed, awaiting watch redelivery");
                        }
                    }
                    Err(err) => warn!(error = %err, "function watch error"),
                }
            }
        })
        .await;
    });

    // Gate workers on the initial listing of both watched kinds
    trigger_store.wait_until_ready().await?;
    function_store.wait_until_ready().await?;
    info!("caches synced, cron trigger controller ready");
    server_state.set_ready(true);

    let mut workers = JoinSet::new();
    for _ in 0..config.workers.max(1) {
        let queue = Arc::clone(&queue);
        let reconciler = Arc::clone(&reconciler);
        let max_retries = config.max_retries;
        workers.spawn(async move {
            while process_next(&queue, &reconciler, max_retries).await {}
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal, draining in-flight work");
    server_state.set_ready(false);
    queue.shut_down();
    while workers.join_next().await.is_some() {}
    trigger_watch.abort();
    function_watch.abort();
    info!("cron trigger controller stopped");
    Ok(())
}
