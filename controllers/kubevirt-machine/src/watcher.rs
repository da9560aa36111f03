//! Kubernetes resource watchers.
//!
//! Machines and Nodes on the tenant cluster are each driven by a
//! `kube_runtime::Controller` through the generic `watch_resource()` helper,
//! which keeps watching across reconnects and hands failures to a
//! per-resource error policy.

use crate::actuator::Actuator;
use crate::error::{ControllerError, MachineError};
use crate::provider_id::ProviderIdReconciler;
use crds::Machine;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{Api, ResourceExt};
use kube_runtime::{controller::{Action, Config as ControllerConfig}, watcher, Controller};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Requeue delay after a failed Node reconciliation.
const NODE_ERROR_REQUEUE: Duration = Duration::from_secs(30);

type ReconcileFuture = Pin<Box<dyn Future<Output = Result<Action, MachineError>> + Send>>;

/// Generic watcher helper around `kube_runtime::Controller`.
///
/// `reconcile_fn` drives one object; `error_policy` picks the requeue for a
/// failed one. The returned future only completes when the watch stream ends.
async fn watch_resource<K, C, F, P>(
    api: Api<K>,
    ctx: Arc<C>,
    reconcile_fn: F,
    error_policy: P,
    resource_name: &'static str,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + std::cmp::Eq + std::hash::Hash + Clone + std::fmt::Debug + Unpin,
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, Arc<K>) -> ReconcileFuture + Send + Sync + Clone + 'static,
    P: Fn(Arc<K>, &MachineError, Arc<C>) -> Action + Send + Sync + 'static,
{
    info!("Starting {} watcher", resource_name);

    let reconcile = move |obj: Arc<K>, ctx: Arc<C>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            debug!("Reconciling {} {}", resource_name, obj.name_any());
            reconcile_fn(ctx, obj).await.inspect_err(|e| {
                error!("Reconciliation failed for {}: {}", resource_name, e);
            })
        }
    };

    // Debounce batches bursts of status writes into one pass
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(1))
        .concurrency(5);

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error for {}: {}", resource_name, e);
            }
        })
        .await;

    Ok(())
}

/// Watches Machines and Nodes on the tenant cluster.
pub struct Watcher {
    actuator: Arc<Actuator>,
    provider_ids: Arc<ProviderIdReconciler>,
    machine_api: Api<Machine>,
    node_api: Api<Node>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        actuator: Arc<Actuator>,
        provider_ids: Arc<ProviderIdReconciler>,
        machine_api: Api<Machine>,
        node_api: Api<Node>,
    ) -> Self {
        Self {
            actuator,
            provider_ids,
            machine_api,
            node_api,
        }
    }

    /// Starts watching Machine resources.
    pub async fn watch_machines(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.machine_api.clone(),
            self.actuator.clone(),
            |actuator, machine| Box::pin(async move { actuator.reconcile(&machine).await }),
            |machine, error, actuator| actuator.error_action(&machine, error),
            "Machine",
        )
        .await
    }

    /// Starts watching Node resources.
    pub async fn watch_nodes(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.node_api.clone(),
            self.provider_ids.clone(),
            |reconciler, node| Box::pin(async move { reconciler.reconcile_node(&node.name_any()).await }),
            |node, error, _reconciler| {
                error!("Node {}: failed to assign providerID: {}", node.name_any(), error);
                Action::requeue(NODE_ERROR_REQUEUE)
            },
            "Node",
        )
        .await
    }
}
