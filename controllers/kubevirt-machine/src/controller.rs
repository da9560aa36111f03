//! Main controller implementation.
//!
//! Builds the clients for both clusters, wires the actuator and the
//! providerID reconciler to their watchers, and supervises the watch loops
//! together with the probe server.

use crate::actuator::Actuator;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::events::KubeEventPublisher;
use crate::probes::{self, ProbeState};
use crate::provider_id::ProviderIdReconciler;
use crate::vm_manager::VmManager;
use crate::watcher::Watcher;
use crds::Machine;
use infracluster_client::{InfraClusterClient, InfraClusterClientTrait};
use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client};
use std::sync::Arc;
use tenantcluster_client::{TenantClusterClient, TenantClusterClientTrait};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Name the controller reports Events under.
pub const CONTROLLER_NAME: &str = "kubevirt-machine-controller";

/// Main controller for KubeVirt-backed Machines.
pub struct Controller {
    machine_watcher: JoinHandle<Result<(), ControllerError>>,
    node_watcher: JoinHandle<Result<(), ControllerError>>,
    probe_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing KubeVirt Machine Controller");

        let probe_state = ProbeState::new();
        let probe_server = tokio::spawn(probes::serve(config.probe_addr, probe_state.clone()));

        // Tenant cluster: in-cluster config or the ambient kubeconfig
        let kube_client = Client::try_default().await?;

        let infra = InfraClusterClient::from_kubeconfig(&config.infra_kubeconfig)
            .await
            .inspect_err(|e| error!("Failed to build infra cluster client: {}", e))?;
        let infra: Arc<dyn InfraClusterClientTrait> = Arc::new(infra);
        let tenant: Arc<dyn TenantClusterClientTrait> = Arc::new(TenantClusterClient::new(kube_client.clone()));

        let vm_manager = Arc::new(VmManager::new(infra.clone(), config.grace_window));
        let events = Arc::new(KubeEventPublisher::new(kube_client.clone(), CONTROLLER_NAME));
        let actuator = Arc::new(Actuator::new(vm_manager, tenant.clone(), events, config.resync_period));
        let provider_ids = Arc::new(ProviderIdReconciler::new(infra, tenant));

        let machine_api: Api<Machine> = match config.watch_namespace.as_deref() {
            Some(ns) => Api::namespaced(kube_client.clone(), ns),
            None => Api::all(kube_client.clone()),
        };
        let node_api: Api<Node> = Api::all(kube_client);

        let watcher = Arc::new(Watcher::new(actuator, provider_ids, machine_api, node_api));

        let machine_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_machines().await })
        };
        let node_watcher = tokio::spawn(async move { watcher.watch_nodes().await });

        probe_state.set_ready(true);
        info!("Controller initialized, watching Machines and Nodes");

        Ok(Self {
            machine_watcher,
            node_watcher,
            probe_server,
        })
    }

    /// Runs until any supervised task exits.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Controller running");

        tokio::select! {
            result = self.machine_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Machine watcher panicked: {}", e)))??;
                Err(ControllerError::Watch("Machine watcher stopped".to_string()))
            }
            result = self.node_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Node watcher panicked: {}", e)))??;
                Err(ControllerError::Watch("Node watcher stopped".to_string()))
            }
            result = self.probe_server => {
                result.map_err(|e| ControllerError::Watch(format!("Probe server panicked: {}", e)))?
            }
        }
    }
}
