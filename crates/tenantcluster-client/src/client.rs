//! Kubernetes-backed tenant cluster client.

use crate::error::TenantClusterError;
use crate::merge_patch;
use crate::shared_config::{parse_cloud_provider_config, SharedClusterConfig, CONFIG_MAP_NAME, CONFIG_MAP_NAMESPACE};
use crate::tenant_trait::{machine_patch, machine_status_patch, with_finalizer, without_finalizer, TenantClusterClientTrait};
use crds::Machine;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Secret};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

/// Client for the tenant cluster (the cluster the controller runs in).
#[derive(Clone)]
pub struct TenantClusterClient {
    client: Client,
}

impl TenantClusterClient {
    /// Wrap an existing kube client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn machines(&self, machine: &Machine) -> Api<Machine> {
        Api::namespaced(self.client.clone(), &machine.namespace().unwrap_or_default())
    }

    async fn patch_finalizers(&self, machine: &Machine, finalizers: Vec<String>) -> Result<Machine, TenantClusterError> {
        let name = machine.name_any();
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": machine.resource_version(),
            }
        });
        self.machines(machine)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| TenantClusterError::from_kube(e, &format!("Machine {}", name)))
    }
}

#[async_trait::async_trait]
impl TenantClusterClientTrait for TenantClusterClient {
    async fn get_shared_namespace_config(&self) -> Result<SharedClusterConfig, TenantClusterError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), CONFIG_MAP_NAMESPACE);
        let config_map = api.get(CONFIG_MAP_NAME).await.map_err(|e| {
            TenantClusterError::from_kube(e, &format!("ConfigMap {}/{}", CONFIG_MAP_NAMESPACE, CONFIG_MAP_NAME))
        })?;
        parse_cloud_provider_config(&config_map.data.unwrap_or_default())
    }

    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Secret, TenantClusterError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| TenantClusterError::from_kube(e, &format!("Secret {}/{}", namespace, name)))
    }

    async fn patch_machine(&self, machine: &Machine, original: &Machine) -> Result<Machine, TenantClusterError> {
        let patch = machine_patch(machine, original)?;
        if merge_patch::is_empty(&patch) {
            return Ok(machine.clone());
        }
        let name = machine.name_any();
        debug!("Patching Machine {}: {}", name, patch);
        self.machines(machine)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| TenantClusterError::from_kube(e, &format!("Machine {}", name)))
    }

    async fn patch_machine_status(&self, machine: &Machine, original: &Machine) -> Result<Machine, TenantClusterError> {
        let patch = machine_status_patch(machine, original)?;
        if merge_patch::is_empty(&patch) {
            return Ok(machine.clone());
        }
        let name = machine.name_any();
        debug!("Patching Machine {} status", name);
        self.machines(machine)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| TenantClusterError::from_kube(e, &format!("Machine {} status", name)))
    }

    async fn add_machine_finalizer(&self, machine: &Machine, finalizer: &str) -> Result<Machine, TenantClusterError> {
        match with_finalizer(machine, finalizer) {
            Some(finalizers) => self.patch_finalizers(machine, finalizers).await,
            None => Ok(machine.clone()),
        }
    }

    async fn remove_machine_finalizer(&self, machine: &Machine, finalizer: &str) -> Result<Machine, TenantClusterError> {
        match without_finalizer(machine, finalizer) {
            Some(finalizers) => self.patch_finalizers(machine, finalizers).await,
            None => Ok(machine.clone()),
        }
    }

    async fn get_node(&self, name: &str) -> Result<Node, TenantClusterError> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.get(name)
            .await
            .map_err(|e| TenantClusterError::from_kube(e, &format!("Node {}", name)))
    }

    async fn set_node_provider_id(&self, name: &str, provider_id: &str) -> Result<Node, TenantClusterError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let patch = json!({ "spec": { "providerID": provider_id } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| TenantClusterError::from_kube(e, &format!("Node {}", name)))
    }
}
