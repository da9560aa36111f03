//! Kubernetes-backed infrastructure cluster client.

use crate::error::InfraClusterError;
use crate::infra_trait::InfraClusterClientTrait;
use crds::{VirtualMachine, VirtualMachineInstance};
use k8s_openapi::api::core::v1::Secret;
use kube::api::{DeleteParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use std::path::Path;
use tracing::debug;

/// Client for the infrastructure cluster, built once at startup and shared.
#[derive(Clone)]
pub struct InfraClusterClient {
    client: Client,
}

impl InfraClusterClient {
    /// Wrap an existing kube client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from a kubeconfig file pointing at the infra cluster.
    pub async fn from_kubeconfig(path: impl AsRef<Path>) -> Result<Self, InfraClusterError> {
        let path = path.as_ref();
        let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
            InfraClusterError::Config(format!("failed to read kubeconfig {}: {}", path.display(), e))
        })?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| InfraClusterError::Config(format!("invalid kubeconfig {}: {}", path.display(), e)))?;
        let client = Client::try_from(config)?;
        Ok(Self::new(client))
    }

    fn vms(&self, namespace: &str) -> Api<VirtualMachine> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn vmis(&self, namespace: &str) -> Api<VirtualMachineInstance> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl InfraClusterClientTrait for InfraClusterClient {
    async fn create_virtual_machine(&self, namespace: &str, vm: &VirtualMachine) -> Result<VirtualMachine, InfraClusterError> {
        let what = format!("VirtualMachine {}/{}", namespace, vm.name_any());
        debug!("Creating {}", what);
        self.vms(namespace)
            .create(&PostParams::default(), vm)
            .await
            .map_err(|e| InfraClusterError::from_kube(e, &what))
    }

    async fn get_virtual_machine(&self, namespace: &str, name: &str) -> Result<VirtualMachine, InfraClusterError> {
        self.vms(namespace)
            .get(name)
            .await
            .map_err(|e| InfraClusterError::from_kube(e, &format!("VirtualMachine {}/{}", namespace, name)))
    }

    async fn update_virtual_machine(&self, namespace: &str, vm: &VirtualMachine) -> Result<VirtualMachine, InfraClusterError> {
        let name = vm.name_any();
        let what = format!("VirtualMachine {}/{}", namespace, name);
        debug!("Replacing {} at resourceVersion {:?}", what, vm.metadata.resource_version);
        self.vms(namespace)
            .replace(&name, &PostParams::default(), vm)
            .await
            .map_err(|e| InfraClusterError::from_kube(e, &what))
    }

    async fn delete_virtual_machine(&self, namespace: &str, name: &str, grace_period_seconds: u32) -> Result<(), InfraClusterError> {
        let params = DeleteParams::default().grace_period(grace_period_seconds);
        self.vms(namespace)
            .delete(name, &params)
            .await
            .map(|_| ())
            .map_err(|e| InfraClusterError::from_kube(e, &format!("VirtualMachine {}/{}", namespace, name)))
    }

    async fn get_virtual_machine_instance(&self, namespace: &str, name: &str) -> Result<VirtualMachineInstance, InfraClusterError> {
        self.vmis(namespace)
            .get(name)
            .await
            .map_err(|e| InfraClusterError::from_kube(e, &format!("VirtualMachineInstance {}/{}", namespace, name)))
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, InfraClusterError> {
        let what = format!("Secret {}/{}", namespace, secret.name_any());
        debug!("Creating {}", what);
        self.secrets(namespace)
            .create(&PostParams::default(), secret)
            .await
            .map_err(|e| InfraClusterError::from_kube(e, &what))
    }
}
