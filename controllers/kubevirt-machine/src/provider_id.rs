//! Node provider-ID reconciliation.
//!
//! Tags tenant `Node`s with `spec.providerID = kubevirt://<infra-ns>/<vmi>` once
//! the backing VirtualMachineInstance is visible on the infra cluster. The
//! identifier is written once and never revisited.

use crate::error::MachineError;
use infracluster_client::InfraClusterClientTrait;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tenantcluster_client::TenantClusterClientTrait;
use tracing::{debug, info, warn};

/// Scheme prefix of provider IDs issued for KubeVirt-backed nodes.
pub const PROVIDER_ID_SCHEME: &str = "kubevirt";

/// Retry delay while the shared cloud-provider config cannot be read.
pub const SHARED_CONFIG_RETRY: Duration = Duration::from_secs(60);

/// Provider ID of the instance `name` in infra namespace `namespace`.
pub fn format_provider_id(namespace: &str, name: &str) -> String {
    format!("{}://{}/{}", PROVIDER_ID_SCHEME, namespace, name)
}

/// Assigns provider IDs to tenant nodes.
pub struct ProviderIdReconciler {
    infra: Arc<dyn InfraClusterClientTrait>,
    tenant: Arc<dyn TenantClusterClientTrait>,
}

impl ProviderIdReconciler {
    /// Creates a reconciler over the given cluster clients.
    pub fn new(infra: Arc<dyn InfraClusterClientTrait>, tenant: Arc<dyn TenantClusterClientTrait>) -> Self {
        Self { infra, tenant }
    }

    /// Reconcile the node named `node_name`.
    pub async fn reconcile_node(&self, node_name: &str) -> Result<Action, MachineError> {
        debug!("Reconciling node {}", node_name);

        let node = match self.tenant.get_node(node_name).await {
            Ok(node) => node,
            Err(e) if e.is_not_found() => return Ok(Action::await_change()),
            Err(e) => return Err(e.into()),
        };

        if node.spec.as_ref().and_then(|s| s.provider_id.as_deref()).is_some_and(|id| !id.is_empty()) {
            return Ok(Action::await_change());
        }

        let shared = match self.tenant.get_shared_namespace_config().await {
            Ok(shared) => shared,
            Err(e) => {
                warn!(
                    "Node {}: cannot read shared cloud-provider config, retrying in {}s: {}",
                    node_name,
                    SHARED_CONFIG_RETRY.as_secs(),
                    e
                );
                return Ok(Action::requeue(SHARED_CONFIG_RETRY));
            }
        };

        info!("Node {}: spec.providerID is empty, looking up instance in {}", node_name, shared.namespace);
        let vmi = match self.infra.get_virtual_machine_instance(&shared.namespace, node_name).await {
            Ok(vmi) => vmi,
            Err(e) if e.is_not_found() => {
                debug!("Node {}: no instance in {} yet", node_name, shared.namespace);
                return Ok(Action::await_change());
            }
            Err(e) => return Err(e.into()),
        };

        let provider_id = format_provider_id(&shared.namespace, &vmi.name_any());
        self.tenant.set_node_provider_id(node_name, &provider_id).await?;
        info!("Node {}: set providerID {}", node_name, provider_id);

        Ok(Action::await_change())
    }
}
