//! TenantClusterClient trait for mocking

use crate::error::TenantClusterError;
use crate::shared_config::SharedClusterConfig;
use crds::Machine;
use k8s_openapi::api::core::v1::{Node, Secret};

/// Capability interface for the tenant cluster.
#[async_trait::async_trait]
pub trait TenantClusterClientTrait: Send + Sync {
    /// Read the infra namespace and infra ID from the shared cloud-provider ConfigMap.
    async fn get_shared_namespace_config(&self) -> Result<SharedClusterConfig, TenantClusterError>;

    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Secret, TenantClusterError>;

    /// Merge-patch everything but status from `original` to `machine`.
    async fn patch_machine(&self, machine: &Machine, original: &Machine) -> Result<Machine, TenantClusterError>;

    /// Merge-patch the status subresource from `original` to `machine`.
    async fn patch_machine_status(&self, machine: &Machine, original: &Machine) -> Result<Machine, TenantClusterError>;

    /// Add `finalizer` unless present; guarded by the machine's resourceVersion.
    async fn add_machine_finalizer(&self, machine: &Machine, finalizer: &str) -> Result<Machine, TenantClusterError>;

    /// Remove `finalizer` if present; guarded by the machine's resourceVersion.
    async fn remove_machine_finalizer(&self, machine: &Machine, finalizer: &str) -> Result<Machine, TenantClusterError>;

    async fn get_node(&self, name: &str) -> Result<Node, TenantClusterError>;

    async fn set_node_provider_id(&self, name: &str, provider_id: &str) -> Result<Node, TenantClusterError>;
}

/// Finalizer list after adding `finalizer`, or `None` when already present.
pub(crate) fn with_finalizer(machine: &Machine, finalizer: &str) -> Option<Vec<String>> {
    let mut finalizers = machine.metadata.finalizers.clone().unwrap_or_default();
    if finalizers.iter().any(|f| f == finalizer) {
        return None;
    }
    finalizers.push(finalizer.to_string());
    Some(finalizers)
}

/// Finalizer list after removing `finalizer`, or `None` when absent.
pub(crate) fn without_finalizer(machine: &Machine, finalizer: &str) -> Option<Vec<String>> {
    let finalizers = machine.metadata.finalizers.clone().unwrap_or_default();
    if !finalizers.iter().any(|f| f == finalizer) {
        return None;
    }
    Some(finalizers.into_iter().filter(|f| f != finalizer).collect())
}

/// Merge patch of the non-status part of a machine.
pub(crate) fn machine_patch(machine: &Machine, original: &Machine) -> Result<serde_json::Value, TenantClusterError> {
    let mut from = serde_json::to_value(original)?;
    let mut to = serde_json::to_value(machine)?;
    for value in [&mut from, &mut to] {
        if let Some(fields) = value.as_object_mut() {
            fields.remove("status");
        }
    }
    Ok(crate::merge_patch::diff(&from, &to))
}

/// Merge patch of a machine's status, rooted at `status`.
pub(crate) fn machine_status_patch(machine: &Machine, original: &Machine) -> Result<serde_json::Value, TenantClusterError> {
    let from = serde_json::to_value(&original.status)?;
    let to = serde_json::to_value(&machine.status)?;
    let status = crate::merge_patch::diff(&from, &to);
    if crate::merge_patch::is_empty(&status) {
        return Ok(status);
    }
    Ok(serde_json::json!({ "status": status }))
}
