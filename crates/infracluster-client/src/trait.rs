//! InfraClusterClient trait for mocking
//!
//! Abstracts the infrastructure cluster so the machine provider can be
//! exercised against an in-memory implementation in unit tests.

use crate::error::InfraClusterError;
use crds::{VirtualMachine, VirtualMachineInstance};
use k8s_openapi::api::core::v1::Secret;

/// Capability interface for the infrastructure cluster.
///
/// Every call is a single round trip; not-found and already-exists outcomes are
/// reported as the matching [`InfraClusterError`] variants so callers can give
/// them operation-specific meaning.
#[async_trait::async_trait]
pub trait InfraClusterClientTrait: Send + Sync {
    async fn create_virtual_machine(&self, namespace: &str, vm: &VirtualMachine) -> Result<VirtualMachine, InfraClusterError>;
    async fn get_virtual_machine(&self, namespace: &str, name: &str) -> Result<VirtualMachine, InfraClusterError>;
    /// Replace the VM; `vm.metadata.resource_version` acts as a precondition when set.
    async fn update_virtual_machine(&self, namespace: &str, vm: &VirtualMachine) -> Result<VirtualMachine, InfraClusterError>;
    async fn delete_virtual_machine(&self, namespace: &str, name: &str, grace_period_seconds: u32) -> Result<(), InfraClusterError>;
    async fn get_virtual_machine_instance(&self, namespace: &str, name: &str) -> Result<VirtualMachineInstance, InfraClusterError>;
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, InfraClusterError>;
}
