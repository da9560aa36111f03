//! Mock InfraClusterClient for unit testing
//!
//! In-memory stand-in for the infrastructure cluster. It mimics the parts of
//! API server behaviour the machine provider depends on: name uniqueness on
//! create, resourceVersion bumps only on real changes, resourceVersion
//! preconditions on update, and not-found reads after delete.

use crate::error::InfraClusterError;
use crate::infra_trait::InfraClusterClientTrait;
use crds::{VirtualMachine, VirtualMachineInstance};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Mock InfraClusterClient for testing
#[derive(Clone, Default)]
pub struct MockInfraClusterClient {
    vms: Arc<Mutex<HashMap<Key, VirtualMachine>>>,
    vmis: Arc<Mutex<HashMap<Key, VirtualMachineInstance>>>,
    secrets: Arc<Mutex<HashMap<Key, Secret>>>,
    // Operation name -> error returned by every call to it
    failures: Arc<Mutex<HashMap<&'static str, (fn(String) -> InfraClusterError, String)>>>,
    // VirtualMachines as submitted to update, in call order
    submitted_updates: Arc<Mutex<Vec<VirtualMachine>>>,
    calls: Arc<Mutex<HashMap<&'static str, usize>>>,
    next_resource_version: Arc<Mutex<u64>>,
}

impl MockInfraClusterClient {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a VirtualMachine (for test setup); assigns a resourceVersion
    pub fn add_virtual_machine(&self, mut vm: VirtualMachine) {
        vm.metadata.resource_version = Some(self.bump_resource_version());
        let k = key(&vm.namespace().unwrap_or_default(), &vm.name_any());
        self.vms.lock().unwrap().insert(k, vm);
    }

    /// Seed a VirtualMachineInstance (for test setup)
    pub fn add_virtual_machine_instance(&self, vmi: VirtualMachineInstance) {
        let k = key(&vmi.namespace().unwrap_or_default(), &vmi.name_any());
        self.vmis.lock().unwrap().insert(k, vmi);
    }

    /// Remove a VirtualMachine behind the provider's back
    pub fn remove_virtual_machine(&self, namespace: &str, name: &str) {
        self.vms.lock().unwrap().remove(&key(namespace, name));
    }

    /// Stored VirtualMachine, if any
    pub fn virtual_machine(&self, namespace: &str, name: &str) -> Option<VirtualMachine> {
        self.vms.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Stored Secret, if any
    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Make every call to `operation` (trait method name) fail with an API error
    pub fn fail_operation(&self, operation: &'static str, message: impl Into<String>) {
        self.fail_operation_with(operation, InfraClusterError::Api, message);
    }

    /// Make every call to `operation` fail with the error built by `kind`
    pub fn fail_operation_with(
        &self,
        operation: &'static str,
        kind: fn(String) -> InfraClusterError,
        message: impl Into<String>,
    ) {
        self.failures.lock().unwrap().insert(operation, (kind, message.into()));
    }

    /// VirtualMachines passed to `update_virtual_machine`, including rejected ones
    pub fn submitted_updates(&self) -> Vec<VirtualMachine> {
        self.submitted_updates.lock().unwrap().clone()
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Number of calls made to `operation`
    pub fn call_count(&self, operation: &'static str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    fn record(&self, operation: &'static str) -> Result<(), InfraClusterError> {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
        match self.failures.lock().unwrap().get(operation) {
            Some((kind, message)) => Err(kind(message.clone())),
            None => Ok(()),
        }
    }

    fn bump_resource_version(&self) -> String {
        let mut rv = self.next_resource_version.lock().unwrap();
        *rv += 1;
        rv.to_string()
    }
}

#[async_trait::async_trait]
impl InfraClusterClientTrait for MockInfraClusterClient {
    async fn create_virtual_machine(&self, namespace: &str, vm: &VirtualMachine) -> Result<VirtualMachine, InfraClusterError> {
        self.record("create_virtual_machine")?;
        let k = key(namespace, &vm.name_any());
        let mut vms = self.vms.lock().unwrap();
        if vms.contains_key(&k) {
            return Err(InfraClusterError::AlreadyExists(format!("VirtualMachine {}/{}", k.0, k.1)));
        }
        let mut created = vm.clone();
        created.metadata.namespace = Some(namespace.to_string());
        created.metadata.resource_version = Some(self.bump_resource_version());
        created.status = None;
        vms.insert(k, created.clone());
        Ok(created)
    }

    async fn get_virtual_machine(&self, namespace: &str, name: &str) -> Result<VirtualMachine, InfraClusterError> {
        self.record("get_virtual_machine")?;
        self.vms
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| InfraClusterError::NotFound(format!("VirtualMachine {}/{}", namespace, name)))
    }

    async fn update_virtual_machine(&self, namespace: &str, vm: &VirtualMachine) -> Result<VirtualMachine, InfraClusterError> {
        self.submitted_updates.lock().unwrap().push(vm.clone());
        self.record("update_virtual_machine")?;
        let k = key(namespace, &vm.name_any());
        let mut vms = self.vms.lock().unwrap();
        let stored = vms
            .get_mut(&k)
            .ok_or_else(|| InfraClusterError::NotFound(format!("VirtualMachine {}/{}", k.0, k.1)))?;
        if let Some(rv) = &vm.metadata.resource_version {
            if stored.metadata.resource_version.as_ref() != Some(rv) {
                return Err(InfraClusterError::Conflict(format!(
                    "VirtualMachine {}/{}: resourceVersion {} is stale",
                    k.0, k.1, rv
                )));
            }
        }
        let unchanged = stored.spec == vm.spec
            && stored.metadata.labels == vm.metadata.labels
            && stored.metadata.annotations == vm.metadata.annotations;
        if !unchanged {
            // Status is a subresource: a replace never changes it.
            stored.spec = vm.spec.clone();
            stored.metadata.labels = vm.metadata.labels.clone();
            stored.metadata.annotations = vm.metadata.annotations.clone();
            stored.metadata.resource_version = Some(self.bump_resource_version());
        }
        Ok(stored.clone())
    }

    async fn delete_virtual_machine(&self, namespace: &str, name: &str, _grace_period_seconds: u32) -> Result<(), InfraClusterError> {
        self.record("delete_virtual_machine")?;
        let k = key(namespace, name);
        self.vms
            .lock()
            .unwrap()
            .remove(&k)
            .ok_or_else(|| InfraClusterError::NotFound(format!("VirtualMachine {}/{}", namespace, name)))?;
        self.vmis.lock().unwrap().remove(&k);
        Ok(())
    }

    async fn get_virtual_machine_instance(&self, namespace: &str, name: &str) -> Result<VirtualMachineInstance, InfraClusterError> {
        self.record("get_virtual_machine_instance")?;
        self.vmis
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| InfraClusterError::NotFound(format!("VirtualMachineInstance {}/{}", namespace, name)))
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, InfraClusterError> {
        self.record("create_secret")?;
        let k = key(namespace, &secret.name_any());
        let mut secrets = self.secrets.lock().unwrap();
        if secrets.contains_key(&k) {
            return Err(InfraClusterError::AlreadyExists(format!("Secret {}/{}", k.0, k.1)));
        }
        let mut created = secret.clone();
        created.metadata.namespace = Some(namespace.to_string());
        created.metadata.resource_version = Some(self.bump_resource_version());
        secrets.insert(k, created.clone());
        Ok(created)
    }
}
