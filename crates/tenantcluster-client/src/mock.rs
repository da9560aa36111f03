//! Mock TenantClusterClient for unit testing
//!
//! Machines are stored as JSON and patched with real merge-patch semantics so
//! tests observe exactly what a pass would have written to the API server.

use crate::error::TenantClusterError;
use crate::shared_config::{parse_cloud_provider_config, SharedClusterConfig, CONFIG_MAP_NAME, CONFIG_MAP_NAMESPACE};
use crate::tenant_trait::{machine_patch, machine_status_patch, with_finalizer, without_finalizer, TenantClusterClientTrait};
use crds::Machine;
use k8s_openapi::api::core::v1::{Node, NodeSpec, Secret};
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

type Key = (String, String);

/// Mock TenantClusterClient for testing
#[derive(Clone, Default)]
pub struct MockTenantClusterClient {
    machines: Arc<Mutex<HashMap<Key, Machine>>>,
    nodes: Arc<Mutex<HashMap<String, Node>>>,
    secrets: Arc<Mutex<HashMap<Key, Secret>>>,
    shared_config: Arc<Mutex<Option<BTreeMap<String, String>>>>,
    failures: Arc<Mutex<HashMap<&'static str, String>>>,
    calls: Arc<Mutex<HashMap<&'static str, usize>>>,
    next_resource_version: Arc<Mutex<u64>>,
}

impl MockTenantClusterClient {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the shared cloud-provider config with a JSON `config` document
    pub fn set_shared_config(&self, namespace: &str, infra_id: &str) {
        let document = serde_json::json!({ "namespace": namespace, "infraID": infra_id }).to_string();
        self.set_shared_config_data(BTreeMap::from([("config".to_string(), document)]));
    }

    /// Publish raw ConfigMap data
    pub fn set_shared_config_data(&self, data: BTreeMap<String, String>) {
        *self.shared_config.lock().unwrap() = Some(data);
    }

    /// Add a Machine (for test setup); assigns a resourceVersion
    pub fn add_machine(&self, mut machine: Machine) -> Machine {
        machine.metadata.resource_version = Some(self.bump_resource_version());
        let key = (machine.namespace().unwrap_or_default(), machine.name_any());
        self.machines.lock().unwrap().insert(key, machine.clone());
        machine
    }

    /// Stored Machine, if any
    pub fn machine(&self, namespace: &str, name: &str) -> Option<Machine> {
        self.machines
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Add a Node (for test setup)
    pub fn add_node(&self, node: Node) {
        self.nodes.lock().unwrap().insert(node.name_any(), node);
    }

    /// Stored Node, if any
    pub fn node(&self, name: &str) -> Option<Node> {
        self.nodes.lock().unwrap().get(name).cloned()
    }

    /// Add a Secret (for test setup)
    pub fn add_secret(&self, secret: Secret) {
        let key = (secret.namespace().unwrap_or_default(), secret.name_any());
        self.secrets.lock().unwrap().insert(key, secret);
    }

    /// Make every call to `operation` (trait method name) fail with an API error
    pub fn fail_operation(&self, operation: &'static str, message: impl Into<String>) {
        self.failures.lock().unwrap().insert(operation, message.into());
    }

    /// Number of calls made to `operation`
    pub fn call_count(&self, operation: &'static str) -> usize {
        self.calls.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    fn record(&self, operation: &'static str) -> Result<(), TenantClusterError> {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
        match self.failures.lock().unwrap().get(operation) {
            Some(message) => Err(TenantClusterError::Api(message.clone())),
            None => Ok(()),
        }
    }

    fn bump_resource_version(&self) -> String {
        let mut rv = self.next_resource_version.lock().unwrap();
        *rv += 1;
        rv.to_string()
    }

    fn apply_machine_patch(&self, machine: &Machine, patch: &serde_json::Value) -> Result<Machine, TenantClusterError> {
        let key = (machine.namespace().unwrap_or_default(), machine.name_any());
        let mut machines = self.machines.lock().unwrap();
        let stored = machines
            .get_mut(&key)
            .ok_or_else(|| TenantClusterError::NotFound(format!("Machine {}/{}", key.0, key.1)))?;
        if let Some(rv) = patch.pointer("/metadata/resourceVersion").and_then(|v| v.as_str()) {
            if stored.metadata.resource_version.as_deref() != Some(rv) {
                return Err(TenantClusterError::Conflict(format!("Machine {}/{}: resourceVersion {} is stale", key.0, key.1, rv)));
            }
        }
        let mut value = serde_json::to_value(&*stored)?;
        json_patch::merge(&mut value, patch);
        let mut patched: Machine = serde_json::from_value(value)?;
        if patched != *stored {
            patched.metadata.resource_version = Some(self.bump_resource_version());
        }
        *stored = patched.clone();
        Ok(patched)
    }
}

#[async_trait::async_trait]
impl TenantClusterClientTrait for MockTenantClusterClient {
    async fn get_shared_namespace_config(&self) -> Result<SharedClusterConfig, TenantClusterError> {
        self.record("get_shared_namespace_config")?;
        let data = self.shared_config.lock().unwrap().clone().ok_or_else(|| {
            TenantClusterError::NotFound(format!("ConfigMap {}/{}", CONFIG_MAP_NAMESPACE, CONFIG_MAP_NAME))
        })?;
        parse_cloud_provider_config(&data)
    }

    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Secret, TenantClusterError> {
        self.record("get_secret")?;
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| TenantClusterError::NotFound(format!("Secret {}/{}", namespace, name)))
    }

    async fn patch_machine(&self, machine: &Machine, original: &Machine) -> Result<Machine, TenantClusterError> {
        self.record("patch_machine")?;
        let patch = machine_patch(machine, original)?;
        self.apply_machine_patch(machine, &patch)
    }

    async fn patch_machine_status(&self, machine: &Machine, original: &Machine) -> Result<Machine, TenantClusterError> {
        self.record("patch_machine_status")?;
        let patch = machine_status_patch(machine, original)?;
        self.apply_machine_patch(machine, &patch)
    }

    async fn add_machine_finalizer(&self, machine: &Machine, finalizer: &str) -> Result<Machine, TenantClusterError> {
        self.record("add_machine_finalizer")?;
        match with_finalizer(machine, finalizer) {
            Some(finalizers) => self.apply_machine_patch(
                machine,
                &serde_json::json!({ "metadata": { "finalizers": finalizers, "resourceVersion": machine.resource_version() } }),
            ),
            None => Ok(machine.clone()),
        }
    }

    async fn remove_machine_finalizer(&self, machine: &Machine, finalizer: &str) -> Result<Machine, TenantClusterError> {
        self.record("remove_machine_finalizer")?;
        match without_finalizer(machine, finalizer) {
            Some(finalizers) => self.apply_machine_patch(
                machine,
                &serde_json::json!({ "metadata": { "finalizers": finalizers, "resourceVersion": machine.resource_version() } }),
            ),
            None => Ok(machine.clone()),
        }
    }

    async fn get_node(&self, name: &str) -> Result<Node, TenantClusterError> {
        self.record("get_node")?;
        self.node(name)
            .ok_or_else(|| TenantClusterError::NotFound(format!("Node {}", name)))
    }

    async fn set_node_provider_id(&self, name: &str, provider_id: &str) -> Result<Node, TenantClusterError> {
        self.record("set_node_provider_id")?;
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes
            .get_mut(name)
            .ok_or_else(|| TenantClusterError::NotFound(format!("Node {}", name)))?;
        node.spec.get_or_insert_with(NodeSpec::default).provider_id = Some(provider_id.to_string());
        Ok(node.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{MachineSpec, MachineStatus};

    fn machine() -> Machine {
        let mut machine = Machine::new("worker-0", MachineSpec::default());
        machine.metadata.namespace = Some("openshift-machine-api".to_string());
        machine
    }

    #[tokio::test]
    async fn test_status_patch_only_touches_status() {
        let client = MockTenantClusterClient::new();
        let original = client.add_machine(machine());
        let mut modified = original.clone();
        modified.labels_mut().insert("ignored".to_string(), "by-status-patch".to_string());
        modified.status = Some(MachineStatus { phase: Some("Running".to_string()), ..Default::default() });

        let patched = client.patch_machine_status(&modified, &original).await.unwrap();
        assert_eq!(patched.status.unwrap().phase.as_deref(), Some("Running"));
        assert!(patched.metadata.labels.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_status_patch_clears_removed_fields() {
        let client = MockTenantClusterClient::new();
        let mut broken = machine();
        broken.status = Some(MachineStatus {
            phase: Some("Provisioning".to_string()),
            error_reason: Some("InvalidConfiguration".to_string()),
            error_message: Some("bad spec".to_string()),
            ..Default::default()
        });
        let original = client.add_machine(broken);
        let mut modified = original.clone();
        if let Some(status) = modified.status.as_mut() {
            status.error_reason = None;
            status.error_message = None;
        }

        let patched = client.patch_machine_status(&modified, &original).await.unwrap();
        let status = patched.status.unwrap();
        assert_eq!(status.error_reason, None);
        assert_eq!(status.error_message, None);
        assert_eq!(status.phase.as_deref(), Some("Provisioning"));
    }

    #[tokio::test]
    async fn test_unchanged_patch_keeps_resource_version() {
        let client = MockTenantClusterClient::new();
        let original = client.add_machine(machine());
        let patched = client.patch_machine(&original, &original).await.unwrap();
        assert_eq!(patched.metadata.resource_version, original.metadata.resource_version);
    }

    #[tokio::test]
    async fn test_finalizer_add_is_idempotent() {
        let client = MockTenantClusterClient::new();
        let original = client.add_machine(machine());
        let once = client.add_machine_finalizer(&original, "f").await.unwrap();
        let twice = client.add_machine_finalizer(&once, "f").await.unwrap();
        assert_eq!(twice.finalizers(), ["f".to_string()]);
    }

    #[tokio::test]
    async fn test_finalizer_patch_with_stale_version_conflicts() {
        let client = MockTenantClusterClient::new();
        let original = client.add_machine(machine());
        client.add_machine_finalizer(&original, "a").await.unwrap();
        let err = client.add_machine_finalizer(&original, "b").await.unwrap_err();
        assert!(matches!(err, TenantClusterError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_missing_shared_config_is_not_found() {
        let client = MockTenantClusterClient::new();
        let err = client.get_shared_namespace_config().await.unwrap_err();
        assert!(err.is_not_found());
    }
}
