//! Test utilities for unit testing the machine provider
//!
//! Builders for tenant and infra objects plus a scope/actuator setup over the
//! mock clients.

#[cfg(test)]
use crate::events::EventPublisher;
#[cfg(test)]
use crate::machine_scope::MachineScope;
#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::api::core::v1::{Node, NodeSpec, ObjectReference, Secret};
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
#[cfg(test)]
use k8s_openapi::ByteString;
#[cfg(test)]
use kube::runtime::events::EventType;
#[cfg(test)]
use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::{Arc, Mutex};
#[cfg(test)]
use tenantcluster_client::MockTenantClusterClient;

/// Namespace of test machines on the tenant cluster
#[cfg(test)]
pub const MACHINE_NAMESPACE: &str = "openshift-machine-api";
/// Infra namespace published in the shared config
#[cfg(test)]
pub const INFRA_NAMESPACE: &str = "tenant-infra";
/// Infra ID published in the shared config
#[cfg(test)]
pub const INFRA_ID: &str = "ocp-x7k2";

/// Provider spec used by [`create_test_machine`]
#[cfg(test)]
pub fn test_provider_spec() -> serde_json::Value {
    serde_json::json!({
        "sourcePvcName": "rhcos-4-16",
        "ignitionSecretName": "worker-user-data",
        "networkName": "tenant-net",
        "requestedMemory": "8Gi",
        "requestedCPU": 4,
        "requestedStorage": "120Gi",
        "storageClassName": "ceph-rbd"
    })
}

/// Helper to create a test Machine with the given provider spec
#[cfg(test)]
pub fn create_test_machine_with_spec(name: &str, provider_spec: Option<serde_json::Value>) -> Machine {
    Machine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(MACHINE_NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([
                (MACHINE_CLUSTER_ID_LABEL.to_string(), INFRA_ID.to_string()),
                ("machine.openshift.io/cluster-api-machine-role".to_string(), "worker".to_string()),
            ])),
            ..Default::default()
        },
        spec: MachineSpec {
            provider_spec: ProviderSpec { value: provider_spec },
            provider_id: None,
        },
        status: None,
    }
}

/// Helper to create a test Machine with [`test_provider_spec`]
#[cfg(test)]
pub fn create_test_machine(name: &str) -> Machine {
    create_test_machine_with_spec(name, Some(test_provider_spec()))
}

/// Helper to create a test Node, optionally with a providerID
#[cfg(test)]
pub fn create_test_node(name: &str, provider_id: Option<&str>) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: provider_id.map(|s| s.to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

/// Helper to create a test VirtualMachineInstance in `phase` with one interface carrying `ips`
#[cfg(test)]
pub fn create_test_vmi(name: &str, namespace: &str, phase: &str, ips: &[&str]) -> VirtualMachineInstance {
    let interfaces = if ips.is_empty() {
        Vec::new()
    } else {
        vec![VirtualMachineInstanceNetworkInterface {
            name: Some("main".to_string()),
            ip_address: Some(ips[0].to_string()),
            ip_addresses: ips.iter().map(|ip| ip.to_string()).collect(),
            mac: None,
        }]
    };
    let mut vmi = VirtualMachineInstance::new(name, VirtualMachineInstanceSpec::default());
    vmi.metadata.namespace = Some(namespace.to_string());
    vmi.status = Some(VirtualMachineInstanceStatus {
        phase: Some(phase.to_string()),
        node_name: Some("infra-node-1".to_string()),
        interfaces,
    });
    vmi
}

/// Helper to create the tenant secret holding ignition user data
#[cfg(test)]
pub fn create_test_user_data_secret(name: &str, user_data: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(MACHINE_NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("userData".to_string(), ByteString(user_data.as_bytes().to_vec()))])),
        ..Default::default()
    }
}

/// Object-meta timestamp from an RFC 3339 string
#[cfg(test)]
pub fn test_time(rfc3339: &str) -> Time {
    serde_json::from_value(serde_json::Value::String(rfc3339.to_string())).unwrap()
}

/// Mock tenant cluster with the shared config published
#[cfg(test)]
pub fn create_test_tenant() -> MockTenantClusterClient {
    let tenant = MockTenantClusterClient::new();
    tenant.set_shared_config(INFRA_NAMESPACE, INFRA_ID);
    tenant
}

/// Helper to build a scope for `machine` over `tenant`
#[cfg(test)]
pub async fn create_test_scope(tenant: &MockTenantClusterClient, machine: Machine) -> MachineScope {
    MachineScope::new(Arc::new(tenant.clone()), machine).await.unwrap()
}

/// Event captured by [`RecordingEventPublisher`]
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub object: Option<String>,
    pub warning: bool,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

/// EventPublisher that keeps every event in memory
#[cfg(test)]
#[derive(Clone, Default)]
pub struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

#[cfg(test)]
impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            object: resource_ref.name.clone(),
            warning: matches!(type_, EventType::Warning),
            reason: reason.to_string(),
            action: action.to_string(),
            note,
        });
    }
}
