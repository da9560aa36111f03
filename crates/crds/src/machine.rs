//! Machine CRD
//!
//! The tenant-cluster `Machine` resource (machine.openshift.io/v1beta1) describing
//! a desired compute node. Only the fields the KubeVirt provider reads or writes
//! are modelled; the provider-specific payloads stay opaque here and are parsed
//! by [`crate::provider`].

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label carrying the cluster ID a machine belongs to.
pub const MACHINE_CLUSTER_ID_LABEL: &str = "machine.openshift.io/cluster-api-cluster";

/// Upstream cluster-api spelling of the cluster ID label, still honoured as a fallback.
pub const UPSTREAM_MACHINE_CLUSTER_ID_LABEL: &str = "sigs.k8s.io/cluster-api-cluster";

/// Annotation mirroring the phase of the backing VirtualMachineInstance.
pub const MACHINE_INSTANCE_STATE_ANNOTATION: &str = "machine.openshift.io/instance-state";

/// Finalizer holding a Machine until its VirtualMachine has been deleted.
pub const MACHINE_FINALIZER: &str = "machine.machine.openshift.io";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "Machine",
    namespaced,
    status = "MachineStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Provider-specific configuration
    #[serde(default)]
    pub provider_spec: ProviderSpec,

    /// Identifier of the backing infrastructure instance.
    ///
    /// Set once by the provider and never overwritten afterwards.
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// Opaque provider spec wrapper (`spec.providerSpec`)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    /// Raw provider payload, see `KubevirtMachineProviderSpec`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Raw provider status payload, see `KubevirtMachineProviderStatus`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_status: Option<serde_json::Value>,

    /// Addresses reported for the node backing this machine
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<MachineAddress>,

    /// Last time the provider refreshed this status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,

    /// Machine lifecycle phase, owned by the machine controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Terminal error class, set for configuration problems that need user action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,

    /// Human-readable terminal error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A single node address (`InternalIP`, `InternalDNS`, ...)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineAddress {
    /// Address kind
    #[serde(rename = "type")]
    pub address_type: String,

    /// Address value
    pub address: String,
}

impl MachineAddress {
    /// Internal IP address of the node
    pub fn internal_ip(address: impl Into<String>) -> Self {
        Self { address_type: "InternalIP".to_string(), address: address.into() }
    }

    /// Internal DNS name of the node
    pub fn internal_dns(address: impl Into<String>) -> Self {
        Self { address_type: "InternalDNS".to_string(), address: address.into() }
    }
}

impl Machine {
    /// Cluster ID from the machine labels, falling back to the upstream label name.
    pub fn cluster_id(&self) -> Option<&str> {
        let labels = self.metadata.labels.as_ref()?;
        labels
            .get(MACHINE_CLUSTER_ID_LABEL)
            .or_else(|| labels.get(UPSTREAM_MACHINE_CLUSTER_ID_LABEL))
            .map(String::as_str)
    }

    /// Provider ID, treating an empty string the same as unset.
    pub fn provider_id(&self) -> Option<&str> {
        self.spec.provider_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn machine_with_labels(labels: &[(&str, &str)]) -> Machine {
        let mut machine = Machine::new("worker-0", MachineSpec::default());
        machine.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        );
        machine
    }

    #[test]
    fn test_cluster_id_prefers_openshift_label() {
        let machine = machine_with_labels(&[
            (MACHINE_CLUSTER_ID_LABEL, "ocp"),
            (UPSTREAM_MACHINE_CLUSTER_ID_LABEL, "upstream"),
        ]);
        assert_eq!(machine.cluster_id(), Some("ocp"));
    }

    #[test]
    fn test_cluster_id_falls_back_to_upstream_label() {
        let machine = machine_with_labels(&[(UPSTREAM_MACHINE_CLUSTER_ID_LABEL, "upstream")]);
        assert_eq!(machine.cluster_id(), Some("upstream"));
    }

    #[test]
    fn test_empty_provider_id_is_unset() {
        let mut machine = Machine::new("worker-0", MachineSpec::default());
        machine.spec.provider_id = Some(String::new());
        assert_eq!(machine.provider_id(), None);
    }

    #[test]
    fn test_provider_id_serializes_with_upper_case_id() {
        let spec = MachineSpec {
            provider_spec: ProviderSpec::default(),
            provider_id: Some("kubevirt://ns/vm".to_string()),
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["providerID"], "kubevirt://ns/vm");
    }
}
