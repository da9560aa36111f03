//! KubeVirt provider payloads
//!
//! Typed views over the opaque `spec.providerSpec.value` and
//! `status.providerStatus` blobs carried by a [`Machine`]. Both are parsed
//! through explicit functions so that a malformed payload surfaces as a
//! [`ProviderConfigError`] instead of a missing-key panic deep in reconciliation.

use crate::error::ProviderConfigError;
use crate::machine::Machine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Memory request used when the provider spec leaves it empty.
pub const DEFAULT_REQUESTED_MEMORY: &str = "2048M";

/// Boot volume size used when the provider spec leaves it empty.
pub const DEFAULT_REQUESTED_STORAGE: &str = "35Gi";

/// Access mode of the boot volume when the provider spec leaves it empty.
pub const DEFAULT_PERSISTENT_VOLUME_ACCESS_MODE: &str = "ReadWriteMany";

/// Condition type recording a failed provider operation.
pub const CONDITION_FAILURE: &str = "Failure";

/// Reason attached to the failure condition when VM creation fails.
pub const REASON_MACHINE_CREATION_FAILED: &str = "MachineCreationFailed";

/// Provider configuration for a KubeVirt-backed machine.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubevirtMachineProviderSpec {
    /// PVC in the infra namespace cloned as the boot disk
    #[serde(default)]
    pub source_pvc_name: String,

    /// Tenant secret holding the ignition user data (key `userData`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ignition_secret_name: String,

    /// Tenant secret holding infra cluster credentials
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub credentials_secret_name: String,

    /// Multus network attachment for the primary interface
    #[serde(default)]
    pub network_name: String,

    /// Memory request (quantity string)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub requested_memory: String,

    /// CPU request in cores, 0 leaves the request unset
    #[serde(rename = "requestedCPU", default, skip_serializing_if = "is_zero")]
    pub requested_cpu: u32,

    /// Boot volume size (quantity string)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub requested_storage: String,

    /// Storage class of the boot volume, empty means the cluster default
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub storage_class_name: String,

    /// Access mode of the boot volume
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub persistent_volume_access_mode: String,
}

#[allow(clippy::trivially_copy_pass_by_ref, reason = "serde skip_serializing_if signature")]
fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl KubevirtMachineProviderSpec {
    /// Parse the provider spec out of a machine.
    pub fn from_machine(machine: &Machine) -> Result<Self, ProviderConfigError> {
        let value = machine
            .spec
            .provider_spec
            .value
            .as_ref()
            .ok_or(ProviderConfigError::MissingProviderSpec)?;
        serde_json::from_value(value.clone()).map_err(ProviderConfigError::InvalidProviderSpec)
    }

    /// Encode into the opaque machine payload.
    pub fn to_value(&self) -> Result<serde_json::Value, ProviderConfigError> {
        serde_json::to_value(self).map_err(ProviderConfigError::Encode)
    }

    /// Memory request with the default applied.
    pub fn memory(&self) -> &str {
        non_empty_or(&self.requested_memory, DEFAULT_REQUESTED_MEMORY)
    }

    /// Boot volume size with the default applied.
    pub fn storage(&self) -> &str {
        non_empty_or(&self.requested_storage, DEFAULT_REQUESTED_STORAGE)
    }

    /// Boot volume access mode with the default applied.
    pub fn access_mode(&self) -> &str {
        non_empty_or(&self.persistent_volume_access_mode, DEFAULT_PERSISTENT_VOLUME_ACCESS_MODE)
    }
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

/// Provider-reported state of a KubeVirt-backed machine.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubevirtMachineProviderStatus {
    /// Mirror of the VirtualMachine `created`/`ready` flags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_status: Option<VirtualMachineState>,

    /// Phase of the VirtualMachineInstance, if one was observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmi_phase: Option<String>,

    /// Whether the VM reported ready on the last sync
    #[serde(default)]
    pub ready: bool,

    /// Provider conditions, unique per type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ProviderCondition>,

    /// Last sync that observed the VirtualMachine in the infra cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,

    /// Fields written by other parties (`apiVersion`, `kind`, ...), kept as-is
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `created`/`ready` flags managed by the infra cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineState {
    /// VMI exists for this VM
    #[serde(default)]
    pub created: bool,
    /// VMI is running and ready
    #[serde(default)]
    pub ready: bool,
}

impl KubevirtMachineProviderStatus {
    /// Parse the provider status out of a machine; an absent payload yields the default.
    pub fn from_machine(machine: &Machine) -> Result<Self, ProviderConfigError> {
        match machine.status.as_ref().and_then(|s| s.provider_status.as_ref()) {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(ProviderConfigError::InvalidProviderStatus),
            None => Ok(Self::default()),
        }
    }

    /// Encode into the opaque machine payload.
    pub fn to_value(&self) -> Result<serde_json::Value, ProviderConfigError> {
        serde_json::to_value(self).map_err(ProviderConfigError::Encode)
    }

    /// Look up a condition by type.
    pub fn condition(&self, condition_type: &str) -> Option<&ProviderCondition> {
        self.conditions.iter().find(|c| c.condition_type == condition_type)
    }
}

/// Condition status values
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition holds
    True,
    /// Condition does not hold
    False,
    /// Not determined
    #[default]
    Unknown,
}

/// A provider condition on the machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCondition {
    /// Condition type, unique within the list
    #[serde(rename = "type")]
    pub condition_type: String,

    /// Condition status
    pub status: ConditionStatus,

    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Last time the condition was observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<DateTime<Utc>>,

    /// Last time the status flipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl ProviderCondition {
    /// Build an unstamped condition; timestamps are assigned when it is recorded.
    pub fn new(
        condition_type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_probe_time: None,
            last_transition_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{MachineSpec, MachineStatus, ProviderSpec};

    fn machine_with_spec(value: serde_json::Value) -> Machine {
        Machine::new(
            "worker-0",
            MachineSpec {
                provider_spec: ProviderSpec { value: Some(value) },
                provider_id: None,
            },
        )
    }

    #[test]
    fn test_provider_spec_parses_camel_case_fields() {
        let machine = machine_with_spec(serde_json::json!({
            "sourcePvcName": "rhcos",
            "ignitionSecretName": "worker-user-data",
            "networkName": "multus-network",
            "requestedCPU": 4,
            "requestedMemory": "8Gi"
        }));
        let spec = KubevirtMachineProviderSpec::from_machine(&machine).unwrap();
        assert_eq!(spec.source_pvc_name, "rhcos");
        assert_eq!(spec.requested_cpu, 4);
        assert_eq!(spec.memory(), "8Gi");
        assert_eq!(spec.storage(), DEFAULT_REQUESTED_STORAGE);
        assert_eq!(spec.access_mode(), DEFAULT_PERSISTENT_VOLUME_ACCESS_MODE);
    }

    #[test]
    fn test_provider_spec_missing_is_an_error() {
        let machine = Machine::new("worker-0", MachineSpec::default());
        assert!(matches!(
            KubevirtMachineProviderSpec::from_machine(&machine),
            Err(ProviderConfigError::MissingProviderSpec)
        ));
    }

    #[test]
    fn test_provider_spec_wrong_shape_is_an_error() {
        let machine = machine_with_spec(serde_json::json!({ "requestedCPU": "lots" }));
        assert!(matches!(
            KubevirtMachineProviderSpec::from_machine(&machine),
            Err(ProviderConfigError::InvalidProviderSpec(_))
        ));
    }

    #[test]
    fn test_provider_status_defaults_when_absent() {
        let machine = Machine::new("worker-0", MachineSpec::default());
        let status = KubevirtMachineProviderStatus::from_machine(&machine).unwrap();
        assert_eq!(status, KubevirtMachineProviderStatus::default());
    }

    #[test]
    fn test_provider_status_keeps_unknown_fields() {
        let mut machine = Machine::new("worker-0", MachineSpec::default());
        let stored = serde_json::json!({
            "apiVersion": "kubevirtproviderconfig.openshift.io/v1alpha1",
            "kind": "KubevirtMachineProviderStatus",
            "ready": false
        });
        machine.status = Some(MachineStatus { provider_status: Some(stored.clone()), ..Default::default() });

        let mut status = KubevirtMachineProviderStatus::from_machine(&machine).unwrap();
        status.ready = true;
        let value = status.to_value().unwrap();
        assert_eq!(value["apiVersion"], stored["apiVersion"]);
        assert_eq!(value["kind"], stored["kind"]);
        assert_eq!(value["ready"], true);
    }

    #[test]
    fn test_provider_status_reads_conditions() {
        let mut machine = Machine::new("worker-0", MachineSpec::default());
        machine.status = Some(MachineStatus {
            provider_status: Some(serde_json::json!({
                "ready": true,
                "conditions": [{"type": "Failure", "status": "True", "reason": "MachineCreationFailed"}]
            })),
            ..Default::default()
        });
        let status = KubevirtMachineProviderStatus::from_machine(&machine).unwrap();
        assert!(status.ready);
        let failure = status.condition(CONDITION_FAILURE).unwrap();
        assert_eq!(failure.status, ConditionStatus::True);
        assert_eq!(failure.reason, REASON_MACHINE_CREATION_FAILED);
    }
}
