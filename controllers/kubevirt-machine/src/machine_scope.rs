//! Per-pass working state of one Machine.
//!
//! A `MachineScope` is built fresh for every reconciliation from the Machine
//! as read from the tenant cluster. It derives the infra objects the machine
//! should own, folds observed infra state back into a working copy of the
//! Machine, and finally writes that copy back as merge patches against the
//! object it started from.

use crate::conditions;
use crate::error::MachineError;
use crate::provider_id::format_provider_id;
use chrono::{DateTime, Utc};
use crds::{
    CloudInitConfigDriveSource, DataVolumeClaimSpec, DataVolumeCloneSource, DataVolumeSource, DataVolumeSpec,
    DataVolumeTemplateSpec, Devices, Disk, DiskTarget, DomainSpec, Interface, InterfaceBridge,
    KubevirtMachineProviderSpec, KubevirtMachineProviderStatus, LocalObjectReference, Machine, MachineAddress,
    MachineStatus, MultusNetwork, Network, ResourceRequirements, SourcePvc, TemplateMetadata, VirtualMachine,
    VirtualMachineInstance, VirtualMachineInstanceSpec, VirtualMachineInstanceTemplateSpec, VirtualMachineSpec,
    VirtualMachineState, Volume, MACHINE_INSTANCE_STATE_ANNOTATION, RUN_STRATEGY_ALWAYS, VM_LABEL,
};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::ByteString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tenantcluster_client::TenantClusterClientTrait;
use tracing::debug;

/// Data key of the ignition secret on the infra cluster.
pub const IGNITION_SECRET_DATA_KEY: &str = "userdata";

const NETWORK_NAME: &str = "main";
const BOOT_DISK_NAME: &str = "datavolumedisk1";
const CLOUD_INIT_DISK_NAME: &str = "cloudinitdisk";
const DISK_BUS: &str = "virtio";
const INSTANCE_STATE_UNKNOWN: &str = "Unknown";

/// Working state of a single Machine reconciliation.
pub struct MachineScope {
    machine: Machine,
    original: Machine,
    provider_status: KubevirtMachineProviderStatus,
    infra_namespace: String,
    infra_id: String,
    tenant: Arc<dyn TenantClusterClientTrait>,
}

impl MachineScope {
    /// Build the scope for `machine`, reading the shared config from the tenant cluster.
    pub async fn new(tenant: Arc<dyn TenantClusterClientTrait>, machine: Machine) -> Result<Self, MachineError> {
        let shared = tenant.get_shared_namespace_config().await.map_err(|e| match e {
            tenantcluster_client::TenantClusterError::InvalidSharedConfig(msg) => MachineError::InvalidConfiguration(msg),
            other => MachineError::Tenant(other),
        })?;

        let infra_id = shared
            .infra_id
            .or_else(|| machine.cluster_id().map(str::to_string))
            .ok_or_else(|| {
                MachineError::InvalidConfiguration(format!(
                    "{}: no infraID in the shared config and no cluster ID label on the machine",
                    machine.name_any()
                ))
            })?;

        let provider_status = KubevirtMachineProviderStatus::from_machine(&machine)?;

        Ok(Self {
            original: machine.clone(),
            machine,
            provider_status,
            infra_namespace: shared.namespace,
            infra_id,
            tenant,
        })
    }

    /// Machine name; also the name of the VirtualMachine.
    pub fn machine_name(&self) -> String {
        self.machine.name_any()
    }

    /// Namespace of the machine on the tenant cluster.
    pub fn machine_namespace(&self) -> String {
        self.machine.namespace().unwrap_or_default()
    }

    /// Namespace on the infra cluster holding this machine's objects.
    pub fn infra_namespace(&self) -> &str {
        &self.infra_namespace
    }

    /// Working copy of the machine.
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Working copy of the provider status.
    pub fn provider_status(&self) -> &KubevirtMachineProviderStatus {
        &self.provider_status
    }

    /// Typed provider spec of the machine.
    pub fn provider_spec(&self) -> Result<KubevirtMachineProviderSpec, MachineError> {
        Ok(KubevirtMachineProviderSpec::from_machine(&self.machine)?)
    }

    /// Name of the infra secret carrying this machine's ignition.
    pub fn ignition_secret_name(&self) -> String {
        format!("{}-ignition", self.machine_name())
    }

    fn boot_volume_name(&self) -> String {
        format!("{}-bootvolume", self.machine_name())
    }

    /// Label marking infra objects as owned by this tenant cluster.
    fn owned_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(format!("{}-machine.openshift.io", self.infra_id), "owned".to_string())])
    }

    /// Ignition secret to create on the infra cluster.
    pub fn ignition_secret(&self, user_data: Vec<u8>) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(self.ignition_secret_name()),
                namespace: Some(self.infra_namespace.clone()),
                labels: Some(self.owned_labels()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(IGNITION_SECRET_DATA_KEY.to_string(), ByteString(user_data))])),
            ..Default::default()
        }
    }

    /// VirtualMachine this machine should be backed by.
    ///
    /// Depends only on the machine's spec, labels and annotations plus the
    /// shared config, so repeated derivations serialize identically.
    pub fn desired_virtual_machine(&self) -> Result<VirtualMachine, MachineError> {
        let spec = self.provider_spec()?;
        let name = self.machine_name();

        let mut labels: BTreeMap<String, String> = self.machine.labels().clone();
        labels.extend(self.owned_labels());

        let annotations: BTreeMap<String, String> = self
            .machine
            .annotations()
            .iter()
            .filter(|(k, _)| k.as_str() != MACHINE_INSTANCE_STATE_ANNOTATION)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut requests = BTreeMap::from([("memory".to_string(), spec.memory().to_string())]);
        if spec.requested_cpu != 0 {
            requests.insert("cpu".to_string(), spec.requested_cpu.to_string());
        }

        let boot_volume = self.boot_volume_name();
        let data_volume = DataVolumeTemplateSpec {
            metadata: TemplateMetadata {
                name: Some(boot_volume.clone()),
                namespace: Some(self.infra_namespace.clone()),
                labels: BTreeMap::new(),
            },
            spec: DataVolumeSpec {
                source: DataVolumeCloneSource {
                    pvc: Some(SourcePvc {
                        namespace: self.infra_namespace.clone(),
                        name: spec.source_pvc_name.clone(),
                    }),
                },
                pvc: DataVolumeClaimSpec {
                    access_modes: vec![spec.access_mode().to_string()],
                    resources: ResourceRequirements {
                        requests: BTreeMap::from([("storage".to_string(), spec.storage().to_string())]),
                    },
                    storage_class_name: Some(spec.storage_class_name.clone()).filter(|s| !s.is_empty()),
                },
            },
        };

        let virtio = || Some(DiskTarget { bus: Some(DISK_BUS.to_string()) });
        let template = VirtualMachineInstanceTemplateSpec {
            metadata: TemplateMetadata {
                name: None,
                namespace: None,
                labels: BTreeMap::from([
                    (VM_LABEL.to_string(), name.clone()),
                    ("name".to_string(), name.clone()),
                ]),
            },
            spec: VirtualMachineInstanceSpec {
                domain: DomainSpec {
                    resources: ResourceRequirements { requests },
                    devices: Devices {
                        disks: vec![
                            Disk { name: BOOT_DISK_NAME.to_string(), disk: virtio() },
                            Disk { name: CLOUD_INIT_DISK_NAME.to_string(), disk: virtio() },
                        ],
                        interfaces: vec![Interface { name: NETWORK_NAME.to_string(), bridge: Some(InterfaceBridge {}) }],
                    },
                },
                networks: vec![Network {
                    name: NETWORK_NAME.to_string(),
                    multus: Some(MultusNetwork { network_name: spec.network_name.clone() }),
                }],
                volumes: vec![
                    Volume {
                        name: BOOT_DISK_NAME.to_string(),
                        data_volume: Some(DataVolumeSource { name: boot_volume }),
                        cloud_init_config_drive: None,
                    },
                    Volume {
                        name: CLOUD_INIT_DISK_NAME.to_string(),
                        data_volume: None,
                        cloud_init_config_drive: Some(CloudInitConfigDriveSource {
                            user_data_secret_ref: Some(LocalObjectReference { name: self.ignition_secret_name() }),
                        }),
                    },
                ],
            },
        };

        let mut vm = VirtualMachine::new(
            &name,
            VirtualMachineSpec {
                run_strategy: Some(RUN_STRATEGY_ALWAYS.to_string()),
                data_volume_templates: vec![data_volume],
                template,
            },
        );
        vm.metadata.namespace = Some(self.infra_namespace.clone());
        vm.metadata.labels = Some(labels);
        vm.metadata.annotations = Some(annotations).filter(|a| !a.is_empty());
        Ok(vm)
    }

    /// Fold the observed VM and, when available, its VMI into the working machine.
    pub fn sync_machine(
        &mut self,
        vm: &VirtualMachine,
        vmi: Option<&VirtualMachineInstance>,
        now: DateTime<Utc>,
    ) -> Result<(), MachineError> {
        let vm_status = vm.status.clone().unwrap_or_default();
        let vmi_status = vmi.and_then(|vmi| vmi.status.as_ref());
        let phase = vmi_status.and_then(|s| s.phase.clone());

        self.provider_status.vm_status = Some(VirtualMachineState { created: vm_status.created, ready: vm_status.ready });
        self.provider_status.vmi_phase = phase.clone();
        self.provider_status.ready = vm_status.ready;
        self.provider_status.last_seen_at = Some(now);

        let mut addresses = vec![MachineAddress::internal_dns(self.machine_name())];
        for iface in vmi_status.map(|s| s.interfaces.as_slice()).unwrap_or_default() {
            addresses.extend(iface.addresses().into_iter().map(MachineAddress::internal_ip));
        }

        self.machine.annotations_mut().insert(
            MACHINE_INSTANCE_STATE_ANNOTATION.to_string(),
            phase.unwrap_or_else(|| INSTANCE_STATE_UNKNOWN.to_string()),
        );

        if self.machine.provider_id().is_none() {
            let provider_id = format_provider_id(&self.infra_namespace, &vm.name_any());
            debug!("{}: setting providerID {}", self.machine_name(), provider_id);
            self.machine.spec.provider_id = Some(provider_id);
        }

        let provider_status = self
            .provider_status
            .to_value()
            .map_err(|e| MachineError::StatusSync(e.to_string()))?;
        let status = self.machine.status.get_or_insert_with(MachineStatus::default);
        status.addresses = addresses;
        status.provider_status = Some(provider_status);
        status.last_updated = Some(now);
        Ok(())
    }

    /// Record that creating the VM or its secret failed.
    pub fn set_creation_failed(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        conditions::set_condition(&mut self.provider_status.conditions, conditions::creation_failed(message), now);
        self.store_provider_status();
    }

    /// Surface a configuration problem in `status.errorReason`/`errorMessage`.
    pub fn set_configuration_error(&mut self, message: impl Into<String>) {
        let status = self.machine.status.get_or_insert_with(MachineStatus::default);
        status.error_reason = Some("InvalidConfiguration".to_string());
        status.error_message = Some(message.into());
    }

    /// Clear a previously reported configuration problem.
    pub fn clear_configuration_error(&mut self) {
        if let Some(status) = self.machine.status.as_mut() {
            status.error_reason = None;
            status.error_message = None;
        }
    }

    fn store_provider_status(&mut self) {
        // Only fails for non-string map keys, which the status type does not have
        if let Ok(value) = self.provider_status.to_value() {
            self.machine.status.get_or_insert_with(MachineStatus::default).provider_status = Some(value);
        }
    }

    /// Whether a missing VM should still be read as replication lag at `now`.
    ///
    /// The window is measured from the last sync that observed the VM, or from
    /// the machine's creation when it was never observed. A machine carrying
    /// neither timestamp is inside the window.
    pub fn within_grace_window(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let reference = self
            .provider_status
            .last_seen_at
            .or_else(|| self.machine.metadata.creation_timestamp.as_ref().and_then(timestamp));
        let Some(reference) = reference else {
            return true;
        };
        match chrono::Duration::from_std(window) {
            Ok(window) => now.signed_duration_since(reference) < window,
            Err(_) => true,
        }
    }

    /// Write the working copy back to the tenant cluster.
    ///
    /// Spec and metadata are patched first, then status; both patches carry
    /// only the fields this pass changed.
    pub async fn persist(&mut self) -> Result<(), MachineError> {
        self.tenant.patch_machine(&self.machine, &self.original).await?;
        self.tenant.patch_machine_status(&self.machine, &self.original).await?;
        self.original = self.machine.clone();
        Ok(())
    }
}

/// Object-meta timestamp as a chrono instant.
fn timestamp(time: &Time) -> Option<DateTime<Utc>> {
    let value = serde_json::to_value(time).ok()?;
    DateTime::parse_from_rfc3339(value.as_str()?).ok().map(|t| t.with_timezone(&Utc))
}
