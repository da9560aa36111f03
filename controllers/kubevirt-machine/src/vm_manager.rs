//! VirtualMachine lifecycle on the infrastructure cluster.
//!
//! Create, update, delete and existence checks for the VM backing a Machine.
//! Every step is individually idempotent: a create interrupted after the
//! secret was written is completed by the next create, and nothing is rolled
//! back.

use crate::error::{MachineError, RequeueCause};
use crate::ignition;
use crate::machine_scope::MachineScope;
use chrono::Utc;
use crds::{VirtualMachine, VirtualMachineStatus};
use infracluster_client::{InfraClusterClientTrait, InfraClusterError};
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Requeue delay while a missing VM is likely still propagating.
pub const REQUEUE_AFTER_SHORT: Duration = Duration::from_secs(20);
/// Requeue delay once a VM has been missing past the grace window.
pub const REQUEUE_AFTER_LONG: Duration = Duration::from_secs(180);
/// Grace period given to the VM on delete.
pub const DELETE_GRACE_PERIOD_SECONDS: u32 = 10;

/// Operations on the VM backing a machine.
#[async_trait::async_trait]
pub trait KubevirtVm: Send + Sync {
    /// Create the ignition secret and VM, then sync the machine status.
    async fn create(&self, scope: &mut MachineScope, user_data: &[u8]) -> Result<(), MachineError>;
    /// Bring the VM in line with the machine; returns whether the infra cluster changed it.
    async fn update(&self, scope: &mut MachineScope) -> Result<bool, MachineError>;
    /// Delete the VM if present.
    async fn delete(&self, scope: &MachineScope) -> Result<(), MachineError>;
    /// Whether the VM exists.
    async fn exists(&self, scope: &MachineScope) -> Result<bool, MachineError>;
}

/// [`KubevirtVm`] backed by an infra cluster client.
pub struct VmManager {
    infra: Arc<dyn InfraClusterClientTrait>,
    grace_window: Duration,
}

impl VmManager {
    /// Creates a manager; `grace_window` bounds how long a missing VM counts as lag.
    pub fn new(infra: Arc<dyn InfraClusterClientTrait>, grace_window: Duration) -> Self {
        Self { infra, grace_window }
    }

    async fn create_virtual_machine(&self, scope: &MachineScope, vm: &VirtualMachine) -> Result<VirtualMachine, InfraClusterError> {
        let namespace = scope.infra_namespace();
        match self.infra.create_virtual_machine(namespace, vm).await {
            Ok(created) => Ok(created),
            Err(e) if e.is_already_exists() => {
                info!("{}: VM already exists, adopting it", scope.machine_name());
                self.infra.get_virtual_machine(namespace, &vm.name_any()).await
            }
            Err(e) => Err(e),
        }
    }

    /// Fold `vm` and its instance into the machine; a missing instance degrades to VM-only fields.
    async fn sync_machine(&self, scope: &mut MachineScope, vm: &VirtualMachine) -> Result<(), MachineError> {
        let vmi = match self.infra.get_virtual_machine_instance(scope.infra_namespace(), &vm.name_any()).await {
            Ok(vmi) => Some(vmi),
            Err(e) if e.is_not_found() => {
                debug!("{}: VMI does not exist yet", scope.machine_name());
                None
            }
            Err(e) => {
                warn!("{}: error getting VMI, syncing VM fields only: {}", scope.machine_name(), e);
                None
            }
        };
        scope.sync_machine(vm, vmi.as_ref(), Utc::now()).inspect_err(|e| {
            error!("{}: failed syncing machine from VM: {}", scope.machine_name(), e);
        })
    }
}

#[async_trait::async_trait]
impl KubevirtVm for VmManager {
    async fn create(&self, scope: &mut MachineScope, user_data: &[u8]) -> Result<(), MachineError> {
        let user_data = ignition::add_hostname(user_data, &scope.machine_name())?;
        let secret = scope.ignition_secret(user_data);

        match self.infra.create_secret(scope.infra_namespace(), &secret).await {
            Ok(_) => {}
            Err(e) if e.is_already_exists() => {
                debug!("{}: ignition secret already exists", scope.machine_name());
            }
            Err(e) => {
                error!("{}: error creating ignition secret: {}", scope.machine_name(), e);
                scope.set_creation_failed(e.to_string(), Utc::now());
                return Err(MachineError::Creation { what: "ignition secret", source: e });
            }
        }

        let desired = scope.desired_virtual_machine()?;
        info!("{}: creating VM", scope.machine_name());
        let vm = match self.create_virtual_machine(scope, &desired).await {
            Ok(vm) => vm,
            Err(e) => {
                error!("{}: error creating VM: {}", scope.machine_name(), e);
                scope.set_creation_failed(e.to_string(), Utc::now());
                return Err(MachineError::Creation { what: "virtual machine", source: e });
            }
        };
        info!("{}: created VM", scope.machine_name());

        self.sync_machine(scope, &vm).await
    }

    async fn update(&self, scope: &mut MachineScope) -> Result<bool, MachineError> {
        let mut desired = scope.desired_virtual_machine()?;
        info!("{}: updating VM", scope.machine_name());

        let existing = match self.infra.get_virtual_machine(scope.infra_namespace(), &desired.name_any()).await {
            Ok(vm) => vm,
            Err(e) if e.is_not_found() => {
                if scope.within_grace_window(Utc::now(), self.grace_window) {
                    info!("{}: VM not found, possible eventual-consistency discrepancy; requeueing", scope.machine_name());
                    return Err(MachineError::RequeueAfter {
                        after: REQUEUE_AFTER_SHORT,
                        cause: RequeueCause::EventualConsistency,
                    });
                }
                warn!("{}: attempted to update machine but the VM was not found", scope.machine_name());
                return Err(MachineError::RequeueAfter {
                    after: REQUEUE_AFTER_LONG,
                    cause: RequeueCause::VirtualMachineMissing,
                });
            }
            Err(e) => {
                error!("{}: error getting existing VM: {}", scope.machine_name(), e);
                return Err(e.into());
            }
        };

        let previous_version = existing.resource_version();
        desired.metadata.resource_version = previous_version.clone();
        let existing_status = existing.status.unwrap_or_default();
        desired.status = Some(VirtualMachineStatus {
            created: existing_status.created,
            ready: existing_status.ready,
            ..Default::default()
        });

        let updated = self.infra.update_virtual_machine(scope.infra_namespace(), &desired).await?;
        let was_updated = previous_version != updated.resource_version();
        if was_updated {
            info!("{}: updated VM", scope.machine_name());
        } else {
            debug!("{}: VM already up to date", scope.machine_name());
        }

        self.sync_machine(scope, &updated).await?;
        Ok(was_updated)
    }

    async fn delete(&self, scope: &MachineScope) -> Result<(), MachineError> {
        let name = scope.machine_name();
        info!("{}: deleting VM", name);

        if let Err(e) = self.infra.get_virtual_machine(scope.infra_namespace(), &name).await {
            if e.is_not_found() {
                info!("{}: VM does not exist", name);
                return Ok(());
            }
            error!("{}: error getting existing VM: {}", name, e);
            return Err(e.into());
        }

        match self
            .infra
            .delete_virtual_machine(scope.infra_namespace(), &name, DELETE_GRACE_PERIOD_SECONDS)
            .await
        {
            Ok(()) => {
                info!("{}: deleted VM", name);
                Ok(())
            }
            // removed between our read and the delete
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, scope: &MachineScope) -> Result<bool, MachineError> {
        let name = scope.machine_name();
        debug!("{}: checking if VM exists", name);
        match self.infra.get_virtual_machine(scope.infra_namespace(), &name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => {
                info!("{}: VM does not exist", name);
                Ok(false)
            }
            Err(e) => {
                error!("{}: error getting existing VM: {}", name, e);
                Err(e.into())
            }
        }
    }
}
