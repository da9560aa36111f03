//! Machine actuator.
//!
//! Drives one Machine per call: ensures the finalizer, decides between create
//! and update (or delete for a terminating machine), emits events, and writes
//! the resulting status back. Transient failures are retried with a
//! per-machine Fibonacci backoff.

use crate::backoff::FibonacciBackoff;
use crate::error::{MachineError, RequeueCause};
use crate::events::{actions, reasons, EventPublisher};
use crate::machine_scope::MachineScope;
use crate::vm_manager::KubevirtVm;
use crds::{Machine, MACHINE_FINALIZER};
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tenantcluster_client::TenantClusterClientTrait;
use tracing::{debug, info, warn};

/// Data key holding ignition user data in the machine's tenant secret.
pub const USER_DATA_SECRET_KEY: &str = "userData";

const BACKOFF_MIN_SECONDS: u64 = 5;
const BACKOFF_MAX_SECONDS: u64 = 300;

/// Backoff state for a machine
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(BACKOFF_MIN_SECONDS, BACKOFF_MAX_SECONDS),
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Reconciles Machines against their VirtualMachines.
pub struct Actuator {
    vm_manager: Arc<dyn KubevirtVm>,
    tenant: Arc<dyn TenantClusterClientTrait>,
    events: Arc<dyn EventPublisher>,
    resync_period: Duration,
    /// Error count tracking per machine (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

fn resource_key(machine: &Machine) -> String {
    format!("{}/{}", machine.namespace().unwrap_or_default(), machine.name_any())
}

impl Actuator {
    /// Creates an actuator; healthy machines are revisited every `resync_period`.
    pub fn new(
        vm_manager: Arc<dyn KubevirtVm>,
        tenant: Arc<dyn TenantClusterClientTrait>,
        events: Arc<dyn EventPublisher>,
        resync_period: Duration,
    ) -> Self {
        Self {
            vm_manager,
            tenant,
            events,
            resync_period,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reconcile one machine.
    pub async fn reconcile(&self, machine: &Machine) -> Result<Action, MachineError> {
        let key = resource_key(machine);
        debug!("Reconciling Machine {}", key);

        let result = if machine.meta().deletion_timestamp.is_some() {
            self.finalize(machine).await
        } else {
            self.apply(machine).await
        };

        if result.is_ok() {
            self.reset_error(&key);
        }
        result
    }

    /// Requeue decision for a failed reconciliation.
    pub fn error_action(&self, machine: &Machine, error: &MachineError) -> Action {
        if let Some(after) = error.requeue_after() {
            return Action::requeue(after);
        }
        if error.is_fatal() {
            // wait for the machine or the shared config to change
            return Action::await_change();
        }
        let key = resource_key(machine);
        self.increment_error(&key);
        let (backoff_seconds, error_count) = self.get_backoff_for_resource(&key);
        warn!(
            "Machine {} failed ({} consecutive errors), retrying in {}s: {}",
            key, error_count, backoff_seconds, error
        );
        Action::requeue(Duration::from_secs(backoff_seconds))
    }

    async fn apply(&self, machine: &Machine) -> Result<Action, MachineError> {
        let machine = self.tenant.add_machine_finalizer(machine, MACHINE_FINALIZER).await?;

        let mut scope = match MachineScope::new(Arc::clone(&self.tenant), machine.clone()).await {
            Ok(scope) => scope,
            Err(e) => {
                if e.is_fatal() {
                    self.warn(&machine, reasons::INVALID_CONFIGURATION, actions::RECONCILE, &e).await;
                }
                return Err(e);
            }
        };

        let result = self.create_or_update(&mut scope).await;
        match &result {
            Ok(()) => scope.clear_configuration_error(),
            Err(e) if e.is_fatal() => {
                scope.set_configuration_error(e.to_string());
                self.warn(&machine, reasons::INVALID_CONFIGURATION, actions::RECONCILE, e).await;
            }
            Err(_) => {}
        }

        // Conditions recorded by a failed operation are persisted too
        let persisted = scope.persist().await;
        result?;
        persisted?;

        Ok(Action::requeue(self.resync_period))
    }

    async fn create_or_update(&self, scope: &mut MachineScope) -> Result<(), MachineError> {
        if self.vm_manager.exists(scope).await? {
            match self.vm_manager.update(scope).await {
                Ok(true) => {
                    self.normal(scope.machine(), reasons::UPDATED, actions::UPDATE, format!("Updated VM {}", scope.machine_name()))
                        .await;
                }
                Ok(false) => {}
                Err(e @ MachineError::RequeueAfter { cause: RequeueCause::EventualConsistency, .. }) => {
                    return Err(e);
                }
                Err(e) => {
                    self.warn(scope.machine(), reasons::FAILED_UPDATE, actions::UPDATE, &e).await;
                    return Err(e);
                }
            }
            return Ok(());
        }

        let user_data = self.user_data(scope).await?;
        match self.vm_manager.create(scope, &user_data).await {
            Ok(()) => {
                self.normal(scope.machine(), reasons::CREATED, actions::CREATE, format!("Created VM {}", scope.machine_name()))
                    .await;
                Ok(())
            }
            Err(e) => {
                self.warn(scope.machine(), reasons::FAILED_CREATE, actions::CREATE, &e).await;
                Err(e)
            }
        }
    }

    async fn finalize(&self, machine: &Machine) -> Result<Action, MachineError> {
        if !machine.finalizers().iter().any(|f| f == MACHINE_FINALIZER) {
            return Ok(Action::await_change());
        }

        let scope = MachineScope::new(Arc::clone(&self.tenant), machine.clone()).await?;
        if let Err(e) = self.vm_manager.delete(&scope).await {
            self.warn(machine, reasons::FAILED_DELETE, actions::DELETE, &e).await;
            return Err(e);
        }
        self.normal(machine, reasons::DELETED, actions::DELETE, format!("Deleted VM {}", scope.machine_name()))
            .await;

        self.tenant.remove_machine_finalizer(machine, MACHINE_FINALIZER).await?;
        let key = resource_key(machine);
        self.forget(&key);
        info!("Machine {}: finalizer removed", key);
        Ok(Action::await_change())
    }

    /// Ignition user data from the tenant secret named in the provider spec.
    async fn user_data(&self, scope: &MachineScope) -> Result<Vec<u8>, MachineError> {
        let spec = scope.provider_spec()?;
        if spec.ignition_secret_name.is_empty() {
            return Ok(Vec::new());
        }

        let namespace = scope.machine_namespace();
        let secret = self.tenant.get_secret(&spec.ignition_secret_name, &namespace).await?;
        secret
            .data
            .and_then(|mut data| data.remove(USER_DATA_SECRET_KEY))
            .map(|bytes| bytes.0)
            .ok_or_else(|| {
                MachineError::InvalidConfiguration(format!(
                    "secret {}/{} has no {} key",
                    namespace, spec.ignition_secret_name, USER_DATA_SECRET_KEY
                ))
            })
    }

    async fn normal(&self, machine: &Machine, reason: &str, action: &str, note: String) {
        self.events
            .publish(&machine.object_ref(&()), EventType::Normal, reason, action, Some(note))
            .await;
    }

    async fn warn(&self, machine: &Machine, reason: &str, action: &str, error: &MachineError) {
        self.events
            .publish(&machine.object_ref(&()), EventType::Warning, reason, action, Some(error.to_string()))
            .await;
    }

    /// Get the Fibonacci backoff duration for a machine based on its error count
    ///
    /// Returns (backoff_seconds, error_count)
    fn get_backoff_for_resource(&self, resource_key: &str) -> (u64, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(resource_key.to_string()).or_insert_with(BackoffState::new);
                (state.backoff.next_backoff_seconds(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (BACKOFF_MIN_SECONDS, 0)
            }
        }
    }

    fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::new)
                .increment_error();
        }
    }

    /// Drop all backoff state of a machine that is gone.
    fn forget(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }

    #[cfg(test)]
    pub(crate) fn has_backoff_state(&self, resource_key: &str) -> bool {
        self.backoff_states
            .lock()
            .map(|states| states.contains_key(resource_key))
            .unwrap_or(false)
    }

    fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.reset();
            }
        }
    }
}
