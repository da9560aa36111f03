//! Controller-specific error types.
//!
//! [`ControllerError`] covers process startup and the watch loops.
//! [`MachineError`] is the outcome of a single reconciliation; its variant
//! decides how the machine is requeued.

use crds::ProviderConfigError;
use infracluster_client::InfraClusterError;
use kube::Error as KubeError;
use std::fmt;
use std::time::Duration;
use tenantcluster_client::TenantClusterError;
use thiserror::Error;

/// Errors that can occur in the KubeVirt Machine Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Infrastructure cluster client could not be built
    #[error("Infra cluster error: {0}")]
    Infra(#[from] InfraClusterError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Probe server failed
    #[error("Probe server error: {0}")]
    Probe(#[from] std::io::Error),
}

/// Why a machine asked to be requeued after a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueCause {
    /// The VM is missing but the machine was seen recently; most likely read-after-write lag
    EventualConsistency,
    /// The VM has been missing for longer than the grace window
    VirtualMachineMissing,
}

impl fmt::Display for RequeueCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventualConsistency => write!(f, "possible eventual-consistency discrepancy"),
            Self::VirtualMachineMissing => write!(f, "virtual machine is missing"),
        }
    }
}

/// Outcome of a failed machine reconciliation.
#[derive(Debug, Error)]
pub enum MachineError {
    /// The machine cannot be reconciled until its spec or the shared config changes
    #[error("Invalid machine configuration: {0}")]
    InvalidConfiguration(String),

    /// Retry after a fixed delay
    #[error("Requeue after {}s: {cause}", after.as_secs())]
    RequeueAfter {
        /// Delay before the next attempt
        after: Duration,
        /// Why the delay was chosen
        cause: RequeueCause,
    },

    /// Infrastructure cluster call failed
    #[error("Infra cluster error: {0}")]
    Infra(#[from] InfraClusterError),

    /// Tenant cluster call failed
    #[error("Tenant cluster error: {0}")]
    Tenant(#[from] TenantClusterError),

    /// Creating the VM or its boot secret failed; the Failure condition is set
    #[error("Failed to create {what}: {source}")]
    Creation {
        /// Object that could not be created
        what: &'static str,
        /// Underlying infra error
        #[source]
        source: InfraClusterError,
    },

    /// The VM was created or updated but the machine status could not be derived
    #[error("Failed to sync machine status: {0}")]
    StatusSync(String),
}

impl From<ProviderConfigError> for MachineError {
    fn from(err: ProviderConfigError) -> Self {
        Self::InvalidConfiguration(err.to_string())
    }
}

impl MachineError {
    /// Requeue delay requested by the error itself, if any.
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Self::RequeueAfter { after, .. } => Some(*after),
            _ => None,
        }
    }

    /// Retrying without a change to the inputs cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidConfiguration(_))
    }
}
