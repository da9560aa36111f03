//! Tenant cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the tenant cluster
#[derive(Debug, Error)]
pub enum TenantClusterError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Tenant API server rejected the request
    #[error("Tenant API error: {0}")]
    Api(String),

    /// Transport or client-side failure
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The shared cloud-provider ConfigMap is present but unusable
    #[error("Invalid shared config: {0}")]
    InvalidSharedConfig(String),

    /// A secret lacks the expected data key
    #[error("Secret {secret} has no key {key}")]
    MissingSecretKey {
        /// namespace/name of the secret
        secret: String,
        /// Expected data key
        key: String,
    },

    /// Object could not be encoded for a patch
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TenantClusterError {
    pub(crate) fn from_kube(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound(what.to_string()),
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict(format!("{}: {}", what, ae.message)),
            kube::Error::Api(ae) => Self::Api(format!("{}: {} ({})", what, ae.message, ae.code)),
            other => Self::Kube(other),
        }
    }

    /// The requested object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
