//! Infrastructure cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the infrastructure cluster
#[derive(Debug, Error)]
pub enum InfraClusterError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object already exists (create of an existing name)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic-concurrency conflict (stale resourceVersion)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Infra API server rejected the request
    #[error("Infra API error: {0}")]
    Api(String),

    /// Transport or client-side failure
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Client could not be configured (kubeconfig unreadable, bad context)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl InfraClusterError {
    /// Map a kube error for `what` onto the not-found / already-exists / conflict classes.
    pub(crate) fn from_kube(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound(what.to_string()),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::AlreadyExists(what.to_string())
            }
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict(format!("{}: {}", what, ae.message)),
            kube::Error::Api(ae) => Self::Api(format!("{}: {} ({})", what, ae.message, ae.code)),
            other => Self::Kube(other),
        }
    }

    /// The requested object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// A create targeted a name that is already taken.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}
