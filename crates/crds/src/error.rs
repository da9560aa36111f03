//! Errors raised while decoding provider payloads.

use thiserror::Error;

/// A machine's provider payload could not be interpreted.
///
/// These are input errors: retrying without changing the Machine will not help.
#[derive(Debug, Error)]
pub enum ProviderConfigError {
    /// `spec.providerSpec.value` is absent
    #[error("machine has no providerSpec value")]
    MissingProviderSpec,

    /// `spec.providerSpec.value` does not match the KubeVirt provider spec
    #[error("invalid provider spec: {0}")]
    InvalidProviderSpec(#[source] serde_json::Error),

    /// `status.providerStatus` does not match the KubeVirt provider status
    #[error("invalid provider status: {0}")]
    InvalidProviderStatus(#[source] serde_json::Error),

    /// A payload could not be encoded back to JSON
    #[error("failed to encode provider payload: {0}")]
    Encode(#[source] serde_json::Error),
}
