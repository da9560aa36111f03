//! Tenant cluster client
//!
//! Capability interface over the cluster that owns `Machine` and `Node`
//! objects: merge-patching machines and their status, reading the shared
//! cloud-provider configuration, reading user-data secrets, and tagging
//! nodes with their provider ID.

pub mod client;
pub mod error;
pub mod merge_patch;
pub mod shared_config;
#[path = "trait.rs"]
pub mod tenant_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::TenantClusterClient;
pub use error::TenantClusterError;
pub use shared_config::{parse_cloud_provider_config, SharedClusterConfig};
pub use tenant_trait::TenantClusterClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockTenantClusterClient;
