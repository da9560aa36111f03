//! Infrastructure cluster client
//!
//! Capability interface over the cluster hosting the virtualization platform:
//! create/get/update/delete of KubeVirt `VirtualMachine`s, reads of their
//! `VirtualMachineInstance`s, and creation of the secrets carrying boot
//! configuration.
//!
//! # Example
//!
//! ```no_run
//! use infracluster_client::{InfraClusterClient, InfraClusterClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = InfraClusterClient::from_kubeconfig("/etc/infra/kubeconfig").await?;
//! match client.get_virtual_machine("tenant-infra", "worker-0").await {
//!     Ok(vm) => println!("found {:?}", vm.metadata.resource_version),
//!     Err(e) if e.is_not_found() => println!("not there yet"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod infra_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::InfraClusterClient;
pub use error::InfraClusterError;
pub use infra_trait::InfraClusterClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockInfraClusterClient;
