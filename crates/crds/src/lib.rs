//! KubeVirt Machine Provider resource types
//!
//! Kubernetes resource definitions shared by the machine provider crates:
//! the tenant-cluster `Machine`, its typed KubeVirt provider payloads, and the
//! infra-cluster `VirtualMachine` / `VirtualMachineInstance` resources.

pub mod error;
pub mod kubevirt;
pub mod machine;
pub mod provider;

pub use error::*;
pub use kubevirt::*;
pub use machine::*;
pub use provider::*;
