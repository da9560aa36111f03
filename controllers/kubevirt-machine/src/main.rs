//! KubeVirt Machine Controller
//!
//! Reconciles OpenShift `Machine` resources on the tenant cluster against
//! KubeVirt `VirtualMachine`s on a separate infrastructure cluster:
//! - Machine: create, update and delete the backing VirtualMachine and fold
//!   its state back into the Machine status
//! - Node: stamp `spec.providerID` once the backing instance is observed

mod actuator;
mod backoff;
mod conditions;
mod config;
mod controller;
mod error;
mod events;
mod ignition;
mod machine_scope;
mod probes;
mod provider_id;
mod vm_manager;
mod watcher;
#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod conditions_test;
#[cfg(test)]
mod config_test;
#[cfg(test)]
mod ignition_test;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Both clusters are reached over rustls; pin the ring provider before any client is built
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        info!("rustls crypto provider already installed");
    }

    info!("Starting KubeVirt Machine Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Infra kubeconfig: {}", config.infra_kubeconfig.display());
    info!("  Probe address: {}", config.probe_addr);
    info!("  Grace window: {}s", config.grace_window.as_secs());
    info!("  Resync period: {}s", config.resync_period.as_secs());

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
