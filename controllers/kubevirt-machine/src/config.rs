//! Controller configuration from environment variables.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8081";
const DEFAULT_GRACE_WINDOW_SECONDS: u64 = 60;
const DEFAULT_RESYNC_PERIOD_SECONDS: u64 = 600;

/// Runtime settings of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch Machines in; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// Kubeconfig of the infrastructure cluster
    pub infra_kubeconfig: PathBuf,
    /// Listen address of the health/readiness endpoints
    pub probe_addr: SocketAddr,
    /// How long a missing VirtualMachine is treated as replication lag
    pub grace_window: Duration,
    /// Periodic resync of healthy Machines
    pub resync_period: Duration,
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a variable if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let watch_namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());

        let infra_kubeconfig = lookup("INFRA_KUBECONFIG")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                ControllerError::InvalidConfig("INFRA_KUBECONFIG environment variable is required".to_string())
            })?;

        let probe_addr = lookup("PROBE_ADDR")
            .unwrap_or_else(|| DEFAULT_PROBE_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ControllerError::InvalidConfig(format!("PROBE_ADDR is not a socket address: {}", e)))?;

        let grace_window = seconds(&lookup, "GRACE_WINDOW_SECONDS", DEFAULT_GRACE_WINDOW_SECONDS)?;
        let resync_period = seconds(&lookup, "RESYNC_PERIOD_SECONDS", DEFAULT_RESYNC_PERIOD_SECONDS)?;
        if resync_period.is_zero() {
            return Err(ControllerError::InvalidConfig("RESYNC_PERIOD_SECONDS must be positive".to_string()));
        }

        Ok(Self {
            watch_namespace,
            infra_kubeconfig,
            probe_addr,
            grace_window,
            resync_period,
        })
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration, ControllerError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ControllerError::InvalidConfig(format!("{} must be a number of seconds: {}", key, e))),
        None => Ok(Duration::from_secs(default)),
    }
}
