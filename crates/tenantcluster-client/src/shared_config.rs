//! Shared cloud-provider configuration
//!
//! The tenant cluster publishes where its machines live on the infra cluster in
//! the `openshift-config/cloud-provider-config` ConfigMap. Current installers
//! write a JSON document under the `config` key; older ones wrote the namespace
//! directly under `namespace`. Both layouts are accepted.

use crate::error::TenantClusterError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Namespace of the shared cloud-provider ConfigMap.
pub const CONFIG_MAP_NAMESPACE: &str = "openshift-config";
/// Name of the shared cloud-provider ConfigMap.
pub const CONFIG_MAP_NAME: &str = "cloud-provider-config";
/// Data key holding the JSON document.
pub const CONFIG_MAP_DATA_KEY: &str = "config";
/// Key naming the infra namespace.
pub const INFRA_NAMESPACE_KEY: &str = "namespace";
/// Key naming the infra ID.
pub const INFRA_ID_KEY: &str = "infraID";

/// Cluster-wide settings shared between the tenant and infra clusters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SharedClusterConfig {
    /// Infra cluster namespace holding this tenant's VMs
    pub namespace: String,
    /// Infra ID used to label owned infra objects, if published
    #[serde(rename = "infraID", default)]
    pub infra_id: Option<String>,
}

/// Parse the data of the shared cloud-provider ConfigMap.
pub fn parse_cloud_provider_config(data: &BTreeMap<String, String>) -> Result<SharedClusterConfig, TenantClusterError> {
    let what = format!("configMap {}/{}", CONFIG_MAP_NAMESPACE, CONFIG_MAP_NAME);

    let config = if let Some(raw) = data.get(CONFIG_MAP_DATA_KEY) {
        let mut config: SharedClusterConfig = serde_json::from_str(raw).map_err(|e| {
            TenantClusterError::InvalidSharedConfig(format!("{}: key {} is not valid: {}", what, CONFIG_MAP_DATA_KEY, e))
        })?;
        config.infra_id = config.infra_id.filter(|id| !id.is_empty());
        config
    } else if let Some(namespace) = data.get(INFRA_NAMESPACE_KEY) {
        SharedClusterConfig {
            namespace: namespace.clone(),
            infra_id: data.get(INFRA_ID_KEY).filter(|id| !id.is_empty()).cloned(),
        }
    } else {
        return Err(TenantClusterError::InvalidSharedConfig(format!(
            "{} contains neither {} nor {}",
            what, CONFIG_MAP_DATA_KEY, INFRA_NAMESPACE_KEY
        )));
    };

    if config.namespace.is_empty() {
        return Err(TenantClusterError::InvalidSharedConfig(format!("{}: {} is empty", what, INFRA_NAMESPACE_KEY)));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_parse_json_document() {
        let config = parse_cloud_provider_config(&data(&[(
            "config",
            r#"{"namespace":"tenant-infra","infraID":"ocp-x7k2"}"#,
        )]))
        .unwrap();
        assert_eq!(config.namespace, "tenant-infra");
        assert_eq!(config.infra_id.as_deref(), Some("ocp-x7k2"));
    }

    #[test]
    fn test_parse_legacy_namespace_key() {
        let config = parse_cloud_provider_config(&data(&[("namespace", "tenant-infra")])).unwrap();
        assert_eq!(config.namespace, "tenant-infra");
        assert_eq!(config.infra_id, None);
    }

    #[test]
    fn test_json_document_wins_over_legacy_key() {
        let config = parse_cloud_provider_config(&data(&[
            ("config", r#"{"namespace":"from-json"}"#),
            ("namespace", "from-key"),
        ]))
        .unwrap();
        assert_eq!(config.namespace, "from-json");
    }

    #[test]
    fn test_missing_keys_is_invalid() {
        let err = parse_cloud_provider_config(&data(&[("other", "x")])).unwrap_err();
        assert!(matches!(err, TenantClusterError::InvalidSharedConfig(_)));
    }

    #[test]
    fn test_json_without_namespace_is_invalid() {
        let err = parse_cloud_provider_config(&data(&[("config", r#"{"infraID":"ocp"}"#)])).unwrap_err();
        assert!(matches!(err, TenantClusterError::InvalidSharedConfig(_)));
    }

    #[test]
    fn test_empty_namespace_is_invalid() {
        let err = parse_cloud_provider_config(&data(&[("namespace", "")])).unwrap_err();
        assert!(matches!(err, TenantClusterError::InvalidSharedConfig(_)));
    }
}
