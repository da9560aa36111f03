//! Unit tests for config module

#[cfg(test)]
mod tests {
    use crate::config::ControllerConfig;
    use crate::error::ControllerError;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::from_lookup(lookup(&[("INFRA_KUBECONFIG", "/etc/infra/kubeconfig")])).unwrap();
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.infra_kubeconfig, PathBuf::from("/etc/infra/kubeconfig"));
        assert_eq!(config.probe_addr, "0.0.0.0:8081".parse().unwrap());
        assert_eq!(config.grace_window, Duration::from_secs(60));
        assert_eq!(config.resync_period, Duration::from_secs(600));
    }

    #[test]
    fn test_overrides() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("INFRA_KUBECONFIG", "/kc"),
            ("WATCH_NAMESPACE", "openshift-machine-api"),
            ("PROBE_ADDR", "127.0.0.1:9440"),
            ("GRACE_WINDOW_SECONDS", "120"),
            ("RESYNC_PERIOD_SECONDS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.watch_namespace.as_deref(), Some("openshift-machine-api"));
        assert_eq!(config.probe_addr.port(), 9440);
        assert_eq!(config.grace_window, Duration::from_secs(120));
        assert_eq!(config.resync_period, Duration::from_secs(30));
    }

    #[test]
    fn test_infra_kubeconfig_is_required() {
        let err = ControllerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_watch_namespace_means_all() {
        let config = ControllerConfig::from_lookup(lookup(&[("INFRA_KUBECONFIG", "/kc"), ("WATCH_NAMESPACE", "")])).unwrap();
        assert_eq!(config.watch_namespace, None);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = ControllerConfig::from_lookup(lookup(&[("INFRA_KUBECONFIG", "/kc"), ("GRACE_WINDOW_SECONDS", "soon")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));

        let err = ControllerConfig::from_lookup(lookup(&[("INFRA_KUBECONFIG", "/kc"), ("RESYNC_PERIOD_SECONDS", "0")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_probe_addr_is_rejected() {
        let err = ControllerConfig::from_lookup(lookup(&[("INFRA_KUBECONFIG", "/kc"), ("PROBE_ADDR", "localhost")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}
