//! Unit tests for ignition module

#[cfg(test)]
mod tests {
    use crate::error::MachineError;
    use crate::ignition::add_hostname;
    use serde_json::{json, Value};

    fn inject(src: &str, hostname: &str) -> Value {
        serde_json::from_slice(&add_hostname(src.as_bytes(), hostname).unwrap()).unwrap()
    }

    #[test]
    fn test_hostname_added_to_minimal_document() {
        assert_eq!(
            inject(r#"{"key1":"value1"}"#, "machine-test"),
            json!({
                "key1": "value1",
                "storage": {
                    "files": [{
                        "contents": {"source": "data:,machine-test"},
                        "filesystem": "root",
                        "mode": 420,
                        "path": "/etc/hostname"
                    }]
                }
            })
        );
    }

    #[test]
    fn test_existing_fields_and_files_are_preserved() {
        let doc = inject(
            r#"{
                "ignition": {"version": "3.1.0", "config": {"merge": [{"source": "https://api:22623/config/worker"}]}},
                "storage": {
                    "disks": [{"device": "/dev/vdb"}],
                    "files": [{"path": "/etc/motd", "mode": 420, "overwrite": true}]
                },
                "systemd": {"units": [{"name": "kubelet.service", "enabled": true}]}
            }"#,
            "worker-0",
        );
        assert_eq!(doc["ignition"]["version"], "3.1.0");
        assert_eq!(doc["ignition"]["config"]["merge"][0]["source"], "https://api:22623/config/worker");
        assert_eq!(doc["storage"]["disks"][0]["device"], "/dev/vdb");
        assert_eq!(doc["systemd"]["units"][0]["name"], "kubelet.service");

        let files = doc["storage"]["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0], json!({"path": "/etc/motd", "mode": 420, "overwrite": true}));
        assert_eq!(files[1]["path"], "/etc/hostname");
        assert_eq!(files[1]["contents"]["source"], "data:,worker-0");
    }

    #[test]
    fn test_storage_without_files_gets_a_list() {
        let doc = inject(r#"{"storage":{"disks":[]}}"#, "worker-1");
        assert_eq!(doc["storage"]["disks"], json!([]));
        assert_eq!(doc["storage"]["files"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_user_data_is_an_empty_document() {
        let doc = inject("", "worker-2");
        assert_eq!(doc["storage"]["files"][0]["contents"]["source"], "data:,worker-2");
    }

    #[test]
    fn test_existing_key_order_is_kept() {
        let out = add_hostname(br#"{"systemd":{"units":[]},"ignition":{"version":"3.2.0"},"passwd":{}}"#, "h").unwrap();
        let out = String::from_utf8(out).unwrap();
        let systemd = out.find("\"systemd\"").unwrap();
        let ignition = out.find("\"ignition\"").unwrap();
        let passwd = out.find("\"passwd\"").unwrap();
        let storage = out.find("\"storage\"").unwrap();
        assert!(systemd < ignition && ignition < passwd && passwd < storage, "{}", out);
    }

    #[test]
    fn test_existing_storage_keeps_its_position() {
        let out = add_hostname(br#"{"ignition":{"version":"3.2.0"},"storage":{"files":[]},"passwd":{"users":[]}}"#, "h")
            .unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.find("\"storage\"").unwrap() < out.find("\"passwd\"").unwrap(), "{}", out);
        assert!(out.find("\"ignition\"").unwrap() < out.find("\"storage\"").unwrap(), "{}", out);
    }

    #[test]
    fn test_injection_is_stable() {
        let src = br#"{"ignition":{"version":"3.1.0"},"passwd":{}}"#;
        assert_eq!(add_hostname(src, "worker-3").unwrap(), add_hostname(src, "worker-3").unwrap());
    }

    #[test]
    fn test_malformed_documents_are_invalid_configuration() {
        for src in ["not json", "[1,2]", r#"{"storage":"disk"}"#, r#"{"storage":{"files":{}}}"#] {
            let err = add_hostname(src.as_bytes(), "worker").unwrap_err();
            assert!(matches!(err, MachineError::InvalidConfiguration(_)), "{} should be rejected", src);
        }
    }
}
