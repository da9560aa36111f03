//! Ignition user-data handling.
//!
//! The machine's ignition document is passed through untouched except for a
//! hostname file appended to `storage.files`. The document is edited as an
//! insertion-ordered JSON map, so existing keys keep their position and a
//! missing `storage` is appended last.

use crate::error::MachineError;
use serde::Serialize;
use serde_json::{Map, Value};

const HOSTNAME_PATH: &str = "/etc/hostname";
const ROOT_FILESYSTEM: &str = "root";
/// 0644
const HOSTNAME_MODE: u32 = 420;

#[derive(Debug, Serialize)]
struct IgnitionFile<'a> {
    filesystem: &'a str,
    path: &'a str,
    mode: u32,
    contents: IgnitionFileContents,
}

#[derive(Debug, Serialize)]
struct IgnitionFileContents {
    source: String,
}

/// Append an `/etc/hostname` entry for `hostname` to the ignition document in `user_data`.
///
/// Empty user data is treated as an empty document. Anything that is not a
/// JSON object with an object-valued `storage` and a list-valued `storage.files`
/// is rejected as invalid configuration.
pub fn add_hostname(user_data: &[u8], hostname: &str) -> Result<Vec<u8>, MachineError> {
    let mut config: Map<String, Value> = if user_data.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else {
        serde_json::from_slice(user_data)
            .map_err(|e| MachineError::InvalidConfiguration(format!("ignition user data is not a valid document: {}", e)))?
    };

    let file = IgnitionFile {
        filesystem: ROOT_FILESYSTEM,
        path: HOSTNAME_PATH,
        mode: HOSTNAME_MODE,
        contents: IgnitionFileContents { source: format!("data:,{}", hostname) },
    };
    let file = serde_json::to_value(file).map_err(|e| MachineError::InvalidConfiguration(e.to_string()))?;

    let Value::Object(storage) = config.entry("storage").or_insert_with(|| Value::Object(Map::new())) else {
        return Err(invalid("storage"));
    };
    let Value::Array(files) = storage.entry("files").or_insert_with(|| Value::Array(Vec::new())) else {
        return Err(invalid("storage.files"));
    };
    files.push(file);

    serde_json::to_vec(&config).map_err(|e| MachineError::InvalidConfiguration(e.to_string()))
}

fn invalid(field: &str) -> MachineError {
    MachineError::InvalidConfiguration(format!("ignition user data has an invalid {} field", field))
}
