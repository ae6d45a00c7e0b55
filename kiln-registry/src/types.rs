//! Discovery-service wire types

use serde::{Deserialize, Serialize};

use kiln_core::Protocol;

/// Where the registered worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryMode {
    Local,
}

/// A stateful-object namespace exposed by a registered worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatefulObjectRecord {
    pub name: String,
    pub class_name: String,
}

/// One worker's entry in the discovery service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub protocol: Protocol,
    pub mode: RegistryMode,
    pub host: String,
    pub port: u16,
    pub stateful_objects: Vec<StatefulObjectRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stateful_object_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stateful_object_port: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_wire_shape() {
        let entry = RegistryEntry {
            protocol: Protocol::Http,
            mode: RegistryMode::Local,
            host: "127.0.0.1".to_string(),
            port: 8787,
            stateful_objects: vec![StatefulObjectRecord {
                name: "COUNTER".to_string(),
                class_name: "Counter".to_string(),
            }],
            stateful_object_host: Some("127.0.0.1".to_string()),
            stateful_object_port: Some(8788),
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["protocol"], "http");
        assert_eq!(json["mode"], "local");
        assert_eq!(json["statefulObjects"][0]["className"], "Counter");
        assert_eq!(json["statefulObjectPort"], 8788);
    }

    #[test]
    fn test_entry_omits_absent_secondary_address() {
        let entry = RegistryEntry {
            protocol: Protocol::Http,
            mode: RegistryMode::Local,
            host: "127.0.0.1".to_string(),
            port: 8787,
            stateful_objects: Vec::new(),
            stateful_object_host: None,
            stateful_object_port: None,
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("statefulObjectHost").is_none());
        assert!(json.get("statefulObjectPort").is_none());
    }
}
