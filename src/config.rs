//! Startup configuration
//!
//! The config document is the `config.json` rendered from the TimeSyncConfig
//! resource. It is kept opaque and forwarded verbatim through the REST API;
//! only the few fields the aggregator needs are read through accessors.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::sources::{DEFAULT_GPSD_HOST, DEFAULT_GPSD_PORT};

/// Config file used when no path is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "/config.json";

/// Environment variable carrying the name of the Node to reconcile
pub const NODE_NAME_ENV: &str = "NODE_NAME";

/// Environment variable enabling debug logging
pub const DEBUG_ENV: &str = "DEBUG";

/// Opaque JSON config document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDocument(Map<String, Value>);

impl ConfigDocument {
    /// Validate a parsed document
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the document is not a non-empty object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) if !map.is_empty() => Ok(Self(map)),
            Value::Object(_) => Err(Error::ConfigError("Missing configuration".to_string())),
            other => Err(Error::ConfigError(format!(
                "configuration must be a JSON object, got {}",
                json_type(&other)
            ))),
        }
    }

    /// Read and validate the document at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let value: Value = serde_json::from_str(&contents)?;
        Self::from_value(value)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `gps.enabled`, false when missing or not a boolean
    pub fn gps_enabled(&self) -> bool {
        self.gps_field("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// gpsd address from `gps.host` and `gps.port`
    pub fn gps_endpoint(&self) -> String {
        let host = self
            .gps_field("host")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_GPSD_HOST);
        let port = self
            .gps_field("port")
            .and_then(Value::as_u64)
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_GPSD_PORT);
        if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, port)
        } else {
            format!("{}:{}", host, port)
        }
    }

    fn gps_field(&self, key: &str) -> Option<&Value> {
        self.0.get("gps").and_then(|gps| gps.get(key))
    }
}

/// Read the Node name from the environment
///
/// # Errors
///
/// Returns [`Error::MissingEnv`] if `NODE_NAME` is unset or empty.
pub fn node_name_from_env() -> Result<String> {
    node_name(std::env::var(NODE_NAME_ENV).ok())
}

fn node_name(value: Option<String>) -> Result<String> {
    value
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or(Error::MissingEnv(NODE_NAME_ENV))
}

/// Interpret the `DEBUG` environment value
pub fn debug_enabled(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "1" | "on")
    )
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"gps": {{"enabled": true, "device": "ttyACM0"}}, "ntp": {{"servers": []}}}}"#
        )
        .unwrap();

        let config = ConfigDocument::load(file.path()).unwrap();
        assert!(config.gps_enabled());
        assert_eq!(config.gps_endpoint(), "127.0.0.1:2947");
        assert_eq!(config.as_map()["gps"]["device"], json!("ttyACM0"));
    }

    #[test]
    fn test_missing_or_invalid_file_is_an_error() {
        assert!(matches!(
            ConfigDocument::load(Path::new("/nonexistent/config.json")),
            Err(Error::ConfigError(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            ConfigDocument::load(file.path()),
            Err(Error::SerializationError(_))
        ));
    }

    #[test]
    fn test_document_must_be_non_empty_object() {
        assert!(ConfigDocument::from_value(json!({})).is_err());
        assert!(ConfigDocument::from_value(json!([1, 2])).is_err());
        assert!(ConfigDocument::from_value(json!(null)).is_err());
        assert!(ConfigDocument::from_value(json!({"gps": {}})).is_ok());
    }

    #[test]
    fn test_gps_gate_and_endpoint() {
        let config = ConfigDocument::from_value(json!({"ptp": {"enabled": true}})).unwrap();
        assert!(!config.gps_enabled());

        let config = ConfigDocument::from_value(json!({"gps": {"enabled": "yes"}})).unwrap();
        assert!(!config.gps_enabled());

        let config = ConfigDocument::from_value(
            json!({"gps": {"enabled": true, "host": "gpsd.local", "port": 3000}}),
        )
        .unwrap();
        assert!(config.gps_enabled());
        assert_eq!(config.gps_endpoint(), "gpsd.local:3000");

        let config =
            ConfigDocument::from_value(json!({"gps": {"enabled": true, "port": 70000}})).unwrap();
        assert_eq!(config.gps_endpoint(), "127.0.0.1:2947");
    }

    #[test]
    fn test_gps_endpoint_ipv6_host() {
        let config =
            ConfigDocument::from_value(json!({"gps": {"host": "::1", "port": 2947}})).unwrap();
        assert_eq!(config.gps_endpoint(), "[::1]:2947");
        assert!(config.gps_endpoint().parse::<std::net::SocketAddr>().is_ok());

        let config = ConfigDocument::from_value(json!({"gps": {"host": "[fe80::1]"}})).unwrap();
        assert_eq!(config.gps_endpoint(), "[fe80::1]:2947");
    }

    #[test]
    fn test_serializes_verbatim() {
        let value = json!({"gps": {"enabled": false}, "extra": [1, "two", null]});
        let config = ConfigDocument::from_value(value.clone()).unwrap();
        assert_eq!(serde_json::to_value(&config).unwrap(), value);
    }

    #[test]
    fn test_node_name() {
        assert_eq!(node_name(Some("node-1".to_string())).unwrap(), "node-1");
        assert!(matches!(node_name(None), Err(Error::MissingEnv("NODE_NAME"))));
        assert!(node_name(Some("  ".to_string())).is_err());
    }

    #[test]
    fn test_debug_flag() {
        assert!(debug_enabled(Some("true")));
        assert!(debug_enabled(Some("1")));
        assert!(debug_enabled(Some("ON")));
        assert!(!debug_enabled(Some("false")));
        assert!(!debug_enabled(None));
    }
}
