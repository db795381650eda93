use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("fetchurl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

/// Settings for the built-in transfer engine and the fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Limit for the whole transfer, redirects included.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_true")]
    pub tls_verify: bool,

    /// PEM file with extra trusted root certificates.
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,

    #[serde(default)]
    pub max_body_bytes: Option<usize>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: None,
            user_agent: default_user_agent(),
            tls_verify: true,
            ca_cert_path: None,
            max_body_bytes: None,
        }
    }
}

impl FetchConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn deserialize_config(config_str: &str, is_json: bool) -> std::io::Result<FetchConfig> {
    if is_json {
        serde_json::from_str(config_str).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("failed to parse config JSON: {}", e),
            )
        })
    } else {
        serde_yaml::from_str(config_str).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("failed to parse config YAML: {}", e),
            )
        })
    }
}

/// Loads a config file. Files ending in `.json` are parsed as JSON,
/// everything else as YAML.
pub fn load_config(config_path: &Path) -> std::io::Result<FetchConfig> {
    let config_str = std::fs::read_to_string(config_path)?;
    let is_json = config_path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    deserialize_config(&config_str, is_json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_with_defaults() {
        let config = deserialize_config("timeout_secs: 10\ntls_verify: false\n", false).unwrap();
        assert_eq!(config.timeout(), Some(Duration::from_secs(10)));
        assert!(!config.tls_verify);
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert!(config.user_agent.starts_with("fetchurl/"));
        assert_eq!(config.max_body_bytes, None);
    }

    #[test]
    fn json_config() {
        let config = deserialize_config(
            r#"{"user_agent": "test-agent", "max_body_bytes": 1024, "ca_cert_path": "/tmp/ca.pem"}"#,
            true,
        )
        .unwrap();
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.max_body_bytes, Some(1024));
        assert_eq!(config.ca_cert_path, Some(PathBuf::from("/tmp/ca.pem")));
    }

    #[test]
    fn empty_yaml_mapping_is_default() {
        assert_eq!(
            deserialize_config("{}", false).unwrap(),
            FetchConfig::default()
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = deserialize_config("max_redirects: 5\n", false).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Path::new("/nonexistent/fetchurl.yaml")).is_err());
    }
}
