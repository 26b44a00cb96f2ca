//! Loads [`MqttOptions`] from a TOML file (§4.8). This is ambient tooling
//! for the CLI demo, not an MQTT semantic — nothing here participates in
//! the wire protocol or connection lifecycle.
//!
//! ```toml
//! client_id = "demo-1"
//! host = "localhost"
//! port = 1883
//! keep_alive_secs = 30
//!
//! [credentials]
//! username = "alice"
//! password = "hunter2"
//!
//! [reconnect]
//! min_sec = 1
//! max_sec = 64
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::options::{MqttOptions, ReconnectOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error(transparent)]
    InvalidOptions(#[from] crate::error::ConnectionError),
}

#[derive(Debug, Deserialize)]
struct LoginFile {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ReconnectFile {
    min_sec: u64,
    max_sec: u64,
}

/// Mirrors [`MqttOptions`] field-for-field, with the same defaults `new`
/// applies, so an absent key in the file behaves exactly like never
/// calling the matching `set_*` builder method.
#[derive(Debug, Deserialize)]
struct MqttOptionsFile {
    client_id: String,
    host: String,
    port: u16,
    #[serde(default = "default_true")]
    clean_session: bool,
    #[serde(default = "default_keep_alive_secs")]
    keep_alive_secs: u16,
    #[serde(default = "default_ping_timeout_secs")]
    ping_timeout_secs: u64,
    #[serde(default)]
    operation_timeout_secs: Option<u64>,
    #[serde(default)]
    credentials: Option<LoginFile>,
    #[serde(default)]
    reconnect: Option<ReconnectFile>,
}

fn default_true() -> bool {
    true
}

fn default_keep_alive_secs() -> u16 {
    60
}

fn default_ping_timeout_secs() -> u64 {
    10
}

impl MqttOptionsFile {
    fn into_options(self) -> Result<MqttOptions, ConfigError> {
        let mut options = MqttOptions::new(self.client_id, self.host, self.port)
            .set_clean_session(self.clean_session)
            .set_keep_alive(self.keep_alive_secs)
            .set_ping_timeout(Duration::from_secs(self.ping_timeout_secs))
            .set_operation_timeout(self.operation_timeout_secs.map(Duration::from_secs));

        if let Some(login) = self.credentials {
            options = options.set_credentials(login.username, login.password);
        }
        if let Some(ReconnectFile { min_sec, max_sec }) = self.reconnect {
            options = options.set_reconnect_options(min_sec, max_sec);
        } else {
            options = options.set_reconnect_options(ReconnectOptions::default().min_sec, ReconnectOptions::default().max_sec);
        }

        options.validate()?;
        Ok(options)
    }
}

/// Parses `contents` as TOML and builds an [`MqttOptions`] from it.
/// `path` is only used to label errors.
pub fn load_from_str(contents: &str, path: &Path) -> Result<MqttOptions, ConfigError> {
    let parsed: MqttOptionsFile = toml::from_str(contents).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    parsed.into_options()
}

/// Reads `path` and builds an [`MqttOptions`] from its TOML contents.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<MqttOptions, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead { path: path.to_path_buf(), source })?;
    load_from_str(&contents, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_file_with_defaults() {
        let options = load_from_str("client_id = \"demo\"\nhost = \"localhost\"\nport = 1883\n", Path::new("demo.toml")).unwrap();
        assert_eq!(options.client_id(), "demo");
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
        assert!(options.clean_session());
    }

    #[test]
    fn loads_full_file() {
        let toml = r#"
            client_id = "demo-1"
            host = "broker.example"
            port = 8883
            clean_session = false
            keep_alive_secs = 30
            ping_timeout_secs = 5

            [credentials]
            username = "alice"
            password = "hunter2"

            [reconnect]
            min_sec = 2
            max_sec = 64
        "#;
        let options = load_from_str(toml, Path::new("demo.toml")).unwrap();
        assert_eq!(options.client_id(), "demo-1");
        assert!(!options.clean_session());
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_keep_alive_shorter_than_ping_timeout() {
        let toml = "client_id = \"demo\"\nhost = \"localhost\"\nport = 1883\nkeep_alive_secs = 1\nping_timeout_secs = 10\n";
        let err = load_from_str(toml, Path::new("demo.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOptions(_)));
    }

    #[test]
    fn missing_file_reports_file_read_error() {
        let err = load_from_file("/nonexistent/path/definitely-not-here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn malformed_toml_reports_parse_error() {
        let err = load_from_str("this is not valid toml =", Path::new("demo.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
