//! Runtime configuration (§6.2): compiled-in defaults, overridden by an
//! optional TOML file, overridden again by `BROKER_`-prefixed environment
//! variables. Command-line flag parsing is out of scope; `main` may still
//! accept a single positional path to the TOML file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::BrokerError;

const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:4200";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Raw, partially-specified configuration as it appears in the TOML file.
/// Every field is optional so a file may override only what it needs to.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    listen_address: Option<String>,
    request_timeout: Option<u64>,
    logs_dir: Option<PathBuf>,
    publish_logging_enabled: Option<bool>,
}

/// Fully resolved, validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_address: SocketAddr,
    pub request_timeout: Duration,
    pub logs_dir: PathBuf,
    pub publish_logging_enabled: bool,
}

impl Config {
    /// Loads configuration from, in increasing priority: compiled-in
    /// defaults, `path` (if given and present), then `BROKER_`-prefixed
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, BrokerError> {
        let file = match path {
            Some(path) => read_file_config(path)?,
            None => FileConfig::default(),
        };

        let listen_address = env_override("BROKER_LISTEN_ADDRESS")
            .or(file.listen_address)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_owned());
        let listen_address = listen_address
            .parse()
            .map_err(|source| BrokerError::InvalidListenAddress {
                value: listen_address.clone(),
                source,
            })?;

        let request_timeout_secs = match env_override("BROKER_REQUEST_TIMEOUT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| BrokerError::InvalidRequestTimeout { value: raw })?,
            None => file.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        };
        let request_timeout = Duration::from_secs(if request_timeout_secs == 0 {
            DEFAULT_REQUEST_TIMEOUT_SECS
        } else {
            request_timeout_secs
        });

        let logs_dir = env_override("BROKER_LOGS_DIR")
            .map(PathBuf::from)
            .or(file.logs_dir)
            .unwrap_or_default();

        let publish_logging_enabled = match env_override("BROKER_PUBLISH_LOGGING_ENABLED") {
            Some(raw) => parse_bool(&raw),
            None => file.publish_logging_enabled.unwrap_or(false),
        };

        Ok(Self {
            listen_address,
            request_timeout,
            logs_dir,
            publish_logging_enabled,
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, BrokerError> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| BrokerError::ConfigRead {
        path: path.to_owned(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| BrokerError::ConfigParse {
        path: path.to_owned(),
        source,
    })
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
