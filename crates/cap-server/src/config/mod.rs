//! Configuration types for the cap stub server.

mod body;
mod loader;
mod protocol;
mod request;
mod request_log;
mod response;
mod server;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

pub use body::{HttpBody, TextEncoding};
pub use loader::{ConfigLoader, DEFAULT_POLL_INTERVAL};
pub use protocol::Scheme;
pub use request::{HttpMethod, RequestConfig};
pub use request_log::{BodyType, LogPolicy, RequestLogConfig};
pub use response::{ResponseConfig, StatusCode};
pub use server::{BaseUrl, ServerConfig, SslConfig};

/// Errors raised while reading, decoding or validating a configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file '{}' reading error: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Config file parsing error: {0}")]
    Decode(#[from] serde_yaml::Error),
    #[error("Config file parsing error: {path}: {message}")]
    Invalid { path: String, message: String },
}

impl ConfigError {
    fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Root of the configuration file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_servers")]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub requests: BTreeMap<String, RequestConfig>,
    #[serde(default = "default_responses")]
    pub responses: BTreeMap<String, ResponseConfig>,
    /// Global request logging policy, laid over the built-in defaults
    #[serde(default)]
    pub request_log_config: RequestLogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            requests: BTreeMap::new(),
            responses: default_responses(),
            request_log_config: RequestLogConfig::default(),
        }
    }
}

fn default_servers() -> Vec<ServerConfig> {
    vec![ServerConfig::default()]
}

fn default_responses() -> BTreeMap<String, ResponseConfig> {
    BTreeMap::from([(server::default_response_id(), ResponseConfig::default())])
}

impl Config {
    /// Decode a YAML document and validate it
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Global logging policy with the built-in defaults filled in
    pub fn global_log_config(&self) -> RequestLogConfig {
        RequestLogConfig::builtin_defaults().merge(&self.request_log_config)
    }

    /// Rules of a server in declaration order
    pub fn server_requests<'a>(
        &'a self,
        server: &'a ServerConfig,
    ) -> impl Iterator<Item = (&'a str, &'a RequestConfig)> + 'a {
        server
            .requests_ids
            .iter()
            .filter_map(|id| self.requests.get(id).map(|request| (id.as_str(), request)))
    }

    /// Validate cross-references and constraints decoding cannot express.
    /// The first problem found is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::invalid(
                "servers",
                "at least one server must be configured",
            ));
        }

        let mut identities = HashSet::new();
        for (index, server) in self.servers.iter().enumerate() {
            let path = format!("servers[{index}]");

            server
                .validate_protocol_configured()
                .map_err(|message| ConfigError::invalid(format!("{path}.ssl_config"), message))?;

            if !identities.insert(server.identity()) {
                return Err(ConfigError::invalid(
                    format!("{path}.base_url"),
                    format!(
                        "server '{}' conflicts with another server on {}",
                        server.base_url,
                        server.identity()
                    ),
                ));
            }

            for request_id in &server.requests_ids {
                if !self.requests.contains_key(request_id) {
                    return Err(ConfigError::invalid(
                        format!("{path}.requests_ids"),
                        format!("request '{request_id}' is not described"),
                    ));
                }
            }

            if !self.responses.contains_key(&server.default_response_id) {
                return Err(ConfigError::invalid(
                    format!("{path}.default_response_id"),
                    format!(
                        "response '{}' is not described",
                        server.default_response_id
                    ),
                ));
            }
        }

        for (id, request) in &self.requests {
            if !self.responses.contains_key(&request.response_id) {
                return Err(ConfigError::invalid(
                    format!("requests.{id}.response_id"),
                    format!("response '{}' is not described", request.response_id),
                ));
            }
        }

        for (id, response) in &self.responses {
            response
                .validate_delay()
                .map_err(|message| ConfigError::invalid(format!("responses.{id}.seconds_delay"), message))?;
        }

        Ok(())
    }
}
