//! Server, base URL and TLS configuration.

use super::protocol::Scheme;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static BASE_URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((\w+)://)?([\w.]+)(:(\d{1,5}))?((/\w+)*)$").expect("valid base url pattern")
});

/// Parsed `[scheme://]host[:port][/base/path]` of a server.
///
/// Constructed through `TryFrom<String>`, so an invalid URL is rejected while
/// the configuration document is being decoded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct BaseUrl {
    raw: String,
    scheme: Scheme,
    host: String,
    port: u16,
    base_path: String,
}

impl BaseUrl {
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path prefix every rule mapping is appended to (empty when absent)
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// `scheme://host:port` without the base path
    pub fn origin(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let captures = BASE_URL_PATTERN
            .captures(&raw)
            .ok_or_else(|| format!("Invalid server base url: '{raw}'"))?;

        let scheme = match captures.get(2) {
            Some(s) => Scheme::from_scheme(s.as_str())?,
            None => Scheme::Http,
        };

        let port = match captures.get(5) {
            Some(p) => {
                let value: u32 = p
                    .as_str()
                    .parse()
                    .map_err(|_| format!("Invalid port value '{}'", p.as_str()))?;
                u16::try_from(value).map_err(|_| {
                    format!(
                        "Port value '{}' is not from range 0-65535",
                        p.as_str()
                    )
                })?
            }
            None => scheme.default_port(),
        };

        let host = captures[3].to_string();
        let base_path = captures
            .get(6)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        Ok(Self {
            raw,
            scheme,
            host,
            port,
            base_path,
        })
    }
}

impl From<BaseUrl> for String {
    fn from(url: BaseUrl) -> Self {
        url.raw
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// TLS material for an https server
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SslConfig {
    /// Path to the private key (PEM). Falls back to `certfile` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyfile: Option<String>,
    /// Path to the certificate chain (PEM)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certfile: Option<String>,
    /// Decrypts an encrypted PKCS#8 key; ignored for plain keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyfile_password: Option<String>,
    /// CA bundle used to verify client certificates when presented
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certs: Option<String>,
}

impl SslConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.certfile.is_none() && self.ca_certs.is_none() {
            return Err(
                "At least one certificate file must be specified in SSL configuration".to_string(),
            );
        }
        Ok(())
    }
}

/// One configured listener
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: BaseUrl,
    /// Rule order for this server; the first matching request wins
    #[serde(default, deserialize_with = "deserialize_ordered_ids")]
    pub requests_ids: Vec<String>,
    #[serde(default = "default_response_id")]
    pub default_response_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_config: Option<SslConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            alias: None,
            base_url: default_base_url(),
            requests_ids: Vec::new(),
            default_response_id: default_response_id(),
            ssl_config: None,
        }
    }
}

impl ServerConfig {
    /// Key that identifies the listener across a configuration:
    /// `host:port/base/path`.
    pub fn identity(&self) -> String {
        format!(
            "{}:{}{}",
            self.base_url.host(),
            self.base_url.port(),
            self.base_url.base_path()
        )
    }

    /// Human-readable name used in application logs
    pub fn display_name(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} ({alias})", self.base_url),
            None => self.base_url.to_string(),
        }
    }

    /// SSL must be present for https; when present it must name a certificate
    pub fn validate_protocol_configured(&self) -> Result<(), String> {
        match (&self.ssl_config, self.base_url.scheme()) {
            (None, Scheme::Https) => Err(format!(
                "Required SSL configuration for schema 'https' for server '{}'",
                self.base_url
            )),
            (Some(ssl), _) => ssl.validate(),
            (None, Scheme::Http) => Ok(()),
        }
    }
}

pub(crate) fn default_response_id() -> String {
    "default".to_string()
}

fn default_base_url() -> BaseUrl {
    BaseUrl::try_from("http://0.0.0.0:80/api".to_string()).expect("valid default base url")
}

/// Keep declaration order, dropping repeated ids
fn deserialize_ordered_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Vec<String> = Vec::deserialize(deserializer)?;
    let mut ids: Vec<String> = Vec::with_capacity(raw.len());
    for id in raw {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Result<BaseUrl, String> {
        BaseUrl::try_from(raw.to_string())
    }

    #[test]
    fn test_base_url_full() {
        let parsed = url("https://localhost:8443/api/v1").unwrap();
        assert_eq!(parsed.scheme(), Scheme::Https);
        assert_eq!(parsed.host(), "localhost");
        assert_eq!(parsed.port(), 8443);
        assert_eq!(parsed.base_path(), "/api/v1");
        assert_eq!(parsed.origin(), "https://localhost:8443");
    }

    #[test]
    fn test_base_url_defaults() {
        let parsed = url("0.0.0.0").unwrap();
        assert_eq!(parsed.scheme(), Scheme::Http);
        assert_eq!(parsed.port(), 80);
        assert_eq!(parsed.base_path(), "");

        let parsed = url("HTTPS://example.org").unwrap();
        assert_eq!(parsed.scheme(), Scheme::Https);
        assert_eq!(parsed.port(), 443);
    }

    #[test]
    fn test_base_url_rejects_bad_input() {
        assert!(url("ftp://host:21").unwrap_err().contains("Invalid schema"));
        assert!(url("http://host:70000").unwrap_err().contains("0-65535"));
        assert!(url("http://host/a-b").unwrap_err().contains("Invalid server base url"));
        assert!(url("http://host/api/").is_err());
    }

    #[test]
    fn test_identity_includes_port_and_path() {
        let server = ServerConfig {
            base_url: url("http://127.0.0.1:9000/api").unwrap(),
            ..Default::default()
        };
        assert_eq!(server.identity(), "127.0.0.1:9000/api");
    }

    #[test]
    fn test_https_requires_ssl() {
        let mut server = ServerConfig {
            base_url: url("https://127.0.0.1:9443").unwrap(),
            ..Default::default()
        };
        assert!(server.validate_protocol_configured().is_err());

        server.ssl_config = Some(SslConfig::default());
        let err = server.validate_protocol_configured().unwrap_err();
        assert!(err.contains("At least one certificate"));

        server.ssl_config = Some(SslConfig {
            certfile: Some("cert.pem".to_string()),
            ..Default::default()
        });
        assert!(server.validate_protocol_configured().is_ok());
    }

    #[test]
    fn test_requests_ids_keep_order_and_dedupe() {
        let yaml = "base_url: http://127.0.0.1:8080\nrequests_ids: [b, a, b, c]\n";
        let server: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(server.requests_ids, vec!["b", "a", "c"]);
        assert_eq!(server.default_response_id, "default");
    }
}
