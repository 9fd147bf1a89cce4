//! Request rules: what an inbound request must look like to select a response.

use super::body::HttpBody;
use super::server::default_response_id;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// HTTP verbs a rule can match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
    Trace,
    Connect,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A matching rule. `mapping` is appended to the server base path.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestConfig {
    #[serde(default = "default_mapping")]
    pub mapping: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Query pairs that must be present with exactly these values
    #[serde(
        default,
        deserialize_with = "deserialize_optional_scalar_map",
        skip_serializing_if = "Option::is_none"
    )]
    pub parameters: Option<HashMap<String, String>>,
    /// Byte-exact body the request must carry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<HttpBody>,
    #[serde(default = "default_response_id")]
    pub response_id: String,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            mapping: default_mapping(),
            method: HttpMethod::default(),
            parameters: None,
            body: None,
            response_id: default_response_id(),
        }
    }
}

fn default_mapping() -> String {
    "/".to_string()
}

fn scalar_values(raw: HashMap<String, serde_yaml::Value>) -> Result<HashMap<String, String>, String> {
    raw.into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => return Err(format!("value of '{key}' must be a scalar, got {other:?}")),
            };
            Ok((key, text))
        })
        .collect()
}

/// Map whose values may be written as any YAML scalar (`id: 42`, `flag: true`)
pub(crate) fn deserialize_scalar_map<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: HashMap<String, serde_yaml::Value> = HashMap::deserialize(deserializer)?;
    scalar_values(raw).map_err(serde::de::Error::custom)
}

/// Like [`deserialize_scalar_map`]; an explicit `null` means "no constraint"
fn deserialize_optional_scalar_map<'de, D>(
    deserializer: D,
) -> Result<Option<HashMap<String, String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<HashMap<String, serde_yaml::Value>> = Option::deserialize(deserializer)?;
    raw.map(scalar_values)
        .transpose()
        .map_err(serde::de::Error::custom)
}
