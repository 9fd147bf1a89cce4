//! Serialized shape of one request-log entry.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Key/value pairs serialized as a mapping in their original order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedPairs(pub Vec<(String, String)>);

impl Serialize for OrderedPairs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerInfo {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFields {
    pub server: ServerInfo,
    pub method: String,
    pub mapping: String,
    pub parameters: OrderedPairs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<OrderedPairs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_file: Option<String>,
}

/// One logged request, keyed by its arrival timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub timestamp: String,
    pub fields: RecordFields,
}

impl Serialize for RequestRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.timestamp, &self.fields)?;
        map.end()
    }
}

impl RequestRecord {
    /// Block-style YAML document terminated by a newline
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        let mut text = serde_yaml::to_string(self)?;
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }
}
