//! Request logging policy.
//!
//! Every field of [`RequestLogConfig`] is optional: `None` inherits the value
//! from the layer below. The layers are, bottom to top, the built-in defaults,
//! the global `request_log_config` and the `request_log_config` of the
//! response answering the request. [`RequestLogConfig::merge`] is the single
//! place that combines two layers.

use super::body::TextEncoding;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a logged request body is represented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyType {
    Text,
    Bytes,
    /// Decide from the content type, falling back to content sniffing
    Auto,
}

/// Tri-state logging knobs; `None` means "inherit"
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RequestLogConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_as_file: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_files_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_type: Option<BodyType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_encoding: Option<TextEncoding>,
    /// Request log file; an empty string disables file logging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_console: Option<bool>,
}

impl RequestLogConfig {
    /// Values used where neither the global nor the response config sets a field
    pub fn builtin_defaults() -> Self {
        Self {
            headers_enabled: Some(true),
            body_enabled: Some(true),
            body_as_file: Some(false),
            body_files_folder: None,
            body_type: Some(BodyType::Auto),
            body_encoding: Some(TextEncoding::utf8()),
            log_file: None,
            log_console: Some(true),
        }
    }

    /// Lay `overrides` on top of `self`: every field set in `overrides` wins.
    pub fn merge(&self, overrides: &RequestLogConfig) -> RequestLogConfig {
        RequestLogConfig {
            headers_enabled: overrides.headers_enabled.or(self.headers_enabled),
            body_enabled: overrides.body_enabled.or(self.body_enabled),
            body_as_file: overrides.body_as_file.or(self.body_as_file),
            body_files_folder: overrides
                .body_files_folder
                .clone()
                .or_else(|| self.body_files_folder.clone()),
            body_type: overrides.body_type.or(self.body_type),
            body_encoding: overrides.body_encoding.or(self.body_encoding),
            log_file: overrides
                .log_file
                .clone()
                .or_else(|| self.log_file.clone()),
            log_console: overrides.log_console.or(self.log_console),
        }
    }

    /// Collapse the tri-state fields into a concrete policy
    pub fn resolve(&self) -> LogPolicy {
        LogPolicy {
            headers_enabled: self.headers_enabled.unwrap_or(false),
            body_enabled: self.body_enabled.unwrap_or(false),
            body_as_file: self.body_as_file.unwrap_or(false),
            body_files_folder: self
                .body_files_folder
                .as_deref()
                .filter(|folder| !folder.is_empty())
                .map(PathBuf::from),
            body_type: self.body_type.unwrap_or(BodyType::Auto),
            body_encoding: self.body_encoding.unwrap_or_default(),
            log_file: self
                .log_file
                .as_deref()
                .filter(|file| !file.is_empty())
                .map(PathBuf::from),
            log_console: self.log_console.unwrap_or(false),
        }
    }
}

/// Effective, fully resolved logging policy for one request
#[derive(Debug, Clone, PartialEq)]
pub struct LogPolicy {
    pub headers_enabled: bool,
    pub body_enabled: bool,
    pub body_as_file: bool,
    /// `None` means the current working directory
    pub body_files_folder: Option<PathBuf>,
    pub body_type: BodyType,
    pub body_encoding: TextEncoding,
    pub log_file: Option<PathBuf>,
    pub log_console: bool,
}

impl LogPolicy {
    /// Nothing to do when no sink is enabled
    pub fn is_enabled(&self) -> bool {
        self.log_console || self.log_file.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_override_wins_when_set() {
        let global = RequestLogConfig {
            log_file: Some("requests.log".to_string()),
            body_type: Some(BodyType::Text),
            log_console: Some(true),
            ..Default::default()
        };
        let overrides = RequestLogConfig {
            body_type: Some(BodyType::Bytes),
            log_console: Some(false),
            ..Default::default()
        };

        let merged = global.merge(&overrides);
        assert_eq!(merged.body_type, Some(BodyType::Bytes));
        assert_eq!(merged.log_console, Some(false));
        assert_eq!(merged.log_file.as_deref(), Some("requests.log"));
        assert_eq!(merged.headers_enabled, None);
    }

    #[test]
    fn test_merge_with_empty_override_is_identity() {
        let global = RequestLogConfig::builtin_defaults();
        assert_eq!(global.merge(&RequestLogConfig::default()), global);
    }

    #[test]
    fn test_empty_log_file_disables_global_file() {
        let global = RequestLogConfig {
            log_file: Some("requests.log".to_string()),
            log_console: Some(false),
            ..Default::default()
        };
        let overrides = RequestLogConfig {
            log_file: Some(String::new()),
            ..Default::default()
        };

        let policy = global.merge(&overrides).resolve();
        assert!(policy.log_file.is_none());
        assert!(!policy.is_enabled());
    }

    #[test]
    fn test_builtin_defaults_resolve() {
        let policy = RequestLogConfig::builtin_defaults().resolve();
        assert!(policy.headers_enabled);
        assert!(policy.body_enabled);
        assert!(!policy.body_as_file);
        assert_eq!(policy.body_type, BodyType::Auto);
        assert_eq!(policy.body_encoding, TextEncoding::utf8());
        assert!(policy.log_console);
        assert!(policy.log_file.is_none());
        assert!(policy.body_files_folder.is_none());
    }

    #[test]
    fn test_parse_partial_config() {
        let yaml = "body_type: bytes\nbody_encoding: cp1251\nlog_file: out.log\n";
        let config: RequestLogConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.body_type, Some(BodyType::Bytes));
        assert_eq!(config.body_encoding.unwrap().name(), "windows-1251");
        assert!(config.log_console.is_none());

        assert!(serde_yaml::from_str::<RequestLogConfig>("body_encoding: nope").is_err());
    }
}
