//! Canned responses.

use super::body::HttpBody;
use super::request::deserialize_scalar_map;
use super::request_log::RequestLogConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Response status restricted to 100..=599
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::OK
    }
}

impl TryFrom<u16> for StatusCode {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        if (100..=599).contains(&code) {
            Ok(Self(code))
        } else {
            Err(format!("Status {code} is not from range 100-599"))
        }
    }
}

impl From<StatusCode> for u16 {
    fn from(status: StatusCode) -> Self {
        status.0
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResponseConfig {
    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: HttpBody,
    #[serde(default)]
    pub status: StatusCode,
    /// Artificial latency before the response is sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_delay: Option<f64>,
    /// Overrides of the global request logging policy for requests answered by this response
    #[serde(default)]
    pub request_log_config: RequestLogConfig,
}

impl ResponseConfig {
    pub fn validate_delay(&self) -> Result<(), String> {
        match self.seconds_delay {
            Some(secs) if !secs.is_finite() || secs < 0.0 => Err(format!(
                "Delay {secs} must be a finite, non-negative number of seconds"
            )),
            Some(secs) if Duration::try_from_secs_f64(secs).is_err() => {
                Err(format!("Delay {secs} is out of range"))
            }
            _ => Ok(()),
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        self.seconds_delay
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}
