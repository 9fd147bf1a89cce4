//! Request logging pipeline.
//!
//! Every inbound request is turned into a [`RequestRecord`] under the
//! effective policy (built-in defaults, then the global config, then the
//! answering response's override) and written to the console and/or a log
//! file. Failures here are logged and swallowed; they never reach the client.

mod body;
mod record;
mod sink;

pub use body::{classify, classify_media_type, render_body, sniff_media_type, BodyClass};
pub use record::{OrderedPairs, RecordFields, RequestRecord, ServerInfo};
pub use sink::{ConsoleSink, FileSinks};

use crate::config::{LogPolicy, RequestLogConfig, ServerConfig};
use crate::matcher::InboundRequest;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

#[derive(Debug, thiserror::Error)]
pub enum RequestLogError {
    #[error("Request record serialization error: {0}")]
    Serialize(#[from] serde_yaml::Error),
    #[error("Request log write to '{}' failed: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Owns the sinks of one configuration generation
pub struct RequestLogPipeline {
    global: RequestLogConfig,
    console: ConsoleSink,
    files: FileSinks,
    body_file_counter: AtomicU64,
}

impl RequestLogPipeline {
    /// `global` is the global config with built-in defaults already applied
    pub fn new(global: RequestLogConfig) -> Self {
        Self {
            global,
            console: ConsoleSink::new(),
            files: FileSinks::new(),
            body_file_counter: AtomicU64::new(0),
        }
    }

    pub fn policy_for(&self, overrides: &RequestLogConfig) -> LogPolicy {
        self.global.merge(overrides).resolve()
    }

    /// Log one request. Never fails.
    pub async fn log_request(
        &self,
        server: &ServerConfig,
        request: &InboundRequest,
        overrides: &RequestLogConfig,
    ) {
        let policy = self.policy_for(overrides);
        if !policy.is_enabled() {
            return;
        }

        let record = self.build_record(server, request, &policy).await;
        let text = match record.to_yaml() {
            Ok(text) => text,
            Err(e) => {
                warn!("{}", RequestLogError::from(e));
                return;
            }
        };

        if let Some(path) = &policy.log_file {
            if let Err(e) = self.files.append(path, &text).await {
                warn!("{}", e);
            }
        }
        if policy.log_console {
            if let Err(e) = self.console.write(&text).await {
                warn!("{}", e);
            }
        }
    }

    pub async fn build_record(
        &self,
        server: &ServerConfig,
        request: &InboundRequest,
        policy: &LogPolicy,
    ) -> RequestRecord {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();

        let mut fields = RecordFields {
            server: ServerInfo {
                url: server.base_url.origin(),
                alias: server.alias.clone(),
            },
            method: request.method.clone(),
            mapping: request.path.clone(),
            parameters: OrderedPairs(request.query.clone()),
            headers: policy
                .headers_enabled
                .then(|| OrderedPairs(request.headers.clone())),
            body: None,
            body_file: None,
        };

        if policy.body_enabled {
            if policy.body_as_file {
                let path = self.next_body_file_path(policy, &timestamp);
                match tokio::fs::write(&path, &request.body).await {
                    Ok(()) => {
                        debug!("Request body saved to '{}'", path.display());
                        fields.body_file = Some(path.display().to_string());
                    }
                    Err(source) => warn!("{}", RequestLogError::Io { path, source }),
                }
            } else {
                let class = classify(
                    policy.body_type,
                    request.header("content-type"),
                    &request.body,
                );
                fields.body = Some(render_body(class, policy.body_encoding, &request.body));
            }
        }

        RequestRecord { timestamp, fields }
    }

    /// `<folder>/<timestamp>_<counter>`; the counter never repeats within a pipeline
    pub fn next_body_file_path(&self, policy: &LogPolicy, timestamp: &str) -> PathBuf {
        let counter = self.body_file_counter.fetch_add(1, Ordering::Relaxed);
        let name = format!("{timestamp}_{counter}");
        match &policy.body_files_folder {
            Some(folder) => folder.join(name),
            None => PathBuf::from(name),
        }
    }
}
