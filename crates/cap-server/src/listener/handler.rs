//! Per-request handling: match, log, render.

use super::core::Listener;
use crate::config::ResponseConfig;
use crate::matcher::InboundRequest;
use crate::response::render_response;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response};
use once_cell::sync::Lazy;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, warn};

static FALLBACK_RESPONSE: Lazy<ResponseConfig> = Lazy::new(ResponseConfig::default);

/// Hyper service entry point
pub async fn handle_request(
    req: Request<Incoming>,
    listener: Arc<Listener>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            Bytes::new()
        }
    };

    let request = InboundRequest::from_parts(&parts, body);
    Ok(listener.respond(&request).await)
}

impl Listener {
    /// Select the response for a request, log the request under that
    /// response's policy and render it. Unmatched requests get the server's
    /// default response.
    pub async fn respond(&self, request: &InboundRequest) -> Response<Full<Bytes>> {
        let response_id = match self.rules().find(request) {
            Ok(rule) => {
                debug!(
                    "Request '{} {}' matched '{}'",
                    request.method, request.path, rule.id
                );
                rule.response_id.as_str()
            }
            Err(no_match) => {
                warn!("{}", no_match);
                self.server().default_response_id.as_str()
            }
        };

        let response = match self.config().responses.get(response_id) {
            Some(response) => response,
            None => {
                error!("Response '{}' is not described", response_id);
                Lazy::force(&FALLBACK_RESPONSE)
            }
        };

        self.pipeline()
            .log_request(self.server(), request, &response.request_log_config)
            .await;

        render_response(response).await
    }
}
