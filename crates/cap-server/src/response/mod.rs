//! Rendering of configured responses.

mod builder;

pub use builder::ResponseBuilder;

use crate::config::ResponseConfig;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use tracing::debug;

/// Produce the HTTP response for a response rule.
///
/// A configured delay suspends only the calling request. The body is resolved
/// on every call, so file-backed bodies pick up edits without a reload.
pub async fn render_response(config: &ResponseConfig) -> Response<Full<Bytes>> {
    if let Some(delay) = config.delay() {
        debug!("Delaying response by {:?}", delay);
        tokio::time::sleep(delay).await;
    }

    let status =
        StatusCode::from_u16(config.status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    ResponseBuilder::new(status)
        .merge_headers(&config.headers)
        .body(config.body.load().await)
        .build_full()
}
