use bytes::Bytes;
use http_body_util::Full;
use hyper::header::CONTENT_LENGTH;
use hyper::http::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Response, StatusCode};
use tracing::warn;

/// Builds a response carrying exactly the configured headers.
///
/// Header names are lower-cased, a configured `content-length` is ignored and
/// the real body length is always set.
pub struct ResponseBuilder {
    status: StatusCode,
    body: Bytes,
    headers: HeaderMap,
}

impl ResponseBuilder {
    pub fn new(status_code: StatusCode) -> Self {
        ResponseBuilder {
            status: status_code,
            body: Bytes::new(),
            headers: Default::default(),
        }
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        match (
            HeaderName::from_bytes(lower.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => warn!("Skipping invalid response header '{}: {}'", name, value),
        }
        self
    }

    pub fn merge_headers<'a, H>(mut self, headers: H) -> Self
    where
        H: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in headers {
            self = self.header(key, value);
        }
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn build_full(mut self) -> Response<Full<Bytes>> {
        self.headers
            .insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));

        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
