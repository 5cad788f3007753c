//! Pluggable HTTP transport.
//!
//! The registry client only ever issues GET requests, so the transport
//! surface is a single method. Production code uses [`ReqwestTransport`];
//! tests substitute an in-memory implementation and exercise the whole
//! protocol without a network.

use std::io::Read;
use std::time::Duration;

use crate::error::TransportError;

/// A single HTTP response: status plus a lazily-read body.
pub struct HttpResponse {
    status: u16,
    body: Box<dyn Read + Send>,
}

impl HttpResponse {
    /// Wraps a status code and body stream.
    #[must_use]
    pub fn new(status: u16, body: impl Read + Send + 'static) -> Self {
        Self {
            status,
            body: Box::new(body),
        }
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Returns whether the status is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Consumes the response, returning the body stream. Bytes are pulled
    /// from the wire as the caller reads.
    #[must_use]
    pub fn into_body(self) -> Box<dyn Read + Send> {
        self.body
    }

    /// Consumes the response and drains the body into a string.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the stream fails or the body is not
    /// valid UTF-8.
    pub fn read_text(self) -> std::io::Result<String> {
        let mut body = self.body;
        let mut text = String::new();
        let _ = body.read_to_string(&mut text)?;
        Ok(text)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Blocking HTTP GET abstraction used by every registry request.
///
/// Implementations must be shareable across threads; concurrent layer
/// prefetch issues requests from multiple threads at once.
pub trait HttpTransport: Send + Sync {
    /// Performs a GET with the given headers, following redirects, and
    /// returns the status plus a streaming body.
    ///
    /// # Errors
    ///
    /// Returns an error only when no HTTP response was obtained at all;
    /// non-2xx statuses are returned as responses for the caller to map.
    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by `reqwest`'s blocking client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Builds the transport.
    ///
    /// The per-request timeout is disabled because layer blobs can be
    /// arbitrarily large; only connection establishment is bounded.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the TLS backend cannot be
    /// initialized.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Client {
                source: Box::new(e),
            })?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse, TransportError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        let response = request.send().map_err(|e| TransportError::Request {
            url: url.to_string(),
            source: Box::new(e),
        })?;
        let status = response.status().as_u16();
        tracing::trace!(url, status, "GET");
        Ok(HttpResponse::new(status, response))
    }
}
