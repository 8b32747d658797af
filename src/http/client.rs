//! HTTP transport for chat completion requests.

use super::sse::{LineBuffer, data_payload};
use crate::error::{Error, Result, extract_error_message, status_message};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use url::Url;

/// Lines read from a failed stream while looking for an error envelope.
const MAX_ERROR_LINES: usize = 16;
/// Bytes read from a failed stream while looking for an error envelope.
const MAX_ERROR_BYTES: usize = 64 * 1024;

/// Authentication configuration.
#[derive(Clone)]
pub enum AuthConfig {
    /// Bearer token authentication (Authorization: Bearer {token}).
    Bearer(String),
    /// Custom header authentication (e.g., api-key: {key}).
    ApiKey { header: String, key: String },
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
            Self::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("key", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Connection timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP/TLS connect.
    pub connect: Duration,
    /// Gap between two reads of a body. Bounds stalled streams.
    pub read: Duration,
    /// Whole buffered request, including the body. Not applied to streams.
    pub request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(120),
            request: Duration::from_secs(300),
        }
    }
}

/// Convert a plain header map into validated HTTP headers.
pub fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|_| Error::Config(format!("invalid header name: {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::Config(format!("invalid value for header {name}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// HTTP client for chat completion endpoints.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    auth: AuthConfig,
    extra_headers: HeaderMap,
    request_timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(auth: AuthConfig, extra_headers: HeaderMap, timeouts: Timeouts) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            auth,
            extra_headers,
            request_timeout: timeouts.request,
        })
    }

    /// Same connection pool with different credentials.
    #[must_use]
    pub fn with_auth(&self, auth: AuthConfig) -> Self {
        Self {
            auth,
            ..self.clone()
        }
    }

    /// Build headers including authentication. Extra headers win on collision.
    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match &self.auth {
            AuthConfig::Bearer(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                    Error::Config("Bearer token contains invalid header characters".into())
                })?;
                headers.insert(AUTHORIZATION, value);
            }
            AuthConfig::ApiKey { header, key } => {
                let name = HeaderName::try_from(header.as_str())
                    .map_err(|_| Error::Config("API key header name is invalid".into()))?;
                let value = HeaderValue::from_str(key).map_err(|_| {
                    Error::Config("API key contains invalid header characters".into())
                })?;
                headers.insert(name, value);
            }
        }

        for (name, value) in &self.extra_headers {
            headers.insert(name.clone(), value.clone());
        }

        Ok(headers)
    }

    /// POST a JSON payload and read the whole response body.
    ///
    /// Any status is returned as-is; classification is the decoder's job.
    pub async fn execute_buffered(&self, url: &Url, payload: Vec<u8>) -> Result<BufferedResponse> {
        let headers = self.build_headers()?;
        tracing::debug!(url = %url, bytes = payload.len(), "POST");

        let response = self
            .client
            .post(url.clone())
            .headers(headers)
            .timeout(self.request_timeout)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        tracing::debug!(status = %status, bytes = body.len(), "Response received");

        Ok(BufferedResponse { status, body })
    }

    /// POST a JSON payload and return the body as a live line source.
    ///
    /// The status is checked before any line is handed out. On a non-2xx status the
    /// first lines of the body are read to recover a provider error message.
    pub async fn execute_streamed(&self, url: &Url, payload: Vec<u8>) -> Result<LineStream> {
        let mut headers = self.build_headers()?;
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        tracing::debug!(url = %url, bytes = payload.len(), "POST (stream)");

        let response = self
            .client
            .post(url.clone())
            .headers(headers)
            .body(payload)
            .send()
            .await?;

        let mut lines = LineStream::from_response(response);
        let status = lines.status();
        if !status.is_success() {
            return Err(lines.harvest_error().await);
        }

        Ok(lines)
    }

    /// GET a JSON resource.
    pub async fn get(&self, url: &Url) -> Result<BufferedResponse> {
        let mut headers = self.build_headers()?;
        headers.remove(CONTENT_TYPE);
        tracing::debug!(url = %url, "GET");

        let response = self
            .client
            .get(url.clone())
            .headers(headers)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        Ok(BufferedResponse { status, body })
    }
}

/// Incremental text lines of a response body.
///
/// Owns the connection; dropping it releases the connection.
pub struct LineStream {
    status: StatusCode,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: LineBuffer,
    ready: VecDeque<String>,
    exhausted: bool,
}

impl std::fmt::Debug for LineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineStream")
            .field("status", &self.status)
            .field("ready", &self.ready.len())
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl LineStream {
    fn from_response(response: reqwest::Response) -> Self {
        Self::from_parts(response.status(), response.bytes_stream())
    }

    /// Build from a status and any byte stream.
    pub fn from_parts(
        status: StatusCode,
        body: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    ) -> Self {
        Self {
            status,
            body: body.boxed(),
            buffer: LineBuffer::new(),
            ready: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Next line, `None` at end of body. A transport failure ends the stream.
    pub async fn next_line(&mut self) -> Option<Result<String>> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Some(Ok(line));
            }
            if self.exhausted {
                return None;
            }

            match self.body.next().await {
                Some(Ok(bytes)) => self.ready.extend(self.buffer.feed(&bytes)),
                Some(Err(e)) => {
                    self.exhausted = true;
                    return Some(Err(Error::Network(e)));
                }
                None => {
                    self.exhausted = true;
                    return self.buffer.finish().map(Ok);
                }
            }
        }
    }

    /// Build a `Server` error for a non-2xx stream from whatever body is available.
    pub(crate) async fn harvest_error(&mut self) -> Error {
        let status = self.status;
        let mut collected = Vec::new();
        let mut bytes = 0;

        while collected.len() < MAX_ERROR_LINES && bytes < MAX_ERROR_BYTES {
            let Some(Ok(line)) = self.next_line().await else {
                break;
            };
            let payload = data_payload(&line).unwrap_or(&line).to_string();
            if let Some(message) = extract_error_message(payload.as_bytes()) {
                return Error::Server {
                    status: status.as_u16(),
                    message,
                };
            }
            bytes += payload.len();
            collected.push(payload);
        }

        let body = collected.join("\n");
        let message = extract_error_message(body.as_bytes())
            .unwrap_or_else(|| status_message(status, body.as_bytes()));

        Error::Server {
            status: status.as_u16(),
            message,
        }
    }
}
