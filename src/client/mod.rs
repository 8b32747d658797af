//! Chat completion client.


use crate::completion::{Completion, ModelList};
use crate::config::{Config, DEFAULT_ENDPOINT, DEFAULT_MODELS_ENDPOINT, parse_url};
use crate::decode::{decode_completion, decode_models};
use crate::error::{Error, Result};
use crate::http::{AuthConfig, HttpClient, Timeouts, header_map};
use crate::message::Message;
use crate::options::ChatOptions;
use crate::request::{ModelTarget, encode_body};
use crate::routing::FallbackRouter;
use crate::stream::ChunkStream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Client for an OpenAI-compatible chat completions API.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct ChatClient {
    inner: Arc<Inner>,
}

#[derive(Debug, Clone)]
struct Inner {
    http: HttpClient,
    endpoint: Url,
    models_endpoint: Url,
    router: FallbackRouter,
}

impl ChatClient {
    /// Create a client for the OpenAI API.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_endpoints(
            api_key,
            DEFAULT_ENDPOINT,
            DEFAULT_MODELS_ENDPOINT,
            &HashMap::new(),
        )
    }

    /// Create a client for any OpenAI-compatible server.
    ///
    /// `headers` are sent with every request and override the defaults, including
    /// `Authorization`.
    pub fn with_endpoints(
        api_key: impl Into<String>,
        endpoint: &str,
        models_endpoint: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Self> {
        Self::build(
            AuthConfig::Bearer(api_key.into()),
            parse_url(endpoint)?,
            parse_url(models_endpoint)?,
            headers,
            Timeouts::default(),
            FallbackRouter::default(),
        )
    }

    /// Create a client from a loaded config, resolving the API key.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::build(
            AuthConfig::Bearer(config.resolve_api_key()?),
            config.endpoint_url()?,
            config.models_url()?,
            &config.headers,
            config.timeouts(),
            config.fallback_router(),
        )
    }

    fn build(
        auth: AuthConfig,
        endpoint: Url,
        models_endpoint: Url,
        headers: &HashMap<String, String>,
        timeouts: Timeouts,
        router: FallbackRouter,
    ) -> Result<Self> {
        let http = HttpClient::new(auth, header_map(headers)?, timeouts)?;
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                endpoint,
                models_endpoint,
                router,
            }),
        })
    }

    /// Replace the fallback router.
    #[must_use]
    pub fn with_fallback(mut self, router: FallbackRouter) -> Self {
        Arc::make_mut(&mut self.inner).router = router;
        self
    }

    /// Authenticate with a custom header instead of `Authorization: Bearer`.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        let inner = Arc::make_mut(&mut self.inner);
        inner.http = inner.http.with_auth(auth);
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    pub fn models_endpoint(&self) -> &Url {
        &self.inner.models_endpoint
    }

    pub fn fallback_router(&self) -> &FallbackRouter {
        &self.inner.router
    }

    /// Whether this client sends candidate lists for fallback.
    pub fn supports_fallback(&self) -> bool {
        self.inner.router.supports(&self.inner.endpoint)
    }

    fn encode(
        &self,
        target: &ModelTarget,
        messages: &[Message],
        options: Option<&ChatOptions>,
        streaming: bool,
    ) -> Result<Vec<u8>> {
        let fallback = self.supports_fallback();
        tracing::debug!(
            model = %target.primary(),
            messages = messages.len(),
            stream = streaming,
            fallback,
            "Chat completion request"
        );
        encode_body(target, messages, options, streaming, fallback)
    }

    /// Send a chat completion request and wait for the full response.
    pub async fn send(
        &self,
        target: impl Into<ModelTarget>,
        messages: &[Message],
        options: Option<&ChatOptions>,
    ) -> Result<Completion> {
        let target = target.into();
        let payload = self.encode(&target, messages, options, false)?;

        let response = self
            .inner
            .http
            .execute_buffered(&self.inner.endpoint, payload)
            .await?;

        decode_completion(response.status, &response.body)
    }

    /// Like [`send`](Self::send), but gives up with `Error::Cancelled` once `token` fires.
    pub async fn send_cancellable(
        &self,
        target: impl Into<ModelTarget>,
        messages: &[Message],
        options: Option<&ChatOptions>,
        token: &CancellationToken,
    ) -> Result<Completion> {
        tokio::select! {
            () = token.cancelled() => Err(Error::Cancelled),
            result = self.send(target, messages, options) => result,
        }
    }

    /// Stream a chat completion.
    ///
    /// Every failure, including one building the request, arrives as an item of the
    /// returned stream.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime; the reader task is spawned immediately.
    pub fn stream(
        &self,
        target: impl Into<ModelTarget>,
        messages: &[Message],
        options: Option<&ChatOptions>,
    ) -> ChunkStream {
        self.stream_with_cancel(target, messages, options, &CancellationToken::new())
    }

    /// Stream a chat completion that also ends when `token` is cancelled.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn stream_with_cancel(
        &self,
        target: impl Into<ModelTarget>,
        messages: &[Message],
        options: Option<&ChatOptions>,
        token: &CancellationToken,
    ) -> ChunkStream {
        let target = target.into();
        let payload = match self.encode(&target, messages, options, true) {
            Ok(payload) => payload,
            Err(e) => return ChunkStream::failed(e, token),
        };

        let http = self.inner.http.clone();
        let endpoint = self.inner.endpoint.clone();
        ChunkStream::spawn(
            async move { http.execute_streamed(&endpoint, payload).await },
            token,
        )
    }

    /// List the models the server offers.
    pub async fn models(&self) -> Result<ModelList> {
        let response = self.inner.http.get(&self.inner.models_endpoint).await?;
        decode_models(response.status, &response.body)
    }
}

/// Chat completion API, for callers that want a `dyn` seam.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send(
        &self,
        target: ModelTarget,
        messages: &[Message],
        options: Option<&ChatOptions>,
    ) -> Result<Completion>;

    fn stream(
        &self,
        target: ModelTarget,
        messages: &[Message],
        options: Option<&ChatOptions>,
    ) -> ChunkStream;

    async fn models(&self) -> Result<ModelList>;
}

#[async_trait]
impl ChatApi for ChatClient {
    async fn send(
        &self,
        target: ModelTarget,
        messages: &[Message],
        options: Option<&ChatOptions>,
    ) -> Result<Completion> {
        ChatClient::send(self, target, messages, options).await
    }

    fn stream(
        &self,
        target: ModelTarget,
        messages: &[Message],
        options: Option<&ChatOptions>,
    ) -> ChunkStream {
        ChatClient::stream(self, target, messages, options)
    }

    async fn models(&self) -> Result<ModelList> {
        ChatClient::models(self).await
    }
}
