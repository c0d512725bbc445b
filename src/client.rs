use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::header::{HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::{
    completion::CompletionClient,
    errors::{CompletionError, Error, Result, TransportError, TransportErrorKind},
    http::{parse_api_error_parts, request_id_from_headers, HeaderList},
    telemetry::{CompletionContext, CompletionMetrics, MetricsCallbacks, Telemetry},
    types::{BoxFuture, Conversation, Message, MessageRole, Model},
    API_KEY_ENV, BASE_URL_ENV, DEFAULT_BASE_URL, DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT, FALLBACK_API_KEY_ENV,
};

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

#[derive(Clone, Debug, Default)]
pub struct Config {
    /// API root, e.g. `https://api.openai.com/v1` (the default).
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Override the User-Agent value.
    pub client_header: Option<String>,
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
    /// Default extra headers applied to all requests.
    pub default_headers: Option<HeaderList>,
    /// Sampling temperature sent with every request (provider default when unset).
    pub temperature: Option<f32>,
    /// Optional metrics callbacks (completion latency/status).
    pub metrics: Option<MetricsCallbacks>,
}

impl Config {
    /// Read the API key and base URL from the environment.
    ///
    /// `SQLRELAY_API_KEY` wins over `OPENAI_API_KEY`; `SQLRELAY_BASE_URL` is optional.
    pub fn from_env() -> Self {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| std::env::var(FALLBACK_API_KEY_ENV).ok());
        Self {
            api_key,
            base_url: std::env::var(BASE_URL_ENV).ok().filter(|v| !v.trim().is_empty()),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCallbacks) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// OpenAI-compatible chat-completions client.
///
/// Sends one request per [`CompletionClient::complete`] call and never retries.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    endpoint: reqwest::Url,
    api_key: String,
    client_header: String,
    http: reqwest::Client,
    request_timeout: Duration,
    default_headers: Option<HeaderList>,
    temperature: Option<f32>,
    telemetry: Telemetry,
}

impl ChatClient {
    pub fn new(cfg: Config) -> Result<Self> {
        let base = cfg
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        // Trailing slash so `join` appends instead of replacing the last segment.
        let base = format!("{}/", base.trim().trim_end_matches('/'));
        let base_url = reqwest::Url::parse(&base)
            .map_err(|err| Error::Config(format!("invalid base url: {err}")))?;
        let endpoint = base_url
            .join(CHAT_COMPLETIONS_PATH)
            .map_err(|err| Error::Config(format!("invalid base url: {err}")))?;

        let api_key = cfg
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("api key is required".to_string()))?;

        let connect_timeout = cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let request_timeout = cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http = match cfg.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(|err| {
                    Error::Completion(
                        TransportError {
                            kind: TransportErrorKind::Connect,
                            message: "failed to build http client".to_string(),
                            source: Some(err),
                        }
                        .into(),
                    )
                })?,
        };

        let client_header = cfg
            .client_header
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CLIENT_HEADER.to_string());

        Ok(Self {
            inner: Arc::new(ClientInner {
                endpoint,
                api_key,
                client_header,
                http,
                request_timeout,
                default_headers: cfg.default_headers,
                temperature: cfg.temperature,
                telemetry: Telemetry::new(cfg.metrics),
            }),
        })
    }

    /// Build a client from [`Config::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env())
    }

    /// Request one assistant reply for `conversation`.
    pub async fn chat(
        &self,
        model: &Model,
        conversation: &Conversation,
    ) -> std::result::Result<Message, CompletionError> {
        let fut = self.inner.chat(model, conversation);
        #[cfg(feature = "tracing")]
        let fut = tracing::Instrument::instrument(
            fut,
            tracing::debug_span!(
                "sqlrelay.completion",
                model = %model,
                messages = conversation.len()
            ),
        );
        fut.await
    }
}

impl CompletionClient for ChatClient {
    fn complete<'a>(
        &'a self,
        model: &'a Model,
        conversation: &'a Conversation,
    ) -> BoxFuture<'a, std::result::Result<Message, CompletionError>> {
        Box::pin(self.chat(model, conversation))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ClientInner {
    async fn chat(
        &self,
        model: &Model,
        conversation: &Conversation,
    ) -> std::result::Result<Message, CompletionError> {
        let body = ChatRequest {
            model: model.as_str(),
            messages: conversation.messages(),
            temperature: self.temperature,
        };
        let builder = self
            .http
            .post(self.endpoint.clone())
            .timeout(self.request_timeout)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, self.client_header.as_str())
            .bearer_auth(&self.api_key)
            .json(&body);
        let builder = self.with_headers(builder)?;

        let ctx = CompletionContext::new(Some(model.clone()));
        let start = Instant::now();

        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(err) => {
                self.record(start, None, Some(err.to_string()), ctx);
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "completion transport error");
                return Err(self.to_transport_error(err));
            }
        };

        let status = resp.status();
        let headers = resp.headers().clone();
        let ctx = ctx.with_request_id(request_id_from_headers(&headers));

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            self.record(
                start,
                Some(status.as_u16()),
                Some(format!("http {}", status.as_u16())),
                ctx,
            );
            #[cfg(feature = "tracing")]
            tracing::warn!(status = %status, "completion request failed");
            return Err(parse_api_error_parts(status, &headers, body).into());
        }

        let bytes = match resp.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                self.record(start, Some(status.as_u16()), Some(err.to_string()), ctx);
                return Err(self.to_transport_error(err));
            }
        };
        self.record(start, Some(status.as_u16()), None, ctx);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            status = %status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "completion received"
        );

        let payload: ChatResponse = serde_json::from_slice(&bytes)?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(CompletionError::EmptyReply)?;
        Ok(Message {
            role: MessageRole::Assistant,
            content,
        })
    }

    fn with_headers(
        &self,
        mut builder: reqwest::RequestBuilder,
    ) -> std::result::Result<reqwest::RequestBuilder, CompletionError> {
        let Some(defaults) = &self.default_headers else {
            return Ok(builder);
        };
        for entry in defaults.iter() {
            if !entry.is_valid() {
                continue;
            }
            let name = HeaderName::from_bytes(entry.key.trim().as_bytes())
                .map_err(|err| CompletionError::Other(format!("invalid header name: {err}")))?;
            let val = HeaderValue::from_str(entry.value.trim())
                .map_err(|err| CompletionError::Other(format!("invalid header value: {err}")))?;
            builder = builder.header(name, val);
        }
        Ok(builder)
    }

    fn record(
        &self,
        start: Instant,
        status: Option<u16>,
        error: Option<String>,
        context: CompletionContext,
    ) {
        if self.telemetry.completion_enabled() {
            self.telemetry.record_completion(CompletionMetrics {
                latency: start.elapsed(),
                status,
                error,
                context,
            });
        }
    }

    fn to_transport_error(&self, err: reqwest::Error) -> CompletionError {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };

        TransportError {
            kind,
            message: err.to_string(),
            source: Some(err),
        }
        .into()
    }
}
